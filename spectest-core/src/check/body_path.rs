//! Value checks addressed by dot-separated paths into the canonical response body,
//! so they work the same whatever format the response came in.

use serde_json::{Map, Value};

use super::{marker, Context, Error, Section};

const EXPECTED_BODY_PATHS: &str = "expectedBodyPaths";
const EXPECTED_BODY_PATH: &str = "expectedBodyPath";
const EXPECTED_BODY_VALUE: &str = "expectedBodyValue";
const RECEIVED_BODY_VALUE: &str = "receivedBodyValue";
const CHECKS: &str = "checks";

pub(super) fn applies(spec: &Value) -> bool {
    spec.get(EXPECTED_BODY_PATHS).is_some()
}

pub(super) fn check(ctx: &Context<'_>, section: &mut Section) -> Result<(), Error> {
    let entries = ctx
        .spec
        .get(EXPECTED_BODY_PATHS)
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Malformed {
            field: EXPECTED_BODY_PATHS,
            reason: "expected an array".into(),
        })?;

    let mut checks = Vec::with_capacity(entries.len());
    for entry in entries {
        let path = entry
            .get(EXPECTED_BODY_PATH)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let expected = entry.get(EXPECTED_BODY_VALUE).cloned().unwrap_or_default();
        let received = resolve(ctx.body, path).cloned();
        let passed = received.as_ref() == Some(&expected);
        section.verdict(passed);

        let mut log = Map::new();
        log.insert(EXPECTED_BODY_PATH.into(), path.into());
        log.insert(EXPECTED_BODY_VALUE.into(), expected);
        log.insert(RECEIVED_BODY_VALUE.into(), received.unwrap_or_default());
        log.insert(super::RESULT.into(), marker(passed));
        checks.push(Value::Object(log));
    }
    section.record(CHECKS, checks);
    Ok(())
}

/// Numeric segments index into arrays. A blank path is the whole body.
fn resolve<'v>(body: &'v Value, path: &str) -> Option<&'v Value> {
    let path = path.trim();
    if path.is_empty() {
        return Some(body);
    }
    let pointer: String = path
        .split('.')
        .map(|segment| format!("/{}", segment.replace('~', "~0").replace('/', "~1")))
        .collect();
    body.pointer(&pointer)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        check::{test::response, Check},
        model::RunStatus,
    };
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use test_case::test_case;

    #[test_case("user.name", Some(json!("bob")); "nested field")]
    #[test_case("items.1", Some(json!(20)); "array index")]
    #[test_case("", Some(json!({"user": {"name": "bob"}, "items": [10, 20], "a/b": 1})); "blank")]
    #[test_case("a/b", Some(json!(1)); "slash in name")]
    #[test_case("user.age", None; "missing")]
    fn resolves(path: &str, expected: Option<Value>) {
        let body = json!({"user": {"name": "bob"}, "items": [10, 20], "a/b": 1});
        assert_eq!(resolve(&body, path).cloned(), expected);
    }

    #[test]
    fn works_on_xml_responses() {
        let spec = json!({
            "expectedBodyPaths": [
                {"expectedBodyPath": "user.id", "expectedBodyValue": 7},
                {"expectedBodyPath": "user.active", "expectedBodyValue": true},
                {"expectedBodyPath": "user.name", "expectedBodyValue": "bob"}
            ]
        });
        let response = response(200, Some("application/xml"), "");
        let body = crate::normalize::normalize(
            "<r><user><id>7</id><active>true</active><name>alice</name></user></r>",
            crate::format::Format::Xml,
        )
        .unwrap();
        let ctx = Context {
            spec: &spec,
            body: &body,
            response: &response,
        };
        let mut log = Map::new();

        assert_eq!(Check::BodyPath.handle(&ctx, &mut log, RunStatus::Pass), RunStatus::Fail);
        let results: Vec<_> = log["bodyPathValueCheckResult"]["checks"]
            .as_array()
            .unwrap()
            .iter()
            .map(|entry| entry["result"].clone())
            .collect();
        assert_eq!(results, vec![json!("PASS"), json!("PASS"), json!("FAIL")]);
    }

    #[test]
    fn not_a_list_is_an_error() {
        let spec = json!({"expectedBodyPaths": {"expectedBodyPath": "id"}});
        let response = response(200, None, "");
        let ctx = Context {
            spec: &spec,
            body: &Value::Null,
            response: &response,
        };
        let mut log = Map::new();
        assert_eq!(Check::BodyPath.handle(&ctx, &mut log, RunStatus::Pass), RunStatus::Error);
    }
}
