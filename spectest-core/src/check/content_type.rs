use serde_json::Value;

use super::{as_text, Context, Error, Section};

const EXPECTED_CONTENT_TYPE: &str = "expectedContentType";
const RECEIVED_CONTENT_TYPE: &str = "receivedContentType";
const EXPECTED_MEDIA_TYPE: &str = "expectedMediaType";
const RECEIVED_MEDIA_TYPE: &str = "receivedMediaType";

/// Expectation fields and the key their received value is logged under.
const FIELDS: [(&str, &str); 2] = [
    (EXPECTED_CONTENT_TYPE, RECEIVED_CONTENT_TYPE),
    (EXPECTED_MEDIA_TYPE, RECEIVED_MEDIA_TYPE),
];

pub(super) fn applies(spec: &Value) -> bool {
    FIELDS.iter().any(|(field, _)| spec.get(field).is_some())
}

/// Exact string equality with the declared `Content-Type`, once per expectation
/// field present. A missing header never matches.
pub(super) fn check(ctx: &Context<'_>, section: &mut Section) -> Result<(), Error> {
    let received = ctx.response.content_type.clone();

    for (field, received_key) in FIELDS {
        let Some(expected) = ctx.spec.get(field).map(as_text) else {
            continue;
        };
        section.verdict(received.as_deref() == Some(expected.as_str()));
        section.record(field, expected);
        section.record(received_key, received.clone());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        check::{test::response, Check},
        model::RunStatus,
    };
    use serde_json::{json, Map};
    use test_case::test_case;

    #[test_case(json!({"expectedMediaType": "application/json"}), Some("application/json"), RunStatus::Pass; "media type")]
    #[test_case(json!({"expectedContentType": "application/json"}), Some("application/json"), RunStatus::Pass; "content type")]
    #[test_case(json!({"expectedContentType": "application/json"}), Some("application/json; charset=utf-8"), RunStatus::Fail; "parameters count")]
    #[test_case(json!({"expectedMediaType": "text/plain"}), None, RunStatus::Fail; "missing header")]
    #[test_case(json!({"expectedContentType": "application/json", "expectedMediaType": "text/plain"}), Some("application/json"), RunStatus::Fail; "both fields, one mismatch")]
    #[test_case(json!({"expectedContentType": "text/xml", "expectedMediaType": "text/xml"}), Some("text/xml"), RunStatus::Pass; "both fields match")]
    fn compares(spec: Value, received: Option<&str>, status: RunStatus) {
        let response = response(200, received, "");
        let ctx = Context {
            spec: &spec,
            body: &Value::Null,
            response: &response,
        };
        let mut log = Map::new();

        assert_eq!(Check::ContentType.handle(&ctx, &mut log, RunStatus::Pass), status);
        let section = &log["contentTypeCheckResult"];
        for (field, received_key) in FIELDS {
            if let Some(expected) = spec.get(field) {
                assert_eq!(&section[field], expected);
                assert_eq!(section[received_key], json!(received));
            } else {
                assert!(section.get(field).is_none());
            }
        }
        assert_eq!(section["result"], json!(status.to_string()));
    }
}
