//! Value checks addressed by dot/bracket paths (`$.items[0].name`) into the raw
//! response text read as JSON.

use serde_json::{Map, Value};

use super::{as_text, marker, Context, Error, Section};

const EXPECTED_BODY_PATH: &str = "expectedBodyPath";
const EXPECTED_BODY_VALUE: &str = "expectedBodyValue";
const EXPECTED_BODY_JSON_PATHS: &str = "expectedBodyJsonPaths";
const EXPECTED_JSON_PATH: &str = "expectedJsonPath";
const EXPECTED_JSON_VALUE: &str = "expectedJsonValue";
const RECEIVED_JSON_VALUE: &str = "receivedJsonValue";
const CHECKS: &str = "checks";

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Field(String),
    Index(usize),
}

pub(super) fn applies(spec: &Value) -> bool {
    (spec.get(EXPECTED_BODY_PATH).is_some() && spec.get(EXPECTED_BODY_VALUE).is_some())
        || spec.get(EXPECTED_BODY_JSON_PATHS).is_some()
}

pub(super) fn check(ctx: &Context<'_>, section: &mut Section) -> Result<(), Error> {
    let pairs = expected_pairs(ctx.spec)?;
    let document: Value = serde_json::from_slice(&ctx.response.body)
        .map_err(|e| Error::NotJson(e.to_string()))?;

    let mut checks = Vec::with_capacity(pairs.len());
    for (path, expected) in pairs {
        let received = query(&document, &path)?.map(as_text);
        let passed = received.as_deref() == Some(expected.as_str());
        section.verdict(passed);

        let mut entry = Map::new();
        entry.insert(EXPECTED_JSON_PATH.into(), path.into());
        entry.insert(EXPECTED_JSON_VALUE.into(), expected.into());
        entry.insert(RECEIVED_JSON_VALUE.into(), received.into());
        entry.insert(super::RESULT.into(), marker(passed));
        checks.push(Value::Object(entry));
    }
    section.record(CHECKS, checks);
    Ok(())
}

/// The top-level pair first, then the entries of the list, each as `(path, text)`.
fn expected_pairs(spec: &Value) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    if let (Some(path), Some(value)) = (spec.get(EXPECTED_BODY_PATH), spec.get(EXPECTED_BODY_VALUE))
    {
        pairs.push((as_text(path), as_text(value)));
    }

    let Some(list) = spec.get(EXPECTED_BODY_JSON_PATHS) else {
        return Ok(pairs);
    };
    let malformed = |reason: &str| Error::Malformed {
        field: EXPECTED_BODY_JSON_PATHS,
        reason: reason.to_string(),
    };
    let entries = list
        .as_array()
        .ok_or_else(|| malformed("expected an array"))?;
    for entry in entries {
        let path = entry
            .get(EXPECTED_JSON_PATH)
            .ok_or_else(|| malformed("entry without 'expectedJsonPath'"))?;
        let value = entry
            .get(EXPECTED_JSON_VALUE)
            .ok_or_else(|| malformed("entry without 'expectedJsonValue'"))?;
        pairs.push((as_text(path), as_text(value)));
    }
    Ok(pairs)
}

/// Resolve `path` against `json`. `Ok(None)` when the path points at nothing.
///
/// ```
/// use serde_json::json;
/// use spectest_core::check::query_json_path;
///
/// let doc = json!({"items": [{"name": "a"}, {"name": "b"}]});
/// assert_eq!(query_json_path(&doc, "$.items[1].name").unwrap(), Some(&json!("b")));
/// assert_eq!(query_json_path(&doc, "items[2]").unwrap(), None);
/// ```
pub fn query<'v>(json: &'v Value, path: &str) -> Result<Option<&'v Value>, Error> {
    let steps = parse(path)?;
    Ok(steps.iter().try_fold(json, |current, step| match step {
        Step::Field(name) => current.get(name.as_str()),
        Step::Index(index) => current.get(*index),
    }))
}

fn parse(path: &str) -> Result<Vec<Step>, Error> {
    let invalid = |reason: &str| Error::InvalidPath {
        path: path.to_string(),
        reason: reason.to_string(),
    };

    let trimmed = path.trim();
    let trimmed = trimmed.strip_prefix('$').unwrap_or(trimmed);

    let mut steps = Vec::new();
    for segment in trimmed.split('.').filter(|segment| !segment.is_empty()) {
        let (name, mut rest) = segment.split_at(segment.find('[').unwrap_or(segment.len()));
        if !name.is_empty() {
            steps.push(Step::Field(name.to_string()));
        }
        while !rest.is_empty() {
            let (index, tail) = rest
                .strip_prefix('[')
                .and_then(|inner| inner.split_once(']'))
                .ok_or_else(|| invalid("unbalanced brackets"))?;
            let index = index
                .trim()
                .parse()
                .map_err(|_| invalid("array index must be a non-negative integer"))?;
            steps.push(Step::Index(index));
            rest = tail;
        }
    }
    Ok(steps)
}
