//! Whole-body comparison against `expectedBody`.
//!
//! The received body must be an object or an array of objects. Excluded fields are
//! removed from both sides first. With `excludeAllOtherBodyFields` set, every
//! candidate object is also cut down to the fields the expected body names,
//! recursively. An expected object then matches a received object by deep
//! equality, or a received array when any of its elements is deep-equal.

use serde_json::{Map, Value};

use super::{as_text, Context, Error, Section};
use crate::validate::EXCLUDED_BODY_FIELDS;

const EXPECTED_BODY: &str = "expectedBody";
const RECEIVED_BODY: &str = "receivedBody";
const COMPARED_BODY: &str = "comparedBody";
const EXCLUDE_ALL_OTHER_BODY_FIELDS: &str = "excludeAllOtherBodyFields";

pub(super) fn applies(spec: &Value) -> bool {
    spec.get(EXPECTED_BODY).is_some()
}

pub(super) fn check(ctx: &Context<'_>, section: &mut Section) -> Result<(), Error> {
    let mut expected = ctx.spec.get(EXPECTED_BODY).cloned().unwrap_or_default();
    section.record(EXPECTED_BODY, expected.clone());
    section.record(RECEIVED_BODY, ctx.body.clone());

    match ctx.body {
        Value::Object(_) => {}
        Value::Array(items) if items.iter().all(Value::is_object) => {}
        other => return Err(Error::UnexpectedBody(describe(other).into())),
    }

    let excluded: Vec<String> = ctx
        .spec
        .get(EXCLUDED_BODY_FIELDS)
        .and_then(Value::as_array)
        .map(|fields| fields.iter().map(as_text).collect())
        .unwrap_or_default();

    let mut compared = ctx.body.clone();
    exclude(&mut expected, &excluded);
    exclude(&mut compared, &excluded);

    let trim = ctx
        .spec
        .get(EXCLUDE_ALL_OTHER_BODY_FIELDS)
        .is_some_and(is_truthy);
    if let (true, Value::Object(shape)) = (trim, &expected) {
        compared = match compared {
            Value::Object(candidate) => Value::Object(trim_to(shape, &candidate)),
            Value::Array(items) => Value::Array(
                items
                    .iter()
                    .filter_map(Value::as_object)
                    .map(|candidate| Value::Object(trim_to(shape, candidate)))
                    .collect(),
            ),
            other => other,
        };
    }

    let passed = matches(&expected, &compared);
    section.record(EXPECTED_BODY, expected);
    section.record(COMPARED_BODY, compared);
    section.verdict(passed);
    Ok(())
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "an empty body",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "text",
        Value::Array(_) => "an array with non-object elements",
        Value::Object(_) => "an object",
    }
}

/// Drop `fields` from an object, or from every object of an array.
fn exclude(value: &mut Value, fields: &[String]) {
    match value {
        Value::Object(object) => {
            for field in fields {
                object.shift_remove(field);
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|item| {
            if let Value::Object(object) = item {
                for field in fields {
                    object.shift_remove(field);
                }
            }
        }),
        _ => {}
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(flag) => *flag,
        Value::String(text) => text.trim().eq_ignore_ascii_case("true"),
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        _ => false,
    }
}

/// Fields of `target` that `shape` names, nested objects trimmed the same way.
fn trim_to(shape: &Map<String, Value>, target: &Map<String, Value>) -> Map<String, Value> {
    shape
        .iter()
        .filter_map(|(field, expected)| {
            let received = target.get(field)?;
            let kept = match (expected, received) {
                (Value::Object(inner_shape), Value::Object(inner)) => {
                    Value::Object(trim_to(inner_shape, inner))
                }
                _ => received.clone(),
            };
            Some((field.clone(), kept))
        })
        .collect()
}

fn matches(expected: &Value, compared: &Value) -> bool {
    match (expected, compared) {
        (Value::Object(_), Value::Array(candidates)) => {
            candidates.iter().any(|candidate| candidate == expected)
        }
        _ => expected == compared,
    }
}
