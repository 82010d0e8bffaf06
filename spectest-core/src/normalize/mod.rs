//! # Normalization
//!
//! Every supported format is parsed into one canonical tree, a
//! [`serde_json::Value`] with insertion-ordered objects. Validation, dispatch and
//! every check only ever see this shape.
//!
//! ```text
//! +-----------+     +------------------+     +--------------------+
//! | raw text  | --> | format::resolve  | --> | json / yaml / xml  |
//! +-----------+     +------------------+     | parser             |
//!                                            +--------------------+
//!                                                      |
//!                                    xml only          v
//!                          +-------------------+   +---------------+
//!                          | coerce_types      |-->| canonical tree|
//!                          +-------------------+   +---------------+
//! ```
//!
//! XML text nodes carry no type information, so an XML tree goes through
//! [`coerce_types`] which turns boolean and numeric looking strings into real
//! booleans and numbers. JSON and YAML are typed already and are left alone.

pub mod xml;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use tracing::*;

use crate::{
    error::Location,
    format::{self, Format},
    Error, Result,
};

static INTEGER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+$").expect("integer pattern"));
static DECIMAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d*\.\d+$").expect("decimal pattern"));

/// Parse `raw` written in `format` into the canonical tree.
pub fn normalize(raw: &str, format: Format) -> Result<Value> {
    debug!("normalizing {format} specification");
    match format {
        Format::Json => from_json(raw),
        Format::Yaml => from_yaml(raw),
        Format::Xml => from_xml(raw),
    }
}

/// Resolve the format of `raw` from its shape, then normalize it.
pub fn normalize_auto(raw: &str) -> Result<Value> {
    normalize(raw, format::resolve(raw)?)
}

/// Write a canonical tree back as text in `format`.
pub fn serialize(tree: &Value, format: Format) -> Result<Vec<u8>> {
    match format {
        Format::Json => serde_json::to_vec(tree)
            .map_err(|e| Error::invalid(format!("failed to write JSON: {e}"))),
        Format::Yaml => serde_yaml::to_string(tree)
            .map(String::into_bytes)
            .map_err(|e| Error::invalid(format!("failed to write YAML: {e}"))),
        Format::Xml => xml::write(tree, "body").map(String::into_bytes),
    }
}

fn from_json(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|e| {
        let location = Location {
            line: e.line(),
            column: e.column(),
        };
        warn!("failed to parse JSON spec at {location}: {e}");
        Error::invalid_at(format!("failed to parse JSON: {e}"), Some(location))
    })
}

fn from_yaml(raw: &str) -> Result<Value> {
    serde_yaml::from_str(raw).map_err(|e| {
        let location = e.location().map(|loc| Location {
            line: loc.line(),
            column: loc.column(),
        });
        warn!("failed to parse YAML spec: {e}");
        Error::invalid_at(format!("failed to parse YAML: {e}"), location)
    })
}

fn from_xml(raw: &str) -> Result<Value> {
    xml::parse(raw).map(coerce_types)
}

/// Reinterpret string leaves as booleans, integers and floats where they look like one.
///
/// Recurses through objects and arrays. Running it on an already coerced tree
/// changes nothing.
pub fn coerce_types(tree: Value) -> Value {
    match tree {
        Value::Object(fields) => Value::Object(
            fields
                .into_iter()
                .map(|(key, value)| (key, coerce_types(value)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(coerce_types).collect()),
        Value::String(text) => coerce_text(text),
        other => other,
    }
}

fn coerce_text(text: String) -> Value {
    if text.eq_ignore_ascii_case("true") {
        return Value::Bool(true);
    }
    if text.eq_ignore_ascii_case("false") {
        return Value::Bool(false);
    }
    if INTEGER.is_match(&text) {
        if let Ok(n) = text.parse::<i32>() {
            return Value::from(n);
        }
        if let Ok(n) = text.parse::<i64>() {
            return Value::from(n);
        }
        // wider than 64 bits, keep the digits as they are
        return Value::String(text);
    }
    if DECIMAL.is_match(&text) {
        // a float that only renders in exponent form would not coerce again
        if let Some(n) = text
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .filter(|n| DECIMAL.is_match(&n.to_string()))
        {
            return Value::Number(n);
        }
    }
    Value::String(text)
}
