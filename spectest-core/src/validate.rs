//! Structural and semantic checks on a normalized specification.

use serde_json::Value;
use tracing::*;
use url::Url;

use crate::{Error, Result};

pub const URL: &str = "url";
pub const METHOD: &str = "method";
pub const HEADERS: &str = "headers";
pub const BODY: &str = "body";
pub const EXPECTED_STATUS_CODE: &str = "expectedStatusCode";
pub const EXCLUDED_BODY_FIELDS: &str = "excludedBodyFields";

const MANDATORY_FIELDS: [&str; 2] = [URL, METHOD];
pub const VALID_HTTP_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// A specification that passed validation, ready to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSpec {
    /// The whole canonical tree, including the assertion fields read by the checks.
    pub tree: Value,
    /// Absolute target URL, also the key the run is queued under.
    pub url: String,
    /// Upper-cased HTTP method.
    pub method: String,
}

/// Validate a canonical tree.
///
/// Checks run in order and the first failure is returned; each check relies on the
/// ones before it having passed.
pub fn validate(tree: Value) -> Result<ValidatedSpec> {
    let Some(fields) = tree.as_object() else {
        error!("specification root is not an object: {tree}");
        return Err(Error::invalid("specification root must be an object"));
    };

    for field in MANDATORY_FIELDS {
        let blank = match fields.get(field) {
            Some(Value::String(text)) => text.trim().is_empty(),
            _ => true,
        };
        if blank {
            error!("mandatory field '{field}' is missing");
            return Err(Error::invalid(format!(
                "missing or empty mandatory field: '{field}', received: '{}'",
                fields.get(field).unwrap_or(&Value::Null)
            )));
        }
    }

    let method = text_of(fields.get(METHOD)).to_uppercase();
    if !VALID_HTTP_METHODS.contains(&method.as_str()) {
        error!("method is not valid: '{method}'");
        return Err(Error::invalid(format!("unsupported HTTP method: '{method}'")));
    }

    let url = text_of(fields.get(URL)).to_string();
    if let Err(reason) = check_absolute_url(&url) {
        error!("url is not valid: '{url}'");
        return Err(Error::invalid(format!("invalid URL '{url}': {reason}")));
    }

    if let Some(headers) = fields.get(HEADERS) {
        let Some(headers) = headers.as_object() else {
            error!("headers field is not an object: {headers}");
            return Err(Error::invalid("field 'headers' must be an object"));
        };
        if let Some((name, _)) = headers.iter().find(|(_, value)| !value.is_string()) {
            error!("header value for '{name}' is not a string");
            return Err(Error::invalid(format!(
                "header value for '{name}' must be a string"
            )));
        }
    }

    if let Some(code) = fields.get(EXPECTED_STATUS_CODE) {
        if !code.is_number() {
            error!("expected status code is not a number: {code}");
            return Err(Error::invalid(format!(
                "field '{EXPECTED_STATUS_CODE}' must be a number"
            )));
        }
    }

    if let Some(body) = fields.get(BODY) {
        if !(body.is_object() || body.is_array()) {
            error!("body is neither an object nor an array: {body}");
            return Err(Error::invalid(format!(
                "field '{BODY}' must be an object or array"
            )));
        }
    }

    if let Some(excluded) = fields.get(EXCLUDED_BODY_FIELDS) {
        if !excluded.is_array() {
            error!("excluded body fields is not an array: {excluded}");
            return Err(Error::invalid(format!(
                "field '{EXCLUDED_BODY_FIELDS}' must be an array"
            )));
        }
    }

    debug!("specification for {method} {url} is valid");
    Ok(ValidatedSpec { tree, url, method })
}

fn text_of(value: Option<&Value>) -> &str {
    value.and_then(Value::as_str).unwrap_or_default().trim()
}

fn check_absolute_url(url: &str) -> std::result::Result<(), String> {
    let parsed = Url::parse(url).map_err(|e| e.to_string())?;
    if parsed.cannot_be_a_base() || !parsed.has_host() {
        return Err("URL must be absolute with a scheme and an authority".into());
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use serde_json::json;
    use test_case::test_case;

    fn reason(result: Result<ValidatedSpec>) -> String {
        match result {
            Err(Error::InvalidSpec { reason, .. }) => reason,
            other => panic!("expected InvalidSpec, got {other:?}"),
        }
    }

    #[test]
    fn valid_spec() -> eyre::Result<()> {
        let tree = json!({
            "url": "https://example.com/users?page=1",
            "method": "patch",
            "headers": {"Accept": "application/json"},
            "body": [{"a": 1}],
            "expectedStatusCode": 200,
            "excludedBodyFields": ["id"]
        });
        let validated = validate(tree.clone())?;
        assert_eq!(validated.url, "https://example.com/users?page=1");
        assert_eq!(validated.method, "PATCH");
        assert_eq!(validated.tree, tree);
        Ok(())
    }

    #[test_case(json!([{"url": "https://x"}]), "root must be an object"; "array root")]
    #[test_case(json!("https://x"), "root must be an object"; "scalar root")]
    #[test_case(json!({"method": "GET"}), "'url'"; "missing url")]
    #[test_case(json!({"url": "https://x"}), "'method'"; "missing method")]
    #[test_case(json!({"url": null, "method": "GET"}), "'url'"; "null url")]
    #[test_case(json!({"url": "  ", "method": "GET"}), "'url'"; "blank url")]
    #[test_case(json!({"url": "https://x", "method": ""}), "'method'"; "blank method")]
    #[test_case(json!({"url": "https://x", "method": "HEAD"}), "unsupported HTTP method"; "head")]
    #[test_case(json!({"url": "https://x", "method": "FETCH"}), "unsupported HTTP method"; "unknown method")]
    #[test_case(json!({"url": "/users/1", "method": "GET"}), "invalid URL"; "relative path")]
    #[test_case(json!({"url": "example.com/users", "method": "GET"}), "invalid URL"; "missing scheme")]
    #[test_case(json!({"url": "mailto:someone@example.com", "method": "GET"}), "invalid URL"; "no authority")]
    #[test_case(json!({"url": "https://x", "method": "GET", "headers": ["a"]}), "'headers' must be an object"; "headers array")]
    #[test_case(json!({"url": "https://x", "method": "GET", "headers": {"X-Id": 1}}), "'X-Id' must be a string"; "numeric header")]
    #[test_case(json!({"url": "https://x", "method": "GET", "expectedStatusCode": "200"}), "'expectedStatusCode' must be a number"; "textual status")]
    #[test_case(json!({"url": "https://x", "method": "GET", "body": "raw"}), "'body' must be an object or array"; "scalar body")]
    #[test_case(json!({"url": "https://x", "method": "GET", "excludedBodyFields": "id"}), "'excludedBodyFields' must be an array"; "excluded fields scalar")]
    fn rejects(tree: Value, expected: &str) {
        let reason = reason(validate(tree));
        assert!(reason.contains(expected), "{reason:?} should contain {expected:?}");
    }

    #[test]
    fn method_is_checked_before_url() {
        let reason = reason(validate(json!({"url": "relative", "method": "TRACE"})));
        assert!(reason.contains("unsupported HTTP method"));
    }
}
