//! Turns a validated specification into an HTTP request and the response into a
//! canonical tree.

use serde_json::Value;
use tracing::*;

use crate::{
    format::Format,
    http::{self, HttpClient, Request, Response},
    normalize,
    validate::{ValidatedSpec, BODY, HEADERS},
};

/// Issue the request described by `spec`.
///
/// A `body` is written in the specification's own `format` and sent with that
/// format's media type. The response body comes back both raw and as a canonical
/// tree.
pub async fn execute(
    client: &dyn HttpClient,
    spec: &ValidatedSpec,
    format: Format,
) -> Result<(Response, Value), http::Error> {
    let request = build_request(spec, format)?;
    debug!("dispatching {} {}", request.method, crate::masking::mask_url(&request.url));

    let response = client.send(request).await?;
    let body = canonical_body(&response);
    Ok((response, body))
}

fn build_request(spec: &ValidatedSpec, format: Format) -> Result<Request, http::Error> {
    let url = reqwest::Url::parse(&spec.url)
        .map_err(|e| http::Error::InvalidRequest(format!("url '{}': {e}", spec.url)))?;

    let headers = spec
        .tree
        .get(HEADERS)
        .and_then(Value::as_object)
        .map(|headers| {
            headers
                .iter()
                .filter_map(|(name, value)| Some((name.clone(), value.as_str()?.to_string())))
                .collect()
        })
        .unwrap_or_default();

    let (body, content_type) = match spec.tree.get(BODY) {
        Some(body) => {
            let encoded = normalize::serialize(body, format)
                .map_err(|e| http::Error::InvalidRequest(e.to_string()))?;
            (Some(encoded), Some(format.media_type().to_string()))
        }
        None => (None, None),
    };

    Ok(Request {
        method: method_of(&spec.method),
        url,
        headers,
        body,
        content_type,
    })
}

/// Unknown method names fall back to GET.
fn method_of(method: &str) -> reqwest::Method {
    match method.to_ascii_uppercase().as_str() {
        "POST" => reqwest::Method::POST,
        "PUT" => reqwest::Method::PUT,
        "PATCH" => reqwest::Method::PATCH,
        "DELETE" => reqwest::Method::DELETE,
        _ => reqwest::Method::GET,
    }
}

/// Canonical view of a response body. Empty bodies are `null`; bodies in no
/// recognizable format are kept as a single string.
pub fn canonical_body(response: &Response) -> Value {
    let text = response.text();
    if text.trim().is_empty() {
        return Value::Null;
    }
    match normalize::normalize_auto(&text) {
        Ok(tree) => tree,
        Err(e) => {
            debug!("response body kept as text: {e}");
            Value::String(text)
        }
    }
}
