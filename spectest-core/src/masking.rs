//! Hides credentials that specifications carry in URLs and headers before they
//! reach the logs.

use reqwest::header::{HeaderMap, HeaderValue};
use std::sync::atomic::{AtomicBool, Ordering};
use url::Url;

const MASK: &str = "*****";

static MASK_SENSITIVE: AtomicBool = AtomicBool::new(true);

/// Query parameter names whose values are masked, compared case-insensitively.
const SENSITIVE_QUERY_PARAMS: &[&str] = &[
    "access_token",
    "api_key",
    "apikey",
    "token",
    "secret",
    "password",
    "key",
    "auth",
];

/// Header names whose values are masked, compared case-insensitively.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "x-api-key", "x-auth-token", "cookie"];

/// Turn masking on or off for the whole process. On by default.
pub fn set_mask_sensitive(enabled: bool) {
    MASK_SENSITIVE.store(enabled, Ordering::Relaxed);
}

pub fn should_mask_sensitive() -> bool {
    MASK_SENSITIVE.load(Ordering::Relaxed)
}

fn is_sensitive(list: &[&str], name: &str) -> bool {
    list.iter().any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Copy of `url` with sensitive query values replaced.
///
/// The raw query string is rewritten pair by pair so the encoding of the other
/// parameters is left untouched.
///
/// ```
/// use url::Url;
/// use spectest_core::masking::mask_url;
///
/// let url = Url::parse("https://api.example.com/orders?api_key=s3cr3t&page=2").unwrap();
/// assert_eq!(
///     mask_url(&url).as_str(),
///     "https://api.example.com/orders?api_key=*****&page=2"
/// );
/// ```
pub fn mask_url(url: &Url) -> Url {
    let mut masked = url.clone();
    let Some(query) = url.query() else {
        return masked;
    };

    let query = query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((name, _)) if is_sensitive(SENSITIVE_QUERY_PARAMS, name) => {
                format!("{name}={MASK}")
            }
            _ => pair.to_string(),
        })
        .collect::<Vec<_>>()
        .join("&");

    masked.set_query(Some(&query));
    masked
}

/// Copy of `headers` with sensitive values replaced. Repeated headers are kept.
pub fn mask_headers(headers: &HeaderMap) -> HeaderMap {
    let mut masked = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value = if is_sensitive(SENSITIVE_HEADERS, name.as_str()) {
            HeaderValue::from_static(MASK)
        } else {
            value.clone()
        };
        masked.append(name.clone(), value);
    }
    masked
}

#[cfg(test)]
mod test {
    use super::*;
    use test_case::test_case;

    #[test_case(
        "https://api.example.com/users?access_token=secret123&name=john",
        "https://api.example.com/users?access_token=*****&name=john";
        "single sensitive param"
    )]
    #[test_case(
        "https://api.example.com/?API_KEY=k&token=one&token=two",
        "https://api.example.com/?API_KEY=*****&token=*****&token=*****";
        "case insensitive and repeated"
    )]
    #[test_case(
        "https://api.example.com/?secret=a%2Bb&q=john%20doe&flag",
        "https://api.example.com/?secret=*****&q=john%20doe&flag";
        "encoding preserved"
    )]
    #[test_case(
        "https://api.example.com/users",
        "https://api.example.com/users";
        "no query"
    )]
    fn masks_url(input: &str, expected: &str) -> eyre::Result<()> {
        assert_eq!(mask_url(&Url::parse(input)?).as_str(), expected);
        Ok(())
    }

    #[test]
    fn masks_headers() -> eyre::Result<()> {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer secret".parse()?);
        headers.insert("x-api-key", "k".parse()?);
        headers.append("accept", "application/json".parse()?);
        headers.append("accept", "text/plain".parse()?);

        let masked = mask_headers(&headers);
        assert_eq!(masked.get("authorization").map(|v| v.as_bytes()), Some(MASK.as_bytes()));
        assert_eq!(masked.get("x-api-key").map(|v| v.as_bytes()), Some(MASK.as_bytes()));
        assert_eq!(masked.get_all("accept").iter().count(), 2);
        Ok(())
    }
}
