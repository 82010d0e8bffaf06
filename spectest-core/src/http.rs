/// spectest's HTTP client collaborator. `HttpClient` is the seam the dispatcher talks to;
/// `Client` implements it on top of `reqwest::Client`.
/// * no implicit retry: a transport failure is returned as is
/// * request and response are logged with sensitive values masked
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use tracing::*;

use crate::masking;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HttpError: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Everything needed to issue one request.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: reqwest::Method,
    pub url: reqwest::Url,
    /// Header pairs in specification order, sent verbatim.
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub content_type: Option<String>,
}

/// Raw response as received from the target endpoint.
#[derive(Debug, Clone, Default)]
pub struct Response {
    pub status: u16,
    /// Declared `Content-Type` header, if any.
    pub content_type: Option<String>,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl Response {
    pub fn status(&self) -> u16 {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Body decoded as UTF-8, lossily.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    async fn from(res: reqwest::Response) -> Result<Self, Error> {
        let status = res.status().as_u16();
        let headers = res.headers().clone();
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = res.bytes().await?.to_vec();
        Ok(Response {
            status,
            content_type,
            headers,
            body,
        })
    }
}

/// Sends one request and returns the raw response.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    async fn send(&self, request: Request) -> Result<Response, Error>;
}

/// spectest's default http client.
#[derive(Clone, Default)]
pub struct Client {
    pub(crate) inner: reqwest::Client,
}

impl Client {
    /// Construct spectest's HTTP client.
    pub fn new() -> Client {
        Client::default()
    }

    /// Construct a client that gives up on a request after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Client, Error> {
        let inner = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Client { inner })
    }
}

#[async_trait::async_trait]
impl HttpClient for Client {
    async fn send(&self, request: Request) -> Result<Response, Error> {
        let Request {
            method,
            url,
            headers,
            body,
            content_type,
        } = request;

        let mut header_map = HeaderMap::with_capacity(headers.len() + 1);
        for (name, value) in &headers {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::InvalidRequest(format!("header name '{name}': {e}")))?;
            let value = HeaderValue::try_from(value.as_str())
                .map_err(|e| Error::InvalidRequest(format!("header value for '{name}': {e}")))?;
            header_map.append(name, value);
        }
        // the body's own content type wins over one given in the header list
        if let Some(content_type) = content_type {
            let value = HeaderValue::try_from(content_type)
                .map_err(|e| Error::InvalidRequest(format!("content type: {e}")))?;
            header_map.insert(CONTENT_TYPE, value);
        }

        let mut builder = self
            .inner
            .request(method.clone(), url.clone())
            .headers(header_map);
        if let Some(body) = body {
            builder = builder.body(body);
        }
        let req = builder.build()?;

        if masking::should_mask_sensitive() {
            debug!(
                "Requesting {method} {} headers={:?}",
                masking::mask_url(&url),
                masking::mask_headers(req.headers())
            );
        } else {
            debug!("Requesting {method} {url} headers={:?}", req.headers());
        }

        match self.inner.execute(req).await {
            Ok(res) => {
                let res = Response::from(res).await?;
                debug!(
                    "Received {} from {} ({} bytes)",
                    res.status,
                    masking::mask_url(&url),
                    res.body.len()
                );
                Ok(res)
            }
            Err(e) => {
                warn!("request to {} failed: {e}", masking::mask_url(&url));
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn request(url: &str) -> eyre::Result<Request> {
        Ok(Request {
            method: reqwest::Method::POST,
            url: url.parse()?,
            headers: vec![("X-Trace".into(), "abc".into())],
            body: Some(br#"{"a":1}"#.to_vec()),
            content_type: Some("application/json".into()),
        })
    }

    #[tokio::test]
    async fn sends_headers_and_body() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/users")
            .match_header("x-trace", "abc")
            .match_header("content-type", "application/json")
            .match_body(r#"{"a":1}"#)
            .with_status(201)
            .with_header("content-type", "application/json; charset=utf-8")
            .with_body(r#"{"id":1}"#)
            .create_async()
            .await;

        let res = Client::new()
            .send(request(&format!("{}/users", server.url()))?)
            .await?;

        mock.assert_async().await;
        assert_eq!(res.status(), 201);
        assert_eq!(
            res.content_type.as_deref(),
            Some("application/json; charset=utf-8")
        );
        assert_eq!(res.text(), r#"{"id":1}"#);
        Ok(())
    }

    #[tokio::test]
    async fn transport_failure_is_an_error() -> eyre::Result<()> {
        // nothing listens on port 9 of the loopback interface
        let result = Client::new().send(request("http://127.0.0.1:9/")?).await;
        assert!(matches!(result, Err(Error::Http(_))));
        Ok(())
    }
}
