use reqwest::header::RETRY_AFTER;
use reqwest::Proxy;
use serde_json::Value;
use std::env;
use std::time::Duration;

use crate::{Error, ErrorContext, Result};

/// Why an HTTP exchange with a backend did not produce a JSON body.
#[derive(Debug, thiserror::Error)]
pub enum HttpFailure {
    #[error("request timed out")]
    Timeout,

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after_ms: Option<u64>,
    },

    #[error("malformed response body: {0}")]
    Decode(String),

    #[error("invalid request: {0}")]
    Invalid(String),
}

impl From<reqwest::Error> for HttpFailure {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpFailure::Timeout
        } else if e.is_connect() {
            HttpFailure::Connect(e.to_string())
        } else if e.is_decode() {
            HttpFailure::Decode(e.to_string())
        } else if e.is_builder() {
            HttpFailure::Invalid(e.to_string())
        } else {
            HttpFailure::Network(e.to_string())
        }
    }
}

const PROXY_ENV: &str = "BUG_ORACLE_PROXY_URL";

/// Proxy for every request, if one is configured. A value that does not
/// parse is rejected rather than silently bypassed.
fn proxy_from(value: Option<&str>) -> Result<Option<Proxy>> {
    let Some(url) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return Ok(None);
    };
    Proxy::all(url).map(Some).map_err(|e| {
        Error::configuration_with_context(
            format!("invalid proxy URL '{}'", url),
            ErrorContext::new()
                .with_field_path(PROXY_ENV)
                .with_details(e.to_string())
                .with_source("http_transport"),
        )
    })
}

/// JSON-over-HTTP client for one backend base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(
                env::var("BUG_ORACLE_HTTP_POOL_MAX_IDLE_PER_HOST")
                    .ok()
                    .and_then(|s| s.parse::<usize>().ok())
                    .unwrap_or(8),
            )
            .pool_idle_timeout(Some(Duration::from_secs(90)));

        if let Some(proxy) = proxy_from(env::var(PROXY_ENV).ok().as_deref())? {
            builder = builder.proxy(proxy);
        }

        let client = builder.build().map_err(|e| {
            Error::configuration_with_context(
                "failed to build HTTP client",
                ErrorContext::new()
                    .with_details(e.to_string())
                    .with_source("http_transport"),
            )
        })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POSTs `body` to `base_url + path` and decodes a JSON reply.
    ///
    /// Non-2xx statuses come back as [`HttpFailure::Status`] with the raw body
    /// and any `Retry-After` (seconds) converted to milliseconds.
    pub async fn post_json(
        &self,
        path: &str,
        headers: &[(String, String)],
        body: &Value,
    ) -> std::result::Result<Value, HttpFailure> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.post(&url).json(body);
        for (k, v) in headers {
            request = request.header(k.as_str(), v.as_str());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let retry_after_ms = response
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let body = response.text().await.unwrap_or_default();
            return Err(HttpFailure::Status {
                status: status.as_u16(),
                body,
                retry_after_ms,
            });
        }

        let text = response.text().await?;
        serde_json::from_str(&text).map_err(|e| HttpFailure::Decode(e.to_string()))
    }
}

/// `Retry-After` as delta-seconds (fractions allowed). HTTP dates are ignored.
fn parse_retry_after(value: &str) -> Option<u64> {
    let secs: f64 = value.trim().parse().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some((secs * 1000.0).round() as u64)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("2"), Some(2000));
        assert_eq!(parse_retry_after(" 0.5 "), Some(500));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
        assert_eq!(parse_retry_after("-1"), None);
    }

    #[test]
    fn test_proxy_setting() {
        assert!(proxy_from(None).unwrap().is_none());
        assert!(proxy_from(Some("  ")).unwrap().is_none());
        assert!(proxy_from(Some("http://proxy.internal:3128")).unwrap().is_some());

        let err = proxy_from(Some("http://[broken")).unwrap_err();
        assert_eq!(err.kind(), "configuration");
        assert!(err.to_string().contains(PROXY_ENV));
    }

    #[tokio::test]
    async fn test_post_json_success_and_headers() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/echo")
            .match_header("x-test", "yes")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true}"#)
            .create_async()
            .await;

        let transport =
            HttpTransport::new(&format!("{}/v1/", server.url()), Duration::from_secs(5)).unwrap();
        let out = transport
            .post_json("/echo", &[("x-test".into(), "yes".into())], &json!({"a": 1}))
            .await
            .unwrap();
        assert_eq!(out, json!({"ok": true}));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_post_json_status_failure_carries_retry_after() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/x")
            .with_status(429)
            .with_header("retry-after", "3")
            .with_body(r#"{"error":{"code":"rate_limit_exceeded"}}"#)
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
        match transport.post_json("/x", &[], &json!({})).await {
            Err(HttpFailure::Status {
                status,
                body,
                retry_after_ms,
            }) => {
                assert_eq!(status, 429);
                assert!(body.contains("rate_limit_exceeded"));
                assert_eq!(retry_after_ms, Some(3000));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_post_json_non_json_body_is_decode_failure() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/x")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let transport = HttpTransport::new(&server.url(), Duration::from_secs(5)).unwrap();
        let err = transport.post_json("/x", &[], &json!({})).await.unwrap_err();
        assert!(matches!(err, HttpFailure::Decode(_)));
    }
}
