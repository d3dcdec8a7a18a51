use crate::config::{ApiConfig, RetryConfig};
use crate::error::ApiError;
use reqwest::{header, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Fixed-delay retry schedule used by the paginated fetch path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Single attempt, no waiting
    #[must_use]
    pub const fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.delay_seconds))
    }
}

/// Why a retried call gave up
#[derive(Debug)]
pub enum RetryOutcome {
    Failed(ApiError),
    Cancelled,
}

/// HTTP transport for the CRM API.
///
/// Every request carries the bearer token and a JSON content type. Any
/// non-2xx response or network failure becomes an [`ApiError`].
#[derive(Debug, Clone)]
pub struct RateLimitedTransport {
    client: Client,
    base_url: String,
}

impl RateLimitedTransport {
    /// Creates a transport bound to one token and base URL
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The token is missing
    /// - The token contains characters not allowed in a header
    /// - The HTTP client cannot be built
    pub fn new(config: &ApiConfig) -> anyhow::Result<Self> {
        let token = config
            .token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("API token is required"))?;

        let mut auth = header::HeaderValue::from_str(&format!("Bearer {token}"))?;
        auth.set_sensitive(true);

        let mut headers = header::HeaderMap::new();
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(
            header::CONTENT_TYPE,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<(StatusCode, String), ApiError> {
        let url = format!("{}{path}", self.base_url);
        debug!(%method, %url, "API request");

        let mut request = self.client.request(method, &url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            return Err(ApiError::http(status.as_u16(), text));
        }
        Ok((status, text))
    }

    /// Issues one request. `path` may carry a query string.
    ///
    /// An empty success body (e.g. `204 No Content`) yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] for non-2xx statuses, network failures and
    /// success bodies that are not JSON.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let (status, text) = self.send(method, path, body).await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text)
            .map_err(|e| ApiError::http(status.as_u16(), format!("invalid JSON body: {e}")))
    }

    /// Issues one request judged by status alone; the body is discarded
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] for non-2xx statuses and network failures.
    pub async fn execute_status(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<StatusCode, ApiError> {
        let (status, _) = self.send(method, path, body).await?;
        Ok(status)
    }

    /// Issues a request and decodes its body as `T`, retrying any failure on
    /// a fixed delay. A body that does not decode counts as a failed attempt.
    ///
    /// Cancellation is honoured between attempts and while waiting.
    ///
    /// # Errors
    ///
    /// Returns [`RetryOutcome::Failed`] with the last error once the first
    /// attempt and every retry have failed, or [`RetryOutcome::Cancelled`] if the token fires first.
    pub async fn execute_with_retry<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        policy: &RetryPolicy,
        cancel: &CancellationToken,
    ) -> Result<T, RetryOutcome> {
        let mut attempt: u32 = 1;
        loop {
            if cancel.is_cancelled() {
                return Err(RetryOutcome::Cancelled);
            }
            let attempted = self
                .execute(method.clone(), path, body)
                .await
                .and_then(decode::<T>);
            match attempted {
                Ok(value) => return Ok(value),
                Err(err) if attempt > policy.max_retries => {
                    warn!(attempt, error = %err, "Giving up after final attempt");
                    return Err(RetryOutcome::Failed(err));
                }
                Err(err) => {
                    warn!(
                        attempt,
                        max_retries = policy.max_retries,
                        delay_secs = policy.delay.as_secs(),
                        error = %err,
                        "Request failed, retrying"
                    );
                }
            }
            attempt += 1;
            if !sleep_or_cancel(policy.delay, cancel).await {
                return Err(RetryOutcome::Cancelled);
            }
        }
    }
}

/// Decodes a JSON body into `T`. A shape mismatch carries no status.
pub(crate) fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::network(format!("unexpected response: {e}")))
}

/// Sleeps for `duration`; returns `false` if cancelled first
pub async fn sleep_or_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    if duration.is_zero() {
        return !cancel.is_cancelled();
    }
    tokio::select! {
        () = tokio::time::sleep(duration) => true,
        () = cancel.cancelled() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn transport_for(server: &MockServer) -> RateLimitedTransport {
        RateLimitedTransport::new(&ApiConfig {
            token: Some("pat-test".to_string()),
            base_url: server.uri(),
            timeout_seconds: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_attaches_bearer_and_content_type() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("authorization", "Bearer pat-test"))
            .and(header("content-type", "application/json"))
            .and(body_json(json!({"a": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .expect(1)
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let value = transport
            .execute(Method::POST, "/echo", Some(&json!({"a": 1})))
            .await
            .unwrap();
        assert_eq!(value, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_no_content_is_null() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let value = transport_for(&server)
            .execute(Method::POST, "/archive", None)
            .await
            .unwrap();
        assert_eq!(value, Value::Null);
    }

    #[tokio::test]
    async fn test_status_only_call_ignores_text_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
            .mount(&server)
            .await;

        let transport = transport_for(&server);
        let status = transport
            .execute_status(Method::POST, "/archive", Some(&json!({"inputs": []})))
            .await
            .unwrap();
        assert_eq!(status.as_u16(), 200);

        // the decoding call still rejects the same body
        let err = transport
            .execute(Method::POST, "/archive", None)
            .await
            .unwrap_err();
        assert!(err.message.contains("invalid JSON body"));
    }

    #[tokio::test]
    async fn test_undecodable_body_is_retried() {
        #[derive(Debug, serde::Deserialize)]
        struct Listing {
            results: Vec<Value>,
        }

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
            .up_to_n_times(1)
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [1, 2]})))
            .expect(1)
            .mount(&server)
            .await;

        let policy = RetryPolicy::new(2, Duration::ZERO);
        let listing: Listing = transport_for(&server)
            .execute_with_retry(Method::GET, "/x", None, &policy, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(listing.results.len(), 2);
    }

    #[tokio::test]
    async fn test_non_success_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = transport_for(&server)
            .execute(Method::GET, "/x", None)
            .await
            .unwrap_err();
        assert_eq!(err.status, Some(429));
        assert_eq!(err.message, "slow down");
    }

    #[tokio::test]
    async fn test_network_failure_has_no_status() {
        let transport = RateLimitedTransport::new(&ApiConfig {
            token: Some("t".to_string()),
            base_url: "http://127.0.0.1:1".to_string(),
            timeout_seconds: 2,
        })
        .unwrap();
        let err = transport.execute(Method::GET, "/", None).await.unwrap_err();
        assert_eq!(err.status, None);
    }

    #[tokio::test]
    async fn test_retry_exhausts_attempts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(502))
            .expect(4)
            .mount(&server)
            .await;

        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let outcome = transport_for(&server)
            .execute_with_retry::<Value>(
                Method::GET,
                "/x",
                None,
                &policy,
                &CancellationToken::new(),
            )
            .await;
        match outcome {
            Err(RetryOutcome::Failed(err)) => assert_eq!(err.status, Some(502)),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": []})))
            .mount(&server)
            .await;

        let policy = RetryPolicy::new(3, Duration::from_millis(5));
        let value: Value = transport_for(&server)
            .execute_with_retry(
                Method::GET,
                "/x",
                None,
                &policy,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(value, json!({"results": []}));
    }

    #[tokio::test]
    async fn test_retry_stops_when_cancelled() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let policy = RetryPolicy::new(3, Duration::from_secs(30));
        let transport = transport_for(&server);
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let outcome = transport
            .execute_with_retry::<Value>(Method::GET, "/x", None, &policy, &cancel)
            .await;
        assert!(matches!(outcome, Err(RetryOutcome::Cancelled)));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_retries: 1,
            delay_seconds: 2,
        });
        assert_eq!(policy.max_retries, 1);
        assert_eq!(policy.delay, Duration::from_secs(2));
        assert_eq!(RetryPolicy::default().max_retries, 3);
        assert_eq!(RetryPolicy::none().max_retries, 0);
    }
}
