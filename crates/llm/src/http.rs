//! Transport shared by the adapters.

use std::time::Duration;

use pipeline::GatewayError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Error bodies are truncated to this many characters in messages.
const MAX_ERROR_BODY: usize = 500;

pub(crate) fn client() -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .user_agent(concat!("crewforge/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| GatewayError::Configuration(format!("failed to build HTTP client: {}", e)))
}

/// Sends `request` and decodes a successful JSON body as `T`.
pub(crate) async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, GatewayError> {
    let response = request
        .send()
        .await
        .map_err(|e| GatewayError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        let retry_after = retry_after(response.headers());
        let body = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Provider returned an error status");
        return Err(error_for_status(status, retry_after, &body));
    }

    let body = response
        .text()
        .await
        .map_err(|e| GatewayError::Network(e.to_string()))?;
    serde_json::from_str(&body).map_err(|e| GatewayError::Provider {
        message: format!("failed to parse response: {}", e),
        transient: false,
        consumed: None,
    })
}

/// Maps a non-success HTTP status to a [`GatewayError`].
pub(crate) fn error_for_status(status: StatusCode, retry_after: Option<Duration>, body: &str) -> GatewayError {
    let detail: String = body.chars().take(MAX_ERROR_BODY).collect();
    match status.as_u16() {
        401 | 403 => GatewayError::Authentication(detail),
        429 => GatewayError::RateLimited { retry_after },
        code => GatewayError::Provider {
            message: format!("HTTP {}: {}", code, detail),
            transient: status.is_server_error(),
            consumed: None,
        },
    }
}

/// Reads a `Retry-After` header given in seconds.
pub(crate) fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|secs| secs.is_finite() && *secs >= 0.0)
        .map(Duration::from_secs_f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pipeline::RetryPolicy;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_status_mapping() {
        assert!(matches!(
            error_for_status(StatusCode::UNAUTHORIZED, None, "bad key"),
            GatewayError::Authentication(_)
        ));
        assert!(matches!(
            error_for_status(StatusCode::FORBIDDEN, None, ""),
            GatewayError::Authentication(_)
        ));

        let throttled = error_for_status(StatusCode::TOO_MANY_REQUESTS, Some(Duration::from_secs(7)), "");
        assert_eq!(
            throttled.retry_policy(),
            RetryPolicy::Retryable {
                after: Some(Duration::from_secs(7))
            }
        );

        let overloaded = error_for_status(StatusCode::from_u16(529).unwrap(), None, "overloaded");
        assert!(overloaded.retry_policy().is_retryable());

        let bad_request = error_for_status(StatusCode::BAD_REQUEST, None, "max_tokens too large");
        assert_eq!(bad_request.retry_policy(), RetryPolicy::NonRetryable);
        assert!(bad_request.to_string().contains("HTTP 400"));
    }

    #[test]
    fn test_retry_after_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, HeaderValue::from_static("12"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(12)));
        headers.insert(RETRY_AFTER, HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_long_error_bodies_are_truncated() {
        let body = "x".repeat(2000);
        let err = error_for_status(StatusCode::BAD_REQUEST, None, &body);
        assert!(err.to_string().len() < 600);
    }
}
