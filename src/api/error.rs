//! Typed error taxonomy for budget API calls
//!
//! Every failure leaving the dispatcher is an [`ApiError`] tagged with exactly one
//! [`ApiErrorKind`]. Retry decisions are made on the kind alone, never on message text.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;

/// Closed set of failure categories surfaced by the client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiErrorKind {
    /// 401/403: bad or revoked token
    AuthError,
    /// 400/422 or a response body that does not match the expected shape
    ValidationError,
    /// 404
    NotFoundError,
    /// 409, e.g. a duplicate name
    ConflictError,
    /// 429 from the server or local quota exhaustion
    RateLimitExceeded,
    /// 5xx, 408, timeouts and connection failures
    TransientError,
    /// Anything unclassified
    UnknownError,
}

impl ApiErrorKind {
    /// Whether an error of this kind may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiErrorKind::RateLimitExceeded | ApiErrorKind::TransientError)
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ApiErrorKind::AuthError,
            400 | 422 => ApiErrorKind::ValidationError,
            404 => ApiErrorKind::NotFoundError,
            409 => ApiErrorKind::ConflictError,
            429 => ApiErrorKind::RateLimitExceeded,
            408 | 500..=599 => ApiErrorKind::TransientError,
            _ => ApiErrorKind::UnknownError,
        }
    }
}

impl fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ApiErrorKind::AuthError => "AuthError",
            ApiErrorKind::ValidationError => "ValidationError",
            ApiErrorKind::NotFoundError => "NotFoundError",
            ApiErrorKind::ConflictError => "ConflictError",
            ApiErrorKind::RateLimitExceeded => "RateLimitExceeded",
            ApiErrorKind::TransientError => "TransientError",
            ApiErrorKind::UnknownError => "UnknownError",
        };
        f.write_str(name)
    }
}

/// A classified API failure. Immutable once created apart from facade remediation text.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind}: {message}{}", remediation_suffix(.remediation))]
pub struct ApiError {
    kind: ApiErrorKind,
    status: Option<u16>,
    message: String,
    retry_after: Option<Duration>,
    remediation: Option<String>,
}

impl ApiError {
    pub fn new(kind: ApiErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
            retry_after: None,
            remediation: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }

    /// Attach caller-facing guidance without changing the kind
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    /// Local quota exhaustion; `wait` is the time until the window resets
    pub fn quota_exhausted(wait: Duration) -> Self {
        Self::new(
            ApiErrorKind::RateLimitExceeded,
            format!("local request quota exhausted, window resets in {}ms", wait.as_millis()),
        )
        .with_retry_after(wait)
    }

    /// The body could not be decoded into the expected shape
    pub fn schema_mismatch(message: impl Into<String>) -> Self {
        Self::new(ApiErrorKind::ValidationError, message)
    }

    pub fn kind(&self) -> ApiErrorKind {
        self.kind
    }

    pub fn status(&self) -> Option<u16> {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn remediation(&self) -> Option<&str> {
        self.remediation.as_deref()
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Build an error from a non-success HTTP response.
    ///
    /// The service reports failures as `{"error": {"id": "404.2", "name": "...", "detail": "..."}}`;
    /// `detail` (or `name`) becomes the message when present.
    pub fn from_response_parts(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let kind = ApiErrorKind::from_status(status);
        let message = serde_json::from_str::<Value>(body)
            .ok()
            .and_then(|json| {
                let error = json.get("error")?;
                error
                    .get("detail")
                    .or_else(|| error.get("name"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            })
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    format!("HTTP {}", status)
                } else {
                    body.trim().to_string()
                }
            });

        let mut error = Self::new(kind, message).with_status(status);
        if kind == ApiErrorKind::RateLimitExceeded {
            error.retry_after = retry_after;
        }
        error
    }

    /// Classify a transport-level failure from reqwest
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        let kind = if error.is_timeout() || error.is_connect() || error.is_request() || error.is_body() {
            ApiErrorKind::TransientError
        } else if error.is_decode() {
            ApiErrorKind::ValidationError
        } else if let Some(status) = error.status() {
            ApiErrorKind::from_status(status.as_u16())
        } else {
            ApiErrorKind::UnknownError
        };

        let mut api_error = Self::new(kind, error.to_string());
        if let Some(status) = error.status() {
            api_error.status = Some(status.as_u16());
        }
        api_error
    }
}

fn remediation_suffix(remediation: &Option<String>) -> String {
    remediation
        .as_deref()
        .map(|r| format!(" ({})", r))
        .unwrap_or_default()
}

/// Parse a `Retry-After` header value given in whole seconds
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert_eq!(ApiErrorKind::from_status(401), ApiErrorKind::AuthError);
        assert_eq!(ApiErrorKind::from_status(403), ApiErrorKind::AuthError);
        assert_eq!(ApiErrorKind::from_status(400), ApiErrorKind::ValidationError);
        assert_eq!(ApiErrorKind::from_status(404), ApiErrorKind::NotFoundError);
        assert_eq!(ApiErrorKind::from_status(409), ApiErrorKind::ConflictError);
        assert_eq!(ApiErrorKind::from_status(429), ApiErrorKind::RateLimitExceeded);
        assert_eq!(ApiErrorKind::from_status(500), ApiErrorKind::TransientError);
        assert_eq!(ApiErrorKind::from_status(503), ApiErrorKind::TransientError);
        assert_eq!(ApiErrorKind::from_status(418), ApiErrorKind::UnknownError);
        assert_eq!(ApiErrorKind::from_status(302), ApiErrorKind::UnknownError);
    }

    #[test]
    fn test_retryable_kinds() {
        assert!(ApiErrorKind::TransientError.is_retryable());
        assert!(ApiErrorKind::RateLimitExceeded.is_retryable());

        assert!(!ApiErrorKind::AuthError.is_retryable());
        assert!(!ApiErrorKind::ValidationError.is_retryable());
        assert!(!ApiErrorKind::NotFoundError.is_retryable());
        assert!(!ApiErrorKind::ConflictError.is_retryable());
        assert!(!ApiErrorKind::UnknownError.is_retryable());
    }

    #[test]
    fn test_structured_error_body() {
        let body = r#"{"error":{"id":"404.2","name":"resource_not_found","detail":"Budget not found"}}"#;
        let error = ApiError::from_response_parts(404, body, None);

        assert_eq!(error.kind(), ApiErrorKind::NotFoundError);
        assert_eq!(error.status(), Some(404));
        assert_eq!(error.message(), "Budget not found");
        assert_eq!(error.to_string(), "NotFoundError: Budget not found");
    }

    #[test]
    fn test_retry_after_only_kept_for_rate_limits() {
        let limited = ApiError::from_response_parts(429, "", Some(Duration::from_secs(30)));
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(30)));
        assert_eq!(limited.message(), "HTTP 429");

        let server = ApiError::from_response_parts(503, "upstream down", Some(Duration::from_secs(30)));
        assert_eq!(server.retry_after(), None);
        assert_eq!(server.message(), "upstream down");
    }

    #[test]
    fn test_remediation_keeps_kind() {
        let error = ApiError::from_response_parts(409, "", None)
            .with_remediation("try a different payee name");

        assert_eq!(error.kind(), ApiErrorKind::ConflictError);
        assert_eq!(error.remediation(), Some("try a different payee name"));
        assert!(error.to_string().ends_with("(try a different payee name)"));
    }

    #[test]
    fn test_parse_retry_after() {
        assert_eq!(parse_retry_after("120"), Some(Duration::from_secs(120)));
        assert_eq!(parse_retry_after(" 5 "), Some(Duration::from_secs(5)));
        assert_eq!(parse_retry_after("Wed, 21 Oct 2015 07:28:00 GMT"), None);
    }

    #[test]
    fn test_quota_exhausted() {
        let error = ApiError::quota_exhausted(Duration::from_millis(1500));
        assert_eq!(error.kind(), ApiErrorKind::RateLimitExceeded);
        assert_eq!(error.retry_after(), Some(Duration::from_millis(1500)));
        assert_eq!(error.status(), None);
    }
}
