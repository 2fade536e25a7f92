//! Structured logging with correlation tracking for budget API requests
//!
//! Every logical request gets a correlation id. Events are logged as single
//! JSON lines so they can be grepped and parsed.

use super::config::{LogLevel, MonitoringConfig};
use crate::api::auth::mask_token;
use crate::api::error::ApiError;
use log::{debug, error, info, warn};
use serde_json::json;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

/// Structured logger for API operations with correlation tracking
#[derive(Debug, Clone)]
pub struct ApiLogger {
    config: MonitoringConfig,
}

/// Context for a single logical request
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// Unique correlation ID, also sent as `X-Correlation-ID`
    pub correlation_id: String,
    /// HTTP verb
    pub method: String,
    /// Resource collection the request targets (`accounts`, `transactions`, ...)
    pub resource: String,
    pub start_time: Instant,
}

/// Outcome of a logical request
#[derive(Debug, Clone)]
pub struct OperationMetrics {
    pub duration: Duration,
    /// Network attempts made, 0 when the request never left the limiter
    pub attempts: u32,
    pub success: bool,
    pub status_code: Option<u16>,
    pub error: Option<ApiError>,
    /// Time spent waiting on the local quota
    pub rate_limit_delay: Duration,
}

impl ApiLogger {
    pub fn new(config: MonitoringConfig) -> Self {
        Self { config }
    }

    /// Start tracking a new operation
    pub fn start_operation(&self, method: &str, resource: &str) -> OperationContext {
        let context = OperationContext {
            correlation_id: uuid::Uuid::new_v4().to_string(),
            method: method.to_string(),
            resource: resource.to_string(),
            start_time: Instant::now(),
        };

        if self.config.request_logging && self.should_log(LogLevel::Debug) {
            let log_data = json!({
                "event": "operation_started",
                "correlation_id": context.correlation_id,
                "method": context.method,
                "resource": context.resource,
                "timestamp": chrono::Utc::now().to_rfc3339()
            });

            debug!("API Operation Started: {}", log_data);
        }

        context
    }

    /// Log HTTP request details
    pub fn log_request(&self, context: &OperationContext, url: &str, headers: &HashMap<String, String>, attempt: u32) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_request",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "url": url,
            "attempt": attempt,
            "headers": sanitize_headers(headers),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        debug!("HTTP Request: {}", log_data);
    }

    /// Log HTTP response details
    pub fn log_response(&self, context: &OperationContext, status_code: u16, duration: Duration) {
        if !self.config.request_logging || !self.should_log(LogLevel::Debug) {
            return;
        }

        let log_data = json!({
            "event": "http_response",
            "correlation_id": context.correlation_id,
            "resource": context.resource,
            "status_code": status_code,
            "duration_ms": duration.as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if status_code >= 400 {
            warn!("HTTP Response (Error): {}", log_data);
        } else {
            debug!("HTTP Response: {}", log_data);
        }
    }

    pub fn log_retry(&self, context: &OperationContext, attempt: u32) {
        if !self.should_log(LogLevel::Info) {
            return;
        }

        let log_data = json!({
            "event": "retry_attempt",
            "correlation_id": context.correlation_id,
            "resource": context.resource,
            "attempt": attempt,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        info!("Retrying: {}", log_data);
    }

    /// Log a local quota rejection or wait
    pub fn log_rate_limit(&self, context: &OperationContext, wait: Duration, waiting: bool) {
        if !self.should_log(LogLevel::Info) {
            return;
        }

        let log_data = json!({
            "event": "rate_limited",
            "correlation_id": context.correlation_id,
            "resource": context.resource,
            "wait_ms": wait.as_millis(),
            "waiting": waiting,
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        info!("Rate Limited: {}", log_data);
    }

    /// Complete an operation and log its outcome
    pub fn complete_operation(&self, context: &OperationContext, metrics: &OperationMetrics) {
        if !self.config.performance_metrics {
            return;
        }

        let log_data = json!({
            "event": "operation_completed",
            "correlation_id": context.correlation_id,
            "method": context.method,
            "resource": context.resource,
            "duration_ms": metrics.duration.as_millis(),
            "attempts": metrics.attempts,
            "success": metrics.success,
            "status_code": metrics.status_code,
            "error_kind": metrics.error.as_ref().map(|e| e.kind()),
            "error_message": metrics.error.as_ref().map(|e| e.message().to_string()),
            "rate_limit_delay_ms": metrics.rate_limit_delay.as_millis(),
            "timestamp": chrono::Utc::now().to_rfc3339()
        });

        if metrics.success {
            if self.should_log(LogLevel::Info) {
                info!("API Operation Completed: {}", log_data);
            }
        } else if self.should_log(LogLevel::Error) {
            error!("API Operation Failed: {}", log_data);
        }
    }

    fn should_log(&self, level: LogLevel) -> bool {
        level <= self.config.log_level
    }
}

/// Mask credentials before headers reach the log
pub fn sanitize_headers(headers: &HashMap<String, String>) -> HashMap<String, String> {
    headers
        .iter()
        .map(|(key, value)| {
            let key_lower = key.to_lowercase();
            let value = if key_lower == "authorization" {
                match value.strip_prefix("Bearer ") {
                    Some(token) => format!("Bearer {}", mask_token(token)),
                    None => mask_token(value),
                }
            } else if key_lower.contains("token") || key_lower.contains("key") {
                "[REDACTED]".to_string()
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

impl OperationContext {
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create metrics from this context
    pub fn create_metrics(&self, attempts: u32, result: Result<u16, &ApiError>) -> OperationMetrics {
        let (success, status_code, error) = match result {
            Ok(status) => (true, Some(status), None),
            Err(error) => (false, error.status(), Some(error.clone())),
        };

        OperationMetrics {
            duration: self.elapsed(),
            attempts,
            success,
            status_code,
            error,
            rate_limit_delay: Duration::ZERO,
        }
    }
}

impl OperationMetrics {
    /// Retries made on top of the first attempt
    pub fn retries(&self) -> u32 {
        self.attempts.saturating_sub(1)
    }

    pub fn is_slow(&self, threshold: Duration) -> bool {
        self.duration > threshold
    }
}
