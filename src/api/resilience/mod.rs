//! Quota limiting, retries and monitoring
//!
//! Provides the fixed-window quota limiter, the retry policy and the
//! structured logging/metrics used by the dispatcher.

pub mod config;
pub mod logging;
pub mod metrics;
pub mod rate_limiter;
pub mod retry;

pub use config::{
    DEFAULT_CAPACITY, DEFAULT_WINDOW, ExhaustionPolicy, LogLevel, MonitoringConfig, RateLimitConfig, ResilienceConfig,
    ResilienceConfigBuilder,
};
pub use logging::{ApiLogger, OperationContext, OperationMetrics};
pub use metrics::{GlobalMetrics, MetricsCollector, MetricsSnapshot, ResourceMetrics};
pub use rate_limiter::{Admission, QuotaStatus, RateLimiter, RateLimiterStats};
pub use retry::{RetryConfig, RetryPolicy};
