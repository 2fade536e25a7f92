//! Resilience configuration with builder pattern
//!
//! Provides a unified configuration for retry policies, quota limiting,
//! and monitoring features with sane defaults for the budget API.

use super::retry::RetryConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Global resilience configuration for API operations
#[derive(Debug, Clone, Default)]
pub struct ResilienceConfig {
    pub retry: RetryConfig,
    pub rate_limit: RateLimitConfig,
    pub monitoring: MonitoringConfig,
}

/// What the dispatcher does when the local quota window is used up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustionPolicy {
    /// Surface RateLimitExceeded with the wait as retry-after
    #[default]
    FailFast,
    /// Suspend until the window resets (cancellable)
    Wait,
}

/// Fixed-window quota configuration
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Requests admitted per window
    pub capacity: u32,
    pub window: Duration,
    pub enabled: bool,
    pub on_exhausted: ExhaustionPolicy,
}

/// Monitoring and logging configuration
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    pub request_logging: bool,
    pub performance_metrics: bool,
    pub log_level: LogLevel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// The service advertises 200 requests per rolling hour per token
pub const DEFAULT_CAPACITY: u32 = 200;
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(3_600_000);

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            window: DEFAULT_WINDOW,
            enabled: true,
            on_exhausted: ExhaustionPolicy::FailFast,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            request_logging: true,
            performance_metrics: true,
            log_level: LogLevel::Info,
        }
    }
}

impl ResilienceConfig {
    /// Create a new builder for ResilienceConfig
    pub fn builder() -> ResilienceConfigBuilder {
        ResilienceConfigBuilder::new()
    }

    /// Disable retries and quota limiting (for testing)
    pub fn disabled() -> Self {
        Self {
            retry: RetryConfig {
                max_attempts: 1,
                base_delay: Duration::ZERO,
                max_delay: Duration::ZERO,
                jitter: false,
            },
            rate_limit: RateLimitConfig {
                enabled: false,
                ..RateLimitConfig::default()
            },
            monitoring: MonitoringConfig {
                request_logging: false,
                performance_metrics: false,
                log_level: LogLevel::Error,
            },
        }
    }
}

/// Builder for ResilienceConfig
#[derive(Debug, Default)]
pub struct ResilienceConfigBuilder {
    config: ResilienceConfig,
}

impl ResilienceConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configure retry behavior
    pub fn retry_config(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Set max attempts (initial try included)
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.retry.max_attempts = attempts;
        self
    }

    pub fn base_delay(mut self, delay: Duration) -> Self {
        self.config.retry.base_delay = delay;
        self
    }

    /// Configure quota limiting
    pub fn rate_limit_config(mut self, rate_limit: RateLimitConfig) -> Self {
        self.config.rate_limit = rate_limit;
        self
    }

    /// Set requests admitted per window
    pub fn capacity(mut self, capacity: u32) -> Self {
        self.config.rate_limit.capacity = capacity;
        self
    }

    pub fn window(mut self, window: Duration) -> Self {
        self.config.rate_limit.window = window;
        self
    }

    /// Enable/disable quota limiting
    pub fn enable_rate_limiting(mut self, enabled: bool) -> Self {
        self.config.rate_limit.enabled = enabled;
        self
    }

    pub fn on_exhausted(mut self, policy: ExhaustionPolicy) -> Self {
        self.config.rate_limit.on_exhausted = policy;
        self
    }

    /// Configure monitoring
    pub fn monitoring_config(mut self, monitoring: MonitoringConfig) -> Self {
        self.config.monitoring = monitoring;
        self
    }

    /// Enable/disable request logging
    pub fn request_logging(mut self, enabled: bool) -> Self {
        self.config.monitoring.request_logging = enabled;
        self
    }

    /// Enable/disable performance metrics
    pub fn performance_metrics(mut self, enabled: bool) -> Self {
        self.config.monitoring.performance_metrics = enabled;
        self
    }

    /// Set logging level
    pub fn log_level(mut self, level: LogLevel) -> Self {
        self.config.monitoring.log_level = level;
        self
    }

    /// Build the final configuration
    pub fn build(self) -> ResilienceConfig {
        self.config
    }
}
