//! Request metrics aggregated per resource and per error kind
//!
//! Shared by every request issued through one client instance.

use super::config::MonitoringConfig;
use super::logging::OperationMetrics;
use crate::api::error::ApiErrorKind;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Performance metrics collector
#[derive(Debug, Clone)]
pub struct MetricsCollector {
    inner: Arc<Mutex<MetricsCollectorInner>>,
    config: MonitoringConfig,
}

#[derive(Debug)]
struct MetricsCollectorInner {
    resources: HashMap<String, ResourceMetrics>,
    global: GlobalMetrics,
    start_time: Instant,
}

/// Metrics for one resource collection (`accounts`, `transactions`, ...)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceMetrics {
    pub resource: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_duration: Duration,
    pub max_duration: Duration,
    /// Retries beyond the first attempt
    pub total_retries: u64,
    pub status_codes: HashMap<u16, u64>,
}

/// Metrics across every request
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GlobalMetrics {
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub total_retries: u64,
    /// Terminal failures by kind
    pub errors_by_kind: HashMap<ApiErrorKind, u64>,
    pub total_response_time: Duration,
    pub average_response_time: Duration,
    pub total_rate_limit_time: Duration,
    pub error_rate: f64,
    pub uptime: Duration,
}

/// Snapshot of current metrics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub global: GlobalMetrics,
    pub resources: Vec<ResourceMetrics>,
    pub timestamp: String,
}

impl MetricsCollector {
    pub fn new(config: MonitoringConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(MetricsCollectorInner {
                resources: HashMap::new(),
                global: GlobalMetrics::default(),
                start_time: Instant::now(),
            })),
            config,
        }
    }

    /// Record completion of a logical request
    pub fn record_operation(&self, resource: &str, metrics: &OperationMetrics) {
        if !self.config.performance_metrics {
            return;
        }

        let mut inner = self.lock();
        let uptime = inner.start_time.elapsed();

        inner
            .resources
            .entry(resource.to_string())
            .or_insert_with(|| ResourceMetrics::new(resource))
            .record(metrics);

        inner.global.record(metrics, uptime);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let inner = self.lock();
        let mut resources: Vec<_> = inner.resources.values().cloned().collect();
        resources.sort_by(|a, b| a.resource.cmp(&b.resource));

        MetricsSnapshot {
            global: GlobalMetrics {
                uptime: inner.start_time.elapsed(),
                ..inner.global.clone()
            },
            resources,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn resource_metrics(&self, resource: &str) -> Option<ResourceMetrics> {
        self.lock().resources.get(resource).cloned()
    }

    pub fn reset(&self) {
        let mut inner = self.lock();
        inner.resources.clear();
        inner.global = GlobalMetrics::default();
        inner.start_time = Instant::now();
    }

    fn lock(&self) -> MutexGuard<'_, MetricsCollectorInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ResourceMetrics {
    fn new(resource: &str) -> Self {
        Self {
            resource: resource.to_string(),
            ..Self::default()
        }
    }

    fn record(&mut self, metrics: &OperationMetrics) {
        self.total_requests += 1;
        if metrics.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        self.total_duration += metrics.duration;
        self.max_duration = self.max_duration.max(metrics.duration);
        self.total_retries += metrics.retries() as u64;

        if let Some(status_code) = metrics.status_code {
            *self.status_codes.entry(status_code).or_insert(0) += 1;
        }
    }

    /// Success rate as percentage
    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            0.0
        } else {
            (self.successful_requests as f64 / self.total_requests as f64) * 100.0
        }
    }

    pub fn average_duration(&self) -> Duration {
        if self.total_requests == 0 {
            Duration::ZERO
        } else {
            self.total_duration / self.total_requests as u32
        }
    }
}

impl GlobalMetrics {
    fn record(&mut self, metrics: &OperationMetrics, uptime: Duration) {
        self.total_requests += 1;
        self.uptime = uptime;

        if metrics.success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }

        if let Some(error) = &metrics.error {
            *self.errors_by_kind.entry(error.kind()).or_insert(0) += 1;
        }

        self.total_retries += metrics.retries() as u64;
        self.total_rate_limit_time += metrics.rate_limit_delay;

        self.total_response_time += metrics.duration;
        self.average_response_time = self.total_response_time / self.total_requests as u32;

        self.error_rate = (self.failed_requests as f64 / self.total_requests as f64) * 100.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::error::ApiError;
    use crate::api::resilience::config::LogLevel;

    fn config(performance_metrics: bool) -> MonitoringConfig {
        MonitoringConfig {
            request_logging: false,
            performance_metrics,
            log_level: LogLevel::Info,
        }
    }

    fn metrics(duration_ms: u64, attempts: u32, error: Option<ApiError>) -> OperationMetrics {
        OperationMetrics {
            duration: Duration::from_millis(duration_ms),
            attempts,
            success: error.is_none(),
            status_code: error.as_ref().map_or(Some(200), |e| e.status()),
            error,
            rate_limit_delay: Duration::ZERO,
        }
    }

    #[test]
    fn test_metrics_collection() {
        let collector = MetricsCollector::new(config(true));

        collector.record_operation("accounts", &metrics(100, 1, None));
        collector.record_operation(
            "accounts",
            &metrics(
                300,
                3,
                Some(ApiError::new(ApiErrorKind::TransientError, "down").with_status(503)),
            ),
        );
        collector.record_operation(
            "payees",
            &metrics(
                50,
                1,
                Some(ApiError::new(ApiErrorKind::AuthError, "bad token").with_status(401)),
            ),
        );

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.global.total_requests, 3);
        assert_eq!(snapshot.global.successful_requests, 1);
        assert_eq!(snapshot.global.failed_requests, 2);
        assert_eq!(snapshot.global.total_retries, 2);
        assert_eq!(snapshot.global.errors_by_kind[&ApiErrorKind::TransientError], 1);
        assert_eq!(snapshot.global.errors_by_kind[&ApiErrorKind::AuthError], 1);
        assert_eq!(snapshot.resources.len(), 2);
        assert_eq!(snapshot.resources[0].resource, "accounts");

        let accounts = collector.resource_metrics("accounts").unwrap();
        assert_eq!(accounts.total_requests, 2);
        assert_eq!(accounts.success_rate(), 50.0);
        assert_eq!(accounts.average_duration(), Duration::from_millis(200));
        assert_eq!(accounts.max_duration, Duration::from_millis(300));
        assert_eq!(accounts.status_codes[&503], 1);
    }

    #[test]
    fn test_metrics_disabled() {
        let collector = MetricsCollector::new(config(false));
        collector.record_operation("accounts", &metrics(100, 1, None));

        assert_eq!(collector.snapshot().global.total_requests, 0);
        assert!(collector.resource_metrics("accounts").is_none());
    }

    #[test]
    fn test_reset() {
        let collector = MetricsCollector::new(config(true));
        collector.record_operation("months", &metrics(10, 1, None));
        collector.reset();

        assert_eq!(collector.snapshot().global.total_requests, 0);
    }

    #[test]
    fn test_snapshot_serializes() {
        let collector = MetricsCollector::new(config(true));
        collector.record_operation(
            "transactions",
            &metrics(10, 1, Some(ApiError::new(ApiErrorKind::ConflictError, "dup").with_status(409))),
        );

        let json = serde_json::to_value(collector.snapshot()).unwrap();
        assert_eq!(json["global"]["errors_by_kind"]["ConflictError"], 1);
    }
}
