//! Budget Web API client
//!
//! Quota-aware, retrying access to the budget service with typed errors and
//! `server_knowledge` delta sync. The resource methods on [`BudgetClient`] are
//! thin; the work happens in the dispatcher and the `resilience` module.

pub mod auth;
pub mod client;
pub mod constants;
pub mod error;
pub mod models;
pub mod resilience;
pub mod resources;
pub mod sync;

pub use auth::{ApiToken, mask_token, validate_token};
pub use client::{ApiRequest, ApiResponse, BudgetClient, HealthState, HealthStatus};
pub use error::{ApiError, ApiErrorKind};
pub use models::{Milliunits, Record};
pub use resilience::{
    Admission, ApiLogger, ExhaustionPolicy, GlobalMetrics, LogLevel, MetricsCollector, MetricsSnapshot,
    MonitoringConfig, OperationContext, OperationMetrics, QuotaStatus, RateLimitConfig, RateLimiter,
    RateLimiterStats, ResilienceConfig, ResourceMetrics, RetryConfig, RetryPolicy,
};
pub use resources::{TransactionFilter, TransactionScope, TransactionType};
pub use sync::{ApplyOutcome, Delta, DeltaCache, ServerKnowledge, Tombstoned};
