use super::auth::ApiToken;
use super::constants::{self, headers, keys};
use super::error::{ApiError, ApiErrorKind, parse_retry_after};
use super::models::Record;
use super::resilience::{
    Admission, ApiLogger, ExhaustionPolicy, MetricsCollector, MetricsSnapshot, OperationContext,
    QuotaStatus, RateLimiter, RateLimiterStats, ResilienceConfig, RetryPolicy,
};
use super::sync::{self, Delta, ServerKnowledge};
use log::debug;
use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// One logical request before it is dispatched
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Resource collection, used for logging and metrics
    pub resource: &'static str,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>, resource: &'static str) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            resource,
        }
    }

    pub fn get(path: impl Into<String>, resource: &'static str) -> Self {
        Self::new(Method::GET, path, resource)
    }

    pub fn query(mut self, params: impl IntoIterator<Item = (String, String)>) -> Self {
        self.query.extend(params);
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Successful response with its decoded JSON body
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

/// Result of the status probe
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    pub status: HealthState,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Budget Web API client.
///
/// Every request goes through the same pipeline: quota admission, retry with
/// backoff around the network call, classification of failures into
/// [`ApiError`], JSON decoding. Clones share quota and metrics state.
#[derive(Clone)]
pub struct BudgetClient {
    base_url: String,
    http_client: reqwest::Client,
    token: ApiToken,
    retry_policy: RetryPolicy,
    rate_limiter: RateLimiter, // Quota window shared by every request of this client
    on_exhausted: ExhaustionPolicy,
    api_logger: ApiLogger,
    metrics_collector: MetricsCollector,
    cancel: CancellationToken,
}

impl BudgetClient {
    pub fn new(
        base_url: impl Into<String>,
        token: ApiToken,
        resilience: ResilienceConfig,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let http_client = reqwest::Client::builder()
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(headers::USER_AGENT)
            .build()
            .map_err(|e| {
                ApiError::new(ApiErrorKind::UnknownError, format!("failed to build HTTP client: {}", e))
            })?;

        Ok(Self::with_http_client(base_url, token, resilience, http_client))
    }

    /// Create a client around a preconfigured reqwest client
    pub fn with_http_client(
        base_url: impl Into<String>,
        token: ApiToken,
        resilience: ResilienceConfig,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            http_client,
            token,
            retry_policy: RetryPolicy::new(resilience.retry),
            on_exhausted: resilience.rate_limit.on_exhausted,
            rate_limiter: RateLimiter::new(resilience.rate_limit),
            api_logger: ApiLogger::new(resilience.monitoring.clone()),
            metrics_collector: MetricsCollector::new(resilience.monitoring),
            cancel: CancellationToken::new(),
        }
    }

    /// A handle whose requests abort their quota waits and retry backoffs when
    /// `cancel` fires. Quota and metrics stay shared with `self`.
    pub fn with_cancellation(&self, cancel: CancellationToken) -> Self {
        Self {
            cancel,
            ..self.clone()
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }

    /// Remaining quota and when the window resets. Does not consume quota.
    pub fn quota(&self) -> QuotaStatus {
        self.rate_limiter.quota()
    }

    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics_collector.snapshot()
    }

    /// Probe the service with a cheap authenticated request
    pub async fn status(&self) -> HealthStatus {
        let started = Instant::now();
        let result = self.user().await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match result {
            Ok(_) => HealthStatus {
                status: HealthState::Healthy,
                latency_ms,
                error: None,
            },
            Err(error) => HealthStatus {
                status: HealthState::Unhealthy,
                latency_ms,
                error: Some(error.to_string()),
            },
        }
    }

    /// The authenticated user
    pub async fn user(&self) -> Result<Record, ApiError> {
        self.get_entity("/user", keys::USER, keys::USER).await
    }

    /// Run one logical request through admission, retry and classification
    pub async fn dispatch(&self, request: ApiRequest, cancel: &CancellationToken) -> Result<ApiResponse, ApiError> {
        let context = self.api_logger.start_operation(request.method.as_str(), request.resource);

        let rate_limit_delay = match self.admit(&context, cancel).await {
            Ok(delay) => delay,
            Err(error) => {
                self.finish(&context, 0, Err(&error), Duration::ZERO);
                return Err(error);
            }
        };

        let mut attempts = 0;
        let result = self
            .retry_policy
            .execute_cancellable(cancel, || {
                attempts += 1;
                if attempts > 1 {
                    self.api_logger.log_retry(&context, attempts);
                }
                self.send_once(&context, &request, attempts)
            })
            .await;

        self.finish(
            &context,
            attempts,
            result.as_ref().map(|r| r.status),
            rate_limit_delay,
        );
        result
    }

    /// Take one admission from the quota window, waiting or failing fast
    /// according to the configured policy. Returns the time spent waiting.
    async fn admit(&self, context: &OperationContext, cancel: &CancellationToken) -> Result<Duration, ApiError> {
        match self.on_exhausted {
            ExhaustionPolicy::FailFast => match self.rate_limiter.admit() {
                Admission::Admitted { .. } => Ok(Duration::ZERO),
                Admission::Blocked { wait } => {
                    self.api_logger.log_rate_limit(context, wait, false);
                    Err(ApiError::quota_exhausted(wait))
                }
            },
            ExhaustionPolicy::Wait => {
                let started = Instant::now();
                self.rate_limiter.acquire(cancel).await.map_err(|wait| {
                    self.api_logger.log_rate_limit(context, wait, false);
                    ApiError::quota_exhausted(wait)
                })?;

                let waited = started.elapsed();
                if !waited.is_zero() {
                    self.api_logger.log_rate_limit(context, waited, true);
                }
                Ok(waited)
            }
        }
    }

    /// One network attempt: send, read, classify
    async fn send_once(&self, context: &OperationContext, request: &ApiRequest, attempt: u32) -> Result<ApiResponse, ApiError> {
        let url = constants::join_url(&self.base_url, &request.path);
        let authorization = self.token.bearer_header();

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .header(AUTHORIZATION, &authorization)
            .header(CONTENT_TYPE, headers::CONTENT_TYPE_JSON)
            .header(headers::X_CORRELATION_ID, &context.correlation_id);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let mut logged_headers = HashMap::new();
        logged_headers.insert(AUTHORIZATION.to_string(), authorization);
        logged_headers.insert(CONTENT_TYPE.to_string(), headers::CONTENT_TYPE_JSON.to_string());
        self.api_logger.log_request(context, &url, &logged_headers, attempt);

        let started = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|e| ApiError::from_reqwest_error(&e))?;

        let status = response.status().as_u16();
        self.api_logger.log_response(context, status, started.elapsed());

        let retry_after = response
            .headers()
            .get(headers::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_retry_after);
        // A failed read is transient even after a 2xx, so a write that
        // already landed may be sent again
        let text = response
            .text()
            .await
            .map_err(|e| ApiError::from_reqwest_error(&e))?;

        if !(200..300).contains(&status) {
            return Err(ApiError::from_response_parts(status, &text, retry_after));
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| {
                ApiError::schema_mismatch(format!("response is not valid JSON: {}", e)).with_status(status)
            })?
        };

        Ok(ApiResponse { status, body })
    }

    fn finish(
        &self,
        context: &OperationContext,
        attempts: u32,
        result: Result<u16, &ApiError>,
        rate_limit_delay: Duration,
    ) {
        let mut metrics = context.create_metrics(attempts, result);
        metrics.rate_limit_delay = rate_limit_delay;
        self.api_logger.complete_operation(context, &metrics);
        self.metrics_collector.record_operation(&context.resource, &metrics);
    }

    /// GET a list endpoint, optionally as a delta since `since`
    pub(crate) async fn get_delta<T: DeserializeOwned>(
        &self,
        path: String,
        resource: &'static str,
        since: Option<ServerKnowledge>,
        filters: Vec<(String, String)>,
    ) -> Result<Delta<T>, ApiError> {
        debug!("Listing {} (since {:?})", resource, since);
        let request = ApiRequest::get(path, resource)
            .query(filters)
            .query(sync::cursor_query(since));

        let response = self.dispatch(request, &self.cancel).await?;
        sync::decode_delta(response.body, resource, since)
    }

    /// GET a list endpoint that has no cursor
    pub(crate) async fn get_list<T: DeserializeOwned>(&self, path: &str, resource: &'static str) -> Result<Vec<T>, ApiError> {
        let response = self.dispatch(ApiRequest::get(path, resource), &self.cancel).await?;
        sync::decode_list(response.body, resource)
    }

    /// GET a single entity found under `key`
    pub(crate) async fn get_entity<T: DeserializeOwned>(
        &self,
        path: &str,
        resource: &'static str,
        key: &str,
    ) -> Result<T, ApiError> {
        let response = self.dispatch(ApiRequest::get(path, resource), &self.cancel).await?;
        sync::decode_entity(response.body, key)
    }

    /// Send a write request and decode the entity found under `key`
    pub(crate) async fn write_entity<T: DeserializeOwned>(
        &self,
        method: Method,
        path: String,
        resource: &'static str,
        key: &str,
        body: Option<Value>,
    ) -> Result<T, ApiError> {
        let mut request = ApiRequest::new(method, path, resource);
        request.body = body;
        let response = self.dispatch(request, &self.cancel).await?;
        sync::decode_entity(response.body, key)
    }
}

impl std::fmt::Debug for BudgetClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BudgetClient")
            .field("base_url", &self.base_url)
            .field("token", &self.token)
            .field("on_exhausted", &self.on_exhausted)
            .finish_non_exhaustive()
    }
}
