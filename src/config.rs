use crate::api::auth::{ApiToken, validate_token};
use crate::api::client::BudgetClient;
use crate::api::constants::DEFAULT_BASE_URL;
use crate::api::resilience::{
    DEFAULT_CAPACITY, DEFAULT_WINDOW, ExhaustionPolicy, LogLevel, MonitoringConfig, RateLimitConfig,
    ResilienceConfig, RetryConfig,
};
use anyhow::{Context, Result, bail};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_TOKEN: &str = "BUDGET_API_TOKEN";
pub const ENV_BASE_URL: &str = "BUDGET_API_BASE_URL";
pub const ENV_RATE_LIMIT_CAPACITY: &str = "BUDGET_RATE_LIMIT_CAPACITY";
pub const ENV_RATE_LIMIT_WINDOW_MS: &str = "BUDGET_RATE_LIMIT_WINDOW_MS";

/// Client configuration as stored in `config.toml`
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_token: String,
    pub base_url: String,
    pub timeout_ms: u64,
    pub rate_limit: RateLimitSettings,
    pub retry: RetrySettings,
    pub monitoring: MonitoringSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSettings {
    pub capacity: u32,
    pub window_ms: u64,
    pub enabled: bool,
    pub on_exhausted: ExhaustionPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitoringSettings {
    pub request_logging: bool,
    pub performance_metrics: bool,
    pub log_level: LogLevel,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_token: String::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout_ms: 30_000,
            rate_limit: RateLimitSettings::default(),
            retry: RetrySettings::default(),
            monitoring: MonitoringSettings::default(),
        }
    }
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            window_ms: DEFAULT_WINDOW.as_millis() as u64,
            enabled: true,
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            max_attempts: defaults.max_attempts,
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            jitter: defaults.jitter,
        }
    }
}

impl Default for MonitoringSettings {
    fn default() -> Self {
        let defaults = MonitoringConfig::default();
        Self {
            request_logging: defaults.request_logging,
            performance_metrics: defaults.performance_metrics,
            log_level: defaults.log_level,
        }
    }
}

/// A single field-level configuration problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigIssue {
    pub field: &'static str,
    pub message: String,
}

impl ConfigIssue {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl ClientConfig {
    pub fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Failed to get config directory")?
            .join("budget-client");
        Ok(config_dir.join("config.toml"))
    }

    /// Load `.env`, the config file (if any) and environment overrides
    pub fn load() -> Result<Self> {
        match dotenvy::dotenv() {
            Ok(path) => debug!("Loaded environment from {:?}", path),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e).context("Failed to read .env file"),
        }

        let config_path = Self::get_config_path()?;
        let mut config = if config_path.exists() {
            Self::from_path(&config_path)?
        } else {
            info!("Config file {:?} doesn't exist, using defaults", config_path);
            Self::default()
        };

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        debug!("Loading config from: {:?}", path);
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment overrides read through `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(token) = lookup(ENV_API_TOKEN) {
            self.api_token = token.trim().to_string();
        }
        if let Some(url) = lookup(ENV_BASE_URL) {
            self.base_url = url.trim().to_string();
        }
        if let Some(capacity) = lookup(ENV_RATE_LIMIT_CAPACITY) {
            self.rate_limit.capacity = capacity
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number, got {:?}", ENV_RATE_LIMIT_CAPACITY, capacity))?;
        }
        if let Some(window) = lookup(ENV_RATE_LIMIT_WINDOW_MS) {
            self.rate_limit.window_ms = window
                .trim()
                .parse()
                .with_context(|| format!("{} must be a whole number, got {:?}", ENV_RATE_LIMIT_WINDOW_MS, window))?;
        }
        Ok(())
    }

    /// Report every field-level problem at once
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();

        if self.api_token.is_empty() {
            issues.push(ConfigIssue::new(
                "api_token",
                format!("is required (set it in config.toml or {})", ENV_API_TOKEN),
            ));
        } else if !validate_token(&self.api_token) {
            issues.push(ConfigIssue::new("api_token", "must be 64 alphanumeric characters"));
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            issues.push(ConfigIssue::new("base_url", "must start with http:// or https://"));
        }
        if self.timeout_ms == 0 {
            issues.push(ConfigIssue::new("timeout_ms", "must be greater than 0"));
        }
        if self.rate_limit.capacity == 0 {
            issues.push(ConfigIssue::new("rate_limit.capacity", "must be greater than 0"));
        }
        if self.rate_limit.window_ms == 0 {
            issues.push(ConfigIssue::new("rate_limit.window_ms", "must be greater than 0"));
        }
        if self.retry.max_attempts == 0 {
            issues.push(ConfigIssue::new("retry.max_attempts", "must be at least 1"));
        }

        issues
    }

    pub fn into_validated(self) -> Result<Self> {
        let issues = self.validate();
        if issues.is_empty() {
            return Ok(self);
        }

        let listing = issues
            .iter()
            .map(|issue| format!("  - {}", issue))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Invalid configuration ({} problems):\n{}", issues.len(), listing)
    }

    pub fn resilience(&self) -> ResilienceConfig {
        ResilienceConfig {
            retry: RetryConfig {
                max_attempts: self.retry.max_attempts,
                base_delay: Duration::from_millis(self.retry.base_delay_ms),
                max_delay: Duration::from_millis(self.retry.max_delay_ms),
                jitter: self.retry.jitter,
            },
            rate_limit: RateLimitConfig {
                capacity: self.rate_limit.capacity,
                window: Duration::from_millis(self.rate_limit.window_ms),
                enabled: self.rate_limit.enabled,
                on_exhausted: self.rate_limit.on_exhausted,
            },
            monitoring: MonitoringConfig {
                request_logging: self.monitoring.request_logging,
                performance_metrics: self.monitoring.performance_metrics,
                log_level: self.monitoring.log_level,
            },
        }
    }

    /// Validate and build a client from this configuration
    pub fn build_client(self) -> Result<BudgetClient> {
        let config = self.into_validated()?;
        let resilience = config.resilience();
        let client = BudgetClient::new(
            config.base_url,
            ApiToken::new(config.api_token),
            resilience,
            Duration::from_millis(config.timeout_ms),
        )?;
        Ok(client)
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("api_token", &crate::api::auth::mask_token(&self.api_token))
            .field("base_url", &self.base_url)
            .field("timeout_ms", &self.timeout_ms)
            .field("rate_limit", &self.rate_limit)
            .field("retry", &self.retry)
            .field("monitoring", &self.monitoring)
            .finish()
    }
}
