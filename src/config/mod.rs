use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::executor::RequestConfig;
use crate::pool::{EvictorConfig, PoolLimits, Route};
use crate::retry::{Backoff, RetryPolicy};

/// Upper bound for a single backoff delay
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Connection pool limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSection {
    /// Maximum open connections across all routes
    #[serde(default = "default_max_total")]
    pub max_total_connections: usize,

    /// Maximum open connections per route unless overridden
    #[serde(default = "default_max_per_route")]
    pub max_connections_per_route: usize,

    /// Per-route limits keyed by "scheme://host:port"
    #[serde(default)]
    pub route_overrides: HashMap<String, usize>,
}

fn default_max_total() -> usize {
    200
}

fn default_max_per_route() -> usize {
    20
}

impl Default for PoolSection {
    fn default() -> Self {
        Self {
            max_total_connections: default_max_total(),
            max_connections_per_route: default_max_per_route(),
            route_overrides: HashMap::new(),
        }
    }
}

/// Request timeouts in milliseconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutSection {
    /// Time allowed to establish a connection
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Time allowed to wait for a pooled connection
    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    /// Time allowed for one request/response exchange
    #[serde(default = "default_transfer_timeout")]
    pub transfer_timeout_ms: u64,
}

fn default_connect_timeout() -> u64 {
    1000
}

fn default_acquire_timeout() -> u64 {
    500
}

fn default_transfer_timeout() -> u64 {
    10_000
}

impl Default for TimeoutSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout(),
            acquire_timeout_ms: default_acquire_timeout(),
            transfer_timeout_ms: default_transfer_timeout(),
        }
    }
}

/// Retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySection {
    /// Attempts per logical request, including the first
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Base delay between attempts (0 = retry immediately)
    #[serde(default)]
    pub backoff_ms: u64,
}

fn default_max_retry_attempts() -> u32 {
    crate::retry::DEFAULT_MAX_ATTEMPTS
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retry_attempts: default_max_retry_attempts(),
            backoff_ms: 0,
        }
    }
}

/// Idle evictor settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvictorSection {
    /// Run the background sweeper
    #[serde(default = "default_evictor_enabled")]
    pub enabled: bool,

    /// Idle connections older than this are closed
    #[serde(default = "default_idle_threshold")]
    pub idle_threshold_secs: u64,

    /// Pause between sweeps
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

fn default_evictor_enabled() -> bool {
    true
}

fn default_idle_threshold() -> u64 {
    30
}

fn default_sweep_interval() -> u64 {
    3
}

impl Default for EvictorSection {
    fn default() -> Self {
        Self {
            enabled: default_evictor_enabled(),
            idle_threshold_secs: default_idle_threshold(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pool: PoolSection,

    #[serde(default)]
    pub timeouts: TimeoutSection,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub evictor: EvictorSection,
}

impl Config {
    /// Reject settings the runtime cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.evictor.sweep_interval_secs == 0 {
            anyhow::bail!("evictor.sweep_interval_secs must be greater than zero");
        }
        if self.retry.max_retry_attempts == 0 {
            anyhow::bail!("retry.max_retry_attempts must be greater than zero");
        }
        for key in self.pool.route_overrides.keys() {
            Route::from_str(key).with_context(|| format!("Invalid route override: {}", key))?;
        }
        Ok(())
    }

    /// Pool limits including per-route overrides
    pub fn pool_limits(&self) -> Result<PoolLimits> {
        let mut limits = PoolLimits::new(
            self.pool.max_total_connections,
            self.pool.max_connections_per_route,
        );
        for (key, max) in &self.pool.route_overrides {
            let route = Route::from_str(key)
                .with_context(|| format!("Invalid route override: {}", key))?;
            limits = limits.with_route_limit(route, *max);
        }
        Ok(limits)
    }

    pub fn request_config(&self) -> RequestConfig {
        RequestConfig {
            max_attempts: self.retry.max_retry_attempts,
            connect_timeout: Duration::from_millis(self.timeouts.connect_timeout_ms),
            acquire_timeout: Duration::from_millis(self.timeouts.acquire_timeout_ms),
            transfer_timeout: Duration::from_millis(self.timeouts.transfer_timeout_ms),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        let policy = RetryPolicy::new(self.retry.max_retry_attempts);
        match self.retry.backoff_ms {
            0 => policy,
            ms => policy.with_backoff(Backoff::new(Duration::from_millis(ms), MAX_BACKOFF)),
        }
    }

    pub fn evictor_config(&self) -> EvictorConfig {
        EvictorConfig {
            sweep_interval: Duration::from_secs(self.evictor.sweep_interval_secs),
            idle_threshold: Duration::from_secs(self.evictor.idle_threshold_secs),
        }
    }
}

/// Load configuration from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let config: Config =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(config)
}

/// Load configuration from environment variables
///
/// Every setting falls back to its default when unset or unparsable:
/// - ROUTEPOOL_MAX_TOTAL
/// - ROUTEPOOL_MAX_PER_ROUTE
/// - ROUTEPOOL_CONNECT_TIMEOUT_MS
/// - ROUTEPOOL_ACQUIRE_TIMEOUT_MS
/// - ROUTEPOOL_TRANSFER_TIMEOUT_MS
/// - ROUTEPOOL_MAX_RETRY_ATTEMPTS
/// - ROUTEPOOL_RETRY_BACKOFF_MS
/// - ROUTEPOOL_IDLE_THRESHOLD_SECS
/// - ROUTEPOOL_SWEEP_INTERVAL_SECS
pub fn load_from_env() -> Result<Config> {
    // Try to load .env file if it exists (don't fail if it doesn't)
    let _ = dotenvy::dotenv();

    let mut config = Config::default();

    env_override("ROUTEPOOL_MAX_TOTAL", &mut config.pool.max_total_connections);
    env_override("ROUTEPOOL_MAX_PER_ROUTE", &mut config.pool.max_connections_per_route);
    env_override("ROUTEPOOL_CONNECT_TIMEOUT_MS", &mut config.timeouts.connect_timeout_ms);
    env_override("ROUTEPOOL_ACQUIRE_TIMEOUT_MS", &mut config.timeouts.acquire_timeout_ms);
    env_override("ROUTEPOOL_TRANSFER_TIMEOUT_MS", &mut config.timeouts.transfer_timeout_ms);
    env_override("ROUTEPOOL_MAX_RETRY_ATTEMPTS", &mut config.retry.max_retry_attempts);
    env_override("ROUTEPOOL_RETRY_BACKOFF_MS", &mut config.retry.backoff_ms);
    env_override("ROUTEPOOL_IDLE_THRESHOLD_SECS", &mut config.evictor.idle_threshold_secs);
    env_override("ROUTEPOOL_SWEEP_INTERVAL_SECS", &mut config.evictor.sweep_interval_secs);

    Ok(config)
}

fn env_override<T: FromStr>(name: &str, target: &mut T) {
    if let Ok(raw) = std::env::var(name) {
        if let Ok(val) = raw.trim().parse() {
            *target = val;
        }
    }
}

/// Load configuration from file or environment, then validate it
///
/// A YAML file takes precedence; without one the environment (and `.env`)
/// is consulted.
pub fn load_config(config_path: Option<&str>) -> Result<Config> {
    let config = match config_path {
        Some(path) => load_from_yaml(path)?,
        None => load_from_env()?,
    };
    config.validate()?;
    Ok(config)
}
