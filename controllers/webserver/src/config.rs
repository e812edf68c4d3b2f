//! Controller configuration.
//!
//! Read once at startup from environment variables. Parsing goes through a
//! lookup function so tests can supply values without touching the process
//! environment.

use crate::error::ControllerError;
use std::net::SocketAddr;
use std::time::Duration;

/// Field manager and `managed-by` label value when `MANAGER_NAME` is unset.
pub const DEFAULT_MANAGER_NAME: &str = "webserver-operator";

/// Runtime configuration for the Webserver Controller.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Namespace to watch; `None` watches all namespaces
    pub namespace: Option<String>,
    /// Engine name recorded as field manager and `managed-by` label
    pub manager_name: String,
    /// Steady-state re-check interval after a successful pass
    pub requeue_after: Duration,
    /// Deadline for a single reconcile pass
    pub reconcile_timeout: Duration,
    /// Window in which duplicate events for one object are merged
    pub debounce: Duration,
    /// Maximum reconciles running at once (distinct objects)
    pub concurrency: u16,
    /// Listen address for /healthz, /readyz and /metrics
    pub probe_addr: SocketAddr,
    /// First retry delay after a failed pass
    pub backoff_base: Duration,
    /// Upper bound on the retry delay
    pub backoff_max: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespace: None,
            manager_name: DEFAULT_MANAGER_NAME.to_string(),
            requeue_after: Duration::from_secs(300),
            reconcile_timeout: Duration::from_secs(30),
            debounce: Duration::from_secs(5),
            concurrency: 3,
            probe_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            backoff_base: Duration::from_secs(5),
            backoff_max: Duration::from_secs(300),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`, falling back to defaults for unset keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let config = Config {
            namespace: get("WATCH_NAMESPACE"),
            manager_name: get("MANAGER_NAME").unwrap_or(defaults.manager_name),
            requeue_after: seconds(&get, "REQUEUE_AFTER_SECS", defaults.requeue_after)?,
            reconcile_timeout: seconds(&get, "RECONCILE_TIMEOUT_SECS", defaults.reconcile_timeout)?,
            debounce: seconds(&get, "DEBOUNCE_SECS", defaults.debounce)?,
            concurrency: parse(&get, "CONCURRENCY", defaults.concurrency)?,
            probe_addr: parse(&get, "PROBE_ADDR", defaults.probe_addr)?,
            backoff_base: seconds(&get, "BACKOFF_BASE_SECS", defaults.backoff_base)?,
            backoff_max: seconds(&get, "BACKOFF_MAX_SECS", defaults.backoff_max)?,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ControllerError> {
        if self.requeue_after.is_zero() {
            return Err(ControllerError::InvalidConfig("REQUEUE_AFTER_SECS must be greater than 0".to_string()));
        }
        if self.reconcile_timeout.is_zero() {
            return Err(ControllerError::InvalidConfig(
                "RECONCILE_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ControllerError::InvalidConfig("CONCURRENCY must be greater than 0".to_string()));
        }
        if self.backoff_base.is_zero() || self.backoff_max < self.backoff_base {
            return Err(ControllerError::InvalidConfig(format!(
                "backoff requires 0 < BACKOFF_BASE_SECS <= BACKOFF_MAX_SECS, got {}s and {}s",
                self.backoff_base.as_secs(),
                self.backoff_max.as_secs()
            )));
        }
        Ok(())
    }
}

fn parse<T, G>(get: &G, key: &str, default: T) -> Result<T, ControllerError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{}={:?}: {}", key, raw, e))),
        None => Ok(default),
    }
}

fn seconds<G>(get: &G, key: &str, default: Duration) -> Result<Duration, ControllerError>
where
    G: Fn(&str) -> Option<String>,
{
    parse(get, key, default.as_secs()).map(Duration::from_secs)
}
