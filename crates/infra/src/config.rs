//! Environment-driven configuration.
//!
//! Every key is prefixed `CLOUDWATCHER_` and optional; unset keys fall back to the
//! defaults below. `AppConfig::from_lookup` takes an injected lookup so tests never
//! touch the process environment.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::retry::{ResilientExecutor, RetryPolicy, RetryPolicyError};

pub const ENV_PREFIX: &str = "CLOUDWATCHER_";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown storage provider {0:?} (expected \"local\" or \"memory\")")]
    UnknownProvider(String),

    #[error(transparent)]
    Retry(#[from] RetryPolicyError),

    #[error("cannot open storage root {path}: {source}")]
    StorageRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageProvider {
    Local,
    Memory,
}

impl FromStr for StorageProvider {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "memory" | "in_memory" | "in-memory" => Ok(Self::Memory),
            _ => Err(ConfigError::UnknownProvider(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub local_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::Local,
            local_root: PathBuf::from("./Cloud"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrySettings {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub jitter_fraction: f64,
    pub deadline_ms: Option<u64>,
    pub fail_fast_on_permanent: bool,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 100,
            max_delay_ms: 5000,
            backoff_multiplier: 2.0,
            jitter_fraction: 0.1,
            deadline_ms: None,
            fail_fast_on_permanent: false,
        }
    }
}

impl RetrySettings {
    pub fn to_policy(&self) -> Result<RetryPolicy, RetryPolicyError> {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.backoff_multiplier,
            self.jitter_fraction,
        )
    }

    pub fn to_executor(&self) -> Result<ResilientExecutor, RetryPolicyError> {
        Ok(ResilientExecutor::new(self.to_policy()?)
            .with_optional_deadline(self.deadline_ms.map(Duration::from_millis))
            .fail_fast_on_permanent(self.fail_fast_on_permanent))
    }
}

/// Connection liveness settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RealtimeSettings {
    pub heartbeat_interval_secs: u64,
    pub idle_timeout_secs: u64,
    pub send_timeout_secs: u64,
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            idle_timeout_secs: 300,
            send_timeout_secs: 10,
        }
    }
}

impl RealtimeSettings {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub storage: StorageConfig,
    pub retry: RetrySettings,
    pub realtime: RealtimeSettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            storage: StorageConfig::default(),
            retry: RetrySettings::default(),
            realtime: RealtimeSettings::default(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `lookup`, which receives full key names
    /// (e.g. `CLOUDWATCHER_BIND_ADDR`).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Lookup(lookup);
        let defaults = Self::default();

        let storage = StorageConfig {
            provider: match env.get("STORAGE_PROVIDER") {
                Some((_, raw)) => raw.parse()?,
                None => defaults.storage.provider,
            },
            local_root: env
                .get("STORAGE_LOCAL_ROOT")
                .map(|(_, raw)| PathBuf::from(raw))
                .unwrap_or(defaults.storage.local_root),
        };

        let d = defaults.retry;
        let retry = RetrySettings {
            max_retries: env.parse("RETRY_MAX_RETRIES")?.unwrap_or(d.max_retries),
            initial_delay_ms: env.parse("RETRY_INITIAL_DELAY_MS")?.unwrap_or(d.initial_delay_ms),
            max_delay_ms: env.parse("RETRY_MAX_DELAY_MS")?.unwrap_or(d.max_delay_ms),
            backoff_multiplier: env
                .parse("RETRY_BACKOFF_MULTIPLIER")?
                .unwrap_or(d.backoff_multiplier),
            jitter_fraction: env.parse("RETRY_JITTER_FRACTION")?.unwrap_or(d.jitter_fraction),
            deadline_ms: env.parse("RETRY_DEADLINE_MS")?,
            fail_fast_on_permanent: env
                .parse("RETRY_FAIL_FAST_PERMANENT")?
                .unwrap_or(d.fail_fast_on_permanent),
        };
        // Reject a bad policy at load time rather than on first use.
        retry.to_policy()?;

        let r = defaults.realtime;
        let realtime = RealtimeSettings {
            heartbeat_interval_secs: env
                .parse_positive("HEARTBEAT_INTERVAL_SECS")?
                .unwrap_or(r.heartbeat_interval_secs),
            idle_timeout_secs: env
                .parse_positive("IDLE_TIMEOUT_SECS")?
                .unwrap_or(r.idle_timeout_secs),
            send_timeout_secs: env
                .parse_positive("SEND_TIMEOUT_SECS")?
                .unwrap_or(r.send_timeout_secs),
        };

        Ok(Self {
            bind_addr: env.parse("BIND_ADDR")?.unwrap_or(defaults.bind_addr),
            storage,
            retry,
            realtime,
        })
    }
}

struct Lookup<F>(F);

impl<F> Lookup<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, name: &str) -> Option<(String, String)> {
        let key = format!("{ENV_PREFIX}{name}");
        let raw = (self.0)(&key)?;
        let raw = raw.trim();
        (!raw.is_empty()).then(|| (key, raw.to_string()))
    }

    fn parse<T>(&self, name: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let Some((key, raw)) = self.get(name) else {
            return Ok(None);
        };
        raw.parse().map(Some).map_err(|e: T::Err| ConfigError::InvalidValue {
            key,
            value: raw,
            reason: e.to_string(),
        })
    }

    fn parse_positive(&self, name: &str) -> Result<Option<u64>, ConfigError> {
        match self.parse::<u64>(name)? {
            Some(0) => Err(ConfigError::InvalidValue {
                key: format!("{ENV_PREFIX}{name}"),
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            }),
            other => Ok(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (format!("{ENV_PREFIX}{k}"), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn empty_environment_yields_defaults() {
        let config = load(&[]).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.retry.to_policy().unwrap(), RetryPolicy::default());
        assert_eq!(config.realtime.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.realtime.idle_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn overrides_are_applied() {
        let config = load(&[
            ("BIND_ADDR", "127.0.0.1:9000"),
            ("STORAGE_PROVIDER", "memory"),
            ("RETRY_MAX_RETRIES", "5"),
            ("RETRY_DEADLINE_MS", "2500"),
            ("RETRY_FAIL_FAST_PERMANENT", "true"),
            ("IDLE_TIMEOUT_SECS", "60"),
        ])
        .unwrap();

        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.storage.provider, StorageProvider::Memory);
        assert_eq!(config.retry.max_retries, 5);
        let executor = config.retry.to_executor().unwrap();
        assert_eq!(executor.deadline(), Some(Duration::from_millis(2500)));
        assert_eq!(executor.policy().max_retries(), 5);
        assert_eq!(config.realtime.idle_timeout_secs, 60);
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let config = load(&[("RETRY_MAX_RETRIES", "  ")]).unwrap();
        assert_eq!(config.retry.max_retries, 3);
    }

    #[test]
    fn invalid_values_name_the_key() {
        let err = load(&[("RETRY_MAX_RETRIES", "lots")]).unwrap_err();
        assert!(err.to_string().contains("CLOUDWATCHER_RETRY_MAX_RETRIES"));

        assert!(matches!(
            load(&[("STORAGE_PROVIDER", "s3")]),
            Err(ConfigError::UnknownProvider(_))
        ));
        assert!(matches!(
            load(&[("RETRY_BACKOFF_MULTIPLIER", "1.0")]),
            Err(ConfigError::Retry(RetryPolicyError::Multiplier(_)))
        ));
        assert!(load(&[("HEARTBEAT_INTERVAL_SECS", "0")]).is_err());
    }
}
