//! Configuration consumed by the Supervisor, Monitors and Tasks.
//!
//! Storage of configuration is someone else's job; this module only parses
//! and validates a JSON document handed to us. Durations are milliseconds.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Credential, RetryPolicy, WatchTarget};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Top-level document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StockwatchConfig {
    #[serde(default)]
    pub supervisor: SupervisorConfig,
    #[serde(default)]
    pub groups: Vec<GroupConfig>,
}

impl StockwatchConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.supervisor.validate()?;
        let mut names = HashSet::new();
        for group in &self.groups {
            group.validate()?;
            if !names.insert(group.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate group name '{}'",
                    group.name
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Per-subscriber queue capacity of the event bus.
    pub bus_capacity: usize,

    /// Poll interval while waiting for another Task's login.
    #[serde(rename = "account_poll_ms", with = "millis")]
    pub account_poll: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            account_poll: Duration::from_millis(250),
        }
    }
}

impl SupervisorConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bus_capacity == 0 {
            return Err(ConfigError::Invalid("bus_capacity must be > 0".to_string()));
        }
        if self.account_poll.is_zero() {
            return Err(ConfigError::Invalid("account_poll_ms must be > 0".to_string()));
        }
        Ok(())
    }
}

/// One group: a Monitor over `targets` plus the Tasks it feeds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    pub name: String,
    pub retailer: String,

    /// Minimum polling interval.
    #[serde(rename = "delay_ms", with = "millis", default = "default_delay")]
    pub delay: Duration,

    /// Fixed backoff between failed session warm-ups.
    #[serde(rename = "warm_backoff_ms", with = "millis", default = "default_warm_backoff")]
    pub warm_backoff: Duration,

    pub targets: Vec<WatchTarget>,

    #[serde(default)]
    pub tasks: Vec<TaskConfig>,
}

fn default_delay() -> Duration {
    Duration::from_secs(3)
}

fn default_warm_backoff() -> Duration {
    Duration::from_secs(2)
}

impl GroupConfig {
    pub fn new(name: impl Into<String>, retailer: impl Into<String>, targets: Vec<WatchTarget>) -> Self {
        Self {
            name: name.into(),
            retailer: retailer.into(),
            delay: default_delay(),
            warm_backoff: default_warm_backoff(),
            targets,
            tasks: Vec::new(),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_warm_backoff(mut self, backoff: Duration) -> Self {
        self.warm_backoff = backoff;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("group name must not be empty".to_string()));
        }
        if self.targets.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "group '{}' has no targets",
                self.name
            )));
        }
        if self.delay.is_zero() || self.warm_backoff.is_zero() {
            return Err(ConfigError::Invalid(format!(
                "group '{}': delays must be > 0",
                self.name
            )));
        }
        let mut ids = HashSet::new();
        for target in &self.targets {
            if !ids.insert(target.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "group '{}': duplicate target id '{}'",
                    self.name, target.id
                )));
            }
            if let Some(max) = target.max_price {
                if !max.is_finite() || max < 0.0 {
                    return Err(ConfigError::Invalid(format!(
                        "group '{}': target '{}' has invalid max_price {max}",
                        self.name, target.id
                    )));
                }
            }
        }
        for task in &self.tasks {
            task.validate().map_err(|e| match e {
                ConfigError::Invalid(msg) => {
                    ConfigError::Invalid(format!("group '{}': {msg}", self.name))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

/// One checkout Task.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    /// `None` = guest checkout, no login step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<Credential>,

    /// Shipping/billing profile, opaque to the core.
    #[serde(default)]
    pub profile: serde_json::Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<String>,

    #[serde(default)]
    pub retry: RetryPolicy,
}

impl TaskConfig {
    pub fn guest(retry: RetryPolicy) -> Self {
        Self {
            retry,
            ..Self::default()
        }
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.delay.is_zero() {
            return Err(ConfigError::Invalid("retry delay_ms must be > 0".to_string()));
        }
        if !self.retry.multiplier.is_finite() || self.retry.multiplier < 1.0 {
            return Err(ConfigError::Invalid(format!(
                "retry multiplier {} must be >= 1.0",
                self.retry.multiplier
            )));
        }
        if let Some(c) = &self.credential {
            if c.identifier.is_empty() {
                return Err(ConfigError::Invalid(
                    "credential identifier must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// `Duration` as integer milliseconds.
pub mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
