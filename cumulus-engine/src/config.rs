//! Provider configuration.
//!
//! One [`ProviderConfig`] value is built at startup and passed by reference
//! into every invocation. Nothing in the engine reads global state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{ApiError, DEFAULT_RETRYABLE_CODES, Result as ReconcileResult, classify};
use crate::partition::{PartitionConfig, UnsupportedSignature};
use crate::schema::{DefaultTimeouts, ValidationError};
use crate::tags::{IgnoreTags, TagSet};
use crate::value::Fields;

/// Timeout used when neither the resource nor its type specifies one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20 * 60);

/// Desired-state block holding per-resource timeout overrides.
pub const TIMEOUTS_FIELD: &str = "timeouts";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Delay between polls.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Extra allowance for reads of a resource created in the same invocation.
    #[serde(with = "humantime_serde")]
    pub propagation_timeout: Duration,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            propagation_timeout: Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub default_tags: TagSet,
    pub ignore_tags: IgnoreTags,
    pub partition: PartitionConfig,
    pub unsupported_signatures: Vec<UnsupportedSignature>,
    /// Remote error codes retried within the operation budget.
    pub retryable_codes: Vec<String>,
    pub polling: PollingConfig,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            default_tags: TagSet::new(),
            ignore_tags: IgnoreTags::default(),
            partition: PartitionConfig::default(),
            unsupported_signatures: UnsupportedSignature::defaults(),
            retryable_codes: DEFAULT_RETRYABLE_CODES.iter().map(|c| c.to_string()).collect(),
            polling: PollingConfig::default(),
        }
    }
}

impl ProviderConfig {
    /// Load a JSON configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: ProviderConfig =
            serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval.is_zero() {
            return Err(ConfigError::Invalid(
                "polling.interval must be greater than zero".to_string(),
            ));
        }
        if self.partition.id.is_empty() || self.partition.default_id.is_empty() {
            return Err(ConfigError::Invalid(
                "partition ids must not be empty".to_string(),
            ));
        }
        if self.unsupported_signatures.iter().any(|s| s.code.is_empty()) {
            return Err(ConfigError::Invalid(
                "unsupported_signatures entries need a code".to_string(),
            ));
        }
        if self.retryable_codes.iter().any(String::is_empty) {
            return Err(ConfigError::Invalid(
                "retryable_codes must not contain empty codes".to_string(),
            ));
        }
        Ok(())
    }

    /// Classify a remote result with this configuration's retryable codes.
    pub fn classify<T>(
        &self,
        result: std::result::Result<T, ApiError>,
        not_found_codes: &[&str],
    ) -> ReconcileResult<T> {
        classify(result, not_found_codes, &self.retryable_codes)
    }

    /// Tags to write remotely: defaults merged with `resource`, ignores removed.
    pub fn effective_tags(&self, resource: &TagSet) -> TagSet {
        TagSet::merge(&self.default_tags, resource)
            .ignore_system()
            .ignore(&self.ignore_tags)
    }
}

/// Resolved Create/Update/Delete budgets for one invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Timeouts {
    #[serde(with = "humantime_serde")]
    pub create: Duration,
    #[serde(with = "humantime_serde")]
    pub update: Duration,
    #[serde(with = "humantime_serde")]
    pub delete: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            create: DEFAULT_TIMEOUT,
            update: DEFAULT_TIMEOUT,
            delete: DEFAULT_TIMEOUT,
        }
    }
}

impl Timeouts {
    /// Overrides from a `timeouts` block win over the type defaults.
    pub fn resolve(
        defaults: &DefaultTimeouts,
        block: Option<&Fields>,
    ) -> Result<Self, ValidationError> {
        let pick = |name: &str, default: Option<Duration>| -> Result<Duration, ValidationError> {
            let configured = match block {
                Some(block) => block.string(name)?,
                None => None,
            };
            match configured {
                Some(raw) => humantime::parse_duration(raw).map_err(|e| ValidationError::Invalid {
                    field: format!("{}.{}", TIMEOUTS_FIELD, name),
                    reason: format!("invalid duration {:?}: {}", raw, e),
                }),
                None => Ok(default.unwrap_or(DEFAULT_TIMEOUT)),
            }
        };

        Ok(Self {
            create: pick("create", defaults.create)?,
            update: pick("update", defaults.update)?,
            delete: pick("delete", defaults.delete)?,
        })
    }
}
