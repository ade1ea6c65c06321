//! Partition capability degradation.
//!
//! Some partitions reject optional request shapes, most commonly tags on a
//! create call. [`CapabilityGuard`] retries such calls without the capability
//! and decides whether a later failure to apply it separately is a warning
//! (default-only tags) or an error (explicitly configured tags).

use std::future::Future;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::ProviderConfig;
use crate::diag::Diagnostics;
use crate::error::{ApiError, ReconcileError, Result};
use crate::tags::TagOrigin;

/// Which partitions may drop an unsupported capability.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradePolicy {
    /// Every partition except the default one.
    #[default]
    NonDefault,
    Never,
    /// Only the listed partition ids.
    Listed(Vec<String>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PartitionConfig {
    /// Partition the provider runs in.
    pub id: String,
    /// The primary partition.
    pub default_id: String,
    pub degrade: DegradePolicy,
}

impl Default for PartitionConfig {
    fn default() -> Self {
        Self {
            id: "aws".to_string(),
            default_id: "aws".to_string(),
            degrade: DegradePolicy::default(),
        }
    }
}

impl PartitionConfig {
    pub fn may_degrade(&self) -> bool {
        match &self.degrade {
            DegradePolicy::NonDefault => self.id != self.default_id,
            DegradePolicy::Never => false,
            DegradePolicy::Listed(ids) => ids.iter().any(|id| *id == self.id),
        }
    }
}

/// Error shape that means "not supported in this partition".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnsupportedSignature {
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_contains: Option<String>,
}

impl UnsupportedSignature {
    pub fn code(code: &str) -> Self {
        Self {
            code: code.to_string(),
            message_contains: None,
        }
    }

    pub fn with_message(code: &str, fragment: &str) -> Self {
        Self {
            code: code.to_string(),
            message_contains: Some(fragment.to_string()),
        }
    }

    pub fn matches(&self, err: &ApiError) -> bool {
        match &self.message_contains {
            Some(fragment) => err.message_contains(&self.code, fragment),
            None => err.code == self.code,
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::code("UnsupportedOperation"),
            Self::code("UnknownOperationException"),
            Self::code("AccessDeniedException"),
            Self::with_message("InvalidParameterException", "Unrecognized parameter"),
            Self::with_message("ValidationException", "not supported"),
        ]
    }
}

/// Applies the degradation rules of one provider configuration.
#[derive(Debug, Clone, Copy)]
pub struct CapabilityGuard<'a> {
    partition: &'a PartitionConfig,
    signatures: &'a [UnsupportedSignature],
}

impl<'a> CapabilityGuard<'a> {
    pub fn new(config: &'a ProviderConfig) -> Self {
        Self {
            partition: &config.partition,
            signatures: &config.unsupported_signatures,
        }
    }

    /// True if `err` carries an "unsupported" signature.
    pub fn is_unsupported(&self, err: &ReconcileError) -> bool {
        err.api()
            .is_some_and(|api| self.signatures.iter().any(|s| s.matches(api)))
    }

    /// True if `err` is unsupported and this partition may degrade.
    pub fn can_degrade(&self, err: &ReconcileError) -> bool {
        self.partition.may_degrade() && self.is_unsupported(err)
    }

    /// Call with the capability; on an unsupported error, call again without it.
    ///
    /// Returns the result and whether the capability must be applied later.
    pub async fn call_with_fallback<T, F, Fut>(
        &self,
        capability: &str,
        diagnostics: &mut Diagnostics,
        mut call: F,
    ) -> Result<(T, bool)>
    where
        F: FnMut(bool) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match call(true).await {
            Ok(v) => Ok((v, false)),
            Err(e) if self.can_degrade(&e) => {
                diagnostics.warn(format!(
                    "{} unsupported in partition {}, retrying without it: {}",
                    capability, self.partition.id, e
                ));
                let v = call(false).await?;
                Ok((v, true))
            }
            Err(e) => Err(e),
        }
    }

    /// Apply a capability that was dropped from the original call.
    ///
    /// An unsupported failure is a warning when the tags only came from
    /// defaults and an error when the resource configured them.
    pub async fn apply_deferred<Fut>(
        &self,
        capability: &str,
        origin: TagOrigin,
        diagnostics: &mut Diagnostics,
        call: Fut,
    ) -> Result<()>
    where
        Fut: Future<Output = Result<()>>,
    {
        let err = match call.await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };
        if !self.can_degrade(&err) {
            return Err(err);
        }
        match origin {
            TagOrigin::DefaultOnly => {
                diagnostics.warn(format!(
                    "{} unsupported in partition {}, skipping default-only tags: {}",
                    capability, self.partition.id, err
                ));
                Ok(())
            }
            TagOrigin::Explicit => Err(self.unsupported(capability, err)),
        }
    }

    /// Turn an unsupported failure into a warning and skip the step.
    pub fn tolerate<T>(
        &self,
        capability: &str,
        diagnostics: &mut Diagnostics,
        result: Result<T>,
    ) -> Result<Option<T>> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) if self.can_degrade(&e) => {
                info!(capability, partition = %self.partition.id, "capability unsupported, skipping");
                diagnostics.warn(format!(
                    "{} unsupported in partition {}: {}",
                    capability, self.partition.id, e
                ));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn unsupported(&self, capability: &str, err: ReconcileError) -> ReconcileError {
        match err.api() {
            Some(api) => ReconcileError::PartitionUnsupported {
                partition: self.partition.id.clone(),
                capability: capability.to_string(),
                source: api.clone(),
            },
            None => err,
        }
    }
}
