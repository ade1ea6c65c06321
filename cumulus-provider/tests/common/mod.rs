//! Shared setup for provider integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cumulus_engine::{Diagnostics, ProviderConfig, ResourceRegistry, Response, TagSet};
use cumulus_provider::memory::MemoryCloud;

pub struct Harness {
    pub cloud: Arc<MemoryCloud>,
    pub registry: ResourceRegistry,
}

impl Harness {
    pub fn new(config: ProviderConfig) -> Self {
        let cloud = Arc::new(MemoryCloud::new());
        let registry = cumulus_provider::registry(Arc::new(config), cloud.clone());
        Self { cloud, registry }
    }

    /// Default partition, no default tags.
    pub fn standard() -> Self {
        Self::new(config("aws"))
    }

    /// A partition that may degrade unsupported capabilities.
    pub fn isolated(default_tags: TagSet) -> Self {
        let mut config = config("aws-iso");
        config.default_tags = default_tags;
        Self::new(config)
    }
}

pub fn config(partition: &str) -> ProviderConfig {
    let mut config = ProviderConfig::default();
    config.partition.id = partition.to_string();
    config.polling.interval = Duration::from_secs(1);
    config.polling.propagation_timeout = Duration::from_secs(30);
    config
}

pub fn warnings(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.warnings().map(|d| d.summary.clone()).collect()
}

pub fn errors(diagnostics: &Diagnostics) -> Vec<String> {
    diagnostics.errors().map(|d| d.summary.clone()).collect()
}

/// Panic with the diagnostics if the response carries errors.
pub fn assert_ok(response: &Response) {
    assert!(
        response.is_ok(),
        "unexpected errors: {:?}",
        errors(&response.diagnostics)
    );
}
