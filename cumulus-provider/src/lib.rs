//! Resource types for the cumulus reconciliation engine.
//!
//! [`api`] declares the remote client traits, [`resources`] implements the
//! create/read/update/delete protocol for each type on top of them, and
//! [`memory`] is an in-memory backend for local runs and tests.

pub mod api;
pub mod memory;
pub mod resources;

use std::sync::Arc;

use cumulus_engine::{ProviderConfig, ResourceRegistry};

use crate::api::Cloud;

/// A registry with every resource type bound to `cloud`.
pub fn registry<C: Cloud + 'static>(config: Arc<ProviderConfig>, cloud: Arc<C>) -> ResourceRegistry {
    let mut registry = ResourceRegistry::new(config);
    for resource in resources::all(cloud) {
        registry.register(resource);
    }
    registry
}
