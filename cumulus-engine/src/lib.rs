//! Reconciliation engine for cloud resource providers.
//!
//! The engine is resource-type agnostic. It provides the tag merge model,
//! an eventual-consistency finder, a bounded retry/wait engine, partition
//! capability degradation, and the [`registry::Resource`] protocol that each
//! resource type implements.

pub mod config;
pub mod diag;
pub mod error;
pub mod finder;
pub mod identity;
pub mod partition;
pub mod plan;
pub mod registry;
pub mod schema;
pub mod state;
pub mod tagging;
pub mod tags;
pub mod value;
pub mod waiter;

pub use config::{ProviderConfig, Timeouts};
pub use diag::{Diagnostic, Diagnostics, Severity};
pub use error::{ApiError, ErrorKind, ReconcileError, Result};
pub use identity::IdentityFormat;
pub use registry::{Invocation, Resource, ResourceRegistry, Response};
pub use state::{DesiredState, ObservedState, ReadResult};
pub use tags::{IgnoreTags, TagDelta, TagOrigin, TagSet};
pub use value::{Fields, Value};
pub use waiter::{Outcome, StatusWait, Waiter};
