//! Resource reconciler protocol and dispatch.
//!
//! Each resource type implements [`Resource`]. The [`ResourceRegistry`] is
//! the inbound interface: it validates desired state, resolves timeouts,
//! calls the resource, reads back after writes and turns failures into
//! diagnostics.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use crate::config::{ProviderConfig, Timeouts};
use crate::diag::Diagnostics;
use crate::error::{ReconcileError, Result};
use crate::partition::CapabilityGuard;
use crate::plan::{self, prepare, tag_delta};
use crate::schema::ResourceDescriptor;
use crate::state::{DesiredState, ObservedState, ReadResult};
use crate::tags::TagDelta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Create,
    Read,
    Update,
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "creating",
            Operation::Read => "reading",
            Operation::Update => "updating",
            Operation::Delete => "deleting",
        };
        f.write_str(name)
    }
}

/// Per-invocation context handed to a [`Resource`].
#[derive(Debug)]
pub struct Invocation<'a> {
    pub config: &'a ProviderConfig,
    pub timeouts: Timeouts,
    /// The resource was created in this invocation.
    pub new_resource: bool,
    /// Changed update groups (updates only).
    pub changes: BTreeSet<&'static str>,
    /// Change to the effective remote tags (updates only).
    pub tag_delta: TagDelta,
    pub diagnostics: Diagnostics,
    assigned_id: Option<String>,
}

impl<'a> Invocation<'a> {
    pub fn new(config: &'a ProviderConfig, timeouts: Timeouts) -> Self {
        Self {
            config,
            timeouts,
            new_resource: false,
            changes: BTreeSet::new(),
            tag_delta: TagDelta::default(),
            diagnostics: Diagnostics::new(),
            assigned_id: None,
        }
    }

    pub fn has_change(&self, group: &str) -> bool {
        self.changes.contains(group)
    }

    /// Record the identity as soon as the remote side assigns it.
    pub fn assign_id(&mut self, id: impl Into<String>) {
        self.assigned_id = Some(id.into());
    }

    pub fn assigned_id(&self) -> Option<&str> {
        self.assigned_id.as_deref()
    }

    pub fn guard(&self) -> CapabilityGuard<'a> {
        CapabilityGuard::new(self.config)
    }

    pub fn poll_interval(&self) -> Duration {
        self.config.polling.interval
    }

    pub fn propagation_timeout(&self) -> Duration {
        self.config.polling.propagation_timeout
    }
}

/// Create/Read/Update/Delete for one resource type.
#[async_trait]
pub trait Resource: Send + Sync {
    fn descriptor(&self) -> &ResourceDescriptor;

    /// Create the resource and return its identity.
    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String>;

    /// Read the resource. `desired` is the configuration in effect, if known.
    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult>;

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()>;

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, state: &DesiredState) -> Result<()>;
}

/// Result of one inbound call.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Response {
    /// Identity of the resource, including a partially created one.
    pub id: Option<String>,
    /// Observed state; `None` after delete or when the resource is absent.
    pub state: Option<ObservedState>,
    pub diagnostics: Diagnostics,
}

impl Response {
    pub fn is_ok(&self) -> bool {
        !self.diagnostics.has_errors()
    }
}

/// Dispatches inbound calls to registered resource types.
pub struct ResourceRegistry {
    config: Arc<ProviderConfig>,
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
}

impl ResourceRegistry {
    pub fn new(config: Arc<ProviderConfig>) -> Self {
        Self {
            config,
            resources: BTreeMap::new(),
        }
    }

    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        let type_name = resource.descriptor().type_name;
        self.resources.insert(type_name, resource);
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub fn descriptor(&self, type_name: &str) -> Option<&ResourceDescriptor> {
        self.resources.get(type_name).map(|r| r.descriptor())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ResourceDescriptor> {
        self.resources.values().map(|r| r.descriptor())
    }

    fn resource(&self, type_name: &str) -> Result<&dyn Resource> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| ReconcileError::terminal(format!("unknown resource type {}", type_name)))
    }

    /// Plan a transition without contacting the remote side.
    pub fn plan(
        &self,
        type_name: &str,
        prior: Option<&DesiredState>,
        desired: &DesiredState,
    ) -> Result<plan::Plan> {
        let resource = self.resource(type_name)?;
        Ok(plan::plan(resource.descriptor(), prior, desired, &self.config)?)
    }

    pub async fn create(&self, type_name: &str, desired: &DesiredState) -> Response {
        let op = Operation::Create;
        let (resource, prepared) = match self
            .resource(type_name)
            .and_then(|r| Ok((r, prepare(r.descriptor(), desired)?)))
        {
            Ok(v) => v,
            Err(e) => return failed(op, type_name, None, e, Diagnostics::new()),
        };

        info!(resource_type = type_name, "Creating resource");
        let mut inv = Invocation::new(&self.config, prepared.timeouts);
        inv.new_resource = true;

        let result = create_and_read(resource, &mut inv, &prepared.desired).await;
        let id = inv.assigned_id().map(str::to_string);
        match result {
            Ok(state) => {
                info!(resource_type = type_name, id = %state.id, "Created resource");
                Response {
                    id: Some(state.id.clone()),
                    state: Some(state),
                    diagnostics: inv.diagnostics,
                }
            }
            Err(e) => failed(op, type_name, id, e, inv.diagnostics),
        }
    }

    /// Read a tracked resource. An absent resource yields `state: None` and no error.
    pub async fn read(
        &self,
        type_name: &str,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Response {
        let op = Operation::Read;
        let resource = match self.resource(type_name) {
            Ok(r) => r,
            Err(e) => return failed(op, type_name, Some(id.to_string()), e, Diagnostics::new()),
        };
        let prepared = match desired.map(|d| prepare(resource.descriptor(), d)).transpose() {
            Ok(p) => p,
            Err(e) => {
                return failed(op, type_name, Some(id.to_string()), e.into(), Diagnostics::new());
            }
        };
        let timeouts = prepared.as_ref().map(|p| p.timeouts).unwrap_or_else(|| {
            Timeouts::resolve(&resource.descriptor().timeouts, None).unwrap_or_default()
        });

        let mut inv = Invocation::new(&self.config, timeouts);
        let result = resource
            .read(&mut inv, id, prepared.as_ref().map(|p| &p.desired))
            .await;
        match result {
            Ok(ReadResult::Found(state)) => Response {
                id: Some(state.id.clone()),
                state: Some(state),
                diagnostics: inv.diagnostics,
            },
            Ok(ReadResult::Absent) => {
                warn!(resource_type = type_name, id, "Resource not found, removing from state");
                Response {
                    id: None,
                    state: None,
                    diagnostics: inv.diagnostics,
                }
            }
            Err(e) if e.is_not_found() => {
                warn!(resource_type = type_name, id, "Resource not found, removing from state: {}", e);
                Response {
                    id: None,
                    state: None,
                    diagnostics: inv.diagnostics,
                }
            }
            Err(e) => failed(op, type_name, Some(id.to_string()), e, inv.diagnostics),
        }
    }

    pub async fn update(
        &self,
        type_name: &str,
        id: &str,
        old: &DesiredState,
        new: &DesiredState,
    ) -> Response {
        let op = Operation::Update;
        let prepared = self.resource(type_name).and_then(|r| {
            let old = prepare(r.descriptor(), old)?;
            let new = prepare(r.descriptor(), new)?;
            Ok((r, old, new))
        });
        let (resource, old, new) = match prepared {
            Ok(v) => v,
            Err(e) => return failed(op, type_name, Some(id.to_string()), e, Diagnostics::new()),
        };

        let descriptor = resource.descriptor();
        let replace = descriptor.replacement_fields(&old.desired.fields, &new.desired.fields);
        if !replace.is_empty() {
            let e = ReconcileError::terminal(format!(
                "changing {} requires replacing the resource",
                replace.join(", ")
            ));
            return failed(op, type_name, Some(id.to_string()), e, Diagnostics::new());
        }

        let mut inv = Invocation::new(&self.config, new.timeouts);
        inv.changes = descriptor.changed_groups(&old.desired.fields, &new.desired.fields);
        if descriptor.taggable {
            inv.tag_delta = tag_delta(&self.config, &old.desired.tags, &new.desired.tags);
        }
        info!(
            resource_type = type_name,
            id,
            changes = ?inv.changes,
            "Updating resource"
        );

        let result = update_and_read(resource, &mut inv, id, &old.desired, &new.desired).await;
        match result {
            Ok(state) => Response {
                id: Some(state.id.clone()),
                state: Some(state),
                diagnostics: inv.diagnostics,
            },
            Err(e) => failed(op, type_name, Some(id.to_string()), e, inv.diagnostics),
        }
    }

    /// Delete a resource. Deleting an absent resource succeeds.
    pub async fn delete(&self, type_name: &str, id: &str, state: &DesiredState) -> Response {
        let op = Operation::Delete;
        let resolved = self
            .resource(type_name)
            .and_then(|r| Ok((r, plan::timeouts(r.descriptor(), state)?)));
        let (resource, timeouts) = match resolved {
            Ok(v) => v,
            Err(e) => return failed(op, type_name, Some(id.to_string()), e, Diagnostics::new()),
        };

        info!(resource_type = type_name, id, "Deleting resource");
        let mut inv = Invocation::new(&self.config, timeouts);
        match resource.delete(&mut inv, id, state).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                info!(resource_type = type_name, id, "Resource already gone");
            }
            Err(e) => return failed(op, type_name, Some(id.to_string()), e, inv.diagnostics),
        }
        Response {
            id: None,
            state: None,
            diagnostics: inv.diagnostics,
        }
    }
}

async fn create_and_read(
    resource: &dyn Resource,
    inv: &mut Invocation<'_>,
    desired: &DesiredState,
) -> Result<ObservedState> {
    let id = resource.create(inv, desired).await?;
    inv.assign_id(id.as_str());
    read_back(resource, inv, &id, desired).await
}

async fn update_and_read(
    resource: &dyn Resource,
    inv: &mut Invocation<'_>,
    id: &str,
    old: &DesiredState,
    new: &DesiredState,
) -> Result<ObservedState> {
    resource.update(inv, id, old, new).await?;
    inv.new_resource = true;
    read_back(resource, inv, id, new).await
}

async fn read_back(
    resource: &dyn Resource,
    inv: &mut Invocation<'_>,
    id: &str,
    desired: &DesiredState,
) -> Result<ObservedState> {
    match resource.read(inv, id, Some(desired)).await? {
        ReadResult::Found(state) => Ok(state),
        ReadResult::Absent => Err(ReconcileError::terminal(
            "empty result reading back the resource",
        )),
    }
}

fn failed(
    op: Operation,
    type_name: &str,
    id: Option<String>,
    err: ReconcileError,
    mut diagnostics: Diagnostics,
) -> Response {
    let summary = match &id {
        Some(id) => format!("{} {} ({}): {}", op, type_name, id, err),
        None => format!("{} {}: {}", op, type_name, err),
    };
    diagnostics.error(summary);
    Response {
        id,
        state: None,
        diagnostics,
    }
}
