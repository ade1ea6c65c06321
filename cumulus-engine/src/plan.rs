//! Change planning.
//!
//! Decides which calls a reconciliation pass needs by comparing the prior
//! desired state with the new one.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::config::{ProviderConfig, TIMEOUTS_FIELD, Timeouts};
use crate::schema::{ResourceDescriptor, ValidationError};
use crate::state::DesiredState;
use crate::tags::{TagDelta, TagSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Update,
    Replace,
    NoOp,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub action: Action,
    /// Update groups with changes.
    pub groups: BTreeSet<&'static str>,
    /// Changed fields that force replacement.
    pub replace: Vec<&'static str>,
    /// Change to the effective remote tags.
    pub tags: TagDelta,
    pub timeouts: Timeouts,
}

/// A desired state ready to be handed to a resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub desired: DesiredState,
    pub timeouts: Timeouts,
}

/// Timeouts for `desired`, honouring its `timeouts` block.
pub fn timeouts(
    descriptor: &ResourceDescriptor,
    desired: &DesiredState,
) -> Result<Timeouts, ValidationError> {
    let block = desired.fields.block(TIMEOUTS_FIELD)?;
    Timeouts::resolve(&descriptor.timeouts, block.as_ref())
}

/// Split off the timeouts block, validate, and apply defaults.
pub fn prepare(
    descriptor: &ResourceDescriptor,
    desired: &DesiredState,
) -> Result<Prepared, ValidationError> {
    let timeouts = timeouts(descriptor, desired)?;
    let mut desired = desired.clone();
    desired.fields.remove(TIMEOUTS_FIELD);

    if !descriptor.taggable && !desired.tags.is_empty() {
        return Err(ValidationError::Unknown {
            field: "tags".to_string(),
        });
    }
    descriptor.validate(&desired.fields)?;
    descriptor.apply_defaults(&mut desired.fields);

    Ok(Prepared { desired, timeouts })
}

/// Tag delta between two desired states, over effective remote tags.
pub fn tag_delta(config: &ProviderConfig, old: &TagSet, new: &TagSet) -> TagDelta {
    let old = config.effective_tags(old);
    let new = config.effective_tags(new);
    old.diff(&new, &config.ignore_tags)
}

/// Plan the transition from `prior` (None for a new resource) to `desired`.
pub fn plan(
    descriptor: &ResourceDescriptor,
    prior: Option<&DesiredState>,
    desired: &DesiredState,
    config: &ProviderConfig,
) -> Result<Plan, ValidationError> {
    let next = prepare(descriptor, desired)?;
    let taggable = descriptor.taggable;

    let Some(prior) = prior else {
        let tags = if taggable {
            tag_delta(config, &TagSet::new(), &next.desired.tags)
        } else {
            TagDelta::default()
        };
        return Ok(Plan {
            action: Action::Create,
            groups: BTreeSet::new(),
            replace: Vec::new(),
            tags,
            timeouts: next.timeouts,
        });
    };

    let prior = prepare(descriptor, prior)?;
    let old = &prior.desired.fields;
    let new = &next.desired.fields;

    let replace = descriptor.replacement_fields(old, new);
    let groups = descriptor.changed_groups(old, new);
    let tags = if taggable {
        tag_delta(config, &prior.desired.tags, &next.desired.tags)
    } else {
        TagDelta::default()
    };

    let action = if !replace.is_empty() {
        Action::Replace
    } else if !groups.is_empty() || !tags.is_empty() {
        Action::Update
    } else {
        Action::NoOp
    };

    Ok(Plan {
        action,
        groups,
        replace,
        tags,
        timeouts: next.timeouts,
    })
}
