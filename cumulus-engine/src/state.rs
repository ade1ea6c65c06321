//! Desired and observed resource state.

use serde::{Deserialize, Serialize};

use crate::tags::TagSet;
use crate::value::Fields;

/// User-declared configuration for one resource instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesiredState {
    pub fields: Fields,
    /// Resource tags, without provider defaults.
    pub tags: TagSet,
}

impl DesiredState {
    pub fn new(fields: Fields) -> Self {
        Self {
            fields,
            tags: TagSet::new(),
        }
    }

    pub fn with_tags(mut self, tags: TagSet) -> Self {
        self.tags = tags;
        self
    }
}

/// Remote state as last read. Replaced wholesale on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedState {
    pub id: String,
    pub fields: Fields,
    /// Resource-only view: keys that only come from default tags are removed.
    pub tags: TagSet,
    /// Effective tags on the remote resource.
    pub tags_all: TagSet,
}

impl ObservedState {
    pub fn new(id: impl Into<String>, fields: Fields) -> Self {
        Self {
            id: id.into(),
            fields,
            tags: TagSet::new(),
            tags_all: TagSet::new(),
        }
    }
}

/// Result of a read.
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Found(ObservedState),
    /// Drop the resource from tracked state.
    Absent,
}

impl ReadResult {
    pub fn found(self) -> Option<ObservedState> {
        match self {
            ReadResult::Found(state) => Some(state),
            ReadResult::Absent => None,
        }
    }
}
