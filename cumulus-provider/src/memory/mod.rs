//! In-memory cloud backend.
//!
//! Implements every client trait against local state so resources can be
//! reconciled without a remote service. Records move through their
//! lifecycles one describe call at a time, and tests can inject failures,
//! propagation lag and partition restrictions.

mod apigatewayv2;
mod ecr;
mod ecs;
mod fsx;
mod lightsail;
mod ram;

pub use ram::DEFAULT_PERMISSION;

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use async_trait::async_trait;
use cumulus_engine::{ApiError, TagSet};
use tokio::sync::Mutex;
use tracing::debug;

use crate::api::TagClient;

pub const DEFAULT_ACCOUNT: &str = "123456789012";
pub const DEFAULT_REGION: &str = "us-east-1";

/// A record whose lifecycle status can be moved by the backend.
trait Lifecycle: Clone {
    fn set_status(&mut self, status: &'static str);
}

/// Where a record goes once its pending observations run out.
#[derive(Debug, Clone, Copy)]
enum Next {
    Status(&'static str),
    Gone,
}

#[derive(Debug, Clone, Copy)]
struct Transition {
    polls: u32,
    next: Next,
}

#[derive(Debug, Clone)]
struct Entry<T> {
    record: T,
    transition: Option<Transition>,
    /// Describes that still miss this record.
    hidden: u32,
}

impl<T: Lifecycle> Entry<T> {
    fn new(record: T, hidden: u32) -> Self {
        Self {
            record,
            transition: None,
            hidden,
        }
    }

    /// Move to `status` now and to `next` after `polls` observations.
    /// Returns false if the record is already gone.
    fn start(&mut self, status: &'static str, polls: u32, next: Next) -> bool {
        self.record.set_status(status);
        self.transition = Some(Transition { polls, next });
        self.advance(0)
    }

    fn advance(&mut self, step: u32) -> bool {
        let Some(t) = self.transition.as_mut() else {
            return true;
        };
        t.polls = t.polls.saturating_sub(step);
        if t.polls > 0 {
            return true;
        }
        let next = t.next;
        self.transition = None;
        match next {
            Next::Status(status) => {
                self.record.set_status(status);
                true
            }
            Next::Gone => false,
        }
    }
}

/// Observe the record under `key` once. Hidden or gone records read as `None`.
fn observe<T: Lifecycle>(map: &mut BTreeMap<String, Entry<T>>, key: &str) -> Option<T> {
    let entry = map.get_mut(key)?;
    if entry.hidden > 0 {
        entry.hidden -= 1;
        debug!(key, remaining = entry.hidden, "record not visible yet");
        return None;
    }
    if entry.advance(1) {
        Some(entry.record.clone())
    } else {
        map.remove(key);
        None
    }
}

/// Look up a record without advancing its lifecycle.
fn peek<'a, T>(map: &'a mut BTreeMap<String, Entry<T>>, key: &str) -> Option<&'a mut T> {
    map.get_mut(key).map(|e| &mut e.record)
}

#[derive(Debug, Default)]
struct State {
    apis: BTreeMap<String, Entry<crate::api::apigatewayv2::Api>>,
    repositories: BTreeMap<String, Entry<crate::api::ecr::Repository>>,
    images: BTreeMap<String, usize>,
    services: BTreeSet<(String, String)>,
    task_sets: BTreeMap<String, Entry<crate::api::ecs::TaskSet>>,
    client_tokens: BTreeMap<String, String>,
    container_services: BTreeMap<String, Entry<crate::api::lightsail::ContainerService>>,
    volumes: BTreeMap<String, Entry<crate::api::fsx::Volume>>,
    volume_tokens: BTreeSet<String>,
    volume_failure: Option<String>,
    shares: BTreeMap<String, Entry<crate::api::ram::ResourceShare>>,
    share_permissions: BTreeMap<String, Vec<String>>,
    tags: BTreeMap<String, TagSet>,
    failures: BTreeMap<String, VecDeque<ApiError>>,
    calls: BTreeMap<String, u32>,
    settle_polls: u32,
    describe_lag: u32,
    reject_tag_on_create: bool,
    reject_tagging: bool,
    next_id: u64,
}

impl State {
    /// Count the call and pop an injected failure, if any.
    fn enter(&mut self, op: &str) -> Result<(), ApiError> {
        *self.calls.entry(op.to_string()).or_default() += 1;
        match self.failures.get_mut(op).and_then(VecDeque::pop_front) {
            Some(err) => {
                debug!(op, code = %err.code, "injected failure");
                Err(err)
            }
            None => Ok(()),
        }
    }

    fn check_tags_on_create(&self, tags: Option<&TagSet>) -> Result<(), ApiError> {
        if self.reject_tag_on_create && tags.is_some() {
            return Err(ApiError::new(
                "ValidationException",
                "Tagging on create is not supported in this partition",
            ));
        }
        Ok(())
    }

    fn check_tagging(&self) -> Result<(), ApiError> {
        if self.reject_tagging {
            return Err(ApiError::new(
                "UnsupportedOperation",
                "Tagging is not supported in this partition",
            ));
        }
        Ok(())
    }

    fn store_tags(&mut self, arn: &str, tags: Option<&TagSet>) {
        self.tags
            .insert(arn.to_string(), tags.cloned().unwrap_or_default());
    }

    fn sequence(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// A cloud account held in memory.
#[derive(Debug, Default)]
pub struct MemoryCloud {
    state: Mutex<State>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn arn(service: &str, resource: &str) -> String {
        format!(
            "arn:aws:{}:{}:{}:{}",
            service, DEFAULT_REGION, DEFAULT_ACCOUNT, resource
        )
    }

    /// Describe calls a record needs before it reaches its next status.
    pub async fn settle_after(&self, polls: u32) {
        self.state.lock().await.settle_polls = polls;
    }

    /// Newly created records stay invisible to this many describe calls.
    pub async fn lag_describes(&self, describes: u32) {
        self.state.lock().await.describe_lag = describes;
    }

    /// Reject create requests that carry tags.
    pub async fn reject_tag_on_create(&self, reject: bool) {
        self.state.lock().await.reject_tag_on_create = reject;
    }

    /// Reject every tagging call.
    pub async fn reject_tagging(&self, reject: bool) {
        self.state.lock().await.reject_tagging = reject;
    }

    /// Fail the next call of `op` with `err`. Repeated calls queue up.
    pub async fn fail_next(&self, op: &str, err: ApiError) {
        self.state
            .lock()
            .await
            .failures
            .entry(op.to_string())
            .or_default()
            .push_back(err);
    }

    /// Number of calls made to `op`, including failed ones.
    pub async fn calls(&self, op: &str) -> u32 {
        self.state.lock().await.calls.get(op).copied().unwrap_or(0)
    }

    /// Tags currently stored for `arn`, bypassing partition restrictions.
    pub async fn tags_of(&self, arn: &str) -> TagSet {
        self.state
            .lock()
            .await
            .tags
            .get(arn)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl TagClient for MemoryCloud {
    async fn list_tags(&self, arn: &str) -> Result<TagSet, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("list_tags")?;
        state.check_tagging()?;
        Ok(state.tags.get(arn).cloned().unwrap_or_default())
    }

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("tag_resource")?;
        state.check_tagging()?;
        let current = state.tags.entry(arn.to_string()).or_default();
        for (k, v) in tags.iter() {
            current.insert(k, v);
        }
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &BTreeSet<String>) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("untag_resource")?;
        state.check_tagging()?;
        if let Some(current) = state.tags.get_mut(arn) {
            for k in keys {
                current.remove(k);
            }
        }
        Ok(())
    }
}
