//! Resource types built on the reconciliation engine.
//!
//! Each submodule holds one resource type: its descriptor, the conversions
//! between configuration fields and wire structs, and its [`Resource`]
//! implementation. The helpers below carry the tag handling every taggable
//! type shares.

pub mod api;
pub mod container_service;
pub mod ontap_volume;
pub mod repository;
pub mod resource_share;
pub mod task_set;

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;

use cumulus_engine::tagging::{project_tags, update_tags};
use cumulus_engine::waiter::retry_transient;
use cumulus_engine::{
    DesiredState, Invocation, ObservedState, Outcome, Resource, Result, TagDelta, TagOrigin,
    TagSet,
};

use crate::api::{Cloud, TagClient};

pub const TAG_ON_CREATE: &str = "tag-on-create";
pub const TAGGING: &str = "tagging";
pub const LIST_TAGS: &str = "list tags";

/// Every resource type, bound to one cloud backend.
pub fn all<C: Cloud + 'static>(cloud: Arc<C>) -> Vec<Arc<dyn Resource>> {
    vec![
        Arc::new(api::ApiResource::new(cloud.clone())),
        Arc::new(repository::RepositoryResource::new(cloud.clone())),
        Arc::new(task_set::TaskSetResource::new(cloud.clone())),
        Arc::new(container_service::ContainerServiceResource::new(cloud.clone())),
        Arc::new(ontap_volume::OntapVolumeResource::new(cloud.clone())),
        Arc::new(resource_share::ResourceShareResource::new(cloud)),
    ]
}

/// Issue a create call with the effective tags attached.
///
/// Throttled attempts are repeated within the create timeout. On partitions
/// that reject tags on create the call is repeated without them; the returned
/// tags must then be applied with [`tag_after_create`].
pub(crate) async fn create_with_tags<T, F, Fut>(
    inv: &mut Invocation<'_>,
    desired: &DesiredState,
    call: F,
) -> Result<(T, Option<TagSet>)>
where
    F: Fn(Option<TagSet>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let (timeout, interval) = (inv.timeouts.create, inv.poll_interval());
    let call = &call;
    let attempt = move |tags: Option<TagSet>| async move {
        retry_transient(timeout, interval, || call(tags.clone())).await
    };

    let tags = inv.config.effective_tags(&desired.tags);
    if tags.is_empty() {
        return Ok((attempt(None).await?, None));
    }
    let guard = inv.guard();
    let (record, deferred) = guard
        .call_with_fallback(TAG_ON_CREATE, &mut inv.diagnostics, |include| {
            attempt(include.then(|| tags.clone()))
        })
        .await?;
    Ok((record, deferred.then_some(tags)))
}

/// Apply tags that were dropped from the create call.
pub(crate) async fn tag_after_create<C: TagClient + ?Sized>(
    inv: &mut Invocation<'_>,
    client: &C,
    arn: &str,
    desired: &DesiredState,
    deferred: Option<TagSet>,
) -> Result<()> {
    let Some(tags) = deferred else {
        return Ok(());
    };
    let delta = TagDelta {
        removed: BTreeSet::new(),
        updated: tags,
    };
    let (config, timeout, interval) = (inv.config, inv.timeouts.create, inv.poll_interval());
    let guard = inv.guard();
    guard
        .apply_deferred(
            TAGGING,
            TagOrigin::of(&desired.tags),
            &mut inv.diagnostics,
            retry_transient(timeout, interval, || {
                update_tags(config, client, arn, &delta)
            }),
        )
        .await
}

/// Apply the invocation's tag delta.
pub(crate) async fn update_resource_tags<C: TagClient + ?Sized>(
    inv: &mut Invocation<'_>,
    client: &C,
    arn: &str,
    new: &DesiredState,
) -> Result<()> {
    let delta = inv.tag_delta.clone();
    apply_tag_delta(inv, client, arn, new, delta).await
}

/// Apply `delta` to the tags of `arn`.
pub(crate) async fn apply_tag_delta<C: TagClient + ?Sized>(
    inv: &mut Invocation<'_>,
    client: &C,
    arn: &str,
    new: &DesiredState,
    delta: TagDelta,
) -> Result<()> {
    if delta.is_empty() {
        return Ok(());
    }
    let (config, timeout, interval) = (inv.config, inv.timeouts.update, inv.poll_interval());
    let guard = inv.guard();
    guard
        .apply_deferred(
            TAGGING,
            TagOrigin::of(&new.tags),
            &mut inv.diagnostics,
            retry_transient(timeout, interval, || {
                update_tags(config, client, arn, &delta)
            }),
        )
        .await
}

/// List tags with a separate call; unsupported partitions skip with a warning.
pub(crate) async fn list_tags<C: TagClient + ?Sized>(
    inv: &mut Invocation<'_>,
    client: &C,
    arn: &str,
) -> Result<Option<TagSet>> {
    let config = inv.config;
    let result = retry_transient(inv.propagation_timeout(), inv.poll_interval(), || async {
        config.classify(client.list_tags(arn).await, &[])
    })
    .await;
    let guard = inv.guard();
    guard.tolerate(LIST_TAGS, &mut inv.diagnostics, result)
}

/// Fill `tags` and `tags_all` from the remote tags.
pub(crate) fn set_tags(
    inv: &Invocation<'_>,
    state: &mut ObservedState,
    remote: &TagSet,
    desired: Option<&DesiredState>,
) {
    let (tags, all) = project_tags(inv.config, remote, desired.map(|d| &d.tags));
    state.tags = tags;
    state.tags_all = all;
}

/// Like [`set_tags`]; when listing was skipped, the configured tags stand in.
pub(crate) fn set_listed_tags(
    inv: &Invocation<'_>,
    state: &mut ObservedState,
    listed: Option<TagSet>,
    desired: Option<&DesiredState>,
) {
    let remote = match listed {
        Some(tags) => tags,
        None => desired
            .map(|d| inv.config.effective_tags(&d.tags))
            .unwrap_or_default(),
    };
    set_tags(inv, state, &remote, desired);
}

/// Check outcome for a wait-until-deleted loop: any record means still there.
pub(crate) fn still_present<T>(found: Result<T>) -> Outcome<()> {
    match found {
        Ok(_) => Outcome::Retryable("present".to_string()),
        Err(e) => Outcome::from(Err(e)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use cumulus_engine::{ApiError, ProviderConfig, Timeouts};

    use super::*;
    use crate::memory::MemoryCloud;

    fn iso_config() -> ProviderConfig {
        let mut config = ProviderConfig::default();
        config.partition.id = "aws-iso".to_string();
        config.default_tags = TagSet::from([("env", "prod")]);
        config
    }

    #[tokio::test]
    async fn test_create_without_tags_skips_guard() {
        let mut config = iso_config();
        config.default_tags = TagSet::new();
        let mut inv = Invocation::new(&config, Timeouts::default());

        let seen = Mutex::new(Vec::new());
        let (value, deferred) = create_with_tags(&mut inv, &DesiredState::default(), |tags| {
            seen.lock().unwrap().push(tags.is_some());
            async { Ok(1) }
        })
        .await
        .unwrap();

        assert_eq!(value, 1);
        assert!(deferred.is_none());
        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_retries_throttled_attempts() {
        let config = &ProviderConfig::default();
        let mut inv = Invocation::new(config, Timeouts::default());
        let desired = DesiredState::default().with_tags(TagSet::from([("team", "infra")]));

        let attempts = Mutex::new(0);
        let (value, deferred) = create_with_tags(&mut inv, &desired, |tags| {
            let mut n = attempts.lock().unwrap();
            *n += 1;
            let throttled = *n < 3;
            async move {
                assert!(tags.is_some());
                if throttled {
                    config.classify(Err(ApiError::new("ThrottlingException", "Rate exceeded")), &[])
                } else {
                    Ok("created")
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, "created");
        assert!(deferred.is_none());
        assert_eq!(*attempts.lock().unwrap(), 3);
        assert!(inv.diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_deferred_default_tags_warn_when_tagging_unsupported() {
        let config = iso_config();
        let cloud = MemoryCloud::new();
        cloud.reject_tagging(true).await;

        let mut inv = Invocation::new(&config, Timeouts::default());
        let desired = DesiredState::default();
        tag_after_create(
            &mut inv,
            &cloud,
            "arn:x",
            &desired,
            Some(TagSet::from([("env", "prod")])),
        )
        .await
        .unwrap();
        assert_eq!(inv.diagnostics.warnings().count(), 1);

        let mut inv = Invocation::new(&config, Timeouts::default());
        let desired = DesiredState::default().with_tags(TagSet::from([("team", "infra")]));
        let err = tag_after_create(
            &mut inv,
            &cloud,
            "arn:x",
            &desired,
            Some(TagSet::from([("env", "prod"), ("team", "infra")])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), cumulus_engine::ErrorKind::PartitionUnsupported);
    }

    #[tokio::test]
    async fn test_list_tags_tolerated() {
        let config = iso_config();
        let cloud = MemoryCloud::new();
        cloud.reject_tagging(true).await;

        let mut inv = Invocation::new(&config, Timeouts::default());
        let tags = list_tags(&mut inv, &cloud, "arn:x").await.unwrap();
        assert!(tags.is_none());
        assert_eq!(inv.diagnostics.len(), 1);
    }
}
