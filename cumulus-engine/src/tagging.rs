//! Remote tag reconciliation.

use std::collections::BTreeSet;

use async_trait::async_trait;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{ApiError, Result};
use crate::tags::{TagDelta, TagSet};

/// Tag operations shared by every taggable service.
#[async_trait]
pub trait TagClient: Send + Sync {
    async fn list_tags(&self, arn: &str) -> std::result::Result<TagSet, ApiError>;

    async fn tag_resource(&self, arn: &str, tags: &TagSet) -> std::result::Result<(), ApiError>;

    async fn untag_resource(
        &self,
        arn: &str,
        keys: &BTreeSet<String>,
    ) -> std::result::Result<(), ApiError>;
}

/// Apply `delta` to the resource: untag removed keys, then tag updated ones.
pub async fn update_tags<C: TagClient + ?Sized>(
    config: &ProviderConfig,
    client: &C,
    arn: &str,
    delta: &TagDelta,
) -> Result<()> {
    if !delta.removed.is_empty() {
        debug!(arn, keys = ?delta.removed, "Untagging resource");
        config.classify(client.untag_resource(arn, &delta.removed).await, &[])?;
    }
    if !delta.updated.is_empty() {
        debug!(arn, count = delta.updated.len(), "Tagging resource");
        config.classify(client.tag_resource(arn, &delta.updated).await, &[])?;
    }
    Ok(())
}

/// Project remote tags into `(tags, tags_all)`.
///
/// Reserved and ignored keys are dropped from both. `tags` additionally drops
/// keys that carry their default value, unless `configured` sets that key.
pub fn project_tags(
    config: &ProviderConfig,
    remote: &TagSet,
    configured: Option<&TagSet>,
) -> (TagSet, TagSet) {
    let all = remote.ignore_system().ignore(&config.ignore_tags);
    let tags = all.without_defaults(&config.default_tags, configured);
    (tags, all)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl TagClient for Recorder {
        async fn list_tags(&self, _arn: &str) -> std::result::Result<TagSet, ApiError> {
            Ok(TagSet::new())
        }

        async fn tag_resource(&self, arn: &str, tags: &TagSet) -> std::result::Result<(), ApiError> {
            let keys: Vec<&str> = tags.keys().collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("tag {} {}", arn, keys.join(",")));
            Ok(())
        }

        async fn untag_resource(
            &self,
            arn: &str,
            keys: &BTreeSet<String>,
        ) -> std::result::Result<(), ApiError> {
            let keys: Vec<&str> = keys.iter().map(String::as_str).collect();
            self.calls
                .lock()
                .unwrap()
                .push(format!("untag {} {}", arn, keys.join(",")));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_update_tags_order_and_skips() {
        let config = ProviderConfig::default();
        let client = Recorder::default();
        let delta = TagDelta {
            removed: BTreeSet::from(["old".to_string()]),
            updated: TagSet::from([("new", "1")]),
        };
        update_tags(&config, &client, "arn:x", &delta).await.unwrap();
        update_tags(&config, &client, "arn:x", &TagDelta::default())
            .await
            .unwrap();

        let calls = client.calls.lock().unwrap().clone();
        assert_eq!(calls, vec!["untag arn:x old", "tag arn:x new"]);
    }

    #[test]
    fn test_project_tags() {
        let mut config = ProviderConfig::default();
        config.default_tags = TagSet::from([("env", "prod")]);
        config.ignore_tags.key_prefixes.push("internal/".to_string());

        let remote = TagSet::from([
            ("env", "prod"),
            ("team", "infra"),
            ("internal/id", "7"),
            ("aws:cloudformation:stack-id", "s"),
        ]);

        let (tags, all) = project_tags(&config, &remote, Some(&TagSet::from([("team", "infra")])));
        assert_eq!(tags, TagSet::from([("team", "infra")]));
        assert_eq!(all, TagSet::from([("env", "prod"), ("team", "infra")]));
    }
}
