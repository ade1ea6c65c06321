//! Tag merge model.
//!
//! Pure transformations over [`TagSet`]s: merging provider-wide default tags
//! with resource tags, filtering ignored keys, and computing the minimal
//! add/remove delta between two snapshots.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Key prefix reserved by the cloud platform. Tags under it are never diffed or written.
pub const RESERVED_TAG_PREFIX: &str = "aws:";

/// A mapping of tag key to tag value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(BTreeMap<String, String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Union of `defaults` and `resource`; resource values win on collision.
    pub fn merge(defaults: &TagSet, resource: &TagSet) -> TagSet {
        let mut merged = defaults.clone();
        for (k, v) in resource.iter() {
            merged.insert(k, v);
        }
        merged
    }

    /// Drop every key matched by `ignore`.
    pub fn ignore(&self, ignore: &IgnoreTags) -> TagSet {
        self.iter()
            .filter(|(k, _)| !ignore.matches(k))
            .collect()
    }

    /// Drop keys under [`RESERVED_TAG_PREFIX`].
    pub fn ignore_system(&self) -> TagSet {
        self.iter()
            .filter(|(k, _)| !k.starts_with(RESERVED_TAG_PREFIX))
            .collect()
    }

    /// Changes needed to turn `self` into `new`, after filtering both sides with `ignore`.
    pub fn diff(&self, new: &TagSet, ignore: &IgnoreTags) -> TagDelta {
        let old = self.ignore_system().ignore(ignore);
        let new = new.ignore_system().ignore(ignore);

        let removed = old
            .keys()
            .filter(|k| !new.contains_key(k))
            .map(str::to_string)
            .collect();
        let updated = new
            .iter()
            .filter(|(k, v)| old.get(k) != Some(*v))
            .collect();

        TagDelta { removed, updated }
    }

    /// The resource-only view of an effective tag set.
    ///
    /// Keys whose value equals the default-tag value are removed, unless the
    /// resource configures that key itself.
    pub fn without_defaults(&self, defaults: &TagSet, configured: Option<&TagSet>) -> TagSet {
        self.iter()
            .filter(|(k, v)| {
                let explicit = configured.is_some_and(|c| c.contains_key(k));
                explicit || defaults.get(k) != Some(*v)
            })
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for TagSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TagSet(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl<const N: usize> From<[(&str, &str); N]> for TagSet {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Minimal change between two tag snapshots.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TagDelta {
    /// Keys present before and absent after.
    pub removed: BTreeSet<String>,
    /// Keys that are new or whose value changed.
    pub updated: TagSet,
}

impl TagDelta {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.updated.is_empty()
    }

    /// Apply this delta to `tags`.
    pub fn apply(&self, tags: &TagSet) -> TagSet {
        let mut out = tags.clone();
        for k in &self.removed {
            out.remove(k);
        }
        for (k, v) in self.updated.iter() {
            out.insert(k, v);
        }
        out
    }
}

/// Keys that must never be diffed or written back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreTags {
    pub keys: BTreeSet<String>,
    pub key_prefixes: Vec<String>,
}

impl IgnoreTags {
    pub fn matches(&self, key: &str) -> bool {
        self.keys.contains(key) || self.key_prefixes.iter().any(|p| key.starts_with(p.as_str()))
    }
}

/// Whether the tags a resource carries were requested explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagOrigin {
    /// Every tag comes from the provider-wide defaults.
    DefaultOnly,
    /// The resource configures at least one tag.
    Explicit,
}

impl TagOrigin {
    pub fn of(resource_tags: &TagSet) -> Self {
        if resource_tags.is_empty() {
            TagOrigin::DefaultOnly
        } else {
            TagOrigin::Explicit
        }
    }
}
