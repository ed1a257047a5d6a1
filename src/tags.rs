//! Resource tags
//!
//! Resource-level `tags` are unioned with provider default tags into `tags_all`.
//! Keys with the reserved `aws:` prefix belong to the platform and are never
//! read into state or sent in updates.

use crate::aws::ApiError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;

pub type Tags = BTreeMap<String, String>;

const SYSTEM_TAG_PREFIX: &str = "aws:";

/// Tagging endpoints shared by every taggable service
#[async_trait]
pub trait TagApi: Send + Sync {
    async fn list_tags(&self, arn: &str) -> Result<Tags, ApiError>;
    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<(), ApiError>;
    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), ApiError>;
}

/// Default tags overlaid by resource tags
pub fn merge(defaults: &Tags, resource: &Tags) -> Tags {
    let mut all = defaults.clone();
    all.extend(resource.iter().map(|(k, v)| (k.clone(), v.clone())));
    all
}

/// Drop platform-managed tags
pub fn ignore_system(tags: Tags) -> Tags {
    tags.into_iter()
        .filter(|(k, _)| !k.starts_with(SYSTEM_TAG_PREFIX))
        .collect()
}

/// Resource-level tags: everything not supplied unchanged by the defaults
pub fn strip_defaults(all: &Tags, defaults: &Tags) -> Tags {
    all.iter()
        .filter(|(k, v)| defaults.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Changes needed to go from `old` to `new`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TagDiff {
    pub upsert: Tags,
    pub remove: Vec<String>,
}

impl TagDiff {
    pub fn is_empty(&self) -> bool {
        self.upsert.is_empty() && self.remove.is_empty()
    }
}

pub fn diff(old: &Tags, new: &Tags) -> TagDiff {
    let upsert = new
        .iter()
        .filter(|(k, v)| old.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let remove = old
        .keys()
        .filter(|k| !new.contains_key(*k))
        .cloned()
        .collect();
    TagDiff { upsert, remove }
}

/// Apply tag changes: removals first, then upserts
pub async fn update_tags<A: TagApi + ?Sized>(
    api: &A,
    arn: &str,
    old: &Tags,
    new: &Tags,
) -> Result<(), ApiError> {
    let changes = diff(&ignore_system(old.clone()), &ignore_system(new.clone()));
    if changes.is_empty() {
        return Ok(());
    }

    tracing::debug!(
        "Updating tags for {}: {} upserts, {} removals",
        arn,
        changes.upsert.len(),
        changes.remove.len()
    );

    if !changes.remove.is_empty() {
        api.untag_resource(arn, &changes.remove).await?;
    }
    if !changes.upsert.is_empty() {
        api.tag_resource(arn, &changes.upsert).await?;
    }
    Ok(())
}

/// `(tags, tags_all)` for state, from tags read back from the API
pub fn for_state(remote: Tags, defaults: &Tags) -> (Tags, Tags) {
    let all = ignore_system(remote);
    (strip_defaults(&all, defaults), all)
}

/// Put back configured tags that [`for_state`] took for defaults because the
/// values match. Only keys still present remotely come back.
pub fn keep_configured(own: &mut Tags, configured: &Tags, all: &Tags) {
    for key in configured.keys() {
        if let Some(value) = all.get(key) {
            own.insert(key.clone(), value.clone());
        }
    }
}

/// [`keep_configured`] over a state object, using `tags` from `source`
/// (configuration or prior state)
pub fn restore_configured(state: &mut Value, source: &Value) {
    let parse = |v: Option<&Value>| -> Option<Tags> { v.and_then(|v| serde_json::from_value(v.clone()).ok()) };
    let (Some(configured), Some(all)) = (parse(source.get("tags")), parse(state.get("tags_all"))) else {
        return;
    };
    if configured.is_empty() {
        return;
    }
    let mut own = parse(state.get("tags")).unwrap_or_default();
    keep_configured(&mut own, &configured, &all);
    if let (Some(fields), Ok(own)) = (state.as_object_mut(), serde_json::to_value(own)) {
        fields.insert("tags".to_string(), own);
    }
}
