//! Resource lifecycle
//!
//! Plans and applies changes for one resource instance. Configuration is
//! validated before any API call; a failed step returns an error and the caller
//! keeps its last stored state. A create that fails after the remote object
//! exists is the exception: its error carries tainted state (see
//! [`tainted_state`]) so the object is tracked and replaced on the next apply.

use super::{is_tainted, mark_tainted, DynResource, Tainted, TAINTED};
use crate::aws::error::is_not_found;
use crate::provider::ResourceContext;
use crate::schema::values_equal;
use crate::tags::{self, Tags};
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;

/// What applying a configuration will do
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Create,
    NoOp,
    Update { changed: Vec<String> },
    Replace { triggers: Vec<String> },
    Delete,
}

impl PlanAction {
    pub fn is_noop(&self) -> bool {
        matches!(self, PlanAction::NoOp)
    }
}

impl std::fmt::Display for PlanAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanAction::Create => write!(f, "create"),
            PlanAction::NoOp => write!(f, "no changes"),
            PlanAction::Update { changed } => write!(f, "update in-place ({})", changed.join(", ")),
            PlanAction::Replace { triggers } => {
                write!(f, "replace (forced by {})", triggers.join(", "))
            }
            PlanAction::Delete => write!(f, "destroy"),
        }
    }
}

/// Compare prior state with a decoded configuration
pub fn plan(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    prior: Option<&Value>,
    config: &Value,
) -> PlanAction {
    let Some(prior) = prior else {
        return PlanAction::Create;
    };
    if is_tainted(prior) {
        return PlanAction::Replace {
            triggers: vec![TAINTED.to_string()],
        };
    }

    let schema = resource.schema();
    let triggers = schema.replace_triggers(prior, config);
    if !triggers.is_empty() {
        return PlanAction::Replace {
            triggers: triggers.into_iter().map(String::from).collect(),
        };
    }

    let mut changed: Vec<String> = schema
        .changed_attributes(prior, config)
        .into_iter()
        .map(|a| a.name.to_string())
        .collect();

    // Default tags can change without the resource's own tags changing
    if schema.attribute("tags_all").is_some() && !changed.iter().any(|c| c == "tags") {
        let want = desired_tags_all(ctx, config);
        let have = prior.get("tags_all").cloned().unwrap_or(Value::Null);
        if !values_equal(&have, &serde_json::to_value(want).unwrap_or(Value::Null)) {
            changed.push("tags_all".to_string());
        }
    }

    if changed.is_empty() {
        PlanAction::NoOp
    } else {
        PlanAction::Update { changed }
    }
}

fn desired_tags_all(ctx: &ResourceContext, config: &Value) -> Tags {
    let own: Tags = config
        .get("tags")
        .and_then(|v| serde_json::from_value(v.clone()).ok())
        .unwrap_or_default();
    tags::merge(&ctx.default_tags, &own)
}

/// Validate raw configuration and converge the resource onto it.
///
/// Returns the new state. On error the stored state stays at the last
/// successful read, unless [`tainted_state`] finds state for a half-created
/// object in the error.
pub async fn apply(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    prior: Option<&Value>,
    raw_config: &Value,
) -> Result<Value> {
    let type_name = resource.type_name();
    let config = resource
        .decode_config(raw_config)
        .with_context(|| format!("invalid {type_name} configuration"))?;

    let action = plan(resource, ctx, prior, &config);
    tracing::info!("{}: {}", type_name, action);

    match (action, prior) {
        (PlanAction::NoOp, Some(prior)) => Ok(prior.clone()),
        (PlanAction::Update { .. }, Some(prior)) => {
            let id = resource.state_id(prior)?;
            resource
                .update(ctx, prior, &config)
                .await
                .with_context(|| format!("updating {type_name} ({id})"))
        }
        (PlanAction::Replace { .. }, Some(prior)) => {
            destroy(resource, ctx, prior).await?;
            create(resource, ctx, &config).await
        }
        _ => create(resource, ctx, &config).await,
    }
}

async fn create(resource: &dyn DynResource, ctx: &ResourceContext, config: &Value) -> Result<Value> {
    let type_name = resource.type_name();
    let state = resource.create(ctx, config).await.map_err(|err| {
        if let Some(state) = err.downcast_ref::<Tainted>().map(|t| &t.state) {
            let id = resource.state_id(state).unwrap_or_default();
            tracing::warn!("{} ({}) created but not ready, marking tainted", type_name, id);
        }
        err.context(format!("creating {type_name}"))
    })?;
    tracing::info!("{} created: {}", type_name, resource.state_id(&state)?);
    Ok(state)
}

/// State for a remote object left behind by a failed create
pub fn tainted_state(err: &anyhow::Error) -> Option<&Value> {
    err.downcast_ref::<Tainted>().map(|t| &t.state)
}

/// Re-read remote state. `Ok(None)` means the resource is gone.
pub async fn refresh(
    resource: &dyn DynResource,
    ctx: &ResourceContext,
    state: &Value,
) -> Result<Option<Value>> {
    let id = resource.state_id(state)?;
    let mut refreshed = resource
        .refresh(ctx, state)
        .await
        .with_context(|| format!("reading {} ({id})", resource.type_name()))?;
    if is_tainted(state) {
        if let Some(fresh) = refreshed.as_mut() {
            mark_tainted(fresh);
        }
    }
    if refreshed.is_none() {
        tracing::warn!(
            "{} ({}) not found, removing from state",
            resource.type_name(),
            id
        );
    }
    Ok(refreshed)
}

/// Adopt an existing remote resource by its identifier
pub async fn import(resource: &dyn DynResource, ctx: &ResourceContext, id: &str) -> Result<Value> {
    let type_name = resource.type_name();
    tracing::info!("Importing {} ({})", type_name, id);
    resource
        .read(ctx, id)
        .await
        .with_context(|| format!("importing {type_name} ({id})"))?
        .with_context(|| format!("cannot import non-existent remote object {type_name} ({id})"))
}

/// Delete a resource; an already-deleted resource is success
pub async fn destroy(resource: &dyn DynResource, ctx: &ResourceContext, state: &Value) -> Result<()> {
    let type_name = resource.type_name();
    let id = resource.state_id(state)?;
    tracing::info!("Destroying {} ({})", type_name, id);
    match resource.delete(ctx, state).await {
        Err(err) if is_not_found(&err) => {
            tracing::debug!("{} ({}) already gone", type_name, id);
            Ok(())
        }
        result => result.with_context(|| format!("deleting {type_name} ({id})")),
    }
}
