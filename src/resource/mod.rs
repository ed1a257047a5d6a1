//! Resource abstraction layer
//!
//! Every resource type implements the typed [`Resource`] trait: a config type
//! deserialized from configuration, a state type mirrored from the API, and the
//! four CRUD operations. The registry hands resources out type-erased as
//! [`DynResource`] so the CLI and the acceptance harness can drive any type by
//! name through JSON values.
//!
//! # Architecture
//!
//! - [`registry`] - Static service package tables, lookup by type name
//! - [`lifecycle`] - Plan/apply/refresh/import/destroy over erased resources
//! - [`wait`] - Status polling for asynchronous APIs
//!
//! # Example
//!
//! ```ignore
//! use awsprov::resource::{lifecycle, registry};
//!
//! async fn create(ctx: &awsprov::provider::ResourceContext) -> anyhow::Result<()> {
//!     let resource = registry::new_resource("aws_appconfig_extension")?;
//!     let config = serde_yaml::from_str(FIXTURE)?;
//!     let state = lifecycle::apply(resource.as_ref(), ctx, None, &config).await?;
//!     Ok(())
//! }
//! ```

pub mod lifecycle;
pub mod registry;
pub mod wait;

pub use registry::*;

use crate::provider::ResourceContext;
use crate::schema::{Diagnostics, Schema, Validate};
use crate::tags;
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

/// A typed resource implementation
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    type Config: DeserializeOwned + Serialize + Validate + Send + Sync;
    type State: DeserializeOwned + Serialize + Send + Sync;

    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Remote identifier stored in state
    fn id(state: &Self::State) -> &str;

    async fn create(&self, ctx: &ResourceContext, config: &Self::Config) -> Result<Self::State>;

    /// `Ok(None)` when the API reports the resource does not exist
    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<Self::State>>;

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: &Self::State,
        config: &Self::Config,
    ) -> Result<Self::State>;

    /// Must succeed when the resource is already gone
    async fn delete(&self, ctx: &ResourceContext, state: &Self::State) -> Result<()>;

    /// Best-known state for an object whose create failed part way, built
    /// from the new remote identifier and the configuration
    fn placeholder(id: &str, config: &Self::Config) -> Self::State;

    /// Copy configuration-only values the API never returns from prior state
    /// into freshly read state
    fn carry_over(&self, _prior: &Self::State, _fresh: &mut Self::State) {}
}

/// The remote object exists, but a later step of create failed
#[derive(Debug, thiserror::Error)]
#[error("{error:#}")]
pub struct Incomplete {
    pub id: String,
    pub error: anyhow::Error,
}

/// Marks create errors that happen after the remote identifier is known
pub trait CreatedExt<T> {
    fn created(self, id: &str) -> Result<T>;
}

impl<T> CreatedExt<T> for Result<T> {
    fn created(self, id: &str) -> Result<T> {
        self.map_err(|error| {
            Incomplete {
                id: id.to_string(),
                error,
            }
            .into()
        })
    }
}

/// State key flagging a resource that must be replaced on the next apply
pub const TAINTED: &str = "tainted";

/// A failed create that left a remote object behind, with the state to
/// track it by
#[derive(Debug, thiserror::Error)]
#[error("{error:#}")]
pub struct Tainted {
    pub state: Value,
    pub error: anyhow::Error,
}

pub fn is_tainted(state: &Value) -> bool {
    state.get(TAINTED).and_then(Value::as_bool).unwrap_or(false)
}

pub fn mark_tainted(state: &mut Value) {
    if let Some(fields) = state.as_object_mut() {
        fields.insert(TAINTED.to_string(), Value::Bool(true));
    }
}

/// Type-erased resource, driven through JSON values
#[async_trait]
pub trait DynResource: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Deserialize and validate raw configuration; returns the normalized form.
    /// Never calls the API.
    fn decode_config(&self, raw: &Value) -> Result<Value, Diagnostics>;

    fn state_id(&self, state: &Value) -> Result<String>;

    /// A create that fails after the remote object exists returns a
    /// [`Tainted`] error carrying state for it
    async fn create(&self, ctx: &ResourceContext, config: &Value) -> Result<Value>;

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<Value>>;

    /// Re-read the resource behind `prior`, keeping configuration-only values
    async fn refresh(&self, ctx: &ResourceContext, prior: &Value) -> Result<Option<Value>>;

    async fn update(&self, ctx: &ResourceContext, prior: &Value, config: &Value) -> Result<Value>;

    async fn delete(&self, ctx: &ResourceContext, state: &Value) -> Result<()>;
}

/// Adapter from a typed [`Resource`] to [`DynResource`]
pub struct Erased<R>(pub R);

impl<R: Resource> Erased<R> {
    fn config(&self, config: &Value) -> Result<R::Config> {
        serde_json::from_value(config.clone())
            .with_context(|| format!("decoding {} configuration", self.0.type_name()))
    }

    fn state(&self, state: &Value) -> Result<R::State> {
        serde_json::from_value(state.clone())
            .with_context(|| format!("decoding {} state", self.0.type_name()))
    }
}

#[async_trait]
impl<R: Resource> DynResource for Erased<R> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn schema(&self) -> Schema {
        self.0.schema()
    }

    fn decode_config(&self, raw: &Value) -> Result<Value, Diagnostics> {
        let config: R::Config = serde_json::from_value(raw.clone())?;
        let mut diags = Diagnostics::new();
        config.validate(&mut diags);
        diags.into_result()?;
        Ok(serde_json::to_value(&config)?)
    }

    fn state_id(&self, state: &Value) -> Result<String> {
        let state = self.state(state)?;
        Ok(R::id(&state).to_string())
    }

    async fn create(&self, ctx: &ResourceContext, config_value: &Value) -> Result<Value> {
        let config = self.config(config_value)?;
        match self.0.create(ctx, &config).await {
            Ok(state) => {
                let mut state = serde_json::to_value(state)?;
                tags::restore_configured(&mut state, config_value);
                Ok(state)
            }
            Err(err) => match err.downcast::<Incomplete>() {
                Ok(Incomplete { id, error }) => {
                    let mut state = serde_json::to_value(R::placeholder(&id, &config))?;
                    mark_tainted(&mut state);
                    Err(Tainted { state, error }.into())
                }
                Err(err) => Err(err),
            },
        }
    }

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<Value>> {
        match self.0.read(ctx, id).await? {
            Some(state) => Ok(Some(serde_json::to_value(state)?)),
            None => Ok(None),
        }
    }

    async fn refresh(&self, ctx: &ResourceContext, prior_value: &Value) -> Result<Option<Value>> {
        let prior = self.state(prior_value)?;
        match self.0.read(ctx, R::id(&prior)).await? {
            Some(mut fresh) => {
                self.0.carry_over(&prior, &mut fresh);
                let mut fresh = serde_json::to_value(fresh)?;
                tags::restore_configured(&mut fresh, prior_value);
                Ok(Some(fresh))
            }
            None => Ok(None),
        }
    }

    async fn update(&self, ctx: &ResourceContext, prior: &Value, config_value: &Value) -> Result<Value> {
        let prior = self.state(prior)?;
        let config = self.config(config_value)?;
        let state = self.0.update(ctx, &prior, &config).await?;
        let mut state = serde_json::to_value(state)?;
        tags::restore_configured(&mut state, config_value);
        Ok(state)
    }

    async fn delete(&self, ctx: &ResourceContext, state: &Value) -> Result<()> {
        let state = self.state(state)?;
        self.0.delete(ctx, &state).await
    }
}
