//! `aws_m2_environment`

use super::api::{environment_status as status, CreateEnvironmentInput, Environment, UpdateEnvironmentInput};
use super::application::ENGINE_TYPES;
use crate::provider::ResourceContext;
use crate::resource::wait::{Observed, StatusWaiter};
use crate::resource::{CreatedExt, Resource};
use crate::schema::{validate, AttrType, Attribute, Diagnostics, Schema, Validate};
use crate::tags::{self, Tags};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

pub const TYPE_NAME: &str = "aws_m2_environment";

const CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EnvironmentConfig {
    pub name: String,
    pub engine_type: String,
    pub instance_type: String,
    #[serde(default)]
    pub engine_version: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subnet_ids: BTreeSet<String>,
    #[serde(default)]
    pub security_group_ids: BTreeSet<String>,
    #[serde(default)]
    pub publicly_accessible: bool,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub preferred_maintenance_window: Option<String>,
    #[serde(default)]
    pub apply_changes_during_maintenance_window: bool,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentState {
    pub id: String,
    pub environment_id: String,
    pub arn: String,
    pub name: String,
    pub engine_type: String,
    pub engine_version: String,
    pub instance_type: String,
    pub description: Option<String>,
    pub subnet_ids: BTreeSet<String>,
    pub security_group_ids: BTreeSet<String>,
    pub publicly_accessible: bool,
    pub kms_key_id: Option<String>,
    pub preferred_maintenance_window: Option<String>,
    #[serde(default)]
    pub apply_changes_during_maintenance_window: bool,
    pub tags: Tags,
    pub tags_all: Tags,
}

/// `ddd:hh24:mi-ddd:hh24:mi`
fn is_maintenance_window(value: &str) -> bool {
    const DAYS: &[&str] = &["sun", "mon", "tue", "wed", "thu", "fri", "sat"];
    let bound = |part: &str| -> bool {
        let mut fields = part.split(':');
        match (fields.next(), fields.next(), fields.next(), fields.next()) {
            (Some(day), Some(hour), Some(minute), None) => {
                DAYS.contains(&day.to_ascii_lowercase().as_str())
                    && hour.len() == 2
                    && minute.len() == 2
                    && hour.parse::<u8>().map(|h| h < 24).unwrap_or(false)
                    && minute.parse::<u8>().map(|m| m < 60).unwrap_or(false)
            }
            _ => false,
        }
    };
    value
        .split_once('-')
        .map(|(start, end)| bound(start) && bound(end))
        .unwrap_or(false)
}

impl Validate for EnvironmentConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        validate::length(diags, "name", &self.name, 1, 60);
        validate::name_chars(diags, "name", &self.name);
        validate::one_of(diags, "engine_type", &self.engine_type, ENGINE_TYPES);
        validate::length(diags, "instance_type", &self.instance_type, 1, 20);
        if let Some(description) = &self.description {
            validate::length(diags, "description", description, 0, 500);
        }
        if let Some(window) = &self.preferred_maintenance_window {
            if !is_maintenance_window(window) {
                diags.error(
                    "preferred_maintenance_window",
                    format!("{window:?} must have the format ddd:hh24:mi-ddd:hh24:mi"),
                );
            }
        }
        if self.apply_changes_during_maintenance_window && self.engine_version.is_none() {
            diags.error(
                "apply_changes_during_maintenance_window",
                "engine_version must be set when applying changes during the maintenance window",
            );
        }
    }
}

async fn observe_environment(ctx: &ResourceContext, id: &str) -> Result<Observed<Environment>> {
    match ctx.m2.get_environment(id).await {
        Ok(env) => {
            let status = env.status.clone();
            Ok(Some((env, status)))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

async fn wait_environment(
    ctx: &ResourceContext,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<Option<Environment>> {
    StatusWaiter::new(pending, target, ctx.timeouts.cap(timeout))
        .poll_interval(ctx.timeouts.poll_interval)
        .wait(|| observe_environment(ctx, id))
        .await
        .with_context(|| format!("waiting for M2 Environment ({id})"))
}

/// The M2 runtime environment resource
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentResource;

impl EnvironmentResource {
    async fn read_back(&self, ctx: &ResourceContext, id: &str, config: &EnvironmentConfig) -> Result<EnvironmentState> {
        let mut state = self
            .read(ctx, id)
            .await?
            .with_context(|| format!("M2 Environment ({id}) not found after write"))?;
        state.apply_changes_during_maintenance_window = config.apply_changes_during_maintenance_window;
        Ok(state)
    }
}

#[async_trait]
impl Resource for EnvironmentResource {
    type Config = EnvironmentConfig;
    type State = EnvironmentState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::computed("id", AttrType::String),
            Attribute::computed("environment_id", AttrType::String),
            Attribute::computed("arn", AttrType::String),
            Attribute::required("name", AttrType::String).force_new(),
            Attribute::required("engine_type", AttrType::String)
                .force_new()
                .one_of(ENGINE_TYPES),
            Attribute::required("instance_type", AttrType::String),
            Attribute::optional_computed("engine_version", AttrType::String),
            Attribute::optional("description", AttrType::String).force_new(),
            Attribute::optional("subnet_ids", AttrType::Set).force_new(),
            Attribute::optional("security_group_ids", AttrType::Set).force_new(),
            Attribute::optional("publicly_accessible", AttrType::Bool).force_new(),
            Attribute::optional("kms_key_id", AttrType::String).force_new(),
            Attribute::optional_computed("preferred_maintenance_window", AttrType::String),
            Attribute::optional("apply_changes_during_maintenance_window", AttrType::Bool),
            Attribute::optional("tags", AttrType::Map),
            Attribute::computed("tags_all", AttrType::Map),
        ])
    }

    fn id(state: &EnvironmentState) -> &str {
        &state.id
    }

    async fn create(&self, ctx: &ResourceContext, config: &EnvironmentConfig) -> Result<EnvironmentState> {
        let input = CreateEnvironmentInput {
            name: config.name.clone(),
            engine_type: config.engine_type.clone(),
            instance_type: config.instance_type.clone(),
            engine_version: config.engine_version.clone(),
            description: config.description.clone().filter(|d| !d.is_empty()),
            subnet_ids: config.subnet_ids.iter().cloned().collect(),
            security_group_ids: config.security_group_ids.iter().cloned().collect(),
            publicly_accessible: config.publicly_accessible,
            kms_key_id: config.kms_key_id.clone(),
            preferred_maintenance_window: config.preferred_maintenance_window.clone(),
            tags: tags::ignore_system(tags::merge(&ctx.default_tags, &config.tags)),
            client_token: uuid::Uuid::new_v4().to_string(),
        };

        let id = ctx
            .m2
            .create_environment(&input)
            .await
            .with_context(|| format!("creating M2 Environment ({})", config.name))?;

        async {
            wait_environment(ctx, &id, &[status::CREATING], &[status::AVAILABLE], CREATE_TIMEOUT).await?;
            self.read_back(ctx, &id, config).await
        }
        .await
        .created(&id)
    }

    fn placeholder(id: &str, config: &EnvironmentConfig) -> EnvironmentState {
        EnvironmentState {
            id: id.to_string(),
            environment_id: id.to_string(),
            arn: String::new(),
            name: config.name.clone(),
            engine_type: config.engine_type.clone(),
            engine_version: config.engine_version.clone().unwrap_or_default(),
            instance_type: config.instance_type.clone(),
            description: config.description.clone(),
            subnet_ids: config.subnet_ids.clone(),
            security_group_ids: config.security_group_ids.clone(),
            publicly_accessible: config.publicly_accessible,
            kms_key_id: config.kms_key_id.clone(),
            preferred_maintenance_window: config.preferred_maintenance_window.clone(),
            apply_changes_during_maintenance_window: config.apply_changes_during_maintenance_window,
            tags: config.tags.clone(),
            tags_all: Tags::new(),
        }
    }

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<EnvironmentState>> {
        let env = match ctx.m2.get_environment(id).await {
            Ok(env) => env,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).context(format!("reading M2 Environment ({id})")),
        };

        let remote_tags = ctx
            .m2
            .list_tags(&env.environment_arn)
            .await
            .with_context(|| format!("listing tags for M2 Environment ({id})"))?;
        let (tags, tags_all) = tags::for_state(remote_tags, &ctx.default_tags);

        Ok(Some(EnvironmentState {
            id: env.environment_id.clone(),
            environment_id: env.environment_id,
            arn: env.environment_arn,
            name: env.name,
            engine_type: env.engine_type,
            engine_version: env.engine_version,
            instance_type: env.instance_type,
            description: env.description.filter(|d| !d.is_empty()),
            subnet_ids: env.subnet_ids.into_iter().collect(),
            security_group_ids: env.security_group_ids.into_iter().collect(),
            publicly_accessible: env.publicly_accessible,
            kms_key_id: env.kms_key_id,
            preferred_maintenance_window: env.preferred_maintenance_window,
            apply_changes_during_maintenance_window: false,
            tags,
            tags_all,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: &EnvironmentState,
        config: &EnvironmentConfig,
    ) -> Result<EnvironmentState> {
        let mut input = UpdateEnvironmentInput {
            environment_id: prior.id.clone(),
            ..Default::default()
        };
        if config.instance_type != prior.instance_type {
            input.instance_type = Some(config.instance_type.clone());
        }
        if let Some(version) = config.engine_version.as_ref().filter(|v| **v != prior.engine_version) {
            input.engine_version = Some(version.clone());
            input.apply_during_maintenance_window = config.apply_changes_during_maintenance_window;
        }
        if let Some(window) = config
            .preferred_maintenance_window
            .as_ref()
            .filter(|w| prior.preferred_maintenance_window.as_ref() != Some(*w))
        {
            input.preferred_maintenance_window = Some(window.clone());
        }

        if input.instance_type.is_some()
            || input.engine_version.is_some()
            || input.preferred_maintenance_window.is_some()
        {
            ctx.m2
                .update_environment(&input)
                .await
                .with_context(|| format!("updating M2 Environment ({})", prior.id))?;

            if !input.apply_during_maintenance_window {
                wait_environment(
                    ctx,
                    &prior.id,
                    &[status::UPDATING],
                    &[status::AVAILABLE],
                    UPDATE_TIMEOUT,
                )
                .await?;
            }
        }

        let want = tags::merge(&ctx.default_tags, &config.tags);
        tags::update_tags(ctx.m2.as_ref(), &prior.arn, &prior.tags_all, &want)
            .await
            .with_context(|| format!("updating tags for M2 Environment ({})", prior.id))?;

        self.read_back(ctx, &prior.id, config).await
    }

    fn carry_over(&self, prior: &EnvironmentState, fresh: &mut EnvironmentState) {
        fresh.apply_changes_during_maintenance_window = prior.apply_changes_during_maintenance_window;
    }

    async fn delete(&self, ctx: &ResourceContext, state: &EnvironmentState) -> Result<()> {
        match ctx.m2.delete_environment(&state.id).await {
            Err(e) if e.is_not_found() => return Ok(()),
            result => result.with_context(|| format!("deleting M2 Environment ({})", state.id))?,
        }

        wait_environment(
            ctx,
            &state.id,
            &[status::AVAILABLE, status::CREATING, status::DELETING],
            &[],
            DELETE_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}
