//! `aws_m2_deployment`
//!
//! Deploys one application version to a runtime environment and optionally
//! starts it. The resource ID is `application_id,deployment_id`.

use super::api::{
    application_status as app_status, deployment_status as status, CreateDeploymentInput, Deployment,
};
use super::application::{observe_application, wait_application};
use crate::provider::ResourceContext;
use crate::resource::wait::StatusWaiter;
use crate::resource::{CreatedExt, Resource};
use crate::schema::{AttrType, Attribute, Diagnostics, Schema, Validate};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TYPE_NAME: &str = "aws_m2_deployment";

const CREATE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const START_TIMEOUT: Duration = Duration::from_secs(20 * 60);

const ID_SEPARATOR: char = ',';

pub fn deployment_id(application_id: &str, deployment_id: &str) -> String {
    format!("{application_id}{ID_SEPARATOR}{deployment_id}")
}

/// Split a composite `application_id,deployment_id`
pub fn parse_deployment_id(id: &str) -> Result<(&str, &str)> {
    match id.split_once(ID_SEPARATOR) {
        Some((app, dep)) if !app.is_empty() && !dep.is_empty() && !dep.contains(ID_SEPARATOR) => {
            Ok((app, dep))
        }
        _ => bail!("unexpected format for ID ({id}), expected application_id{ID_SEPARATOR}deployment_id"),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DeploymentConfig {
    pub environment_id: String,
    pub application_id: String,
    pub application_version: i64,
    pub start: bool,
    #[serde(default)]
    pub force_stop: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentState {
    pub id: String,
    pub deployment_id: String,
    pub environment_id: String,
    pub application_id: String,
    pub application_version: i64,
    pub start: bool,
    #[serde(default)]
    pub force_stop: bool,
}

impl Validate for DeploymentConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        if self.application_version < 1 {
            diags.error("application_version", "must be at least 1");
        }
        if self.application_id.is_empty() {
            diags.error("application_id", "must not be empty");
        }
        if self.environment_id.is_empty() {
            diags.error("environment_id", "must not be empty");
        }
    }
}

async fn wait_deployment(
    ctx: &ResourceContext,
    application_id: &str,
    deployment_id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<Option<Deployment>> {
    StatusWaiter::new(pending, target, ctx.timeouts.cap(timeout))
        .poll_interval(ctx.timeouts.poll_interval)
        .wait(move || async move {
            match ctx.m2.get_deployment(application_id, deployment_id).await {
                Ok(d) => {
                    let status = d.status.clone();
                    Ok(Some((d, status)))
                }
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .with_context(|| format!("waiting for M2 Deployment ({application_id}/{deployment_id})"))
}

async fn start_application(ctx: &ResourceContext, id: &str) -> Result<()> {
    ctx.m2
        .start_application(id)
        .await
        .with_context(|| format!("starting M2 Application ({id})"))?;
    wait_application(ctx, id, &[app_status::STARTING, app_status::READY], &[app_status::RUNNING], START_TIMEOUT).await?;
    Ok(())
}

/// Stop the application if it is running
async fn stop_application(ctx: &ResourceContext, id: &str, force: bool) -> Result<()> {
    let running = observe_application(ctx, id)
        .await?
        .is_some_and(|(_, status)| status == app_status::RUNNING || status == app_status::STARTING);
    if !running {
        return Ok(());
    }

    ctx.m2
        .stop_application(id, force)
        .await
        .with_context(|| format!("stopping M2 Application ({id})"))?;
    wait_application(
        ctx,
        id,
        &[app_status::RUNNING, app_status::STOPPING],
        &[app_status::STOPPED, app_status::READY],
        START_TIMEOUT,
    )
    .await?;
    Ok(())
}

/// The M2 deployment resource
#[derive(Debug, Default, Clone, Copy)]
pub struct DeploymentResource;

impl DeploymentResource {
    async fn deploy(&self, ctx: &ResourceContext, config: &DeploymentConfig) -> Result<DeploymentState> {
        let input = CreateDeploymentInput {
            application_id: config.application_id.clone(),
            environment_id: config.environment_id.clone(),
            application_version: config.application_version,
            client_token: uuid::Uuid::new_v4().to_string(),
        };
        let created = ctx.m2.create_deployment(&input).await.with_context(|| {
            format!(
                "creating M2 Deployment ({} v{} to {})",
                config.application_id, config.application_version, config.environment_id
            )
        })?;
        let id = deployment_id(&config.application_id, &created);

        async {
            wait_deployment(
                ctx,
                &config.application_id,
                &created,
                &[status::DEPLOYING, status::UPDATING_DEPLOYMENT],
                &[status::SUCCEEDED],
                CREATE_TIMEOUT,
            )
            .await?;

            if config.start {
                start_application(ctx, &config.application_id).await?;
            }

            let mut state = self
                .read(ctx, &id)
                .await?
                .with_context(|| format!("M2 Deployment ({id}) not found after write"))?;
            state.force_stop = config.force_stop;
            Ok::<_, anyhow::Error>(state)
        }
        .await
        .created(&id)
    }
}

#[async_trait]
impl Resource for DeploymentResource {
    type Config = DeploymentConfig;
    type State = DeploymentState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::computed("id", AttrType::String),
            Attribute::computed("deployment_id", AttrType::String),
            Attribute::required("environment_id", AttrType::String).force_new(),
            Attribute::required("application_id", AttrType::String).force_new(),
            Attribute::required("application_version", AttrType::Int)
                .describe("Changing the version redeploys the application"),
            Attribute::required("start", AttrType::Bool),
            Attribute::optional("force_stop", AttrType::Bool),
        ])
    }

    fn id(state: &DeploymentState) -> &str {
        &state.id
    }

    async fn create(&self, ctx: &ResourceContext, config: &DeploymentConfig) -> Result<DeploymentState> {
        self.deploy(ctx, config).await
    }

    fn placeholder(id: &str, config: &DeploymentConfig) -> DeploymentState {
        DeploymentState {
            id: id.to_string(),
            deployment_id: parse_deployment_id(id).map(|(_, d)| d.to_string()).unwrap_or_default(),
            environment_id: config.environment_id.clone(),
            application_id: config.application_id.clone(),
            application_version: config.application_version,
            start: config.start,
            force_stop: config.force_stop,
        }
    }

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<DeploymentState>> {
        let (application_id, deployment_id) = parse_deployment_id(id)?;

        let deployment = match ctx.m2.get_deployment(application_id, deployment_id).await {
            Ok(d) => d,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).context(format!("reading M2 Deployment ({id})")),
        };

        let Some((_, app_state)) = observe_application(ctx, application_id).await? else {
            return Ok(None);
        };

        Ok(Some(DeploymentState {
            id: id.to_string(),
            deployment_id: deployment.deployment_id,
            environment_id: deployment.environment_id,
            application_id: deployment.application_id,
            application_version: deployment.application_version,
            start: app_state == app_status::RUNNING,
            force_stop: false,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: &DeploymentState,
        config: &DeploymentConfig,
    ) -> Result<DeploymentState> {
        if config.application_version != prior.application_version {
            stop_application(ctx, &prior.application_id, config.force_stop).await?;
            return self.deploy(ctx, config).await;
        }

        if config.start != prior.start {
            if config.start {
                start_application(ctx, &prior.application_id).await?;
            } else {
                stop_application(ctx, &prior.application_id, config.force_stop).await?;
            }
        }

        let mut state = self
            .read(ctx, &prior.id)
            .await?
            .with_context(|| format!("M2 Deployment ({}) not found after write", prior.id))?;
        state.force_stop = config.force_stop;
        Ok(state)
    }

    fn carry_over(&self, prior: &DeploymentState, fresh: &mut DeploymentState) {
        fresh.force_stop = prior.force_stop;
    }

    async fn delete(&self, ctx: &ResourceContext, state: &DeploymentState) -> Result<()> {
        stop_application(ctx, &state.application_id, state.force_stop).await?;

        match ctx
            .m2
            .delete_application_from_environment(&state.application_id, &state.environment_id)
            .await
        {
            Err(e) if e.is_not_found() => return Ok(()),
            result => result.with_context(|| format!("deleting M2 Deployment ({})", state.id))?,
        }

        wait_deployment(
            ctx,
            &state.application_id,
            &state.deployment_id,
            &[status::SUCCEEDED, status::DEPLOYING, status::UPDATING_DEPLOYMENT],
            &[],
            DELETE_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}
