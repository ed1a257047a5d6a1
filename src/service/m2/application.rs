//! `aws_m2_application`

use super::api::{
    application_status as status, Application, CreateApplicationInput, DefinitionInput,
    UpdateApplicationInput,
};
use crate::provider::ResourceContext;
use crate::resource::wait::{Observed, StatusWaiter};
use crate::resource::{CreatedExt, Resource};
use crate::schema::{single_block, validate, AttrType, Attribute, Diagnostics, Schema, Validate};
use crate::tags::{self, Tags};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TYPE_NAME: &str = "aws_m2_application";

pub const ENGINE_TYPES: &[&str] = &["microfocus", "bluage"];

const CREATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const UPDATE_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Definition {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub s3_location: Option<String>,
}

impl Definition {
    fn to_input(&self) -> Option<DefinitionInput> {
        match (&self.content, &self.s3_location) {
            (Some(content), _) => Some(DefinitionInput::Content(content.clone())),
            (None, Some(location)) => Some(DefinitionInput::S3Location(location.clone())),
            (None, None) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApplicationConfig {
    pub name: String,
    pub engine_type: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, with = "single_block")]
    pub definition: Option<Definition>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplicationState {
    pub id: String,
    pub application_id: String,
    pub arn: String,
    pub name: String,
    pub engine_type: String,
    pub description: Option<String>,
    #[serde(default, with = "single_block")]
    pub definition: Option<Definition>,
    pub role_arn: Option<String>,
    pub kms_key_id: Option<String>,
    pub current_version: i64,
    pub tags: Tags,
    pub tags_all: Tags,
}

impl Validate for ApplicationConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        validate::length(diags, "name", &self.name, 1, 60);
        validate::name_chars(diags, "name", &self.name);
        validate::one_of(diags, "engine_type", &self.engine_type, ENGINE_TYPES);
        if let Some(description) = &self.description {
            validate::length(diags, "description", description, 0, 500);
        }
        if let Some(role) = &self.role_arn {
            validate::arn(diags, "role_arn", role);
        }
        match &self.definition {
            None => diags.error("definition", "a definition block is required"),
            Some(d) => match (&d.content, &d.s3_location) {
                (Some(_), Some(_)) => diags.error(
                    "definition",
                    "only one of content or s3_location can be specified",
                ),
                (None, None) => diags.error(
                    "definition",
                    "one of content or s3_location must be specified",
                ),
                _ => {}
            },
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// Waits for the application to leave its transitional statuses
fn application_waiter(ctx: &ResourceContext, pending: &[&str], target: &[&str], timeout: Duration) -> StatusWaiter {
    StatusWaiter::new(pending, target, ctx.timeouts.cap(timeout))
        .poll_interval(ctx.timeouts.poll_interval)
}

/// Current application and status, `None` once deleted
pub(crate) async fn observe_application(ctx: &ResourceContext, id: &str) -> Result<Observed<Application>> {
    match ctx.m2.get_application(id).await {
        Ok(app) => {
            let status = app.status.clone();
            Ok(Some((app, status)))
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub(crate) async fn wait_application(
    ctx: &ResourceContext,
    id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<Option<Application>> {
    application_waiter(ctx, pending, target, timeout)
        .wait(|| observe_application(ctx, id))
        .await
        .with_context(|| format!("waiting for M2 Application ({id})"))
}

async fn wait_version_available(ctx: &ResourceContext, id: &str, version: i64) -> Result<()> {
    application_waiter(ctx, &[status::CREATING], &[status::AVAILABLE], UPDATE_TIMEOUT)
        .wait(move || async move {
            match ctx.m2.get_application_version(id, version).await {
                Ok(v) => {
                    let status = v.status.clone();
                    Ok(Some((v, status)))
                }
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .with_context(|| format!("waiting for M2 Application ({id}) version {version}"))?;
    Ok(())
}

/// The M2 application resource
#[derive(Debug, Default, Clone, Copy)]
pub struct ApplicationResource;

impl ApplicationResource {
    async fn read_back(&self, ctx: &ResourceContext, id: &str, config: &ApplicationConfig) -> Result<ApplicationState> {
        let mut state = self
            .read(ctx, id)
            .await?
            .with_context(|| format!("M2 Application ({id}) not found after write"))?;
        // An S3-sourced definition reads back as content
        if config.definition.as_ref().is_some_and(|d| d.s3_location.is_some()) {
            state.definition = config.definition.clone();
        }
        Ok(state)
    }
}

#[async_trait]
impl Resource for ApplicationResource {
    type Config = ApplicationConfig;
    type State = ApplicationState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::computed("id", AttrType::String),
            Attribute::computed("application_id", AttrType::String),
            Attribute::computed("arn", AttrType::String),
            Attribute::required("name", AttrType::String).force_new(),
            Attribute::required("engine_type", AttrType::String)
                .force_new()
                .one_of(ENGINE_TYPES),
            Attribute::optional("description", AttrType::String),
            Attribute::required("definition", AttrType::List)
                .items(Some(1), Some(1))
                .with_block(vec![
                    Attribute::optional("content", AttrType::String),
                    Attribute::optional("s3_location", AttrType::String),
                ])
                .describe("Updating the definition creates a new application version"),
            Attribute::optional("role_arn", AttrType::String).force_new(),
            Attribute::optional("kms_key_id", AttrType::String).force_new(),
            Attribute::computed("current_version", AttrType::Int),
            Attribute::optional("tags", AttrType::Map),
            Attribute::computed("tags_all", AttrType::Map),
        ])
    }

    fn id(state: &ApplicationState) -> &str {
        &state.id
    }

    async fn create(&self, ctx: &ResourceContext, config: &ApplicationConfig) -> Result<ApplicationState> {
        let input = CreateApplicationInput {
            name: config.name.clone(),
            engine_type: config.engine_type.clone(),
            definition: config.definition.as_ref().and_then(Definition::to_input),
            description: non_empty(&config.description).map(String::from),
            kms_key_id: config.kms_key_id.clone(),
            role_arn: config.role_arn.clone(),
            tags: tags::ignore_system(tags::merge(&ctx.default_tags, &config.tags)),
            client_token: uuid::Uuid::new_v4().to_string(),
        };

        let out = ctx
            .m2
            .create_application(&input)
            .await
            .with_context(|| format!("creating M2 Application ({})", config.name))?;

        let id = out.application_id;
        async {
            wait_application(ctx, &id, &[status::CREATING], &[status::CREATED, status::AVAILABLE], CREATE_TIMEOUT)
                .await?;
            self.read_back(ctx, &id, config).await
        }
        .await
        .created(&id)
    }

    fn placeholder(id: &str, config: &ApplicationConfig) -> ApplicationState {
        ApplicationState {
            id: id.to_string(),
            application_id: id.to_string(),
            arn: String::new(),
            name: config.name.clone(),
            engine_type: config.engine_type.clone(),
            description: config.description.clone(),
            definition: config.definition.clone(),
            role_arn: config.role_arn.clone(),
            kms_key_id: config.kms_key_id.clone(),
            current_version: 1,
            tags: config.tags.clone(),
            tags_all: Tags::new(),
        }
    }

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<ApplicationState>> {
        let app = match ctx.m2.get_application(id).await {
            Ok(app) => app,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).context(format!("reading M2 Application ({id})")),
        };

        let current_version = app
            .latest_version
            .as_ref()
            .map(|v| v.application_version)
            .unwrap_or(1);
        let version = ctx
            .m2
            .get_application_version(id, current_version)
            .await
            .with_context(|| format!("reading M2 Application ({id}) version {current_version}"))?;

        let remote_tags = ctx
            .m2
            .list_tags(&app.application_arn)
            .await
            .with_context(|| format!("listing tags for M2 Application ({id})"))?;
        let (tags, tags_all) = tags::for_state(remote_tags, &ctx.default_tags);

        Ok(Some(ApplicationState {
            id: app.application_id.clone(),
            application_id: app.application_id,
            arn: app.application_arn,
            name: app.name,
            engine_type: app.engine_type,
            description: app.description.filter(|d| !d.is_empty()),
            definition: version.definition_content.map(|content| Definition {
                content: Some(content),
                s3_location: None,
            }),
            role_arn: app.role_arn,
            kms_key_id: app.kms_key_id,
            current_version,
            tags,
            tags_all,
        }))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: &ApplicationState,
        config: &ApplicationConfig,
    ) -> Result<ApplicationState> {
        let mut input = UpdateApplicationInput {
            application_id: prior.id.clone(),
            current_application_version: prior.current_version,
            ..Default::default()
        };
        if non_empty(&config.description) != non_empty(&prior.description) {
            input.description = Some(config.description.clone().unwrap_or_default());
        }
        if config.definition != prior.definition {
            input.definition = config.definition.as_ref().and_then(Definition::to_input);
        }

        if input.description.is_some() || input.definition.is_some() {
            let version = ctx
                .m2
                .update_application(&input)
                .await
                .with_context(|| format!("updating M2 Application ({})", prior.id))?;
            if input.definition.is_some() {
                wait_version_available(ctx, &prior.id, version).await?;
            }
        }

        let want = tags::merge(&ctx.default_tags, &config.tags);
        tags::update_tags(ctx.m2.as_ref(), &prior.arn, &prior.tags_all, &want)
            .await
            .with_context(|| format!("updating tags for M2 Application ({})", prior.id))?;

        self.read_back(ctx, &prior.id, config).await
    }

    fn carry_over(&self, prior: &ApplicationState, fresh: &mut ApplicationState) {
        if prior.definition.as_ref().is_some_and(|d| d.s3_location.is_some())
            && prior.current_version == fresh.current_version
        {
            fresh.definition = prior.definition.clone();
        }
    }

    async fn delete(&self, ctx: &ResourceContext, state: &ApplicationState) -> Result<()> {
        match ctx.m2.delete_application(&state.id).await {
            Err(e) if e.is_not_found() => return Ok(()),
            result => result.with_context(|| format!("deleting M2 Application ({})", state.id))?,
        }

        wait_application(
            ctx,
            &state.id,
            &[
                status::DELETING,
                status::DELETING_FROM_ENVIRONMENT,
                status::CREATED,
                status::AVAILABLE,
                status::STOPPED,
            ],
            &[],
            DELETE_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}
