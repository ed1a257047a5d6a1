//! `aws_appconfig_extension`
//!
//! An AppConfig extension: a set of action points, each invoking one or more
//! actions (Lambda, SNS, SQS, EventBridge targets), plus named parameters.

use super::api::{
    ActionMap, CreateExtensionInput, Extension, ExtensionAction,
    ExtensionParameter, ParameterMap, UpdateExtensionInput,
};
use crate::provider::ResourceContext;
use crate::resource::wait::retry_when;
use crate::resource::{CreatedExt, Resource};
use crate::schema::{validate, AttrType, Attribute, Diagnostics, Schema, Validate};
use crate::tags::{self, Tags};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};

pub const TYPE_NAME: &str = "aws_appconfig_extension";

/// Lifecycle trigger an action point hooks into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionPointTrigger {
    PreCreateHostedConfigurationVersion,
    PreStartDeployment,
    OnDeploymentStart,
    OnDeploymentStep,
    OnDeploymentBaking,
    OnDeploymentComplete,
    OnDeploymentRolledBack,
}

impl ActionPointTrigger {
    pub const ALL: [ActionPointTrigger; 7] = [
        Self::PreCreateHostedConfigurationVersion,
        Self::PreStartDeployment,
        Self::OnDeploymentStart,
        Self::OnDeploymentStep,
        Self::OnDeploymentBaking,
        Self::OnDeploymentComplete,
        Self::OnDeploymentRolledBack,
    ];

    pub const NAMES: &'static [&'static str] = &[
        "PRE_CREATE_HOSTED_CONFIGURATION_VERSION",
        "PRE_START_DEPLOYMENT",
        "ON_DEPLOYMENT_START",
        "ON_DEPLOYMENT_STEP",
        "ON_DEPLOYMENT_BAKING",
        "ON_DEPLOYMENT_COMPLETE",
        "ON_DEPLOYMENT_ROLLED_BACK",
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::NAMES
            .iter()
            .position(|n| *n == value)
            .map(|i| Self::ALL[i])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Action {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ActionPoint {
    pub point: ActionPointTrigger,
    pub action: BTreeSet<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Parameter {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtensionConfig {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub action_point: BTreeSet<ActionPoint>,
    #[serde(default)]
    pub parameter: BTreeSet<Parameter>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtensionState {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub description: Option<String>,
    pub version: i64,
    pub action_point: BTreeSet<ActionPoint>,
    pub parameter: BTreeSet<Parameter>,
    pub tags: Tags,
    pub tags_all: Tags,
}

impl Validate for ExtensionConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        validate::length(diags, "name", &self.name, 1, 64);
        if let Some(description) = &self.description {
            validate::length(diags, "description", description, 0, 1024);
        }

        validate::items(diags, "action_point", self.action_point.len(), 1, usize::MAX);
        let mut points = HashSet::new();
        for ap in &self.action_point {
            let path = format!("action_point[{}]", ap.point.as_str());
            if !points.insert(ap.point) {
                diags.error(&path, "duplicate action point");
            }
            validate::items(diags, &format!("{path}.action"), ap.action.len(), 1, usize::MAX);
            for action in &ap.action {
                let path = format!("{path}.action[{}]", action.name);
                validate::length(diags, &format!("{path}.name"), &action.name, 1, 64);
                validate::arn(diags, &format!("{path}.uri"), &action.uri);
                if let Some(role) = &action.role_arn {
                    validate::arn(diags, &format!("{path}.role_arn"), role);
                }
            }
        }

        let mut names = HashSet::new();
        for p in &self.parameter {
            if !names.insert(p.name.as_str()) {
                diags.error(
                    format!("parameter[{}]", p.name),
                    "parameter names must be unique",
                );
            }
        }
    }
}

fn expand_actions(points: &BTreeSet<ActionPoint>) -> ActionMap {
    points
        .iter()
        .map(|ap| {
            let actions = ap
                .action
                .iter()
                .map(|a| ExtensionAction {
                    name: Some(a.name.clone()),
                    description: a.description.clone(),
                    role_arn: a.role_arn.clone(),
                    uri: Some(a.uri.clone()),
                })
                .collect();
            (ap.point.as_str().to_string(), actions)
        })
        .collect()
}

fn flatten_actions(actions: &ActionMap) -> BTreeSet<ActionPoint> {
    actions
        .iter()
        .filter_map(|(point, actions)| {
            let Some(point) = ActionPointTrigger::parse(point) else {
                tracing::warn!("Ignoring unknown action point {}", point);
                return None;
            };
            let action = actions
                .iter()
                .map(|a| Action {
                    name: a.name.clone().unwrap_or_default(),
                    description: a.description.clone().filter(|d| !d.is_empty()),
                    role_arn: a.role_arn.clone().filter(|r| !r.is_empty()),
                    uri: a.uri.clone().unwrap_or_default(),
                })
                .collect();
            Some(ActionPoint { point, action })
        })
        .collect()
}

fn expand_parameters(parameters: &BTreeSet<Parameter>) -> ParameterMap {
    parameters
        .iter()
        .map(|p| {
            (
                p.name.clone(),
                ExtensionParameter {
                    description: p.description.clone(),
                    required: p.required,
                },
            )
        })
        .collect()
}

fn flatten_parameters(parameters: &ParameterMap) -> BTreeSet<Parameter> {
    parameters
        .iter()
        .map(|(name, p)| Parameter {
            name: name.clone(),
            description: p.description.clone().filter(|d| !d.is_empty()),
            required: p.required,
        })
        .collect()
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

/// The AppConfig extension resource
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtensionResource;

impl ExtensionResource {
    fn state(extension: Extension, remote_tags: Tags, defaults: &Tags) -> ExtensionState {
        let (tags, tags_all) = tags::for_state(remote_tags, defaults);
        ExtensionState {
            action_point: flatten_actions(&extension.actions),
            parameter: flatten_parameters(&extension.parameters),
            description: extension.description.filter(|d| !d.is_empty()),
            version: extension.version_number,
            id: extension.id,
            arn: extension.arn,
            name: extension.name,
            tags,
            tags_all,
        }
    }

    async fn read_back(&self, ctx: &ResourceContext, id: &str) -> Result<ExtensionState> {
        self.read(ctx, id)
            .await?
            .with_context(|| format!("AppConfig Extension ({id}) not found after write"))
    }
}

#[async_trait]
impl Resource for ExtensionResource {
    type Config = ExtensionConfig;
    type State = ExtensionState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        let action = vec![
            Attribute::required("name", AttrType::String),
            Attribute::optional("description", AttrType::String),
            Attribute::optional("role_arn", AttrType::String),
            Attribute::required("uri", AttrType::String),
        ];
        let action_point = vec![
            Attribute::required("point", AttrType::String).one_of(ActionPointTrigger::NAMES),
            Attribute::required("action", AttrType::Set)
                .items(Some(1), None)
                .with_block(action),
        ];
        let parameter = vec![
            Attribute::required("name", AttrType::String),
            Attribute::optional("description", AttrType::String),
            Attribute::optional("required", AttrType::Bool),
        ];

        Schema::new(vec![
            Attribute::computed("id", AttrType::String),
            Attribute::computed("arn", AttrType::String),
            Attribute::required("name", AttrType::String)
                .force_new()
                .describe("Extension name; changing it creates a new extension"),
            Attribute::optional("description", AttrType::String),
            Attribute::required("action_point", AttrType::Set)
                .items(Some(1), None)
                .with_block(action_point),
            Attribute::optional("parameter", AttrType::Set).with_block(parameter),
            Attribute::computed("version", AttrType::Int),
            Attribute::optional("tags", AttrType::Map),
            Attribute::computed("tags_all", AttrType::Map),
        ])
    }

    fn id(state: &ExtensionState) -> &str {
        &state.id
    }

    async fn create(&self, ctx: &ResourceContext, config: &ExtensionConfig) -> Result<ExtensionState> {
        let input = CreateExtensionInput {
            name: config.name.clone(),
            description: non_empty(&config.description).map(String::from),
            actions: expand_actions(&config.action_point),
            parameters: expand_parameters(&config.parameter),
            tags: tags::ignore_system(tags::merge(&ctx.default_tags, &config.tags)),
        };

        let api = ctx.appconfig.as_ref();
        let input = &input;
        // A freshly created role is rejected until IAM has propagated it
        let extension = retry_when(
            ctx.timeouts.propagation,
            ctx.timeouts.poll_interval,
            move || api.create_extension(input),
            |e| e.message_contains("BadRequestException", "assume"),
        )
        .await
        .with_context(|| format!("creating AppConfig Extension ({})", config.name))?;

        tracing::debug!("Created AppConfig Extension {} ({})", extension.name, extension.id);
        self.read_back(ctx, &extension.id).await.created(&extension.id)
    }

    fn placeholder(id: &str, config: &ExtensionConfig) -> ExtensionState {
        ExtensionState {
            id: id.to_string(),
            arn: String::new(),
            name: config.name.clone(),
            description: config.description.clone(),
            version: 0,
            action_point: config.action_point.clone(),
            parameter: config.parameter.clone(),
            tags: config.tags.clone(),
            tags_all: Tags::new(),
        }
    }

    async fn read(&self, ctx: &ResourceContext, id: &str) -> Result<Option<ExtensionState>> {
        let extension = match ctx.appconfig.get_extension(id).await {
            Ok(extension) => extension,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).context(format!("reading AppConfig Extension ({id})")),
        };

        let remote_tags = ctx
            .appconfig
            .list_tags(&extension.arn)
            .await
            .with_context(|| format!("listing tags for AppConfig Extension ({id})"))?;

        Ok(Some(Self::state(extension, remote_tags, &ctx.default_tags)))
    }

    async fn update(
        &self,
        ctx: &ResourceContext,
        prior: &ExtensionState,
        config: &ExtensionConfig,
    ) -> Result<ExtensionState> {
        let mut input = UpdateExtensionInput {
            extension_identifier: prior.id.clone(),
            ..Default::default()
        };
        if non_empty(&config.description) != non_empty(&prior.description) {
            input.description = Some(config.description.clone().unwrap_or_default());
        }
        if config.action_point != prior.action_point {
            input.actions = Some(expand_actions(&config.action_point));
        }
        if config.parameter != prior.parameter {
            input.parameters = Some(expand_parameters(&config.parameter));
        }

        if input.description.is_some() || input.actions.is_some() || input.parameters.is_some() {
            ctx.appconfig
                .update_extension(&input)
                .await
                .with_context(|| format!("updating AppConfig Extension ({})", prior.id))?;
        }

        let want = tags::merge(&ctx.default_tags, &config.tags);
        tags::update_tags(ctx.appconfig.as_ref(), &prior.arn, &prior.tags_all, &want)
            .await
            .with_context(|| format!("updating tags for AppConfig Extension ({})", prior.id))?;

        self.read_back(ctx, &prior.id).await
    }

    async fn delete(&self, ctx: &ResourceContext, state: &ExtensionState) -> Result<()> {
        match ctx.appconfig.delete_extension(&state.id).await {
            Err(e) if e.is_not_found() => Ok(()),
            result => {
                result.with_context(|| format!("deleting AppConfig Extension ({})", state.id))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, Erased};
    use serde_json::json;

    fn config() -> serde_json::Value {
        json!({
            "name": "tf-test-x",
            "description": "test description",
            "action_point": [{
                "point": "ON_DEPLOYMENT_COMPLETE",
                "action": [{
                    "name": "test",
                    "role_arn": "arn:aws:iam::123456789012:role/test",
                    "uri": "arn:aws:sns:us-west-2:123456789012:test"
                }]
            }]
        })
    }

    #[test]
    fn test_decode_valid_config() {
        let decoded = Erased(ExtensionResource).decode_config(&config()).unwrap();
        assert_eq!(decoded["action_point"][0]["point"], "ON_DEPLOYMENT_COMPLETE");
        assert_eq!(decoded["parameter"], json!([]));
    }

    #[test]
    fn test_unknown_point_rejected() {
        let mut raw = config();
        raw["action_point"][0]["point"] = json!("ON_SOMETHING_ELSE");
        assert!(Erased(ExtensionResource).decode_config(&raw).is_err());
    }

    #[test]
    fn test_missing_name_rejected() {
        let mut raw = config();
        raw.as_object_mut().unwrap().remove("name");
        let err = Erased(ExtensionResource).decode_config(&raw).unwrap_err();
        assert!(err.to_string().contains("name"));
    }

    #[test]
    fn test_bad_uri_and_empty_actions() {
        let mut raw = config();
        raw["action_point"][0]["action"][0]["uri"] = json!("not-an-arn");
        let err = Erased(ExtensionResource).decode_config(&raw).unwrap_err();
        assert!(err.to_string().contains("uri"));

        raw["action_point"][0]["action"] = json!([]);
        assert!(Erased(ExtensionResource).decode_config(&raw).is_err());
    }

    #[test]
    fn test_duplicate_points_rejected() {
        let mut raw = config();
        let mut second = raw["action_point"][0].clone();
        second["action"][0]["name"] = json!("other");
        raw["action_point"].as_array_mut().unwrap().push(second);
        let err = Erased(ExtensionResource).decode_config(&raw).unwrap_err();
        assert!(err.to_string().contains("duplicate action point"));
    }

    #[test]
    fn test_duplicate_parameter_names_rejected() {
        let mut raw = config();
        raw["parameter"] = json!([
            {"name": "p", "required": true},
            {"name": "p", "required": false}
        ]);
        let err = Erased(ExtensionResource).decode_config(&raw).unwrap_err();
        assert!(err.to_string().contains("unique"));
    }

    #[test]
    fn test_action_round_trip_through_api_shape() {
        let config: ExtensionConfig = serde_json::from_value(config()).unwrap();
        let map = expand_actions(&config.action_point);
        assert!(map.contains_key("ON_DEPLOYMENT_COMPLETE"));
        assert_eq!(flatten_actions(&map), config.action_point);
    }

    #[test]
    fn test_trigger_names_line_up() {
        for trigger in ActionPointTrigger::ALL {
            let encoded = serde_json::to_value(trigger).unwrap();
            assert_eq!(encoded, json!(trigger.as_str()));
            assert_eq!(ActionPointTrigger::parse(trigger.as_str()), Some(trigger));
        }
    }
}
