//! In-memory cloud
//!
//! [`FakeCloud`] implements every service API trait against in-process tables so
//! acceptance tests run without credentials. Asynchronous operations report a
//! transitional status for a configurable number of polls before settling, and
//! any operation can be made to fail once with [`FakeCloud::fail_next`].

use crate::aws::ApiError;
use crate::provider::{ResourceContext, Timeouts};
use crate::service::appconfig::api::{
    AppConfigApi, CreateExtensionInput, Extension, ExtensionSummary, ListExtensionsOutput,
    UpdateExtensionInput,
};
use crate::service::m2::api::{
    application_status as app_status, deployment_status, environment_status, Application,
    ApplicationSummary, ApplicationVersion, ApplicationVersionSummary, CreateApplicationInput,
    CreateApplicationOutput, CreateDeploymentInput, CreateEnvironmentInput, DefinitionInput, Deployment,
    DeploymentSummary, Environment, EnvironmentSummary, M2Api, Page, UpdateApplicationInput,
    UpdateEnvironmentInput,
};
use crate::service::mediaconnect::api::{
    flow_status, CreateFlowInput, Flow, FlowSummary, ListFlowsOutput, MediaConnectApi, Source,
    Transport,
};
use crate::tags::{TagApi, Tags};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

pub const FAKE_ACCOUNT_ID: &str = "123456789012";
pub const FAKE_REGION: &str = "us-west-2";

const PAGE_SIZE: usize = 2;

/// Objects whose status field the fake drives
trait HasStatus {
    fn set_status(&mut self, status: &str);
}

impl HasStatus for Application {
    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl HasStatus for ApplicationVersion {
    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl HasStatus for Environment {
    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl HasStatus for Deployment {
    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

impl HasStatus for Flow {
    fn set_status(&mut self, status: &str) {
        self.status = status.to_string();
    }
}

/// An object plus a transitional status shown for the next few polls
#[derive(Debug, Clone)]
struct Tracked<T> {
    item: T,
    transition: Option<(String, u32)>,
}

impl<T: HasStatus + Clone> Tracked<T> {
    fn new(item: T) -> Self {
        Self {
            item,
            transition: None,
        }
    }

    /// Show `transitional` for `polls` reads, then the settled `status`
    fn transition(&mut self, transitional: &str, status: &str, polls: u32) {
        self.item.set_status(status);
        self.transition = (polls > 0).then(|| (transitional.to_string(), polls));
    }

    fn settle(&mut self, status: &str) {
        self.item.set_status(status);
        self.transition = None;
    }

    fn observe(&mut self) -> T {
        let mut item = self.item.clone();
        if let Some((status, polls)) = &mut self.transition {
            item.set_status(status);
            *polls -= 1;
            if *polls == 0 {
                self.transition = None;
            }
        }
        item
    }
}

struct FakeApplication {
    app: Tracked<Application>,
    versions: Vec<Tracked<ApplicationVersion>>,
}

#[derive(Default)]
struct Tables {
    extensions: BTreeMap<String, Extension>,
    applications: BTreeMap<String, FakeApplication>,
    environments: BTreeMap<String, Tracked<Environment>>,
    deployments: BTreeMap<String, Tracked<Deployment>>,
    flows: BTreeMap<String, Tracked<Flow>>,
    tags: BTreeMap<String, Tags>,
    faults: Vec<(String, ApiError)>,
    calls: Vec<String>,
}

/// In-memory implementation of every service API
pub struct FakeCloud {
    tables: Mutex<Tables>,
    settle_polls: u32,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeCloud {
    pub fn new() -> Self {
        Self::with_settle_polls(1)
    }

    /// Asynchronous operations stay transitional for `polls` reads
    pub fn with_settle_polls(polls: u32) -> Self {
        Self {
            tables: Mutex::new(Tables::default()),
            settle_polls: polls,
        }
    }

    /// A context wired to this fake with fast polling
    pub fn context(self: &Arc<Self>) -> ResourceContext {
        ResourceContext {
            appconfig: self.clone(),
            m2: self.clone(),
            mediaconnect: self.clone(),
            region: FAKE_REGION.to_string(),
            default_tags: Tags::new(),
            timeouts: Timeouts {
                poll_interval: Duration::from_millis(5),
                propagation: Duration::from_millis(200),
                max_wait: Some(Duration::from_secs(5)),
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make the next call of `operation` fail with `error`
    pub fn fail_next(&self, operation: &str, error: ApiError) {
        self.lock().faults.push((operation.to_string(), error));
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == operation).count()
    }

    /// Force a flow's status, e.g. to simulate a started flow
    pub fn set_flow_status(&self, arn: &str, status: &str) {
        if let Some(flow) = self.lock().flows.get_mut(arn) {
            flow.settle(status);
        }
    }

    /// Put an object's tags directly, bypassing the provider
    pub fn put_tags(&self, arn: &str, tags: Tags) {
        self.lock().tags.insert(arn.to_string(), tags);
    }

    pub fn extension_count(&self) -> usize {
        self.lock().extensions.len()
    }

    pub fn flow_count(&self) -> usize {
        self.lock().flows.len()
    }

    /// Record the call and return an injected fault, if any
    fn enter(&self, operation: &str) -> Result<MutexGuard<'_, Tables>, ApiError> {
        let mut tables = self.lock();
        tables.calls.push(operation.to_string());
        if let Some(pos) = tables.faults.iter().position(|(op, _)| op == operation) {
            let (_, error) = tables.faults.remove(pos);
            return Err(error);
        }
        Ok(tables)
    }
}

fn new_id(len: usize) -> String {
    uuid::Uuid::new_v4().simple().to_string()[..len].to_string()
}

fn arn(service: &str, resource: &str) -> String {
    format!("arn:aws:{service}:{FAKE_REGION}:{FAKE_ACCOUNT_ID}:{resource}")
}

fn not_found(kind: &str, id: &str) -> ApiError {
    ApiError::not_found(format!("{kind} {id} not found"))
}

fn conflict(message: impl Into<String>) -> ApiError {
    ApiError::new(409, "ConflictException", message)
}

fn bad_request(message: impl Into<String>) -> ApiError {
    ApiError::new(400, "BadRequestException", message)
}

/// Slice a sorted listing into pages keyed by the last returned key
fn paginate<K: Clone + ToString, T>(
    items: impl Iterator<Item = (K, T)>,
    next_token: Option<&str>,
) -> (Vec<T>, Option<String>) {
    let mut page = Vec::new();
    let mut last = None;
    let mut more = false;
    for (key, item) in items {
        let key_str = key.to_string();
        if next_token.is_some_and(|t| key_str.as_str() <= t) {
            continue;
        }
        if page.len() == PAGE_SIZE {
            more = true;
            break;
        }
        last = Some(key_str);
        page.push(item);
    }
    (page, if more { last } else { None })
}

#[async_trait]
impl TagApi for FakeCloud {
    async fn list_tags(&self, arn: &str) -> Result<Tags, ApiError> {
        let tables = self.enter("ListTagsForResource")?;
        tables
            .tags
            .get(arn)
            .cloned()
            .ok_or_else(|| not_found("resource", arn))
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<(), ApiError> {
        let mut tables = self.enter("TagResource")?;
        let existing = tables
            .tags
            .get_mut(arn)
            .ok_or_else(|| not_found("resource", arn))?;
        existing.extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
        Ok(())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), ApiError> {
        let mut tables = self.enter("UntagResource")?;
        let existing = tables
            .tags
            .get_mut(arn)
            .ok_or_else(|| not_found("resource", arn))?;
        for key in keys {
            existing.remove(key);
        }
        Ok(())
    }
}

#[async_trait]
impl AppConfigApi for FakeCloud {
    async fn create_extension(&self, input: &CreateExtensionInput) -> Result<Extension, ApiError> {
        let mut tables = self.enter("CreateExtension")?;
        if tables.extensions.values().any(|e| e.name == input.name) {
            return Err(conflict(format!("An extension named {} already exists", input.name)));
        }
        if input.actions.is_empty() {
            return Err(bad_request("At least one action point is required"));
        }
        let id = new_id(7);
        let extension = Extension {
            arn: arn("appconfig", &format!("extension/{id}")),
            id: id.clone(),
            name: input.name.clone(),
            version_number: 1,
            description: input.description.clone(),
            actions: input.actions.clone(),
            parameters: input.parameters.clone(),
        };
        tables.tags.insert(extension.arn.clone(), input.tags.clone());
        tables.extensions.insert(id, extension.clone());
        Ok(extension)
    }

    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError> {
        let tables = self.enter("GetExtension")?;
        tables
            .extensions
            .get(id)
            .cloned()
            .ok_or_else(|| not_found("Extension", id))
    }

    async fn update_extension(&self, input: &UpdateExtensionInput) -> Result<Extension, ApiError> {
        let mut tables = self.enter("UpdateExtension")?;
        let id = &input.extension_identifier;
        let extension = tables
            .extensions
            .get_mut(id)
            .ok_or_else(|| not_found("Extension", id))?;
        if let Some(description) = &input.description {
            extension.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        if let Some(actions) = &input.actions {
            extension.actions = actions.clone();
        }
        if let Some(parameters) = &input.parameters {
            extension.parameters = parameters.clone();
        }
        extension.version_number += 1;
        Ok(extension.clone())
    }

    async fn delete_extension(&self, id: &str) -> Result<(), ApiError> {
        let mut tables = self.enter("DeleteExtension")?;
        let extension = tables
            .extensions
            .remove(id)
            .ok_or_else(|| not_found("Extension", id))?;
        tables.tags.remove(&extension.arn);
        Ok(())
    }

    async fn list_extensions(&self, next_token: Option<&str>) -> Result<ListExtensionsOutput, ApiError> {
        let tables = self.enter("ListExtensions")?;
        let (items, next_token) = paginate(
            tables.extensions.iter().map(|(id, e)| {
                (
                    id.clone(),
                    ExtensionSummary {
                        id: e.id.clone(),
                        name: e.name.clone(),
                        version_number: e.version_number,
                        arn: e.arn.clone(),
                    },
                )
            }),
            next_token,
        );
        Ok(ListExtensionsOutput { items, next_token })
    }
}

fn definition_content(definition: &Option<DefinitionInput>) -> Option<String> {
    match definition {
        Some(DefinitionInput::Content(content)) => Some(content.clone()),
        Some(DefinitionInput::S3Location(location)) => {
            Some(format!("{{\"source\": \"{location}\"}}"))
        }
        None => None,
    }
}

#[async_trait]
impl M2Api for FakeCloud {
    async fn create_application(&self, input: &CreateApplicationInput) -> Result<CreateApplicationOutput, ApiError> {
        let mut tables = self.enter("CreateApplication")?;
        if tables.applications.values().any(|a| a.app.item.name == input.name) {
            return Err(conflict(format!("Application {} already exists", input.name)));
        }
        let content = definition_content(&input.definition)
            .ok_or_else(|| ApiError::new(400, "ValidationException", "definition is required"))?;

        let id = new_id(12);
        let application_arn = arn("m2", &format!("app/{id}"));
        let mut app = Tracked::new(Application {
            application_id: id.clone(),
            application_arn: application_arn.clone(),
            name: input.name.clone(),
            engine_type: input.engine_type.clone(),
            status: String::new(),
            description: input.description.clone(),
            kms_key_id: input.kms_key_id.clone(),
            role_arn: input.role_arn.clone(),
            latest_version: Some(ApplicationVersionSummary {
                application_version: 1,
                status: app_status::AVAILABLE.to_string(),
            }),
            deployed_version: None,
            environment_id: None,
        });
        app.transition(app_status::CREATING, app_status::AVAILABLE, self.settle_polls);
        let version = Tracked::new(ApplicationVersion {
            application_version: 1,
            definition_content: Some(content),
            status: app_status::AVAILABLE.to_string(),
        });

        tables.tags.insert(application_arn.clone(), input.tags.clone());
        tables.applications.insert(
            id.clone(),
            FakeApplication {
                app,
                versions: vec![version],
            },
        );
        Ok(CreateApplicationOutput {
            application_arn,
            application_id: id,
            application_version: 1,
        })
    }

    async fn get_application(&self, id: &str) -> Result<Application, ApiError> {
        let mut tables = self.enter("GetApplication")?;
        tables
            .applications
            .get_mut(id)
            .map(|a| a.app.observe())
            .ok_or_else(|| not_found("Application", id))
    }

    async fn get_application_version(&self, id: &str, version: i64) -> Result<ApplicationVersion, ApiError> {
        let mut tables = self.enter("GetApplicationVersion")?;
        let app = tables
            .applications
            .get_mut(id)
            .ok_or_else(|| not_found("Application", id))?;
        app.versions
            .iter_mut()
            .find(|v| v.item.application_version == version)
            .map(|v| v.observe())
            .ok_or_else(|| not_found("Application version", &format!("{id}/{version}")))
    }

    async fn update_application(&self, input: &UpdateApplicationInput) -> Result<i64, ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("UpdateApplication")?;
        let id = &input.application_id;
        let app = tables
            .applications
            .get_mut(id)
            .ok_or_else(|| not_found("Application", id))?;
        let latest = app.versions.len() as i64;
        if input.current_application_version != latest {
            return Err(conflict(format!(
                "Current version {} does not match latest version {latest}",
                input.current_application_version
            )));
        }
        if let Some(description) = &input.description {
            app.app.item.description = Some(description.clone()).filter(|d| !d.is_empty());
        }
        let Some(content) = definition_content(&input.definition) else {
            return Ok(latest);
        };

        let next = latest + 1;
        let mut version = Tracked::new(ApplicationVersion {
            application_version: next,
            definition_content: Some(content),
            status: String::new(),
        });
        version.transition(app_status::CREATING, app_status::AVAILABLE, settle);
        app.versions.push(version);
        app.app.item.latest_version = Some(ApplicationVersionSummary {
            application_version: next,
            status: app_status::AVAILABLE.to_string(),
        });
        Ok(next)
    }

    async fn delete_application(&self, id: &str) -> Result<(), ApiError> {
        let mut tables = self.enter("DeleteApplication")?;
        let app = tables
            .applications
            .get(id)
            .ok_or_else(|| not_found("Application", id))?;
        if app.app.item.status == app_status::RUNNING {
            return Err(conflict(format!("Application {id} is running")));
        }
        if app.app.item.environment_id.is_some() {
            return Err(conflict(format!("Application {id} is deployed to an environment")));
        }
        let arn = app.app.item.application_arn.clone();
        tables.applications.remove(id);
        tables.tags.remove(&arn);
        Ok(())
    }

    async fn start_application(&self, id: &str) -> Result<(), ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("StartApplication")?;
        let app = tables
            .applications
            .get_mut(id)
            .ok_or_else(|| not_found("Application", id))?;
        if app.app.item.environment_id.is_none() {
            return Err(conflict(format!("Application {id} is not deployed")));
        }
        app.app.transition(app_status::STARTING, app_status::RUNNING, settle);
        Ok(())
    }

    async fn stop_application(&self, id: &str, _force: bool) -> Result<(), ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("StopApplication")?;
        let app = tables
            .applications
            .get_mut(id)
            .ok_or_else(|| not_found("Application", id))?;
        app.app.transition(app_status::STOPPING, app_status::STOPPED, settle);
        Ok(())
    }

    async fn delete_application_from_environment(&self, application_id: &str, environment_id: &str) -> Result<(), ApiError> {
        let mut tables = self.enter("DeleteApplicationFromEnvironment")?;
        let app = tables
            .applications
            .get_mut(application_id)
            .ok_or_else(|| not_found("Application", application_id))?;
        if app.app.item.environment_id.as_deref() != Some(environment_id) {
            return Err(not_found("Deployment of application", application_id));
        }
        if app.app.item.status == app_status::RUNNING {
            return Err(conflict(format!("Application {application_id} is running")));
        }
        app.app.item.environment_id = None;
        app.app.item.deployed_version = None;
        app.app.settle(app_status::AVAILABLE);
        tables.deployments.retain(|_, d| {
            !(d.item.application_id == application_id && d.item.environment_id == environment_id)
        });
        Ok(())
    }

    async fn list_applications(&self, next_token: Option<&str>) -> Result<Page<ApplicationSummary>, ApiError> {
        let tables = self.enter("ListApplications")?;
        let (items, next_token) = paginate(
            tables.applications.iter().map(|(id, a)| {
                (
                    id.clone(),
                    ApplicationSummary {
                        application_id: id.clone(),
                        name: a.app.item.name.clone(),
                        status: a.app.item.status.clone(),
                    },
                )
            }),
            next_token,
        );
        Ok(Page { items, next_token })
    }

    async fn create_environment(&self, input: &CreateEnvironmentInput) -> Result<String, ApiError> {
        let mut tables = self.enter("CreateEnvironment")?;
        let id = new_id(12);
        let environment_arn = arn("m2", &format!("env/{id}"));
        let mut env = Tracked::new(Environment {
            environment_id: id.clone(),
            environment_arn: environment_arn.clone(),
            name: input.name.clone(),
            engine_type: input.engine_type.clone(),
            engine_version: input.engine_version.clone().unwrap_or_else(|| "3.7.0".to_string()),
            instance_type: input.instance_type.clone(),
            status: String::new(),
            description: input.description.clone(),
            subnet_ids: input.subnet_ids.clone(),
            security_group_ids: input.security_group_ids.clone(),
            publicly_accessible: input.publicly_accessible,
            kms_key_id: input.kms_key_id.clone(),
            preferred_maintenance_window: Some(
                input
                    .preferred_maintenance_window
                    .clone()
                    .unwrap_or_else(|| "sun:06:00-sun:08:00".to_string()),
            ),
            status_reason: None,
        });
        env.transition(environment_status::CREATING, environment_status::AVAILABLE, self.settle_polls);
        tables.tags.insert(environment_arn, input.tags.clone());
        tables.environments.insert(id.clone(), env);
        Ok(id)
    }

    async fn get_environment(&self, id: &str) -> Result<Environment, ApiError> {
        let mut tables = self.enter("GetEnvironment")?;
        tables
            .environments
            .get_mut(id)
            .map(Tracked::observe)
            .ok_or_else(|| not_found("Environment", id))
    }

    async fn update_environment(&self, input: &UpdateEnvironmentInput) -> Result<(), ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("UpdateEnvironment")?;
        let id = &input.environment_id;
        let env = tables
            .environments
            .get_mut(id)
            .ok_or_else(|| not_found("Environment", id))?;
        if let Some(instance_type) = &input.instance_type {
            env.item.instance_type = instance_type.clone();
        }
        if let Some(version) = &input.engine_version {
            env.item.engine_version = version.clone();
        }
        if let Some(window) = &input.preferred_maintenance_window {
            env.item.preferred_maintenance_window = Some(window.clone());
        }
        env.transition(environment_status::UPDATING, environment_status::AVAILABLE, settle);
        Ok(())
    }

    async fn delete_environment(&self, id: &str) -> Result<(), ApiError> {
        let mut tables = self.enter("DeleteEnvironment")?;
        if tables
            .applications
            .values()
            .any(|a| a.app.item.environment_id.as_deref() == Some(id))
        {
            return Err(conflict(format!("Environment {id} has deployed applications")));
        }
        let env = tables
            .environments
            .remove(id)
            .ok_or_else(|| not_found("Environment", id))?;
        tables.tags.remove(&env.item.environment_arn);
        Ok(())
    }

    async fn list_environments(&self, next_token: Option<&str>) -> Result<Page<EnvironmentSummary>, ApiError> {
        let tables = self.enter("ListEnvironments")?;
        let (items, next_token) = paginate(
            tables.environments.iter().map(|(id, e)| {
                (
                    id.clone(),
                    EnvironmentSummary {
                        environment_id: id.clone(),
                        name: e.item.name.clone(),
                        status: e.item.status.clone(),
                    },
                )
            }),
            next_token,
        );
        Ok(Page { items, next_token })
    }

    async fn create_deployment(&self, input: &CreateDeploymentInput) -> Result<String, ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("CreateDeployment")?;
        if !tables.environments.contains_key(&input.environment_id) {
            return Err(not_found("Environment", &input.environment_id));
        }
        let app = tables
            .applications
            .get_mut(&input.application_id)
            .ok_or_else(|| not_found("Application", &input.application_id))?;
        if input.application_version < 1 || input.application_version > app.versions.len() as i64 {
            return Err(ApiError::new(
                400,
                "ValidationException",
                format!("Unknown application version {}", input.application_version),
            ));
        }
        if app.app.item.status == app_status::RUNNING {
            return Err(conflict("Application must be stopped before it is redeployed"));
        }
        app.app.item.environment_id = Some(input.environment_id.clone());
        app.app.item.deployed_version = Some(ApplicationVersionSummary {
            application_version: input.application_version,
            status: deployment_status::SUCCEEDED.to_string(),
        });
        app.app.settle(app_status::READY);

        let id = new_id(12);
        let mut deployment = Tracked::new(Deployment {
            deployment_id: id.clone(),
            application_id: input.application_id.clone(),
            environment_id: input.environment_id.clone(),
            application_version: input.application_version,
            status: String::new(),
            status_reason: None,
        });
        deployment.transition(deployment_status::DEPLOYING, deployment_status::SUCCEEDED, settle);
        tables.deployments.insert(id.clone(), deployment);
        Ok(id)
    }

    async fn get_deployment(&self, application_id: &str, deployment_id: &str) -> Result<Deployment, ApiError> {
        let mut tables = self.enter("GetDeployment")?;
        tables
            .deployments
            .get_mut(deployment_id)
            .filter(|d| d.item.application_id == application_id)
            .map(Tracked::observe)
            .ok_or_else(|| not_found("Deployment", deployment_id))
    }

    async fn list_deployments(&self, application_id: &str, next_token: Option<&str>) -> Result<Page<DeploymentSummary>, ApiError> {
        let tables = self.enter("ListDeployments")?;
        let (items, next_token) = paginate(
            tables
                .deployments
                .iter()
                .filter(|(_, d)| d.item.application_id == application_id)
                .map(|(id, d)| {
                    (
                        id.clone(),
                        DeploymentSummary {
                            deployment_id: id.clone(),
                            application_id: d.item.application_id.clone(),
                            environment_id: d.item.environment_id.clone(),
                            status: d.item.status.clone(),
                        },
                    )
                }),
            next_token,
        );
        Ok(Page { items, next_token })
    }
}

#[async_trait]
impl MediaConnectApi for FakeCloud {
    async fn create_flow(&self, input: &CreateFlowInput) -> Result<Flow, ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("CreateFlow")?;
        let id = new_id(12);
        let flow_arn = arn("mediaconnect", &format!("flow:1-{id}:{}", input.name));
        let mut flow = Tracked::new(Flow {
            flow_arn: flow_arn.clone(),
            name: input.name.clone(),
            availability_zone: input
                .availability_zone
                .clone()
                .unwrap_or_else(|| format!("{FAKE_REGION}a")),
            status: String::new(),
            source: Source {
                name: input.source.name.clone(),
                source_arn: arn("mediaconnect", &format!("source:1-{id}:{}", input.source.name)),
                ingest_port: input.source.ingest_port,
                whitelist_cidr: input.source.whitelist_cidr.clone(),
                description: input.source.description.clone(),
                transport: Some(Transport {
                    protocol: input.source.protocol.clone(),
                }),
            },
        });
        flow.transition(flow_status::UPDATING, flow_status::STANDBY, settle);
        let created = flow.item.clone();
        tables.tags.insert(flow_arn.clone(), Tags::new());
        tables.flows.insert(flow_arn, flow);
        Ok(created)
    }

    async fn describe_flow(&self, arn: &str) -> Result<Flow, ApiError> {
        let mut tables = self.enter("DescribeFlow")?;
        tables
            .flows
            .get_mut(arn)
            .map(Tracked::observe)
            .ok_or_else(|| not_found("Flow", arn))
    }

    async fn stop_flow(&self, arn: &str) -> Result<(), ApiError> {
        let settle = self.settle_polls;
        let mut tables = self.enter("StopFlow")?;
        let flow = tables.flows.get_mut(arn).ok_or_else(|| not_found("Flow", arn))?;
        flow.transition(flow_status::STOPPING, flow_status::STANDBY, settle);
        Ok(())
    }

    async fn delete_flow(&self, arn: &str) -> Result<(), ApiError> {
        let mut tables = self.enter("DeleteFlow")?;
        let flow = tables.flows.get(arn).ok_or_else(|| not_found("Flow", arn))?;
        if flow.item.status == flow_status::ACTIVE {
            return Err(bad_request(format!("Flow {arn} must be stopped before it can be deleted")));
        }
        tables.flows.remove(arn);
        tables.tags.remove(arn);
        Ok(())
    }

    async fn list_flows(&self, next_token: Option<&str>) -> Result<ListFlowsOutput, ApiError> {
        let tables = self.enter("ListFlows")?;
        let (flows, next_token) = paginate(
            tables.flows.iter().map(|(arn, f)| {
                (
                    arn.clone(),
                    FlowSummary {
                        flow_arn: arn.clone(),
                        name: f.item.name.clone(),
                        status: f.item.status.clone(),
                    },
                )
            }),
            next_token,
        );
        Ok(ListFlowsOutput { flows, next_token })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let items = || (1..=5).map(|i| (format!("k{i}"), i));
        let (page, token) = paginate(items(), None);
        assert_eq!(page, vec![1, 2]);
        assert_eq!(token.as_deref(), Some("k2"));
        let (page, token) = paginate(items(), Some("k4"));
        assert_eq!(page, vec![5]);
        assert!(token.is_none());
    }

    #[tokio::test]
    async fn test_fail_next_is_consumed() {
        let cloud = FakeCloud::new();
        cloud.fail_next("GetExtension", ApiError::new(500, "InternalServerException", "boom"));
        assert_eq!(cloud.get_extension("x").await.unwrap_err().status, 500);
        assert!(cloud.get_extension("x").await.unwrap_err().is_not_found());
        assert_eq!(cloud.call_count("GetExtension"), 2);
    }

    #[tokio::test]
    async fn test_transitional_status() {
        let cloud = FakeCloud::with_settle_polls(2);
        let id = cloud
            .create_environment(&CreateEnvironmentInput {
                name: "e".to_string(),
                engine_type: "bluage".to_string(),
                instance_type: "M2.m5.large".to_string(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cloud.get_environment(&id).await.unwrap().status, "Creating");
        assert_eq!(cloud.get_environment(&id).await.unwrap().status, "Creating");
        assert_eq!(cloud.get_environment(&id).await.unwrap().status, "Available");
    }
}
