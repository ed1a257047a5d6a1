//! Mainframe Modernization (M2) REST API
//!
//! camelCase JSON over `/applications`, `/environments` and
//! `/applications/{id}/deployments`.

use crate::aws::http::{segment, ApiRequest, AwsHttpClient};
use crate::aws::ApiError;
use crate::tags::{TagApi, Tags};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub mod application_status {
    pub const CREATING: &str = "Creating";
    pub const CREATED: &str = "Created";
    pub const AVAILABLE: &str = "Available";
    pub const READY: &str = "Ready";
    pub const STARTING: &str = "Starting";
    pub const RUNNING: &str = "Running";
    pub const STOPPING: &str = "Stopping";
    pub const STOPPED: &str = "Stopped";
    pub const FAILED: &str = "Failed";
    pub const DELETING: &str = "Deleting";
    pub const DELETING_FROM_ENVIRONMENT: &str = "Deleting From Environment";
}

pub mod environment_status {
    pub const CREATING: &str = "Creating";
    pub const AVAILABLE: &str = "Available";
    pub const UPDATING: &str = "Updating";
    pub const DELETING: &str = "Deleting";
    pub const FAILED: &str = "Failed";
}

pub mod deployment_status {
    pub const DEPLOYING: &str = "Deploying";
    pub const SUCCEEDED: &str = "Succeeded";
    pub const FAILED: &str = "Failed";
    pub const UPDATING_DEPLOYMENT: &str = "Updating Deployment";
}

/// Application definition: inline JSON content or an S3 location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DefinitionInput {
    Content(String),
    S3Location(String),
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationInput {
    pub name: String,
    pub engine_type: String,
    pub definition: Option<DefinitionInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    pub client_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateApplicationOutput {
    pub application_arn: String,
    pub application_id: String,
    #[serde(default)]
    pub application_version: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersionSummary {
    pub application_version: i64,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub application_id: String,
    pub application_arn: String,
    pub name: String,
    pub engine_type: String,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub role_arn: Option<String>,
    #[serde(default)]
    pub latest_version: Option<ApplicationVersionSummary>,
    #[serde(default)]
    pub deployed_version: Option<ApplicationVersionSummary>,
    #[serde(default)]
    pub environment_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationVersion {
    pub application_version: i64,
    #[serde(default)]
    pub definition_content: Option<String>,
    pub status: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApplicationInput {
    #[serde(skip)]
    pub application_id: String,
    pub current_application_version: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<DefinitionInput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateEnvironmentInput {
    pub name: String,
    pub engine_type: String,
    pub instance_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub subnet_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_group_ids: Vec<String>,
    pub publicly_accessible: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kms_key_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_maintenance_window: Option<String>,
    #[serde(skip_serializing_if = "Tags::is_empty")]
    pub tags: Tags,
    pub client_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub environment_id: String,
    pub environment_arn: String,
    pub name: String,
    pub engine_type: String,
    #[serde(default)]
    pub engine_version: String,
    pub instance_type: String,
    pub status: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub security_group_ids: Vec<String>,
    #[serde(default)]
    pub publicly_accessible: bool,
    #[serde(default)]
    pub kms_key_id: Option<String>,
    #[serde(default)]
    pub preferred_maintenance_window: Option<String>,
    #[serde(default)]
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateEnvironmentInput {
    #[serde(skip)]
    pub environment_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_maintenance_window: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub apply_during_maintenance_window: bool,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDeploymentInput {
    #[serde(skip)]
    pub application_id: String,
    pub environment_id: String,
    pub application_version: i64,
    pub client_token: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deployment {
    pub deployment_id: String,
    pub application_id: String,
    pub environment_id: String,
    pub application_version: i64,
    pub status: String,
    #[serde(default)]
    pub status_reason: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSummary {
    pub application_id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvironmentSummary {
    pub environment_id: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentSummary {
    pub deployment_id: String,
    pub application_id: String,
    pub environment_id: String,
    #[serde(default)]
    pub status: String,
}

/// One page of a list call
#[derive(Debug, Clone, Default)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait M2Api: TagApi {
    async fn create_application(&self, input: &CreateApplicationInput) -> Result<CreateApplicationOutput, ApiError>;
    async fn get_application(&self, id: &str) -> Result<Application, ApiError>;
    async fn get_application_version(&self, id: &str, version: i64) -> Result<ApplicationVersion, ApiError>;
    async fn update_application(&self, input: &UpdateApplicationInput) -> Result<i64, ApiError>;
    async fn delete_application(&self, id: &str) -> Result<(), ApiError>;
    async fn start_application(&self, id: &str) -> Result<(), ApiError>;
    async fn stop_application(&self, id: &str, force: bool) -> Result<(), ApiError>;
    async fn delete_application_from_environment(&self, application_id: &str, environment_id: &str) -> Result<(), ApiError>;
    async fn list_applications(&self, next_token: Option<&str>) -> Result<Page<ApplicationSummary>, ApiError>;

    async fn create_environment(&self, input: &CreateEnvironmentInput) -> Result<String, ApiError>;
    async fn get_environment(&self, id: &str) -> Result<Environment, ApiError>;
    async fn update_environment(&self, input: &UpdateEnvironmentInput) -> Result<(), ApiError>;
    async fn delete_environment(&self, id: &str) -> Result<(), ApiError>;
    async fn list_environments(&self, next_token: Option<&str>) -> Result<Page<EnvironmentSummary>, ApiError>;

    async fn create_deployment(&self, input: &CreateDeploymentInput) -> Result<String, ApiError>;
    async fn get_deployment(&self, application_id: &str, deployment_id: &str) -> Result<Deployment, ApiError>;
    async fn list_deployments(&self, application_id: &str, next_token: Option<&str>) -> Result<Page<DeploymentSummary>, ApiError>;
}

/// M2 over HTTP
#[derive(Clone)]
pub struct M2Client {
    http: AwsHttpClient,
}

impl M2Client {
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.http.send(&request).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::transport(format!("Unexpected M2 response: {e}")))
    }

    async fn call_unit(&self, request: ApiRequest) -> Result<(), ApiError> {
        self.http.send(&request).await.map(|_| ())
    }

    async fn list<T: DeserializeOwned>(
        &self,
        path: String,
        field: &str,
        next_token: Option<&str>,
    ) -> Result<Page<T>, ApiError> {
        let value = self
            .http
            .send(
                &ApiRequest::get(path)
                    .query("maxResults", "100")
                    .query_opt("nextToken", next_token),
            )
            .await?;
        let items = value
            .get(field)
            .cloned()
            .map(serde_json::from_value)
            .transpose()
            .map_err(|e| ApiError::transport(format!("Unexpected M2 response: {e}")))?
            .unwrap_or_default();
        let next_token = value
            .get("nextToken")
            .and_then(|v| v.as_str())
            .filter(|t| !t.is_empty())
            .map(String::from);
        Ok(Page { items, next_token })
    }
}

fn encode<T: Serialize>(input: &T) -> serde_json::Value {
    serde_json::to_value(input).unwrap_or_default()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EnvironmentIdOutput {
    environment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DeploymentIdOutput {
    deployment_id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationVersionOutput {
    application_version: i64,
}

#[async_trait]
impl M2Api for M2Client {
    async fn create_application(&self, input: &CreateApplicationInput) -> Result<CreateApplicationOutput, ApiError> {
        self.call(ApiRequest::post("/applications").json(encode(input)))
            .await
    }

    async fn get_application(&self, id: &str) -> Result<Application, ApiError> {
        self.call(ApiRequest::get(format!("/applications/{}", segment(id))))
            .await
    }

    async fn get_application_version(&self, id: &str, version: i64) -> Result<ApplicationVersion, ApiError> {
        self.call(ApiRequest::get(format!(
            "/applications/{}/versions/{}",
            segment(id),
            version
        )))
        .await
    }

    async fn update_application(&self, input: &UpdateApplicationInput) -> Result<i64, ApiError> {
        let path = format!("/applications/{}", segment(&input.application_id));
        let out: ApplicationVersionOutput = self.call(ApiRequest::patch(path).json(encode(input))).await?;
        Ok(out.application_version)
    }

    async fn delete_application(&self, id: &str) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::delete(format!("/applications/{}", segment(id))))
            .await
    }

    async fn start_application(&self, id: &str) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::post(format!("/applications/{}/start", segment(id))))
            .await
    }

    async fn stop_application(&self, id: &str, force: bool) -> Result<(), ApiError> {
        self.call_unit(
            ApiRequest::post(format!("/applications/{}/stop", segment(id)))
                .json(json!({ "forceStop": force })),
        )
        .await
    }

    async fn delete_application_from_environment(&self, application_id: &str, environment_id: &str) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::delete(format!(
            "/applications/{}/environment/{}",
            segment(application_id),
            segment(environment_id)
        )))
        .await
    }

    async fn list_applications(&self, next_token: Option<&str>) -> Result<Page<ApplicationSummary>, ApiError> {
        self.list("/applications".to_string(), "applications", next_token)
            .await
    }

    async fn create_environment(&self, input: &CreateEnvironmentInput) -> Result<String, ApiError> {
        let out: EnvironmentIdOutput = self
            .call(ApiRequest::post("/environments").json(encode(input)))
            .await?;
        Ok(out.environment_id)
    }

    async fn get_environment(&self, id: &str) -> Result<Environment, ApiError> {
        self.call(ApiRequest::get(format!("/environments/{}", segment(id))))
            .await
    }

    async fn update_environment(&self, input: &UpdateEnvironmentInput) -> Result<(), ApiError> {
        let path = format!("/environments/{}", segment(&input.environment_id));
        self.call_unit(ApiRequest::patch(path).json(encode(input)))
            .await
    }

    async fn delete_environment(&self, id: &str) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::delete(format!("/environments/{}", segment(id))))
            .await
    }

    async fn list_environments(&self, next_token: Option<&str>) -> Result<Page<EnvironmentSummary>, ApiError> {
        self.list("/environments".to_string(), "environments", next_token)
            .await
    }

    async fn create_deployment(&self, input: &CreateDeploymentInput) -> Result<String, ApiError> {
        let path = format!("/applications/{}/deployments", segment(&input.application_id));
        let out: DeploymentIdOutput = self.call(ApiRequest::post(path).json(encode(input))).await?;
        Ok(out.deployment_id)
    }

    async fn get_deployment(&self, application_id: &str, deployment_id: &str) -> Result<Deployment, ApiError> {
        self.call(ApiRequest::get(format!(
            "/applications/{}/deployments/{}",
            segment(application_id),
            segment(deployment_id)
        )))
        .await
    }

    async fn list_deployments(&self, application_id: &str, next_token: Option<&str>) -> Result<Page<DeploymentSummary>, ApiError> {
        let path = format!("/applications/{}/deployments", segment(application_id));
        self.list(path, "deployments", next_token).await
    }
}

#[derive(Deserialize)]
struct ResourceTags {
    #[serde(default)]
    tags: Tags,
}

#[async_trait]
impl TagApi for M2Client {
    async fn list_tags(&self, arn: &str) -> Result<Tags, ApiError> {
        let out: ResourceTags = self
            .call(ApiRequest::get(format!("/tags/{}", segment(arn))))
            .await?;
        Ok(out.tags)
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<(), ApiError> {
        self.call_unit(ApiRequest::post(format!("/tags/{}", segment(arn))).json(json!({ "tags": tags })))
            .await
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), ApiError> {
        let request = keys.iter().fold(
            ApiRequest::delete(format!("/tags/{}", segment(arn))),
            |req, key| req.query("tagKeys", key.as_str()),
        );
        self.call_unit(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_is_union() {
        let input = CreateApplicationInput {
            name: "app".to_string(),
            engine_type: "bluage".to_string(),
            definition: Some(DefinitionInput::Content("{}".to_string())),
            client_token: "t".to_string(),
            ..Default::default()
        };
        let body = encode(&input);
        assert_eq!(body["definition"], json!({"content": "{}"}));
        assert_eq!(body["engineType"], "bluage");
        assert!(body.get("tags").is_none());

        let s3 = encode(&DefinitionInput::S3Location("s3://b/k".to_string()));
        assert_eq!(s3, json!({"s3Location": "s3://b/k"}));
    }

    #[test]
    fn test_update_environment_skips_unset() {
        let input = UpdateEnvironmentInput {
            environment_id: "env".to_string(),
            instance_type: Some("M2.m5.large".to_string()),
            ..Default::default()
        };
        assert_eq!(encode(&input), json!({"instanceType": "M2.m5.large"}));
    }

    #[test]
    fn test_application_response_shape() {
        let body = r#"{
            "applicationId": "a1",
            "applicationArn": "arn:aws:m2:us-west-2:123456789012:app/a1",
            "name": "tf-acc-test-1",
            "engineType": "bluage",
            "status": "Available",
            "creationTime": 1700000000.0,
            "latestVersion": {"applicationVersion": 2, "status": "Available", "creationTime": 1700000000.0}
        }"#;
        let app: Application = serde_json::from_str(body).unwrap();
        assert_eq!(app.latest_version.unwrap().application_version, 2);
        assert!(app.role_arn.is_none());
    }
}
