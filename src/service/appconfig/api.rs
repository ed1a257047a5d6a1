//! AppConfig REST API
//!
//! Request/response shapes for the extension endpoints and the HTTP
//! implementation of [`AppConfigApi`].

use crate::aws::http::{segment, ApiRequest, AwsHttpClient};
use crate::aws::ApiError;
use crate::tags::{TagApi, Tags};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtensionAction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtensionParameter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
}

/// Actions keyed by action point
pub type ActionMap = BTreeMap<String, Vec<ExtensionAction>>;

/// Parameters keyed by name
pub type ParameterMap = BTreeMap<String, ExtensionParameter>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Extension {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version_number: i64,
    pub arn: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub actions: ActionMap,
    #[serde(default)]
    pub parameters: ParameterMap,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateExtensionInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub actions: ActionMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: ParameterMap,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: Tags,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateExtensionInput {
    #[serde(skip)]
    pub extension_identifier: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actions: Option<ActionMap>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterMap>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ExtensionSummary {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub version_number: i64,
    #[serde(default)]
    pub arn: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListExtensionsOutput {
    #[serde(default)]
    pub items: Vec<ExtensionSummary>,
    #[serde(default)]
    pub next_token: Option<String>,
}

/// AppConfig operations used by the extension resource and its sweeper
#[async_trait]
pub trait AppConfigApi: TagApi {
    async fn create_extension(&self, input: &CreateExtensionInput) -> Result<Extension, ApiError>;
    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError>;
    async fn update_extension(&self, input: &UpdateExtensionInput) -> Result<Extension, ApiError>;
    async fn delete_extension(&self, id: &str) -> Result<(), ApiError>;
    async fn list_extensions(&self, next_token: Option<&str>) -> Result<ListExtensionsOutput, ApiError>;
}

/// AppConfig over HTTP
#[derive(Clone)]
pub struct AppConfigClient {
    http: AwsHttpClient,
}

impl AppConfigClient {
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }

    async fn call<T: serde::de::DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.http.send(&request).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::transport(format!("Unexpected AppConfig response: {e}")))
    }
}

fn encode<T: Serialize>(input: &T) -> serde_json::Value {
    serde_json::to_value(input).unwrap_or_default()
}

#[async_trait]
impl AppConfigApi for AppConfigClient {
    async fn create_extension(&self, input: &CreateExtensionInput) -> Result<Extension, ApiError> {
        self.call(ApiRequest::post("/extensions").json(encode(input)))
            .await
    }

    async fn get_extension(&self, id: &str) -> Result<Extension, ApiError> {
        self.call(ApiRequest::get(format!("/extensions/{}", segment(id))))
            .await
    }

    async fn update_extension(&self, input: &UpdateExtensionInput) -> Result<Extension, ApiError> {
        let path = format!("/extensions/{}", segment(&input.extension_identifier));
        self.call(ApiRequest::patch(path).json(encode(input))).await
    }

    async fn delete_extension(&self, id: &str) -> Result<(), ApiError> {
        self.http
            .send(&ApiRequest::delete(format!("/extensions/{}", segment(id))))
            .await
            .map(|_| ())
    }

    async fn list_extensions(&self, next_token: Option<&str>) -> Result<ListExtensionsOutput, ApiError> {
        self.call(
            ApiRequest::get("/extensions")
                .query("max_results", "50")
                .query_opt("next_token", next_token),
        )
        .await
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceTags {
    #[serde(default)]
    tags: Tags,
}

#[async_trait]
impl TagApi for AppConfigClient {
    async fn list_tags(&self, arn: &str) -> Result<Tags, ApiError> {
        let out: ResourceTags = self
            .call(ApiRequest::get(format!("/tags/{}", segment(arn))))
            .await?;
        Ok(out.tags)
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<(), ApiError> {
        self.http
            .send(&ApiRequest::post(format!("/tags/{}", segment(arn))).json(json!({ "Tags": tags })))
            .await
            .map(|_| ())
    }

    async fn untag_resource(&self, arn: &str, keys: &[String]) -> Result<(), ApiError> {
        let request = keys.iter().fold(
            ApiRequest::delete(format!("/tags/{}", segment(arn))),
            |req, key| req.query("tagKeys", key.as_str()),
        );
        self.http.send(&request).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_response_shape() {
        let body = r#"{
            "Id": "abc1234",
            "Name": "tf-acc-test-1",
            "VersionNumber": 1,
            "Arn": "arn:aws:appconfig:us-west-2:123456789012:extension/abc1234/1",
            "Actions": {
                "ON_DEPLOYMENT_COMPLETE": [
                    {"Name": "test", "RoleArn": "arn:aws:iam::123456789012:role/r", "Uri": "arn:aws:sns:us-west-2:123456789012:t"}
                ]
            },
            "Parameters": {"p1": {"Description": "d", "Required": true}}
        }"#;
        let ext: Extension = serde_json::from_str(body).unwrap();
        assert_eq!(ext.version_number, 1);
        assert_eq!(ext.actions["ON_DEPLOYMENT_COMPLETE"][0].name.as_deref(), Some("test"));
        assert!(ext.parameters["p1"].required);
        assert!(ext.description.is_none());
    }

    #[test]
    fn test_update_input_omits_identifier() {
        let input = UpdateExtensionInput {
            extension_identifier: "abc".to_string(),
            description: Some("new".to_string()),
            ..Default::default()
        };
        assert_eq!(encode(&input), json!({"Description": "new"}));
    }
}
