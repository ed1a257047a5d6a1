//! MediaConnect REST API (`/v1/flows`)

use crate::aws::http::{segment, ApiRequest, AwsHttpClient};
use crate::aws::ApiError;
use crate::tags::{TagApi, Tags};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;

pub mod flow_status {
    pub const STANDBY: &str = "STANDBY";
    pub const ACTIVE: &str = "ACTIVE";
    pub const UPDATING: &str = "UPDATING";
    pub const DELETING: &str = "DELETING";
    pub const STARTING: &str = "STARTING";
    pub const STOPPING: &str = "STOPPING";
    pub const ERROR: &str = "ERROR";
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetSourceRequest {
    pub name: String,
    pub protocol: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_port: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub whitelist_cidr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateFlowInput {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_zone: Option<String>,
    pub source: SetSourceRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transport {
    pub protocol: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    pub name: String,
    #[serde(default)]
    pub source_arn: String,
    #[serde(default)]
    pub ingest_port: Option<u32>,
    #[serde(default)]
    pub whitelist_cidr: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub transport: Option<Transport>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Flow {
    pub flow_arn: String,
    pub name: String,
    pub availability_zone: String,
    pub status: String,
    pub source: Source,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowSummary {
    pub flow_arn: String,
    pub name: String,
    #[serde(default)]
    pub status: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFlowsOutput {
    #[serde(default)]
    pub flows: Vec<FlowSummary>,
    #[serde(default)]
    pub next_token: Option<String>,
}

#[async_trait]
pub trait MediaConnectApi: TagApi {
    async fn create_flow(&self, input: &CreateFlowInput) -> Result<Flow, ApiError>;
    async fn describe_flow(&self, arn: &str) -> Result<Flow, ApiError>;
    async fn stop_flow(&self, arn: &str) -> Result<(), ApiError>;
    async fn delete_flow(&self, arn: &str) -> Result<(), ApiError>;
    async fn list_flows(&self, next_token: Option<&str>) -> Result<ListFlowsOutput, ApiError>;
}

/// MediaConnect over HTTP
#[derive(Clone)]
pub struct MediaConnectClient {
    http: AwsHttpClient,
}

#[derive(Deserialize)]
struct FlowOutput {
    flow: Flow,
}

impl MediaConnectClient {
    pub fn new(http: AwsHttpClient) -> Self {
        Self { http }
    }

    async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let value = self.http.send(&request).await?;
        serde_json::from_value(value)
            .map_err(|e| ApiError::transport(format!("Unexpected MediaConnect response: {e}")))
    }
}

#[async_trait]
impl MediaConnectApi for MediaConnectClient {
    async fn create_flow(&self, input: &CreateFlowInput) -> Result<Flow, ApiError> {
        let body = serde_json::to_value(input).unwrap_or_default();
        let out: FlowOutput = self.call(ApiRequest::post("/v1/flows").json(body)).await?;
        Ok(out.flow)
    }

    async fn describe_flow(&self, arn: &str) -> Result<Flow, ApiError> {
        let out: FlowOutput = self
            .call(ApiRequest::get(format!("/v1/flows/{}", segment(arn))))
            .await?;
        Ok(out.flow)
    }

    async fn stop_flow(&self, arn: &str) -> Result<(), ApiError> {
        self.http
            .send(&ApiRequest::post(format!("/v1/flows/stop/{}", segment(arn))))
            .await
            .map(|_| ())
    }

    async fn delete_flow(&self, arn: &str) -> Result<(), ApiError> {
        self.http
            .send(&ApiRequest::delete(format!("/v1/flows/{}", segment(arn))))
            .await
            .map(|_| ())
    }

    async fn list_flows(&self, next_token: Option<&str>) -> Result<ListFlowsOutput, ApiError> {
        self.call(
            ApiRequest::get("/v1/flows")
                .query("maxResults", "20")
                .query_opt("nextToken", next_token),
        )
        .await
    }
}

#[derive(Deserialize)]
struct ResourceTags {
    #[serde(default)]
    tags: Tags,
}

#[async_trait]
impl TagApi for MediaConnectClient {
    async fn list_tags(&self, arn: &str) -> Result<Tags, ApiError> {
        let out: ResourceTags = self
            .call(ApiRequest::get(format!("/tags/{}", segment(arn))))
            .await?;
        Ok(out.tags)
    }

    async fn tag_resource(&self, arn: &str, tags: &Tags) -> Result<(), ApiError> {
        self.http
            .send(&ApiRequest::post(format!("/tags/{}", segment(arn))).json(json!({ "tags": tags })))
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
    fn test_describe_flow_shape() {
        let body = r#"{"flow": {
            "flowArn": "arn:aws:mediaconnect:us-west-2:123456789012:flow:1-abc:tf-acc-test",
            "name": "tf-acc-test",
            "availabilityZone": "us-west-2a",
            "status": "STANDBY",
            "source": {
                "name": "src",
                "sourceArn": "arn:aws:mediaconnect:us-west-2:123456789012:source:1-abc:src",
                "ingestPort": 5000,
                "whitelistCidr": "10.0.0.0/16",
                "transport": {"protocol": "rtp", "maxBitrate": 80000000}
            },
            "entitlements": []
        }}"#;
        let out: FlowOutput = serde_json::from_str(body).unwrap();
        assert_eq!(out.flow.source.transport.unwrap().protocol, "rtp");
        assert_eq!(out.flow.source.ingest_port, Some(5000));
    }
}
