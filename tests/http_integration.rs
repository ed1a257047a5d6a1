//! Integration tests for the AWS HTTP client using wiremock
//!
//! These tests verify request signing, error decoding, throttling retries and
//! the REST shapes of the service clients against mocked endpoints.

use awsprov::aws::auth::Credentials;
use awsprov::aws::client::AwsClient;
use awsprov::aws::http::{ApiRequest, AwsHttpClient};
use awsprov::config::ProviderConfig;
use awsprov::provider::ResourceContext;
use awsprov::resource::registry;
use awsprov::service::appconfig::{AppConfigApi, AppConfigClient};
use awsprov::service::m2::api::UpdateEnvironmentInput;
use awsprov::service::m2::{M2Api, M2Client};
use awsprov::service::mediaconnect::{MediaConnectApi, MediaConnectClient};
use awsprov::tags::TagApi;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, header_exists, method, path, path_regex, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn http(server: &MockServer, signing_name: &str, max_attempts: u32) -> AwsHttpClient {
    AwsHttpClient::new(
        &server.uri(),
        Credentials::new("AKIDEXAMPLE", "wJalrXUtnFEMI/K7MDENG+bPxRfiCYEXAMPLEKEY"),
        "us-west-2",
        signing_name,
        max_attempts,
    )
    .expect("client")
}

fn extension_body() -> serde_json::Value {
    json!({
        "Id": "abc1234",
        "Name": "tf-acc-test-1",
        "VersionNumber": 1,
        "Arn": "arn:aws:appconfig:us-west-2:123456789012:extension/abc1234",
        "Actions": {
            "ON_DEPLOYMENT_COMPLETE": [{
                "Name": "test",
                "RoleArn": "arn:aws:iam::123456789012:role/r",
                "Uri": "arn:aws:sns:us-west-2:123456789012:t"
            }]
        }
    })
}

/// Context whose clients all point at the mock server
fn context(server: &MockServer) -> ResourceContext {
    let config = ProviderConfig {
        endpoint_url: Some(server.uri()),
        max_attempts: 2,
        poll_interval_ms: 10,
        ..Default::default()
    };
    let client = AwsClient::with_credentials(&config, Credentials::new("AKID", "secret"));
    ResourceContext::from_client(&client, &config).expect("context")
}

mod signing {
    use super::*;

    /// Every request carries a SigV4 authorization for the service
    #[tokio::test]
    async fn test_requests_are_signed() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/extensions/abc1234"))
            .and(header_exists("x-amz-date"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extension_body()))
            .expect(1)
            .mount(&server)
            .await;

        let client = AppConfigClient::new(http(&server, "appconfig", 1));
        let extension = client.get_extension("abc1234").await.expect("get");
        assert_eq!(extension.name, "tf-acc-test-1");

        let requests = server.received_requests().await.expect("recording enabled");
        let auth = requests[0]
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert!(auth.starts_with("AWS4-HMAC-SHA256 Credential=AKIDEXAMPLE/"));
        assert!(auth.contains("/us-west-2/appconfig/aws4_request"));
        assert!(auth.contains("SignedHeaders=host;x-amz-date"));
    }

    #[tokio::test]
    async fn test_session_token_header() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/environments/env-1"))
            .and(header("x-amz-security-token", "session"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "gone"})))
            .expect(1)
            .mount(&server)
            .await;

        let mut credentials = Credentials::new("AKID", "secret");
        credentials.session_token = Some("session".to_string());
        let http = AwsHttpClient::new(&server.uri(), credentials, "us-west-2", "m2", 1).expect("client");
        let err = M2Client::new(http).get_environment("env-1").await.unwrap_err();
        assert!(err.is_not_found());
    }
}

mod errors {
    use super::*;

    #[tokio::test]
    async fn test_error_type_header_is_decoded() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/extensions/missing"))
            .respond_with(
                ResponseTemplate::new(404)
                    .insert_header("x-amzn-errortype", "ResourceNotFoundException:http://internal/")
                    .set_body_json(json!({"Message": "Extension not found"})),
            )
            .mount(&server)
            .await;

        let client = AppConfigClient::new(http(&server, "appconfig", 3));
        let err = client.get_extension("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(err.message, "Extension not found");
    }

    /// Client errors are not retried
    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extensions"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "__type": "BadRequestException",
                "Message": "Error trying to assume role"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = http(&server, "appconfig", 5);
        let err = client
            .send(&ApiRequest::post("/extensions").json(json!({"Name": "x"})))
            .await
            .unwrap_err();
        assert!(err.message_contains("BadRequestException", "assume"));
        assert!(!err.is_throttling());
    }

    #[tokio::test]
    async fn test_read_of_missing_resource_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/extensions/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({"Message": "not found"})))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let resource = registry::new_resource("aws_appconfig_extension").expect("registered");
        let state = resource.read(&ctx, "gone").await.expect("read");
        assert!(state.is_none());
    }
}

mod throttling {
    use super::*;

    #[tokio::test]
    async fn test_throttled_request_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/v1/flows"))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({"message": "Rate exceeded"})))
            .up_to_n_times(2)
            .expect(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v1/flows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "flows": [{"flowArn": "arn:aws:mediaconnect:us-west-2:123456789012:flow:1-a:f", "name": "f", "status": "STANDBY"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = MediaConnectClient::new(http(&server, "mediaconnect", 3));
        let out = client.list_flows(None).await.expect("list after retries");
        assert_eq!(out.flows.len(), 1);
        assert!(out.next_token.is_none());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/applications"))
            .respond_with(
                ResponseTemplate::new(400)
                    .insert_header("x-amzn-errortype", "ThrottlingException")
                    .set_body_json(json!({"message": "slow down"})),
            )
            .expect(3)
            .mount(&server)
            .await;

        let client = M2Client::new(http(&server, "m2", 3));
        let err = client.list_applications(None).await.unwrap_err();
        assert!(err.is_throttling());
    }
}

mod shapes {
    use super::*;

    #[tokio::test]
    async fn test_m2_update_environment_patch() {
        let server = MockServer::start().await;

        Mock::given(method("PATCH"))
            .and(path("/environments/env-1"))
            .and(body_partial_json(json!({"instanceType": "M2.m6i.large"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"environmentId": "env-1"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = M2Client::new(http(&server, "m2", 1));
        client
            .update_environment(&UpdateEnvironmentInput {
                environment_id: "env-1".to_string(),
                instance_type: Some("M2.m6i.large".to_string()),
                ..Default::default()
            })
            .await
            .expect("update");
    }

    #[tokio::test]
    async fn test_m2_list_pages() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/environments"))
            .and(query_param("nextToken", "t1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "environments": [{"environmentId": "e2", "name": "tf-acc-test-2"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/environments"))
            .and(query_param("maxResults", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "environments": [{"environmentId": "e1", "name": "tf-acc-test-1", "status": "Available"}],
                "nextToken": "t1"
            })))
            .mount(&server)
            .await;

        let client = M2Client::new(http(&server, "m2", 1));
        let first = client.list_environments(None).await.expect("page 1");
        assert_eq!(first.items[0].environment_id, "e1");
        assert_eq!(first.next_token.as_deref(), Some("t1"));
        let second = client.list_environments(Some("t1")).await.expect("page 2");
        assert_eq!(second.items[0].environment_id, "e2");
        assert!(second.next_token.is_none());
    }

    #[tokio::test]
    async fn test_untag_sends_keys_as_query() {
        let server = MockServer::start().await;

        Mock::given(method("DELETE"))
            .and(path_regex(r"^/tags/arn%3Aaws%3Amediaconnect%3A"))
            .and(query_param("tagKeys", "key1"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let client = MediaConnectClient::new(http(&server, "mediaconnect", 1));
        client
            .untag_resource(
                "arn:aws:mediaconnect:us-west-2:123456789012:flow:1-abc:f",
                &["key1".to_string()],
            )
            .await
            .expect("untag");
    }

    /// Create runs through the translator: create, read back, list tags
    #[tokio::test]
    async fn test_extension_create_round_trip() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/extensions"))
            .and(body_partial_json(json!({
                "Name": "tf-acc-test-1",
                "Tags": {"key1": "value1"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(extension_body()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/extensions/abc1234"))
            .respond_with(ResponseTemplate::new(200).set_body_json(extension_body()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path_regex(r"^/tags/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "Tags": {"key1": "value1", "aws:cloudformation:stack-name": "s"}
            })))
            .mount(&server)
            .await;

        let ctx = context(&server);
        let resource = registry::new_resource("aws_appconfig_extension").expect("registered");
        let config = resource
            .decode_config(&json!({
                "name": "tf-acc-test-1",
                "action_point": [{
                    "point": "ON_DEPLOYMENT_COMPLETE",
                    "action": [{
                        "name": "test",
                        "role_arn": "arn:aws:iam::123456789012:role/r",
                        "uri": "arn:aws:sns:us-west-2:123456789012:t"
                    }]
                }],
                "tags": {"key1": "value1"}
            }))
            .expect("valid config");
        let state = resource.create(&ctx, &config).await.expect("create");

        assert_eq!(state["id"], "abc1234");
        assert_eq!(state["version"], 1);
        assert_eq!(state["tags"], json!({"key1": "value1"}));
        assert_eq!(state["action_point"][0]["action"][0]["name"], "test");
    }
}
