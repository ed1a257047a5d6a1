//! Sweeper tests against the in-memory cloud

use anyhow::Result;
use awsprov::acctest::fake::FakeCloud;
use awsprov::acctest::{random_name, RESOURCE_PREFIX};
use awsprov::aws::error::ApiError;
use awsprov::provider::ResourceContext;
use awsprov::resource::{lifecycle, registry};
use awsprov::service;
use awsprov::sweep::{self, SweepOptions};
use serde_json::{json, Value};
use std::sync::Arc;

async fn create(ctx: &ResourceContext, type_name: &str, config: Value) -> Result<Value> {
    let resource = registry::new_resource(type_name)?;
    lifecycle::apply(resource.as_ref(), ctx, None, &config).await
}

fn extension(name: &str) -> Value {
    json!({
        "name": name,
        "action_point": [{
            "point": "ON_DEPLOYMENT_COMPLETE",
            "action": [{
                "name": "test",
                "role_arn": "arn:aws:iam::123456789012:role/r",
                "uri": "arn:aws:sns:us-west-2:123456789012:t"
            }]
        }]
    })
}

fn flow(name: &str) -> Value {
    json!({
        "name": name,
        "source": [{"name": "src", "protocol": "zixi-pull"}]
    })
}

/// Only names carrying the prefix are deleted
#[tokio::test]
async fn test_sweep_filters_by_prefix() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let ctx = cloud.context();
    for _ in 0..3 {
        create(&ctx, "aws_appconfig_extension", extension(&random_name())).await?;
    }
    create(&ctx, "aws_appconfig_extension", extension("keep-me")).await?;

    let sweepers = service::sweepers();
    let report = sweep::run(&ctx, &sweepers, &SweepOptions::default()).await?;

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.deleted.len(), 3);
    assert!(report.deleted.iter().all(|d| d.starts_with("aws_appconfig_extension ")));
    assert_eq!(cloud.extension_count(), 1);
    Ok(())
}

/// Deployments are removed before their application and environment
#[tokio::test]
async fn test_sweep_respects_dependencies() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let ctx = cloud.context();
    let name = random_name();

    let environment = create(
        &ctx,
        "aws_m2_environment",
        json!({"name": name, "engine_type": "bluage", "instance_type": "M2.m5.large"}),
    )
    .await?;
    let application = create(
        &ctx,
        "aws_m2_application",
        json!({"name": name, "engine_type": "bluage", "definition": [{"content": "{}"}]}),
    )
    .await?;
    create(
        &ctx,
        "aws_m2_deployment",
        json!({
            "environment_id": environment["environment_id"],
            "application_id": application["application_id"],
            "application_version": 1,
            "start": true
        }),
    )
    .await?;

    let sweepers = service::sweepers();
    let report = sweep::run(&ctx, &sweepers, &SweepOptions::default()).await?;

    assert!(report.is_success(), "{:?}", report.errors);
    assert_eq!(report.deleted.len(), 3);
    assert!(report.deleted[0].starts_with("aws_m2_deployment "));

    let calls = cloud.calls();
    let position = |op: &str| calls.iter().position(|c| c == op);
    assert!(position("StopApplication") < position("DeleteApplicationFromEnvironment"));
    assert!(position("DeleteApplicationFromEnvironment") < position("DeleteApplication"));
    assert!(position("DeleteApplicationFromEnvironment") < position("DeleteEnvironment"));
    Ok(())
}

/// An unavailable service is skipped; a listing failure is reported and the
/// remaining sweepers still run
#[tokio::test]
async fn test_sweep_skips_and_collects_errors() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let ctx = cloud.context();
    create(&ctx, "aws_mediaconnect_flow", flow(&format!("{RESOURCE_PREFIX}-flow"))).await?;
    create(&ctx, "aws_appconfig_extension", extension(&random_name())).await?;

    cloud.fail_next(
        "ListFlows",
        ApiError::new(400, "UnrecognizedClientException", "The security token is invalid"),
    );
    cloud.fail_next(
        "ListEnvironments",
        ApiError::new(500, "InternalServerException", "boom"),
    );

    let sweepers = service::sweepers();
    let report = sweep::run(&ctx, &sweepers, &SweepOptions::default()).await?;

    assert_eq!(report.skipped, vec!["aws_mediaconnect_flow".to_string()]);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].starts_with("aws_m2_environment"), "{:?}", report.errors);
    assert_eq!(report.deleted.len(), 1);
    assert_eq!(cloud.extension_count(), 0);

    // The flow survived the skipped sweep and goes on the next run
    let report = sweep::run(&ctx, &sweepers, &SweepOptions::default()).await?;
    assert!(report.is_success());
    assert_eq!(report.deleted.len(), 1);
    assert!(report.deleted[0].starts_with("aws_mediaconnect_flow "));
    Ok(())
}
