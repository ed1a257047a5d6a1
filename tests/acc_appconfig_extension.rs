//! Acceptance tests for `aws_appconfig_extension` against the in-memory cloud

use anyhow::{Context, Result};
use awsprov::acctest::fake::{FakeCloud, FAKE_ACCOUNT_ID, FAKE_REGION};
use awsprov::acctest::{
    attr, attr_set, no_attr, random_name, regional_arn, set_elem_nested_attrs, Captured, Check,
    TestCase, TestStep,
};
use awsprov::aws::error::ApiError;
use awsprov::tags::Tags;
use std::sync::Arc;

const TYPE_NAME: &str = "aws_appconfig_extension";

fn topic() -> String {
    format!("arn:aws:sns:{FAKE_REGION}:{FAKE_ACCOUNT_ID}:tf-acc-test")
}

fn role() -> String {
    format!("arn:aws:iam::{FAKE_ACCOUNT_ID}:role/tf-acc-test")
}

fn action_point(point: &str, action: &str) -> String {
    format!(
        r#"
  - point: {point}
    action:
      - name: {action}
        role_arn: {role}
        uri: {uri}"#,
        role = role(),
        uri = topic(),
    )
}

fn config_basic(name: &str) -> String {
    format!(
        "name: {name}\naction_point:{}\n",
        action_point("ON_DEPLOYMENT_COMPLETE", "test")
    )
}

fn config_extra(name: &str, extra: &str) -> String {
    format!("{}{extra}", config_basic(name))
}

#[tokio::test]
async fn test_basic() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&config_basic(&name))?.checks([
            regional_arn("arn", "appconfig", "extension/"),
            attr("name", name.clone()),
            attr("action_point.#", "1"),
            set_elem_nested_attrs(
                "action_point.*",
                &[("point", "ON_DEPLOYMENT_COMPLETE"), ("action.#", "1")],
            ),
            set_elem_nested_attrs(
                "action_point.*.action.*",
                &[("name", "test"), ("role_arn", role().as_str()), ("uri", topic().as_str())],
            ),
            attr("version", "1"),
            attr("parameter.#", "0"),
            attr("tags.%", "0"),
        ]))
        .step(TestStep::import())
        .run(&cloud.context())
        .await?;

    assert_eq!(cloud.extension_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_disappears() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_basic(&random_name()))?
                .check(attr_set("id"))
                .disappears(),
        )
        .run(&cloud.context())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_action_point() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    let id = Captured::new();
    let two = config_extra(&name, &action_point("ON_DEPLOYMENT_ROLLED_BACK", "rollback"));

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&config_basic(&name))?.checks([
            attr("action_point.#", "1"),
            id.capture("id"),
        ]))
        .step(TestStep::config(&two)?.checks([
            attr("action_point.#", "2"),
            set_elem_nested_attrs("action_point.*", &[("point", "ON_DEPLOYMENT_COMPLETE")]),
            set_elem_nested_attrs(
                "action_point.*",
                &[("point", "ON_DEPLOYMENT_ROLLED_BACK"), ("action.0.name", "rollback")],
            ),
            attr("version", "2"),
            id.unchanged("id"),
        ]))
        .step(TestStep::config(&config_basic(&name))?.checks([
            attr("action_point.#", "1"),
            set_elem_nested_attrs("action_point.*", &[("point", "ON_DEPLOYMENT_COMPLETE")]),
            attr("version", "3"),
            id.unchanged("id"),
        ]))
        .run(&cloud.context())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_parameter() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    let one = config_extra(
        &name,
        "parameter:\n  - name: parameter1\n    description: one\n    required: true\n",
    );
    let two = config_extra(
        &name,
        "parameter:\n  - name: parameter1\n    description: one\n    required: false\n  - name: parameter2\n",
    );

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&one)?.checks([
            attr("parameter.#", "1"),
            set_elem_nested_attrs(
                "parameter.*",
                &[("name", "parameter1"), ("description", "one"), ("required", "true")],
            ),
        ]))
        .step(TestStep::import())
        .step(TestStep::config(&two)?.checks([
            attr("parameter.#", "2"),
            set_elem_nested_attrs("parameter.*", &[("name", "parameter1"), ("required", "false")]),
            set_elem_nested_attrs("parameter.*", &[("name", "parameter2"), ("required", "false")]),
        ]))
        .step(TestStep::config(&config_basic(&name))?.check(attr("parameter.#", "0")))
        .run(&cloud.context())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_name_forces_replacement() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let id = Captured::new();
    let renamed = random_name();

    let report = TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&config_basic(&random_name()))?.check(id.capture("id")))
        .step(TestStep::config(&config_basic(&renamed))?.checks([
            attr("name", renamed.clone()),
            attr("version", "1"),
            id.changed("id"),
        ]))
        .run(&cloud.context())
        .await?;

    assert_eq!(report.ids.len(), 2);
    assert_eq!(cloud.call_count("DeleteExtension"), 2);
    Ok(())
}

#[tokio::test]
async fn test_description() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_extra(&name, "description: first\n"))?
                .check(attr("description", "first")),
        )
        .step(
            TestStep::config(&config_extra(&name, "description: second\n"))?
                .check(attr("description", "second")),
        )
        .step(TestStep::config(&config_basic(&name))?.check(no_attr("description")))
        .run(&cloud.context())
        .await?;
    Ok(())
}

#[tokio::test]
async fn test_tags() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    let id = Captured::new();

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_extra(&name, "tags:\n  key1: value1\n"))?.checks([
                attr("tags.%", "1"),
                attr("tags.key1", "value1"),
                id.capture("id"),
            ]),
        )
        .step(TestStep::import())
        .step(
            TestStep::config(&config_extra(&name, "tags:\n  key1: value1updated\n  key2: value2\n"))?
                .checks([
                    attr("tags.%", "2"),
                    attr("tags.key1", "value1updated"),
                    attr("tags.key2", "value2"),
                    id.unchanged("id"),
                ]),
        )
        .step(
            TestStep::config(&config_extra(&name, "tags:\n  key2: value2\n"))?.checks([
                attr("tags.%", "1"),
                attr("tags.key2", "value2"),
                no_attr("tags.key1"),
                id.unchanged("id"),
            ]),
        )
        .run(&cloud.context())
        .await?;

    // Tag changes alone never touch the extension body
    assert_eq!(cloud.call_count("UpdateExtension"), 0);
    Ok(())
}

#[tokio::test]
async fn test_default_tags() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let defaults = Tags::from([("providerkey".to_string(), "providervalue".to_string())]);
    let ctx = cloud.context().with_default_tags(defaults);

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_extra(&random_name(), "tags:\n  key1: value1\n"))?.checks([
                attr("tags.%", "1"),
                attr("tags_all.%", "2"),
                attr("tags_all.providerkey", "providervalue"),
            ]),
        )
        .run(&ctx)
        .await?;
    Ok(())
}

/// A resource tag equal to a default tag is still the resource's own
#[tokio::test]
async fn test_default_tags_duplicated_by_resource_tag() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    let defaults = Tags::from([
        ("team".to_string(), "infra".to_string()),
        ("providerkey".to_string(), "providervalue".to_string()),
    ]);
    let ctx = cloud.context().with_default_tags(defaults);

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_extra(&name, "tags:\n  team: infra\n  key1: value1\n"))?.checks([
                attr("tags.%", "2"),
                attr("tags.team", "infra"),
                attr("tags.key1", "value1"),
                attr("tags_all.%", "3"),
            ]),
        )
        .step(
            TestStep::config(&config_extra(&name, "tags:\n  key1: value1\n"))?.checks([
                attr("tags.%", "1"),
                no_attr("tags.team"),
                attr("tags_all.team", "infra"),
                attr("tags_all.%", "3"),
            ]),
        )
        .run(&ctx)
        .await?;

    assert_eq!(cloud.call_count("TagResource"), 0);
    assert_eq!(cloud.call_count("UntagResource"), 0);
    Ok(())
}

#[tokio::test]
async fn test_system_tags_are_ignored() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    let arn = Captured::new();

    // Replace the remote tags out-of-band with a system tag only
    let tag_out_of_band: Check = {
        let (cloud, arn) = (cloud.clone(), arn.clone());
        Box::new(move |_| {
            let arn = arn.get().context("arn not captured")?;
            cloud.put_tags(
                &arn,
                Tags::from([("aws:cloudformation:stack-name".to_string(), "stack".to_string())]),
            );
            Ok(())
        })
    };

    TestCase::new(TYPE_NAME)?
        .step(
            TestStep::config(&config_basic(&name))?
                .check(arn.capture("arn"))
                .check(tag_out_of_band),
        )
        .step(TestStep::config(&config_basic(&name))?.checks([attr("tags.%", "0"), attr("tags_all.%", "0")]))
        .run(&cloud.context())
        .await?;

    assert_eq!(cloud.call_count("TagResource"), 0);
    Ok(())
}

#[tokio::test]
async fn test_invalid_config_makes_no_calls() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let bad = config_basic(&random_name()).replace(&topic(), "not-an-arn");

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&bad)?.expect_error("is not a valid ARN"))
        .step(
            TestStep::config(&format!("name: {}\naction_point: []\n", random_name()))?
                .expect_error("action_point"),
        )
        .run(&cloud.context())
        .await?;

    assert_eq!(cloud.call_count("CreateExtension"), 0);
    Ok(())
}

#[tokio::test]
async fn test_create_retries_role_propagation() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    cloud.fail_next(
        "CreateExtension",
        ApiError::new(400, "BadRequestException", "Error trying to assume role"),
    );

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&config_basic(&random_name()))?.check(attr("version", "1")))
        .run(&cloud.context())
        .await?;

    assert_eq!(cloud.call_count("CreateExtension"), 2);
    Ok(())
}

#[tokio::test]
async fn test_failed_update_keeps_prior_state() -> Result<()> {
    let cloud = Arc::new(FakeCloud::new());
    let name = random_name();
    cloud.fail_next(
        "UpdateExtension",
        ApiError::new(500, "InternalServerException", "something broke"),
    );

    TestCase::new(TYPE_NAME)?
        .step(TestStep::config(&config_basic(&name))?.check(attr("version", "1")))
        .step(
            TestStep::config(&config_extra(&name, "description: changed\n"))?
                .expect_error("InternalServerException"),
        )
        .step(
            TestStep::config(&config_extra(&name, "description: changed\n"))?
                .checks([attr("description", "changed"), attr("version", "2")]),
        )
        .run(&cloud.context())
        .await?;

    assert_eq!(cloud.call_count("UpdateExtension"), 2);
    Ok(())
}
