//! `aws_mediaconnect_flow`
//!
//! A flow with a single source. Every attribute except tags forces
//! replacement; the flow is stopped before it is deleted.

use super::api::{flow_status as status, CreateFlowInput, Flow, SetSourceRequest};
use crate::provider::ResourceContext;
use crate::resource::wait::StatusWaiter;
use crate::resource::{CreatedExt, Resource};
use crate::schema::{single_block, validate, AttrType, Attribute, Diagnostics, Schema, Validate};
use crate::tags::{self, Tags};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TYPE_NAME: &str = "aws_mediaconnect_flow";

const CREATE_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const STOP_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const DELETE_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Protocol {
    ZixiPush,
    RtpFec,
    Rtp,
    ZixiPull,
    Rist,
    St2110Jpegxs,
    Cdi,
    SrtListener,
    SrtCaller,
    FujitsuQos,
    Udp,
}

impl Protocol {
    pub const NAMES: &'static [&'static str] = &[
        "zixi-push",
        "rtp-fec",
        "rtp",
        "zixi-pull",
        "rist",
        "st2110-jpegxs",
        "cdi",
        "srt-listener",
        "srt-caller",
        "fujitsu-qos",
        "udp",
    ];

    pub fn as_str(self) -> &'static str {
        Self::NAMES[self as usize]
    }

    fn parse(value: &str) -> Option<Self> {
        serde_json::from_value(serde_json::Value::String(value.to_string())).ok()
    }

    /// Protocols that listen on an ingest port
    fn needs_ingest_port(self) -> bool {
        matches!(
            self,
            Protocol::ZixiPush | Protocol::RtpFec | Protocol::Rtp | Protocol::Rist | Protocol::SrtListener | Protocol::Udp
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowSource {
    pub name: String,
    pub protocol: Protocol,
    #[serde(default)]
    pub ingest_port: Option<u32>,
    #[serde(default)]
    pub whitelist_cidr: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FlowConfig {
    pub name: String,
    #[serde(default)]
    pub availability_zone: Option<String>,
    #[serde(default, with = "single_block")]
    pub source: Option<FlowSource>,
    #[serde(default)]
    pub tags: Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowState {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub availability_zone: String,
    #[serde(default, with = "single_block")]
    pub source: Option<FlowSource>,
    pub status: String,
    pub tags: Tags,
    pub tags_all: Tags,
}

impl Validate for FlowConfig {
    fn validate(&self, diags: &mut Diagnostics) {
        validate::length(diags, "name", &self.name, 1, 128);
        let Some(source) = &self.source else {
            diags.error("source", "a source block is required");
            return;
        };
        validate::length(diags, "source.name", &source.name, 1, 128);
        match source.ingest_port {
            Some(port) => validate::port(diags, "source.ingest_port", port),
            None if source.protocol.needs_ingest_port() => diags.error(
                "source.ingest_port",
                format!("required for protocol {}", source.protocol.as_str()),
            ),
            None => {}
        }
        if let Some(cidr) = &source.whitelist_cidr {
            validate::cidr(diags, "source.whitelist_cidr", cidr);
        }
    }
}

fn flatten_source(flow: &Flow) -> Option<FlowSource> {
    let protocol = flow.source.transport.as_ref().map(|t| t.protocol.as_str())?;
    let Some(protocol) = Protocol::parse(protocol) else {
        tracing::warn!("Unknown MediaConnect protocol {} on {}", protocol, flow.flow_arn);
        return None;
    };
    Some(FlowSource {
        name: flow.source.name.clone(),
        protocol,
        ingest_port: flow.source.ingest_port,
        whitelist_cidr: flow.source.whitelist_cidr.clone(),
        description: flow.source.description.clone().filter(|d| !d.is_empty()),
    })
}

async fn wait_flow(
    ctx: &ResourceContext,
    arn: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<Option<Flow>> {
    StatusWaiter::new(pending, target, ctx.timeouts.cap(timeout))
        .poll_interval(ctx.timeouts.poll_interval)
        .wait(move || async move {
            match ctx.mediaconnect.describe_flow(arn).await {
                Ok(flow) => {
                    let status = flow.status.clone();
                    Ok(Some((flow, status)))
                }
                Err(e) if e.is_not_found() => Ok(None),
                Err(e) => Err(e.into()),
            }
        })
        .await
        .with_context(|| format!("waiting for MediaConnect Flow ({arn})"))
}

/// The MediaConnect flow resource
#[derive(Debug, Default, Clone, Copy)]
pub struct FlowResource;

impl FlowResource {
    async fn read_back(&self, ctx: &ResourceContext, arn: &str) -> Result<FlowState> {
        self.read(ctx, arn)
            .await?
            .with_context(|| format!("MediaConnect Flow ({arn}) not found after write"))
    }
}

#[async_trait]
impl Resource for FlowResource {
    type Config = FlowConfig;
    type State = FlowState;

    fn type_name(&self) -> &'static str {
        TYPE_NAME
    }

    fn schema(&self) -> Schema {
        Schema::new(vec![
            Attribute::computed("id", AttrType::String),
            Attribute::computed("arn", AttrType::String),
            Attribute::required("name", AttrType::String).force_new(),
            Attribute::optional_computed("availability_zone", AttrType::String).force_new(),
            Attribute::required("source", AttrType::List)
                .force_new()
                .items(Some(1), Some(1))
                .with_block(vec![
                    Attribute::required("name", AttrType::String),
                    Attribute::required("protocol", AttrType::String).one_of(Protocol::NAMES),
                    Attribute::optional("ingest_port", AttrType::Int),
                    Attribute::optional("whitelist_cidr", AttrType::String),
                    Attribute::optional("description", AttrType::String),
                ]),
            Attribute::computed("status", AttrType::String),
            Attribute::optional("tags", AttrType::Map),
            Attribute::computed("tags_all", AttrType::Map),
        ])
    }

    fn id(state: &FlowState) -> &str {
        &state.id
    }

    async fn create(&self, ctx: &ResourceContext, config: &FlowConfig) -> Result<FlowState> {
        let source = config
            .source
            .as_ref()
            .context("MediaConnect Flow requires a source")?;
        let input = CreateFlowInput {
            name: config.name.clone(),
            availability_zone: config.availability_zone.clone(),
            source: SetSourceRequest {
                name: source.name.clone(),
                protocol: source.protocol.as_str().to_string(),
                ingest_port: source.ingest_port,
                whitelist_cidr: source.whitelist_cidr.clone(),
                description: source.description.clone(),
            },
        };

        let flow = ctx
            .mediaconnect
            .create_flow(&input)
            .await
            .with_context(|| format!("creating MediaConnect Flow ({})", config.name))?;
        let arn = flow.flow_arn;

        async {
            wait_flow(
                ctx,
                &arn,
                &[status::UPDATING, status::STARTING],
                &[status::STANDBY, status::ACTIVE],
                CREATE_TIMEOUT,
            )
            .await?;

            let want = tags::ignore_system(tags::merge(&ctx.default_tags, &config.tags));
            if !want.is_empty() {
                ctx.mediaconnect
                    .tag_resource(&arn, &want)
                    .await
                    .with_context(|| format!("tagging MediaConnect Flow ({arn})"))?;
            }

            self.read_back(ctx, &arn).await
        }
        .await
        .created(&arn)
    }

    fn placeholder(arn: &str, config: &FlowConfig) -> FlowState {
        FlowState {
            id: arn.to_string(),
            arn: arn.to_string(),
            name: config.name.clone(),
            availability_zone: config.availability_zone.clone().unwrap_or_default(),
            source: config.source.clone(),
            status: String::new(),
            tags: config.tags.clone(),
            tags_all: Tags::new(),
        }
    }

    async fn read(&self, ctx: &ResourceContext, arn: &str) -> Result<Option<FlowState>> {
        let flow = match ctx.mediaconnect.describe_flow(arn).await {
            Ok(flow) => flow,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e).context(format!("reading MediaConnect Flow ({arn})")),
        };

        let remote_tags = ctx
            .mediaconnect
            .list_tags(arn)
            .await
            .with_context(|| format!("listing tags for MediaConnect Flow ({arn})"))?;
        let (tags, tags_all) = tags::for_state(remote_tags, &ctx.default_tags);

        Ok(Some(FlowState {
            source: flatten_source(&flow),
            id: flow.flow_arn.clone(),
            arn: flow.flow_arn,
            name: flow.name,
            availability_zone: flow.availability_zone,
            status: flow.status,
            tags,
            tags_all,
        }))
    }

    async fn update(&self, ctx: &ResourceContext, prior: &FlowState, config: &FlowConfig) -> Result<FlowState> {
        let want = tags::merge(&ctx.default_tags, &config.tags);
        tags::update_tags(ctx.mediaconnect.as_ref(), &prior.arn, &prior.tags_all, &want)
            .await
            .with_context(|| format!("updating tags for MediaConnect Flow ({})", prior.arn))?;

        self.read_back(ctx, &prior.arn).await
    }

    async fn delete(&self, ctx: &ResourceContext, state: &FlowState) -> Result<()> {
        let current = match ctx.mediaconnect.describe_flow(&state.arn).await {
            Ok(flow) => flow,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e).context(format!("reading MediaConnect Flow ({})", state.arn)),
        };

        if current.status == status::ACTIVE || current.status == status::STARTING {
            tracing::info!("Stopping MediaConnect Flow {}", state.arn);
            ctx.mediaconnect
                .stop_flow(&state.arn)
                .await
                .with_context(|| format!("stopping MediaConnect Flow ({})", state.arn))?;
            wait_flow(
                ctx,
                &state.arn,
                &[status::ACTIVE, status::STARTING, status::STOPPING],
                &[status::STANDBY],
                STOP_TIMEOUT,
            )
            .await?;
        }

        match ctx.mediaconnect.delete_flow(&state.arn).await {
            Err(e) if e.is_not_found() => return Ok(()),
            result => result.with_context(|| format!("deleting MediaConnect Flow ({})", state.arn))?,
        }

        wait_flow(
            ctx,
            &state.arn,
            &[status::STANDBY, status::DELETING],
            &[],
            DELETE_TIMEOUT,
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{DynResource, Erased};
    use serde_json::json;

    fn config() -> serde_json::Value {
        json!({
            "name": "tf-acc-test-flow",
            "source": [{
                "name": "src",
                "protocol": "rtp",
                "ingest_port": 5000,
                "whitelist_cidr": "10.0.0.0/16"
            }]
        })
    }

    #[test]
    fn test_protocol_names_line_up() {
        for name in Protocol::NAMES {
            let protocol = Protocol::parse(name).unwrap();
            assert_eq!(protocol.as_str(), *name);
        }
    }

    #[test]
    fn test_decode_and_validate() {
        assert!(Erased(FlowResource).decode_config(&config()).is_ok());

        let mut raw = config();
        raw["source"][0]["protocol"] = json!("ftp");
        assert!(Erased(FlowResource).decode_config(&raw).is_err());

        let mut raw = config();
        raw["source"][0].as_object_mut().unwrap().remove("ingest_port");
        let err = Erased(FlowResource).decode_config(&raw).unwrap_err();
        assert!(err.to_string().contains("ingest_port"));

        let mut raw = config();
        raw["source"][0]["whitelist_cidr"] = json!("10.0.0.0");
        assert!(Erased(FlowResource).decode_config(&raw).is_err());
    }

    #[test]
    fn test_everything_but_tags_replaces() {
        let schema = FlowResource.schema();
        let prior = config();
        let mut desired = config();
        desired["tags"] = json!({"k": "v"});
        assert!(schema.replace_triggers(&prior, &desired).is_empty());

        desired["source"][0]["ingest_port"] = json!(5001);
        assert_eq!(schema.replace_triggers(&prior, &desired), vec!["source"]);
    }
}
