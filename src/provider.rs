//! Provider context
//!
//! [`ResourceContext`] carries the service API clients, default tags and
//! timeouts. It is built once from [`ProviderConfig`] and passed explicitly to
//! every resource operation.

use crate::aws::client::AwsClient;
use crate::config::ProviderConfig;
use crate::service::appconfig::{AppConfigApi, AppConfigClient};
use crate::service::m2::{M2Api, M2Client};
use crate::service::mediaconnect::{MediaConnectApi, MediaConnectClient};
use crate::tags::Tags;
use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

/// Polling and retry timing shared by all resources
#[derive(Debug, Clone, Copy)]
pub struct Timeouts {
    /// Interval between status polls
    pub poll_interval: Duration,
    /// How long to retry errors caused by IAM eventual consistency
    pub propagation: Duration,
    /// Upper bound applied to every resource's own wait timeout
    pub max_wait: Option<Duration>,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            propagation: Duration::from_secs(2 * 60),
            max_wait: None,
        }
    }
}

impl Timeouts {
    /// A resource's default timeout, capped by `max_wait`
    pub fn cap(&self, default: Duration) -> Duration {
        match self.max_wait {
            Some(max) => default.min(max),
            None => default,
        }
    }
}

/// Everything a resource operation needs from the provider
#[derive(Clone)]
pub struct ResourceContext {
    pub appconfig: Arc<dyn AppConfigApi>,
    pub m2: Arc<dyn M2Api>,
    pub mediaconnect: Arc<dyn MediaConnectApi>,
    pub region: String,
    pub default_tags: Tags,
    pub timeouts: Timeouts,
}

impl ResourceContext {
    /// Resolve credentials and build HTTP-backed clients
    pub fn from_config(config: &ProviderConfig) -> Result<Self> {
        let client = AwsClient::new(config)?;
        Self::from_client(&client, config)
    }

    pub fn from_client(client: &AwsClient, config: &ProviderConfig) -> Result<Self> {
        let appconfig = client
            .service_http("appconfig", "appconfig")
            .context("Failed to create AppConfig client")?;
        let m2 = client
            .service_http("m2", "m2")
            .context("Failed to create M2 client")?;
        let mediaconnect = client
            .service_http("mediaconnect", "mediaconnect")
            .context("Failed to create MediaConnect client")?;

        Ok(Self {
            appconfig: Arc::new(AppConfigClient::new(appconfig)),
            m2: Arc::new(M2Client::new(m2)),
            mediaconnect: Arc::new(MediaConnectClient::new(mediaconnect)),
            region: config.region.clone(),
            default_tags: config.default_tags.clone(),
            timeouts: Timeouts {
                poll_interval: config.poll_interval(),
                ..Timeouts::default()
            },
        })
    }

    pub fn with_default_tags(mut self, tags: Tags) -> Self {
        self.default_tags = tags;
        self
    }
}
