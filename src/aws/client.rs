//! AWS Client
//!
//! Main client for interacting with AWS APIs, combining credentials, region
//! and endpoint resolution with the signing HTTP client.

use super::auth::Credentials;
use super::http::AwsHttpClient;
use crate::config::ProviderConfig;
use anyhow::{Context, Result};

/// Main AWS client, shared by all service packages
#[derive(Debug, Clone)]
pub struct AwsClient {
    pub credentials: Credentials,
    pub region: String,
    config: ProviderConfig,
}

impl AwsClient {
    /// Create a new AWS client from provider configuration
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let credentials = Credentials::resolve(config.profile.as_deref())
            .context("Failed to resolve AWS credentials")?;

        Ok(Self::with_credentials(config, credentials))
    }

    pub fn with_credentials(config: &ProviderConfig, credentials: Credentials) -> Self {
        Self {
            credentials,
            region: config.region.clone(),
            config: config.clone(),
        }
    }

    /// Build an HTTP client for one service.
    ///
    /// `endpoint_prefix` is the hostname label (`appconfig`, `m2`, `mediaconnect`),
    /// `signing_name` the SigV4 service name.
    pub fn service_http(&self, endpoint_prefix: &str, signing_name: &str) -> Result<AwsHttpClient> {
        let endpoint = self.endpoint_url(endpoint_prefix);
        tracing::debug!("Service {} endpoint: {}", endpoint_prefix, endpoint);
        AwsHttpClient::new(
            &endpoint,
            self.credentials.clone(),
            &self.region,
            signing_name,
            self.config.max_attempts,
        )
    }

    /// Resolve the endpoint for a service: per-service override, global override,
    /// then the regional default
    pub fn endpoint_url(&self, endpoint_prefix: &str) -> String {
        if let Some(url) = self.config.endpoints.get(endpoint_prefix) {
            return url.clone();
        }
        if let Some(url) = &self.config.endpoint_url {
            return url.clone();
        }
        regional_endpoint(endpoint_prefix, &self.region)
    }
}

/// Default regional endpoint for a service
pub fn regional_endpoint(endpoint_prefix: &str, region: &str) -> String {
    let suffix = if region.starts_with("cn-") {
        "amazonaws.com.cn"
    } else {
        "amazonaws.com"
    };
    format!("https://{endpoint_prefix}.{region}.{suffix}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(config: ProviderConfig) -> AwsClient {
        AwsClient::with_credentials(&config, Credentials::new("AKID", "secret"))
    }

    #[test]
    fn test_regional_endpoint() {
        let c = client(ProviderConfig {
            region: "eu-west-1".to_string(),
            ..Default::default()
        });
        assert_eq!(c.endpoint_url("m2"), "https://m2.eu-west-1.amazonaws.com");
        assert_eq!(
            regional_endpoint("appconfig", "cn-north-1"),
            "https://appconfig.cn-north-1.amazonaws.com.cn"
        );
    }

    #[test]
    fn test_endpoint_overrides() {
        let mut config = ProviderConfig {
            endpoint_url: Some("http://localhost:4566".to_string()),
            ..Default::default()
        };
        config
            .endpoints
            .insert("m2".to_string(), "http://localhost:9000".to_string());
        let c = client(config);
        assert_eq!(c.endpoint_url("m2"), "http://localhost:9000");
        assert_eq!(c.endpoint_url("appconfig"), "http://localhost:4566");
    }
}
