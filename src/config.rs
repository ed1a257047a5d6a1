//! Configuration Management
//!
//! Provider configuration: region, endpoint overrides, default tags and retry
//! policy. Loaded from disk, then overridden by environment and CLI flags.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_MAX_ATTEMPTS: u32 = 25;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub region: String,
    /// Credentials profile name
    pub profile: Option<String>,
    /// Endpoint used for every service without a specific override
    pub endpoint_url: Option<String>,
    /// Per-service endpoint overrides keyed by endpoint prefix (`m2`, `appconfig`)
    pub endpoints: BTreeMap<String, String>,
    /// Tags applied to every taggable resource
    pub default_tags: BTreeMap<String, String>,
    /// Attempts per API call, including the first one
    pub max_attempts: u32,
    /// Interval between status polls while waiting on async operations
    pub poll_interval_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            profile: None,
            endpoint_url: None,
            endpoints: BTreeMap::new(),
            default_tags: BTreeMap::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl ProviderConfig {
    /// Get the config file path
    fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("awsprov").join("config.json"))
    }

    /// Load configuration from disk, then apply environment overrides
    pub fn load() -> Self {
        let mut config = Self::load_file();
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    fn load_file() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!("Ignoring invalid config file {:?}: {}", path, e);
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Apply environment overrides; `lookup` is injectable for tests
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(region) = lookup("AWS_REGION").or_else(|| lookup("AWS_DEFAULT_REGION")) {
            if !region.is_empty() {
                self.region = region;
            }
        }
        if let Some(profile) = lookup("AWS_PROFILE") {
            self.profile = Some(profile);
        }
        if let Some(url) = lookup("AWS_ENDPOINT_URL") {
            self.endpoint_url = Some(url);
        }
        for service in ["APPCONFIG", "M2", "MEDIACONNECT"] {
            if let Some(url) = lookup(&format!("AWS_ENDPOINT_URL_{service}")) {
                self.endpoints.insert(service.to_lowercase(), url);
            }
        }
        if let Some(attempts) = lookup("AWS_MAX_ATTEMPTS").and_then(|v| v.parse().ok()) {
            self.max_attempts = attempts;
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}
