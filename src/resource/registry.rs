//! Resource Registry - static service package tables
//!
//! Each service package lists its resource types with a constructor and the
//! attribute used to identify the resource for tagging. The registry indexes
//! all packages by type name on first access.

use super::DynResource;
use crate::service;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::OnceLock;

/// Tagging metadata for a resource type
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ResourceTags {
    /// State attribute holding the identifier passed to the tagging APIs
    pub identifier_attribute: &'static str,
}

/// One registered resource type
#[derive(Clone, Copy)]
pub struct ResourceRegistration {
    pub type_name: &'static str,
    pub name: &'static str,
    pub factory: fn() -> Box<dyn DynResource>,
    pub tags: Option<ResourceTags>,
}

impl std::fmt::Debug for ResourceRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceRegistration")
            .field("type_name", &self.type_name)
            .field("name", &self.name)
            .field("tags", &self.tags)
            .finish()
    }
}

/// All resources of one AWS service
#[derive(Debug)]
pub struct ServicePackage {
    pub name: &'static str,
    /// Hostname label of the service endpoint
    pub endpoint_prefix: &'static str,
    pub resources: &'static [ResourceRegistration],
}

/// Every service package compiled into the provider
pub fn service_packages() -> &'static [&'static ServicePackage] {
    service::SERVICE_PACKAGES
}

/// Global index by type name
static REGISTRY: OnceLock<HashMap<&'static str, &'static ResourceRegistration>> = OnceLock::new();

fn index() -> &'static HashMap<&'static str, &'static ResourceRegistration> {
    REGISTRY.get_or_init(|| {
        let mut map = HashMap::new();
        for package in service_packages() {
            for registration in package.resources {
                if map.insert(registration.type_name, registration).is_some() {
                    tracing::warn!("Duplicate resource type: {}", registration.type_name);
                }
            }
        }
        map
    })
}

/// Get a registration by type name
pub fn get_registration(type_name: &str) -> Option<&'static ResourceRegistration> {
    index().get(type_name).copied()
}

/// Construct a resource by type name
pub fn new_resource(type_name: &str) -> anyhow::Result<Box<dyn DynResource>> {
    get_registration(type_name)
        .map(|r| (r.factory)())
        .ok_or_else(|| anyhow::anyhow!("Unknown resource type: {}", type_name))
}

/// All resource type names, sorted
pub fn get_all_resource_types() -> Vec<&'static str> {
    let mut types: Vec<&'static str> = index().keys().copied().collect();
    types.sort_unstable();
    types
}
