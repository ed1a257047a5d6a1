//! Typed AWS resource providers
//!
//! Schemas, CRUD translation onto the AWS REST APIs, a static service package
//! registry, sweepers and an acceptance test harness for AppConfig extensions,
//! M2 applications/environments/deployments and MediaConnect flows.

pub mod acctest;
pub mod aws;
pub mod config;
pub mod manifest;
pub mod provider;
pub mod resource;
pub mod schema;
pub mod service;
pub mod state;
pub mod sweep;
pub mod tags;

/// Version injected at compile time via AWSPROV_VERSION env var (set by CI/CD),
/// or "dev" for local builds.
pub const VERSION: &str = match option_env!("AWSPROV_VERSION") {
    Some(v) => v,
    None => "dev",
};
