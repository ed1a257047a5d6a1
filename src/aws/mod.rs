//! AWS API interaction module
//!
//! This module provides the plumbing every service package builds on: credentials,
//! SigV4 signing, a retrying REST-JSON HTTP client and typed API errors.
//!
//! # Module Structure
//!
//! - [`auth`] - Static credentials from the environment or shared credentials file
//! - [`client`] - Region/endpoint resolution and per-service HTTP clients
//! - [`error`] - Typed API errors with not-found and throttling classification
//! - [`http`] - Signed HTTP requests with throttling retries
//! - [`sigv4`] - AWS Signature Version 4
//!
//! # Example
//!
//! ```ignore
//! use awsprov::aws::{client::AwsClient, http::ApiRequest};
//!
//! async fn example(config: &awsprov::config::ProviderConfig) -> anyhow::Result<()> {
//!     let client = AwsClient::new(config)?;
//!     let http = client.service_http("appconfig", "appconfig")?;
//!     let extensions = http.send(&ApiRequest::get("/extensions")).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod sigv4;

pub use error::ApiError;
