//! Service packages
//!
//! One module per AWS service: its REST API trait and client, its resources,
//! and its sweepers.

pub mod appconfig;
pub mod m2;
pub mod mediaconnect;

use crate::resource::ServicePackage;
use crate::sweep::Sweeper;

pub static SERVICE_PACKAGES: &[&ServicePackage] = &[
    &appconfig::SERVICE_PACKAGE,
    &m2::SERVICE_PACKAGE,
    &mediaconnect::SERVICE_PACKAGE,
];

/// Every sweeper across all service packages
pub fn sweepers() -> Vec<&'static Sweeper> {
    appconfig::sweep::SWEEPERS
        .iter()
        .chain(m2::sweep::SWEEPERS)
        .chain(mediaconnect::sweep::SWEEPERS)
        .collect()
}
