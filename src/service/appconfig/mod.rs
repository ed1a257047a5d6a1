//! AppConfig service package

pub mod api;
pub mod extension;
pub mod sweep;

pub use api::{AppConfigApi, AppConfigClient};
pub use extension::ExtensionResource;

use crate::resource::{DynResource, Erased, ResourceRegistration, ResourceTags, ServicePackage};

fn new_extension_resource() -> Box<dyn DynResource> {
    Box::new(Erased(ExtensionResource))
}

pub static SERVICE_PACKAGE: ServicePackage = ServicePackage {
    name: "appconfig",
    endpoint_prefix: "appconfig",
    resources: &[ResourceRegistration {
        type_name: extension::TYPE_NAME,
        name: "Extension",
        factory: new_extension_resource,
        tags: Some(ResourceTags {
            identifier_attribute: "arn",
        }),
    }],
};
