//! Mainframe Modernization (M2) service package

pub mod api;
pub mod application;
pub mod deployment;
pub mod environment;
pub mod sweep;

pub use api::{M2Api, M2Client};
pub use application::ApplicationResource;
pub use deployment::DeploymentResource;
pub use environment::EnvironmentResource;

use crate::resource::{DynResource, Erased, ResourceRegistration, ResourceTags, ServicePackage};

fn new_application_resource() -> Box<dyn DynResource> {
    Box::new(Erased(ApplicationResource))
}

fn new_deployment_resource() -> Box<dyn DynResource> {
    Box::new(Erased(DeploymentResource))
}

fn new_environment_resource() -> Box<dyn DynResource> {
    Box::new(Erased(EnvironmentResource))
}

pub static SERVICE_PACKAGE: ServicePackage = ServicePackage {
    name: "m2",
    endpoint_prefix: "m2",
    resources: &[
        ResourceRegistration {
            type_name: application::TYPE_NAME,
            name: "Application",
            factory: new_application_resource,
            tags: Some(ResourceTags {
                identifier_attribute: "arn",
            }),
        },
        ResourceRegistration {
            type_name: deployment::TYPE_NAME,
            name: "Deployment",
            factory: new_deployment_resource,
            tags: None,
        },
        ResourceRegistration {
            type_name: environment::TYPE_NAME,
            name: "Environment",
            factory: new_environment_resource,
            tags: Some(ResourceTags {
                identifier_attribute: "arn",
            }),
        },
    ],
};
