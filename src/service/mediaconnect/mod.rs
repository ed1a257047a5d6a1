//! MediaConnect service package

pub mod api;
pub mod flow;
pub mod sweep;

pub use api::{MediaConnectApi, MediaConnectClient};
pub use flow::FlowResource;

use crate::resource::{DynResource, Erased, ResourceRegistration, ResourceTags, ServicePackage};

fn new_flow_resource() -> Box<dyn DynResource> {
    Box::new(Erased(FlowResource))
}

pub static SERVICE_PACKAGE: ServicePackage = ServicePackage {
    name: "mediaconnect",
    endpoint_prefix: "mediaconnect",
    resources: &[ResourceRegistration {
        type_name: flow::TYPE_NAME,
        name: "Flow",
        factory: new_flow_resource,
        tags: Some(ResourceTags {
            identifier_attribute: "arn",
        }),
    }],
};
