//! Typed clients for the remote control-plane APIs.
//!
//! One trait per service, each carrying the shared [`TagClient`] operations.
//! Request and response shapes mirror the remote wire format; conversion to
//! and from configuration values lives with each resource type.

pub mod apigatewayv2;
pub mod ecr;
pub mod ecs;
pub mod fsx;
pub mod lightsail;
pub mod ram;

pub use cumulus_engine::tagging::TagClient;

pub use apigatewayv2::ApiGatewayClient;
pub use ecr::RegistryClient;
pub use ecs::TaskSetClient;
pub use fsx::VolumeClient;
pub use lightsail::ContainerServiceClient;
pub use ram::ResourceShareClient;

/// Every service client the provider needs.
pub trait Cloud:
    ApiGatewayClient
    + RegistryClient
    + TaskSetClient
    + ContainerServiceClient
    + VolumeClient
    + ResourceShareClient
{
}

impl<T> Cloud for T where
    T: ApiGatewayClient
        + RegistryClient
        + TaskSetClient
        + ContainerServiceClient
        + VolumeClient
        + ResourceShareClient
{
}
