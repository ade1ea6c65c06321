//! Resource sharing API.

use async_trait::async_trait;
use cumulus_engine::waiter::Stateful;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const UNKNOWN_RESOURCE: &str = "UnknownResourceException";

pub const STATUS_PENDING: &str = "PENDING";
pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_FAILED: &str = "FAILED";
pub const STATUS_DELETING: &str = "DELETING";
pub const STATUS_DELETED: &str = "DELETED";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceShare {
    pub arn: String,
    pub name: String,
    pub allow_external_principals: bool,
    pub status: String,
    pub status_message: Option<String>,
    pub tags: TagSet,
}

impl Stateful for ResourceShare {
    fn status(&self) -> &str {
        &self.status
    }

    fn status_reason(&self) -> Option<&str> {
        self.status_message.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateResourceShareRequest {
    pub name: String,
    pub allow_external_principals: bool,
    pub permission_arns: Vec<String>,
    pub tags: Option<TagSet>,
}

#[async_trait]
pub trait ResourceShareClient: TagClient {
    async fn create_resource_share(
        &self,
        request: &CreateResourceShareRequest,
    ) -> Result<ResourceShare, ApiError>;

    /// Shares owned by the caller with the given ARNs.
    async fn get_resource_shares(&self, arns: &[String]) -> Result<Vec<ResourceShare>, ApiError>;

    async fn update_resource_share(
        &self,
        arn: &str,
        name: &str,
        allow_external_principals: bool,
    ) -> Result<(), ApiError>;

    async fn list_resource_share_permissions(&self, arn: &str) -> Result<Vec<String>, ApiError>;

    async fn delete_resource_share(&self, arn: &str) -> Result<(), ApiError>;
}
