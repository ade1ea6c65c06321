//! Container service API.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cumulus_engine::waiter::Stateful;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const NOT_FOUND: &str = "NotFoundException";

pub const STATE_PENDING: &str = "PENDING";
pub const STATE_READY: &str = "READY";
pub const STATE_RUNNING: &str = "RUNNING";
pub const STATE_UPDATING: &str = "UPDATING";
pub const STATE_DELETING: &str = "DELETING";
pub const STATE_DISABLED: &str = "DISABLED";
pub const STATE_DEPLOYING: &str = "DEPLOYING";

pub const POWERS: &[&str] = &["nano", "micro", "small", "medium", "large", "xlarge"];

/// Certificate name to the domain names it covers.
pub type PublicDomainNames = BTreeMap<String, Vec<String>>;

#[derive(Debug, Clone, PartialEq)]
pub struct ContainerService {
    pub name: String,
    pub arn: String,
    pub power: String,
    pub power_id: String,
    pub scale: i64,
    pub is_disabled: bool,
    pub state: String,
    pub created_at: DateTime<Utc>,
    pub availability_zone: String,
    pub principal_arn: String,
    pub private_domain_name: String,
    pub url: Option<String>,
    pub public_domain_names: PublicDomainNames,
    pub tags: TagSet,
}

impl Stateful for ContainerService {
    fn status(&self) -> &str {
        &self.state
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateContainerServiceRequest {
    pub name: String,
    pub power: String,
    pub scale: i64,
    pub public_domain_names: PublicDomainNames,
    pub tags: Option<TagSet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateContainerServiceRequest {
    pub name: String,
    pub is_disabled: Option<bool>,
    pub power: Option<String>,
    pub scale: Option<i64>,
    pub public_domain_names: Option<PublicDomainNames>,
}

#[async_trait]
pub trait ContainerServiceClient: TagClient {
    async fn create_container_service(
        &self,
        request: &CreateContainerServiceRequest,
    ) -> Result<ContainerService, ApiError>;

    async fn get_container_services(&self, name: &str) -> Result<Vec<ContainerService>, ApiError>;

    async fn update_container_service(
        &self,
        request: &UpdateContainerServiceRequest,
    ) -> Result<(), ApiError>;

    async fn delete_container_service(&self, name: &str) -> Result<(), ApiError>;
}
