//! Managed file system API (ONTAP volumes).

use async_trait::async_trait;
use cumulus_engine::waiter::Stateful;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const VOLUME_NOT_FOUND: &str = "VolumeNotFound";

pub const LIFECYCLE_CREATING: &str = "CREATING";
pub const LIFECYCLE_CREATED: &str = "CREATED";
pub const LIFECYCLE_MISCONFIGURED: &str = "MISCONFIGURED";
pub const LIFECYCLE_PENDING: &str = "PENDING";
pub const LIFECYCLE_AVAILABLE: &str = "AVAILABLE";
pub const LIFECYCLE_DELETING: &str = "DELETING";
pub const LIFECYCLE_FAILED: &str = "FAILED";

pub const VOLUME_TYPE_ONTAP: &str = "ONTAP";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TieringPolicy {
    pub name: Option<String>,
    pub cooling_period: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OntapConfiguration {
    pub junction_path: String,
    pub security_style: Option<String>,
    pub size_in_megabytes: i64,
    pub storage_efficiency_enabled: bool,
    pub storage_virtual_machine_id: String,
    pub tiering_policy: Option<TieringPolicy>,
    pub uuid: String,
    pub ontap_volume_type: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Volume {
    pub id: String,
    pub arn: String,
    pub name: String,
    pub file_system_id: String,
    pub volume_type: String,
    pub lifecycle: String,
    pub lifecycle_reason: Option<String>,
    pub ontap: Option<OntapConfiguration>,
}

impl Stateful for Volume {
    fn status(&self) -> &str {
        &self.lifecycle
    }

    fn status_reason(&self) -> Option<&str> {
        self.lifecycle_reason.as_deref()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateOntapConfiguration {
    pub junction_path: String,
    pub security_style: Option<String>,
    pub size_in_megabytes: i64,
    pub storage_efficiency_enabled: bool,
    pub storage_virtual_machine_id: String,
    pub tiering_policy: Option<TieringPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateVolumeRequest {
    pub name: String,
    pub volume_type: String,
    pub ontap: CreateOntapConfiguration,
    pub tags: Option<TagSet>,
}

/// Only the fields that changed are set.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOntapConfiguration {
    pub junction_path: Option<String>,
    pub security_style: Option<String>,
    pub size_in_megabytes: Option<i64>,
    pub storage_efficiency_enabled: Option<bool>,
    pub tiering_policy: Option<TieringPolicy>,
}

impl UpdateOntapConfiguration {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateVolumeRequest {
    pub client_request_token: String,
    pub volume_id: String,
    pub ontap: UpdateOntapConfiguration,
}

#[async_trait]
pub trait VolumeClient: TagClient {
    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume, ApiError>;

    async fn describe_volumes(&self, ids: &[String]) -> Result<Vec<Volume>, ApiError>;

    async fn update_volume(&self, request: &UpdateVolumeRequest) -> Result<(), ApiError>;

    async fn delete_volume(&self, id: &str) -> Result<(), ApiError>;
}
