//! Container registry API.

use async_trait::async_trait;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const REPOSITORY_NOT_FOUND: &str = "RepositoryNotFoundException";
pub const REPOSITORY_NOT_EMPTY: &str = "RepositoryNotEmptyException";

pub const ENCRYPTION_AES256: &str = "AES256";
pub const ENCRYPTION_KMS: &str = "KMS";
pub const MUTABILITY_MUTABLE: &str = "MUTABLE";
pub const MUTABILITY_IMMUTABLE: &str = "IMMUTABLE";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncryptionConfiguration {
    pub encryption_type: String,
    pub kms_key: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Repository {
    pub name: String,
    pub arn: String,
    pub registry_id: String,
    pub uri: String,
    pub image_tag_mutability: String,
    pub scan_on_push: Option<bool>,
    pub encryption: Option<EncryptionConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateRepositoryRequest {
    pub name: String,
    pub image_tag_mutability: String,
    pub scan_on_push: Option<bool>,
    pub encryption: Option<EncryptionConfiguration>,
    pub tags: Option<TagSet>,
}

#[async_trait]
pub trait RegistryClient: TagClient {
    async fn create_repository(
        &self,
        request: &CreateRepositoryRequest,
    ) -> Result<Repository, ApiError>;

    async fn describe_repositories(&self, names: &[String]) -> Result<Vec<Repository>, ApiError>;

    async fn put_image_tag_mutability(&self, name: &str, mutability: &str) -> Result<(), ApiError>;

    async fn put_image_scanning_configuration(
        &self,
        name: &str,
        scan_on_push: bool,
    ) -> Result<(), ApiError>;

    async fn delete_repository(&self, name: &str, force: bool) -> Result<(), ApiError>;
}
