use async_trait::async_trait;
use cumulus_engine::ApiError;

use super::{DEFAULT_ACCOUNT, DEFAULT_REGION, Entry, Lifecycle, MemoryCloud, observe, peek};
use crate::api::ecr::{
    CreateRepositoryRequest, ENCRYPTION_AES256, EncryptionConfiguration, REPOSITORY_NOT_EMPTY,
    REPOSITORY_NOT_FOUND, RegistryClient, Repository,
};

impl Lifecycle for Repository {
    fn set_status(&mut self, _status: &'static str) {}
}

fn not_found(name: &str) -> ApiError {
    ApiError::new(
        REPOSITORY_NOT_FOUND,
        format!(
            "The repository with name '{}' does not exist in the registry with id '{}'",
            name, DEFAULT_ACCOUNT
        ),
    )
}

impl MemoryCloud {
    /// Push `count` images into a repository so a plain delete is refused.
    pub async fn seed_images(&self, repository: &str, count: usize) {
        self.state
            .lock()
            .await
            .images
            .insert(repository.to_string(), count);
    }
}

#[async_trait]
impl RegistryClient for MemoryCloud {
    async fn create_repository(
        &self,
        request: &CreateRepositoryRequest,
    ) -> Result<Repository, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_repository")?;
        state.check_tags_on_create(request.tags.as_ref())?;
        if state.repositories.contains_key(&request.name) {
            return Err(ApiError::new(
                "RepositoryAlreadyExistsException",
                format!("The repository with name '{}' already exists", request.name),
            ));
        }

        let repository = Repository {
            name: request.name.clone(),
            arn: Self::arn("ecr", &format!("repository/{}", request.name)),
            registry_id: DEFAULT_ACCOUNT.to_string(),
            uri: format!(
                "{}.dkr.ecr.{}.amazonaws.com/{}",
                DEFAULT_ACCOUNT, DEFAULT_REGION, request.name
            ),
            image_tag_mutability: request.image_tag_mutability.clone(),
            scan_on_push: Some(request.scan_on_push.unwrap_or(false)),
            encryption: Some(request.encryption.clone().unwrap_or(EncryptionConfiguration {
                encryption_type: ENCRYPTION_AES256.to_string(),
                kms_key: None,
            })),
        };
        state.store_tags(&repository.arn, request.tags.as_ref());
        let hidden = state.describe_lag;
        state
            .repositories
            .insert(request.name.clone(), Entry::new(repository.clone(), hidden));
        Ok(repository)
    }

    async fn describe_repositories(&self, names: &[String]) -> Result<Vec<Repository>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("describe_repositories")?;
        let mut found = Vec::new();
        for name in names {
            match observe(&mut state.repositories, name) {
                Some(repository) => found.push(repository),
                None => return Err(not_found(name)),
            }
        }
        Ok(found)
    }

    async fn put_image_tag_mutability(&self, name: &str, mutability: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("put_image_tag_mutability")?;
        let repository = peek(&mut state.repositories, name).ok_or_else(|| not_found(name))?;
        repository.image_tag_mutability = mutability.to_string();
        Ok(())
    }

    async fn put_image_scanning_configuration(
        &self,
        name: &str,
        scan_on_push: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("put_image_scanning_configuration")?;
        let repository = peek(&mut state.repositories, name).ok_or_else(|| not_found(name))?;
        repository.scan_on_push = Some(scan_on_push);
        Ok(())
    }

    async fn delete_repository(&self, name: &str, force: bool) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_repository")?;
        let Some(entry) = state.repositories.get(name) else {
            return Err(not_found(name));
        };
        let arn = entry.record.arn.clone();
        let images = state.images.get(name).copied().unwrap_or(0);
        if images > 0 && !force {
            return Err(ApiError::new(
                REPOSITORY_NOT_EMPTY,
                format!(
                    "The repository with name '{}' in registry with id '{}' cannot be deleted because it still contains images",
                    name, DEFAULT_ACCOUNT
                ),
            ));
        }
        state.repositories.remove(name);
        state.images.remove(name);
        state.tags.remove(&arn);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str) -> CreateRepositoryRequest {
        CreateRepositoryRequest {
            name: name.to_string(),
            image_tag_mutability: "MUTABLE".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_describe_lag() {
        let cloud = MemoryCloud::new();
        cloud.lag_describes(1).await;
        cloud.create_repository(&request("app")).await.unwrap();

        let names = vec!["app".to_string()];
        let err = cloud.describe_repositories(&names).await.unwrap_err();
        assert_eq!(err.code, REPOSITORY_NOT_FOUND);
        let found = cloud.describe_repositories(&names).await.unwrap();
        assert_eq!(found[0].uri, "123456789012.dkr.ecr.us-east-1.amazonaws.com/app");
    }

    #[tokio::test]
    async fn test_delete_not_empty() {
        let cloud = MemoryCloud::new();
        cloud.create_repository(&request("app")).await.unwrap();
        cloud.seed_images("app", 2).await;

        let err = cloud.delete_repository("app", false).await.unwrap_err();
        assert_eq!(err.code, REPOSITORY_NOT_EMPTY);
        cloud.delete_repository("app", true).await.unwrap();

        let err = cloud.delete_repository("app", false).await.unwrap_err();
        assert_eq!(err.code, REPOSITORY_NOT_FOUND);
    }
}
