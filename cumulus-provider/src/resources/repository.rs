//! `aws_ecr_repository`: a container image repository.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::finder::find_one;
use cumulus_engine::schema::{DefaultTimeouts, FieldSpec, FieldType, ResourceDescriptor, Validation};
use cumulus_engine::waiter::{retry_transient, retry_when_new_resource_not_found};
use cumulus_engine::{
    DesiredState, Fields, Invocation, ObservedState, ProviderConfig, ReadResult, ReconcileError,
    Resource, Result, Value, Waiter,
};
use tracing::{debug, info};

use super::{
    create_with_tags, list_tags, set_listed_tags, still_present, tag_after_create,
    update_resource_tags,
};
use crate::api::RegistryClient;
use crate::api::ecr::{
    CreateRepositoryRequest, ENCRYPTION_AES256, ENCRYPTION_KMS, EncryptionConfiguration,
    MUTABILITY_IMMUTABLE, MUTABILITY_MUTABLE, REPOSITORY_NOT_EMPTY, REPOSITORY_NOT_FOUND,
    Repository,
};

pub const TYPE_NAME: &str = "aws_ecr_repository";

const DELETE_TIMEOUT: Duration = Duration::from_secs(20 * 60);

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(TYPE_NAME)
        .field(
            FieldSpec::required("name", FieldType::String)
                .force_new()
                .validate(Validation::StringLen { min: 2, max: 256 }),
        )
        .field(
            FieldSpec::optional_computed(
                "encryption_configuration",
                FieldType::Block(vec![
                    FieldSpec::optional("encryption_type", FieldType::String)
                        .validate(Validation::OneOf(&[ENCRYPTION_AES256, ENCRYPTION_KMS])),
                    FieldSpec::optional_computed("kms_key", FieldType::String),
                ]),
            )
            .force_new(),
        )
        .field(FieldSpec::optional("force_delete", FieldType::Bool))
        .field(FieldSpec::optional_computed(
            "image_scanning_configuration",
            FieldType::Block(vec![FieldSpec::required("scan_on_push", FieldType::Bool)]),
        ))
        .field(
            FieldSpec::optional("image_tag_mutability", FieldType::String)
                .default_value(MUTABILITY_MUTABLE)
                .validate(Validation::OneOf(&[MUTABILITY_MUTABLE, MUTABILITY_IMMUTABLE])),
        )
        .field(FieldSpec::computed("arn", FieldType::String))
        .field(FieldSpec::computed("registry_id", FieldType::String))
        .field(FieldSpec::computed("repository_url", FieldType::String))
        .timeouts(DefaultTimeouts {
            delete: Some(DELETE_TIMEOUT),
            ..Default::default()
        })
        .taggable()
}

fn expand_encryption(fields: &Fields) -> Result<Option<EncryptionConfiguration>> {
    let Some(block) = fields.block("encryption_configuration")? else {
        return Ok(None);
    };
    Ok(Some(EncryptionConfiguration {
        encryption_type: block
            .non_empty_string("encryption_type")?
            .unwrap_or(ENCRYPTION_AES256)
            .to_string(),
        kms_key: block.non_empty_string("kms_key")?.map(str::to_string),
    }))
}

fn expand_scan_on_push(fields: &Fields) -> Result<Option<bool>> {
    match fields.block("image_scanning_configuration")? {
        Some(block) => Ok(block.bool("scan_on_push")?),
        None => Ok(None),
    }
}

fn flatten(repository: &Repository, desired: Option<&DesiredState>) -> Result<Fields> {
    let mut fields = Fields::new()
        .with("name", repository.name.as_str())
        .with("arn", repository.arn.as_str())
        .with("registry_id", repository.registry_id.as_str())
        .with("repository_url", repository.uri.as_str())
        .with("image_tag_mutability", repository.image_tag_mutability.as_str());
    if let Some(encryption) = &repository.encryption {
        fields.set(
            "encryption_configuration",
            Value::block(
                Fields::new()
                    .with("encryption_type", encryption.encryption_type.as_str())
                    .with("kms_key", encryption.kms_key.clone()),
            ),
        );
    }
    if let Some(scan_on_push) = repository.scan_on_push {
        fields.set(
            "image_scanning_configuration",
            Value::block(Fields::new().with("scan_on_push", scan_on_push)),
        );
    }
    let force_delete = match desired {
        Some(d) => d.fields.bool_or("force_delete", false)?,
        None => false,
    };
    fields.set("force_delete", force_delete);
    Ok(fields)
}

pub struct RepositoryResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: RegistryClient> RepositoryResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    async fn find(&self, config: &ProviderConfig, name: &str) -> Result<Repository> {
        let names = [name.to_string()];
        find_one(
            config,
            &format!("ECR Repository ({})", name),
            &[REPOSITORY_NOT_FOUND],
            self.cloud.describe_repositories(&names),
            |r: &Repository| r.name == name,
        )
        .await
    }
}

#[async_trait]
impl<C: RegistryClient + 'static> Resource for RepositoryResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let request = CreateRepositoryRequest {
            name: fields.required_string("name")?.to_string(),
            image_tag_mutability: fields
                .string("image_tag_mutability")?
                .unwrap_or(MUTABILITY_MUTABLE)
                .to_string(),
            scan_on_push: expand_scan_on_push(fields)?,
            encryption: expand_encryption(fields)?,
            tags: None,
        };

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (repository, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateRepositoryRequest {
                tags,
                ..request.clone()
            };
            async move { config.classify(client.create_repository(&request).await, &[]) }
        })
        .await?;

        info!(name = %repository.name, "Created ECR Repository");
        inv.assign_id(repository.name.as_str());
        tag_after_create(inv, client, &repository.arn, desired, deferred).await?;
        Ok(repository.name)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let (this, config) = (self, inv.config);
        let repository = retry_when_new_resource_not_found(
            inv.propagation_timeout(),
            inv.poll_interval(),
            inv.new_resource,
            move || this.find(config, id),
        )
        .await?;

        let mut state = ObservedState::new(id, flatten(&repository, desired)?);
        let listed = list_tags(inv, self.cloud.as_ref(), &repository.arn).await?;
        set_listed_tags(inv, &mut state, listed, desired);
        Ok(ReadResult::Found(state))
    }

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        _old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()> {
        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (timeout, interval) = (inv.timeouts.update, inv.poll_interval());

        if inv.has_change("image_tag_mutability") {
            let mutability = new
                .fields
                .string("image_tag_mutability")?
                .unwrap_or(MUTABILITY_MUTABLE);
            debug!(id, mutability, "Setting image tag mutability");
            retry_transient(timeout, interval, || async {
                config.classify(client.put_image_tag_mutability(id, mutability).await, &[])
            })
            .await?;
        }

        if inv.has_change("image_scanning_configuration") {
            let scan_on_push = expand_scan_on_push(&new.fields)?.unwrap_or(false);
            debug!(id, scan_on_push, "Setting image scanning configuration");
            retry_transient(timeout, interval, || async {
                config.classify(
                    client.put_image_scanning_configuration(id, scan_on_push).await,
                    &[],
                )
            })
            .await?;
        }

        if !inv.tag_delta.is_empty() {
            let repository = retry_transient(timeout, interval, || self.find(config, id)).await?;
            update_resource_tags(inv, self.cloud.as_ref(), &repository.arn, new).await?;
        }
        Ok(())
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, state: &DesiredState) -> Result<()> {
        let force = state.fields.bool_or("force_delete", false)?;
        info!(id, force, "Deleting ECR Repository");

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(client.delete_repository(id, force).await, &[REPOSITORY_NOT_FOUND])
        })
        .await;
        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) if e.code_equals(&[REPOSITORY_NOT_EMPTY]) => {
                return Err(ReconcileError::terminal(format!(
                    "ECR Repository ({}) not empty, consider using force_delete: {}",
                    id, e
                )));
            }
            Err(e) => return Err(e),
        }

        let this = self;
        Waiter::new("ECR Repository delete", inv.timeouts.delete)
            .interval(inv.poll_interval())
            .wait_until_gone(move || async move { still_present(this.find(config, id).await) })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryCloud;
    use cumulus_engine::{ProviderConfig, Timeouts};

    #[test]
    fn test_descriptor_validation() {
        let descriptor = descriptor();
        let fields = Fields::new()
            .with("name", "app")
            .with("image_tag_mutability", "SOMETIMES");
        let err = descriptor.validate(&fields).unwrap_err();
        assert!(err.to_string().contains("image_tag_mutability"));

        let fields = Fields::new().with("name", "app").with("arn", "arn:x");
        assert!(descriptor.validate(&fields).is_err());
    }

    #[test]
    fn test_expand_encryption_defaults_type() {
        let fields = Fields::new().with(
            "encryption_configuration",
            Value::block(Fields::new().with("kms_key", "")),
        );
        let encryption = expand_encryption(&fields).unwrap().unwrap();
        assert_eq!(encryption.encryption_type, ENCRYPTION_AES256);
        assert_eq!(encryption.kms_key, None);
        assert_eq!(expand_encryption(&Fields::new()).unwrap(), None);
    }

    #[tokio::test]
    async fn test_update_only_touches_changed_groups() {
        let cloud = Arc::new(MemoryCloud::new());
        let resource = RepositoryResource::new(cloud.clone());
        let config = ProviderConfig::default();

        let desired = DesiredState::new(Fields::new().with("name", "app"));
        let mut inv = Invocation::new(&config, Timeouts::default());
        resource.create(&mut inv, &desired).await.unwrap();

        let mut inv = Invocation::new(&config, Timeouts::default());
        inv.changes.insert("image_scanning_configuration");
        let new = DesiredState::new(Fields::new().with("name", "app").with(
            "image_scanning_configuration",
            Value::block(Fields::new().with("scan_on_push", true)),
        ));
        resource.update(&mut inv, "app", &desired, &new).await.unwrap();

        assert_eq!(cloud.calls("put_image_scanning_configuration").await, 1);
        assert_eq!(cloud.calls("put_image_tag_mutability").await, 0);
        assert_eq!(cloud.calls("tag_resource").await, 0);
    }
}
