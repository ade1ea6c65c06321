//! `aws_ram_resource_share`, identified by its ARN.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::finder::find_one;
use cumulus_engine::schema::{DefaultTimeouts, FieldSpec, FieldType, ResourceDescriptor};
use cumulus_engine::waiter::retry_transient;
use cumulus_engine::{
    DesiredState, Fields, Invocation, ObservedState, ProviderConfig, ReadResult, Resource, Result,
    StatusWait, Value, Waiter,
};
use tracing::{info, warn};

use super::{create_with_tags, set_tags, tag_after_create, update_resource_tags};
use crate::api::ResourceShareClient;
use crate::api::ram::{
    CreateResourceShareRequest, ResourceShare, STATUS_ACTIVE, STATUS_DELETED, STATUS_DELETING,
    STATUS_PENDING, UNKNOWN_RESOURCE,
};

pub const TYPE_NAME: &str = "aws_ram_resource_share";

const TIMEOUT: Duration = Duration::from_secs(5 * 60);
const NOT_FOUND_CHECKS: u32 = 20;

const ACTIVE: StatusWait = StatusWait::new(&[STATUS_PENDING], &[STATUS_ACTIVE]);
const DELETED: StatusWait = StatusWait::new(&[STATUS_DELETING], &[STATUS_DELETED]);

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(TYPE_NAME)
        .field(FieldSpec::required("name", FieldType::String))
        .field(
            FieldSpec::optional("allow_external_principals", FieldType::Bool).default_value(false),
        )
        .field(
            FieldSpec::optional_computed(
                "permission_arns",
                FieldType::List(Box::new(FieldType::String)),
            )
            .force_new(),
        )
        .field(FieldSpec::computed("arn", FieldType::String))
        .timeouts(DefaultTimeouts {
            create: Some(TIMEOUT),
            delete: Some(TIMEOUT),
            ..Default::default()
        })
        .taggable()
}

fn flatten(share: &ResourceShare, permissions: &[String]) -> Fields {
    Fields::new()
        .with("arn", share.arn.as_str())
        .with("name", share.name.as_str())
        .with("allow_external_principals", share.allow_external_principals)
        .with(
            "permission_arns",
            Value::string_list(permissions.iter().map(String::as_str)),
        )
}

pub struct ResourceShareResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: ResourceShareClient> ResourceShareResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    async fn find(&self, config: &ProviderConfig, arn: &str) -> Result<ResourceShare> {
        let arns = [arn.to_string()];
        find_one(
            config,
            &format!("RAM Resource Share ({})", arn),
            &[UNKNOWN_RESOURCE],
            self.cloud.get_resource_shares(&arns),
            |s: &ResourceShare| s.arn == arn,
        )
        .await
    }
}

#[async_trait]
impl<C: ResourceShareClient + 'static> Resource for ResourceShareResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let request = CreateResourceShareRequest {
            name: fields.required_string("name")?.to_string(),
            allow_external_principals: fields.bool_or("allow_external_principals", false)?,
            permission_arns: fields.string_list("permission_arns")?,
            tags: None,
        };

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (share, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateResourceShareRequest {
                tags,
                ..request.clone()
            };
            async move { config.classify(client.create_resource_share(&request).await, &[]) }
        })
        .await?;

        let arn = share.arn;
        info!(arn = %arn, "Created RAM Resource Share");
        inv.assign_id(arn.as_str());

        let this = self;
        let id = arn.as_str();
        Waiter::new("RAM Resource Share active", inv.timeouts.create)
            .interval(inv.poll_interval())
            .not_found_checks(NOT_FOUND_CHECKS)
            .wait_until(move || async move { ACTIVE.classify(this.find(config, id).await) })
            .await?;

        tag_after_create(inv, client, &arn, desired, deferred).await?;
        Ok(arn)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (timeout, interval) = (inv.propagation_timeout(), inv.poll_interval());
        let share = match retry_transient(timeout, interval, || self.find(config, id)).await {
            Ok(share) => share,
            Err(e) if e.is_not_found() && !inv.new_resource => {
                warn!(id, "RAM Resource Share not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) => return Err(e),
        };
        if !inv.new_resource && share.status != STATUS_ACTIVE {
            warn!(id, status = %share.status, "RAM Resource Share not active, removing from state");
            return Ok(ReadResult::Absent);
        }

        let permissions = retry_transient(timeout, interval, || async {
            config.classify(client.list_resource_share_permissions(id).await, &[])
        })
        .await?;
        let mut state = ObservedState::new(id, flatten(&share, &permissions));
        set_tags(inv, &mut state, &share.tags, desired);
        Ok(ReadResult::Found(state))
    }

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        _old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()> {
        if inv.has_change("name") || inv.has_change("allow_external_principals") {
            let name = new.fields.required_string("name")?;
            let allow_external = new.fields.bool_or("allow_external_principals", false)?;
            info!(id, name, allow_external, "Updating RAM Resource Share");
            let (client, config) = (self.cloud.as_ref(), inv.config);
            retry_transient(inv.timeouts.update, inv.poll_interval(), || async {
                config.classify(
                    client.update_resource_share(id, name, allow_external).await,
                    &[],
                )
            })
            .await?;
        }
        update_resource_tags(inv, self.cloud.as_ref(), id, new).await
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, _state: &DesiredState) -> Result<()> {
        info!(id, "Deleting RAM Resource Share");
        let (this, config) = (self, inv.config);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(
                this.cloud.delete_resource_share(id).await,
                &[UNKNOWN_RESOURCE],
            )
        })
        .await;
        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        Waiter::new("RAM Resource Share delete", inv.timeouts.delete)
            .interval(inv.poll_interval())
            .wait_until_gone(move || async move { DELETED.classify(this.find(config, id).await) })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cumulus_engine::{ProviderConfig, Timeouts};

    use super::*;
    use crate::memory::{DEFAULT_PERMISSION, MemoryCloud};

    #[tokio::test]
    async fn test_read_reports_default_permission() {
        let cloud = Arc::new(MemoryCloud::new());
        let resource = ResourceShareResource::new(cloud);
        let config = ProviderConfig::default();

        let desired = DesiredState::new(Fields::new().with("name", "shared"));
        let mut inv = Invocation::new(&config, Timeouts::default());
        let arn = resource.create(&mut inv, &desired).await.unwrap();

        let mut inv = Invocation::new(&config, Timeouts::default());
        let state = resource
            .read(&mut inv, &arn, Some(&desired))
            .await
            .unwrap()
            .found()
            .unwrap();
        assert_eq!(
            state.fields.string_list("permission_arns").unwrap(),
            vec![DEFAULT_PERMISSION.to_string()]
        );
        assert_eq!(state.fields.bool("allow_external_principals").unwrap(), Some(false));
    }
}
