//! `aws_lightsail_container_service`
//!
//! Every mutation moves the service through a transitional state, so create,
//! update and delete each end in a status wait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::finder::find_one;
use cumulus_engine::schema::{DefaultTimeouts, FieldSpec, FieldType, ResourceDescriptor, Validation};
use cumulus_engine::waiter::{NotFoundPolicy, retry_transient};
use cumulus_engine::{
    DesiredState, Fields, Invocation, ObservedState, ProviderConfig, ReadResult, Resource, Result,
    StatusWait, Value, Waiter,
};
use tracing::{info, warn};

use super::{create_with_tags, set_tags, tag_after_create, update_resource_tags};
use crate::api::ContainerServiceClient;
use crate::api::lightsail::{
    ContainerService, CreateContainerServiceRequest, NOT_FOUND, POWERS, PublicDomainNames,
    STATE_DELETING, STATE_DISABLED, STATE_PENDING, STATE_READY, STATE_RUNNING, STATE_UPDATING,
    UpdateContainerServiceRequest,
};

pub const TYPE_NAME: &str = "aws_lightsail_container_service";

const TIMEOUT: Duration = Duration::from_secs(30 * 60);
const RESOURCE_TYPE: &str = "ContainerService";
const WAIT_DELAY: Duration = Duration::from_secs(5);
const NOT_FOUND_CHECKS: u32 = 20;

const CREATED: StatusWait = StatusWait::new(&[STATE_PENDING], &[STATE_READY, STATE_RUNNING]);
const UPDATED: StatusWait = StatusWait::new(&[STATE_UPDATING], &[STATE_READY, STATE_RUNNING]);
const DISABLED: StatusWait = StatusWait::new(&[STATE_UPDATING], &[STATE_DISABLED]);
const DELETED: StatusWait = StatusWait::new(&[STATE_DELETING], &[]);

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(TYPE_NAME)
        .field(
            FieldSpec::required("name", FieldType::String)
                .force_new()
                .validate(Validation::StringLen { min: 1, max: 63 }),
        )
        .field(FieldSpec::required("power", FieldType::String).validate(Validation::OneOf(POWERS)))
        .field(
            FieldSpec::required("scale", FieldType::Int)
                .validate(Validation::IntRange { min: 1, max: 20 }),
        )
        .field(FieldSpec::optional("is_disabled", FieldType::Bool).default_value(false))
        .field(FieldSpec::optional(
            "public_domain_names",
            FieldType::Block(vec![FieldSpec::required(
                "certificate",
                FieldType::Block(vec![
                    FieldSpec::required("certificate_name", FieldType::String),
                    FieldSpec::required(
                        "domain_names",
                        FieldType::List(Box::new(FieldType::String)),
                    ),
                ]),
            )]),
        ))
        .field(FieldSpec::computed("arn", FieldType::String))
        .field(FieldSpec::computed("availability_zone", FieldType::String))
        .field(FieldSpec::computed("created_at", FieldType::String))
        .field(FieldSpec::computed("power_id", FieldType::String))
        .field(FieldSpec::computed("principal_arn", FieldType::String))
        .field(FieldSpec::computed("private_domain_name", FieldType::String))
        .field(FieldSpec::computed("resource_type", FieldType::String))
        .field(FieldSpec::computed("state", FieldType::String))
        .field(FieldSpec::computed("url", FieldType::String))
        .timeouts(DefaultTimeouts::all(TIMEOUT))
        .taggable()
}

fn expand_public_domain_names(fields: &Fields) -> Result<PublicDomainNames> {
    let mut names = PublicDomainNames::new();
    if let Some(block) = fields.block("public_domain_names")? {
        for certificate in block.blocks("certificate")? {
            names.insert(
                certificate.required_string("certificate_name")?.to_string(),
                certificate.string_list("domain_names")?,
            );
        }
    }
    Ok(names)
}

/// New domain names; certificates dropped from configuration are detached
/// by sending them with no domains.
fn public_domain_names_change(old: &Fields, new: &Fields) -> Result<PublicDomainNames> {
    let mut names = expand_public_domain_names(new)?;
    for certificate in expand_public_domain_names(old)?.into_keys() {
        names.entry(certificate).or_default();
    }
    Ok(names)
}

fn flatten(service: &ContainerService) -> Fields {
    let mut fields = Fields::new()
        .with("name", service.name.as_str())
        .with("arn", service.arn.as_str())
        .with("availability_zone", service.availability_zone.as_str())
        .with("created_at", service.created_at.to_rfc3339())
        .with("is_disabled", service.is_disabled)
        .with("power", service.power.as_str())
        .with("power_id", service.power_id.as_str())
        .with("principal_arn", service.principal_arn.as_str())
        .with("private_domain_name", service.private_domain_name.as_str())
        .with("resource_type", RESOURCE_TYPE)
        .with("scale", service.scale)
        .with("state", service.state.as_str())
        .with("url", service.url.clone());

    let certificates = service
        .public_domain_names
        .iter()
        .filter(|(_, domains)| !domains.is_empty())
        .map(|(name, domains)| {
            Value::Map(
                Fields::new()
                    .with("certificate_name", name.as_str())
                    .with("domain_names", Value::string_list(domains.iter().map(String::as_str)))
                    .into_inner(),
            )
        })
        .collect::<Vec<_>>();
    if !certificates.is_empty() {
        fields.set(
            "public_domain_names",
            Value::block(Fields::new().with("certificate", certificates)),
        );
    }
    fields
}

pub struct ContainerServiceResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: ContainerServiceClient> ContainerServiceResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    async fn find(&self, config: &ProviderConfig, name: &str) -> Result<ContainerService> {
        find_one(
            config,
            &format!("Lightsail Container Service ({})", name),
            &[NOT_FOUND],
            self.cloud.get_container_services(name),
            |s: &ContainerService| s.name == name,
        )
        .await
    }

    async fn wait(
        &self,
        config: &ProviderConfig,
        waiter: Waiter,
        name: &str,
        statuses: StatusWait,
    ) -> Result<ContainerService> {
        let this = self;
        waiter
            .wait_until(move || async move { statuses.classify(this.find(config, name).await) })
            .await
    }
}

fn waiter(inv: &Invocation<'_>, target: &str, timeout: Duration) -> Waiter {
    Waiter::new(format!("Lightsail Container Service {}", target), timeout)
        .interval(inv.poll_interval())
        .delay(WAIT_DELAY)
}

#[async_trait]
impl<C: ContainerServiceClient + 'static> Resource for ContainerServiceResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let request = CreateContainerServiceRequest {
            name: fields.required_string("name")?.to_string(),
            power: fields.required_string("power")?.to_string(),
            scale: fields.required_int("scale")?,
            public_domain_names: expand_public_domain_names(fields)?,
            tags: None,
        };

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (service, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateContainerServiceRequest {
                tags,
                ..request.clone()
            };
            async move { config.classify(client.create_container_service(&request).await, &[]) }
        })
        .await?;

        let name = service.name;
        info!(name = %name, "Created Lightsail Container Service");
        inv.assign_id(name.as_str());
        let created = waiter(inv, "create", inv.timeouts.create).not_found_checks(NOT_FOUND_CHECKS);
        self.wait(config, created, &name, CREATED).await?;

        if fields.bool_or("is_disabled", false)? {
            let update = UpdateContainerServiceRequest {
                name: name.clone(),
                is_disabled: Some(true),
                ..Default::default()
            };
            retry_transient(inv.timeouts.create, inv.poll_interval(), || async {
                config.classify(client.update_container_service(&update).await, &[])
            })
            .await?;
            let disabled =
                waiter(inv, "disable", inv.timeouts.create).on_not_found(NotFoundPolicy::Fail);
            self.wait(config, disabled, &name, DISABLED).await?;
        }

        tag_after_create(inv, client, &service.arn, desired, deferred).await?;
        Ok(name)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let (config, timeout, interval) = (inv.config, inv.propagation_timeout(), inv.poll_interval());
        let service = match retry_transient(timeout, interval, || self.find(config, id)).await {
            Ok(service) => service,
            Err(e) if e.is_not_found() && !inv.new_resource => {
                warn!(id, "Lightsail Container Service not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) => return Err(e),
        };

        let mut state = ObservedState::new(id, flatten(&service));
        set_tags(inv, &mut state, &service.tags, desired);
        Ok(ReadResult::Found(state))
    }

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()> {
        let fields = &new.fields;
        let (client, config) = (self.cloud.as_ref(), inv.config);
        if ["is_disabled", "power", "scale", "public_domain_names"]
            .iter()
            .any(|group| inv.has_change(group))
        {
            let disabled = fields.bool_or("is_disabled", false)?;
            let request = UpdateContainerServiceRequest {
                name: id.to_string(),
                is_disabled: Some(disabled),
                power: Some(fields.required_string("power")?.to_string()),
                scale: Some(fields.required_int("scale")?),
                public_domain_names: Some(public_domain_names_change(&old.fields, fields)?),
            };
            info!(id, disabled, "Updating Lightsail Container Service");
            retry_transient(inv.timeouts.update, inv.poll_interval(), || async {
                config.classify(client.update_container_service(&request).await, &[])
            })
            .await?;

            let (target, statuses) = if disabled {
                ("disable", DISABLED)
            } else {
                ("update", UPDATED)
            };
            let updated =
                waiter(inv, target, inv.timeouts.update).on_not_found(NotFoundPolicy::Fail);
            self.wait(config, updated, id, statuses).await?;
        }

        if !inv.tag_delta.is_empty() {
            let service = retry_transient(inv.timeouts.update, inv.poll_interval(), || {
                self.find(config, id)
            })
            .await?;
            update_resource_tags(inv, self.cloud.as_ref(), &service.arn, new).await?;
        }
        Ok(())
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, _state: &DesiredState) -> Result<()> {
        info!(id, "Deleting Lightsail Container Service");
        let (this, config) = (self, inv.config);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(this.cloud.delete_container_service(id).await, &[NOT_FOUND])
        })
        .await;
        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        waiter(inv, "delete", inv.timeouts.delete)
            .wait_until_gone(move || async move { DELETED.classify(this.find(config, id).await) })
            .await?;
        Ok(())
    }
}
