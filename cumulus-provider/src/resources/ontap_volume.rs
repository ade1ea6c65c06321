//! `aws_fsx_ontap_volume`: a volume on an ONTAP storage virtual machine.
//!
//! Describe does not return tags for volumes; they are listed separately.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::finder::find_one;
use cumulus_engine::schema::{DefaultTimeouts, FieldSpec, FieldType, ResourceDescriptor, Validation};
use cumulus_engine::waiter::{NotFoundPolicy, retry_transient};
use cumulus_engine::{
    DesiredState, Fields, Invocation, ObservedState, ProviderConfig, ReadResult, ReconcileError,
    Resource, Result, StatusWait, Value, Waiter,
};
use tracing::{debug, info, warn};

use super::{create_with_tags, list_tags, set_listed_tags, tag_after_create, update_resource_tags};
use crate::api::VolumeClient;
use crate::api::fsx::{
    CreateOntapConfiguration, CreateVolumeRequest, LIFECYCLE_AVAILABLE, LIFECYCLE_CREATED,
    LIFECYCLE_CREATING, LIFECYCLE_DELETING, LIFECYCLE_MISCONFIGURED, LIFECYCLE_PENDING,
    TieringPolicy, UpdateOntapConfiguration, UpdateVolumeRequest, VOLUME_NOT_FOUND,
    VOLUME_TYPE_ONTAP, Volume,
};

pub const TYPE_NAME: &str = "aws_fsx_ontap_volume";

const TIMEOUT: Duration = Duration::from_secs(30 * 60);
const WAIT_DELAY: Duration = Duration::from_secs(30);
const NOT_FOUND_CHECKS: u32 = 20;
const SECURITY_STYLES: &[&str] = &["UNIX", "NTFS", "MIXED"];
const TIERING_POLICIES: &[&str] = &["SNAPSHOT_ONLY", "AUTO", "ALL", "NONE"];

const SETTLED: &[&str] = &[LIFECYCLE_CREATED, LIFECYCLE_MISCONFIGURED, LIFECYCLE_AVAILABLE];
const CREATED: StatusWait = StatusWait::new(&[LIFECYCLE_CREATING, LIFECYCLE_PENDING], SETTLED);
const UPDATED: StatusWait = StatusWait::new(&[LIFECYCLE_PENDING], SETTLED);
const DELETED: StatusWait = StatusWait::new(
    &[
        LIFECYCLE_CREATED,
        LIFECYCLE_MISCONFIGURED,
        LIFECYCLE_AVAILABLE,
        LIFECYCLE_DELETING,
    ],
    &[],
);

/// Fields sent in an update when they change.
const UPDATABLE: &[&str] = &[
    "junction_path",
    "security_style",
    "size_in_megabytes",
    "storage_efficiency_enabled",
    "tiering_policy",
];

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(TYPE_NAME)
        .field(
            FieldSpec::required("name", FieldType::String)
                .force_new()
                .validate(Validation::StringLen { min: 1, max: 203 }),
        )
        .field(
            FieldSpec::required("junction_path", FieldType::String)
                .validate(Validation::StringLen { min: 1, max: 255 }),
        )
        .field(
            FieldSpec::optional("security_style", FieldType::String)
                .default_value("UNIX")
                .validate(Validation::OneOf(SECURITY_STYLES)),
        )
        .field(
            FieldSpec::required("size_in_megabytes", FieldType::Int).validate(
                Validation::IntRange {
                    min: 0,
                    max: i64::from(i32::MAX),
                },
            ),
        )
        .field(FieldSpec::required("storage_efficiency_enabled", FieldType::Bool))
        .field(
            FieldSpec::required("storage_virtual_machine_id", FieldType::String)
                .force_new()
                .validate(Validation::StringLen { min: 21, max: 21 }),
        )
        .field(FieldSpec::optional(
            "tiering_policy",
            FieldType::Block(vec![
                FieldSpec::optional("cooling_period", FieldType::Int)
                    .validate(Validation::IntRange { min: 2, max: 183 }),
                FieldSpec::optional_computed("name", FieldType::String)
                    .validate(Validation::OneOf(TIERING_POLICIES)),
            ]),
        ))
        .field(
            FieldSpec::optional("volume_type", FieldType::String)
                .force_new()
                .default_value(VOLUME_TYPE_ONTAP)
                .validate(Validation::OneOf(&[VOLUME_TYPE_ONTAP])),
        )
        .field(FieldSpec::computed("arn", FieldType::String))
        .field(FieldSpec::computed("file_system_id", FieldType::String))
        .field(FieldSpec::computed("ontap_volume_type", FieldType::String))
        .field(FieldSpec::computed("uuid", FieldType::String))
        .timeouts(DefaultTimeouts::all(TIMEOUT))
        .taggable()
}

fn expand_tiering_policy(fields: &Fields) -> Result<Option<TieringPolicy>> {
    let Some(block) = fields.block("tiering_policy")? else {
        return Ok(None);
    };
    Ok(Some(TieringPolicy {
        name: block.non_empty_string("name")?.map(str::to_string),
        // Zero means unset; the remote minimum is two days.
        cooling_period: block.int("cooling_period")?.filter(|days| *days >= 2),
    }))
}

/// Only the sub-fields that differ between the two configurations.
fn update_configuration(
    inv: &Invocation<'_>,
    new: &Fields,
) -> Result<UpdateOntapConfiguration> {
    let mut update = UpdateOntapConfiguration::default();
    if inv.has_change("junction_path") {
        update.junction_path = Some(new.required_string("junction_path")?.to_string());
    }
    if inv.has_change("security_style") {
        update.security_style = new.non_empty_string("security_style")?.map(str::to_string);
    }
    if inv.has_change("size_in_megabytes") {
        update.size_in_megabytes = Some(new.required_int("size_in_megabytes")?);
    }
    if inv.has_change("storage_efficiency_enabled") {
        update.storage_efficiency_enabled = Some(new.bool_or("storage_efficiency_enabled", false)?);
    }
    if inv.has_change("tiering_policy") {
        update.tiering_policy = expand_tiering_policy(new)?;
    }
    Ok(update)
}

fn flatten(volume: &Volume) -> Result<Fields> {
    let ontap = volume.ontap.as_ref().ok_or_else(|| {
        ReconcileError::terminal(format!(
            "describing FSx ONTAP Volume ({}): empty ONTAP configuration",
            volume.id
        ))
    })?;

    let mut fields = Fields::new()
        .with("arn", volume.arn.as_str())
        .with("name", volume.name.as_str())
        .with("file_system_id", volume.file_system_id.as_str())
        .with("junction_path", ontap.junction_path.as_str())
        .with("ontap_volume_type", ontap.ontap_volume_type.as_str())
        .with("security_style", ontap.security_style.clone())
        .with("size_in_megabytes", ontap.size_in_megabytes)
        .with("storage_efficiency_enabled", ontap.storage_efficiency_enabled)
        .with("storage_virtual_machine_id", ontap.storage_virtual_machine_id.as_str())
        .with("uuid", ontap.uuid.as_str())
        .with("volume_type", volume.volume_type.as_str());
    if let Some(policy) = &ontap.tiering_policy {
        fields.set(
            "tiering_policy",
            Value::block(
                Fields::new()
                    .with("name", policy.name.clone())
                    .with("cooling_period", policy.cooling_period),
            ),
        );
    }
    Ok(fields)
}

pub struct OntapVolumeResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: VolumeClient> OntapVolumeResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    async fn find(&self, config: &ProviderConfig, id: &str) -> Result<Volume> {
        let ids = [id.to_string()];
        find_one(
            config,
            &format!("FSx ONTAP Volume ({})", id),
            &[VOLUME_NOT_FOUND],
            self.cloud.describe_volumes(&ids),
            |v: &Volume| v.id == id,
        )
        .await
    }

    async fn wait(
        &self,
        config: &ProviderConfig,
        waiter: Waiter,
        id: &str,
        statuses: StatusWait,
    ) -> Result<Volume> {
        let this = self;
        waiter
            .wait_until(move || async move { statuses.classify(this.find(config, id).await) })
            .await
    }
}

fn waiter(inv: &Invocation<'_>, target: &str, timeout: Duration) -> Waiter {
    Waiter::new(format!("FSx ONTAP Volume {}", target), timeout)
        .interval(inv.poll_interval())
        .delay(WAIT_DELAY)
}

#[async_trait]
impl<C: VolumeClient + 'static> Resource for OntapVolumeResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let request = CreateVolumeRequest {
            name: fields.required_string("name")?.to_string(),
            volume_type: fields
                .string("volume_type")?
                .unwrap_or(VOLUME_TYPE_ONTAP)
                .to_string(),
            ontap: CreateOntapConfiguration {
                junction_path: fields.required_string("junction_path")?.to_string(),
                security_style: fields.non_empty_string("security_style")?.map(str::to_string),
                size_in_megabytes: fields.required_int("size_in_megabytes")?,
                storage_efficiency_enabled: fields.bool_or("storage_efficiency_enabled", false)?,
                storage_virtual_machine_id: fields
                    .required_string("storage_virtual_machine_id")?
                    .to_string(),
                tiering_policy: expand_tiering_policy(fields)?,
            },
            tags: None,
        };

        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (volume, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateVolumeRequest {
                tags,
                ..request.clone()
            };
            async move { config.classify(client.create_volume(&request).await, &[]) }
        })
        .await?;

        info!(id = %volume.id, "Created FSx ONTAP Volume");
        inv.assign_id(volume.id.as_str());
        let created = waiter(inv, "create", inv.timeouts.create).not_found_checks(NOT_FOUND_CHECKS);
        self.wait(config, created, &volume.id, CREATED).await?;

        tag_after_create(inv, client, &volume.arn, desired, deferred).await?;
        Ok(volume.id)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let (config, timeout, interval) = (inv.config, inv.propagation_timeout(), inv.poll_interval());
        let volume = match retry_transient(timeout, interval, || self.find(config, id)).await {
            Ok(volume) => volume,
            Err(e) if e.is_not_found() && !inv.new_resource => {
                warn!(id, "FSx ONTAP Volume not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) => return Err(e),
        };

        let mut state = ObservedState::new(id, flatten(&volume)?);
        let listed = list_tags(inv, self.cloud.as_ref(), &volume.arn).await?;
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
        if !inv.tag_delta.is_empty() {
            let volume = retry_transient(inv.timeouts.update, inv.poll_interval(), || {
                self.find(config, id)
            })
            .await?;
            update_resource_tags(inv, self.cloud.as_ref(), &volume.arn, new).await?;
        }

        if !UPDATABLE.iter().any(|group| inv.has_change(group)) {
            return Ok(());
        }
        let ontap = update_configuration(inv, &new.fields)?;
        if ontap.is_empty() {
            debug!(id, "no ONTAP configuration change to send");
            return Ok(());
        }

        let request = UpdateVolumeRequest {
            client_request_token: uuid::Uuid::new_v4().to_string(),
            volume_id: id.to_string(),
            ontap,
        };
        info!(id, "Updating FSx ONTAP Volume");
        retry_transient(inv.timeouts.update, inv.poll_interval(), || async {
            config.classify(client.update_volume(&request).await, &[])
        })
        .await?;
        let updated = waiter(inv, "update", inv.timeouts.update).on_not_found(NotFoundPolicy::Fail);
        self.wait(config, updated, id, UPDATED).await?;
        Ok(())
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, _state: &DesiredState) -> Result<()> {
        info!(id, "Deleting FSx ONTAP Volume");
        let (this, config) = (self, inv.config);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(this.cloud.delete_volume(id).await, &[VOLUME_NOT_FOUND])
        })
        .await;
        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        Waiter::new("FSx ONTAP Volume delete", inv.timeouts.delete)
            .interval(inv.poll_interval())
            .wait_until_gone(move || async move { DELETED.classify(this.find(config, id).await) })
            .await?;
        Ok(())
    }
}
