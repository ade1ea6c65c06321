use async_trait::async_trait;
use cumulus_engine::ApiError;

use super::{Entry, Lifecycle, MemoryCloud, Next, observe};
use crate::api::fsx::{
    CreateVolumeRequest, LIFECYCLE_AVAILABLE, LIFECYCLE_CREATED, LIFECYCLE_CREATING,
    LIFECYCLE_DELETING, LIFECYCLE_FAILED, LIFECYCLE_PENDING, OntapConfiguration,
    UpdateVolumeRequest, VOLUME_NOT_FOUND, Volume, VolumeClient,
};

impl Lifecycle for Volume {
    fn set_status(&mut self, status: &'static str) {
        self.lifecycle = status.to_string();
    }
}

fn not_found(id: &str) -> ApiError {
    ApiError::new(VOLUME_NOT_FOUND, format!("Volume {} does not exist", id))
}

impl MemoryCloud {
    /// Fail every subsequently created volume with `reason`.
    pub async fn fail_volumes(&self, reason: &str) {
        self.state.lock().await.volume_failure = Some(reason.to_string());
    }
}

#[async_trait]
impl VolumeClient for MemoryCloud {
    async fn create_volume(&self, request: &CreateVolumeRequest) -> Result<Volume, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_volume")?;
        state.check_tags_on_create(request.tags.as_ref())?;

        let id = format!("fsvol-{:017x}", state.sequence());
        let ontap = &request.ontap;
        let volume = Volume {
            arn: Self::arn("fsx", &format!("volume/{}", id)),
            id: id.clone(),
            name: request.name.clone(),
            file_system_id: String::new(),
            volume_type: request.volume_type.clone(),
            lifecycle: String::new(),
            lifecycle_reason: state.volume_failure.clone(),
            ontap: Some(OntapConfiguration {
                junction_path: ontap.junction_path.clone(),
                security_style: ontap.security_style.clone(),
                size_in_megabytes: ontap.size_in_megabytes,
                storage_efficiency_enabled: ontap.storage_efficiency_enabled,
                storage_virtual_machine_id: ontap.storage_virtual_machine_id.clone(),
                tiering_policy: ontap.tiering_policy.clone(),
                uuid: uuid::Uuid::new_v4().to_string(),
                ontap_volume_type: "RW".to_string(),
            }),
        };
        state.store_tags(&volume.arn, request.tags.as_ref());

        let settled = if state.volume_failure.is_some() {
            LIFECYCLE_FAILED
        } else {
            LIFECYCLE_CREATED
        };
        let mut entry = Entry::new(volume, state.describe_lag);
        entry.start(LIFECYCLE_CREATING, state.settle_polls, Next::Status(settled));
        let created = entry.record.clone();
        state.volumes.insert(id, entry);
        Ok(created)
    }

    async fn describe_volumes(&self, ids: &[String]) -> Result<Vec<Volume>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("describe_volumes")?;
        let mut found = Vec::new();
        for id in ids {
            match observe(&mut state.volumes, id) {
                Some(volume) => found.push(volume),
                None => return Err(not_found(id)),
            }
        }
        Ok(found)
    }

    async fn update_volume(&self, request: &UpdateVolumeRequest) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("update_volume")?;
        if state.volume_tokens.contains(&request.client_request_token) {
            return Ok(());
        }
        let polls = state.settle_polls;
        let entry = state
            .volumes
            .get_mut(&request.volume_id)
            .ok_or_else(|| not_found(&request.volume_id))?;
        let lifecycle = entry.record.lifecycle.as_str();
        if lifecycle != LIFECYCLE_CREATED && lifecycle != LIFECYCLE_AVAILABLE {
            return Err(ApiError::new(
                "BadRequest",
                format!("Volume {} is {}", request.volume_id, entry.record.lifecycle),
            ));
        }

        let changes = &request.ontap;
        if let Some(ontap) = entry.record.ontap.as_mut() {
            if let Some(path) = &changes.junction_path {
                ontap.junction_path = path.clone();
            }
            if let Some(style) = &changes.security_style {
                ontap.security_style = Some(style.clone());
            }
            if let Some(size) = changes.size_in_megabytes {
                ontap.size_in_megabytes = size;
            }
            if let Some(enabled) = changes.storage_efficiency_enabled {
                ontap.storage_efficiency_enabled = enabled;
            }
            if let Some(policy) = &changes.tiering_policy {
                ontap.tiering_policy = Some(policy.clone());
            }
        }
        entry.start(LIFECYCLE_PENDING, polls, Next::Status(LIFECYCLE_CREATED));
        state
            .volume_tokens
            .insert(request.client_request_token.clone());
        Ok(())
    }

    async fn delete_volume(&self, id: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_volume")?;
        let polls = state.settle_polls;
        let entry = state.volumes.get_mut(id).ok_or_else(|| not_found(id))?;
        let arn = entry.record.arn.clone();
        if !entry.start(LIFECYCLE_DELETING, polls, Next::Gone) {
            state.volumes.remove(id);
            state.tags.remove(&arn);
        }
        Ok(())
    }
}
