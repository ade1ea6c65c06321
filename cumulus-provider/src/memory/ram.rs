use async_trait::async_trait;
use cumulus_engine::ApiError;

use super::{Entry, Lifecycle, MemoryCloud, Next, observe};
use crate::api::ram::{
    CreateResourceShareRequest, ResourceShare, ResourceShareClient, STATUS_ACTIVE,
    STATUS_DELETED, STATUS_DELETING, STATUS_PENDING, UNKNOWN_RESOURCE,
};

pub const DEFAULT_PERMISSION: &str =
    "arn:aws:ram::aws:permission/AWSRAMDefaultPermissionTransitGateway";

impl Lifecycle for ResourceShare {
    fn set_status(&mut self, status: &'static str) {
        self.status = status.to_string();
    }
}

fn unknown(arn: &str) -> ApiError {
    ApiError::new(UNKNOWN_RESOURCE, format!("ResourceShare {} could not be found.", arn))
}

#[async_trait]
impl ResourceShareClient for MemoryCloud {
    async fn create_resource_share(
        &self,
        request: &CreateResourceShareRequest,
    ) -> Result<ResourceShare, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_resource_share")?;
        state.check_tags_on_create(request.tags.as_ref())?;

        let share = ResourceShare {
            arn: Self::arn("ram", &format!("resource-share/{}", uuid::Uuid::new_v4())),
            name: request.name.clone(),
            allow_external_principals: request.allow_external_principals,
            status: String::new(),
            status_message: None,
            tags: request.tags.clone().unwrap_or_default(),
        };
        state.store_tags(&share.arn, request.tags.as_ref());
        let permissions = if request.permission_arns.is_empty() {
            vec![DEFAULT_PERMISSION.to_string()]
        } else {
            request.permission_arns.clone()
        };
        state.share_permissions.insert(share.arn.clone(), permissions);

        let mut entry = Entry::new(share, state.describe_lag);
        entry.start(STATUS_PENDING, state.settle_polls, Next::Status(STATUS_ACTIVE));
        let created = entry.record.clone();
        state.shares.insert(created.arn.clone(), entry);
        Ok(created)
    }

    async fn get_resource_shares(&self, arns: &[String]) -> Result<Vec<ResourceShare>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("get_resource_shares")?;
        let mut found = Vec::new();
        for arn in arns {
            if let Some(mut share) = observe(&mut state.shares, arn) {
                share.tags = state.tags.get(arn).cloned().unwrap_or_default();
                found.push(share);
            }
        }
        Ok(found)
    }

    async fn update_resource_share(
        &self,
        arn: &str,
        name: &str,
        allow_external_principals: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("update_resource_share")?;
        let entry = state.shares.get_mut(arn).ok_or_else(|| unknown(arn))?;
        entry.record.name = name.to_string();
        entry.record.allow_external_principals = allow_external_principals;
        Ok(())
    }

    async fn list_resource_share_permissions(&self, arn: &str) -> Result<Vec<String>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("list_resource_share_permissions")?;
        state
            .share_permissions
            .get(arn)
            .cloned()
            .ok_or_else(|| unknown(arn))
    }

    async fn delete_resource_share(&self, arn: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_resource_share")?;
        let polls = state.settle_polls;
        let entry = state
            .shares
            .get_mut(arn)
            .filter(|e| e.record.status != STATUS_DELETED)
            .ok_or_else(|| unknown(arn))?;
        entry.start(STATUS_DELETING, polls, Next::Status(STATUS_DELETED));
        Ok(())
    }
}
