use async_trait::async_trait;
use chrono::Utc;
use cumulus_engine::ApiError;

use super::{DEFAULT_REGION, Entry, Lifecycle, MemoryCloud, Next, observe};
use crate::api::lightsail::{
    ContainerService, ContainerServiceClient, CreateContainerServiceRequest, NOT_FOUND,
    STATE_DELETING, STATE_DISABLED, STATE_PENDING, STATE_READY, STATE_UPDATING,
    UpdateContainerServiceRequest,
};

impl Lifecycle for ContainerService {
    fn set_status(&mut self, status: &'static str) {
        self.state = status.to_string();
    }
}

fn not_found(name: &str) -> ApiError {
    ApiError::new(NOT_FOUND, format!("Container service {} does not exist", name))
}

#[async_trait]
impl ContainerServiceClient for MemoryCloud {
    async fn create_container_service(
        &self,
        request: &CreateContainerServiceRequest,
    ) -> Result<ContainerService, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_container_service")?;
        state.check_tags_on_create(request.tags.as_ref())?;
        if state.container_services.contains_key(&request.name) {
            return Err(ApiError::new(
                "InvalidInputException",
                format!("Container service {} already exists", request.name),
            ));
        }

        let service = ContainerService {
            name: request.name.clone(),
            arn: Self::arn(
                "lightsail",
                &format!("ContainerService/{}", uuid::Uuid::new_v4()),
            ),
            power: request.power.clone(),
            power_id: format!("{}-1", request.power),
            scale: request.scale,
            is_disabled: false,
            state: String::new(),
            created_at: Utc::now(),
            availability_zone: format!("{}a", DEFAULT_REGION),
            principal_arn: String::new(),
            private_domain_name: format!("{}.service.local", request.name),
            url: Some(format!(
                "https://{}.{}.cs.amazonlightsail.com/",
                request.name, DEFAULT_REGION
            )),
            public_domain_names: request.public_domain_names.clone(),
            tags: request.tags.clone().unwrap_or_default(),
        };
        state.store_tags(&service.arn, request.tags.as_ref());

        let mut entry = Entry::new(service, state.describe_lag);
        entry.start(STATE_PENDING, state.settle_polls, Next::Status(STATE_READY));
        let created = entry.record.clone();
        state
            .container_services
            .insert(request.name.clone(), entry);
        Ok(created)
    }

    async fn get_container_services(&self, name: &str) -> Result<Vec<ContainerService>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("get_container_services")?;
        let mut service = observe(&mut state.container_services, name).ok_or_else(|| not_found(name))?;
        service.tags = state.tags.get(&service.arn).cloned().unwrap_or_default();
        Ok(vec![service])
    }

    async fn update_container_service(
        &self,
        request: &UpdateContainerServiceRequest,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("update_container_service")?;
        let polls = state.settle_polls;
        let entry = state
            .container_services
            .get_mut(&request.name)
            .ok_or_else(|| not_found(&request.name))?;

        let service = &mut entry.record;
        if let Some(disabled) = request.is_disabled {
            service.is_disabled = disabled;
        }
        if let Some(power) = &request.power {
            service.power = power.clone();
            service.power_id = format!("{}-1", power);
        }
        if let Some(scale) = request.scale {
            service.scale = scale;
        }
        if let Some(names) = &request.public_domain_names {
            service.public_domain_names = names.clone();
        }
        let settled = if service.is_disabled {
            STATE_DISABLED
        } else {
            STATE_READY
        };
        entry.start(STATE_UPDATING, polls, Next::Status(settled));
        Ok(())
    }

    async fn delete_container_service(&self, name: &str) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_container_service")?;
        let polls = state.settle_polls;
        let entry = state
            .container_services
            .get_mut(name)
            .ok_or_else(|| not_found(name))?;
        let arn = entry.record.arn.clone();
        if !entry.start(STATE_DELETING, polls, Next::Gone) {
            state.container_services.remove(name);
            state.tags.remove(&arn);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disable_and_delete_lifecycle() {
        let cloud = MemoryCloud::new();
        cloud.settle_after(1).await;
        let request = CreateContainerServiceRequest {
            name: "web".to_string(),
            power: "nano".to_string(),
            scale: 1,
            ..Default::default()
        };
        let created = cloud.create_container_service(&request).await.unwrap();
        assert_eq!(created.state, STATE_PENDING);
        assert_eq!(cloud.get_container_services("web").await.unwrap()[0].state, STATE_READY);

        cloud
            .update_container_service(&UpdateContainerServiceRequest {
                name: "web".to_string(),
                is_disabled: Some(true),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(cloud.get_container_services("web").await.unwrap()[0].state, STATE_DISABLED);

        cloud.delete_container_service("web").await.unwrap();
        let err = cloud.get_container_services("web").await.unwrap_err();
        assert_eq!(err.code, NOT_FOUND);
    }
}
