use async_trait::async_trait;
use cumulus_engine::ApiError;

use super::{Entry, Lifecycle, MemoryCloud, Next, State, observe};
use crate::api::ecs::{
    CLUSTER_NOT_FOUND, CreateTaskSetRequest, DescribeTaskSetsRequest, INVALID_PARAMETER,
    SERVICE_NOT_FOUND, STABILITY_STABILIZING, STABILITY_STEADY_STATE, STATUS_ACTIVE,
    STATUS_DRAINING, Scale, TASK_SET_NOT_FOUND, TaskSet, TaskSetClient,
};

impl Lifecycle for TaskSet {
    fn set_status(&mut self, status: &'static str) {
        match status {
            STATUS_DRAINING => self.status = status.to_string(),
            _ => self.stability_status = status.to_string(),
        }
    }
}

impl MemoryCloud {
    /// Register a service that task sets can be attached to.
    pub async fn add_service(&self, cluster: &str, service: &str) {
        self.state
            .lock()
            .await
            .services
            .insert((cluster.to_string(), service.to_string()));
    }
}

impl State {
    fn check_service(&self, cluster: &str, service: &str) -> Result<(), ApiError> {
        if !self.services.iter().any(|(c, _)| c == cluster) {
            return Err(ApiError::new(CLUSTER_NOT_FOUND, "Cluster not found."));
        }
        if !self
            .services
            .contains(&(cluster.to_string(), service.to_string()))
        {
            return Err(ApiError::new(SERVICE_NOT_FOUND, "Service not found."));
        }
        Ok(())
    }

    fn task_set_mut(
        &mut self,
        cluster: &str,
        service: &str,
        id: &str,
    ) -> Result<&mut Entry<TaskSet>, ApiError> {
        self.check_service(cluster, service)?;
        self.task_sets
            .get_mut(id)
            .filter(|e| e.record.cluster == cluster && e.record.service == service)
            .ok_or_else(|| {
                ApiError::new(
                    TASK_SET_NOT_FOUND,
                    format!("The specified task set {} does not exist.", id),
                )
            })
    }
}

#[async_trait]
impl TaskSetClient for MemoryCloud {
    async fn create_task_set(&self, request: &CreateTaskSetRequest) -> Result<TaskSet, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("create_task_set")?;
        state.check_service(&request.cluster, &request.service)?;
        if state.reject_tag_on_create && request.tags.is_some() {
            return Err(ApiError::new(INVALID_PARAMETER, "Unrecognized parameter: tags"));
        }

        if let Some(id) = state.client_tokens.get(&request.client_token) {
            if let Some(entry) = state.task_sets.get(id) {
                return Ok(entry.record.clone());
            }
        }

        let id = format!("ecs-svc/{:019}", state.sequence());
        let task_set = TaskSet {
            arn: Self::arn(
                "ecs",
                &format!("task-set/{}/{}/{}", request.cluster, request.service, id),
            ),
            id: id.clone(),
            cluster: request.cluster.clone(),
            service: request.service.clone(),
            task_definition: request.task_definition.clone(),
            external_id: request.external_id.clone(),
            launch_type: request.launch_type.clone(),
            platform_version: request.platform_version.clone(),
            status: STATUS_ACTIVE.to_string(),
            stability_status: String::new(),
            scale: Some(request.scale.clone().unwrap_or(Scale {
                unit: "PERCENT".to_string(),
                value: 100.0,
            })),
            load_balancers: request.load_balancers.clone(),
            tags: None,
        };
        state.store_tags(&task_set.arn, request.tags.as_ref());

        let mut entry = Entry::new(task_set, state.describe_lag);
        entry.start(
            STABILITY_STABILIZING,
            state.settle_polls,
            Next::Status(STABILITY_STEADY_STATE),
        );
        let created = entry.record.clone();
        state.task_sets.insert(id.clone(), entry);
        state.client_tokens.insert(request.client_token.clone(), id);
        Ok(created)
    }

    async fn describe_task_sets(
        &self,
        request: &DescribeTaskSetsRequest,
    ) -> Result<Vec<TaskSet>, ApiError> {
        let mut state = self.state.lock().await;
        state.enter("describe_task_sets")?;
        if request.include_tags && state.reject_tagging {
            return Err(ApiError::new(INVALID_PARAMETER, "Unrecognized parameter: include"));
        }
        state.check_service(&request.cluster, &request.service)?;

        let mut found = Vec::new();
        for id in &request.task_sets {
            let Some(mut task_set) = observe(&mut state.task_sets, id) else {
                continue;
            };
            if task_set.cluster != request.cluster || task_set.service != request.service {
                continue;
            }
            if request.include_tags {
                task_set.tags = Some(state.tags.get(&task_set.arn).cloned().unwrap_or_default());
            }
            found.push(task_set);
        }
        Ok(found)
    }

    async fn update_task_set(
        &self,
        cluster: &str,
        service: &str,
        task_set: &str,
        scale: &Scale,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("update_task_set")?;
        let polls = state.settle_polls;
        let entry = state.task_set_mut(cluster, service, task_set)?;
        entry.record.scale = Some(scale.clone());
        entry.start(STABILITY_STABILIZING, polls, Next::Status(STABILITY_STEADY_STATE));
        Ok(())
    }

    async fn delete_task_set(
        &self,
        cluster: &str,
        service: &str,
        task_set: &str,
        _force: bool,
    ) -> Result<(), ApiError> {
        let mut state = self.state.lock().await;
        state.enter("delete_task_set")?;
        let polls = state.settle_polls;
        let entry = state.task_set_mut(cluster, service, task_set)?;
        let arn = entry.record.arn.clone();
        if !entry.start(STATUS_DRAINING, polls, Next::Gone) {
            state.task_sets.remove(task_set);
            state.tags.remove(&arn);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(token: &str) -> CreateTaskSetRequest {
        CreateTaskSetRequest {
            client_token: token.to_string(),
            cluster: "prod".to_string(),
            service: "web".to_string(),
            task_definition: "web:1".to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_requires_service() {
        let cloud = MemoryCloud::new();
        let err = cloud.create_task_set(&request("t1")).await.unwrap_err();
        assert_eq!(err.code, CLUSTER_NOT_FOUND);

        cloud.add_service("prod", "api").await;
        let err = cloud.create_task_set(&request("t1")).await.unwrap_err();
        assert_eq!(err.code, SERVICE_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_client_token_is_idempotent() {
        let cloud = MemoryCloud::new();
        cloud.add_service("prod", "web").await;

        let first = cloud.create_task_set(&request("t1")).await.unwrap();
        let again = cloud.create_task_set(&request("t1")).await.unwrap();
        let other = cloud.create_task_set(&request("t2")).await.unwrap();

        assert_eq!(first.id, again.id);
        assert_ne!(first.id, other.id);
        assert!(!first.id.contains(','));
    }

    #[tokio::test]
    async fn test_stabilizes_after_polls() {
        let cloud = MemoryCloud::new();
        cloud.add_service("prod", "web").await;
        cloud.settle_after(2).await;

        let created = cloud.create_task_set(&request("t1")).await.unwrap();
        assert_eq!(created.stability_status, STABILITY_STABILIZING);

        let describe = DescribeTaskSetsRequest {
            cluster: "prod".to_string(),
            service: "web".to_string(),
            task_sets: vec![created.id.clone()],
            include_tags: false,
        };
        let seen = cloud.describe_task_sets(&describe).await.unwrap();
        assert_eq!(seen[0].stability_status, STABILITY_STABILIZING);
        let seen = cloud.describe_task_sets(&describe).await.unwrap();
        assert_eq!(seen[0].stability_status, STABILITY_STEADY_STATE);
    }
}
