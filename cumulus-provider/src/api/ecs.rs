//! Container orchestration API (task sets).

use async_trait::async_trait;
use cumulus_engine::waiter::Stateful;
use cumulus_engine::{ApiError, TagSet};

use super::TagClient;

pub const CLUSTER_NOT_FOUND: &str = "ClusterNotFoundException";
pub const SERVICE_NOT_FOUND: &str = "ServiceNotFoundException";
pub const TASK_SET_NOT_FOUND: &str = "TaskSetNotFoundException";
pub const INVALID_PARAMETER: &str = "InvalidParameterException";

pub const STABILITY_STABILIZING: &str = "STABILIZING";
pub const STABILITY_STEADY_STATE: &str = "STEADY_STATE";

pub const STATUS_ACTIVE: &str = "ACTIVE";
pub const STATUS_PRIMARY: &str = "PRIMARY";
pub const STATUS_DRAINING: &str = "DRAINING";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scale {
    pub unit: String,
    pub value: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadBalancer {
    pub target_group_arn: Option<String>,
    pub container_name: String,
    pub container_port: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskSet {
    pub id: String,
    pub arn: String,
    pub cluster: String,
    pub service: String,
    pub task_definition: String,
    pub external_id: Option<String>,
    pub launch_type: Option<String>,
    pub platform_version: Option<String>,
    pub status: String,
    pub stability_status: String,
    pub scale: Option<Scale>,
    pub load_balancers: Vec<LoadBalancer>,
    /// Present only when requested.
    pub tags: Option<TagSet>,
}

impl Stateful for TaskSet {
    fn status(&self) -> &str {
        &self.stability_status
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CreateTaskSetRequest {
    pub client_token: String,
    pub cluster: String,
    pub service: String,
    pub task_definition: String,
    pub external_id: Option<String>,
    pub launch_type: Option<String>,
    pub platform_version: Option<String>,
    pub scale: Option<Scale>,
    pub load_balancers: Vec<LoadBalancer>,
    pub tags: Option<TagSet>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DescribeTaskSetsRequest {
    pub cluster: String,
    pub service: String,
    pub task_sets: Vec<String>,
    pub include_tags: bool,
}

#[async_trait]
pub trait TaskSetClient: TagClient {
    async fn create_task_set(&self, request: &CreateTaskSetRequest) -> Result<TaskSet, ApiError>;

    async fn describe_task_sets(
        &self,
        request: &DescribeTaskSetsRequest,
    ) -> Result<Vec<TaskSet>, ApiError>;

    async fn update_task_set(
        &self,
        cluster: &str,
        service: &str,
        task_set: &str,
        scale: &Scale,
    ) -> Result<(), ApiError>;

    async fn delete_task_set(
        &self,
        cluster: &str,
        service: &str,
        task_set: &str,
        force: bool,
    ) -> Result<(), ApiError>;
}
