//! `aws_ecs_task_set`: a task set attached to an external-deployment service.
//!
//! The identity is `TASK_SET_ID,SERVICE,CLUSTER`. Creation races with the
//! service and its load balancer becoming visible, so the create call is
//! retried for those errors over the propagation window plus the create
//! budget.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cumulus_engine::finder::{find_one, single_result};
use cumulus_engine::schema::{DefaultTimeouts, FieldSpec, FieldType, ResourceDescriptor, Validation};
use cumulus_engine::waiter::{NotFoundPolicy, retry_transient, retry_when};
use cumulus_engine::{
    DesiredState, Fields, IdentityFormat, Invocation, ObservedState, ProviderConfig, ReadResult,
    ReconcileError, Resource, Result, StatusWait, Value, Waiter,
};
use tracing::{info, warn};

use super::{
    create_with_tags, set_listed_tags, set_tags, still_present, tag_after_create,
    update_resource_tags,
};
use crate::api::TaskSetClient;
use crate::api::ecs::{
    CLUSTER_NOT_FOUND, CreateTaskSetRequest, DescribeTaskSetsRequest, INVALID_PARAMETER,
    LoadBalancer, SERVICE_NOT_FOUND, STABILITY_STABILIZING, STABILITY_STEADY_STATE, Scale,
    TASK_SET_NOT_FOUND, TaskSet,
};

pub const TYPE_NAME: &str = "aws_ecs_task_set";

pub const IDENTITY: IdentityFormat =
    IdentityFormat::new(',', &["TASK_SET_ID", "SERVICE", "CLUSTER"]);

const TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_STABLE_TIMEOUT: &str = "10m";
const NOT_FOUND_CODES: &[&str] = &[CLUSTER_NOT_FOUND, SERVICE_NOT_FOUND, TASK_SET_NOT_FOUND];
const STABLE: StatusWait = StatusWait::new(&[STABILITY_STABILIZING], &[STABILITY_STEADY_STATE]);

fn descriptor() -> ResourceDescriptor {
    ResourceDescriptor::new(TYPE_NAME)
        .field(FieldSpec::required("cluster", FieldType::String).force_new())
        .field(FieldSpec::required("service", FieldType::String).force_new())
        .field(FieldSpec::required("task_definition", FieldType::String).force_new())
        .field(FieldSpec::optional_computed("external_id", FieldType::String).force_new())
        .field(
            FieldSpec::optional_computed("launch_type", FieldType::String)
                .force_new()
                .validate(Validation::OneOf(&["EC2", "FARGATE", "EXTERNAL"])),
        )
        .field(FieldSpec::optional_computed("platform_version", FieldType::String).force_new())
        .field(
            FieldSpec::optional(
                "load_balancer",
                FieldType::Block(vec![
                    FieldSpec::optional("target_group_arn", FieldType::String),
                    FieldSpec::required("container_name", FieldType::String),
                    FieldSpec::optional("container_port", FieldType::Int)
                        .validate(Validation::IntRange { min: 0, max: 65536 }),
                ]),
            )
            .force_new(),
        )
        .field(FieldSpec::optional_computed(
            "scale",
            FieldType::Block(vec![
                FieldSpec::optional("unit", FieldType::String)
                    .validate(Validation::OneOf(&["PERCENT"])),
                FieldSpec::optional("value", FieldType::Float)
                    .validate(Validation::FloatRange { min: 0.0, max: 100.0 }),
            ]),
        ))
        .field(FieldSpec::optional("force_delete", FieldType::Bool))
        .field(FieldSpec::optional("wait_until_stable", FieldType::Bool).default_value(false))
        .field(
            FieldSpec::optional("wait_until_stable_timeout", FieldType::String)
                .default_value(DEFAULT_STABLE_TIMEOUT)
                .validate(Validation::Duration),
        )
        .field(FieldSpec::computed("arn", FieldType::String))
        .field(FieldSpec::computed("task_set_id", FieldType::String))
        .field(FieldSpec::computed("status", FieldType::String))
        .field(FieldSpec::computed("stability_status", FieldType::String))
        .timeouts(DefaultTimeouts::all(TIMEOUT))
        .identity(IDENTITY)
        .taggable()
}

/// Errors that mean the service or its load balancer is not visible yet.
fn is_create_race(err: &ReconcileError) -> bool {
    err.code_equals(NOT_FOUND_CODES)
        || err.api().is_some_and(|e| {
            e.message_contains(INVALID_PARAMETER, "does not have an associated load balancer")
        })
}

fn expand_scale(fields: &Fields) -> Result<Option<Scale>> {
    let Some(block) = fields.block("scale")? else {
        return Ok(None);
    };
    Ok(Some(Scale {
        unit: block.string("unit")?.unwrap_or("PERCENT").to_string(),
        value: block.float("value")?.unwrap_or(0.0),
    }))
}

fn expand_load_balancers(fields: &Fields) -> Result<Vec<LoadBalancer>> {
    fields
        .blocks("load_balancer")?
        .iter()
        .map(|block| {
            Ok(LoadBalancer {
                target_group_arn: block.non_empty_string("target_group_arn")?.map(str::to_string),
                container_name: block.required_string("container_name")?.to_string(),
                container_port: block.int("container_port")?,
            })
        })
        .collect()
}

fn stable_timeout(fields: &Fields) -> Result<Duration> {
    let raw = fields
        .string("wait_until_stable_timeout")?
        .unwrap_or(DEFAULT_STABLE_TIMEOUT);
    humantime::parse_duration(raw).map_err(|e| {
        ReconcileError::terminal(format!("wait_until_stable_timeout {:?}: {}", raw, e))
    })
}

fn flatten(task_set: &TaskSet, desired: Option<&DesiredState>) -> Result<Fields> {
    let mut fields = Fields::new()
        .with("arn", task_set.arn.as_str())
        .with("cluster", task_set.cluster.as_str())
        .with("service", task_set.service.as_str())
        .with("task_definition", task_set.task_definition.as_str())
        .with("task_set_id", task_set.id.as_str())
        .with("external_id", task_set.external_id.clone())
        .with("launch_type", task_set.launch_type.clone())
        .with("platform_version", task_set.platform_version.clone())
        .with("status", task_set.status.as_str())
        .with("stability_status", task_set.stability_status.as_str());

    if let Some(scale) = &task_set.scale {
        fields.set(
            "scale",
            Value::block(
                Fields::new()
                    .with("unit", scale.unit.as_str())
                    .with("value", scale.value),
            ),
        );
    }
    if !task_set.load_balancers.is_empty() {
        let blocks = task_set
            .load_balancers
            .iter()
            .map(|lb| {
                Value::Map(
                    Fields::new()
                        .with("target_group_arn", lb.target_group_arn.clone())
                        .with("container_name", lb.container_name.as_str())
                        .with("container_port", lb.container_port)
                        .into_inner(),
                )
            })
            .collect::<Vec<_>>();
        fields.set("load_balancer", blocks);
    }

    let configured = desired.map(|d| &d.fields);
    let flag = |name: &str| -> Result<bool> {
        Ok(match configured {
            Some(f) => f.bool_or(name, false)?,
            None => false,
        })
    };
    fields.set("force_delete", flag("force_delete")?);
    fields.set("wait_until_stable", flag("wait_until_stable")?);
    let timeout = match configured {
        Some(f) => f.string("wait_until_stable_timeout")?,
        None => None,
    };
    fields.set(
        "wait_until_stable_timeout",
        timeout.unwrap_or(DEFAULT_STABLE_TIMEOUT),
    );
    Ok(fields)
}

pub struct TaskSetResource<C> {
    cloud: Arc<C>,
    descriptor: ResourceDescriptor,
}

impl<C: TaskSetClient> TaskSetResource<C> {
    pub fn new(cloud: Arc<C>) -> Self {
        Self {
            cloud,
            descriptor: descriptor(),
        }
    }

    async fn describe(
        &self,
        cluster: &str,
        service: &str,
        task_set: &str,
        include_tags: bool,
    ) -> std::result::Result<Vec<TaskSet>, cumulus_engine::ApiError> {
        let request = DescribeTaskSetsRequest {
            cluster: cluster.to_string(),
            service: service.to_string(),
            task_sets: vec![task_set.to_string()],
            include_tags,
        };
        self.cloud.describe_task_sets(&request).await
    }

    async fn find(
        &self,
        config: &ProviderConfig,
        cluster: &str,
        service: &str,
        task_set: &str,
    ) -> Result<TaskSet> {
        find_one(
            config,
            &format!("ECS Task Set ({})", task_set),
            NOT_FOUND_CODES,
            self.describe(cluster, service, task_set, false),
            |t: &TaskSet| t.id == task_set,
        )
        .await
    }

    async fn wait_stable(
        &self,
        inv: &Invocation<'_>,
        waiter: Waiter,
        cluster: &str,
        service: &str,
        task_set: &str,
    ) -> Result<TaskSet> {
        let (this, config) = (self, inv.config);
        waiter
            .interval(inv.poll_interval())
            .wait_until(move || async move {
                STABLE.classify(this.find(config, cluster, service, task_set).await)
            })
            .await
    }
}

#[async_trait]
impl<C: TaskSetClient + 'static> Resource for TaskSetResource<C> {
    fn descriptor(&self) -> &ResourceDescriptor {
        &self.descriptor
    }

    async fn create(&self, inv: &mut Invocation<'_>, desired: &DesiredState) -> Result<String> {
        let fields = &desired.fields;
        let cluster = fields.required_string("cluster")?;
        let service = fields.required_string("service")?;
        let request = CreateTaskSetRequest {
            client_token: uuid::Uuid::new_v4().to_string(),
            cluster: cluster.to_string(),
            service: service.to_string(),
            task_definition: fields.required_string("task_definition")?.to_string(),
            external_id: fields.non_empty_string("external_id")?.map(str::to_string),
            launch_type: fields.non_empty_string("launch_type")?.map(str::to_string),
            platform_version: fields.non_empty_string("platform_version")?.map(str::to_string),
            scale: expand_scale(fields)?,
            load_balancers: expand_load_balancers(fields)?,
            tags: None,
        };

        let budget = inv.propagation_timeout() + inv.timeouts.create;
        let interval = inv.poll_interval();
        let (client, config) = (self.cloud.as_ref(), inv.config);
        let (task_set, deferred) = create_with_tags(inv, desired, |tags| {
            let request = CreateTaskSetRequest {
                tags,
                ..request.clone()
            };
            async move {
                let request = &request;
                retry_when(
                    budget,
                    interval,
                    move || async move { config.classify(client.create_task_set(request).await, &[]) },
                    is_create_race,
                )
                .await
            }
        })
        .await?;

        let id = IDENTITY.format(&[task_set.id.as_str(), service, cluster])?;
        info!(id, "Created ECS Task Set");
        inv.assign_id(id.as_str());

        if fields.bool_or("wait_until_stable", false)? {
            let waiter = Waiter::new("ECS Task Set stable", stable_timeout(fields)?);
            self.wait_stable(inv, waiter, cluster, service, &task_set.id)
                .await?;
        }

        tag_after_create(inv, client, &task_set.arn, desired, deferred).await?;
        Ok(id)
    }

    async fn read(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        desired: Option<&DesiredState>,
    ) -> Result<ReadResult> {
        let [task_set_id, service, cluster] = IDENTITY.parse_parts::<3>(id)?;

        let (config, timeout, interval) = (inv.config, inv.propagation_timeout(), inv.poll_interval());
        let describe = |include_tags: bool| {
            let (cluster, service, task_set_id) = (&cluster, &service, &task_set_id);
            retry_transient(timeout, interval, move || async move {
                config.classify(
                    self.describe(cluster, service, task_set_id, include_tags).await,
                    NOT_FOUND_CODES,
                )
            })
        };
        let described = match describe(true).await {
            Err(e) if e.is_not_found() && !inv.new_resource => {
                warn!(id, "ECS Task Set not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) if inv.guard().can_degrade(&e) => {
                warn!(id, "describing ECS Task Set with tags failed, retrying without tags: {}", e);
                describe(false).await?
            }
            other => other?,
        };

        let what = format!("ECS Task Set ({})", id);
        let task_set = match single_result(described, &what, |t: &TaskSet| t.id == task_set_id) {
            Ok(t) => t,
            Err(e) if e.is_not_found() && inv.new_resource => {
                return Err(ReconcileError::terminal(format!(
                    "reading ECS Task Set ({}): empty output after creation",
                    id
                )));
            }
            Err(e) if e.is_not_found() => {
                warn!(id, "ECS Task Set not found, removing from state");
                return Ok(ReadResult::Absent);
            }
            Err(e) => return Err(e),
        };

        let mut state = ObservedState::new(id, flatten(&task_set, desired)?);
        match &task_set.tags {
            Some(remote) => set_tags(inv, &mut state, remote, desired),
            None => set_listed_tags(inv, &mut state, None, desired),
        }
        Ok(ReadResult::Found(state))
    }

    async fn update(
        &self,
        inv: &mut Invocation<'_>,
        id: &str,
        _old: &DesiredState,
        new: &DesiredState,
    ) -> Result<()> {
        let [task_set_id, service, cluster] = IDENTITY.parse_parts::<3>(id)?;
        let (client, config) = (self.cloud.as_ref(), inv.config);

        if inv.has_change("scale") {
            let scale = expand_scale(&new.fields)?.unwrap_or(Scale {
                unit: "PERCENT".to_string(),
                value: 100.0,
            });
            info!(id, value = scale.value, "Updating ECS Task Set scale");
            retry_transient(inv.timeouts.update, inv.poll_interval(), || async {
                config.classify(
                    client
                        .update_task_set(&cluster, &service, &task_set_id, &scale)
                        .await,
                    &[],
                )
            })
            .await?;

            if new.fields.bool_or("wait_until_stable", false)? {
                let waiter = Waiter::new("ECS Task Set stable", stable_timeout(&new.fields)?)
                    .on_not_found(NotFoundPolicy::Fail);
                self.wait_stable(inv, waiter, &cluster, &service, &task_set_id)
                    .await?;
            }
        }

        if !inv.tag_delta.is_empty() {
            let task_set = retry_transient(inv.timeouts.update, inv.poll_interval(), || {
                self.find(config, &cluster, &service, &task_set_id)
            })
            .await?;
            update_resource_tags(inv, self.cloud.as_ref(), &task_set.arn, new).await?;
        }
        Ok(())
    }

    async fn delete(&self, inv: &mut Invocation<'_>, id: &str, state: &DesiredState) -> Result<()> {
        let [task_set_id, service, cluster] = IDENTITY.parse_parts::<3>(id)?;
        let force = state.fields.bool_or("force_delete", false)?;
        info!(id, force, "Deleting ECS Task Set");

        let (this, config) = (self, inv.config);
        let (cluster, service, task_set_id) = (&cluster, &service, &task_set_id);
        let deleted = retry_transient(inv.timeouts.delete, inv.poll_interval(), || async {
            config.classify(
                this.cloud
                    .delete_task_set(cluster, service, task_set_id, force)
                    .await,
                &[TASK_SET_NOT_FOUND],
            )
        })
        .await;
        match deleted {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        }

        Waiter::new("ECS Task Set delete", inv.timeouts.delete)
            .interval(inv.poll_interval())
            .wait_until_gone(move || async move {
                still_present(this.find(config, cluster, service, task_set_id).await)
            })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use cumulus_engine::ApiError;

    use super::*;

    #[test]
    fn test_create_race_classification() {
        let race = ReconcileError::Remote(ApiError::new(
            INVALID_PARAMETER,
            "The service does not have an associated load balancer.",
        ));
        assert!(is_create_race(&race));

        let missing = ReconcileError::Remote(ApiError::new(SERVICE_NOT_FOUND, "Service not found."));
        assert!(is_create_race(&missing));

        let other = ReconcileError::Remote(ApiError::new(INVALID_PARAMETER, "bad task definition"));
        assert!(!is_create_race(&other));
    }

    #[test]
    fn test_flatten_carries_local_flags() {
        let task_set = TaskSet {
            id: "ecs-svc/1".to_string(),
            cluster: "prod".to_string(),
            service: "web".to_string(),
            scale: Some(Scale {
                unit: "PERCENT".to_string(),
                value: 50.0,
            }),
            ..Default::default()
        };
        let desired = DesiredState::new(Fields::new().with("wait_until_stable", true));
        let fields = flatten(&task_set, Some(&desired)).unwrap();

        assert_eq!(fields.bool("wait_until_stable").unwrap(), Some(true));
        assert_eq!(fields.string("wait_until_stable_timeout").unwrap(), Some("10m"));
        let scale = fields.block("scale").unwrap().unwrap();
        assert_eq!(scale.float("value").unwrap(), Some(50.0));
    }

    #[test]
    fn test_stable_timeout() {
        let fields = Fields::new().with("wait_until_stable_timeout", "90s");
        assert_eq!(stable_timeout(&fields).unwrap(), Duration::from_secs(90));
        assert_eq!(stable_timeout(&Fields::new()).unwrap(), TIMEOUT);
    }
}
