//! Reconciliation lifecycle tests against the in-memory cloud.

mod common;

use std::time::Duration;

use common::{Harness, assert_ok, errors, warnings};
use cumulus_engine::{ApiError, DesiredState, Fields, TagSet, Value};
use cumulus_provider::api::ecs::{INVALID_PARAMETER, SERVICE_NOT_FOUND};
use cumulus_provider::api::lightsail;
use cumulus_provider::resources::{
    api, container_service, ontap_volume, repository, resource_share, task_set,
};
use tokio::time::Instant;

fn repository(name: &str) -> DesiredState {
    DesiredState::new(Fields::new().with("name", name))
}

fn task_set_state() -> Fields {
    Fields::new()
        .with("cluster", "prod")
        .with("service", "web")
        .with("task_definition", "web:7")
        .with("external_id", "deploy-1")
}

fn container_service(scale: i64) -> DesiredState {
    DesiredState::new(
        Fields::new()
            .with("name", "web")
            .with("power", "nano")
            .with("scale", scale),
    )
}

fn http_api() -> Fields {
    Fields::new()
        .with("name", "gateway")
        .with("protocol_type", "HTTP")
}

fn ontap_volume() -> DesiredState {
    DesiredState::new(
        Fields::new()
            .with("name", "data")
            .with("junction_path", "/data")
            .with("size_in_megabytes", 1024i64)
            .with("storage_efficiency_enabled", true)
            .with("storage_virtual_machine_id", "svm-0123456789abcdef0"),
    )
}

// =============================================================================
// Partition Degradation
// =============================================================================

#[tokio::test]
async fn test_tag_on_create_falls_back_in_isolated_partition() {
    let h = Harness::isolated(TagSet::from([("env", "prod")]));
    h.cloud.reject_tag_on_create(true).await;

    let desired = repository("app").with_tags(TagSet::from([("team", "infra")]));
    let response = h.registry.create(repository::TYPE_NAME, &desired).await;
    assert_ok(&response);

    let warnings = warnings(&response.diagnostics);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].contains("tag-on-create"));

    let state = response.state.unwrap();
    assert_eq!(state.tags, TagSet::from([("team", "infra")]));
    assert_eq!(state.tags_all, TagSet::from([("env", "prod"), ("team", "infra")]));
    assert_eq!(h.cloud.calls("create_repository").await, 2);
    assert_eq!(h.cloud.calls("tag_resource").await, 1);
}

#[tokio::test]
async fn test_tag_on_create_rejected_in_default_partition() {
    let h = Harness::standard();
    h.cloud.reject_tag_on_create(true).await;

    let desired = repository("app").with_tags(TagSet::from([("team", "infra")]));
    let response = h.registry.create(repository::TYPE_NAME, &desired).await;

    assert!(!response.is_ok());
    assert_eq!(response.id, None);
    assert!(errors(&response.diagnostics)[0].contains("Tagging on create"));
    assert_eq!(h.cloud.calls("create_repository").await, 1);
}

#[tokio::test]
async fn test_default_only_tags_skipped_when_tagging_unsupported() {
    let h = Harness::isolated(TagSet::from([("env", "prod")]));
    h.cloud.reject_tag_on_create(true).await;
    h.cloud.reject_tagging(true).await;

    let response = h.registry.create(repository::TYPE_NAME, &repository("app")).await;
    assert_ok(&response);

    // Create fallback, skipped deferred tags, skipped tag listing.
    assert_eq!(response.diagnostics.warnings().count(), 3);
    let state = response.state.unwrap();
    assert!(state.tags.is_empty());
    assert_eq!(state.tags_all, TagSet::from([("env", "prod")]));
}

#[tokio::test]
async fn test_explicit_tags_fail_when_tagging_unsupported() {
    let h = Harness::isolated(TagSet::new());
    h.cloud.reject_tag_on_create(true).await;
    h.cloud.reject_tagging(true).await;

    let desired = repository("app").with_tags(TagSet::from([("team", "infra")]));
    let response = h.registry.create(repository::TYPE_NAME, &desired).await;

    assert!(!response.is_ok());
    // The repository exists, so its identity is still reported.
    assert_eq!(response.id.as_deref(), Some("app"));
    assert!(errors(&response.diagnostics)[0].contains("unsupported in partition aws-iso"));
}

#[tokio::test]
async fn test_task_set_read_retries_without_tags() {
    let h = Harness::isolated(TagSet::new());
    h.cloud.add_service("prod", "web").await;
    h.cloud.reject_tagging(true).await;

    let desired = DesiredState::new(task_set_state());
    let response = h.registry.create(task_set::TYPE_NAME, &desired).await;
    assert_ok(&response);

    let state = response.state.unwrap();
    assert_eq!(state.fields.string("external_id").unwrap(), Some("deploy-1"));
    assert!(state.tags_all.is_empty());
}

// =============================================================================
// Idempotent Delete
// =============================================================================

#[tokio::test]
async fn test_delete_absent_resources_succeeds_quietly() {
    let h = Harness::standard();
    let empty = DesiredState::default();

    let cases = [
        (api::TYPE_NAME, "missing"),
        (repository::TYPE_NAME, "missing"),
        (container_service::TYPE_NAME, "missing"),
        (ontap_volume::TYPE_NAME, "fsvol-00000000000000001"),
        (
            resource_share::TYPE_NAME,
            "arn:aws:ram:us-east-1:123456789012:resource-share/missing",
        ),
    ];
    for (type_name, id) in cases {
        let response = h.registry.delete(type_name, id, &empty).await;
        assert_ok(&response);
        assert!(response.diagnostics.is_empty(), "{}", type_name);
    }
}

#[tokio::test]
async fn test_delete_non_empty_repository() {
    let h = Harness::standard();
    assert_ok(&h.registry.create(repository::TYPE_NAME, &repository("app")).await);
    h.cloud.seed_images("app", 3).await;

    let response = h
        .registry
        .delete(repository::TYPE_NAME, "app", &repository("app"))
        .await;
    assert!(!response.is_ok());
    assert!(errors(&response.diagnostics)[0].contains("consider using force_delete"));
    assert_eq!(h.cloud.calls("delete_repository").await, 1);

    let forced = DesiredState::new(Fields::new().with("name", "app").with("force_delete", true));
    let response = h.registry.delete(repository::TYPE_NAME, "app", &forced).await;
    assert_ok(&response);

    let read = h.registry.read(repository::TYPE_NAME, "app", None).await;
    assert_ok(&read);
    assert!(read.state.is_none());
}

// =============================================================================
// Eventual Consistency
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_read_after_create_waits_for_propagation() {
    let h = Harness::standard();
    h.cloud.lag_describes(3).await;

    let response = h.registry.create(repository::TYPE_NAME, &repository("app")).await;
    assert_ok(&response);
    assert_eq!(h.cloud.calls("describe_repositories").await, 4);

    let state = response.state.unwrap();
    assert_eq!(
        state.fields.string("repository_url").unwrap(),
        Some("123456789012.dkr.ecr.us-east-1.amazonaws.com/app")
    );
}

#[tokio::test]
async fn test_read_of_missing_resource_drops_state() {
    let h = Harness::standard();
    let response = h.registry.read(repository::TYPE_NAME, "gone", None).await;
    assert_ok(&response);
    assert!(response.state.is_none());
    assert_eq!(h.cloud.calls("describe_repositories").await, 1);
}

#[tokio::test]
async fn test_inactive_share_is_dropped() {
    let h = Harness::standard();
    let desired = DesiredState::new(Fields::new().with("name", "shared"));
    let response = h.registry.create(resource_share::TYPE_NAME, &desired).await;
    assert_ok(&response);
    let arn = response.id.unwrap();

    let response = h.registry.delete(resource_share::TYPE_NAME, &arn, &desired).await;
    assert_ok(&response);

    // The deleted share is still listed, but no longer active.
    let read = h.registry.read(resource_share::TYPE_NAME, &arn, Some(&desired)).await;
    assert_ok(&read);
    assert!(read.state.is_none());
}

// =============================================================================
// Throttling
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_throttled_delete_is_retried() {
    let h = Harness::standard();
    let desired = DesiredState::new(Fields::new().with("name", "shared"));
    let response = h.registry.create(resource_share::TYPE_NAME, &desired).await;
    assert_ok(&response);
    let arn = response.id.unwrap();

    h.cloud
        .fail_next(
            "delete_resource_share",
            ApiError::new("ThrottlingException", "Rate exceeded"),
        )
        .await;
    let response = h.registry.delete(resource_share::TYPE_NAME, &arn, &desired).await;
    assert_ok(&response);
    assert!(response.diagnostics.is_empty());
    assert_eq!(h.cloud.calls("delete_resource_share").await, 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_create_and_tagging_are_retried() {
    let h = Harness::isolated(TagSet::new());
    h.cloud.reject_tag_on_create(true).await;
    let throttled = || ApiError::new("TooManyRequestsException", "Too Many Requests");
    h.cloud.fail_next("create_repository", throttled()).await;
    h.cloud.fail_next("tag_resource", throttled()).await;

    let desired = repository("app").with_tags(TagSet::from([("team", "infra")]));
    let response = h.registry.create(repository::TYPE_NAME, &desired).await;
    assert_ok(&response);

    // Throttled, rejected with tags, then created without them.
    assert_eq!(h.cloud.calls("create_repository").await, 3);
    assert_eq!(h.cloud.calls("tag_resource").await, 2);
    assert_eq!(response.state.unwrap().tags, TagSet::from([("team", "infra")]));
}

#[tokio::test]
async fn test_unlisted_error_code_is_not_retried() {
    let h = Harness::standard();
    let desired = DesiredState::new(Fields::new().with("name", "shared"));
    let response = h.registry.create(resource_share::TYPE_NAME, &desired).await;
    assert_ok(&response);
    let arn = response.id.unwrap();

    h.cloud
        .fail_next(
            "delete_resource_share",
            ApiError::new("OperationNotPermittedException", "not permitted"),
        )
        .await;
    let response = h.registry.delete(resource_share::TYPE_NAME, &arn, &desired).await;
    assert!(!response.is_ok());
    assert_eq!(h.cloud.calls("delete_resource_share").await, 1);
}

// =============================================================================
// Waits and Timeouts
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_create_wait_gives_up_on_missing_record() {
    let h = Harness::standard();
    h.cloud.lag_describes(25).await;

    let response = h
        .registry
        .create(container_service::TYPE_NAME, &container_service(1))
        .await;

    assert!(!response.is_ok());
    assert_eq!(response.id.as_deref(), Some("web"));
    let error = &errors(&response.diagnostics)[0];
    assert!(error.contains("Lightsail Container Service create (after 20 checks)"));
    assert_eq!(h.cloud.calls("get_container_services").await, 20);
}

#[tokio::test(start_paused = true)]
async fn test_update_wait_fails_when_record_disappears() {
    let h = Harness::standard();
    let old = container_service(1);
    assert_ok(&h.registry.create(container_service::TYPE_NAME, &old).await);

    h.cloud
        .fail_next(
            "get_container_services",
            ApiError::new(lightsail::NOT_FOUND, "The container service does not exist."),
        )
        .await;
    let response = h
        .registry
        .update(container_service::TYPE_NAME, "web", &old, &container_service(2))
        .await;

    assert!(!response.is_ok());
    assert!(errors(&response.diagnostics)[0].contains("update (after 1 checks)"));
    assert_eq!(h.cloud.calls("update_container_service").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_volume_wait_starts_after_initial_delay() {
    let h = Harness::standard();
    let start = Instant::now();

    let response = h.registry.create(ontap_volume::TYPE_NAME, &ontap_volume()).await;
    assert_ok(&response);
    assert!(start.elapsed() >= Duration::from_secs(30));
}

#[tokio::test(start_paused = true)]
async fn test_container_service_created_disabled() {
    let h = Harness::standard();
    h.cloud.settle_after(2).await;

    let mut desired = container_service(1);
    desired.fields.set("is_disabled", true);
    let response = h.registry.create(container_service::TYPE_NAME, &desired).await;
    assert_ok(&response);

    let state = response.state.unwrap();
    assert_eq!(state.fields.string("state").unwrap(), Some("DISABLED"));
    assert_eq!(state.fields.bool("is_disabled").unwrap(), Some(true));
    assert_eq!(state.fields.string("resource_type").unwrap(), Some("ContainerService"));
    assert_eq!(h.cloud.calls("update_container_service").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_wait_times_out_with_partial_identity() {
    let h = Harness::standard();
    h.cloud.settle_after(1_000).await;

    let desired = DesiredState::new(Fields::new().with("name", "shared").with(
        "timeouts",
        Value::block(Fields::new().with("create", "30s")),
    ));
    let response = h.registry.create(resource_share::TYPE_NAME, &desired).await;

    assert!(!response.is_ok());
    assert!(response.id.is_some());
    let error = &errors(&response.diagnostics)[0];
    assert!(error.contains("timeout while waiting for RAM Resource Share active"));
    assert!(error.contains("PENDING"));
}

#[tokio::test(start_paused = true)]
async fn test_failed_volume_is_terminal() {
    let h = Harness::standard();
    h.cloud.settle_after(2).await;
    h.cloud.fail_volumes("SVM is unreachable").await;

    let response = h.registry.create(ontap_volume::TYPE_NAME, &ontap_volume()).await;

    assert!(!response.is_ok());
    assert!(response.id.is_some());
    let error = &errors(&response.diagnostics)[0];
    assert!(error.contains("FAILED"));
    assert!(error.contains("SVM is unreachable"));
}

#[tokio::test(start_paused = true)]
async fn test_volume_update_sends_changed_fields() {
    let h = Harness::standard();
    let old = ontap_volume();
    let response = h.registry.create(ontap_volume::TYPE_NAME, &old).await;
    assert_ok(&response);
    let id = response.id.unwrap();

    let mut new = old.clone();
    new.fields.set("size_in_megabytes", 4096i64);
    let response = h.registry.update(ontap_volume::TYPE_NAME, &id, &old, &new).await;
    assert_ok(&response);

    let state = response.state.unwrap();
    assert_eq!(state.fields.int("size_in_megabytes").unwrap(), Some(4096));
    assert_eq!(h.cloud.calls("update_volume").await, 1);
    assert_eq!(h.cloud.calls("tag_resource").await, 0);
}

// =============================================================================
// Task Sets
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_task_set_create_retries_until_service_visible() {
    let h = Harness::standard();
    h.cloud.add_service("prod", "web").await;
    h.cloud.settle_after(2).await;
    h.cloud
        .fail_next("create_task_set", ApiError::new(SERVICE_NOT_FOUND, "Service not found."))
        .await;
    h.cloud
        .fail_next(
            "create_task_set",
            ApiError::new(
                INVALID_PARAMETER,
                "The service does not have an associated load balancer.",
            ),
        )
        .await;

    let desired = DesiredState::new(task_set_state().with("wait_until_stable", true));
    let response = h.registry.create(task_set::TYPE_NAME, &desired).await;
    assert_ok(&response);

    let id = response.id.unwrap();
    assert!(id.starts_with("ecs-svc/"));
    assert!(id.ends_with(",web,prod"));
    assert_eq!(h.cloud.calls("create_task_set").await, 3);

    let state = response.state.unwrap();
    assert_eq!(state.fields.string("stability_status").unwrap(), Some("STEADY_STATE"));
}

#[tokio::test]
async fn test_task_set_create_stops_on_other_errors() {
    let h = Harness::standard();
    h.cloud.add_service("prod", "web").await;
    h.cloud
        .fail_next(
            "create_task_set",
            ApiError::new(INVALID_PARAMETER, "Task definition does not exist."),
        )
        .await;

    let response = h
        .registry
        .create(task_set::TYPE_NAME, &DesiredState::new(task_set_state()))
        .await;
    assert!(!response.is_ok());
    assert_eq!(response.id, None);
    assert_eq!(h.cloud.calls("create_task_set").await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_task_set_scale_update_and_delete() {
    let h = Harness::standard();
    h.cloud.add_service("prod", "web").await;
    let old = DesiredState::new(task_set_state());
    let response = h.registry.create(task_set::TYPE_NAME, &old).await;
    assert_ok(&response);
    let id = response.id.unwrap();

    let new = DesiredState::new(task_set_state().with(
        "scale",
        Value::block(Fields::new().with("unit", "PERCENT").with("value", 50.0)),
    ));
    let response = h.registry.update(task_set::TYPE_NAME, &id, &old, &new).await;
    assert_ok(&response);
    let scale = response.state.unwrap().fields.block("scale").unwrap().unwrap();
    assert_eq!(scale.float("value").unwrap(), Some(50.0));

    let response = h.registry.delete(task_set::TYPE_NAME, &id, &new).await;
    assert_ok(&response);
    let read = h.registry.read(task_set::TYPE_NAME, &id, None).await;
    assert_ok(&read);
    assert!(read.state.is_none());
}

#[tokio::test]
async fn test_malformed_task_set_identity() {
    let h = Harness::standard();
    let response = h.registry.read(task_set::TYPE_NAME, "ecs-svc/1,web", None).await;
    assert!(!response.is_ok());
    assert!(errors(&response.diagnostics)[0].contains("expected TASK_SET_ID,SERVICE,CLUSTER"));
}

// =============================================================================
// API Gateway
// =============================================================================

#[tokio::test]
async fn test_api_import_keeps_configured_values() {
    let h = Harness::standard();
    let body = r#"{
        "openapi": "3.0.1",
        "info": {"title": "imported", "version": "2.0"},
        "x-amazon-apigateway-cors": {"allowOrigins": ["*"]}
    }"#;
    let desired = DesiredState::new(http_api().with("body", body).with("version", "1.0"))
        .with_tags(TagSet::from([("team", "edge")]));

    let response = h.registry.create(api::TYPE_NAME, &desired).await;
    assert_ok(&response);
    let id = response.id.unwrap();

    let state = response.state.unwrap();
    assert_eq!(state.fields.string("name").unwrap(), Some("gateway"));
    assert_eq!(state.fields.string("version").unwrap(), Some("1.0"));
    assert!(state.fields.block("cors_configuration").unwrap().is_none());
    assert_eq!(
        state.fields.string("arn").unwrap(),
        Some(format!("arn:aws:apigateway:us-east-1::/apis/{}", id).as_str())
    );
    assert_eq!(
        state.fields.string("api_endpoint").unwrap(),
        Some(format!("https://{}.execute-api.us-east-1.amazonaws.com", id).as_str())
    );
    assert_eq!(state.tags, TagSet::from([("team", "edge")]));

    assert_eq!(h.cloud.calls("reimport_api").await, 1);
    assert_eq!(h.cloud.calls("delete_cors_configuration").await, 1);
    assert_eq!(h.cloud.calls("update_api").await, 1);
    assert_eq!(h.cloud.calls("tag_resource").await, 0);
}

#[tokio::test]
async fn test_api_cors_removed_with_separate_call() {
    let h = Harness::standard();
    let old = DesiredState::new(http_api().with(
        "cors_configuration",
        Value::block(
            Fields::new()
                .with("allow_origins", Value::string_list(["https://example.com"]))
                .with("allow_methods", Value::string_list(["GET", "POST"])),
        ),
    ));
    let response = h.registry.create(api::TYPE_NAME, &old).await;
    assert_ok(&response);
    let id = response.id.unwrap();
    let cors = response.state.unwrap().fields.block("cors_configuration").unwrap().unwrap();
    assert_eq!(cors.string_list("allow_methods").unwrap(), vec!["GET", "POST"]);

    let new = DesiredState::new(http_api());
    let response = h.registry.update(api::TYPE_NAME, &id, &old, &new).await;
    assert_ok(&response);
    assert!(response.state.unwrap().fields.block("cors_configuration").unwrap().is_none());
    assert_eq!(h.cloud.calls("delete_cors_configuration").await, 1);
    assert_eq!(h.cloud.calls("update_api").await, 0);
}

#[tokio::test]
async fn test_api_update_and_missing_api() {
    let h = Harness::standard();
    let old = DesiredState::new(http_api());
    let response = h.registry.create(api::TYPE_NAME, &old).await;
    assert_ok(&response);
    let id = response.id.unwrap();

    let new = DesiredState::new(http_api().with("description", "public edge"));
    let response = h.registry.update(api::TYPE_NAME, &id, &old, &new).await;
    assert_ok(&response);
    let state = response.state.unwrap();
    assert_eq!(state.fields.string("description").unwrap(), Some("public edge"));
    assert_eq!(
        state.fields.string("route_selection_expression").unwrap(),
        Some("$request.method $request.path")
    );

    assert_ok(&h.registry.delete(api::TYPE_NAME, &id, &new).await);
    let read = h.registry.read(api::TYPE_NAME, &id, Some(&new)).await;
    assert_ok(&read);
    assert!(read.state.is_none());
}
