//! Integration tests for the DCS resources against a mock cloud

use std::time::Duration;

use huaweictl_core::{Action, ActionInput, Provider, Registry, ResourceState};
use pretty_assertions::assert_eq;
use serde_json::{Map, Value, json};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn provider(server: &MockServer) -> Provider {
    Provider::builder()
        .region("cn-north-4")
        .project_id("p-1")
        .auth_token("token")
        .endpoint("dcs", server.uri())
        .poll_interval(Duration::from_millis(5))
        .build()
        .unwrap()
}

fn config(value: Value) -> Option<Map<String, Value>> {
    value.as_object().cloned()
}

fn state(id: &str, attributes: Value) -> Option<ResourceState> {
    Some(ResourceState {
        id: id.to_string(),
        attributes: attributes.as_object().cloned().unwrap_or_default(),
    })
}

async fn mount_running_instance(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instance_id": "inst-1",
            "status": "RUNNING"
        })))
        .mount(server)
        .await;
}

// ============================================================================
// Busy retry
// ============================================================================

#[tokio::test]
async fn test_account_create_retries_while_instance_busy() {
    let server = MockServer::start().await;
    mount_running_instance(&server).await;

    // first attempt is rejected because another change is in progress
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/inst-1/accounts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4049",
            "error_msg": "instance is being modified"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/inst-1/accounts"))
        .and(body_partial_json(json!({"account_name": "reader"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [{
                "account_id": "acc-1",
                "account_name": "reader",
                "account_type": "normal",
                "account_role": "read",
                "status": "AVAILABLE",
                "description": "reporting"
            }]
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_dcs_account",
            ActionInput {
                config: config(json!({
                    "instance_id": "inst-1",
                    "account_name": "reader",
                    "account_role": "read",
                    "account_password": "Secret#123",
                    "description": "reporting"
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.id, "acc-1");
    assert_eq!(state.attributes["account_role"], "read");
    assert_eq!(state.attributes["status"], "AVAILABLE");
}

#[tokio::test]
async fn test_non_retryable_error_fails_immediately() {
    let server = MockServer::start().await;
    mount_running_instance(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/inst-1/accounts"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4103",
            "error_msg": "invalid password"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let err = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_dcs_account",
            ActionInput {
                config: config(json!({
                    "instance_id": "inst-1",
                    "account_name": "reader",
                    "account_role": "read",
                    "account_password": "weak"
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert_eq!(err.error_code(), Some("DCS.4103"));
    assert!(err.to_string().starts_with("error creating DCS account"));
}

// ============================================================================
// Backups
// ============================================================================

#[tokio::test]
async fn test_backup_create_waits_for_succeed() {
    let server = MockServer::start().await;
    mount_running_instance(&server).await;

    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances/inst-1/backups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "backup_id": "bk-1" })))
        .expect(1)
        .mount(&server)
        .await;

    let record = |status: &str| {
        json!({
            "total_num": 1,
            "backup_record_response": [{
                "backup_id": "bk-1",
                "backup_name": "backup_20240102",
                "remark": "nightly",
                "backup_format": "rdb",
                "backup_type": "manual",
                "size": 1024,
                "status": status,
                "is_support_restore": "TRUE",
                "created_at": "2024-01-02T03:04:05Z",
                "updated_at": "2024-01-02T03:06:05Z"
            }]
        })
    };
    for status in ["waiting", "backuping"] {
        Mock::given(method("GET"))
            .and(path("/v2/p-1/instances/inst-1/backups"))
            .respond_with(ResponseTemplate::new(200).set_body_json(record(status)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
    }
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1/backups"))
        .respond_with(ResponseTemplate::new(200).set_body_json(record("succeed")))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_dcs_backup",
            ActionInput {
                config: config(json!({
                    "instance_id": "inst-1",
                    "description": "nightly",
                    "backup_format": "rdb"
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.id, "bk-1");
    assert_eq!(state.attributes["status"], "succeed");
    assert_eq!(state.attributes["name"], "backup_20240102");
    assert_eq!(state.attributes["description"], "nightly");
}

// ============================================================================
// Not found handling
// ============================================================================

#[tokio::test]
async fn test_migration_task_gone_code_clears_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/migration-task/task-1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4133",
            "error_msg": "migration task does not exist"
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Read,
            "huaweicloud_dcs_backup_import_task",
            ActionInput {
                state: state("task-1", json!({"task_name": "import"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_diagnosis_delete_of_missing_report_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1/diagnosis"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DCS.4800",
            "error_msg": "report not found"
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_diagnosis_task",
            ActionInput {
                state: state("rep-1", json!({"instance_id": "inst-1"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_instance_delete_of_missing_instance_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DCS.4010",
            "error_msg": "instance not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_instance",
            ActionInput {
                state: state("inst-1", json!({"name": "cache", "charging_mode": "postPaid"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_account_delete_of_missing_account_is_not_an_error() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1/accounts/acc-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DCS.4961",
            "error_msg": "account not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_account",
            ActionInput {
                state: state("acc-1", json!({"instance_id": "inst-1", "account_name": "reader"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_migration_task_delete_with_gone_code_clears_state() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/migration-tasks/delete"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4133",
            "error_msg": "migration task does not exist"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_backup_import_task",
            ActionInput {
                state: state("task-1", json!({"task_name": "import"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_instance_delete_failure_names_the_operation() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "error_code": "DCS.4403",
            "error_msg": "forbidden"
        })))
        .mount(&server)
        .await;

    let err = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_instance",
            ActionInput {
                state: state("inst-1", json!({"name": "cache"})),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();

    assert!(
        err.to_string().starts_with("error deleting DCS instance (inst-1)"),
        "unexpected error: {}",
        err
    );
}

// ============================================================================
// Instance lifecycle
// ============================================================================

fn instance_body(status: &str) -> Value {
    json!({
        "instance_id": "inst-1",
        "name": "cache",
        "engine": "Redis",
        "engine_version": "5.0",
        "spec_code": "redis.ha.xu1.tiny.r2.128",
        "capacity": 0.125,
        "ip": "192.168.0.10",
        "port": 6379,
        "vpc_id": "vpc-1",
        "subnet_id": "subnet-1",
        "az_codes": ["cn-north-4a"],
        "charging_mode": 0,
        "status": status
    })
}

#[tokio::test]
async fn test_instance_create_waits_for_running() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/p-1/instances"))
        .and(body_partial_json(json!({
            "name": "cache",
            "spec_code": "redis.ha.xu1.tiny.r2.128",
            "az_codes": ["cn-north-4a"],
            "bss_param": {"charging_mode": "postPaid"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instances": [{"instance_id": "inst-1", "instance_name": "cache"}]
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("CREATING")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    // two confirmations while waiting, then the final read
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("RUNNING")))
        .expect(3..)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_dcs_instance",
            ActionInput {
                config: config(json!({
                    "name": "cache",
                    "engine": "Redis",
                    "engine_version": "5.0",
                    "capacity": 0.125,
                    "flavor": "redis.ha.xu1.tiny.r2.128",
                    "availability_zones": ["cn-north-4a"],
                    "vpc_id": "vpc-1",
                    "subnet_id": "subnet-1",
                    "password": "Secret#2024"
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.id, "inst-1");
    assert_eq!(state.attributes["status"], "RUNNING");
    assert_eq!(state.attributes["private_ip"], "192.168.0.10");
    assert_eq!(state.attributes["charging_mode"], "postPaid");
}

#[tokio::test]
async fn test_instance_delete_retries_while_busy_then_waits_for_deleted() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4049",
            "error_msg": "instance is being modified"
        })))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    // RUNNING once before the retry, gone afterwards
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(instance_body("RUNNING")))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DCS.4010",
            "error_msg": "instance not found"
        })))
        .expect(2..)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_dcs_instance",
            ActionInput {
                state: state("inst-1", json!({"name": "cache", "charging_mode": "postPaid"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_instance_read_after_404_clears_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "DCS.4010",
            "error_msg": "instance not found"
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Read,
            "huaweicloud_dcs_instance",
            ActionInput {
                state: state("inst-1", json!({"name": "cache"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

// ============================================================================
// Import
// ============================================================================

#[tokio::test]
async fn test_account_import_then_read() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances/inst-1/accounts"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accounts": [
                {"account_id": "acc-0", "account_name": "default", "account_type": "default", "status": "AVAILABLE"},
                {"account_id": "acc-1", "account_name": "reader", "account_type": "normal", "account_role": "read", "status": "AVAILABLE"}
            ]
        })))
        .mount(&server)
        .await;

    let registry = Registry::builtin();
    let provider = provider(&server);
    let imported = registry
        .run(
            &provider,
            Action::Import,
            "huaweicloud_dcs_account",
            ActionInput {
                id: Some("inst-1/acc-1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .state
        .unwrap();

    assert_eq!(imported.id, "acc-1");
    assert_eq!(imported.attributes["instance_id"], "inst-1");
    assert_eq!(imported.attributes["account_name"], "reader");

    let refreshed = registry
        .run(
            &provider,
            Action::Read,
            "huaweicloud_dcs_account",
            ActionInput {
                state: Some(imported.clone()),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .state
        .unwrap();
    assert_eq!(refreshed, imported);
}

#[tokio::test]
async fn test_import_rejects_malformed_id() {
    let server = MockServer::start().await;
    let err = Registry::builtin()
        .run(
            &provider(&server),
            Action::Import,
            "huaweicloud_dcs_backup",
            ActionInput {
                id: Some("bk-1".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.to_string().contains("<instance_id>/<id>"));
}

// ============================================================================
// Data sources
// ============================================================================

#[tokio::test]
async fn test_instances_data_source_filters() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v2/p-1/instances"))
        .and(query_param("status", "RUNNING"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "instance_num": 2,
            "instances": [
                {"instance_id": "inst-1", "name": "a", "engine_version": "5.0", "status": "RUNNING", "capacity": 1, "ip": "192.168.0.10", "port": 6379},
                {"instance_id": "inst-2", "name": "b", "engine_version": "6.0", "status": "RUNNING", "capacity": 2, "ip": "192.168.0.11", "port": 6379}
            ]
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::ReadData,
            "huaweicloud_dcs_instances",
            ActionInput {
                config: config(json!({"status": "RUNNING", "engine_version": "6.0"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    let instances = state.attributes["instances"].as_array().unwrap();
    assert_eq!(instances.len(), 1);
    assert_eq!(instances[0]["id"], "inst-2");
    assert_eq!(instances[0]["private_ip"], "192.168.0.11");
}
