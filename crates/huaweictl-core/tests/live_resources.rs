//! Integration tests for the Live resources against a mock cloud

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
        .endpoint("live", server.uri())
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

fn domain_info(status: &str) -> Value {
    json!({
        "domain_info": [{
            "domain": "push.example.com",
            "domain_type": "push",
            "domain_cname": "push.example.com.c.cdnhwc1.com",
            "region": "cn-north-4",
            "status": status,
            "service_area": "mainland_china",
            "is_ipv6": false,
            "create_time": "2024-01-02T03:04:05Z"
        }]
    })
}

// ============================================================================
// Domains
// ============================================================================

#[tokio::test]
async fn test_push_domain_create_waits_until_on() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/domain"))
        .and(body_partial_json(json!({
            "domain": "push.example.com",
            "domain_type": "push",
            "region": "cn-north-4"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/domain"))
        .and(query_param("domain", "push.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(domain_info("configuring")))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/domain"))
        .and(query_param("domain", "push.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(domain_info("on")))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_live_domain",
            ActionInput {
                config: config(json!({
                    "name": "push.example.com",
                    "type": "push",
                    "service_area": "mainland_china"
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.id, "push.example.com");
    assert_eq!(state.attributes["name"], "push.example.com");
    assert_eq!(state.attributes["status"], "on");
    assert_eq!(state.attributes["cname"], "push.example.com.c.cdnhwc1.com");
}

#[tokio::test]
async fn test_domain_read_of_unknown_domain_clears_state() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/domain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "domain_info": [] })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Read,
            "huaweicloud_live_domain",
            ActionInput {
                state: state("push.example.com", json!({"name": "push.example.com"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_domains_data_source_filters_by_type() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/domain"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domain_info": [
                {"domain": "push.example.com", "domain_type": "push", "status": "on"},
                {"domain": "play.example.com", "domain_type": "pull", "status": "on", "related_domain": "push.example.com"}
            ]
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::ReadData,
            "huaweicloud_live_domains",
            ActionInput {
                config: config(json!({"type": "pull"})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    let domains = state.attributes["domains"].as_array().unwrap();
    assert_eq!(domains.len(), 1);
    assert_eq!(domains[0]["name"], "play.example.com");
    assert_eq!(domains[0]["ingest_domain_name"], "push.example.com");
}

// ============================================================================
// Channels
// ============================================================================

#[tokio::test]
async fn test_channel_create_then_read_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/p-1/ott/channels"))
        .and(body_partial_json(json!({
            "id": "ch-1",
            "domain": "play.example.com",
            "app_name": "live",
            "input": {"input_protocol": "RTMP_PUSH"}
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"result": "SUCCESS"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/ott/channels"))
        .and(query_param("id", "ch-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "total": 1,
            "channels": [{
                "id": "ch-1",
                "domain": "play.example.com",
                "app_name": "live",
                "name": "news",
                "state": "ON",
                "input": {"input_protocol": "RTMP_PUSH"},
                "encoder_settings": [{"template_id": "t-1"}]
            }]
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Create,
            "huaweicloud_live_channel",
            ActionInput {
                config: config(json!({
                    "channel_id": "ch-1",
                    "domain_name": "play.example.com",
                    "app_name": "live",
                    "name": "news",
                    "state": "ON",
                    "input": [{"input_protocol": "RTMP_PUSH"}],
                    "encoder_settings": [{"template_id": "t-1"}]
                })),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.id, "ch-1");
    assert_eq!(state.attributes["domain_name"], "play.example.com");
    assert_eq!(state.attributes["input"], json!([{"input_protocol": "RTMP_PUSH"}]));
    assert_eq!(state.attributes["state"], "ON");
}

#[tokio::test]
async fn test_channel_delete_of_missing_channel_clears_state() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/v1/p-1/ott/channels"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "error_code": "LIVE.100011001",
            "error_msg": "channel not found"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_live_channel",
            ActionInput {
                state: state(
                    "ch-1",
                    json!({"domain_name": "play.example.com", "app_name": "live", "state": "OFF"}),
                ),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

// ============================================================================
// Guard settings
// ============================================================================

#[tokio::test]
async fn test_ip_acl_delete_resets_auth_type() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/v1/p-1/guard/ip"))
        .and(body_partial_json(json!({
            "domain": "play.example.com",
            "auth_type": "NONE"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Delete,
            "huaweicloud_live_ip_acl",
            ActionInput {
                state: state(
                    "play.example.com",
                    json!({"domain_name": "play.example.com", "auth_type": "WHITE", "ip_auth_list": ["10.0.0.1"]}),
                ),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert!(outcome.state.is_none());
}

#[tokio::test]
async fn test_ip_acl_read_splits_address_list() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/p-1/guard/ip"))
        .and(query_param("domain", "play.example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "domain": "play.example.com",
            "auth_type": "BLACK",
            "ip_auth_list": "10.0.0.1;10.0.1.0/24"
        })))
        .mount(&server)
        .await;

    let outcome = Registry::builtin()
        .run(
            &provider(&server),
            Action::Read,
            "huaweicloud_live_ip_acl",
            ActionInput {
                state: state("play.example.com", json!({})),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let state = outcome.state.unwrap();
    assert_eq!(state.attributes["auth_type"], "BLACK");
    assert_eq!(state.attributes["ip_auth_list"], json!(["10.0.0.1", "10.0.1.0/24"]));
}
