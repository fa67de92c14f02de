//! `huaweicloud_live_channel`
//!
//! OTT channels. Configuration blocks are kept as lists in state while the
//! API takes several of them as plain objects, so bodies and responses go
//! through [`to_api`] and [`from_api`].

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::info;

use super::SERVICE;
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{compact, path_search, remove_nil, value_ignore_empty};

/// Blocks that hold at most one item and are sent as objects
const SINGLE_BLOCKS: &[&str] = &[
    "input",
    "failover_conditions",
    "selector_settings",
    "audio_language_selection",
    "audio_pid_selection",
    "audio_hls_selection",
    "record_settings",
    "encryption",
    "request_args",
    "encoder_settings_expand",
];

const STATE_ON: &str = "ON";
const STATE_OFF: &str = "OFF";

pub struct LiveChannel;

/// State layout to API layout: single-item lists become objects
fn to_api(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::Array(items) if SINGLE_BLOCKS.contains(&k.as_str()) => {
                            items.first().map(to_api).unwrap_or(Value::Null)
                        }
                        other => to_api(other),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(to_api).collect()),
        other => other.clone(),
    }
}

/// API layout to state layout: single objects become one-item lists
pub(super) fn from_api(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    let v = match v {
                        Value::Object(_) if SINGLE_BLOCKS.contains(&k.as_str()) => {
                            Value::Array(vec![from_api(v)])
                        }
                        other => from_api(other),
                    };
                    (k.clone(), v)
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(from_api).collect()),
        other => other.clone(),
    }
}

/// Block attribute in API layout, empty parts dropped
fn block(d: &ResourceData, key: &str) -> Value {
    let Some(value) = d.get(key) else {
        return Value::Null;
    };
    let mut wrapper = Map::new();
    wrapper.insert(key.to_string(), value.clone());
    compact(to_api(&Value::Object(wrapper)))
        .get(key)
        .cloned()
        .unwrap_or(Value::Null)
}

fn channel_key(d: &ResourceData) -> Value {
    json!({
        "domain": d.get_str("domain_name"),
        "app_name": d.get_str("app_name"),
        "id": d.id(),
    })
}

fn create_body(d: &ResourceData, id: &str) -> Value {
    remove_nil(json!({
        "domain": d.get_str("domain_name"),
        "app_name": d.get_str("app_name"),
        "state": d.get_str("state"),
        "input": block(d, "input"),
        "record_settings": block(d, "record_settings"),
        "endpoints": block(d, "endpoints"),
        "encoder_settings_expand": block(d, "encoder_settings_expand"),
        "encoder_settings": block(d, "encoder_settings"),
        "name": value_ignore_empty(json!(d.get_str("name"))),
        "id": id,
    }))
}

/// PUT one section of the channel configuration
async fn put_section(live: &ServiceClient, d: &ResourceData, section: &str, fields: Value) -> Result<()> {
    let mut body = channel_key(d);
    if let (Value::Object(target), Value::Object(extra)) = (&mut body, fields) {
        target.extend(extra);
    }
    let request = ApiRequest::put(format!("v1/{{project_id}}/ott/channels/{}", section))
        .body(remove_nil(body));
    live.send(&request).await?;
    Ok(())
}

async fn set_state(live: &ServiceClient, d: &ResourceData, state: &str) -> Result<()> {
    put_section(live, d, "state", json!({ "state": state })).await
}

#[async_trait]
impl Resource for LiveChannel {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_channel"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(10, 10, 10)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let id = d
            .get_str_opt("channel_id")
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let request = ApiRequest::post("v1/{project_id}/ott/channels").body(create_body(d, &id));
        live.send(&request)
            .await
            .with_context(|| "error creating Live channel".to_string())?;
        d.set_id(&id);
        info!("Created Live channel {}", id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get("v1/{project_id}/ott/channels").query("id", d.id());
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live channel"),
        };

        // an unknown ID yields an empty list rather than a 404
        let channel = path_search("channels|[0]", &body);
        if channel.is_null() {
            mark_gone(d, "error retrieving Live channel");
            return Ok(());
        }
        let channel = from_api(&channel);

        d.set("region", provider.region());
        d.set("domain_name", channel["domain"].clone());
        d.set("channel_id", channel["id"].clone());
        for attr in [
            "app_name",
            "name",
            "state",
            "input",
            "encoder_settings",
            "record_settings",
            "endpoints",
            "encoder_settings_expand",
        ] {
            d.set(attr, channel[attr].clone());
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;

        if d.has_changes(&["encoder_settings", "encoder_settings_expand"]) {
            let fields = json!({
                "encoder_settings": block(d, "encoder_settings"),
                "encoder_settings_expand": block(d, "encoder_settings_expand"),
            });
            put_section(&live, d, "encorder-settings", fields)
                .await
                .with_context(|| "error updating Live channel encoder settings".to_string())?;
        }
        if d.has_change("endpoints") {
            put_section(&live, d, "endpoints", json!({ "endpoints": block(d, "endpoints") }))
                .await
                .with_context(|| "error updating Live channel endpoints".to_string())?;
        }
        if d.has_change("name") {
            let fields = json!({ "name": value_ignore_empty(json!(d.get_str("name"))) });
            put_section(&live, d, "general", fields)
                .await
                .with_context(|| "error updating Live channel general configuration".to_string())?;
        }
        if d.has_change("input") {
            put_section(&live, d, "input", json!({ "input": block(d, "input") }))
                .await
                .with_context(|| "error updating Live channel input".to_string())?;
        }
        if d.has_change("record_settings") {
            let fields = json!({ "record_settings": block(d, "record_settings") });
            put_section(&live, d, "record-settings", fields)
                .await
                .with_context(|| "error updating Live channel record settings".to_string())?;
        }
        if d.has_change("state") {
            set_state(&live, d, &d.get_str("state"))
                .await
                .with_context(|| "error updating Live channel state".to_string())?;
        }

        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;

        if d.get_str("state") == STATE_ON {
            set_state(&live, d, STATE_OFF)
                .await
                .with_context(|| "error closing Live channel before deletion".to_string())?;
        }

        // any unknown query parameter is answered with a 404
        let request = ApiRequest::delete("v1/{project_id}/ott/channels")
            .query("domain", d.get_str("domain_name"))
            .query("app_name", d.get_str("app_name"))
            .query("id", d.id());
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live channel");
        }
        info!("Deleted Live channel {}", d.id());
        d.set_id("");
        Ok(())
    }
}
