//! `huaweicloud_live_recording`

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::SERVICE;
use crate::client::ApiRequest;
use crate::error::{CoreError, Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted};
use crate::utils::{as_block, remove_nil, search_string, single_block, value_ignore_empty};

pub struct LiveRecording;

/// State block name and API format name of each recording format
const FORMATS: &[(&str, &str)] = &[("hls", "HLS"), ("flv", "FLV"), ("mp4", "MP4")];

fn rule_request(method: reqwest::Method, id: &str) -> ApiRequest {
    ApiRequest::new(method, "v1/{project_id}/record/rules/{id}").path_param("id", id)
}

/// Recording lengths are configured in minutes and sent in seconds
fn format_config(block: &Value, name: &str) -> Value {
    let minutes = block["recording_length"].as_i64().unwrap_or(0);
    let mut config = json!({
        "record_cycle": minutes * 60,
        "record_prefix": value_ignore_empty(block["file_naming"].clone()),
        "record_max_duration_to_merge_file": block["max_stream_pause_length"].clone(),
    });
    if name == "hls" {
        config["record_ts_prefix"] = value_ignore_empty(block["ts_file_naming"].clone());
        config["record_slice_duration"] = value_ignore_empty(block["record_slice_duration"].clone());
    }
    config
}

fn flatten_format(config: &Value, name: &str) -> Value {
    if config.is_null() {
        return json!([]);
    }
    let mut block = json!({
        "recording_length": config["record_cycle"].as_i64().unwrap_or(0) / 60,
        "file_naming": config["record_prefix"],
        "max_stream_pause_length": config["record_max_duration_to_merge_file"],
    });
    if name == "hls" {
        block["ts_file_naming"] = config["record_ts_prefix"].clone();
        block["record_slice_duration"] = config["record_slice_duration"].clone();
    }
    as_block(block)
}

fn rule_body(d: &ResourceData) -> Result<Value> {
    let obs = single_block(d.get("obs"));
    if obs.is_null() {
        return Err(CoreError::Validation("'obs' is required".to_string()));
    }

    let mut record_config = json!({
        "obs_addr": {
            "bucket": obs["bucket"],
            "location": obs["region"],
            "object": obs["object"],
        },
    });
    let mut formats = Vec::new();
    for (name, api_name) in FORMATS {
        let block = single_block(d.get(name));
        if block.is_null() {
            continue;
        }
        formats.push(*api_name);
        record_config[format!("{}_config", name)] = format_config(&block, name);
    }
    if formats.is_empty() {
        return Err(CoreError::Validation(
            "at least one of 'hls', 'flv' or 'mp4' must be configured".to_string(),
        ));
    }
    record_config["record_format"] = json!(formats);

    Ok(remove_nil(json!({
        "publish_domain": d.require_str("domain_name")?,
        "app": d.require_str("app_name")?,
        "stream": d.get_str_opt("stream_name").unwrap_or_else(|| "*".to_string()),
        "record_type": value_ignore_empty(json!(d.get_str("type"))),
        "default_record_config": record_config,
    })))
}

#[async_trait]
impl Resource for LiveRecording {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_recording"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::post("v1/{project_id}/record/rules").body(rule_body(d)?);
        let body = live
            .send(&request)
            .await
            .with_context(|| "error creating Live recording rule".to_string())?
            .body;
        let id = search_string("id", &body).ok_or_else(|| {
            CoreError::TaskFailed("error creating Live recording rule: id is not found in API response".to_string())
        })?;
        d.set_id(&id);
        info!("Created Live recording rule {}", id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let rule = match live.send(&rule_request(reqwest::Method::GET, d.id())).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live recording rule"),
        };

        let config = &rule["default_record_config"];
        d.set("region", provider.region());
        d.set("domain_name", rule["publish_domain"].clone());
        d.set("app_name", rule["app"].clone());
        d.set("stream_name", rule["stream"].clone());
        d.set("type", rule["record_type"].clone());
        d.set(
            "obs",
            as_block(json!({
                "bucket": config["obs_addr"]["bucket"],
                "region": config["obs_addr"]["location"],
                "object": config["obs_addr"]["object"],
            })),
        );
        for (name, _) in FORMATS {
            d.set(name, flatten_format(&config[format!("{}_config", name)], name));
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = rule_request(reqwest::Method::PUT, d.id()).body(rule_body(d)?);
        live.send(&request)
            .await
            .with_context(|| format!("error updating Live recording rule ({})", d.id()))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        if let Err(e) = live.send(&rule_request(reqwest::Method::DELETE, d.id())).await {
            return check_deleted(d, e, "error deleting Live recording rule");
        }
        info!("Deleted Live recording rule {}", d.id());
        d.set_id("");
        Ok(())
    }
}
