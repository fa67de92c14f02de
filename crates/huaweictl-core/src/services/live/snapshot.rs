//! `huaweicloud_live_snapshot`

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{SERVICE, app_id};
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{parse_import_id, path_search, remove_nil, value_ignore_empty};

const SNAPSHOT_PATH: &str = "v1/{project_id}/stream/snapshot";

pub struct LiveSnapshot;

fn snapshot_body(d: &ResourceData, region: &str) -> Result<Value> {
    let callback = d.get_bool("call_back_enabled");
    Ok(remove_nil(json!({
        "domain": d.require_str("domain_name")?,
        "app_name": d.require_str("app_name")?,
        "time_interval": d.get_i64("frequency"),
        "object_write_mode": d.get_i64("storage_mode"),
        "obs_location": {
            "bucket": d.require_str("storage_bucket")?,
            "location": region,
            "object": d.require_str("storage_path")?,
        },
        "call_back_enable": if callback { "on" } else { "off" },
        "call_back_url": value_ignore_empty(json!(d.get_str("call_back_url"))),
    })))
}

#[async_trait]
impl Resource for LiveSnapshot {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_snapshot"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::post(SNAPSHOT_PATH).body(snapshot_body(d, provider.region())?);
        live.send(&request)
            .await
            .with_context(|| "error creating Live snapshot".to_string())?;
        let id = app_id(d);
        d.set_id(&id);
        info!("Created Live snapshot {}", id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get(SNAPSHOT_PATH)
            .query("domain", d.get_str("domain_name"))
            .query("app_name", d.get_str("app_name"));
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live snapshot"),
        };
        let snapshot = path_search("snapshot_config_list|[0]", &body);
        if snapshot.is_null() {
            mark_gone(d, "error retrieving Live snapshot");
            return Ok(());
        }

        d.set("region", provider.region());
        d.set("domain_name", snapshot["domain"].clone());
        d.set("app_name", snapshot["app_name"].clone());
        d.set("frequency", snapshot["time_interval"].clone());
        d.set("storage_mode", snapshot["object_write_mode"].clone());
        d.set("storage_bucket", path_search("obs_location.bucket", &snapshot));
        d.set("storage_path", path_search("obs_location.object", &snapshot));
        d.set("call_back_enabled", snapshot["call_back_enable"].as_str() == Some("on"));
        d.set("call_back_url", snapshot["call_back_url"].clone());
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::put(SNAPSHOT_PATH).body(snapshot_body(d, provider.region())?);
        live.send(&request)
            .await
            .with_context(|| format!("error updating Live snapshot ({})", d.id()))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::delete(SNAPSHOT_PATH)
            .query("domain", d.get_str("domain_name"))
            .query("app_name", d.get_str("app_name"));
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live snapshot");
        }
        info!("Deleted Live snapshot {}", d.id());
        d.set_id("");
        Ok(())
    }

    async fn import(&self, _provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let parts = parse_import_id(d.id(), 2, "<domain_name>/<app_name>")?;
        d.set("domain_name", parts[0].clone());
        d.set("app_name", parts[1].clone());
        Ok(())
    }
}
