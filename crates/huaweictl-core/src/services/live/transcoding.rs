//! `huaweicloud_live_transcoding`
//!
//! One transcoding template set per `<domain>/<app_name>`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::{SERVICE, app_id};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{parse_import_id, path_search, remove_nil, value_ignore_empty};

const TEMPLATE_PATH: &str = "v1/{project_id}/template/transcodings";

pub struct LiveTranscoding;

fn quality_info(d: &ResourceData) -> Vec<Value> {
    let codec = d.get_str("video_encoding");
    d.get_list("templates")
        .iter()
        .map(|t| {
            remove_nil(json!({
                "templateName": t["name"],
                "quality": "userdefine",
                "codec": value_ignore_empty(json!(codec)),
                "width": t["width"],
                "height": t["height"],
                "bitrate": t["bitrate"],
                "video_frame_rate": value_ignore_empty(t["frame_rate"].clone()),
                "protocol": value_ignore_empty(t["protocol"].clone()),
                "hdlb": if t["low_bitrate_hd"].as_bool() == Some(true) { "on" } else { "off" },
                "gop": value_ignore_empty(t["gop"].clone()),
                "bitrate_adaptive": value_ignore_empty(t["bitrate_adaptive"].clone()),
                "i_frame_policy": value_ignore_empty(t["i_frame_policy"].clone()),
            }))
        })
        .collect()
}

fn template_body(d: &ResourceData) -> Result<Value> {
    Ok(json!({
        "domain": d.require_str("domain_name")?,
        "app_name": d.require_str("app_name")?,
        "trans_type": d.get_str_opt("trans_type").unwrap_or_else(|| "play".to_string()),
        "quality_info": quality_info(d),
    }))
}

fn flatten_templates(qualities: &Value) -> Vec<Value> {
    qualities
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|q| {
                    json!({
                        "name": q["templateName"],
                        "width": q["width"],
                        "height": q["height"],
                        "bitrate": q["bitrate"],
                        "frame_rate": q["video_frame_rate"],
                        "protocol": q["protocol"],
                        "low_bitrate_hd": q["hdlb"].as_str() == Some("on"),
                        "gop": q["gop"],
                        "bitrate_adaptive": q["bitrate_adaptive"],
                        "i_frame_policy": q["i_frame_policy"],
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

async fn put_templates(live: &ServiceClient, method: reqwest::Method, body: Value) -> Result<()> {
    live.send(&ApiRequest::new(method, TEMPLATE_PATH).body(body)).await?;
    Ok(())
}

#[async_trait]
impl Resource for LiveTranscoding {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_transcoding"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        put_templates(&live, reqwest::Method::POST, template_body(d)?)
            .await
            .with_context(|| "error creating Live transcoding".to_string())?;
        let id = app_id(d);
        d.set_id(&id);
        info!("Created Live transcoding {}", id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get(TEMPLATE_PATH)
            .query("domain", d.get_str("domain_name"))
            .query("app_name", d.get_str("app_name"));
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live transcoding"),
        };
        let template = path_search("templates|[0]", &body);
        if template.is_null() {
            mark_gone(d, "error retrieving Live transcoding");
            return Ok(());
        }

        d.set("region", provider.region());
        d.set("domain_name", template["domain"].clone());
        d.set("app_name", template["app_name"].clone());
        d.set("trans_type", template["trans_type"].clone());
        d.set("video_encoding", path_search("quality_info[0].codec", &template));
        d.set("templates", flatten_templates(&template["quality_info"]));
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        put_templates(&live, reqwest::Method::PUT, template_body(d)?)
            .await
            .with_context(|| format!("error updating Live transcoding ({})", d.id()))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::delete(TEMPLATE_PATH)
            .query("domain", d.get_str("domain_name"))
            .query("app_name", d.get_str("app_name"));
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live transcoding");
        }
        info!("Deleted Live transcoding {}", d.id());
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
