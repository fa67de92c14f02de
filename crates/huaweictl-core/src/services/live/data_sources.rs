//! `huaweicloud_live_channels` and `huaweicloud_live_domains`

use async_trait::async_trait;
use serde_json::{Value, json};

use super::SERVICE;
use super::channel::from_api;
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::DataSource;
use crate::schema::ResourceData;
use crate::utils::{list_all_items, search_array};

const CHANNEL_PAGE_SIZE: usize = 100;

pub struct LiveChannels;

fn flatten_channel(channel: &Value) -> Value {
    let channel = from_api(channel);
    json!({
        "id": channel["id"],
        "name": channel["name"],
        "domain_name": channel["domain"],
        "app_name": channel["app_name"],
        "state": channel["state"],
        "input": channel["input"],
        "encoder_settings": channel["encoder_settings"],
        "record_settings": channel["record_settings"],
        "endpoints": channel["endpoints"],
        "encoder_settings_expand": channel["encoder_settings_expand"],
    })
}

#[async_trait]
impl DataSource for LiveChannels {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_channels"
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get("v1/{project_id}/ott/channels")
            .query_opt("domain", d.get_str_opt("domain_name").as_deref())
            .query_opt("app_name", d.get_str_opt("app_name").as_deref())
            .query_opt("id", d.get_str_opt("channel_id").as_deref());
        let channels = list_all_items(&live, &request, "channels", CHANNEL_PAGE_SIZE)
            .await
            .with_context(|| "error retrieving Live channels".to_string())?;

        d.set_id(uuid::Uuid::new_v4().to_string());
        d.set("region", provider.region());
        d.set("channels", channels.iter().map(flatten_channel).collect::<Vec<_>>());
        Ok(())
    }
}

pub struct LiveDomains;

#[async_trait]
impl DataSource for LiveDomains {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_domains"
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get("v1/{project_id}/domain")
            .query_opt("domain", d.get_str_opt("name").as_deref())
            .query_opt("enterprise_project_id", d.get_str_opt("enterprise_project_id").as_deref());
        let body = live
            .send(&request)
            .await
            .with_context(|| "error retrieving Live domains".to_string())?
            .body;

        let filters: Vec<(&str, String)> = [("domain_type", "type"), ("status", "status")]
            .into_iter()
            .filter_map(|(key, attr)| d.get_str_opt(attr).map(|v| (key, v)))
            .collect();
        let domains: Vec<Value> = search_array("domain_info", &body)
            .into_iter()
            .filter(|domain| filters.iter().all(|(k, v)| domain[*k].as_str() == Some(v.as_str())))
            .map(|domain| {
                json!({
                    "name": domain["domain"],
                    "type": domain["domain_type"],
                    "cname": domain["domain_cname"],
                    "status": domain["status"],
                    "ingest_domain_name": domain["related_domain"],
                    "service_area": domain["service_area"],
                    "enterprise_project_id": domain["enterprise_project_id"],
                    "is_ipv6": domain["is_ipv6"],
                    "created_at": domain["create_time"],
                })
            })
            .collect();

        d.set_id(uuid::Uuid::new_v4().to_string());
        d.set("region", provider.region());
        d.set("domains", domains);
        Ok(())
    }
}
