//! `huaweicloud_live_url_authentication`
//!
//! URL signing keys of a domain, managed through the key-chain API.

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use super::SERVICE;
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::path_search;

const KEY_CHAIN_PATH: &str = "v1/{project_id}/guard/key-chain";

pub struct LiveUrlAuthentication;

fn key_chain_request(d: &ResourceData, domain: &str) -> Result<ApiRequest> {
    Ok(ApiRequest::put(KEY_CHAIN_PATH).query("domain", domain).body(json!({
        "key": d.require_str("key")?,
        "auth_type": d.require_str("auth_type")?,
        "timeout": d.get_i64("timeout"),
    })))
}

#[async_trait]
impl Resource for LiveUrlAuthentication {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_url_authentication"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let domain = d.require_str("domain_name")?;
        live.send(&key_chain_request(d, &domain)?)
            .await
            .with_context(|| "error creating Live URL authentication".to_string())?;
        d.set_id(&domain);
        info!("Configured URL authentication on Live domain {}", domain);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get(KEY_CHAIN_PATH).query("domain", d.id());
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live URL authentication"),
        };
        let key_chain = path_search("key_chain|[0]", &body);
        if key_chain.is_null() {
            mark_gone(d, "error retrieving Live URL authentication");
            return Ok(());
        }

        let domain = d.id().to_string();
        d.set("region", provider.region());
        d.set("domain_name", domain);
        for attr in ["key", "auth_type", "timeout"] {
            d.set(attr, key_chain[attr].clone());
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let domain = d.id().to_string();
        live.send(&key_chain_request(d, &domain)?)
            .await
            .with_context(|| format!("error updating Live URL authentication ({})", domain))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::delete(KEY_CHAIN_PATH).query("domain", d.id());
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live URL authentication");
        }
        info!("Removed URL authentication from Live domain {}", d.id());
        d.set_id("");
        Ok(())
    }

    async fn import(&self, _provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let domain = d.id().to_string();
        d.set("domain_name", domain);
        Ok(())
    }
}
