//! `huaweicloud_live_referer_validation`

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::SERVICE;
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};

const REFERER_PATH: &str = "v1/{project_id}/guard/referer-chain";

pub struct LiveRefererValidation;

fn referer_body(d: &ResourceData) -> Result<Value> {
    let whitelist = d.get_str_opt("type").is_none_or(|t| t == "white");
    Ok(json!({
        "domain": d.require_str("domain_name")?,
        "guard_switch": "true",
        "referer_config_empty": d.get_bool("referer_config_empty").to_string(),
        "referer_white_list": whitelist.to_string(),
        "referer_auth_list": d.get_string_list("referer_auth_list"),
    }))
}

#[async_trait]
impl Resource for LiveRefererValidation {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_referer_validation"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::put(REFERER_PATH).body(referer_body(d)?);
        live.send(&request)
            .await
            .with_context(|| "error creating Live referer validation".to_string())?;
        let domain = d.get_str("domain_name");
        d.set_id(&domain);
        info!("Enabled referer validation on Live domain {}", domain);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get(REFERER_PATH).query("domain", d.id());
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live referer validation"),
        };
        // a domain without a referer chain reports the switch as off
        if body["guard_switch"].as_str() != Some("true") {
            mark_gone(d, "error retrieving Live referer validation");
            return Ok(());
        }

        let whitelist = body["referer_white_list"].as_str() == Some("true");
        d.set("region", provider.region());
        d.set("domain_name", body["domain"].clone());
        d.set("type", if whitelist { "white" } else { "black" });
        d.set("referer_config_empty", body["referer_config_empty"].as_str() == Some("true"));
        d.set("referer_auth_list", body["referer_auth_list"].clone());
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::put(REFERER_PATH).body(referer_body(d)?);
        live.send(&request)
            .await
            .with_context(|| format!("error updating Live referer validation ({})", d.id()))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::delete(REFERER_PATH).query("domain", d.id());
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live referer validation");
        }
        info!("Removed referer validation from Live domain {}", d.id());
        d.set_id("");
        Ok(())
    }

    async fn import(&self, _provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let domain = d.id().to_string();
        d.set("domain_name", domain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_referer_body_uses_string_flags() {
        let d = ResourceData::new(
            json!({
                "domain_name": "play.example.com",
                "type": "black",
                "referer_config_empty": true,
                "referer_auth_list": ["bad.example.com"]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let body = referer_body(&d).unwrap();
        assert_eq!(body["referer_white_list"], "false");
        assert_eq!(body["referer_config_empty"], "true");
        assert_eq!(body["referer_auth_list"], json!(["bad.example.com"]));
    }
}
