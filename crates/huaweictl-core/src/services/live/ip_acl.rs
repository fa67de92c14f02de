//! `huaweicloud_live_ip_acl`
//!
//! The ACL always exists on a domain; deleting the resource resets its
//! type to `NONE`.

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::SERVICE;
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};

const IP_ACL_PATH: &str = "v1/{project_id}/guard/ip";
const AUTH_TYPE_NONE: &str = "NONE";

pub struct LiveIpAcl;

fn acl_body(domain: &str, auth_type: &str, ips: &[String]) -> Value {
    json!({
        "domain": domain,
        "auth_type": auth_type,
        "ip_auth_list": ips.join(";"),
    })
}

/// `"1.1.1.1;2.2.2.0/24"` to a list
fn split_ips(list: &Value) -> Vec<String> {
    list.as_str()
        .map(|s| {
            s.split(';')
                .map(str::trim)
                .filter(|ip| !ip.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Resource for LiveIpAcl {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_ip_acl"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(5, 5, 5)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let domain = d.require_str("domain_name")?;
        let body = acl_body(&domain, &d.require_str("auth_type")?, &d.get_string_list("ip_auth_list"));
        live.send(&ApiRequest::put(IP_ACL_PATH).body(body))
            .await
            .with_context(|| "error creating Live IP ACL".to_string())?;
        d.set_id(&domain);
        info!("Configured IP ACL on Live domain {}", domain);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let request = ApiRequest::get(IP_ACL_PATH).query("domain", d.id());
        let body = match live.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving Live IP ACL"),
        };
        let auth_type = body["auth_type"].as_str().unwrap_or(AUTH_TYPE_NONE);
        if auth_type == AUTH_TYPE_NONE {
            mark_gone(d, "error retrieving Live IP ACL");
            return Ok(());
        }

        d.set("region", provider.region());
        d.set("domain_name", body["domain"].clone());
        d.set("auth_type", auth_type);
        d.set("ip_auth_list", split_ips(&body["ip_auth_list"]));
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let body = acl_body(d.id(), &d.require_str("auth_type")?, &d.get_string_list("ip_auth_list"));
        live.send(&ApiRequest::put(IP_ACL_PATH).body(body))
            .await
            .with_context(|| format!("error updating Live IP ACL ({})", d.id()))?;
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let body = acl_body(d.id(), AUTH_TYPE_NONE, &[]);
        if let Err(e) = live.send(&ApiRequest::put(IP_ACL_PATH).body(body)).await {
            return check_deleted(d, e, "error resetting Live IP ACL");
        }
        info!("Reset IP ACL of Live domain {}", d.id());
        d.set_id("");
        Ok(())
    }

    async fn import(&self, _provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let domain = d.id().to_string();
        d.set("domain_name", domain);
        Ok(())
    }
}
