//! `huaweicloud_live_domain`
//!
//! Ingest (`push`) and streaming (`pull`) domains. A pull domain may be
//! mapped to an ingest domain through `ingest_domain_name`.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::SERVICE;
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{path_search, remove_nil, search_string, value_ignore_empty};
use crate::wait::{Refreshed, StateChangeConf};

const STATUS_ON: &str = "on";
const STATUS_OFF: &str = "off";
const STATUS_CONFIGURING: &str = "configuring";

const DOMAIN_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct LiveDomain;

fn domain_request(name: &str) -> ApiRequest {
    ApiRequest::get("v1/{project_id}/domain").query("domain", name)
}

/// The domain record, or `None` when the domain does not exist
async fn get_domain(live: &ServiceClient, name: &str) -> Result<Option<Value>> {
    match live.send(&domain_request(name)).await {
        Ok(response) => {
            let domain = path_search("domain_info|[0]", &response.body);
            Ok(if domain.is_null() { None } else { Some(domain) })
        }
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

async fn wait_domain(
    provider: &Provider,
    live: &ServiceClient,
    name: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<()> {
    let conf = StateChangeConf::new(pending, target, timeout)
        .describe(format!("Live domain {}", name))
        .delay(DOMAIN_POLL_INTERVAL)
        .poll_interval(DOMAIN_POLL_INTERVAL);
    provider
        .wait_for_state(conf, move || async move {
            match get_domain(live, name).await? {
                Some(domain) => {
                    let status = search_string("status", &domain).unwrap_or_default();
                    Ok(Refreshed::new(domain, status))
                }
                None => Ok(Refreshed::gone()),
            }
        })
        .await?;
    Ok(())
}

async fn set_status(
    provider: &Provider,
    live: &ServiceClient,
    name: &str,
    status: &str,
    timeout: Duration,
) -> Result<()> {
    let request = ApiRequest::put("v1/{project_id}/domain").body(json!({
        "domain": name,
        "status": status,
    }));
    live.send(&request)
        .await
        .with_context(|| format!("error updating Live domain ({}) status to {}", name, status))?;
    wait_domain(provider, live, name, &[STATUS_CONFIGURING], &[status], timeout)
        .await
        .with_context(|| format!("error waiting for Live domain ({}) to become {}", name, status))
}

async fn map_domain(live: &ServiceClient, pull_domain: &str, push_domain: &str) -> Result<()> {
    let request = ApiRequest::put("v1/{project_id}/domains_mapping").body(json!({
        "pull_domain": pull_domain,
        "push_domain": push_domain,
    }));
    live.send(&request)
        .await
        .with_context(|| format!("error mapping Live domain ({}) to ({})", pull_domain, push_domain))?;
    Ok(())
}

async fn unmap_domain(live: &ServiceClient, pull_domain: &str, push_domain: &str) -> Result<()> {
    let request = ApiRequest::delete("v1/{project_id}/domains_mapping")
        .query("pull_domain", pull_domain)
        .query("push_domain", push_domain);
    match live.send(&request).await {
        Err(e) if !e.is_not_found() => Err(e.context(format!(
            "error removing mapping of Live domain ({}) to ({})",
            pull_domain, push_domain
        ))),
        _ => Ok(()),
    }
}

async fn set_ipv6(live: &ServiceClient, name: &str, enabled: bool) -> Result<()> {
    let request = ApiRequest::put("v1/{project_id}/domain/ipv6-switch").body(json!({
        "domain": name,
        "is_ipv6": enabled,
    }));
    live.send(&request)
        .await
        .with_context(|| format!("error updating IPv6 switch of Live domain ({})", name))?;
    Ok(())
}

#[async_trait]
impl Resource for LiveDomain {
    fn type_name(&self) -> &'static str {
        "huaweicloud_live_domain"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(20, 20, 20)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let name = d.require_str("name")?;
        let timeout = d.timeouts().create;

        let body = remove_nil(json!({
            "domain": name,
            "domain_type": d.require_str("type")?,
            "region": provider.region(),
            "service_area": value_ignore_empty(json!(d.get_str("service_area"))),
            "enterprise_project_id": value_ignore_empty(json!(d.get_str("enterprise_project_id"))),
        }));
        let request = ApiRequest::post("v1/{project_id}/domain").body(body);
        live.send(&request)
            .await
            .with_context(|| "error creating Live domain".to_string())?;
        d.set_id(&name);

        wait_domain(provider, &live, &name, &[STATUS_CONFIGURING], &[STATUS_ON], timeout)
            .await
            .with_context(|| format!("error waiting for Live domain ({}) to be enabled", name))?;
        info!("Created Live domain {}", name);

        if let Some(push_domain) = d.get_str_opt("ingest_domain_name") {
            map_domain(&live, &name, &push_domain).await?;
        }
        if d.get_bool("is_ipv6") {
            set_ipv6(&live, &name, true).await?;
        }
        if d.get_str("status") == STATUS_OFF {
            set_status(provider, &live, &name, STATUS_OFF, timeout).await?;
        }

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let domain = match get_domain(&live, d.id()).await {
            Ok(Some(domain)) => domain,
            Ok(None) => {
                mark_gone(d, "error retrieving Live domain");
                return Ok(());
            }
            Err(e) => return check_deleted(d, e, "error retrieving Live domain"),
        };

        d.set("region", provider.region());
        for (attr, key) in [
            ("name", "domain"),
            ("type", "domain_type"),
            ("cname", "domain_cname"),
            ("status", "status"),
            ("ingest_domain_name", "related_domain"),
            ("service_area", "service_area"),
            ("enterprise_project_id", "enterprise_project_id"),
            ("is_ipv6", "is_ipv6"),
            ("created_at", "create_time"),
        ] {
            d.set(attr, domain[key].clone());
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let name = d.id().to_string();
        let timeout = d.timeouts().update;

        if d.has_change("ingest_domain_name") {
            let (old, new) = d.get_change("ingest_domain_name");
            if let Some(old) = old.as_str().filter(|s| !s.is_empty()) {
                unmap_domain(&live, &name, old).await?;
            }
            if let Some(new) = new.as_str().filter(|s| !s.is_empty()) {
                map_domain(&live, &name, new).await?;
            }
        }
        if d.has_change("is_ipv6") {
            set_ipv6(&live, &name, d.get_bool("is_ipv6")).await?;
        }
        if d.has_change("status") {
            let status = d.get_str_opt("status").unwrap_or_else(|| STATUS_ON.to_string());
            set_status(provider, &live, &name, &status, timeout).await?;
        }

        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let live = provider.client(SERVICE)?;
        let name = d.id().to_string();
        let timeout = d.timeouts().delete;

        // only disabled domains can be deleted
        let current = match get_domain(&live, &name).await? {
            Some(domain) => domain,
            None => {
                mark_gone(d, "error deleting Live domain");
                return Ok(());
            }
        };
        if current["status"].as_str() == Some(STATUS_ON) {
            set_status(provider, &live, &name, STATUS_OFF, timeout).await?;
        }

        let request = ApiRequest::delete("v1/{project_id}/domain").query("domain", &name);
        if let Err(e) = live.send(&request).await {
            return check_deleted(d, e, "error deleting Live domain");
        }
        wait_domain(provider, &live, &name, &[], &[], timeout)
            .await
            .with_context(|| format!("error waiting for Live domain ({}) to be deleted", name))?;
        info!("Deleted Live domain {}", name);
        d.set_id("");
        Ok(())
    }
}
