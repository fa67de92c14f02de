//! `huaweicloud_dcs_instances` and `huaweicloud_dcs_accounts`

use async_trait::async_trait;
use serde_json::{Value, json};

use super::common::SERVICE;
use crate::client::ApiRequest;
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::DataSource;
use crate::schema::ResourceData;
use crate::utils::{flatten_tags, list_all_items, search_array};

pub struct DcsInstances;

fn flatten_instance(instance: &Value) -> Value {
    json!({
        "id": instance["instance_id"],
        "name": instance["name"],
        "engine": instance["engine"],
        "engine_version": instance["engine_version"],
        "capacity": instance["capacity"],
        "flavor": instance["spec_code"],
        "status": instance["status"],
        "private_ip": instance["ip"],
        "port": instance["port"],
        "domain_name": instance["domain_name"],
        "vpc_id": instance["vpc_id"],
        "subnet_id": instance["subnet_id"],
        "security_group_id": instance["security_group_id"],
        "enterprise_project_id": instance["enterprise_project_id"],
        "charging_mode": instance["charging_mode"],
        "created_at": instance["created_at"],
        "tags": flatten_tags(&search_array("tags", instance)),
    })
}

#[async_trait]
impl DataSource for DcsInstances {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_instances"
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;

        let mut request = ApiRequest::get("v2/{project_id}/instances")
            .query_opt("name", d.get_str_opt("name").as_deref())
            .query_opt("status", d.get_str_opt("status").as_deref())
            .query_opt("ip", d.get_str_opt("private_ip").as_deref());
        if d.get_f64("capacity") > 0.0 {
            request = request.query("capacity", d.get_f64("capacity"));
        }
        if d.get_str_opt("name").is_some() {
            request = request.query("name_equal", true);
        }

        let instances = list_all_items(&dcs, &request, "instances", 1000)
            .await
            .with_context(|| "error retrieving DCS instances".to_string())?;

        let engine_version = d.get_str_opt("engine_version");
        let flattened: Vec<Value> = instances
            .iter()
            .filter(|i| {
                engine_version
                    .as_deref()
                    .is_none_or(|v| i["engine_version"].as_str() == Some(v))
            })
            .map(flatten_instance)
            .collect();

        d.set_id(uuid::Uuid::new_v4().to_string());
        d.set("region", provider.region());
        d.set("instances", flattened);
        Ok(())
    }
}

pub struct DcsAccounts;

const ACCOUNT_FILTERS: &[&str] = &["account_name", "account_type", "account_role", "status", "description"];

#[async_trait]
impl DataSource for DcsAccounts {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_accounts"
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;

        let request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/accounts")
            .path_param("instance_id", &instance_id);
        let body = dcs
            .send(&request)
            .await
            .with_context(|| "error retrieving DCS accounts".to_string())?
            .body;

        let filters: Vec<(&str, String)> = ACCOUNT_FILTERS
            .iter()
            .filter_map(|f| d.get_str_opt(f).map(|v| (*f, v)))
            .collect();
        let accounts: Vec<Value> = search_array("accounts", &body)
            .into_iter()
            .filter(|a| filters.iter().all(|(k, v)| a[*k].as_str() == Some(v.as_str())))
            .map(|a| {
                json!({
                    "id": a["account_id"],
                    "account_name": a["account_name"],
                    "account_type": a["account_type"],
                    "account_role": a["account_role"],
                    "status": a["status"],
                    "description": a["description"],
                })
            })
            .collect();

        d.set_id(uuid::Uuid::new_v4().to_string());
        d.set("region", provider.region());
        d.set("accounts", accounts);
        Ok(())
    }
}
