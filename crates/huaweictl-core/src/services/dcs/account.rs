//! `huaweicloud_dcs_account`

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::common::{CHILD_RETRY_DELAY, InstanceProbe, SERVICE, busy_retry};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{parse_import_id, path_search, remove_nil, search_string, value_ignore_empty};
use crate::wait::{Refreshed, StateChangeConf};

const ACCOUNT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct DcsAccount;

fn accounts_request(instance_id: &str) -> ApiRequest {
    ApiRequest::get("v2/{project_id}/instances/{instance_id}/accounts")
        .path_param("instance_id", instance_id)
}

fn account_request(method: reqwest::Method, instance_id: &str, account_id: &str, suffix: &str) -> ApiRequest {
    ApiRequest::new(
        method,
        format!("v2/{{project_id}}/instances/{{instance_id}}/accounts/{{account_id}}{}", suffix),
    )
    .path_param("instance_id", instance_id)
    .path_param("account_id", account_id)
}

/// Wait for the account matching `filter` to reach `target`
async fn wait_account(
    provider: &Provider,
    dcs: &ServiceClient,
    instance_id: &str,
    filter: &str,
    pending: &str,
    target: &str,
    timeout: Duration,
) -> Result<Option<Value>> {
    let conf = StateChangeConf::new(&[pending], &[target], timeout)
        .describe(format!("DCS account ({})", filter))
        .delay(ACCOUNT_POLL_INTERVAL)
        .poll_interval(ACCOUNT_POLL_INTERVAL);
    let expression = format!("accounts|[?{}]|[0]", filter);
    let expression = expression.as_str();
    provider
        .wait_for_state(conf, move || async move {
            let body = dcs.send(&accounts_request(instance_id)).await?.body;
            let account = path_search(expression, &body);
            if account.is_null() {
                return Ok(Refreshed::gone());
            }
            let status = search_string("status", &account).unwrap_or_default();
            Ok(Refreshed::new(account, status))
        })
        .await
}

/// Wait for an instance task with the given name to finish
async fn wait_task(
    provider: &Provider,
    dcs: &ServiceClient,
    instance_id: &str,
    task_name: &str,
    timeout: Duration,
) -> Result<()> {
    let conf = StateChangeConf::new(&["EXECUTING"], &["SUCCESS"], timeout)
        .describe(format!("task {} of DCS instance {}", task_name, instance_id))
        .delay(ACCOUNT_POLL_INTERVAL)
        .poll_interval(ACCOUNT_POLL_INTERVAL);
    let expression = format!("tasks|[?name=='{}']|[0]", task_name);
    let expression = expression.as_str();
    provider
        .wait_for_state(conf, move || async move {
            let request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/tasks")
                .path_param("instance_id", instance_id);
            let body = dcs.send(&request).await?.body;
            let task = path_search(expression, &body);
            if task.is_null() {
                return Ok(Refreshed::gone());
            }
            let status = search_string("status", &task).unwrap_or_default();
            Ok(Refreshed::new(task, status))
        })
        .await?;
    Ok(())
}

#[async_trait]
impl Resource for DcsAccount {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_account"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 30, 30)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let account_name = d.require_str("account_name")?;
        let timeout = d.timeouts().create;
        let probe = InstanceProbe::new(&dcs, &instance_id);

        let body = remove_nil(json!({
            "account_name": account_name,
            "account_role": d.require_str("account_role")?,
            "account_password": d.require_str("account_password")?,
            "description": value_ignore_empty(json!(d.get_str("description"))),
        }));
        let request = ApiRequest::post("v2/{project_id}/instances/{instance_id}/accounts")
            .path_param("instance_id", &instance_id)
            .body(body);
        busy_retry(
            format!("creating DCS account ({})", account_name),
            &dcs,
            request,
            &probe,
            CHILD_RETRY_DELAY,
            timeout,
        )
        .run()
        .await
        .with_context(|| "error creating DCS account".to_string())?;

        let filter = format!("account_name=='{}'", account_name);
        let account = wait_account(provider, &dcs, &instance_id, &filter, "CREATING", "AVAILABLE", timeout)
            .await
            .with_context(|| format!("error waiting for account ({}) to be created", account_name))?;
        let account_id = account
            .as_ref()
            .and_then(|a| search_string("account_id", a))
            .unwrap_or_default();
        d.set_id(account_id);
        info!("Created DCS account {} on instance {}", account_name, instance_id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;

        let body = match dcs.send(&accounts_request(&instance_id)).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving DCS account"),
        };
        let account = path_search(&format!("accounts|[?account_id=='{}']|[0]", d.id()), &body);
        if account.is_null() {
            mark_gone(d, "error retrieving DCS account");
            return Ok(());
        }

        d.set("region", provider.region());
        d.set("instance_id", instance_id);
        for attr in ["account_name", "account_type", "account_role", "status", "description"] {
            d.set(attr, account[attr].clone());
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let account_id = d.id().to_string();
        let timeout = d.timeouts().update;
        let probe = InstanceProbe::new(&dcs, &instance_id);
        let filter = format!("account_id=='{}'", account_id);

        if d.has_change("account_password") {
            let request = account_request(reqwest::Method::PUT, &instance_id, &account_id, "/password/reset")
                .body(json!({ "new_password": d.get_str("account_password") }));
            busy_retry("resetting DCS account password", &dcs, request, &probe, CHILD_RETRY_DELAY, timeout)
                .run()
                .await?;
            wait_account(provider, &dcs, &instance_id, &filter, "UPDATING", "AVAILABLE", timeout)
                .await
                .with_context(|| format!("error waiting for password reset of account ({})", account_id))?;
        }

        if d.has_change("account_role") {
            let request = account_request(reqwest::Method::PUT, &instance_id, &account_id, "/role")
                .body(json!({ "account_role": d.get_str("account_role") }));
            busy_retry("updating DCS account role", &dcs, request, &probe, CHILD_RETRY_DELAY, timeout)
                .run()
                .await?;
            wait_account(provider, &dcs, &instance_id, &filter, "UPDATING", "AVAILABLE", timeout)
                .await
                .with_context(|| format!("error waiting for role update of account ({})", account_id))?;
        }

        if d.has_change("description") {
            let request = account_request(reqwest::Method::PUT, &instance_id, &account_id, "")
                .body(json!({ "description": d.get_str("description") }))
                .ok_codes(&[204]);
            busy_retry("updating DCS account description", &dcs, request, &probe, CHILD_RETRY_DELAY, timeout)
                .run()
                .await?;
        }

        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let account_id = d.id().to_string();
        let timeout = d.timeouts().delete;
        let probe = InstanceProbe::new(&dcs, &instance_id);

        let request = account_request(reqwest::Method::DELETE, &instance_id, &account_id, "");
        if let Err(e) = busy_retry(
            format!("deleting DCS account ({})", account_id),
            &dcs,
            request,
            &probe,
            CHILD_RETRY_DELAY,
            timeout,
        )
        .run()
        .await
        {
            return check_deleted(d, e, "error deleting DCS account");
        }

        wait_task(provider, &dcs, &instance_id, "DeleteAcl", timeout)
            .await
            .with_context(|| format!("error waiting for account ({}) to be deleted", account_id))?;
        info!("Deleted DCS account {}", account_id);
        d.set_id("");
        Ok(())
    }

    async fn import(&self, _provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let parts = parse_import_id(d.id(), 2, "<instance_id>/<id>")?;
        d.set("instance_id", parts[0].clone());
        d.set_id(parts[1].clone());
        Ok(())
    }
}
