//! `huaweicloud_dcs_backup`
//!
//! Manual backups of a DCS instance. Backups have no detail endpoint, so
//! reads and waits look the record up in the instance's backup list.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::common::{CHILD_RETRY_DELAY, InstanceProbe, SERVICE, busy_retry, find_by_id};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{list_all_items, parse_import_id, remove_nil, search_string, value_ignore_empty};
use crate::wait::{Refreshed, StateChangeConf};

const BACKUP_POLL_INTERVAL: Duration = Duration::from_secs(5);

pub struct DcsBackup;

async fn find_backup(dcs: &ServiceClient, instance_id: &str, backup_id: &str) -> Result<Option<Value>> {
    let request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/backups")
        .path_param("instance_id", instance_id);
    let backups = list_all_items(dcs, &request, "backup_record_response", 100).await?;
    Ok(find_by_id(&backups, "backup_id", backup_id).cloned())
}

async fn wait_backup(
    provider: &Provider,
    dcs: &ServiceClient,
    instance_id: &str,
    backup_id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<Option<Value>> {
    let conf = StateChangeConf::new(pending, target, timeout)
        .describe(format!("DCS backup {}", backup_id))
        .delay(BACKUP_POLL_INTERVAL)
        .poll_interval(BACKUP_POLL_INTERVAL);
    provider
        .wait_for_state(conf, move || async move {
            match find_backup(dcs, instance_id, backup_id).await? {
                Some(backup) => {
                    let status = search_string("status", &backup).unwrap_or_default();
                    Ok(Refreshed::new(backup, status))
                }
                None => Ok(Refreshed::gone()),
            }
        })
        .await
}

#[async_trait]
impl Resource for DcsBackup {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_backup"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 10, 10)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let timeout = d.timeouts().create;
        let probe = InstanceProbe::new(&dcs, &instance_id);

        let body = remove_nil(json!({
            "remark": value_ignore_empty(json!(d.get_str("description"))),
            "backup_format": value_ignore_empty(json!(d.get_str("backup_format"))),
        }));
        let request = ApiRequest::post("v2/{project_id}/instances/{instance_id}/backups")
            .path_param("instance_id", &instance_id)
            .body(body);
        let done = busy_retry(
            format!("backing up DCS instance ({})", instance_id),
            &dcs,
            request,
            &probe,
            CHILD_RETRY_DELAY,
            timeout,
        )
        .run()
        .await
        .with_context(|| "error creating DCS backup".to_string())?;

        let backup_id = search_string("backup_id", &done.response.body).ok_or_else(|| {
            CoreError::TaskFailed("DCS backup create returned no backup ID".to_string())
        })?;
        d.set_id(&backup_id);

        wait_backup(
            provider,
            &dcs,
            &instance_id,
            &backup_id,
            &["waiting", "backuping"],
            &["succeed"],
            timeout,
        )
        .await
        .with_context(|| format!("error waiting for DCS backup ({}) to complete", backup_id))?;
        info!("DCS backup {} of instance {} succeeded", backup_id, instance_id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;

        let backup = match find_backup(&dcs, &instance_id, d.id()).await {
            Ok(Some(backup)) => backup,
            Ok(None) => {
                mark_gone(d, "error retrieving DCS backup");
                return Ok(());
            }
            Err(e) => return check_deleted(d, e, "error retrieving DCS backup"),
        };

        d.set("region", provider.region());
        d.set("instance_id", instance_id);
        for (attr, key) in [
            ("name", "backup_name"),
            ("description", "remark"),
            ("backup_format", "backup_format"),
            ("type", "backup_type"),
            ("size", "size"),
            ("begin_time", "created_at"),
            ("end_time", "updated_at"),
            ("status", "status"),
            ("is_support_restore", "is_support_restore"),
        ] {
            d.set(attr, backup[key].clone());
        }
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let backup_id = d.id().to_string();
        let timeout = d.timeouts().delete;

        let request = ApiRequest::delete("v2/{project_id}/instances/{instance_id}/backups/{backup_id}")
            .path_param("instance_id", &instance_id)
            .path_param("backup_id", &backup_id);
        if let Err(e) = dcs.send(&request).await {
            return check_deleted(d, e, "error deleting DCS backup");
        }

        // any state counts as pending until the record disappears
        wait_backup(provider, &dcs, &instance_id, &backup_id, &[], &[], timeout)
            .await
            .with_context(|| format!("error waiting for DCS backup ({}) to be deleted", backup_id))?;
        info!("Deleted DCS backup {}", backup_id);
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
