//! `huaweicloud_dcs_backup_import_task`
//!
//! Imports backup files (from OBS or another instance's backup record)
//! into a DCS instance through the migration task API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::common::{SERVICE, STATE_DELETED};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted, mark_gone};
use crate::utils::{
    as_block, list_all_items, path_search, remove_nil, search_string, single_block,
    value_ignore_empty,
};
use crate::wait::{Refreshed, StateChangeConf};

/// Error code reported for migration tasks that no longer exist
const TASK_GONE_CODE: &str = "DCS.4133";

const TASK_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Statuses reported as-is while waiting; every other status is pending
const TERMINAL_STATUSES: &[&str] = &[
    "SUCCESS",
    "FAILED",
    "TERMINATED",
    "INCRMIGEATING",
    "MIGRATION_FAILED",
    "RELEASED",
    STATE_DELETED,
];

pub struct DcsBackupImportTask;

fn create_body(d: &ResourceData) -> Result<Value> {
    let backup_files = single_block(d.get("backup_files"));
    let target = single_block(d.get("target_instance"));
    if target["id"].as_str().unwrap_or_default().is_empty() {
        return Err(CoreError::Validation("'target_instance.id' is required".to_string()));
    }

    let files: Vec<Value> = backup_files["files"]
        .as_array()
        .map(|files| {
            files
                .iter()
                .map(|f| {
                    json!({
                        "file_name": f["file_name"],
                        "size": value_ignore_empty(f["size"].clone()),
                        "update_at": value_ignore_empty(f["update_at"].clone()),
                    })
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(remove_nil(json!({
        "task_name": d.require_str("task_name")?,
        "migration_type": d.require_str("migration_type")?,
        "migration_method": d.require_str("migration_method")?,
        "backup_files": {
            "file_source": backup_files["file_source"],
            "bucket_name": value_ignore_empty(backup_files["bucket_name"].clone()),
            "backup_id": value_ignore_empty(backup_files["backup_id"].clone()),
            "files": value_ignore_empty(Value::Array(files)),
        },
        "target_instance": {
            "id": target["id"],
            "password": value_ignore_empty(target["password"].clone()),
        },
        "description": value_ignore_empty(json!(d.get_str("description"))),
    })))
}

async fn get_task(dcs: &ServiceClient, task_id: &str) -> Result<Value> {
    let request = ApiRequest::get("v2/{project_id}/migration-task/{task_id}")
        .path_param("task_id", task_id);
    Ok(dcs.send(&request).await?.body)
}

/// Task status with everything but the terminal statuses folded into `PENDING`
async fn refresh_task(dcs: &ServiceClient, task_id: &str) -> Result<Refreshed> {
    match get_task(dcs, task_id).await {
        Ok(task) => {
            let status = search_string("status", &task).unwrap_or_default();
            let state = if TERMINAL_STATUSES.contains(&status.as_str()) {
                status
            } else {
                "PENDING".to_string()
            };
            Ok(Refreshed::new(task, state))
        }
        Err(e) if e.error_code() == Some(TASK_GONE_CODE) => {
            Ok(Refreshed::new(Value::Null, STATE_DELETED))
        }
        Err(e) => Err(e),
    }
}

/// Deleted tasks may still report SUCCESS in the detail API; only the list
/// API reflects the deletion
async fn refresh_task_listed(dcs: &ServiceClient, task_id: &str) -> Result<Refreshed> {
    let request = ApiRequest::get("v2/{project_id}/migration-tasks");
    let tasks = Value::Array(list_all_items(dcs, &request, "migration_tasks", 100).await?);
    let task = path_search(&format!("[?task_id=='{}']|[0]", task_id), &tasks);
    if task.is_null() {
        Ok(Refreshed::new(tasks, STATE_DELETED))
    } else {
        Ok(Refreshed::new(task, "PENDING"))
    }
}

fn flatten_backup_files(task: &Value) -> Value {
    let files = &task["backup_files"];
    if files.is_null() {
        return json!([]);
    }
    let file_list: Vec<Value> = files["files"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .map(|f| json!({ "file_name": f["file_name"], "size": f["size"], "update_at": f["update_at"] }))
                .collect()
        })
        .unwrap_or_default();
    as_block(json!({
        "file_source": files["file_source"],
        "bucket_name": files["bucket_name"],
        "files": file_list,
        "backup_id": path_search("backup_record.backup_id", files),
    }))
}

#[async_trait]
impl Resource for DcsBackupImportTask {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_backup_import_task"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(60, 10, 10)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let timeout = d.timeouts().create;

        let request = ApiRequest::post("v2/{project_id}/migration-task").body(create_body(d)?);
        let body = dcs
            .send(&request)
            .await
            .with_context(|| "error creating backup import task".to_string())?
            .body;
        let id = search_string("id", &body)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                CoreError::TaskFailed(
                    "error creating backup import task: id is not found in API response".to_string(),
                )
            })?;
        d.set_id(&id);

        let conf = StateChangeConf::new(&["PENDING"], &["SUCCESS"], timeout)
            .describe(format!("migration task {}", id))
            .delay(TASK_POLL_INTERVAL)
            .poll_interval(TASK_POLL_INTERVAL);
        let (client, task_id) = (&dcs, id.as_str());
        provider
            .wait_for_state(conf, move || refresh_task(client, task_id))
            .await
            .with_context(|| format!("error waiting for migration task ({}) to be completed", id))?;
        info!("Backup import task {} succeeded", id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let task = match get_task(&dcs, d.id()).await {
            Ok(task) => task,
            Err(e) => {
                return check_deleted(
                    d,
                    e.convert_400_to_404(&[TASK_GONE_CODE]),
                    "error getting DCS backup import task",
                );
            }
        };
        if task["status"].as_str() == Some(STATE_DELETED) {
            mark_gone(d, "error getting DCS backup import task");
            return Ok(());
        }

        d.set("region", provider.region());
        for attr in [
            "task_name",
            "migration_type",
            "migration_method",
            "description",
            "status",
            "created_at",
            "updated_at",
            "released_at",
        ] {
            d.set(attr, task[attr].clone());
        }
        d.set("backup_files", flatten_backup_files(&task));

        // the password is write-only; keep the configured value
        let password = single_block(d.get("target_instance"))["password"].clone();
        let target = &task["target_instance"];
        if !target.is_null() {
            d.set(
                "target_instance",
                as_block(json!({ "id": target["id"], "name": target["name"], "password": password })),
            );
        }
        Ok(())
    }

    async fn update(&self, _provider: &Provider, _d: &mut ResourceData) -> Result<()> {
        Ok(())
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let id = d.id().to_string();
        let timeout = d.timeouts().delete;

        let request = ApiRequest::delete("v2/{project_id}/migration-tasks/delete")
            .body(json!({ "task_id_list": [id] }));
        let body = match dcs.send(&request).await {
            Ok(response) => response.body,
            Err(e) => {
                return check_deleted(
                    d,
                    e.convert_400_to_404(&[TASK_GONE_CODE]),
                    &format!("error deleting backup import task ({})", id),
                );
            }
        };
        if search_string("task_id_list[0]", &body).is_none_or(|s| s.is_empty()) {
            return Err(CoreError::TaskFailed(
                "error deleting backup import task, id is not found in the response".to_string(),
            ));
        }

        let conf = StateChangeConf::new(&["PENDING"], &[STATE_DELETED], timeout)
            .describe(format!("migration task {} deletion", id))
            .delay(TASK_POLL_INTERVAL)
            .poll_interval(TASK_POLL_INTERVAL);
        let (client, task_id) = (&dcs, id.as_str());
        provider
            .wait_for_state(conf, move || refresh_task_listed(client, task_id))
            .await
            .with_context(|| format!("error waiting for migration task ({}) to be deleted", id))?;
        info!("Deleted backup import task {}", id);
        d.set_id("");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_body_from_obs_files() {
        let d = ResourceData::new(
            json!({
                "task_name": "import-1",
                "migration_type": "backupfile_import",
                "migration_method": "full_amount_migration",
                "backup_files": [{
                    "file_source": "self_build_obs",
                    "bucket_name": "bucket",
                    "files": [{"file_name": "dump.rdb", "size": "", "update_at": ""}]
                }],
                "target_instance": [{"id": "inst-1", "password": ""}]
            })
            .as_object()
            .cloned()
            .unwrap(),
        );
        let body = create_body(&d).unwrap();
        assert_eq!(body["backup_files"]["files"], json!([{"file_name": "dump.rdb"}]));
        assert!(body["backup_files"].get("backup_id").is_none());
        assert_eq!(body["target_instance"], json!({"id": "inst-1"}));
    }

    #[test]
    fn test_flatten_backup_files_reads_backup_record() {
        let task = json!({
            "backup_files": {
                "file_source": "backup_record",
                "backup_record": {"backup_id": "b-1"}
            }
        });
        let flat = flatten_backup_files(&task);
        assert_eq!(flat[0]["backup_id"], "b-1");
        assert_eq!(flat[0]["files"], json!([]));
    }
}
