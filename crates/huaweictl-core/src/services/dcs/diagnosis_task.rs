//! `huaweicloud_dcs_diagnosis_task`

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::common::{CHILD_RETRY_DELAY, InstanceProbe, SERVICE, busy_retry, find_by_id};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted};
use crate::utils::{
    list_all_items, parse_import_id, path_search, remove_nil, rfc3339_to_millis, search_string,
    value_ignore_empty,
};
use crate::wait::{Refreshed, StateChangeConf};

const REPORT_POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct DcsDiagnosisTask;

fn create_body(d: &ResourceData) -> Result<Value> {
    let begin = rfc3339_to_millis(&d.require_str("begin_time")?)?;
    let end = rfc3339_to_millis(&d.require_str("end_time")?)?;
    Ok(remove_nil(json!({
        "begin_time": begin,
        "end_time": end,
        "node_ip_list": value_ignore_empty(json!(d.get_string_list("node_ip_list"))),
    })))
}

/// Summary of a report from the instance's report list
async fn find_report(dcs: &ServiceClient, instance_id: &str, report_id: &str) -> Result<Value> {
    let request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/diagnosis")
        .path_param("instance_id", instance_id);
    let reports = list_all_items(dcs, &request, "diagnosis_report_list", 100).await?;
    find_by_id(&reports, "report_id", report_id)
        .cloned()
        .ok_or_else(|| CoreError::TaskFailed(format!("unable to find the report {}", report_id)))
}

/// `10.0.0.1:6379` to `10.0.0.1`
fn node_addresses(report: &Value) -> Vec<String> {
    path_search("diagnosis_node_report_list[*].node_ip", report)
        .as_array()
        .map(|ips| {
            ips.iter()
                .filter_map(Value::as_str)
                .map(|ip| ip.split(':').next().unwrap_or(ip).to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn node_reports(report: &Value) -> Vec<Value> {
    report["diagnosis_node_report_list"]
        .as_array()
        .map(|nodes| {
            nodes
                .iter()
                .map(|node| {
                    // the API returns a single object; state keeps it as a one-item list
                    let command_time_taken = match &node["command_time_taken_list"] {
                        Value::Null => json!({}),
                        other => other.clone(),
                    };
                    json!({
                        "node_ip": node["node_ip"],
                        "az_code": node["az_code"],
                        "group_name": node["group_name"],
                        "abnormal_sum": node["abnormal_sum"],
                        "failed_sum": node["failed_sum"],
                        "is_faulted": node["is_faulted"],
                        "role": node["role"],
                        "diagnosis_dimension_list": node["diagnosis_dimension_list"],
                        "command_time_taken_list": [command_time_taken],
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Resource for DcsDiagnosisTask {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_diagnosis_task"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 10, 10)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let timeout = d.timeouts().create;
        let probe = InstanceProbe::new(&dcs, &instance_id);

        let request = ApiRequest::post("v2/{project_id}/instances/{instance_id}/diagnosis")
            .path_param("instance_id", &instance_id)
            .body(create_body(d)?);
        let done = busy_retry(
            format!("diagnosing DCS instance ({})", instance_id),
            &dcs,
            request,
            &probe,
            CHILD_RETRY_DELAY,
            timeout,
        )
        .run()
        .await
        .with_context(|| "error creating diagnosis task".to_string())?;

        let report_id = search_string("report_id", &done.response.body).ok_or_else(|| {
            CoreError::TaskFailed(
                "error creating diagnosis task: report_id is not found in API response".to_string(),
            )
        })?;
        d.set_id(&report_id);

        let conf = StateChangeConf::new(&["diagnosing"], &["finished"], timeout)
            .describe(format!("diagnosis report {}", report_id))
            .delay(REPORT_POLL_INTERVAL)
            .poll_interval(REPORT_POLL_INTERVAL);
        let (client, instance, report) = (&dcs, instance_id.as_str(), report_id.as_str());
        provider
            .wait_for_state(conf, move || async move {
                let summary = find_report(client, instance, report).await?;
                let status = search_string("status", &summary).unwrap_or_default();
                Ok(Refreshed::new(summary, status))
            })
            .await
            .with_context(|| "error waiting for diagnosis task to complete".to_string())?;
        info!("Diagnosis report {} of DCS instance {} finished", report_id, instance_id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let report_id = d.id().to_string();

        let request = ApiRequest::get("v2/{project_id}/diagnosis/{report_id}")
            .path_param("report_id", &report_id);
        let report = match dcs.send(&request).await {
            Ok(response) => response.body,
            Err(e) => return check_deleted(d, e, "error retrieving diagnosis report"),
        };
        let summary = find_report(&dcs, &instance_id, &report_id).await?;

        d.set("region", provider.region());
        d.set("begin_time", summary["begin_time"].clone());
        d.set("end_time", summary["end_time"].clone());
        d.set("node_ip_list", node_addresses(&report));
        d.set("abnormal_item_sum", report["abnormal_item_sum"].clone());
        d.set("failed_item_sum", report["failed_item_sum"].clone());
        d.set("diagnosis_node_report_list", node_reports(&report));
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let report_id = d.id().to_string();

        let request = ApiRequest::delete("v2/{project_id}/instances/{instance_id}/diagnosis")
            .path_param("instance_id", &instance_id)
            .body(json!({ "report_id_list": [report_id] }));
        if let Err(e) = dcs.send(&request).await {
            return check_deleted(d, e, &format!("error deleting the diagnosis report ({})", report_id));
        }
        info!("Deleted diagnosis report {}", report_id);
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
