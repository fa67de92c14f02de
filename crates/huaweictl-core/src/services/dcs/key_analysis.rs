//! `huaweicloud_dcs_bigkey_analysis` and `huaweicloud_dcs_hotkey_analysis`
//!
//! Both analyses share one task API shape and differ only in the path
//! segment and the per-key fields the report carries.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::info;

use super::common::{CHILD_RETRY_DELAY, InstanceProbe, SERVICE, busy_retry};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted};
use crate::utils::{parse_import_id, search_string};
use crate::wait::{Refreshed, StateChangeConf};

const ANALYSIS_POLL_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAnalysisKind {
    BigKey,
    HotKey,
}

impl KeyAnalysisKind {
    fn segment(self) -> &'static str {
        match self {
            Self::BigKey => "bigkey-task",
            Self::HotKey => "hotkey-task",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Self::BigKey => "big key analysis",
            Self::HotKey => "hot key analysis",
        }
    }

    /// Per-key attributes copied from the report
    fn key_fields(self) -> &'static [&'static str] {
        match self {
            Self::BigKey => &["name", "type", "shard", "db", "size", "unit"],
            Self::HotKey => &["name", "type", "shard", "db", "size", "unit", "freq"],
        }
    }
}

pub struct DcsKeyAnalysis {
    kind: KeyAnalysisKind,
}

impl DcsKeyAnalysis {
    pub const fn new(kind: KeyAnalysisKind) -> Self {
        Self { kind }
    }

    fn task_request(&self, method: reqwest::Method, instance_id: &str, task_id: &str) -> ApiRequest {
        ApiRequest::new(
            method,
            format!("v2/{{project_id}}/instances/{{instance_id}}/{}/{{task_id}}", self.kind.segment()),
        )
        .path_param("instance_id", instance_id)
        .path_param("task_id", task_id)
    }

    fn flatten_keys(&self, report: &Value) -> Vec<Value> {
        let fields = self.kind.key_fields();
        report["keys"]
            .as_array()
            .map(|keys| {
                keys.iter()
                    .map(|key| {
                        let entry = fields
                            .iter()
                            .map(|f| (f.to_string(), key[*f].clone()))
                            .collect();
                        Value::Object(entry)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

async fn get_task(dcs: &ServiceClient, request: &ApiRequest) -> Result<Value> {
    Ok(dcs.send(request).await?.body)
}

#[async_trait]
impl Resource for DcsKeyAnalysis {
    fn type_name(&self) -> &'static str {
        match self.kind {
            KeyAnalysisKind::BigKey => "huaweicloud_dcs_bigkey_analysis",
            KeyAnalysisKind::HotKey => "huaweicloud_dcs_hotkey_analysis",
        }
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(30, 10, 10)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let timeout = d.timeouts().create;
        let probe = InstanceProbe::new(&dcs, &instance_id);

        let request = ApiRequest::new(
            reqwest::Method::POST,
            format!("v2/{{project_id}}/instances/{{instance_id}}/{}", self.kind.segment()),
        )
        .path_param("instance_id", &instance_id)
        .body(json!({}));
        let done = busy_retry(
            format!("starting {} of DCS instance ({})", self.kind.label(), instance_id),
            &dcs,
            request,
            &probe,
            CHILD_RETRY_DELAY,
            timeout,
        )
        .run()
        .await
        .with_context(|| format!("error creating {}", self.kind.label()))?;

        let task_id = search_string("id", &done.response.body).ok_or_else(|| {
            CoreError::TaskFailed(format!(
                "error creating {}: id is not found in API response",
                self.kind.label()
            ))
        })?;
        d.set_id(&task_id);

        let conf = StateChangeConf::new(&["waiting", "running"], &["success"], timeout)
            .describe(format!("{} {}", self.kind.label(), task_id))
            .delay(ANALYSIS_POLL_INTERVAL)
            .poll_interval(ANALYSIS_POLL_INTERVAL);
        let refresh_request = self.task_request(reqwest::Method::GET, &instance_id, &task_id);
        let (client, req) = (&dcs, &refresh_request);
        provider
            .wait_for_state(conf, move || async move {
                let task = get_task(client, req).await?;
                let status = search_string("status", &task).unwrap_or_default();
                Ok(Refreshed::new(task, status))
            })
            .await
            .with_context(|| format!("error waiting for {} ({}) to complete", self.kind.label(), task_id))?;
        info!("{} {} of DCS instance {} finished", self.kind.label(), task_id, instance_id);

        self.read(provider, d).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let request = self.task_request(reqwest::Method::GET, &instance_id, d.id());
        let task = match get_task(&dcs, &request).await {
            Ok(task) => task,
            Err(e) => {
                return check_deleted(d, e, &format!("error retrieving {}", self.kind.label()));
            }
        };

        d.set("region", provider.region());
        for attr in ["scan_type", "status", "num", "created_at", "started_at", "finished_at"] {
            d.set(attr, task[attr].clone());
        }
        d.set("keys", self.flatten_keys(&task));
        Ok(())
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        self.read(provider, d).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let instance_id = d.require_str("instance_id")?;
        let task_id = d.id().to_string();

        let request = self.task_request(reqwest::Method::DELETE, &instance_id, &task_id);
        if let Err(e) = dcs.send(&request).await {
            return check_deleted(d, e, &format!("error deleting {} ({})", self.kind.label(), task_id));
        }
        info!("Deleted {} {}", self.kind.label(), task_id);
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
