//! Pieces shared by the DCS resources: instance status, job status and the
//! standard retry policy for mutating calls.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};

use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result};
use crate::operation::{JOB_PENDING, JOB_SUCCESS, Operation, RetryMode, StatusProbe};
use crate::provider::Provider;
use crate::utils::search_string;
use crate::wait::{Refreshed, StateChangeConf};

pub(crate) const SERVICE: &str = "dcs";

/// Status reported once an instance can no longer be found
pub(crate) const STATE_DELETED: &str = "DELETED";

/// Retry delay used by instance level operations
pub(crate) const INSTANCE_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Retry delay used by operations on instance children (accounts, tasks)
pub(crate) const CHILD_RETRY_DELAY: Duration = Duration::from_secs(10);

pub(crate) fn instance_request(instance_id: &str) -> ApiRequest {
    ApiRequest::get("v2/{project_id}/instances/{instance_id}").path_param("instance_id", instance_id)
}

/// Fetch an instance; a 404 is reported as the `DELETED` state
pub(crate) async fn refresh_instance_state(dcs: &ServiceClient, instance_id: &str) -> Result<Refreshed> {
    match dcs.send(&instance_request(instance_id)).await {
        Ok(response) => {
            let status = search_string("status", &response.body).unwrap_or_default();
            Ok(Refreshed::new(response.body, status))
        }
        Err(e) if e.is_not_found() => Ok(Refreshed::new(
            json!({ "status": STATE_DELETED }),
            STATE_DELETED,
        )),
        Err(e) => Err(e),
    }
}

/// Wait for an instance to move from `pending` to `target`, requiring two
/// consecutive observations of the target state
pub(crate) async fn wait_instance(
    provider: &Provider,
    dcs: &ServiceClient,
    instance_id: &str,
    pending: &[&str],
    target: &[&str],
    timeout: Duration,
) -> Result<()> {
    let conf = StateChangeConf::new(pending, target, timeout)
        .describe(format!("DCS instance {}", instance_id))
        .delay(Duration::from_secs(10))
        .poll_interval(Duration::from_secs(10))
        .continuous_target_occurrence(2);
    provider
        .wait_for_state(conf, move || refresh_instance_state(dcs, instance_id))
        .await
        .map_err(|e| {
            e.context(format!(
                "error while waiting for DCS instance ({}) to become {}",
                instance_id,
                target.join("/")
            ))
        })?;
    Ok(())
}

/// [`StatusProbe`] backed by the DCS instance and job APIs
pub(crate) struct InstanceProbe<'a> {
    dcs: &'a ServiceClient,
    instance_id: &'a str,
}

impl<'a> InstanceProbe<'a> {
    pub(crate) fn new(dcs: &'a ServiceClient, instance_id: &'a str) -> Self {
        Self { dcs, instance_id }
    }
}

#[async_trait]
impl StatusProbe for InstanceProbe<'_> {
    async fn instance_state(&self) -> Result<Refreshed> {
        refresh_instance_state(self.dcs, self.instance_id).await
    }

    async fn job_state(&self, job_id: &str) -> Result<Refreshed> {
        let request = ApiRequest::get("v2/{project_id}/jobs/{job_id}").path_param("job_id", job_id);
        let body = self.dcs.send(&request).await?.body;
        let status = search_string("status", &body).unwrap_or_default();
        match status.as_str() {
            JOB_SUCCESS => Ok(Refreshed::new(body, JOB_SUCCESS)),
            "FAIL" | "FAILED" => Err(CoreError::TaskFailed(format!(
                "job {} failed: {}",
                job_id,
                search_string("fail_reason", &body).unwrap_or_else(|| "no reason given".to_string())
            ))),
            _ => Ok(Refreshed::new(body, JOB_PENDING)),
        }
    }
}

/// A DCS call that is repeated while the instance reports a busy error code
pub(crate) fn busy_retry<'a>(
    label: impl Into<String>,
    client: &'a ServiceClient,
    request: ApiRequest,
    probe: &'a InstanceProbe<'a>,
    retry_delay: Duration,
    timeout: Duration,
) -> Operation<'a> {
    Operation::new(label, client, request, timeout)
        .probe(probe)
        .retry_on(
            CoreError::is_retryable_operation,
            RetryMode::after_ready(retry_delay),
        )
}

/// Body of an instance list filtered to one ID
pub(crate) fn find_by_id<'v>(items: &'v [Value], key: &str, id: &str) -> Option<&'v Value> {
    items
        .iter()
        .find(|item| item.get(key).and_then(Value::as_str) == Some(id))
}
