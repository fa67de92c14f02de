//! Retry-then-poll driver for mutating cloud operations
//!
//! Many DCS calls are rejected while the instance (or its billing order) is
//! busy with another change. [`Operation`] sends the call, classifies the
//! failure with a predicate, waits for the instance to become `RUNNING`
//! again and repeats the call. Once the call is accepted it follows the job
//! ID and order ID found in the response, and optionally confirms that the
//! instance is back to `RUNNING`.
//!
//! The driver is an explicit state machine:
//!
//! ```text
//! Calling --accepted--> Polling(Job) -> Polling(Order) -> Polling(Ready) -> Done
//!    |  ^
//!  busy |
//!    v  |
//! Retrying --still busy past deadline--> Failed
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let response = Operation::new("resetting account password", &dcs, request, Duration::from_secs(1800))
//!     .probe(&probe)
//!     .retry_on(CoreError::is_retryable_operation, RetryMode::after_ready(Duration::from_secs(10)))
//!     .run()
//!     .await?;
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::client::{ApiRequest, ApiResponse, ServiceClient};
use crate::error::{CoreError, Result};
use crate::progress::ProgressEvent;
use crate::services::bss;
use crate::utils::search_string;
use crate::wait::{Refreshed, StateChangeConf};

pub const STATE_RUNNING: &str = "RUNNING";
pub const JOB_PENDING: &str = "PENDING";
pub const JOB_SUCCESS: &str = "SUCCESS";

const JOB_POLL_INTERVAL: Duration = Duration::from_secs(10);
const READY_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Status lookups an [`Operation`] needs about the resource it acts on
#[async_trait]
pub trait StatusProbe: Send + Sync {
    /// Current status of the parent instance
    async fn instance_state(&self) -> Result<Refreshed>;

    /// Status of an asynchronous job, normalized to `PENDING` or `SUCCESS`.
    /// A failed job is reported as an error.
    async fn job_state(&self, job_id: &str) -> Result<Refreshed>;
}

/// What to do before repeating a call rejected by the retry predicate
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryMode {
    /// Fail on the first error
    Never,
    /// Sleep a fixed interval, then call again
    Fixed(Duration),
    /// Wait for the instance to report `RUNNING`, then call again
    AfterReady {
        delay: Duration,
        poll_interval: Duration,
    },
}

impl RetryMode {
    /// Wait for `RUNNING` with the given delay and a 10 second poll interval
    pub const fn after_ready(delay: Duration) -> Self {
        RetryMode::AfterReady {
            delay,
            poll_interval: READY_POLL_INTERVAL,
        }
    }
}

/// Result of a finished operation
#[derive(Debug, Clone)]
pub struct Completed {
    pub response: ApiResponse,
    pub job_id: Option<String>,
    pub order_id: Option<String>,
    /// Main resource provisioned by the order, when one was followed
    pub resource_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PollPhase {
    Job,
    Order,
    Ready,
}

#[derive(Debug)]
enum OperationState {
    Calling { attempt: u32 },
    Retrying { attempt: u32, cause: CoreError },
    Polling { done: Completed, phase: PollPhase },
    Done(Completed),
    Failed(CoreError),
}

/// A mutating API call with retry and follow-up polling
pub struct Operation<'a> {
    label: String,
    client: &'a ServiceClient,
    request: ApiRequest,
    timeout: Duration,
    probe: Option<&'a dyn StatusProbe>,
    retryable: fn(&CoreError) -> bool,
    retry: RetryMode,
    job_id_expr: Option<String>,
    order_id_expr: Option<String>,
    wait_ready: bool,
}

fn never(_: &CoreError) -> bool {
    false
}

impl<'a> Operation<'a> {
    pub fn new(
        label: impl Into<String>,
        client: &'a ServiceClient,
        request: ApiRequest,
        timeout: Duration,
    ) -> Self {
        Self {
            label: label.into(),
            client,
            request,
            timeout,
            probe: None,
            retryable: never,
            retry: RetryMode::Never,
            job_id_expr: None,
            order_id_expr: None,
            wait_ready: false,
        }
    }

    /// Status source for retry waits, job polling and readiness checks
    pub fn probe(mut self, probe: &'a dyn StatusProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Repeat the call while `predicate` accepts the error
    pub fn retry_on(mut self, predicate: fn(&CoreError) -> bool, mode: RetryMode) -> Self {
        self.retryable = predicate;
        self.retry = mode;
        self
    }

    /// JMESPath expression locating a job ID in the response
    pub fn job_id(mut self, expression: impl Into<String>) -> Self {
        self.job_id_expr = Some(expression.into());
        self
    }

    /// JMESPath expression locating a billing order ID in the response
    pub fn order_id(mut self, expression: impl Into<String>) -> Self {
        self.order_id_expr = Some(expression.into());
        self
    }

    /// Require two consecutive `RUNNING` observations after the call
    pub fn wait_ready(mut self) -> Self {
        self.wait_ready = true;
        self
    }

    fn remaining(&self, deadline: Instant) -> Duration {
        deadline.saturating_duration_since(Instant::now())
    }

    fn require_probe(&self) -> Result<&'a dyn StatusProbe> {
        self.probe.ok_or_else(|| {
            CoreError::Validation(format!("{} needs an instance status probe", self.label))
        })
    }

    /// Drive the state machine to completion
    pub async fn run(self) -> Result<Completed> {
        let deadline = Instant::now() + self.timeout;
        let mut state = OperationState::Calling { attempt: 1 };

        loop {
            state = match state {
                OperationState::Calling { attempt } => self.call(attempt).await,
                OperationState::Retrying { attempt, cause } => {
                    self.retry_after(attempt, cause, deadline).await
                }
                OperationState::Polling { done, phase } => self.poll(done, phase, deadline).await,
                OperationState::Done(done) => {
                    debug!("{} finished", self.label);
                    return Ok(done);
                }
                OperationState::Failed(err) => {
                    self.client.provider().emit(ProgressEvent::Failed {
                        operation: self.label.clone(),
                        error: err.to_string(),
                    });
                    return Err(err);
                }
            };
        }
    }

    async fn call(&self, attempt: u32) -> OperationState {
        debug!("{} (attempt {})", self.label, attempt);
        match self.client.send(&self.request).await {
            Ok(response) => {
                let job_id = self
                    .job_id_expr
                    .as_deref()
                    .and_then(|e| search_string(e, &response.body))
                    .filter(|s| !s.is_empty());
                let order_id = self
                    .order_id_expr
                    .as_deref()
                    .and_then(|e| search_string(e, &response.body))
                    .filter(|s| !s.is_empty());
                OperationState::Polling {
                    done: Completed {
                        response,
                        job_id,
                        order_id,
                        resource_id: None,
                    },
                    phase: PollPhase::Job,
                }
            }
            Err(err) if self.retry != RetryMode::Never && (self.retryable)(&err) => {
                OperationState::Retrying {
                    attempt,
                    cause: err,
                }
            }
            Err(err) => OperationState::Failed(err),
        }
    }

    async fn retry_after(&self, attempt: u32, cause: CoreError, deadline: Instant) -> OperationState {
        let remaining = self.remaining(deadline);
        if remaining.is_zero() {
            return OperationState::Failed(cause.context(format!(
                "{} still rejected after {} attempts",
                self.label, attempt
            )));
        }

        let code = cause.error_code().unwrap_or_default().to_string();
        info!(
            "{} rejected with {}, retrying (attempt {})",
            self.label,
            code,
            attempt + 1
        );
        let provider = self.client.provider();
        provider.emit(ProgressEvent::Retrying {
            operation: self.label.clone(),
            attempt: attempt + 1,
            error_code: code,
        });

        match self.retry {
            RetryMode::Never => return OperationState::Failed(cause),
            RetryMode::Fixed(interval) => provider.pause(interval.min(remaining)).await,
            RetryMode::AfterReady {
                delay,
                poll_interval,
            } => {
                let probe = match self.require_probe() {
                    Ok(probe) => probe,
                    Err(e) => return OperationState::Failed(e),
                };
                // Any state other than RUNNING keeps waiting.
                let conf = StateChangeConf::new(&[], &[STATE_RUNNING], remaining)
                    .describe(format!("{} (waiting to retry)", self.label))
                    .delay(delay)
                    .poll_interval(poll_interval);
                if let Err(err) = provider
                    .wait_for_state(conf, move || probe.instance_state())
                    .await
                {
                    return if err.is_timeout() {
                        OperationState::Failed(cause.context(format!(
                            "{} still rejected when the timeout expired",
                            self.label
                        )))
                    } else {
                        OperationState::Failed(err)
                    };
                }
            }
        }

        OperationState::Calling {
            attempt: attempt + 1,
        }
    }

    async fn poll(&self, mut done: Completed, phase: PollPhase, deadline: Instant) -> OperationState {
        let provider = self.client.provider();
        let remaining = self.remaining(deadline);

        match phase {
            PollPhase::Job => {
                if let Some(job_id) = done.job_id.clone() {
                    let probe = match self.require_probe() {
                        Ok(probe) => probe,
                        Err(e) => return OperationState::Failed(e),
                    };
                    let conf = StateChangeConf::new(&[JOB_PENDING], &[JOB_SUCCESS], remaining)
                        .describe(format!("{} (job {})", self.label, job_id))
                        .delay(JOB_POLL_INTERVAL)
                        .poll_interval(JOB_POLL_INTERVAL);
                    let job = job_id.as_str();
                    if let Err(err) = provider
                        .wait_for_state(conf, move || probe.job_state(job))
                        .await
                    {
                        return OperationState::Failed(
                            err.context(format!("error waiting for job ({}) to complete", job_id)),
                        );
                    }
                }
                OperationState::Polling {
                    done,
                    phase: PollPhase::Order,
                }
            }
            PollPhase::Order => {
                if let Some(order_id) = done.order_id.clone() {
                    let bss = match provider.client("bss") {
                        Ok(bss) => bss,
                        Err(e) => return OperationState::Failed(e),
                    };
                    if let Err(err) = bss::wait_order_complete(&bss, &order_id, remaining).await {
                        return OperationState::Failed(err);
                    }
                    let remaining = self.remaining(deadline);
                    match bss::wait_order_resource_complete(&bss, &order_id, remaining).await {
                        Ok(resource_id) => done.resource_id = Some(resource_id),
                        Err(err) => return OperationState::Failed(err),
                    }
                }
                OperationState::Polling {
                    done,
                    phase: PollPhase::Ready,
                }
            }
            PollPhase::Ready => {
                if self.wait_ready {
                    let probe = match self.require_probe() {
                        Ok(probe) => probe,
                        Err(e) => return OperationState::Failed(e),
                    };
                    let conf = StateChangeConf::new(&[], &[STATE_RUNNING], remaining)
                        .describe(format!("{} (waiting for instance)", self.label))
                        .delay(READY_POLL_INTERVAL)
                        .poll_interval(READY_POLL_INTERVAL)
                        .continuous_target_occurrence(2);
                    if let Err(err) = provider
                        .wait_for_state(conf, move || probe.instance_state())
                        .await
                    {
                        return OperationState::Failed(err);
                    }
                }
                OperationState::Done(done)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Provider;
    use crate::progress::ProgressCallback;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    /// Reports BUSY for the first `busy_polls` instance refreshes
    struct ScriptedProbe {
        busy_polls: u32,
        instance_calls: AtomicU32,
        job_calls: AtomicU32,
    }

    impl ScriptedProbe {
        fn new(busy_polls: u32) -> Self {
            Self {
                busy_polls,
                instance_calls: AtomicU32::new(0),
                job_calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl StatusProbe for ScriptedProbe {
        async fn instance_state(&self) -> Result<Refreshed> {
            let n = self.instance_calls.fetch_add(1, Ordering::SeqCst);
            let state = if n < self.busy_polls { "EXTENDING" } else { STATE_RUNNING };
            Ok(Refreshed::new(json!({ "status": state }), state))
        }

        async fn job_state(&self, job_id: &str) -> Result<Refreshed> {
            let n = self.job_calls.fetch_add(1, Ordering::SeqCst);
            if job_id == "job-fail" {
                return Err(CoreError::TaskFailed(format!("job {} failed", job_id)));
            }
            let state = if n == 0 { JOB_PENDING } else { JOB_SUCCESS };
            Ok(Refreshed::new(json!({ "status": state }), state))
        }
    }

    fn provider(server: &MockServer, progress: Option<ProgressCallback>) -> Provider {
        let mut builder = Provider::builder()
            .region("cn-north-4")
            .project_id("p-1")
            .auth_token("token")
            .endpoint("dcs", server.uri())
            .endpoint("bss", server.uri())
            .poll_interval(Duration::from_millis(5));
        if let Some(cb) = progress {
            builder = builder.on_progress(cb);
        }
        builder.build().unwrap()
    }

    fn busy() -> ResponseTemplate {
        ResponseTemplate::new(400).set_body_json(json!({
            "error_code": "DCS.4049",
            "error_msg": "instance is being modified"
        }))
    }

    #[tokio::test]
    async fn test_retries_busy_error_after_instance_is_running() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/p-1/instances/inst-1/configs"))
            .respond_with(busy())
            .up_to_n_times(2)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/v2/p-1/instances/inst-1/configs"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let provider = provider(
            &server,
            Some(Box::new(move |e: ProgressEvent| sink.lock().unwrap().push(e))),
        );
        let dcs = provider.client("dcs").unwrap();
        let probe = ScriptedProbe::new(1);

        let request = ApiRequest::put("v2/{project_id}/instances/{instance_id}/configs")
            .path_param("instance_id", "inst-1")
            .body(json!({ "redis_config": [] }));
        let done = Operation::new("modifying parameters", &dcs, request, Duration::from_secs(5))
            .probe(&probe)
            .retry_on(
                CoreError::is_retryable_operation,
                RetryMode::after_ready(Duration::from_millis(1)),
            )
            .run()
            .await
            .unwrap();

        assert_eq!(done.response.status, 204);
        let retries = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ProgressEvent::Retrying { .. }))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/p-1/instances/inst-1/password"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error_code": "DCS.4001",
                "error_msg": "invalid password"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let provider = provider(&server, None);
        let dcs = provider.client("dcs").unwrap();
        let request = ApiRequest::put("v2/{project_id}/instances/inst-1/password");
        let err = Operation::new("updating password", &dcs, request, Duration::from_secs(5))
            .retry_on(
                CoreError::is_retryable_operation,
                RetryMode::Fixed(Duration::from_millis(1)),
            )
            .run()
            .await
            .unwrap_err();

        assert_eq!(err.error_code(), Some("DCS.4001"));
    }

    #[tokio::test]
    async fn test_busy_until_deadline_returns_cause() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/p-1/instances/inst-1/resize"))
            .respond_with(busy())
            .mount(&server)
            .await;

        let provider = provider(&server, None);
        let dcs = provider.client("dcs").unwrap();
        let request = ApiRequest::post("v2/{project_id}/instances/inst-1/resize");
        let err = Operation::new("resizing instance", &dcs, request, Duration::from_millis(50))
            .retry_on(
                CoreError::is_retryable_operation,
                RetryMode::Fixed(Duration::from_millis(5)),
            )
            .run()
            .await
            .unwrap_err();

        assert!(err.is_retryable_operation());
        assert!(err.to_string().contains("resizing instance still rejected"));
    }

    #[tokio::test]
    async fn test_follows_job_then_waits_ready() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/p-1/instances/inst-1/transparent-client-ip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-1" })))
            .mount(&server)
            .await;

        let provider = provider(&server, None);
        let dcs = provider.client("dcs").unwrap();
        let probe = ScriptedProbe::new(1);
        let request = ApiRequest::put("v2/{project_id}/instances/inst-1/transparent-client-ip");
        let done = Operation::new("switching client IP pass-through", &dcs, request, Duration::from_secs(5))
            .probe(&probe)
            .job_id("job_id")
            .wait_ready()
            .run()
            .await
            .unwrap();

        assert_eq!(done.job_id.as_deref(), Some("job-1"));
        assert_eq!(probe.job_calls.load(Ordering::SeqCst), 2);
        // one EXTENDING, then two consecutive RUNNING
        assert_eq!(probe.instance_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_failed_job_is_fatal() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v2/p-1/instances/inst-1/transparent-client-ip"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "job_id": "job-fail" })))
            .mount(&server)
            .await;

        let provider = provider(&server, None);
        let dcs = provider.client("dcs").unwrap();
        let probe = ScriptedProbe::new(0);
        let request = ApiRequest::put("v2/{project_id}/instances/inst-1/transparent-client-ip");
        let err = Operation::new("switching client IP pass-through", &dcs, request, Duration::from_secs(5))
            .probe(&probe)
            .job_id("job_id")
            .run()
            .await
            .unwrap_err();

        assert!(matches!(err.root(), CoreError::TaskFailed(_)));
    }

    #[tokio::test]
    async fn test_follows_order_to_resource() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v2/p-1/instances/inst-1/resize"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "order_id": "CS42" })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/orders/customer-orders/details/CS42"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "order_info": { "status": 5 }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v2/orders/suscriptions/resources/query"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{ "resource_id": "inst-1" }]
            })))
            .mount(&server)
            .await;

        let provider = provider(&server, None);
        let dcs = provider.client("dcs").unwrap();
        let request = ApiRequest::post("v2/{project_id}/instances/inst-1/resize");
        let done = Operation::new("resizing instance", &dcs, request, Duration::from_secs(5))
            .order_id("order_id")
            .run()
            .await
            .unwrap();

        assert_eq!(done.order_id.as_deref(), Some("CS42"));
        assert_eq!(done.resource_id.as_deref(), Some("inst-1"));
    }
}
