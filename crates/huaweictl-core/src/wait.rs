//! State refresh polling
//!
//! [`StateChangeConf`] repeatedly calls a refresh function until the
//! reported state is in the target set. Pending states keep the loop going,
//! any other state fails it. Delays and intervals are fixed; there is no
//! backoff.
//!
//! # Example
//!
//! ```rust,ignore
//! use huaweictl_core::wait::{Refreshed, StateChangeConf};
//! use std::time::Duration;
//!
//! let conf = StateChangeConf::new(&["waiting", "backuping"], &["succeed"], Duration::from_secs(600))
//!     .delay(Duration::from_secs(5))
//!     .poll_interval(Duration::from_secs(5));
//!
//! let backup = conf.wait_for_state(|| refresh_backup(&client, &id), None).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Instant, sleep, sleep_until, timeout_at};
use tracing::{debug, trace};

use crate::error::{CoreError, Result};
use crate::progress::{ProgressCallback, ProgressEvent, emit};

/// Default number of consecutive "not found" refreshes tolerated while waiting
pub const DEFAULT_NOT_FOUND_CHECKS: u32 = 20;

/// Default fixed interval between refreshes
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Result of one refresh call
#[derive(Debug, Clone, PartialEq)]
pub struct Refreshed {
    /// The object that was read; `None` means it could not be found
    pub object: Option<Value>,
    /// Status string used to match pending and target sets
    pub state: String,
}

impl Refreshed {
    pub fn new(object: Value, state: impl Into<String>) -> Self {
        Self {
            object: Some(object),
            state: state.into(),
        }
    }

    /// The watched object does not exist (anymore)
    pub fn gone() -> Self {
        Self {
            object: None,
            state: String::new(),
        }
    }
}

/// Polling configuration for a single wait
#[derive(Debug, Clone)]
pub struct StateChangeConf {
    label: String,
    pending: Vec<String>,
    target: Vec<String>,
    timeout: Duration,
    delay: Duration,
    poll_interval: Duration,
    continuous_target_occurrence: u32,
    not_found_checks: u32,
    interval_cap: Option<Duration>,
}

impl StateChangeConf {
    pub fn new(pending: &[&str], target: &[&str], timeout: Duration) -> Self {
        Self {
            label: "resource".to_string(),
            pending: pending.iter().map(|s| s.to_string()).collect(),
            target: target.iter().map(|s| s.to_string()).collect(),
            timeout,
            delay: Duration::ZERO,
            poll_interval: DEFAULT_POLL_INTERVAL,
            continuous_target_occurrence: 1,
            not_found_checks: DEFAULT_NOT_FOUND_CHECKS,
            interval_cap: None,
        }
    }

    /// Human readable name used in logs and progress events
    pub fn describe(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    /// Wait before the first refresh
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Number of consecutive target observations required
    pub fn continuous_target_occurrence(mut self, count: u32) -> Self {
        self.continuous_target_occurrence = count.max(1);
        self
    }

    pub fn not_found_checks(mut self, checks: u32) -> Self {
        self.not_found_checks = checks;
        self
    }

    /// Upper bound applied to both the delay and the poll interval
    pub fn interval_cap(mut self, cap: Option<Duration>) -> Self {
        if cap.is_some() {
            self.interval_cap = cap;
        }
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn capped(&self, d: Duration) -> Duration {
        match self.interval_cap {
            Some(cap) => d.min(cap),
            None => d,
        }
    }

    fn expected(&self) -> String {
        self.target.join(", ")
    }

    fn timed_out(&self, last_state: &str) -> CoreError {
        CoreError::WaitTimeout {
            last_state: last_state.to_string(),
            expected: self.expected(),
            timeout: self.timeout,
        }
    }

    /// Poll `refresh` until a target state is observed.
    ///
    /// Returns the object from the final refresh. When the target set is
    /// empty, the wait completes once the object is gone and `None` is
    /// returned.
    pub async fn wait_for_state<F, Fut>(
        &self,
        mut refresh: F,
        progress: Option<&ProgressCallback>,
    ) -> Result<Option<Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refreshed>>,
    {
        let start = Instant::now();
        let deadline = start + self.timeout;
        let interval = self.capped(self.poll_interval);
        let delay = self.capped(self.delay);

        debug!(
            "Waiting for {} to reach [{}] (timeout {:?})",
            self.label,
            self.expected(),
            self.timeout
        );
        emit(
            progress,
            ProgressEvent::Started {
                operation: self.label.clone(),
            },
        );

        let mut last_state = String::new();
        let mut target_hits = 0u32;
        let mut not_found = 0u32;

        if !delay.is_zero() {
            sleep_until((start + delay).min(deadline)).await;
        }

        loop {
            if Instant::now() >= deadline {
                return Err(self.fail(progress, self.timed_out(&last_state)));
            }

            let refreshed = match timeout_at(deadline, refresh()).await {
                Ok(Ok(r)) => r,
                Ok(Err(e)) => return Err(self.fail(progress, e)),
                Err(_) => return Err(self.fail(progress, self.timed_out(&last_state))),
            };
            trace!("{} refresh returned state '{}'", self.label, refreshed.state);

            emit(
                progress,
                ProgressEvent::Polling {
                    operation: self.label.clone(),
                    status: refreshed.state.clone(),
                    elapsed: start.elapsed(),
                },
            );

            match refreshed.object {
                None if self.target.is_empty() => {
                    target_hits += 1;
                    if target_hits >= self.continuous_target_occurrence {
                        self.complete(progress);
                        return Ok(None);
                    }
                }
                None => {
                    not_found += 1;
                    if not_found > self.not_found_checks {
                        return Err(self.fail(
                            progress,
                            CoreError::ResourceGone {
                                checks: self.not_found_checks,
                            },
                        ));
                    }
                }
                Some(object) => {
                    not_found = 0;
                    last_state = refreshed.state;

                    if self.target.contains(&last_state) {
                        target_hits += 1;
                        if target_hits >= self.continuous_target_occurrence {
                            self.complete(progress);
                            return Ok(Some(object));
                        }
                    } else if self.pending.contains(&last_state) {
                        target_hits = 0;
                    } else if !self.pending.is_empty() {
                        return Err(self.fail(
                            progress,
                            CoreError::UnexpectedState {
                                state: last_state,
                                expected: self.expected(),
                            },
                        ));
                    }
                }
            }

            let now = Instant::now();
            if now + interval >= deadline {
                sleep_until(deadline).await;
            } else {
                sleep(interval).await;
            }
        }
    }

    fn complete(&self, progress: Option<&ProgressCallback>) {
        debug!("{} reached target state", self.label);
        emit(
            progress,
            ProgressEvent::Completed {
                operation: self.label.clone(),
            },
        );
    }

    fn fail(&self, progress: Option<&ProgressCallback>, err: CoreError) -> CoreError {
        emit(
            progress,
            ProgressEvent::Failed {
                operation: self.label.clone(),
                error: err.to_string(),
            },
        );
        err
    }
}
