//! Progress reporting for long running cloud operations
//!
//! Wait loops and retried operations emit [`ProgressEvent`]s through an
//! optional callback installed on the [`Provider`](crate::Provider). The CLI
//! uses this to drive a spinner; the plugin server leaves it unset.

use std::time::Duration;

/// Progress events emitted during async operations
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    /// An operation or wait loop has started
    Started { operation: String },
    /// A busy error was returned and the call will be repeated
    Retrying {
        operation: String,
        attempt: u32,
        error_code: String,
    },
    /// Polling iteration with current status
    Polling {
        operation: String,
        status: String,
        elapsed: Duration,
    },
    /// Target state reached
    Completed { operation: String },
    /// Operation gave up
    Failed { operation: String, error: String },
}

impl ProgressEvent {
    /// Name of the operation this event belongs to
    pub fn operation(&self) -> &str {
        match self {
            ProgressEvent::Started { operation }
            | ProgressEvent::Retrying { operation, .. }
            | ProgressEvent::Polling { operation, .. }
            | ProgressEvent::Completed { operation }
            | ProgressEvent::Failed { operation, .. } => operation,
        }
    }
}

/// Callback type for progress updates
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// Helper to emit progress events
pub(crate) fn emit(callback: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = callback {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_emit_invokes_callback() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cb: ProgressCallback = Box::new(move |e| sink.lock().unwrap().push(e));

        emit(
            Some(&cb),
            ProgressEvent::Started {
                operation: "create DCS backup".to_string(),
            },
        );
        emit(
            None,
            ProgressEvent::Completed {
                operation: "ignored".to_string(),
            },
        );

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].operation(), "create DCS backup");
    }
}
