//! Spinner output for long running operations
//!
//! Resource operations report progress through the provider's callback;
//! this turns those events into an indicatif spinner on stderr.

use std::time::Duration;

use huaweictl_core::{ProgressCallback, ProgressEvent};
use indicatif::{ProgressBar, ProgressStyle};

pub struct WaitSpinner {
    pb: ProgressBar,
}

impl WaitSpinner {
    pub fn new(message: impl Into<String>) -> Self {
        let pb = ProgressBar::new_spinner();
        if let Ok(style) =
            ProgressStyle::default_spinner().template("{spinner:.green} {msg} [{elapsed_precise}]")
        {
            pb.set_style(style);
        }
        pb.set_message(message.into());
        pb.enable_steady_tick(Duration::from_millis(120));
        Self { pb }
    }

    /// Callback to install on the provider
    pub fn callback(&self) -> ProgressCallback {
        let pb = self.pb.clone();
        Box::new(move |event: ProgressEvent| pb.set_message(describe(&event)))
    }

    pub fn finish(&self) {
        self.pb.finish_and_clear();
    }
}

fn describe(event: &ProgressEvent) -> String {
    match event {
        ProgressEvent::Started { operation } => format!("{}: started", operation),
        ProgressEvent::Retrying {
            operation,
            attempt,
            error_code,
        } => format!("{}: busy ({}), retry #{}", operation, error_code, attempt),
        ProgressEvent::Polling {
            operation, status, ..
        } => format!("{}: {}", operation, status),
        ProgressEvent::Completed { operation } => format!("{}: done", operation),
        ProgressEvent::Failed { operation, error } => format!("{}: failed: {}", operation, error),
    }
}
