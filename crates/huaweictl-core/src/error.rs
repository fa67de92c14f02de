//! Unified error handling for huaweictl-core
//!
//! Every cloud call, wait loop and resource handler returns [`CoreError`].
//! Callers classify errors with the helper methods instead of matching on
//! HTTP details.
//!
//! # Example
//!
//! ```rust
//! use huaweictl_core::{ApiError, CoreError};
//!
//! fn handle_error(err: CoreError) {
//!     if err.is_not_found() {
//!         println!("Resource is gone");
//!     } else if let Some(code) = err.error_code() {
//!         println!("Cloud rejected the request with {code}");
//!     }
//! }
//!
//! let err: CoreError = ApiError::new(404, "GET", "https://dcs/v2/p/instances/x", "{}").into();
//! assert!(err.is_not_found());
//! ```

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

/// A non-success HTTP response from a cloud endpoint
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub method: String,
    pub url: String,
    /// Vendor error code, e.g. `DCS.4049`
    pub error_code: Option<String>,
    pub message: String,
    pub body: String,
}

impl ApiError {
    /// Build an error from a raw response body, extracting the vendor code and message.
    ///
    /// Huawei services are not consistent about the field names, so the usual
    /// variants are all tried: `error_code`/`error_msg`, `errCode`/`errMsg`,
    /// `code`/`message` and a nested `error` object.
    pub fn new(status: u16, method: &str, url: &str, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();
        let pick = |keys: &[&str]| -> Option<String> {
            let v = parsed.as_ref()?;
            let source = v.get("error").filter(|e| e.is_object()).unwrap_or(v);
            keys.iter()
                .find_map(|k| source.get(*k).or_else(|| v.get(*k)))
                .and_then(|s| match s {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                })
        };

        let error_code = pick(&["error_code", "errCode", "code"]);
        let message = pick(&["error_msg", "errMsg", "message", "error_description"])
            .unwrap_or_else(|| body.trim().to_string());

        Self {
            status,
            method: method.to_string(),
            url: url.to_string(),
            error_code,
            message,
            body: body.to_string(),
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: HTTP {}", self.method, self.url, self.status)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{}]", code)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        Ok(())
    }
}

/// Core error type for cloud operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// The cloud API answered with an unexpected status code
    #[error("{0}")]
    Api(ApiError),

    /// Transport level failure
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Response body could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A wait loop ran out of time
    #[error(
        "timeout while waiting for state to become '{expected}' (last state: '{last_state}', timeout: {timeout:?})"
    )]
    WaitTimeout {
        last_state: String,
        expected: String,
        timeout: Duration,
    },

    /// A wait loop observed a state that is neither pending nor target
    #[error("unexpected state '{state}', wanted target '{expected}'")]
    UnexpectedState { state: String, expected: String },

    /// A wait loop stopped seeing the object it was watching
    #[error("couldn't find resource ({checks} retries)")]
    ResourceGone { checks: u32 },

    /// Vendor job or task finished unsuccessfully
    #[error("Task failed: {0}")]
    TaskFailed(String),

    /// Invalid user input
    #[error("Validation error: {0}")]
    Validation(String),

    /// JMESPath expression could not be compiled or evaluated
    #[error("invalid path expression '{expression}': {message}")]
    Query { expression: String, message: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Operation context around another error
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<ApiError> for CoreError {
    fn from(err: ApiError) -> Self {
        CoreError::Api(err)
    }
}

impl From<crate::config::ConfigError> for CoreError {
    fn from(err: crate::config::ConfigError) -> Self {
        CoreError::Config(err.to_string())
    }
}

impl CoreError {
    /// Wrap this error with the name of the operation that failed
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        CoreError::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any context wrappers
    #[must_use]
    pub fn root(&self) -> &CoreError {
        match self {
            CoreError::Context { source, .. } => source.root(),
            other => other,
        }
    }

    /// The API error behind this error, if any
    #[must_use]
    pub fn api(&self) -> Option<&ApiError> {
        match self.root() {
            CoreError::Api(e) => Some(e),
            _ => None,
        }
    }

    /// HTTP status code of the failed call
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.api().map(|e| e.status)
    }

    /// Vendor error code of the failed call
    #[must_use]
    pub fn error_code(&self) -> Option<&str> {
        self.api().and_then(|e| e.error_code.as_deref())
    }

    /// Returns true if this is a "not found" error (404)
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Returns true if this is an authentication/authorization error (401/403)
    #[must_use]
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }

    /// Returns true if this is a bad request error (400)
    #[must_use]
    pub fn is_bad_request(&self) -> bool {
        matches!(self.root(), CoreError::Validation(_)) || self.status() == Some(400)
    }

    /// Returns true if this is a server error (5xx)
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        self.status().is_some_and(|s| s >= 500)
    }

    /// Returns true if a wait loop timed out
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        match self.root() {
            CoreError::WaitTimeout { .. } => true,
            CoreError::Http(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Turn a 400 carrying one of `codes` into a 404.
    ///
    /// Some APIs report deleted objects as a bad request with a specific
    /// code instead of a plain 404.
    #[must_use]
    pub fn convert_400_to_404(self, codes: &[&str]) -> Self {
        match self {
            CoreError::Api(mut e)
                if e.status == 400
                    && e.error_code.as_deref().is_some_and(|c| codes.contains(&c)) =>
            {
                e.status = 404;
                CoreError::Api(e)
            }
            other => other,
        }
    }
}

/// Error codes of DCS operations rejected because the instance or its
/// billing order is busy with another change
pub const RETRYABLE_OPERATION_CODES: &[&str] = &[
    "DCS.4026",
    "DCS.4049",
    "DCS.4096",
    "DCS.4097",
    "DCS.4111",
    "DCS.4113",
    "DCS.4114",
    "DCS.4115",
    "DCS.4116",
    "DCS.4117",
    "DCS.4118",
    "DCS.4120",
    "DCS.4975",
    "CBC.99003651",
];

impl CoreError {
    /// A 400 whose error code says the target is busy and the call can be repeated
    #[must_use]
    pub fn is_retryable_operation(&self) -> bool {
        self.status() == Some(400)
            && self
                .error_code()
                .is_some_and(|c| RETRYABLE_OPERATION_CODES.contains(&c))
    }
}

/// Attach operation context to fallible results
pub trait ResultExt<T> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
