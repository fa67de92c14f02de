//! Error types for huaweictl
//!
//! Structured CLI errors with suggestions, printed as cargo-style
//! diagnostics.

use colored::Colorize;
use huaweictl_core::{ConfigError, CoreError};
use thiserror::Error;

/// Cargo-style diagnostic formatter for CLI errors.
///
/// Produces structured output like:
/// ```text
/// error: Profile 'prod' not found
///
///   tip: List available profiles: huaweictl profile list
/// ```
pub struct CliDiagnostic {
    message: String,
    detail: Option<String>,
    tips: Vec<(String, Vec<String>)>,
}

impl CliDiagnostic {
    /// Start a new error diagnostic with the given message.
    pub fn error(message: &str) -> Self {
        Self {
            message: message.to_string(),
            detail: None,
            tips: Vec::new(),
        }
    }

    /// Add a detail line below the error message.
    pub fn detail(mut self, text: &str) -> Self {
        self.detail = Some(text.to_string());
        self
    }

    /// Add a tip with optional example commands.
    pub fn tip(mut self, description: &str, commands: &[&str]) -> Self {
        self.tips.push((
            description.to_string(),
            commands.iter().map(|s| s.to_string()).collect(),
        ));
        self
    }

    /// Print the diagnostic to stderr with colored formatting.
    pub fn print(&self) {
        eprint!("{}{}", "error".red().bold(), ": ".bold());
        eprintln!("{}", self.message);

        if let Some(detail) = &self.detail {
            eprintln!("  {}", detail);
        }

        for (description, commands) in &self.tips {
            eprintln!();
            eprint!("  {}{}", "tip".yellow().bold(), ": ".bold());
            eprintln!("{}", description);
            for cmd in commands {
                eprintln!("      {}", cmd);
            }
        }
    }
}

/// Main error type for the huaweictl application
#[derive(Error, Debug)]
pub enum HuaweiCtlError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("No profile configured. Use 'huaweictl profile set' to configure a profile.")]
    NoProfileConfigured,

    #[error("Missing credentials for profile '{name}'")]
    MissingCredentials { name: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("API error: {message}")]
    ApiError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Unknown type '{name}'")]
    UnknownType { name: String },

    #[error("File error for '{path}': {message}")]
    FileError { path: String, message: String },

    #[error("Connection error: {message}")]
    ConnectionError { message: String },

    #[error("Timeout: {message}")]
    Timeout { message: String },

    #[error("Output formatting error: {message}")]
    OutputError { message: String },
}

/// Result type for huaweictl operations
pub type Result<T> = std::result::Result<T, HuaweiCtlError>;

impl HuaweiCtlError {
    /// Get helpful suggestions for resolving this error
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            HuaweiCtlError::ProfileNotFound { name } => vec![
                "List available profiles: huaweictl profile list".to_string(),
                format!(
                    "Create profile '{}': huaweictl --region <region> profile set {} --auth-token <token>",
                    name, name
                ),
            ],
            HuaweiCtlError::NoProfileConfigured => vec![
                "Create a token profile: huaweictl --region <region> profile set <name> --auth-token <token>".to_string(),
                "Or set HW_REGION_NAME and HW_AUTH_TOKEN in the environment".to_string(),
            ],
            HuaweiCtlError::MissingCredentials { name } => vec![
                format!("Check profile details: huaweictl profile show {}", name),
                "Set HW_PASSWORD or store a password with 'huaweictl profile set'".to_string(),
            ],
            HuaweiCtlError::AuthenticationFailed { .. } => vec![
                "Check your credentials: huaweictl profile show <profile>".to_string(),
                "Tokens expire after 24 hours; issue a new one or use an IAM password profile"
                    .to_string(),
            ],
            HuaweiCtlError::ConnectionError { .. } => vec![
                "Check network connectivity".to_string(),
                "Verify endpoint overrides: huaweictl profile show <profile>".to_string(),
            ],
            HuaweiCtlError::UnknownType { .. } => {
                vec!["List supported types: huaweictl types".to_string()]
            }
            HuaweiCtlError::InvalidInput { .. } => vec![
                "Check the command syntax: huaweictl <command> --help".to_string(),
                "Verify the --data and --state arguments are valid JSON".to_string(),
            ],
            HuaweiCtlError::FileError { path, .. } => vec![
                format!("Check that file exists: {}", path),
                "Verify file permissions are correct".to_string(),
            ],
            HuaweiCtlError::Timeout { .. } => vec![
                "Raise the limit with --timeout <seconds>".to_string(),
                "Read the resource again later; the cloud operation may still finish".to_string(),
            ],
            _ => vec![],
        }
    }

    /// Print a cargo-style diagnostic to stderr using colored formatting.
    pub fn print_diagnostic(&self) {
        let mut diag = CliDiagnostic::error(&format!("{}", self));

        for suggestion in self.suggestions() {
            diag = diag.tip(&suggestion, &[]);
        }

        diag.print();
    }
}

impl From<CoreError> for HuaweiCtlError {
    fn from(err: CoreError) -> Self {
        let message = err.to_string();
        if err.is_unauthorized() {
            return HuaweiCtlError::AuthenticationFailed { message };
        }
        match err.root() {
            CoreError::WaitTimeout { .. } => HuaweiCtlError::Timeout { message },
            // registry lookups: "unknown resource type 'x'"
            CoreError::Validation(msg) if msg.starts_with("unknown ") => HuaweiCtlError::UnknownType {
                name: msg.split('\'').nth(1).unwrap_or_default().to_string(),
            },
            CoreError::Validation(_) | CoreError::Query { .. } => {
                HuaweiCtlError::InvalidInput { message }
            }
            CoreError::Config(_) => HuaweiCtlError::Configuration(message),
            CoreError::Http(_) => HuaweiCtlError::ConnectionError { message },
            _ => HuaweiCtlError::ApiError { message },
        }
    }
}

impl From<ConfigError> for HuaweiCtlError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::ProfileNotFound { name } => HuaweiCtlError::ProfileNotFound { name },
            ConfigError::NoProfiles { .. } => HuaweiCtlError::NoProfileConfigured,
            other => HuaweiCtlError::Configuration(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for HuaweiCtlError {
    fn from(err: serde_json::Error) -> Self {
        HuaweiCtlError::OutputError {
            message: format!("JSON error: {}", err),
        }
    }
}

impl From<std::io::Error> for HuaweiCtlError {
    fn from(err: std::io::Error) -> Self {
        HuaweiCtlError::OutputError {
            message: format!("IO error: {}", err),
        }
    }
}

impl From<anyhow::Error> for HuaweiCtlError {
    fn from(err: anyhow::Error) -> Self {
        HuaweiCtlError::Configuration(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huaweictl_core::ApiError;
    use std::time::Duration;

    #[test]
    fn test_unauthorized_maps_to_authentication_failed() {
        let err: CoreError = ApiError::new(
            401,
            "GET",
            "https://dcs.cn-north-4.myhuaweicloud.com/v2/p/instances",
            r#"{"error_code":"APIGW.0301","error_msg":"Incorrect IAM authentication information"}"#,
        )
        .into();
        let err = HuaweiCtlError::from(err.context("error retrieving DCS instances"));
        assert!(matches!(err, HuaweiCtlError::AuthenticationFailed { .. }));
    }

    #[test]
    fn test_wait_timeout_maps_to_timeout() {
        let err = CoreError::WaitTimeout {
            last_state: "CREATING".to_string(),
            expected: "RUNNING".to_string(),
            timeout: Duration::from_secs(60),
        }
        .context("error waiting for DCS instance");
        let err = HuaweiCtlError::from(err);
        assert!(matches!(err, HuaweiCtlError::Timeout { .. }));
        assert!(!err.suggestions().is_empty());
    }

    #[test]
    fn test_unknown_type_is_extracted() {
        let err = CoreError::Validation("unknown resource type 'huaweicloud_vpc'".to_string());
        match HuaweiCtlError::from(err) {
            HuaweiCtlError::UnknownType { name } => assert_eq!(name, "huaweicloud_vpc"),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_config_errors_keep_profile_name() {
        let err = HuaweiCtlError::from(ConfigError::ProfileNotFound {
            name: "prod".to_string(),
        });
        assert_eq!(err.to_string(), "Profile 'prod' not found");
    }
}
