//! Configuration and profile management for huaweictl
//!
// Allow nested config module - this is intentional for the config subsystem

#![allow(clippy::module_inception)]
//!
//! # Features
//!
//! - Multiple named profiles (region, project, credentials)
//! - Token or IAM password authentication
//! - Secure credential storage using OS keyring (optional)
//! - Environment variable expansion in config files
//! - Per-service endpoint overrides and timeout settings

pub mod config;
pub mod credential;
pub mod error;
pub mod timeouts;

pub use config::{
    AuthMethod, Config, Credentials, DEFAULT_CLOUD, ENV_AUTH_TOKEN, ENV_CLOUD, ENV_DOMAIN_NAME,
    ENV_PASSWORD, ENV_PROJECT_ID, ENV_REGION, ENV_USER_NAME, Profile, ProfileCredentials,
};
pub use credential::{CredentialStorage, CredentialStore};
pub use error::{ConfigError, Result};
pub use timeouts::TimeoutsConfig;
