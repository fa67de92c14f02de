//! # huaweictl-core
//!
//! Library behind the `huaweictl` CLI: profile configuration, the
//! authenticated REST client, the retry/poll engine and the Live and DCS
//! resource implementations.
//!
//! ## Layout
//!
//! - [`config`]: TOML profiles with environment overrides and keyring references
//! - [`Provider`] / [`ServiceClient`]: per-service endpoints and token handling
//! - [`StateChangeConf`]: polls a refresh function until a target state
//! - [`Operation`]: calls an API, repeats it while the instance is busy, then
//!   waits for the job, the order and the instance
//! - [`ResourceData`], [`Resource`], [`DataSource`]: the attribute model and
//!   the handler traits
//! - [`Registry`]: type names to implementations
//!
//! ## Example
//!
//! ```rust,ignore
//! use huaweictl_core::{Action, ActionInput, Provider, Registry};
//!
//! let provider = Provider::builder()
//!     .region("cn-north-4")
//!     .auth_token(token)
//!     .build()?;
//! let outcome = Registry::builtin()
//!     .run(&provider, Action::Create, "huaweicloud_live_domain", ActionInput {
//!         config: Some(config),
//!         ..Default::default()
//!     })
//!     .await?;
//! ```

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod operation;
pub mod progress;
pub mod provider;
pub mod registry;
pub mod resource;
pub mod schema;
pub mod services;
pub mod utils;
pub mod wait;

pub use client::{ApiRequest, ApiResponse, ServiceClient};
pub use config::{Config, ConfigError, Profile};
pub use error::{ApiError, CoreError, Result, ResultExt};
pub use operation::{Completed, Operation, RetryMode, StatusProbe};
pub use progress::{ProgressCallback, ProgressEvent};
pub use provider::{Provider, ProviderBuilder};
pub use registry::{Action, ActionInput, Outcome, Registry};
pub use resource::{DataSource, Resource};
pub use schema::{ResourceData, ResourceState, Timeouts};
pub use wait::{Refreshed, StateChangeConf};
