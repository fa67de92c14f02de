//! Connection management: builds an authenticated [`Provider`] from a
//! profile, the environment and command-line overrides

use std::io::IsTerminal;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use huaweictl_core::config::{
    Config, Credentials, ENV_AUTH_TOKEN, ENV_CLOUD, ENV_PASSWORD, ENV_PROJECT_ID, ENV_REGION,
};
use huaweictl_core::{ProgressCallback, Provider, ProviderBuilder};
use tracing::{debug, info, trace};

use crate::error::{HuaweiCtlError, Result as CliResult};

/// User agent string for huaweictl HTTP requests
const HUAWEICTL_USER_AGENT: &str = concat!("huaweictl/", env!("CARGO_PKG_VERSION"));

/// Per-invocation overrides applied on top of the profile
#[derive(Default)]
pub struct ProviderOptions {
    pub region: Option<String>,
    pub poll_interval: Option<Duration>,
    pub progress: Option<ProgressCallback>,
    /// Prompt for a missing IAM password on a terminal
    pub interactive: bool,
}

/// Connection manager for creating authenticated providers
#[derive(Clone)]
pub struct ConnectionManager {
    pub config: Config,
    pub config_path: Option<PathBuf>,
}

impl ConnectionManager {
    /// Create a new connection manager with a custom config path
    pub fn with_config_path(config: Config, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Save a configuration to the location it was loaded from
    pub fn save_config(&self, config: &Config) -> CliResult<()> {
        if let Some(ref path) = self.config_path {
            config
                .save_to_path(path)
                .context("Failed to save configuration")?;
        } else {
            config.save().context("Failed to save configuration")?;
        }
        Ok(())
    }

    /// When --config-file is given explicitly, environment variables are
    /// ignored so the file is the only source of settings
    fn use_env_vars(&self) -> bool {
        self.config_path.is_none()
    }

    fn env(&self, name: &str) -> Option<String> {
        if !self.use_env_vars() {
            return None;
        }
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }

    /// Build a provider for the given (or default) profile
    ///
    /// Precedence: command-line flags, then `HW_*` environment variables,
    /// then the profile. With no profile configured at all, `HW_REGION_NAME`
    /// and `HW_AUTH_TOKEN` alone are enough.
    pub async fn create_provider(
        &self,
        profile_name: Option<&str>,
        options: ProviderOptions,
    ) -> CliResult<Provider> {
        debug!("Creating provider");
        trace!("Profile name: {:?}", profile_name);

        let use_env = self.use_env_vars();
        if !use_env {
            info!("--config-file specified explicitly, ignoring environment variables");
        }

        let (mut builder, credentials) = if profile_name.is_none() && self.config.profiles.is_empty() {
            let token = self
                .env(ENV_AUTH_TOKEN)
                .ok_or(HuaweiCtlError::NoProfileConfigured)?;
            info!("Using credentials from environment variables");
            (Provider::builder(), Credentials::Token(token))
        } else {
            let resolved = self.config.resolve_profile(profile_name)?;
            info!("Using profile: {}", resolved);
            let profile = self.config.profile(&resolved)?;
            let credentials = profile.resolve_credentials(use_env)?;
            let credentials = self.complete_password(&resolved, credentials, options.interactive)?;
            (ProviderBuilder::from_profile(profile), credentials)
        };

        if let Some(region) = self.env(ENV_REGION) {
            debug!("Found {} environment variable", ENV_REGION);
            builder = builder.region(region);
        }
        if let Some(project_id) = self.env(ENV_PROJECT_ID) {
            debug!("Found {} environment variable", ENV_PROJECT_ID);
            builder = builder.project_id(project_id);
        }
        if let Some(cloud) = self.env(ENV_CLOUD) {
            debug!("Found {} environment variable", ENV_CLOUD);
            builder = builder.cloud(cloud);
        }
        if let Some(region) = options.region {
            builder = builder.region(region);
        }
        if let Some(interval) = options.poll_interval {
            builder = builder.poll_interval(interval);
        }
        if let Some(progress) = options.progress {
            builder = builder.on_progress(progress);
        }

        let provider = builder
            .credentials(credentials)?
            .user_agent(HUAWEICTL_USER_AGENT)
            .build()?;
        info!("Provider ready for region {}", provider.region());
        Ok(provider)
    }

    /// Fill in a missing IAM password from the environment or a prompt
    fn complete_password(
        &self,
        profile_name: &str,
        credentials: Credentials,
        interactive: bool,
    ) -> CliResult<Credentials> {
        let (user_name, domain_name) = match credentials {
            Credentials::Password {
                user_name,
                password: None,
                domain_name,
            } => (user_name, domain_name),
            complete => return Ok(complete),
        };

        let password = match self.env(ENV_PASSWORD) {
            Some(password) => password,
            None if interactive && std::io::stdin().is_terminal() => {
                rpassword::prompt_password(format!("Password for IAM user {}: ", user_name))
                    .context("Failed to read password")?
            }
            None => {
                return Err(HuaweiCtlError::MissingCredentials {
                    name: profile_name.to_string(),
                });
            }
        };

        Ok(Credentials::Password {
            user_name,
            password: Some(password),
            domain_name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use huaweictl_core::config::{Profile, ProfileCredentials};
    use std::collections::BTreeMap;

    fn manager(profiles: Vec<(&str, Profile)>) -> ConnectionManager {
        let mut config = Config::default();
        for (name, profile) in profiles {
            config.set_profile(name.to_string(), profile);
        }
        // an explicit path keeps the environment out of these tests
        ConnectionManager::with_config_path(config, Some(PathBuf::from("/tmp/huaweictl-test.toml")))
    }

    fn profile(credentials: ProfileCredentials) -> Profile {
        Profile {
            region: "cn-north-4".to_string(),
            project_id: Some("p-1".to_string()),
            cloud: "myhuaweicloud.com".to_string(),
            credentials,
            endpoints: BTreeMap::new(),
            timeouts: None,
        }
    }

    #[tokio::test]
    async fn test_token_profile_builds_provider() {
        let mgr = manager(vec![(
            "dev",
            profile(ProfileCredentials::Token {
                auth_token: "token".to_string(),
            }),
        )]);
        let provider = mgr
            .create_provider(None, ProviderOptions::default())
            .await
            .unwrap();
        assert_eq!(provider.region(), "cn-north-4");
        assert_eq!(
            provider.endpoint("dcs"),
            "https://dcs.cn-north-4.myhuaweicloud.com/"
        );
    }

    #[tokio::test]
    async fn test_region_flag_overrides_profile() {
        let mgr = manager(vec![(
            "dev",
            profile(ProfileCredentials::Token {
                auth_token: "token".to_string(),
            }),
        )]);
        let provider = mgr
            .create_provider(
                Some("dev"),
                ProviderOptions {
                    region: Some("ap-southeast-1".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(provider.region(), "ap-southeast-1");
    }

    #[tokio::test]
    async fn test_password_profile_without_password_is_missing_credentials() {
        let mgr = manager(vec![(
            "ops",
            profile(ProfileCredentials::Password {
                user_name: "ops".to_string(),
                password: None,
                domain_name: "acme".to_string(),
            }),
        )]);
        let err = mgr
            .create_provider(Some("ops"), ProviderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HuaweiCtlError::MissingCredentials { .. }));
    }

    #[tokio::test]
    async fn test_unknown_profile() {
        let mgr = manager(vec![]);
        let err = mgr
            .create_provider(Some("nope"), ProviderOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, HuaweiCtlError::ProfileNotFound { .. }));
    }
}
