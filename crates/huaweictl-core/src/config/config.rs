//! Configuration management for huaweictl
//!
//! Profiles are stored in TOML. Each profile names a region, a project and
//! one way of authenticating against IAM. Endpoints can be overridden per
//! service, which is also how tests point the provider at a mock server.

#[cfg(target_os = "macos")]
use directories::BaseDirs;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::credential::CredentialStore;
use super::error::{ConfigError, Result};
use super::timeouts::TimeoutsConfig;

pub const ENV_REGION: &str = "HW_REGION_NAME";
pub const ENV_PROJECT_ID: &str = "HW_PROJECT_ID";
pub const ENV_AUTH_TOKEN: &str = "HW_AUTH_TOKEN";
pub const ENV_USER_NAME: &str = "HW_USER_NAME";
pub const ENV_PASSWORD: &str = "HW_PASSWORD";
pub const ENV_DOMAIN_NAME: &str = "HW_DOMAIN_NAME";
pub const ENV_CLOUD: &str = "HW_CLOUD";

/// Default cloud domain suffix used to build service endpoints
pub const DEFAULT_CLOUD: &str = "myhuaweicloud.com";

/// Main configuration structure
#[derive(Debug, Serialize, Deserialize, Default, Clone)]
pub struct Config {
    /// Profile used when none is given on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,
    /// Map of profile name -> profile configuration
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

/// Individual profile configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Profile {
    /// Region name, e.g. `cn-north-4`
    pub region: String,
    /// Project ID; looked up from the IAM token when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Cloud domain suffix
    #[serde(default = "default_cloud")]
    pub cloud: String,
    /// Authentication settings (flattened into the profile)
    #[serde(flatten)]
    pub credentials: ProfileCredentials,
    /// Per-service endpoint overrides, keyed by service name (`dcs`, `live`, `bss`, `iam`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub endpoints: BTreeMap<String, String>,
    /// Timeout configuration for this profile
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeouts: Option<TimeoutsConfig>,
}

/// Supported authentication methods
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    /// Pre-issued IAM token
    Token,
    /// IAM user name and password exchanged for a token
    Password,
}

/// Authentication settings stored in a profile
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum ProfileCredentials {
    Token {
        auth_token: String,
    },
    Password {
        user_name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        password: Option<String>, // Optional for interactive prompting
        domain_name: String,
    },
}

/// Credentials after environment and keyring resolution
#[derive(Debug, Clone, PartialEq)]
pub enum Credentials {
    Token(String),
    Password {
        user_name: String,
        password: Option<String>,
        domain_name: String,
    },
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMethod::Token => write!(f, "token"),
            AuthMethod::Password => write!(f, "password"),
        }
    }
}

fn default_cloud() -> String {
    DEFAULT_CLOUD.to_string()
}

impl Profile {
    /// Authentication method configured for this profile
    pub fn auth_method(&self) -> AuthMethod {
        match self.credentials {
            ProfileCredentials::Token { .. } => AuthMethod::Token,
            ProfileCredentials::Password { .. } => AuthMethod::Password,
        }
    }

    /// Check if this profile has a stored secret
    pub fn has_password(&self) -> bool {
        matches!(
            self.credentials,
            ProfileCredentials::Token { .. }
                | ProfileCredentials::Password {
                    password: Some(_),
                    ..
                }
        )
    }

    /// Get resolved credentials (with keyring support)
    ///
    /// With `use_env` set, `HW_AUTH_TOKEN`, `HW_USER_NAME`, `HW_PASSWORD`
    /// and `HW_DOMAIN_NAME` override the stored values.
    pub fn resolve_credentials(&self, use_env: bool) -> Result<Credentials> {
        let store = CredentialStore::new();
        let env = |name: &'static str| use_env.then_some(name);

        match &self.credentials {
            ProfileCredentials::Token { auth_token } => {
                let token = store
                    .get_credential(auth_token, env(ENV_AUTH_TOKEN))
                    .map_err(|e| {
                        ConfigError::CredentialError(format!("Failed to resolve auth token: {}", e))
                    })?;
                Ok(Credentials::Token(token))
            }
            ProfileCredentials::Password {
                user_name,
                password,
                domain_name,
            } => {
                let user_name = store
                    .get_credential(user_name, env(ENV_USER_NAME))
                    .map_err(|e| {
                        ConfigError::CredentialError(format!("Failed to resolve user name: {}", e))
                    })?;
                let domain_name = store
                    .get_credential(domain_name, env(ENV_DOMAIN_NAME))
                    .map_err(|e| {
                        ConfigError::CredentialError(format!(
                            "Failed to resolve domain name: {}",
                            e
                        ))
                    })?;
                let password = match password {
                    Some(p) => Some(store.get_credential(p, env(ENV_PASSWORD)).map_err(|e| {
                        ConfigError::CredentialError(format!("Failed to resolve password: {}", e))
                    })?),
                    None if use_env => std::env::var(ENV_PASSWORD).ok(),
                    None => None,
                };

                Ok(Credentials::Password {
                    user_name,
                    password,
                    domain_name,
                })
            }
        }
    }

    /// Timeout settings, falling back to defaults
    pub fn timeouts(&self) -> TimeoutsConfig {
        self.timeouts.clone().unwrap_or_default()
    }
}

impl Config {
    /// Resolve the profile to use
    ///
    /// Order: explicit name, `default_profile`, then the first profile by name.
    pub fn resolve_profile(&self, explicit_profile: Option<&str>) -> Result<String> {
        if let Some(profile_name) = explicit_profile {
            return Ok(profile_name.to_string());
        }

        if let Some(ref default) = self.default_profile {
            return Ok(default.clone());
        }

        let mut names: Vec<_> = self.profiles.keys().collect();
        names.sort();
        names
            .first()
            .map(|name| name.to_string())
            .ok_or_else(|| ConfigError::NoProfiles {
                suggestion: "Use 'huaweictl profile set' to create a profile.".to_string(),
            })
    }

    /// Look up a profile by name
    pub fn profile(&self, name: &str) -> Result<&Profile> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound {
                name: name.to_string(),
            })
    }

    /// Load configuration from the standard location
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path()?;
        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(config_path: &Path) -> Result<Self> {
        if !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(config_path).map_err(|e| ConfigError::LoadError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        let expanded_content = Self::expand_env_vars(&content);

        let config: Config = toml::from_str(&expanded_content)?;

        Ok(config)
    }

    /// Save configuration to the standard location
    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path()?;
        self.save_to_path(&config_path)
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::SaveError {
                path: parent.display().to_string(),
                source: e,
            })?;
        }

        let content = toml::to_string_pretty(self)?;

        fs::write(config_path, content).map_err(|e| ConfigError::SaveError {
            path: config_path.display().to_string(),
            source: e,
        })?;

        Ok(())
    }

    /// Set or update a profile
    pub fn set_profile(&mut self, name: String, profile: Profile) {
        self.profiles.insert(name, profile);
    }

    /// Remove a profile by name
    pub fn remove_profile(&mut self, name: &str) -> Option<Profile> {
        if self.default_profile.as_deref() == Some(name) {
            self.default_profile = None;
        }
        self.profiles.remove(name)
    }

    /// List all profiles sorted by name
    pub fn list_profiles(&self) -> Vec<(&String, &Profile)> {
        let mut profiles: Vec<_> = self.profiles.iter().collect();
        profiles.sort_by_key(|(name, _)| *name);
        profiles
    }

    /// Get the path to the configuration file
    ///
    /// On macOS `~/.config/huaweictl/config.toml` is preferred when it exists,
    /// otherwise the platform directory is used:
    ///
    /// On Linux: ~/.config/huaweictl/config.toml
    /// On Windows: %APPDATA%\huaweicloud\huaweictl\config.toml
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(target_os = "macos")]
        {
            if let Some(base_dirs) = BaseDirs::new() {
                let linux_style_path = base_dirs
                    .home_dir()
                    .join(".config")
                    .join("huaweictl")
                    .join("config.toml");

                if linux_style_path
                    .parent()
                    .map(|p| p.exists())
                    .unwrap_or(false)
                {
                    return Ok(linux_style_path);
                }
            }
        }

        let proj_dirs = ProjectDirs::from("com", "huaweicloud", "huaweictl")
            .ok_or(ConfigError::ConfigDirError)?;

        Ok(proj_dirs.config_dir().join("config.toml"))
    }

    /// Expand `${VAR}` and `${VAR:-default}` references in configuration content
    ///
    /// Unset variables without a default are left as-is so profiles that are
    /// not in use do not fail to load.
    ///
    /// ```toml
    /// auth_token = "${HW_AUTH_TOKEN}"
    /// region = "${HW_REGION_NAME:-cn-north-4}"
    /// ```
    fn expand_env_vars(content: &str) -> String {
        shellexpand::env_with_context_no_errors(content, |var| std::env::var(var).ok())
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_profile(region: &str) -> Profile {
        Profile {
            region: region.to_string(),
            project_id: Some("0123456789abcdef".to_string()),
            cloud: default_cloud(),
            credentials: ProfileCredentials::Token {
                auth_token: "MIIX-token".to_string(),
            },
            endpoints: BTreeMap::new(),
            timeouts: None,
        }
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.set_profile("test".to_string(), token_profile("cn-north-4"));
        config.default_profile = Some("test".to_string());

        let serialized = toml::to_string(&config).unwrap();
        let deserialized: Config = toml::from_str(&serialized).unwrap();

        assert_eq!(config.default_profile, deserialized.default_profile);
        let profile = deserialized.profiles.get("test").unwrap();
        assert_eq!(profile.region, "cn-north-4");
        assert_eq!(profile.auth_method(), AuthMethod::Token);
    }

    #[test]
    fn test_password_profile_parsing() {
        let config: Config = toml::from_str(
            r#"
[profiles.iam]
region = "ap-southeast-1"
user_name = "ops"
domain_name = "acme"

[profiles.iam.endpoints]
dcs = "http://127.0.0.1:9000"
"#,
        )
        .unwrap();

        let profile = config.profiles.get("iam").unwrap();
        assert_eq!(profile.auth_method(), AuthMethod::Password);
        assert!(!profile.has_password());
        assert_eq!(profile.cloud, DEFAULT_CLOUD);
        assert_eq!(
            profile.endpoints.get("dcs").map(String::as_str),
            Some("http://127.0.0.1:9000")
        );
    }

    #[test]
    #[serial_test::serial]
    fn test_env_var_expansion() {
        unsafe {
            std::env::set_var("TEST_HW_TOKEN", "token-from-env");
        }

        let content = r#"
[profiles.test]
region = "${TEST_HW_REGION:-cn-east-3}"
auth_token = "${TEST_HW_TOKEN}"
"#;

        let expanded = Config::expand_env_vars(content);
        assert!(expanded.contains("token-from-env"));
        assert!(expanded.contains("cn-east-3"));

        unsafe {
            std::env::remove_var("TEST_HW_TOKEN");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_resolve_credentials_env_override() {
        unsafe {
            std::env::set_var(ENV_AUTH_TOKEN, "env-token");
        }

        let profile = token_profile("cn-north-4");
        assert_eq!(
            profile.resolve_credentials(true).unwrap(),
            Credentials::Token("env-token".to_string())
        );
        assert_eq!(
            profile.resolve_credentials(false).unwrap(),
            Credentials::Token("MIIX-token".to_string())
        );

        unsafe {
            std::env::remove_var(ENV_AUTH_TOKEN);
        }
    }

    #[test]
    fn test_profile_resolution() {
        let mut config = Config::default();
        config.set_profile("zeta".to_string(), token_profile("cn-north-4"));
        config.set_profile("alpha".to_string(), token_profile("cn-east-3"));

        // Explicit always wins
        assert_eq!(config.resolve_profile(Some("zeta")).unwrap(), "zeta");
        // First by name when no default
        assert_eq!(config.resolve_profile(None).unwrap(), "alpha");

        config.default_profile = Some("zeta".to_string());
        assert_eq!(config.resolve_profile(None).unwrap(), "zeta");
    }

    #[test]
    fn test_no_profile_errors() {
        let config = Config::default();
        let err = config.resolve_profile(None).unwrap_err();
        assert!(err.to_string().contains("huaweictl profile set"));
        assert!(matches!(
            config.profile("missing"),
            Err(ConfigError::ProfileNotFound { .. })
        ));
    }

    #[test]
    fn test_remove_default_profile_clears_default() {
        let mut config = Config::default();
        config.set_profile("prod".to_string(), token_profile("cn-north-4"));
        config.default_profile = Some("prod".to_string());

        assert!(config.remove_profile("prod").is_some());
        assert!(config.default_profile.is_none());
    }
}
