//! Profile management command implementations

use anyhow::Context;
use colored::Colorize;
use huaweictl_core::config::{
    Config, CredentialStore, DEFAULT_CLOUD, Profile, ProfileCredentials,
};
use serde_json::{Value, json};
use tracing::{debug, info, trace};

use crate::cli::{OutputFormat, ProfileCommands};
use crate::connection::ConnectionManager;
use crate::error::{HuaweiCtlError, Result as CliResult};
use crate::output;

/// Handle profile management commands
pub async fn handle_profile_command(
    profile_cmd: &ProfileCommands,
    conn_mgr: &ConnectionManager,
    region: Option<&str>,
    output_format: OutputFormat,
) -> CliResult<()> {
    use ProfileCommands::*;

    match profile_cmd {
        List => handle_list(conn_mgr, output_format),
        Path => handle_path(conn_mgr, output_format),
        Show { name } => handle_show(conn_mgr, name, output_format),
        Set {
            name,
            project_id,
            cloud,
            auth_token,
            user_name,
            password,
            domain_name,
            endpoints,
            #[cfg(feature = "secure-storage")]
            use_keyring,
        } => {
            #[cfg(feature = "secure-storage")]
            let store = if *use_keyring {
                CredentialStore::keyring()
            } else {
                CredentialStore::new()
            };
            #[cfg(not(feature = "secure-storage"))]
            let store = CredentialStore::new();

            let request = SetRequest {
                name,
                region,
                project_id: project_id.as_deref(),
                cloud: cloud.as_deref(),
                auth_token: auth_token.as_deref(),
                user_name: user_name.as_deref(),
                password: password.as_deref(),
                domain_name: domain_name.as_deref(),
                endpoints,
            };
            handle_set(conn_mgr, request, &store)
        }
        Remove { name } => handle_remove(conn_mgr, name),
        Default { name } => handle_default(conn_mgr, name),
    }
}

fn config_path_display(conn_mgr: &ConnectionManager) -> Option<String> {
    conn_mgr
        .config_path
        .as_ref()
        .map(|p| p.display().to_string())
        .or_else(|| Config::config_path().ok().map(|p| p.display().to_string()))
}

fn handle_list(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    debug!("Listing all configured profiles");
    let profiles = conn_mgr.config.list_profiles();
    trace!("Found {} profiles", profiles.len());
    let default = conn_mgr.config.default_profile.as_deref();

    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            let profile_list: Vec<Value> = profiles
                .iter()
                .map(|(name, profile)| {
                    json!({
                        "name": name,
                        "region": profile.region,
                        "auth_method": profile.auth_method().to_string(),
                        "is_default": default == Some(name.as_str()),
                    })
                })
                .collect();
            let data = json!({
                "config_path": config_path_display(conn_mgr),
                "profiles": profile_list,
                "count": profiles.len(),
            });
            output::print_output(&data, output_format.into(), None)?;
        }
        OutputFormat::Auto | OutputFormat::Table => {
            if let Some(path) = config_path_display(conn_mgr) {
                println!("Configuration file: {}", path);
                println!();
            }
            if profiles.is_empty() {
                info!("No profiles configured");
                println!("No profiles configured.");
                println!("Use 'huaweictl --region <region> profile set' to create a profile.");
                return Ok(());
            }
            for (name, profile) in profiles {
                if default == Some(name.as_str()) {
                    println!("  {} {}", name.bold().cyan(), "(default)".green());
                } else {
                    println!("  {}", name.bold().cyan());
                }
                println!("    {} {}", "Region:".dimmed(), profile.region);
                println!("    {} {}", "Auth:".dimmed(), profile.auth_method());
            }
        }
    }
    Ok(())
}

fn handle_path(conn_mgr: &ConnectionManager, output_format: OutputFormat) -> CliResult<()> {
    let path = config_path_display(conn_mgr).ok_or_else(|| {
        HuaweiCtlError::Configuration("could not determine the configuration directory".to_string())
    })?;
    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            output::print_output(json!({ "config_path": path }), output_format.into(), None)?;
        }
        OutputFormat::Auto | OutputFormat::Table => println!("{}", path),
    }
    Ok(())
}

/// Mask everything but the last four characters of a secret
fn mask_secret(secret: &str) -> String {
    if CredentialStore::is_keyring_reference(secret) {
        return secret.to_string();
    }
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}

fn profile_view(name: &str, profile: &Profile, is_default: bool) -> Value {
    let mut view = json!({
        "name": name,
        "region": profile.region,
        "project_id": profile.project_id,
        "cloud": profile.cloud,
        "auth_method": profile.auth_method().to_string(),
        "is_default": is_default,
    });
    match &profile.credentials {
        ProfileCredentials::Token { auth_token } => {
            view["auth_token"] = json!(mask_secret(auth_token));
        }
        ProfileCredentials::Password {
            user_name,
            password,
            domain_name,
        } => {
            view["user_name"] = json!(user_name);
            view["domain_name"] = json!(domain_name);
            view["password"] = json!(password.as_deref().map(mask_secret));
        }
    }
    if !profile.endpoints.is_empty() {
        view["endpoints"] = json!(profile.endpoints);
    }
    if let Some(timeouts) = &profile.timeouts {
        view["timeouts"] = json!(timeouts);
    }
    view
}

fn handle_show(
    conn_mgr: &ConnectionManager,
    name: &str,
    output_format: OutputFormat,
) -> CliResult<()> {
    let profile = conn_mgr.config.profile(name)?;
    let is_default = conn_mgr.config.default_profile.as_deref() == Some(name);
    let view = profile_view(name, profile, is_default);

    match output_format {
        OutputFormat::Json | OutputFormat::Yaml => {
            output::print_output(&view, output_format.into(), None)?;
        }
        OutputFormat::Auto | OutputFormat::Table => {
            println!("Profile: {}", name.bold().cyan());
            if let Value::Object(fields) = view {
                for (key, value) in fields.iter().filter(|(k, _)| k.as_str() != "name") {
                    let shown = match value {
                        Value::Null => continue,
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    println!("  {} {}", format!("{}:", key).dimmed(), shown);
                }
            }
        }
    }
    Ok(())
}

/// Arguments of `profile set`
struct SetRequest<'a> {
    name: &'a str,
    region: Option<&'a str>,
    project_id: Option<&'a str>,
    cloud: Option<&'a str>,
    auth_token: Option<&'a str>,
    user_name: Option<&'a str>,
    password: Option<&'a str>,
    domain_name: Option<&'a str>,
    endpoints: &'a [(String, String)],
}

/// Build the profile `profile set` would write; an existing profile keeps
/// the settings the command does not override
fn build_profile(
    existing: Option<&Profile>,
    request: &SetRequest<'_>,
    store: &CredentialStore,
) -> CliResult<Profile> {
    let region = request
        .region
        .map(str::to_string)
        .or_else(|| existing.map(|p| p.region.clone()))
        .ok_or_else(|| HuaweiCtlError::InvalidInput {
            message: "--region is required when creating a profile".to_string(),
        })?;

    let name = request.name;
    let credentials = match (request.auth_token, request.user_name) {
        (Some(token), _) => ProfileCredentials::Token {
            auth_token: store
                .store_credential(&format!("{}-auth-token", name), token)
                .context("Failed to store auth token")?,
        },
        (None, Some(user_name)) => {
            let domain_name = request.domain_name.ok_or_else(|| HuaweiCtlError::InvalidInput {
                message: "--domain-name is required with --user-name".to_string(),
            })?;
            let password = match request.password {
                Some(p) => Some(
                    store
                        .store_credential(&format!("{}-password", name), p)
                        .context("Failed to store password")?,
                ),
                None => None,
            };
            ProfileCredentials::Password {
                user_name: user_name.to_string(),
                password,
                domain_name: domain_name.to_string(),
            }
        }
        (None, None) => match existing {
            Some(profile) => profile.credentials.clone(),
            None => {
                return Err(HuaweiCtlError::InvalidInput {
                    message: "either --auth-token or --user-name is required".to_string(),
                });
            }
        },
    };

    let mut endpoints = existing.map(|p| p.endpoints.clone()).unwrap_or_default();
    for (service, url) in request.endpoints {
        endpoints.insert(service.clone(), url.clone());
    }

    Ok(Profile {
        region,
        project_id: request
            .project_id
            .map(str::to_string)
            .or_else(|| existing.and_then(|p| p.project_id.clone())),
        cloud: request
            .cloud
            .map(str::to_string)
            .or_else(|| existing.map(|p| p.cloud.clone()))
            .unwrap_or_else(|| DEFAULT_CLOUD.to_string()),
        credentials,
        endpoints,
        timeouts: existing.and_then(|p| p.timeouts.clone()),
    })
}

fn handle_set(
    conn_mgr: &ConnectionManager,
    request: SetRequest<'_>,
    store: &CredentialStore,
) -> CliResult<()> {
    debug!("Setting profile: {}", request.name);
    let mut config = conn_mgr.config.clone();
    let existing = config.profiles.get(request.name);
    let updating = existing.is_some();
    let profile = build_profile(existing, &request, store)?;

    config.set_profile(request.name.to_string(), profile);
    // first profile becomes the default
    if config.default_profile.is_none() {
        config.default_profile = Some(request.name.to_string());
    }
    conn_mgr.save_config(&config)?;

    info!("Saved profile {}", request.name);
    if updating {
        println!("Profile '{}' updated successfully.", request.name);
    } else {
        println!("Profile '{}' created successfully.", request.name);
    }
    if config.default_profile.as_deref() == Some(request.name) {
        println!("Profile '{}' is the default profile.", request.name);
    }
    Ok(())
}

fn handle_remove(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    debug!("Removing profile: {}", name);
    let mut config = conn_mgr.config.clone();
    if config.remove_profile(name).is_none() {
        return Err(HuaweiCtlError::ProfileNotFound {
            name: name.to_string(),
        });
    }
    conn_mgr.save_config(&config)?;
    info!("Removed profile {}", name);
    println!("Profile '{}' removed successfully.", name);
    Ok(())
}

fn handle_default(conn_mgr: &ConnectionManager, name: &str) -> CliResult<()> {
    let mut config = conn_mgr.config.clone();
    if !config.profiles.contains_key(name) {
        return Err(HuaweiCtlError::ProfileNotFound {
            name: name.to_string(),
        });
    }
    config.default_profile = Some(name.to_string());
    conn_mgr.save_config(&config)?;
    println!("Default profile set to '{}'.", name);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request<'a>(endpoints: &'a [(String, String)]) -> SetRequest<'a> {
        SetRequest {
            name: "dev",
            region: Some("cn-north-4"),
            project_id: None,
            cloud: None,
            auth_token: Some("token-abcdef"),
            user_name: None,
            password: None,
            domain_name: None,
            endpoints,
        }
    }

    #[test]
    fn test_mask_secret() {
        assert_eq!(mask_secret("token-abcdef"), "****cdef");
        assert_eq!(mask_secret("abc"), "****");
        assert_eq!(mask_secret("keyring:dev-auth-token"), "keyring:dev-auth-token");
    }

    #[test]
    fn test_build_new_token_profile() {
        let endpoints = vec![("dcs".to_string(), "https://dcs.internal".to_string())];
        let profile = build_profile(None, &request(&endpoints), &CredentialStore::new()).unwrap();
        assert_eq!(profile.region, "cn-north-4");
        assert_eq!(profile.cloud, DEFAULT_CLOUD);
        assert_eq!(profile.endpoints["dcs"], "https://dcs.internal");
        assert!(matches!(
            profile.credentials,
            ProfileCredentials::Token { ref auth_token } if auth_token == "token-abcdef"
        ));
    }

    #[test]
    fn test_new_profile_requires_region() {
        let mut req = request(&[]);
        req.region = None;
        let err = build_profile(None, &req, &CredentialStore::new()).unwrap_err();
        assert!(err.to_string().contains("--region"));
    }

    #[test]
    fn test_update_keeps_existing_settings() {
        let endpoints = vec![("live".to_string(), "https://live.internal".to_string())];
        let existing = build_profile(None, &request(&endpoints), &CredentialStore::new()).unwrap();

        let req = SetRequest {
            name: "dev",
            region: None,
            project_id: Some("p-9"),
            cloud: None,
            auth_token: None,
            user_name: None,
            password: None,
            domain_name: None,
            endpoints: &[],
        };
        let updated = build_profile(Some(&existing), &req, &CredentialStore::new()).unwrap();
        assert_eq!(updated.region, "cn-north-4");
        assert_eq!(updated.project_id.as_deref(), Some("p-9"));
        assert_eq!(updated.endpoints["live"], "https://live.internal");
        assert!(matches!(updated.credentials, ProfileCredentials::Token { .. }));
    }

    #[test]
    fn test_profile_view_masks_password() {
        let profile = Profile {
            region: "ap-southeast-1".to_string(),
            project_id: None,
            cloud: DEFAULT_CLOUD.to_string(),
            credentials: ProfileCredentials::Password {
                user_name: "ops".to_string(),
                password: Some("hunter2hunter2".to_string()),
                domain_name: "acme".to_string(),
            },
            endpoints: Default::default(),
            timeouts: None,
        };
        let view = profile_view("ops", &profile, true);
        assert_eq!(view["password"], "****ter2");
        assert_eq!(view["auth_method"], "password");
        assert_eq!(view["is_default"], true);
    }
}
