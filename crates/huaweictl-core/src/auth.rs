//! IAM token acquisition
//!
//! Password profiles are exchanged for a project scoped token through
//! `POST /v3/auth/tokens`. The token is returned in the `X-Subject-Token`
//! header; the project ID comes from the response body.

use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{ApiError, CoreError, Result};

/// Authentication settings handed to the provider
#[derive(Clone)]
pub enum Auth {
    /// Pre-issued token
    Token(String),
    /// IAM user password authentication
    Password {
        user_name: String,
        password: String,
        domain_name: String,
    },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Auth::Token(_) => f.write_str("Auth::Token([redacted])"),
            Auth::Password {
                user_name,
                domain_name,
                ..
            } => write!(f, "Auth::Password({}@{})", user_name, domain_name),
        }
    }
}

/// A token issued by IAM
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub project_id: Option<String>,
}

fn token_request_body(
    user_name: &str,
    password: &str,
    domain_name: &str,
    region: &str,
    project_id: Option<&str>,
) -> Value {
    let scope = match project_id {
        Some(id) => json!({ "project": { "id": id } }),
        None => json!({ "project": { "name": region } }),
    };
    json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": user_name,
                        "password": password,
                        "domain": { "name": domain_name }
                    }
                }
            },
            "scope": scope
        }
    })
}

/// Request a project scoped token from IAM
pub async fn issue_token(
    http: &reqwest::Client,
    iam_endpoint: &str,
    user_name: &str,
    password: &str,
    domain_name: &str,
    region: &str,
    project_id: Option<&str>,
) -> Result<IssuedToken> {
    let url = format!("{}v3/auth/tokens", iam_endpoint);
    debug!("Requesting IAM token for {}@{} from {}", user_name, domain_name, url);

    let body = token_request_body(user_name, password, domain_name, region, project_id);
    let response = http.post(&url).json(&body).send().await?;
    let status = response.status().as_u16();
    let token = response
        .headers()
        .get("X-Subject-Token")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let text = response.text().await?;

    if !(200..300).contains(&status) {
        return Err(ApiError::new(status, "POST", &url, &text).into());
    }

    let token = token.ok_or_else(|| {
        CoreError::Config("IAM response did not include an X-Subject-Token header".to_string())
    })?;
    let parsed: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
    let project_id = parsed
        .pointer("/token/project/id")
        .and_then(Value::as_str)
        .map(str::to_string);

    info!("Obtained IAM token for user {}", user_name);
    Ok(IssuedToken { token, project_id })
}
