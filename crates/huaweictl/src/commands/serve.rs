//! Line-delimited JSON plugin protocol
//!
//! One request object per stdin line, one response object per stdout line,
//! processed in order. Logs go to stderr so stdout only carries responses.

use std::time::Duration;

use huaweictl_core::{Action, ActionInput, Provider, Registry, ResourceState};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::LinesStream;
use tracing::{debug, info, warn};

use crate::connection::{ConnectionManager, ProviderOptions};
use crate::error::{HuaweiCtlError, Result as CliResult};

#[derive(Debug, Deserialize)]
struct ServeRequest {
    op: Action,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    config: Option<Map<String, Value>>,
    #[serde(default)]
    state: Option<ResourceState>,
    #[serde(default)]
    timeout_secs: Option<u64>,
}

#[derive(Debug, Serialize, Default)]
struct ServeResponse {
    /// Resource ID after the operation; `null` once the object is gone
    id: Option<String>,
    state: Option<ResourceState>,
    error: Option<String>,
    diagnostics: Vec<String>,
}

impl ServeResponse {
    fn failed(error: impl ToString) -> Self {
        Self {
            error: Some(error.to_string()),
            ..Self::default()
        }
    }
}

/// Serves requests until stdin closes
pub async fn handle_serve(
    conn_mgr: &ConnectionManager,
    profile: Option<&str>,
    region: Option<&str>,
) -> CliResult<()> {
    info!("Serving plugin protocol on stdin/stdout");
    let registry = Registry::builtin();
    let mut provider: Option<Provider> = None;

    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next().await {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<ServeRequest>(&line) {
            Ok(request) => {
                debug!("Request: {} {}", request.op.as_str(), request.type_name);
                match ensure_provider(&mut provider, conn_mgr, profile, region).await {
                    Ok(provider) => handle_request(&registry, provider, request).await,
                    Err(e) => ServeResponse::failed(e),
                }
            }
            Err(e) => {
                warn!("Malformed request line: {}", e);
                ServeResponse::failed(format!("malformed request: {}", e))
            }
        };

        let mut out = serde_json::to_vec(&response)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    info!("stdin closed, stopping");
    Ok(())
}

/// Build the provider on first use so a broken profile is reported per request
async fn ensure_provider<'p>(
    provider: &'p mut Option<Provider>,
    conn_mgr: &ConnectionManager,
    profile: Option<&str>,
    region: Option<&str>,
) -> Result<&'p Provider, HuaweiCtlError> {
    if provider.is_none() {
        let built = conn_mgr
            .create_provider(
                profile,
                ProviderOptions {
                    region: region.map(str::to_string),
                    ..Default::default()
                },
            )
            .await?;
        *provider = Some(built);
    }
    provider.as_ref().ok_or(HuaweiCtlError::NoProfileConfigured)
}

async fn handle_request(registry: &Registry, provider: &Provider, request: ServeRequest) -> ServeResponse {
    let input = ActionInput {
        id: request.id,
        config: request.config,
        state: request.state,
        timeout: request.timeout_secs.map(Duration::from_secs),
    };
    match registry
        .run(provider, request.op, &request.type_name, input)
        .await
    {
        Ok(outcome) => ServeResponse {
            id: outcome.state.as_ref().map(|s| s.id.clone()),
            state: outcome.state,
            error: None,
            diagnostics: outcome.warnings,
        },
        Err(e) => ServeResponse::failed(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_parses_protocol_fields() {
        let request: ServeRequest = serde_json::from_value(json!({
            "op": "read_data",
            "type": "huaweicloud_live_domains",
            "config": {"type": "pull"},
            "timeout_secs": 30
        }))
        .unwrap();
        assert_eq!(request.op, Action::ReadData);
        assert_eq!(request.type_name, "huaweicloud_live_domains");
        assert_eq!(request.timeout_secs, Some(30));
        assert!(request.state.is_none());
    }

    #[test]
    fn test_unknown_op_is_rejected() {
        let result = serde_json::from_value::<ServeRequest>(json!({
            "op": "plan",
            "type": "huaweicloud_dcs_instance"
        }));
        assert!(result.is_err());
    }

    #[test]
    fn test_failed_response_shape() {
        let response = serde_json::to_value(ServeResponse::failed("boom")).unwrap();
        assert_eq!(
            response,
            json!({"id": null, "state": null, "error": "boom", "diagnostics": []})
        );
    }
}
