//! Raw API access commands for direct REST endpoint calls

use huaweictl_core::ApiRequest;
use reqwest::Method;
use serde_json::{Value, json};
use tracing::debug;

use super::read_json_arg;
use super::resource::CommandContext;
use crate::cli::HttpMethod;
use crate::connection::ProviderOptions;
use crate::error::{HuaweiCtlError, Result as CliResult};
use crate::output::print_output;

impl From<HttpMethod> for Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
            HttpMethod::Put => Method::PUT,
            HttpMethod::Patch => Method::PATCH,
            HttpMethod::Delete => Method::DELETE,
        }
    }
}

/// Paths are relative to the service endpoint, which already ends in `/`
fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

fn build_request(method: HttpMethod, path: &str, data: Option<&str>) -> CliResult<ApiRequest> {
    let body = data.map(read_json_arg).transpose()?;
    let body = match method {
        HttpMethod::Post | HttpMethod::Put | HttpMethod::Patch => Some(body.unwrap_or(json!({}))),
        HttpMethod::Get | HttpMethod::Delete => body,
    };

    let mut request = ApiRequest::new(method.into(), normalize_path(path));
    if let Some(body) = body {
        request = request.body(body);
    }
    Ok(request)
}

/// Handle raw API commands
pub async fn handle_api_command(
    ctx: &CommandContext<'_>,
    service: &str,
    method: HttpMethod,
    path: &str,
    data: Option<&str>,
) -> CliResult<()> {
    if service.is_empty() {
        return Err(HuaweiCtlError::InvalidInput {
            message: "service name must not be empty".to_string(),
        });
    }
    let request = build_request(method, path, data)?;

    let provider = ctx
        .conn_mgr
        .create_provider(
            ctx.profile,
            ProviderOptions {
                region: ctx.region.map(str::to_string),
                interactive: true,
                ..Default::default()
            },
        )
        .await?;
    let client = provider.client(service)?;
    debug!("{} {} via {}", method, request.path, client.endpoint());

    let response = client.send(&request).await?;
    let body = match response.body {
        Value::Null => json!({"status": response.status}),
        body => body,
    };
    print_output(body, ctx.output.into(), ctx.query).map_err(|e| HuaweiCtlError::OutputError {
        message: e.to_string(),
    })
}
