//! Generic REST client for Huawei Cloud service endpoints
//!
//! A [`ServiceClient`] is bound to one service endpoint (`dcs`, `live`,
//! `bss`, ...). Requests are described with [`ApiRequest`]: a path template
//! such as `v2/{project_id}/instances/{instance_id}`, path parameters,
//! query parameters, an optional JSON body and the accepted status codes.

use reqwest::Method;
use reqwest::header::HeaderMap;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::{ApiError, CoreError, Result};
use crate::provider::Provider;

/// Description of a single API call
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    /// Path template relative to the service endpoint
    pub path: String,
    pub path_params: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Accepted status codes; any 2xx when empty
    pub ok_codes: Vec<u16>,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Vec::new(),
            query: Vec::new(),
            body: None,
            ok_codes: Vec::new(),
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Substitute `{name}` in the path template
    pub fn path_param(mut self, name: &str, value: impl Into<String>) -> Self {
        self.path_params.push((name.to_string(), value.into()));
        self
    }

    pub fn query(mut self, name: &str, value: impl ToString) -> Self {
        self.query.push((name.to_string(), value.to_string()));
        self
    }

    /// Add a query parameter only when the value is present and non-empty
    pub fn query_opt(self, name: &str, value: Option<&str>) -> Self {
        match value {
            Some(v) if !v.is_empty() => self.query(name, v),
            _ => self,
        }
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn ok_codes(mut self, codes: &[u16]) -> Self {
        self.ok_codes = codes.to_vec();
        self
    }

    fn accepts(&self, status: u16) -> bool {
        if self.ok_codes.is_empty() {
            (200..300).contains(&status)
        } else {
            self.ok_codes.contains(&status)
        }
    }

    /// Render the path with `{project_id}` and the path parameters filled in
    pub fn render_path(&self, project_id: Option<&str>) -> Result<String> {
        let mut path = self.path.trim_start_matches('/').to_string();
        if path.contains("{project_id}") {
            let project_id = project_id.ok_or_else(|| {
                CoreError::Config("project_id is required for this request".to_string())
            })?;
            path = path.replace("{project_id}", project_id);
        }
        for (name, value) in &self.path_params {
            path = path.replace(&format!("{{{}}}", name), &urlencoding::encode(value));
        }
        if let Some(start) = path.find('{')
            && path[start..].contains('}')
        {
            return Err(CoreError::Validation(format!(
                "unresolved placeholder in request path '{}'",
                path
            )));
        }
        Ok(path)
    }
}

/// Response of a successful call
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub headers: HeaderMap,
    /// Parsed JSON body; `null` for empty bodies, a string for non-JSON ones
    pub body: Value,
}

/// Client bound to one service endpoint
#[derive(Clone)]
pub struct ServiceClient {
    service: String,
    endpoint: String,
    provider: Provider,
}

impl ServiceClient {
    pub(crate) fn new(service: &str, endpoint: String, provider: Provider) -> Self {
        Self {
            service: service.to_string(),
            endpoint,
            provider,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn provider(&self) -> &Provider {
        &self.provider
    }

    /// Absolute URL for a request, including the query string
    pub async fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let project_id = if request.path.contains("{project_id}") {
            Some(self.provider.project_id().await?)
        } else {
            None
        };
        let path = request.render_path(project_id.as_deref())?;
        let mut url = format!("{}{}", self.endpoint, path);
        if !request.query.is_empty() {
            let qs = serde_urlencoded::to_string(&request.query).map_err(|e| {
                CoreError::Validation(format!("invalid query parameters: {}", e))
            })?;
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&qs);
        }
        Url::parse(&url).map_err(|e| CoreError::Config(format!("invalid URL '{}': {}", url, e)))
    }

    /// Send a request and return the parsed response
    pub async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(request).await?;
        let token = self.provider.token().await?;

        debug!("{} {} ({})", request.method, url, self.service);

        let mut builder = self
            .provider
            .http()
            .request(request.method.clone(), url.clone())
            .header("X-Auth-Token", token)
            .header("Content-Type", "application/json;charset=UTF-8");
        if let Some(project_id) = self.provider.configured_project_id() {
            builder = builder.header("X-Project-Id", project_id);
        }
        if let Some(body) = &request.body {
            trace!("Request body: {}", body);
            builder = builder.json(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let text = response.text().await?;
        trace!("Response {}: {}", status, text);

        if !request.accepts(status) {
            return Err(ApiError::new(status, request.method.as_str(), url.as_str(), &text).into());
        }

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// GET a path and return the JSON body
    pub async fn get_json(&self, path: &str) -> Result<Value> {
        Ok(self.send(&ApiRequest::get(path)).await?.body)
    }
}
