//! Provider configuration shared by every resource operation
//!
//! A [`Provider`] holds the region, project, credentials and HTTP client.
//! It hands out [`ServiceClient`]s per service and runs wait loops with the
//! profile's poll settings and the optional progress callback applied.
//!
//! # Example
//!
//! ```rust,ignore
//! use huaweictl_core::Provider;
//!
//! let provider = Provider::builder()
//!     .region("cn-north-4")
//!     .project_id("0123456789abcdef")
//!     .auth_token(token)
//!     .build()?;
//! let dcs = provider.client("dcs")?;
//! ```

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::OnceCell;
use tracing::debug;

use crate::auth::{self, Auth};
use crate::client::ServiceClient;
use crate::config::{Credentials, DEFAULT_CLOUD, Profile, TimeoutsConfig};
use crate::error::{CoreError, Result};
use crate::progress::{ProgressCallback, ProgressEvent, emit};
use crate::wait::{Refreshed, StateChangeConf};

const DEFAULT_USER_AGENT: &str = concat!("huaweictl/", env!("CARGO_PKG_VERSION"));

/// Services whose endpoint does not carry the region
const GLOBAL_SERVICES: &[&str] = &["bss"];

struct Inner {
    http: reqwest::Client,
    region: String,
    cloud: String,
    configured_project_id: Option<String>,
    resolved_project_id: OnceCell<String>,
    auth: Auth,
    token: OnceCell<String>,
    endpoints: BTreeMap<String, String>,
    timeouts: TimeoutsConfig,
    progress: Option<ProgressCallback>,
}

/// Shared provider handle; cheap to clone
#[derive(Clone)]
pub struct Provider {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("region", &self.inner.region)
            .field("cloud", &self.inner.cloud)
            .field("project_id", &self.inner.configured_project_id)
            .field("auth", &self.inner.auth)
            .field("endpoints", &self.inner.endpoints)
            .finish()
    }
}

/// Builder for [`Provider`]
#[derive(Default)]
pub struct ProviderBuilder {
    region: Option<String>,
    project_id: Option<String>,
    cloud: Option<String>,
    auth: Option<Auth>,
    endpoints: BTreeMap<String, String>,
    timeouts: TimeoutsConfig,
    user_agent: Option<String>,
    progress: Option<ProgressCallback>,
}

impl ProviderBuilder {
    /// Start from a profile's region, project, cloud, endpoints and timeouts
    pub fn from_profile(profile: &Profile) -> Self {
        Self {
            region: Some(profile.region.clone()),
            project_id: profile.project_id.clone(),
            cloud: Some(profile.cloud.clone()),
            endpoints: profile.endpoints.clone(),
            timeouts: profile.timeouts(),
            ..Self::default()
        }
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    pub fn project_id(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = Some(cloud.into());
        self
    }

    pub fn auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth = Some(Auth::Token(token.into()));
        self
    }

    pub fn password_auth(
        mut self,
        user_name: impl Into<String>,
        password: impl Into<String>,
        domain_name: impl Into<String>,
    ) -> Self {
        self.auth = Some(Auth::Password {
            user_name: user_name.into(),
            password: password.into(),
            domain_name: domain_name.into(),
        });
        self
    }

    /// Use resolved profile credentials; a password must be present
    pub fn credentials(self, credentials: Credentials) -> Result<Self> {
        match credentials {
            Credentials::Token(token) => Ok(self.auth_token(token)),
            Credentials::Password {
                user_name,
                password: Some(password),
                domain_name,
            } => Ok(self.password_auth(user_name, password, domain_name)),
            Credentials::Password { user_name, .. } => Err(CoreError::Config(format!(
                "no password available for IAM user '{}'",
                user_name
            ))),
        }
    }

    /// Override the endpoint of one service
    pub fn endpoint(mut self, service: &str, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.to_string(), url.into());
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutsConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Cap every wait delay and poll interval
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.timeouts.poll_interval_ms = Some(interval.as_millis() as u64);
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = Some(user_agent.into());
        self
    }

    pub fn on_progress(mut self, callback: ProgressCallback) -> Self {
        self.progress = Some(callback);
        self
    }

    pub fn build(self) -> Result<Provider> {
        let region = self
            .region
            .filter(|r| !r.is_empty())
            .ok_or_else(|| CoreError::Config("region is required".to_string()))?;
        let auth = self
            .auth
            .ok_or_else(|| CoreError::Config("credentials are required".to_string()))?;

        let http = reqwest::Client::builder()
            .user_agent(self.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT))
            .timeout(self.timeouts.request_timeout())
            .build()?;

        let endpoints = self
            .endpoints
            .into_iter()
            .map(|(service, url)| {
                let url = if url.ends_with('/') { url } else { format!("{}/", url) };
                (service, url)
            })
            .collect();

        Ok(Provider {
            inner: Arc::new(Inner {
                http,
                region,
                cloud: self.cloud.unwrap_or_else(|| DEFAULT_CLOUD.to_string()),
                configured_project_id: self.project_id.filter(|p| !p.is_empty()),
                resolved_project_id: OnceCell::new(),
                auth,
                token: OnceCell::new(),
                endpoints,
                timeouts: self.timeouts,
                progress: self.progress,
            }),
        })
    }
}

impl Provider {
    pub fn builder() -> ProviderBuilder {
        ProviderBuilder::default()
    }

    pub fn region(&self) -> &str {
        &self.inner.region
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.inner.http
    }

    pub(crate) fn configured_project_id(&self) -> Option<&str> {
        self.inner.configured_project_id.as_deref()
    }

    pub fn timeouts(&self) -> &TimeoutsConfig {
        &self.inner.timeouts
    }

    /// Endpoint URL for a service, always ending with `/`
    pub fn endpoint(&self, service: &str) -> String {
        if let Some(url) = self.inner.endpoints.get(service) {
            return url.clone();
        }
        if GLOBAL_SERVICES.contains(&service) {
            format!("https://{}.{}/", service, self.inner.cloud)
        } else {
            format!(
                "https://{}.{}.{}/",
                service, self.inner.region, self.inner.cloud
            )
        }
    }

    /// Client bound to a service endpoint
    pub fn client(&self, service: &str) -> Result<ServiceClient> {
        let endpoint = self.endpoint(service);
        url::Url::parse(&endpoint).map_err(|e| {
            CoreError::Config(format!("invalid {} endpoint '{}': {}", service, endpoint, e))
        })?;
        Ok(ServiceClient::new(service, endpoint, self.clone()))
    }

    /// Auth token, fetched from IAM once for password profiles
    pub async fn token(&self) -> Result<String> {
        let token = self
            .inner
            .token
            .get_or_try_init(|| async {
                match &self.inner.auth {
                    Auth::Token(token) => Ok(token.clone()),
                    Auth::Password {
                        user_name,
                        password,
                        domain_name,
                    } => {
                        let issued = auth::issue_token(
                            &self.inner.http,
                            &self.endpoint("iam"),
                            user_name,
                            password,
                            domain_name,
                            &self.inner.region,
                            self.configured_project_id(),
                        )
                        .await?;
                        if let Some(project_id) = issued.project_id {
                            let _ = self.inner.resolved_project_id.set(project_id);
                        }
                        Ok::<_, CoreError>(issued.token)
                    }
                }
            })
            .await?;
        Ok(token.clone())
    }

    /// Project ID from the profile, or from the IAM token scope
    pub async fn project_id(&self) -> Result<String> {
        if let Some(id) = &self.inner.configured_project_id {
            return Ok(id.clone());
        }
        self.token().await?;
        self.inner
            .resolved_project_id
            .get()
            .cloned()
            .ok_or_else(|| CoreError::Config("project_id is required".to_string()))
    }

    /// Run a wait loop with the profile's poll cap and progress callback applied
    pub async fn wait_for_state<F, Fut>(
        &self,
        conf: StateChangeConf,
        refresh: F,
    ) -> Result<Option<Value>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Refreshed>>,
    {
        let conf = conf.interval_cap(self.inner.timeouts.poll_cap());
        debug!("Starting wait: {}", conf.label());
        conf.wait_for_state(refresh, self.inner.progress.as_ref())
            .await
    }

    /// Sleep for a fixed interval, honouring the poll cap
    pub async fn pause(&self, interval: Duration) {
        let interval = match self.inner.timeouts.poll_cap() {
            Some(cap) => interval.min(cap),
            None => interval,
        };
        tokio::time::sleep(interval).await;
    }

    pub(crate) fn emit(&self, event: ProgressEvent) {
        emit(self.inner.progress.as_ref(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> Provider {
        Provider::builder()
            .region("cn-north-4")
            .project_id("p-1")
            .auth_token("token")
            .endpoint("live", "http://127.0.0.1:8080")
            .build()
            .unwrap()
    }

    #[test]
    fn test_endpoint_resolution() {
        let p = provider();
        assert_eq!(p.endpoint("dcs"), "https://dcs.cn-north-4.myhuaweicloud.com/");
        assert_eq!(p.endpoint("bss"), "https://bss.myhuaweicloud.com/");
        assert_eq!(p.endpoint("live"), "http://127.0.0.1:8080/");
    }

    #[test]
    fn test_build_requires_region_and_auth() {
        assert!(Provider::builder().auth_token("t").build().is_err());
        assert!(Provider::builder().region("cn-north-4").build().is_err());
    }

    #[test]
    fn test_password_credentials_need_password() {
        let missing = Credentials::Password {
            user_name: "ops".to_string(),
            password: None,
            domain_name: "acme".to_string(),
        };
        assert!(Provider::builder().credentials(missing).is_err());
    }

    #[tokio::test]
    async fn test_token_and_project_from_config() {
        let p = provider();
        assert_eq!(p.token().await.unwrap(), "token");
        assert_eq!(p.project_id().await.unwrap(), "p-1");
    }
}
