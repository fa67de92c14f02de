//! Resource type registry
//!
//! Maps type names such as `huaweicloud_dcs_instance` to their
//! implementations and runs one lifecycle action against a type. Both the
//! CLI commands and the plugin server go through [`Registry::run`].

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::{CoreError, Result};
use crate::provider::Provider;
use crate::resource::{DataSource, Resource};
use crate::schema::{ResourceData, ResourceState, Timeouts};
use crate::services::{dcs, live};

/// Lifecycle action on a resource or data source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Create,
    Read,
    Update,
    Delete,
    Import,
    /// Read a data source
    ReadData,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Create => "create",
            Action::Read => "read",
            Action::Update => "update",
            Action::Delete => "delete",
            Action::Import => "import",
            Action::ReadData => "read_data",
        }
    }
}

/// Inputs of one action
#[derive(Debug, Clone, Default)]
pub struct ActionInput {
    /// Import ID; ignored by other actions
    pub id: Option<String>,
    /// Desired configuration
    pub config: Option<Map<String, Value>>,
    /// Prior state, required by read, update and delete
    pub state: Option<ResourceState>,
    /// Overrides the timeout of the action
    pub timeout: Option<Duration>,
}

/// Result of an action
#[derive(Debug, Clone, Default, Serialize)]
pub struct Outcome {
    /// New state; `None` once the object is gone
    pub state: Option<ResourceState>,
    pub warnings: Vec<String>,
}

#[derive(Default, Clone)]
pub struct Registry {
    resources: BTreeMap<&'static str, Arc<dyn Resource>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSource>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every Live and DCS type
    pub fn builtin() -> Self {
        let mut registry = Self::new();

        registry.register_resource(live::LiveChannel);
        registry.register_resource(live::LiveDomain);
        registry.register_resource(live::LiveRecording);
        registry.register_resource(live::LiveTranscoding);
        registry.register_resource(live::LiveSnapshot);
        registry.register_resource(live::LiveRefererValidation);
        registry.register_resource(live::LiveIpAcl);
        registry.register_resource(live::LiveUrlAuthentication);

        registry.register_resource(dcs::DcsInstance);
        registry.register_resource(dcs::DcsAccount);
        registry.register_resource(dcs::DcsBackup);
        registry.register_resource(dcs::DcsDiagnosisTask);
        registry.register_resource(dcs::DcsBackupImportTask);
        registry.register_resource(dcs::DcsKeyAnalysis::new(dcs::KeyAnalysisKind::BigKey));
        registry.register_resource(dcs::DcsKeyAnalysis::new(dcs::KeyAnalysisKind::HotKey));

        registry.register_data_source(live::LiveChannels);
        registry.register_data_source(live::LiveDomains);
        registry.register_data_source(dcs::DcsInstances);
        registry.register_data_source(dcs::DcsAccounts);

        registry
    }

    pub fn register_resource(&mut self, resource: impl Resource + 'static) {
        self.resources.insert(resource.type_name(), Arc::new(resource));
    }

    pub fn register_data_source(&mut self, data_source: impl DataSource + 'static) {
        self.data_sources
            .insert(data_source.type_name(), Arc::new(data_source));
    }

    pub fn resource_types(&self) -> Vec<&'static str> {
        self.resources.keys().copied().collect()
    }

    pub fn data_source_types(&self) -> Vec<&'static str> {
        self.data_sources.keys().copied().collect()
    }

    pub fn resource(&self, type_name: &str) -> Result<&dyn Resource> {
        self.resources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| CoreError::Validation(format!("unknown resource type '{}'", type_name)))
    }

    pub fn data_source(&self, type_name: &str) -> Result<&dyn DataSource> {
        self.data_sources
            .get(type_name)
            .map(|r| r.as_ref())
            .ok_or_else(|| CoreError::Validation(format!("unknown data source type '{}'", type_name)))
    }

    /// Run one action against a registered type
    pub async fn run(
        &self,
        provider: &Provider,
        action: Action,
        type_name: &str,
        input: ActionInput,
    ) -> Result<Outcome> {
        debug!("Running {} on {}", action.as_str(), type_name);

        if action == Action::ReadData {
            let data_source = self.data_source(type_name)?;
            let mut d = ResourceData::new(input.config.unwrap_or_default());
            data_source.read(provider, &mut d).await?;
            return Ok(finish(d));
        }

        let resource = self.resource(type_name)?;
        let mut d = match action {
            Action::Create => ResourceData::new(input.config.unwrap_or_default()),
            Action::Import => {
                let id = input
                    .id
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| CoreError::Validation("import requires an ID".to_string()))?;
                let state = ResourceState {
                    id,
                    attributes: Map::new(),
                };
                ResourceData::from_state(state, input.config)
            }
            _ => {
                let state = input.state.filter(|s| !s.id.is_empty()).ok_or_else(|| {
                    CoreError::Validation(format!("{} requires a prior state with an ID", action.as_str()))
                })?;
                ResourceData::from_state(state, input.config)
            }
        };
        d.apply_timeouts(effective_timeouts(resource, provider, action, input.timeout))?;

        match action {
            Action::Create => resource.create(provider, &mut d).await?,
            Action::Read | Action::ReadData => resource.read(provider, &mut d).await?,
            Action::Update => resource.update(provider, &mut d).await?,
            Action::Delete => {
                resource.delete(provider, &mut d).await?;
                d.set_id("");
            }
            Action::Import => {
                resource.import(provider, &mut d).await?;
                resource.read(provider, &mut d).await?;
                if d.is_removed() {
                    return Err(CoreError::Validation(format!(
                        "cannot import non-existent remote object of type {}",
                        type_name
                    )));
                }
            }
        }

        info!(
            "{} {} finished{}",
            type_name,
            action.as_str(),
            if d.is_removed() { " (removed from state)" } else { "" }
        );
        Ok(finish(d))
    }
}

/// Resource defaults, then profile settings, then the per-call override
fn effective_timeouts(
    resource: &dyn Resource,
    provider: &Provider,
    action: Action,
    timeout: Option<Duration>,
) -> Timeouts {
    let mut timeouts = resource.default_timeouts();
    let profile = provider.timeouts();
    if let Some(t) = profile.create() {
        timeouts.create = t;
    }
    if let Some(t) = profile.update() {
        timeouts.update = t;
    }
    if let Some(t) = profile.delete() {
        timeouts.delete = t;
    }
    if let Some(t) = timeout {
        match action {
            Action::Create => timeouts.create = t,
            Action::Update => timeouts.update = t,
            Action::Delete => timeouts.delete = t,
            Action::Read | Action::Import | Action::ReadData => timeouts.read = t,
        }
    }
    timeouts
}

fn finish(d: ResourceData) -> Outcome {
    Outcome {
        warnings: d.warnings().to_vec(),
        state: if d.is_removed() { None } else { Some(d.state()) },
    }
}
