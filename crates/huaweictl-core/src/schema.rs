//! Attribute model for resources and data sources
//!
//! [`ResourceData`] carries the resource ID, the desired attribute map and
//! the prior state. Handlers read inputs with the typed getters, detect
//! updates with [`ResourceData::has_change`] and write computed attributes
//! back with [`ResourceData::set`].

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use crate::error::{CoreError, Result};
use crate::utils::parse_duration;

/// Persisted state of one resource
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ResourceState {
    pub id: String,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Operation timeouts for a resource
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timeouts {
    pub create: Duration,
    pub read: Duration,
    pub update: Duration,
    pub delete: Duration,
}

impl Timeouts {
    pub const fn minutes(create: u64, update: u64, delete: u64) -> Self {
        Self {
            create: Duration::from_secs(create * 60),
            read: Duration::from_secs(5 * 60),
            update: Duration::from_secs(update * 60),
            delete: Duration::from_secs(delete * 60),
        }
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self::minutes(10, 10, 10)
    }
}

/// Working copy of a resource during one operation
#[derive(Debug, Clone)]
pub struct ResourceData {
    id: String,
    current: Map<String, Value>,
    prior: Map<String, Value>,
    timeouts: Timeouts,
    warnings: Vec<String>,
}

fn is_zero(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

impl ResourceData {
    /// Data for a resource that does not exist yet
    pub fn new(config: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            current: config,
            prior: Map::new(),
            timeouts: Timeouts::default(),
            warnings: Vec::new(),
        }
    }

    /// Data for an existing resource, optionally with a new desired configuration.
    ///
    /// Configuration keys replace prior values; computed attributes that are
    /// not part of the configuration keep their prior value.
    pub fn from_state(state: ResourceState, config: Option<Map<String, Value>>) -> Self {
        let mut current = state.attributes.clone();
        if let Some(config) = config {
            for (k, v) in config {
                current.insert(k, v);
            }
        }
        Self {
            id: state.id,
            current,
            prior: state.attributes,
            timeouts: Timeouts::default(),
            warnings: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// True once the resource has been removed from state
    pub fn is_removed(&self) -> bool {
        self.id.is_empty()
    }

    /// Get a value by key; dotted paths index into objects and arrays (`backup_policy.0.save_days`)
    pub fn get(&self, key: &str) -> Option<&Value> {
        let mut parts = key.split('.');
        let first = parts.next()?;
        let mut value = self.current.get(first)?;
        for part in parts {
            value = match value {
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                Value::Object(map) => map.get(part)?,
                _ => return None,
            };
        }
        if value.is_null() { None } else { Some(value) }
    }

    /// Value when set and not a zero value
    pub fn get_ok(&self, key: &str) -> Option<&Value> {
        self.get(key).filter(|v| !is_zero(v))
    }

    /// String value; empty when unset
    pub fn get_str(&self, key: &str) -> String {
        match self.get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => String::new(),
        }
    }

    /// Non-empty string value
    pub fn get_str_opt(&self, key: &str) -> Option<String> {
        let s = self.get_str(key);
        if s.is_empty() { None } else { Some(s) }
    }

    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s == "true",
            _ => false,
        }
    }

    pub fn get_i64(&self, key: &str) -> i64 {
        match self.get(key) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or(0),
            Some(Value::String(s)) => s.parse().unwrap_or(0),
            _ => 0,
        }
    }

    pub fn get_f64(&self, key: &str) -> f64 {
        match self.get(key) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
            Some(Value::String(s)) => s.parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Array value; a single object is treated as a one-element list
    pub fn get_list(&self, key: &str) -> Vec<Value> {
        match self.get(key) {
            Some(Value::Array(items)) => items.clone(),
            Some(v @ Value::Object(_)) => vec![v.clone()],
            _ => Vec::new(),
        }
    }

    pub fn get_string_list(&self, key: &str) -> Vec<String> {
        self.get_list(key)
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect()
    }

    /// Object value
    pub fn get_map(&self, key: &str) -> Map<String, Value> {
        match self.get(key) {
            Some(Value::Object(map)) => map.clone(),
            _ => Map::new(),
        }
    }

    /// Required string attribute
    pub fn require_str(&self, key: &str) -> Result<String> {
        self.get_str_opt(key)
            .ok_or_else(|| CoreError::Validation(format!("'{}' is required", key)))
    }

    /// Set a top-level attribute
    pub fn set(&mut self, key: &str, value: impl Into<Value>) {
        self.current.insert(key.to_string(), value.into());
    }

    /// Prior state value of an attribute
    pub fn get_prior(&self, key: &str) -> Option<&Value> {
        self.prior.get(key).filter(|v| !v.is_null())
    }

    /// Compare the desired value against the prior state
    pub fn has_change(&self, key: &str) -> bool {
        let new = self.current.get(key).filter(|v| !is_zero(v));
        let old = self.prior.get(key).filter(|v| !is_zero(v));
        new != old
    }

    pub fn has_changes(&self, keys: &[&str]) -> bool {
        keys.iter().any(|k| self.has_change(k))
    }

    /// `(old, new)` pair for an attribute
    pub fn get_change(&self, key: &str) -> (Value, Value) {
        (
            self.prior.get(key).cloned().unwrap_or(Value::Null),
            self.current.get(key).cloned().unwrap_or(Value::Null),
        )
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    /// Apply default timeouts, then any `timeouts` block from the configuration
    pub fn apply_timeouts(&mut self, defaults: Timeouts) -> Result<()> {
        let mut timeouts = defaults;
        if let Some(Value::Object(block)) = self.current.get("timeouts") {
            for (name, value) in block {
                let Some(text) = value.as_str() else { continue };
                let duration = parse_duration(text)?;
                match name.as_str() {
                    "create" => timeouts.create = duration,
                    "read" => timeouts.read = duration,
                    "update" => timeouts.update = duration,
                    "delete" => timeouts.delete = duration,
                    other => warn!("ignoring unknown timeout '{}'", other),
                }
            }
        }
        self.timeouts = timeouts;
        Ok(())
    }

    /// Record a non-fatal diagnostic for the caller
    pub fn add_warning(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Snapshot of the current state
    pub fn state(&self) -> ResourceState {
        ResourceState {
            id: self.id.clone(),
            attributes: self.current.clone(),
        }
    }
}

/// Translate a not-found error into removal from state.
///
/// Returns `Ok(())` with the ID cleared when `err` is a 404, otherwise the
/// error wrapped with `context`.
pub fn check_deleted(d: &mut ResourceData, err: CoreError, context: &str) -> Result<()> {
    if err.is_not_found() {
        mark_gone(d, context);
        return Ok(());
    }
    Err(err.context(context.to_string()))
}

/// Remove a resource from state after the API reported it missing
pub fn mark_gone(d: &mut ResourceData, context: &str) {
    warn!(
        "Resource {} not found, removing from state ({})",
        d.id(),
        context
    );
    d.set_id("");
}
