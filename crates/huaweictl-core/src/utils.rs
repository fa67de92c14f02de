//! Helpers shared by the resource handlers: JMESPath extraction, request
//! body cleanup, pagination, IDs and time conversions.

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
use jpx_core::Runtime;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result};

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

fn runtime() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime::builder().with_all_extensions().build())
}

/// Evaluate a JMESPath expression, returning an error for invalid expressions
pub fn try_path_search(expression: &str, value: &Value) -> Result<Value> {
    let expr = runtime()
        .compile(expression)
        .map_err(|e| CoreError::Query {
            expression: expression.to_string(),
            message: e.to_string(),
        })?;
    expr.search(value).map_err(|e| CoreError::Query {
        expression: expression.to_string(),
        message: e.to_string(),
    })
}

/// Evaluate a JMESPath expression; `null` when absent or invalid
pub fn path_search(expression: &str, value: &Value) -> Value {
    match try_path_search(expression, value) {
        Ok(v) => v,
        Err(e) => {
            warn!("{}", e);
            Value::Null
        }
    }
}

/// String result of a path search; numbers and booleans are rendered
pub fn search_string(expression: &str, value: &Value) -> Option<String> {
    match path_search(expression, value) {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Array result of a path search; anything else is treated as empty
pub fn search_array(expression: &str, value: &Value) -> Vec<Value> {
    match path_search(expression, value) {
        Value::Array(items) => items,
        _ => Vec::new(),
    }
}

/// Remove `null` members from objects, recursively.
///
/// Request bodies are built with every optional field present; unset ones
/// are `null` (see [`value_ignore_empty`]) and are dropped here.
pub fn remove_nil(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, remove_nil(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(remove_nil).collect()),
        other => other,
    }
}

/// `null` for zero values (`""`, `0`, `false`, empty array or object)
pub fn value_ignore_empty(value: Value) -> Value {
    let empty = match &value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    };
    if empty { Value::Null } else { value }
}

/// Drop `null`, `""`, `[]` and `{}` members recursively.
///
/// Used for nested blocks passed through to the API, where `false` and `0`
/// are meaningful and must be kept.
pub fn compact(value: Value) -> Value {
    fn is_blank(v: &Value) -> bool {
        match v {
            Value::Null => true,
            Value::String(s) => s.is_empty(),
            Value::Array(a) => a.is_empty(),
            Value::Object(o) => o.is_empty(),
            _ => false,
        }
    }
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, compact(v)))
                .filter(|(_, v)| !is_blank(v))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(compact)
                .filter(|v| !is_blank(v))
                .collect(),
        ),
        other => other,
    }
}

/// The object of a single-item block; accepts either `[{...}]` or `{...}`
pub fn single_block(value: Option<&Value>) -> Value {
    match value {
        Some(Value::Array(items)) => items.first().cloned().unwrap_or(Value::Null),
        Some(v @ Value::Object(_)) => v.clone(),
        _ => Value::Null,
    }
}

/// Wrap an object as a single-item block; `null` becomes an empty list
pub fn as_block(value: Value) -> Value {
    match value {
        Value::Null => Value::Array(Vec::new()),
        Value::Array(items) => Value::Array(items),
        other => Value::Array(vec![other]),
    }
}

/// Fetch every page of an offset paginated list.
///
/// `request` is sent repeatedly with `offset` and `limit` query parameters
/// until a page comes back shorter than `limit`.
pub async fn list_all_items(
    client: &ServiceClient,
    request: &ApiRequest,
    items_expression: &str,
    limit: usize,
) -> Result<Vec<Value>> {
    let mut offset = 0usize;
    let mut all = Vec::new();

    loop {
        let page_request = request
            .clone()
            .query("limit", limit)
            .query("offset", offset);
        let response = client.send(&page_request).await?;
        let items = search_array(items_expression, &response.body);
        let count = items.len();
        debug!(
            "Fetched {} items at offset {} from {}",
            count, offset, request.path
        );
        all.extend(items);

        if count < limit || count == 0 {
            return Ok(all);
        }
        offset += count;
    }
}

/// Split an import ID of the form `a/b` into exactly `parts` components
pub fn parse_import_id(id: &str, parts: usize, format: &str) -> Result<Vec<String>> {
    let split: Vec<String> = id.split('/').map(str::to_string).collect();
    if split.len() != parts || split.iter().any(String::is_empty) {
        return Err(CoreError::Validation(format!(
            "invalid format of import ID '{}', want '{}'",
            id, format
        )));
    }
    Ok(split)
}

/// Parse durations such as `90s`, `30m`, `2h` or `1h30m`
pub fn parse_duration(input: &str) -> Result<Duration> {
    let invalid = || CoreError::Validation(format!("invalid duration '{}'", input));
    let mut total = 0u64;
    let mut digits = String::new();

    for c in input.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let n: u64 = digits.parse().map_err(|_| invalid())?;
        digits.clear();
        total += match c {
            's' => n,
            'm' => n * 60,
            'h' => n * 3600,
            _ => return Err(invalid()),
        };
    }

    if !digits.is_empty() {
        // bare number means seconds
        total += digits.parse::<u64>().map_err(|_| invalid())?;
    }
    if total == 0 {
        return Err(invalid());
    }
    Ok(Duration::from_secs(total))
}

/// RFC3339 timestamp to milliseconds since the epoch
pub fn rfc3339_to_millis(input: &str) -> Result<i64> {
    DateTime::parse_from_rfc3339(input)
        .map(|t| t.timestamp_millis())
        .map_err(|e| CoreError::Validation(format!("invalid RFC3339 time '{}': {}", input, e)))
}

/// Milliseconds since the epoch to an RFC3339 timestamp in UTC
pub fn millis_to_rfc3339(millis: i64) -> Option<String> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Secs, true))
}

/// `{"k": "v"}` to the `[{"key": "k", "value": "v"}]` form the APIs expect
pub fn expand_tags(tags: Option<&Value>) -> Vec<Value> {
    let Some(Value::Object(map)) = tags else {
        return Vec::new();
    };
    map.iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            json!({ "key": k, "value": value })
        })
        .collect()
}

/// Inverse of [`expand_tags`]
pub fn flatten_tags(tags: &[Value]) -> Value {
    let map: Map<String, Value> = tags
        .iter()
        .filter_map(|t| {
            let key = t.get("key")?.as_str()?.to_string();
            let value = t.get("value").cloned().unwrap_or(Value::String(String::new()));
            Some((key, value))
        })
        .collect();
    Value::Object(map)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_path_search_filters() {
        let body = json!({
            "tasks": [
                {"id": "1", "name": "AddAcl", "status": "SUCCESS"},
                {"id": "2", "name": "DeleteAcl", "status": "EXECUTING"}
            ]
        });
        assert_eq!(
            search_string("tasks[?name=='DeleteAcl']|[0].status", &body),
            Some("EXECUTING".to_string())
        );
        assert_eq!(path_search("missing.field", &body), Value::Null);
        assert_eq!(search_array("tasks", &body).len(), 2);
    }

    #[test]
    fn test_invalid_expression_is_null() {
        assert_eq!(path_search("tasks[?", &json!({})), Value::Null);
        assert!(try_path_search("tasks[?", &json!({})).is_err());
    }

    #[test]
    fn test_remove_nil_and_ignore_empty() {
        let body = json!({
            "name": "cache",
            "description": value_ignore_empty(json!("")),
            "port": value_ignore_empty(json!(0)),
            "bss_param": {"charging_mode": "postPaid", "period_num": null},
            "tags": []
        });

        assert_eq!(
            remove_nil(body),
            json!({
                "name": "cache",
                "bss_param": {"charging_mode": "postPaid"},
                "tags": []
            })
        );
    }

    #[test]
    fn test_parse_import_id() {
        assert_eq!(
            parse_import_id("inst-1/acc-2", 2, "<instance_id>/<id>").unwrap(),
            vec!["inst-1".to_string(), "acc-2".to_string()]
        );
        assert!(parse_import_id("inst-1", 2, "<instance_id>/<id>").is_err());
        assert!(parse_import_id("inst-1/", 2, "<instance_id>/<id>").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert_eq!(parse_duration("30m").unwrap(), Duration::from_secs(1800));
        assert_eq!(parse_duration("1h30m").unwrap(), Duration::from_secs(5400));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("10x").is_err());
        assert!(parse_duration("").is_err());
    }

    #[test]
    fn test_time_conversions() {
        let millis = rfc3339_to_millis("2024-03-01T10:00:00+08:00").unwrap();
        assert_eq!(millis, 1_709_258_400_000);
        assert_eq!(
            millis_to_rfc3339(millis).as_deref(),
            Some("2024-03-01T02:00:00Z")
        );
        assert!(rfc3339_to_millis("yesterday").is_err());
    }

    #[test]
    fn test_tags_conversion() {
        let tags = json!({"env": "prod"});
        let expanded = expand_tags(Some(&tags));
        assert_eq!(expanded, vec![json!({"key": "env", "value": "prod"})]);
        assert_eq!(flatten_tags(&expanded), tags);
    }

    #[test]
    fn test_compact_keeps_false_and_zero() {
        let block = json!({
            "url": "rtmp://origin/live",
            "enable_snapshot": false,
            "bitrate": 0,
            "backup_urls": [],
            "passphrase": "",
            "latency": null,
            "failover": {"input_preference": ""}
        });
        assert_eq!(
            compact(block),
            json!({"url": "rtmp://origin/live", "enable_snapshot": false, "bitrate": 0})
        );
    }

    #[test]
    fn test_single_block() {
        let listed = json!([{"rollingbuffer_duration": 3600}]);
        assert_eq!(single_block(Some(&listed)), json!({"rollingbuffer_duration": 3600}));
        assert_eq!(single_block(None), Value::Null);
        assert_eq!(as_block(json!({"a": 1})), json!([{"a": 1}]));
        assert_eq!(as_block(Value::Null), json!([]));
    }
}
