pub mod api;
pub mod profile;
pub mod resource;
pub mod serve;
pub mod wait_utils;

use anyhow::Context;
use serde_json::{Map, Value};

use crate::error::{HuaweiCtlError, Result as CliResult};

/// Parse a `JSON` or `@file` argument
pub fn read_json_arg(arg: &str) -> CliResult<Value> {
    if let Some(file_path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(file_path).map_err(|e| HuaweiCtlError::FileError {
            path: file_path.to_string(),
            message: e.to_string(),
        })?;
        return Ok(serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse JSON from file: {}", file_path))?);
    }
    serde_json::from_str(arg).map_err(|e| HuaweiCtlError::InvalidInput {
        message: format!("Failed to parse JSON argument: {}", e),
    })
}

/// Parse a `JSON` or `@file` argument that must hold an object
pub fn read_object_arg(arg: Option<&str>, name: &str) -> CliResult<Option<Map<String, Value>>> {
    let Some(arg) = arg else {
        return Ok(None);
    };
    match read_json_arg(arg)? {
        Value::Object(map) => Ok(Some(map)),
        _ => Err(HuaweiCtlError::InvalidInput {
            message: format!("--{} must be a JSON object", name),
        }),
    }
}
