//! Resource lifecycle, data source and type listing commands

use std::time::Duration;

use colored::Colorize;
use huaweictl_core::{Action, ActionInput, Outcome, Registry, ResourceState};
use serde_json::{Value, json};
use tracing::{debug, info};

use super::read_object_arg;
use super::wait_utils::WaitSpinner;
use crate::cli::{LifecycleArgs, OutputFormat, ResourceCommands};
use crate::connection::{ConnectionManager, ProviderOptions};
use crate::error::{HuaweiCtlError, Result as CliResult};
use crate::output::{self, print_output};

/// Global options every command needs
pub struct CommandContext<'a> {
    pub conn_mgr: &'a ConnectionManager,
    pub profile: Option<&'a str>,
    pub region: Option<&'a str>,
    pub output: OutputFormat,
    pub query: Option<&'a str>,
}

/// Parse prior state; accepts either a bare state or a command's printed output
pub fn parse_state(value: Value) -> CliResult<ResourceState> {
    let value = match value {
        Value::Object(mut map) if !map.contains_key("id") && map.contains_key("state") => {
            map.remove("state").unwrap_or(Value::Null)
        }
        other => other,
    };
    serde_json::from_value(value).map_err(|e| HuaweiCtlError::InvalidInput {
        message: format!("invalid state: {}", e),
    })
}

pub async fn handle_resource_command(
    ctx: &CommandContext<'_>,
    command: &ResourceCommands,
) -> CliResult<()> {
    let registry = Registry::builtin();
    let type_name = command.type_name();
    // fail on a typo before touching credentials
    registry.resource(type_name)?;

    let (action, input, wait_interval) = match command {
        ResourceCommands::Create(args) => (Action::Create, lifecycle_input(args, false)?, args.wait_interval),
        ResourceCommands::Read(args) => (Action::Read, lifecycle_input(args, true)?, args.wait_interval),
        ResourceCommands::Update(args) => (Action::Update, lifecycle_input(args, true)?, args.wait_interval),
        ResourceCommands::Delete(args) => (Action::Delete, lifecycle_input(args, true)?, args.wait_interval),
        ResourceCommands::Import { id, data, .. } => (
            Action::Import,
            ActionInput {
                id: Some(id.clone()),
                config: read_object_arg(data.as_deref(), "data")?,
                ..Default::default()
            },
            None,
        ),
    };

    let spinner = WaitSpinner::new(format!("{} {}", action.as_str(), type_name));
    let provider = ctx
        .conn_mgr
        .create_provider(
            ctx.profile,
            ProviderOptions {
                region: ctx.region.map(str::to_string),
                poll_interval: wait_interval.map(Duration::from_secs),
                progress: Some(spinner.callback()),
                interactive: true,
            },
        )
        .await;
    let provider = match provider {
        Ok(provider) => provider,
        Err(e) => {
            spinner.finish();
            return Err(e);
        }
    };

    let prior_id = input.state.as_ref().map(|s| s.id.clone());
    let result = registry.run(&provider, action, type_name, input).await;
    spinner.finish();
    let outcome = result?;

    print_warnings(&outcome);
    match (&outcome.state, action) {
        (None, Action::Delete) => {
            info!("Deleted {} {:?}", type_name, prior_id);
            print_removed(ctx, type_name, prior_id.as_deref(), "deleted")
        }
        (None, _) => print_removed(ctx, type_name, prior_id.as_deref(), "no longer exists"),
        (Some(state), _) => print_output(state, ctx.output.into(), ctx.query).map_err(Into::into),
    }
}

fn lifecycle_input(args: &LifecycleArgs, needs_state: bool) -> CliResult<ActionInput> {
    let state = match (&args.state, needs_state) {
        (Some(state), _) => Some(parse_state(super::read_json_arg(state)?)?),
        (None, true) => {
            return Err(HuaweiCtlError::InvalidInput {
                message: "--state is required for this operation".to_string(),
            });
        }
        (None, false) => None,
    };
    let config = read_object_arg(args.data.as_deref(), "data")?;
    if config.is_none() && !needs_state {
        return Err(HuaweiCtlError::InvalidInput {
            message: "--data is required to create a resource".to_string(),
        });
    }
    debug!(
        "Lifecycle input: state={}, config={}",
        state.is_some(),
        config.is_some()
    );

    Ok(ActionInput {
        id: None,
        config,
        state,
        timeout: args.timeout.map(Duration::from_secs),
    })
}

fn print_warnings(outcome: &Outcome) {
    for warning in &outcome.warnings {
        eprintln!("{}{}{}", "warning".yellow().bold(), ": ".bold(), warning);
    }
}

fn print_removed(
    ctx: &CommandContext<'_>,
    type_name: &str,
    id: Option<&str>,
    what: &str,
) -> CliResult<()> {
    match ctx.output {
        OutputFormat::Auto | OutputFormat::Table => {
            println!("{} {} {}", type_name, id.unwrap_or_default(), what);
            Ok(())
        }
        OutputFormat::Json | OutputFormat::Yaml => {
            print_output(Value::Null, ctx.output.into(), None).map_err(Into::into)
        }
    }
}

pub async fn handle_data_command(
    ctx: &CommandContext<'_>,
    type_name: &str,
    data: Option<&str>,
) -> CliResult<()> {
    let registry = Registry::builtin();
    registry.data_source(type_name)?;

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
    let input = ActionInput {
        config: read_object_arg(data, "data")?,
        ..Default::default()
    };
    let outcome = registry
        .run(&provider, Action::ReadData, type_name, input)
        .await?;

    print_warnings(&outcome);
    let attributes = outcome
        .state
        .map(|s| Value::Object(s.attributes))
        .unwrap_or(Value::Null);
    print_output(attributes, ctx.output.into(), ctx.query)?;
    Ok(())
}

pub fn handle_types_command(output_format: OutputFormat, query: Option<&str>) -> CliResult<()> {
    let registry = Registry::builtin();
    match output_format {
        OutputFormat::Auto | OutputFormat::Table if query.is_none() => {
            println!("{}", "Resources:".bold());
            for name in registry.resource_types() {
                println!("  {}", name);
            }
            println!("{}", "Data sources:".bold());
            for name in registry.data_source_types() {
                println!("  {}", name);
            }
        }
        _ => {
            let data = json!({
                "resources": registry.resource_types(),
                "data_sources": registry.data_source_types(),
            });
            print_output(data, output::OutputFormat::from(output_format), query)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_state_accepts_bare_state() {
        let state = parse_state(json!({"id": "inst-1", "attributes": {"name": "cache"}})).unwrap();
        assert_eq!(state.id, "inst-1");
        assert_eq!(state.attributes["name"], "cache");
    }

    #[test]
    fn test_parse_state_unwraps_outcome() {
        let state = parse_state(json!({
            "state": {"id": "bk-1", "attributes": {}},
            "warnings": []
        }))
        .unwrap();
        assert_eq!(state.id, "bk-1");
    }

    #[test]
    fn test_parse_state_rejects_garbage() {
        assert!(matches!(
            parse_state(json!([1, 2])),
            Err(HuaweiCtlError::InvalidInput { .. })
        ));
    }

    #[test]
    fn test_create_requires_data() {
        let args = LifecycleArgs {
            r#type: "huaweicloud_dcs_backup".to_string(),
            data: None,
            state: None,
            timeout: None,
            wait_interval: None,
        };
        assert!(lifecycle_input(&args, false).is_err());
    }

    #[test]
    fn test_read_requires_state() {
        let args = LifecycleArgs {
            r#type: "huaweicloud_dcs_backup".to_string(),
            data: None,
            state: None,
            timeout: Some(30),
            wait_interval: None,
        };
        let err = lifecycle_input(&args, true).unwrap_err();
        assert!(err.to_string().contains("--state"));
    }
}
