//! CLI structure and command definitions
//!
//! Three layers, all going through the same authenticated provider:
//! 1. Raw API access (`api`)
//! 2. Resource lifecycle and data source reads (`resource`, `data`)
//! 3. The line-delimited JSON plugin protocol (`serve`)

use clap::{Args, Parser, Subcommand};

/// Huawei Cloud Live and DCS resource CLI
#[derive(Parser, Debug)]
#[command(name = "huaweictl")]
#[command(version, about = "Huawei Cloud Live and DCS resource CLI")]
#[command(long_about = "
Huawei Cloud Live and DCS resource CLI

Manages Live (streaming) and DCS (Distributed Cache Service) resources with
the same create/read/update/delete/import lifecycle a declarative tool uses,
and exposes that lifecycle to external tooling through `huaweictl serve`.

EXAMPLES:
    # Set up a token profile
    huaweictl --region cn-north-4 profile set dev --auth-token $TOKEN

    # Create a DCS instance from a JSON file
    huaweictl resource create huaweicloud_dcs_instance --data @instance.json

    # Refresh it from saved state
    huaweictl resource read huaweicloud_dcs_instance --state @state.json

    # Read a data source and filter the output
    huaweictl data huaweicloud_dcs_instances --data '{\"status\":\"RUNNING\"}' -q 'instances[].name'

    # Direct API access
    huaweictl api dcs get v2/{project_id}/instances

For more help on a specific command, run:
    huaweictl <command> --help
")]
pub struct Cli {
    /// Profile to use for this command
    #[arg(long, short, global = true, env = "HUAWEICTL_PROFILE")]
    pub profile: Option<String>,

    /// Path to alternate configuration file
    #[arg(long, global = true, env = "HUAWEICTL_CONFIG_FILE")]
    pub config_file: Option<String>,

    /// Region, overriding the profile
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// Output format
    #[arg(long, short = 'o', global = true, value_enum, default_value = "auto")]
    pub output: OutputFormat,

    /// JMESPath query to filter output
    #[arg(long, short = 'q', global = true)]
    pub query: Option<String>,

    /// Enable verbose logging
    #[arg(long, short, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format options
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
pub enum OutputFormat {
    /// Automatically choose format based on command and context
    Auto,
    /// JSON output
    Json,
    /// YAML output
    Yaml,
    /// Human-readable table format
    Table,
}

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resource lifecycle operations
    #[command(subcommand, visible_alias = "res", visible_alias = "r")]
    #[command(after_help = "EXAMPLES:
    # Create a Live domain
    huaweictl resource create huaweicloud_live_domain \\
        --data '{\"name\":\"push.example.com\",\"type\":\"push\"}'

    # Update with the prior state and the new configuration
    huaweictl resource update huaweicloud_dcs_account --state @state.json --data @account.json

    # Delete with a custom timeout
    huaweictl resource delete huaweicloud_dcs_instance --state @state.json --timeout 1800

    # Import an existing object
    huaweictl resource import huaweicloud_dcs_backup <instance_id>/<backup_id>
")]
    Resource(ResourceCommands),

    /// Read a data source
    #[command(after_help = "EXAMPLES:
    # All running DCS instances
    huaweictl data huaweicloud_dcs_instances --data '{\"status\":\"RUNNING\"}'

    # Live domains as a table
    huaweictl data huaweicloud_live_domains -o table -q domains
")]
    Data {
        /// Data source type, e.g. huaweicloud_dcs_instances
        r#type: String,

        /// Filter arguments (JSON string or @file)
        #[arg(long)]
        data: Option<String>,
    },

    /// List the supported resource and data source types
    Types,

    /// Raw API access - direct REST endpoint calls
    #[command(name = "api")]
    #[command(after_help = "EXAMPLES:
    # List DCS instances; {project_id} is filled in from the profile
    huaweictl api dcs get v2/{project_id}/instances

    # POST with JSON data from a file
    huaweictl api live post v1/{project_id}/record/rules --data @rule.json
")]
    Api {
        /// Service name (dcs, live, bss, iam)
        service: String,

        /// HTTP method
        #[arg(value_parser = parse_http_method)]
        method: HttpMethod,

        /// API path relative to the service endpoint
        path: String,

        /// Request body (JSON string or @file)
        #[arg(long)]
        data: Option<String>,
    },

    /// Profile management
    #[command(subcommand, visible_alias = "prof", visible_alias = "pr")]
    #[command(after_help = "EXAMPLES:
    # Token profile
    huaweictl --region cn-north-4 profile set dev --auth-token $TOKEN

    # IAM password profile (password prompted at use when omitted)
    huaweictl --region ap-southeast-1 profile set ops \\
        --user-name ops --domain-name acme --project-id 0123456789abcdef

    # Point DCS at a private endpoint
    huaweictl --region cn-north-4 profile set dev --auth-token $TOKEN \\
        --endpoint dcs=https://dcs.internal.example.com

    # List, show and pick the default
    huaweictl profile list
    huaweictl profile show dev
    huaweictl profile default dev
")]
    Profile(ProfileCommands),

    /// Serve the resource lifecycle over stdin/stdout as JSON lines
    #[command(after_help = "PROTOCOL:
    Each request is one JSON object per line on stdin:
        {\"op\":\"create\",\"type\":\"huaweicloud_dcs_backup\",\"config\":{...}}
        {\"op\":\"read\",\"type\":\"...\",\"state\":{\"id\":\"...\",\"attributes\":{...}}}
        {\"op\":\"import\",\"type\":\"...\",\"id\":\"<instance_id>/<id>\"}
        {\"op\":\"read_data\",\"type\":\"huaweicloud_live_domains\",\"config\":{...}}
    Optional \"timeout_secs\" overrides the operation timeout.

    Each response is one JSON object per line on stdout:
        {\"id\":\"...\",\"state\":{...}|null,\"error\":null|\"...\",\"diagnostics\":[...]}
")]
    Serve,

    /// Version information
    #[command(visible_alias = "ver", visible_alias = "v")]
    Version,

    /// Generate shell completions
    #[command(visible_alias = "comp")]
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Arguments shared by lifecycle commands
#[derive(Args, Debug, Clone)]
pub struct LifecycleArgs {
    /// Resource type, e.g. huaweicloud_dcs_instance
    pub r#type: String,

    /// Resource configuration (JSON string or @file)
    #[arg(long)]
    pub data: Option<String>,

    /// Prior state (JSON string or @file) as printed by an earlier command
    #[arg(long)]
    pub state: Option<String>,

    /// Operation timeout in seconds
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Upper bound for poll intervals, in seconds
    #[arg(long)]
    pub wait_interval: Option<u64>,
}

/// Resource lifecycle commands
#[derive(Subcommand, Debug)]
pub enum ResourceCommands {
    /// Create a resource from its configuration
    #[command(visible_alias = "add")]
    Create(LifecycleArgs),

    /// Refresh a resource from its prior state
    #[command(visible_alias = "get", visible_alias = "refresh")]
    Read(LifecycleArgs),

    /// Apply configuration changes to a resource
    Update(LifecycleArgs),

    /// Delete a resource
    #[command(visible_alias = "rm")]
    Delete(LifecycleArgs),

    /// Import an existing object by ID
    Import {
        /// Resource type, e.g. huaweicloud_dcs_backup
        r#type: String,

        /// Import ID; composite IDs use '/' separators
        id: String,

        /// Configuration to merge write-only attributes from (JSON string or @file)
        #[arg(long)]
        data: Option<String>,
    },
}

impl ResourceCommands {
    pub fn type_name(&self) -> &str {
        match self {
            ResourceCommands::Create(args)
            | ResourceCommands::Read(args)
            | ResourceCommands::Update(args)
            | ResourceCommands::Delete(args) => &args.r#type,
            ResourceCommands::Import { r#type, .. } => r#type,
        }
    }
}

/// Supported shells for completion generation
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    /// Bourne Again Shell
    Bash,
    /// Z Shell
    Zsh,
    /// Friendly Interactive Shell
    Fish,
    /// PowerShell
    #[value(name = "powershell", alias = "power-shell")]
    PowerShell,
    /// Elvish
    Elvish,
}

/// HTTP methods for raw API access
#[derive(Debug, Clone, Copy)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

/// Parse HTTP method case-insensitively
fn parse_http_method(s: &str) -> Result<HttpMethod, String> {
    match s.to_lowercase().as_str() {
        "get" => Ok(HttpMethod::Get),
        "post" => Ok(HttpMethod::Post),
        "put" => Ok(HttpMethod::Put),
        "patch" => Ok(HttpMethod::Patch),
        "delete" => Ok(HttpMethod::Delete),
        _ => Err(format!(
            "invalid HTTP method: {} (valid: get, post, put, patch, delete)",
            s
        )),
    }
}

impl std::fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpMethod::Get => write!(f, "GET"),
            HttpMethod::Post => write!(f, "POST"),
            HttpMethod::Put => write!(f, "PUT"),
            HttpMethod::Patch => write!(f, "PATCH"),
            HttpMethod::Delete => write!(f, "DELETE"),
        }
    }
}

/// Parse a `service=url` endpoint override
fn parse_endpoint(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((service, url)) if !service.is_empty() && !url.is_empty() => {
            Ok((service.to_string(), url.to_string()))
        }
        _ => Err(format!("invalid endpoint '{}' (expected service=url)", s)),
    }
}

/// Profile management commands
#[derive(Subcommand, Debug)]
#[allow(clippy::large_enum_variant)]
pub enum ProfileCommands {
    /// List all configured profiles
    #[command(visible_alias = "ls", visible_alias = "l")]
    List,

    /// Show the path to the configuration file
    Path,

    /// Show details of a specific profile
    #[command(visible_alias = "sh", visible_alias = "get")]
    Show {
        /// Profile name to show
        name: String,
    },

    /// Set or create a profile; the region comes from the global --region flag
    #[command(visible_alias = "add", visible_alias = "create")]
    Set {
        /// Profile name
        name: String,

        /// Project ID; looked up through IAM when omitted
        #[arg(long)]
        project_id: Option<String>,

        /// Cloud domain suffix
        #[arg(long)]
        cloud: Option<String>,

        /// Pre-issued IAM token
        #[arg(long, required_unless_present = "user_name", conflicts_with_all = ["user_name", "password", "domain_name"])]
        auth_token: Option<String>,

        /// IAM user name
        #[arg(long, requires = "domain_name")]
        user_name: Option<String>,

        /// IAM password; prompted for at use when omitted
        #[arg(long, requires = "user_name")]
        password: Option<String>,

        /// IAM account (domain) name
        #[arg(long, requires = "user_name")]
        domain_name: Option<String>,

        /// Endpoint override as service=url (repeatable)
        #[arg(long = "endpoint", value_parser = parse_endpoint)]
        endpoints: Vec<(String, String)>,

        /// Store secrets in OS keyring instead of config file
        #[cfg(feature = "secure-storage")]
        #[arg(long)]
        use_keyring: bool,
    },

    /// Remove a profile
    #[command(visible_alias = "rm", visible_alias = "del", visible_alias = "delete")]
    Remove {
        /// Profile name to remove
        name: String,
    },

    /// Set the default profile
    #[command(visible_alias = "def")]
    Default {
        /// Profile name to use by default
        name: String,
    },
}
