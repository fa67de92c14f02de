use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Helper to create a test command
fn huaweictl() -> Command {
    let mut cmd = Command::cargo_bin("huaweictl").unwrap();
    cmd.env_remove("HUAWEICTL_PROFILE")
        .env_remove("HUAWEICTL_CONFIG_FILE")
        .env_remove("HW_AUTH_TOKEN")
        .env_remove("HW_REGION_NAME")
        .env_remove("RUST_LOG");
    cmd
}

/// Command bound to a config file inside `dir`
fn huaweictl_with_config(dir: &TempDir) -> Command {
    let mut cmd = huaweictl();
    cmd.arg("--config-file").arg(dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_help_flag() {
    huaweictl()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Huawei Cloud Live and DCS resource CLI"))
        .stdout(predicate::str::contains("EXAMPLES:"));
}

#[test]
fn test_version_flag() {
    huaweictl()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweictl"))
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_version_command_json() {
    huaweictl()
        .args(["-o", "json", "version"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"huaweictl\""));
}

#[test]
fn test_no_args_shows_help() {
    huaweictl()
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("Usage:"));
}

#[test]
fn test_invalid_subcommand() {
    huaweictl()
        .arg("invalid-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unrecognized subcommand"));
}

#[test]
fn test_types_lists_resources_and_data_sources() {
    huaweictl()
        .arg("types")
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweicloud_dcs_instance"))
        .stdout(predicate::str::contains("huaweicloud_live_domain"))
        .stdout(predicate::str::contains("huaweicloud_live_domains"));
}

#[test]
fn test_types_with_query() {
    huaweictl()
        .args(["-o", "json", "-q", "data_sources", "types"])
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweicloud_dcs_accounts"))
        .stdout(predicate::str::contains("huaweicloud_live_channel\"").not());
}

#[test]
fn test_serve_help_describes_protocol() {
    huaweictl()
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("PROTOCOL:"))
        .stdout(predicate::str::contains("diagnostics"));
}

#[test]
fn test_api_rejects_bad_method() {
    huaweictl()
        .args(["api", "dcs", "fetch", "v2/{project_id}/instances"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid HTTP method"));
}

#[test]
fn test_completions_bash() {
    huaweictl()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("huaweictl"));
}

#[test]
fn test_profile_list_empty() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No profiles configured"));
}

#[test]
fn test_profile_set_show_default_remove() {
    let dir = TempDir::new().unwrap();

    huaweictl_with_config(&dir)
        .args([
            "--region",
            "cn-north-4",
            "profile",
            "set",
            "dev",
            "--auth-token",
            "token-0123456789",
            "--endpoint",
            "dcs=https://dcs.internal.example.com",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("Profile 'dev' created"));

    huaweictl_with_config(&dir)
        .args([
            "--region",
            "ap-southeast-1",
            "profile",
            "set",
            "ops",
            "--user-name",
            "ops",
            "--domain-name",
            "acme",
        ])
        .assert()
        .success();

    huaweictl_with_config(&dir)
        .args(["-o", "json", "profile", "show", "dev"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"region\": \"cn-north-4\""))
        .stdout(predicate::str::contains("****6789"))
        .stdout(predicate::str::contains("token-0123456789").not())
        .stdout(predicate::str::contains("dcs.internal.example.com"));

    huaweictl_with_config(&dir)
        .args(["profile", "default", "ops"])
        .assert()
        .success();

    huaweictl_with_config(&dir)
        .args(["-o", "json", "profile", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"count\": 2"))
        .stdout(predicate::str::contains("\"auth_method\": \"password\""));

    huaweictl_with_config(&dir)
        .args(["profile", "remove", "dev"])
        .assert()
        .success();

    huaweictl_with_config(&dir)
        .args(["profile", "show", "dev"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Profile 'dev' not found"));
}

#[test]
fn test_profile_set_requires_region() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["profile", "set", "dev", "--auth-token", "token"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--region"));
}

#[test]
fn test_profile_set_requires_credentials() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["--region", "cn-north-4", "profile", "set", "dev"])
        .assert()
        .failure()
        .code(2);
}

#[test]
fn test_remove_unknown_profile() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["profile", "remove", "ghost"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("ghost"));
}

#[test]
fn test_unknown_resource_type() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["resource", "create", "huaweicloud_vpc", "--data", "{}"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown type 'huaweicloud_vpc'"));
}

#[test]
fn test_create_without_data_fails() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["resource", "create", "huaweicloud_dcs_backup"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--data is required"));
}

#[test]
fn test_read_without_state_fails() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["resource", "read", "huaweicloud_live_domain"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--state is required"));
}

#[test]
fn test_data_without_profile_fails() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .args(["data", "huaweicloud_dcs_instances"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No profile configured"));
}

#[test]
fn test_serve_reports_errors_per_line() {
    let dir = TempDir::new().unwrap();
    huaweictl_with_config(&dir)
        .arg("serve")
        .write_stdin("not json\n{\"op\":\"read\",\"type\":\"huaweicloud_dcs_instance\",\"state\":{\"id\":\"x\",\"attributes\":{}}}\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("malformed request"))
        .stdout(predicate::str::contains("No profile configured"))
        .stdout(predicate::str::contains("\"diagnostics\":[]"));
}
