//! `huaweicloud_dcs_instance`

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use super::common::{
    INSTANCE_RETRY_DELAY, InstanceProbe, SERVICE, STATE_DELETED, busy_retry, find_by_id,
    instance_request, wait_instance,
};
use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::operation::{Operation, RetryMode, STATE_RUNNING};
use crate::provider::Provider;
use crate::resource::Resource;
use crate::schema::{ResourceData, Timeouts, check_deleted};
use crate::services::bss;
use crate::utils::{
    as_block, expand_tags, flatten_tags, millis_to_rfc3339, path_search, remove_nil, search_array,
    search_string, single_block, value_ignore_empty,
};
use crate::wait::{Refreshed, StateChangeConf};

const CHARGE_MODE_PREPAID: &str = "prePaid";

/// Redis versions that only support whitelists, not security groups
const WHITELIST_ONLY_VERSIONS: &[&str] = &["4.0", "5.0", "6.0"];

/// Rejected password and resize calls are repeated after a fixed pause
const FIXED_RETRY_INTERVAL: Duration = Duration::from_secs(10);

/// Attributes copied verbatim from the instance body
const READ_FIELDS: &[(&str, &str)] = &[
    ("name", "name"),
    ("engine", "engine"),
    ("engine_version", "engine_version"),
    ("flavor", "spec_code"),
    ("availability_zones", "az_codes"),
    ("vpc_id", "vpc_id"),
    ("vpc_name", "vpc_name"),
    ("subnet_id", "subnet_id"),
    ("subnet_name", "subnet_name"),
    ("subnet_cidr", "subnet_cidr"),
    ("security_group_name", "security_group_name"),
    ("enterprise_project_id", "enterprise_project_id"),
    ("description", "description"),
    ("private_ip", "ip"),
    ("maintain_begin", "maintain_begin"),
    ("maintain_end", "maintain_end"),
    ("port", "port"),
    ("status", "status"),
    ("used_memory", "used_memory"),
    ("max_memory", "max_memory"),
    ("domain_name", "domain_name"),
    ("user_id", "user_id"),
    ("user_name", "user_name"),
    ("access_user", "access_user"),
    ("ssl_enable", "enable_ssl"),
    ("created_at", "created_at"),
    ("launched_at", "launched_at"),
    ("cache_mode", "cache_mode"),
    ("cpu_type", "cpu_type"),
    ("readonly_domain_name", "readonly_domain_name"),
    ("replica_count", "replica_count"),
    ("transparent_client_ip_enable", "transparent_client_ip_enable"),
    ("product_type", "product_type"),
    ("sharding_count", "sharding_count"),
];

pub struct DcsInstance;

fn is_prepaid(d: &ResourceData) -> bool {
    d.get_str("charging_mode")
        .eq_ignore_ascii_case(CHARGE_MODE_PREPAID)
}

/// `whitelist_enable` defaults to true when not configured
fn whitelist_enabled(d: &ResourceData) -> bool {
    d.get("whitelist_enable")
        .and_then(Value::as_bool)
        .unwrap_or(true)
}

fn check_network(d: &ResourceData) -> Result<()> {
    let version = d.get_str("engine_version");
    let security_group = d.get_str("security_group_id");
    if WHITELIST_ONLY_VERSIONS.contains(&version.as_str()) {
        if !security_group.is_empty() {
            return Err(CoreError::Validation(
                "security_group_id is not supported for Redis 4.0, 5.0 and 6.0, \
                 configure the whitelists instead"
                    .to_string(),
            ));
        }
    } else if version == "3.0" && security_group.is_empty() {
        return Err(CoreError::Validation(
            "security_group_id is mandatory for this DCS instance".to_string(),
        ));
    }
    Ok(())
}

fn backup_policy_body(d: &ResourceData) -> Value {
    let policy = single_block(d.get("backup_policy"));
    let backup_type = policy["backup_type"].as_str().unwrap_or_default();
    if backup_type.is_empty() || backup_type == "manual" {
        return Value::Null;
    }
    json!({
        "backup_type": backup_type,
        "save_days": policy["save_days"],
        "periodical_backup_plan": {
            "begin_at": policy["begin_at"],
            "period_type": policy["period_type"],
            "backup_at": policy["backup_at"],
        },
    })
}

fn bss_param(d: &ResourceData) -> Value {
    if !is_prepaid(d) {
        return json!({ "charging_mode": "postPaid" });
    }
    let auto_pay = if d.get_str("auto_pay") == "false" { "false" } else { "true" };
    json!({
        "charging_mode": CHARGE_MODE_PREPAID,
        "period_type": d.get_str("period_unit"),
        "period_num": d.get_i64("period"),
        "is_auto_renew": value_ignore_empty(json!(d.get_str("auto_renew"))),
        "is_auto_pay": auto_pay,
    })
}

/// Create body without the password
fn create_body(d: &ResourceData) -> Result<Value> {
    let az_codes = d.get_string_list("availability_zones");
    if az_codes.is_empty() {
        return Err(CoreError::Validation(
            "'availability_zones' is required".to_string(),
        ));
    }
    let no_password_access =
        d.get_str_opt("access_user").is_none() && d.get_str_opt("password").is_none();
    let engine = d.require_str("engine")?;
    let rename_commands = if engine == "Redis" {
        value_ignore_empty(Value::Object(d.get_map("rename_commands")))
    } else {
        Value::Null
    };

    Ok(remove_nil(json!({
        "name": d.require_str("name")?,
        "engine": engine,
        "engine_version": value_ignore_empty(json!(d.get_str("engine_version"))),
        "capacity": d.get_f64("capacity"),
        "instance_num": 1,
        "spec_code": d.require_str("flavor")?,
        "az_codes": az_codes,
        "port": value_ignore_empty(json!(d.get_i64("port"))),
        "vpc_id": d.require_str("vpc_id")?,
        "subnet_id": d.require_str("subnet_id")?,
        "security_group_id": value_ignore_empty(json!(d.get_str("security_group_id"))),
        "enterprise_project_id": value_ignore_empty(json!(d.get_str("enterprise_project_id"))),
        "description": value_ignore_empty(json!(d.get_str("description"))),
        "private_ip": value_ignore_empty(json!(d.get_str("private_ip"))),
        "maintain_begin": value_ignore_empty(json!(d.get_str("maintain_begin"))),
        "maintain_end": value_ignore_empty(json!(d.get_str("maintain_end"))),
        "no_password_access": no_password_access,
        "access_user": value_ignore_empty(json!(d.get_str("access_user"))),
        "template_id": value_ignore_empty(json!(d.get_str("template_id"))),
        "bss_param": bss_param(d),
        "tags": value_ignore_empty(Value::Array(expand_tags(d.get("tags")))),
        "rename_commands": rename_commands,
        "instance_backup_policy": backup_policy_body(d),
    })))
}

fn whitelist_request(instance_id: &str) -> ApiRequest {
    ApiRequest::get("v2/{project_id}/instance/{instance_id}/whitelist")
        .path_param("instance_id", instance_id)
}

fn whitelist_body(d: &ResourceData) -> Value {
    let groups: Vec<Value> = d
        .get_list("whitelists")
        .iter()
        .map(|g| json!({ "group_name": g["group_name"], "ip_list": g["ip_address"] }))
        .collect();
    json!({ "enable_whitelist": whitelist_enabled(d), "whitelist": groups })
}

fn ssl_request(instance_id: &str) -> ApiRequest {
    ApiRequest::get("v2/{project_id}/instances/{instance_id}/ssl")
        .path_param("instance_id", instance_id)
}

/// Poll `request` until `field` moves from `pending` to `target`
#[allow(clippy::too_many_arguments)]
async fn wait_field(
    provider: &Provider,
    dcs: &ServiceClient,
    request: &ApiRequest,
    field: &'static str,
    pending: &str,
    target: &str,
    interval: Duration,
    timeout: Duration,
) -> Result<()> {
    let conf = StateChangeConf::new(&[pending], &[target], timeout)
        .describe(format!("{} of {}", field, request.path))
        .delay(interval)
        .poll_interval(interval);
    provider
        .wait_for_state(conf, move || async move {
            let body = dcs.send(request).await?.body;
            let state = search_string(field, &body).unwrap_or_default();
            Ok(Refreshed::new(body, state))
        })
        .await?;
    Ok(())
}

async fn put_whitelist(
    provider: &Provider,
    dcs: &ServiceClient,
    d: &ResourceData,
    timeout: Duration,
) -> Result<()> {
    let id = d.id();
    let body = whitelist_body(d);
    debug!("Whitelist options of DCS instance {}: {}", id, body);
    let request = ApiRequest::put("v2/{project_id}/instance/{instance_id}/whitelist")
        .path_param("instance_id", id)
        .body(body);
    dcs.send(&request)
        .await
        .with_context(|| format!("error updating whitelist of DCS instance ({})", id))?;

    let enabled = whitelist_enabled(d);
    wait_field(
        provider,
        dcs,
        &whitelist_request(id),
        "enable_whitelist",
        &(!enabled).to_string(),
        &enabled.to_string(),
        Duration::from_secs(10),
        timeout,
    )
    .await
    .with_context(|| format!("error waiting for whitelist of DCS instance ({})", id))
}

async fn put_ssl(
    provider: &Provider,
    dcs: &ServiceClient,
    instance_id: &str,
    enabled: bool,
    timeout: Duration,
) -> Result<()> {
    let request = ApiRequest::put("v2/{project_id}/instances/{instance_id}/ssl")
        .path_param("instance_id", instance_id)
        .body(json!({ "enabled": enabled }));
    dcs.send(&request)
        .await
        .with_context(|| format!("error updating SSL of DCS instance ({})", instance_id))?;

    wait_field(
        provider,
        dcs,
        &ssl_request(instance_id),
        "enabled",
        &(!enabled).to_string(),
        &enabled.to_string(),
        Duration::from_secs(2),
        timeout,
    )
    .await
    .with_context(|| format!("error waiting for SSL of DCS instance ({})", instance_id))
}

fn parameters_body(parameters: &[Value]) -> Value {
    let configs: Vec<Value> = parameters
        .iter()
        .map(|p| {
            json!({
                "param_id": p["id"],
                "param_name": p["name"],
                "param_value": p["value"],
            })
        })
        .collect();
    json!({ "redis_config": configs })
}

async fn update_parameters(
    dcs: &ServiceClient,
    probe: &InstanceProbe<'_>,
    instance_id: &str,
    parameters: &[Value],
    timeout: Duration,
) -> Result<()> {
    let body = parameters_body(parameters);
    debug!("Parameters of DCS instance {}: {}", instance_id, body);
    let request = ApiRequest::put("v2/{project_id}/instances/{instance_id}/configs")
        .path_param("instance_id", instance_id)
        .body(body);
    busy_retry(
        format!("modifying parameters of DCS instance ({})", instance_id),
        dcs,
        request,
        probe,
        INSTANCE_RETRY_DELAY,
        timeout,
    )
    .run()
    .await?;
    Ok(())
}

/// Current values of the configured parameters, plus the names of those
/// that only take effect after a restart
async fn get_parameters(
    dcs: &ServiceClient,
    instance_id: &str,
    parameters: &[Value],
) -> Result<(Vec<Value>, Vec<String>)> {
    let request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/configs")
        .path_param("instance_id", instance_id);
    let body = dcs
        .send(&request)
        .await
        .with_context(|| format!("error fetching parameters of DCS instance ({})", instance_id))?
        .body;
    let configs = search_array("redis_config", &body);

    let mut current = Vec::new();
    let mut needs_restart = Vec::new();
    for parameter in parameters {
        let Some(id) = parameter["id"].as_str() else {
            continue;
        };
        if let Some(config) = find_by_id(&configs, "param_id", id) {
            current.push(json!({
                "id": config["param_id"],
                "name": config["param_name"],
                "value": config["param_value"],
            }));
            if config["need_restart"].as_bool() == Some(true) {
                needs_restart.push(config["param_name"].as_str().unwrap_or(id).to_string());
            }
        }
    }
    Ok((current, needs_restart))
}

async fn restart_instance(
    dcs: &ServiceClient,
    probe: &InstanceProbe<'_>,
    instance_id: &str,
    timeout: Duration,
) -> Result<()> {
    let request = ApiRequest::put("v2/{project_id}/instances/status")
        .body(json!({ "instances": [instance_id], "action": "restart" }));
    busy_retry(
        format!("restarting DCS instance ({})", instance_id),
        dcs,
        request,
        probe,
        INSTANCE_RETRY_DELAY,
        timeout,
    )
    .wait_ready()
    .run()
    .await?;
    info!("DCS instance {} restarted", instance_id);
    Ok(())
}

/// Apply parameters and restart the instance when one of them requires it
async fn apply_parameters(
    dcs: &ServiceClient,
    probe: &InstanceProbe<'_>,
    instance_id: &str,
    parameters: &[Value],
    timeout: Duration,
) -> Result<()> {
    update_parameters(dcs, probe, instance_id, parameters, timeout).await?;
    let (_, needs_restart) = get_parameters(dcs, instance_id, parameters).await?;
    if !needs_restart.is_empty() {
        restart_instance(dcs, probe, instance_id, timeout).await?;
    }
    Ok(())
}

/// Parameters present in the new configuration but not in the prior state
fn changed_parameters(d: &ResourceData) -> Vec<Value> {
    let (old, new) = d.get_change("parameters");
    let old = old.as_array().cloned().unwrap_or_default();
    new.as_array()
        .map(|items| {
            items
                .iter()
                .filter(|p| !old.contains(p))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

async fn get_flavor(dcs: &ServiceClient, spec_code: &str) -> Result<Value> {
    let request = ApiRequest::get("v2/flavors").query("spec_code", spec_code);
    let body = dcs
        .send(&request)
        .await
        .with_context(|| format!("error getting DCS flavors by spec code {}", spec_code))?
        .body;
    search_array("flavors", &body)
        .into_iter()
        .next()
        .ok_or_else(|| {
            CoreError::Validation(format!("no DCS flavor found for spec code {}", spec_code))
        })
}

/// Resize change type derived from the old and new flavor
fn flavor_change_type(old: &Value, new: &Value) -> &'static str {
    if old["cache_mode"] != new["cache_mode"] {
        return "instanceType";
    }
    let replicas = |f: &Value| f["replica_count"].as_i64().unwrap_or(0);
    match replicas(old).cmp(&replicas(new)) {
        std::cmp::Ordering::Less => "createReplication",
        std::cmp::Ordering::Greater => "deleteReplication",
        std::cmp::Ordering::Equal => "",
    }
}

async fn resize_instance(
    provider: &Provider,
    dcs: &ServiceClient,
    probe: &InstanceProbe<'_>,
    d: &ResourceData,
) -> Result<()> {
    let id = d.id();
    let timeout = d.timeouts().update;
    let (old, new) = d.get_change("flavor");
    let old_spec = old.as_str().unwrap_or_default();
    let new_spec = new.as_str().unwrap_or_default();
    if old_spec == new_spec {
        return Err(CoreError::Validation(
            "the flavor must change when resizing a DCS instance".to_string(),
        ));
    }

    let old_flavor = get_flavor(dcs, old_spec).await?;
    let new_flavor = get_flavor(dcs, new_spec).await?;
    let change_type = flavor_change_type(&old_flavor, &new_flavor);

    let mut body = json!({ "spec_code": new_spec, "new_capacity": d.get_f64("capacity") });
    if is_prepaid(d) {
        body["bss_param"] = json!({ "is_auto_pay": "true" });
    }
    if !change_type.is_empty() {
        body["change_type"] = json!(change_type);
    }
    match (change_type, new_flavor["cache_mode"].as_str()) {
        ("createReplication", _) => {
            body["available_zones"] = json!(d.get_string_list("availability_zones"));
        }
        ("deleteReplication", Some("ha")) => {
            body["node_list"] = json!(d.get_string_list("deleted_nodes"));
        }
        ("deleteReplication", Some("cluster")) => {
            body["reserved_ip"] = json!(d.get_string_list("reserved_ips"));
            body["available_zones"] = json!(d.get_string_list("availability_zones"));
        }
        _ => {}
    }
    debug!("Resize options of DCS instance {}: {}", id, body);

    let request = ApiRequest::post("v2/{project_id}/instances/{instance_id}/resize")
        .path_param("instance_id", id)
        .body(body);
    let mut operation = Operation::new(format!("resizing DCS instance ({})", id), dcs, request, timeout)
        .probe(probe)
        .retry_on(
            CoreError::is_retryable_operation,
            RetryMode::Fixed(FIXED_RETRY_INTERVAL),
        );
    if is_prepaid(d) {
        operation = operation.order_id("order_id");
    }
    operation.run().await?;

    wait_instance(
        provider,
        dcs,
        id,
        &["EXTENDING", "RESTARTING"],
        &[STATE_RUNNING],
        timeout,
    )
    .await?;

    let body = dcs
        .send(&instance_request(id))
        .await
        .with_context(|| format!("error retrieving DCS instance ({})", id))?
        .body;
    let actual = search_string("spec_code", &body).unwrap_or_default();
    if actual != new_spec {
        return Err(CoreError::TaskFailed(format!(
            "change flavor failed, the DCS flavor is still {}, expected {}",
            actual, new_spec
        )));
    }
    info!("DCS instance {} resized to {}", id, new_spec);
    Ok(())
}

async fn update_tags(dcs: &ServiceClient, instance_id: &str, old: &Value, new: &Value) -> Result<()> {
    for (action, tags) in [("delete", old), ("create", new)] {
        let tags = expand_tags(Some(tags));
        if tags.is_empty() {
            continue;
        }
        let request = ApiRequest::post("v2/{project_id}/dcs/{instance_id}/tags/action")
            .path_param("instance_id", instance_id)
            .body(json!({ "action": action, "tags": tags }));
        dcs.send(&request).await.with_context(|| {
            format!("error updating tags of DCS instance ({})", instance_id)
        })?;
    }
    Ok(())
}

fn bandwidth_block(info: &Value) -> Value {
    let time = |key: &str| {
        info[key]
            .as_i64()
            .filter(|ms| *ms > 0)
            .and_then(millis_to_rfc3339)
    };
    json!([{
        "bandwidth": info["bandwidth"],
        "begin_time": time("begin_time"),
        "current_time": time("current_time"),
        "end_time": time("end_time"),
        "expand_count": info["expand_count"],
        "expand_effect_time": info["expand_effect_time"],
        "expand_interval_time": info["expand_interval_time"],
        "max_expand_count": info["max_expand_count"],
        "next_expand_time": time("next_expand_time"),
        "task_running": info["task_running"],
    }])
}

async fn read_instance(provider: &Provider, d: &mut ResourceData, parameters_changed: bool) -> Result<()> {
    let dcs = provider.client(SERVICE)?;
    let id = d.id().to_string();

    let body = match dcs.send(&instance_request(&id)).await {
        Ok(response) => response.body,
        Err(e) => return check_deleted(d, e, "error retrieving DCS instance"),
    };

    d.set("region", provider.region());
    for (attr, expression) in READ_FIELDS {
        d.set(attr, path_search(expression, &body));
    }

    let capacity = body["capacity"]
        .as_f64()
        .filter(|c| *c != 0.0)
        .or_else(|| body["capacity_minor"].as_str().and_then(|s| s.parse().ok()))
        .unwrap_or(0.0);
    d.set("capacity", capacity);

    // unset security groups come back as a placeholder
    let security_group = search_string("security_group_id", &body)
        .filter(|s| s != "securityGroupId")
        .unwrap_or_default();
    d.set("security_group_id", security_group);

    let charging_mode = match body["charging_mode"].as_i64() {
        Some(1) => CHARGE_MODE_PREPAID,
        _ => "postPaid",
    };
    d.set("charging_mode", charging_mode);
    d.set("bandwidth_info", bandwidth_block(&body["bandwidth_info"]));

    let policy = &body["instance_backup_policy"]["policy"];
    if policy["backup_type"].as_str().is_some_and(|t| !t.is_empty()) {
        let plan = &policy["periodical_backup_plan"];
        d.set(
            "backup_policy",
            as_block(json!({
                "backup_type": policy["backup_type"],
                "save_days": policy["save_days"],
                "begin_at": plan["begin_at"],
                "period_type": plan["period_type"],
                "backup_at": plan["backup_at"],
            })),
        );
    }

    let tags_request = ApiRequest::get("v2/{project_id}/instances/{instance_id}/tags")
        .path_param("instance_id", &id);
    match dcs.send(&tags_request).await {
        Ok(response) => d.set("tags", flatten_tags(&search_array("tags", &response.body))),
        Err(e) => warn!("fetching tags of DCS instance {} failed: {}", id, e),
    }

    // some regions reject the whitelist API; keep the default so imports stay stable
    match dcs.send(&whitelist_request(&id)).await {
        Ok(response) if !search_array("whitelist", &response.body).is_empty() => {
            let groups: Vec<Value> = search_array("whitelist", &response.body)
                .iter()
                .map(|g| json!({ "group_name": g["group_name"], "ip_address": g["ip_list"] }))
                .collect();
            d.set("whitelists", groups);
            d.set(
                "whitelist_enable",
                response.body["enable_whitelist"].as_bool().unwrap_or(true),
            );
        }
        Ok(_) => d.set("whitelist_enable", true),
        Err(e) => {
            warn!("fetching whitelist of DCS instance {} failed: {}", id, e);
            d.set("whitelist_enable", true);
        }
    }

    let configured = d.get_list("parameters");
    if !configured.is_empty() {
        let (current, needs_restart) = get_parameters(&dcs, &id, &configured).await?;
        if !current.is_empty() {
            d.set("parameters", current);
            if parameters_changed && !needs_restart.is_empty() {
                d.add_warning(format!(
                    "Parameters {:?} changed which needs reboot.",
                    needs_restart
                ));
            }
        }
    }
    Ok(())
}

#[async_trait]
impl Resource for DcsInstance {
    fn type_name(&self) -> &'static str {
        "huaweicloud_dcs_instance"
    }

    fn default_timeouts(&self) -> Timeouts {
        Timeouts::minutes(120, 120, 15)
    }

    async fn create(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        check_network(d)?;
        let dcs = provider.client(SERVICE)?;
        let timeout = d.timeouts().create;

        let mut body = create_body(d)?;
        debug!("Create DCS instance options (password omitted): {}", body);
        if let Some(password) = d.get_str_opt("password") {
            body["password"] = json!(password);
        }

        let request = ApiRequest::post("v2/{project_id}/instances").body(body);
        let mut operation = Operation::new("creating DCS instance", &dcs, request, timeout);
        if is_prepaid(d) {
            operation = operation.order_id("order_id");
        }
        let done = operation
            .run()
            .await
            .with_context(|| "error creating DCS instance".to_string())?;
        let id = search_string("instances[0].instance_id", &done.response.body)
            .or(done.resource_id)
            .ok_or_else(|| {
                CoreError::TaskFailed("DCS instance create returned no instance ID".to_string())
            })?;
        d.set_id(&id);
        info!("Created DCS instance {}", id);

        wait_instance(provider, &dcs, &id, &["CREATING"], &[STATE_RUNNING], timeout).await?;

        if whitelist_enabled(d) && !d.get_list("whitelists").is_empty() {
            put_whitelist(provider, &dcs, d, timeout).await?;
        }

        let probe = InstanceProbe::new(&dcs, &id);
        let parameters = d.get_list("parameters");
        if !parameters.is_empty() {
            apply_parameters(&dcs, &probe, &id, &parameters, timeout).await?;
        }

        if d.get_bool("ssl_enable") {
            put_ssl(provider, &dcs, &id, true, timeout).await?;
        }

        read_instance(provider, d, false).await
    }

    async fn read(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        read_instance(provider, d, false).await
    }

    async fn update(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let id = d.id().to_string();
        let timeout = d.timeouts().update;
        let probe = InstanceProbe::new(&dcs, &id);

        if d.has_changes(&[
            "port",
            "name",
            "description",
            "security_group_id",
            "backup_policy",
            "maintain_begin",
            "maintain_end",
            "rename_commands",
        ]) {
            let body = remove_nil(json!({
                "name": value_ignore_empty(json!(d.get_str("name"))),
                "port": value_ignore_empty(json!(d.get_i64("port"))),
                "description": d.get_str("description"),
                "maintain_begin": value_ignore_empty(json!(d.get_str("maintain_begin"))),
                "maintain_end": value_ignore_empty(json!(d.get_str("maintain_end"))),
                "security_group_id": d.get_str("security_group_id"),
                "instance_backup_policy": backup_policy_body(d),
                "rename_commands": d.get_map("rename_commands"),
            }));
            debug!("Update DCS instance options: {}", body);
            let request = ApiRequest::put("v2/{project_id}/instances/{instance_id}")
                .path_param("instance_id", &id)
                .body(body);
            dcs.send(&request)
                .await
                .with_context(|| format!("error updating DCS instance ({})", id))?;

            if d.has_change("port") {
                let (old, new) = d.get_change("port");
                wait_field(
                    provider,
                    &dcs,
                    &instance_request(&id),
                    "port",
                    &old.to_string(),
                    &new.to_string(),
                    Duration::from_secs(10),
                    timeout,
                )
                .await
                .with_context(|| format!("error waiting for port of DCS instance ({})", id))?;
            }
        }

        if d.has_change("password") {
            let (old, new) = d.get_change("password");
            let request = ApiRequest::put("v2/{project_id}/instances/{instance_id}/password")
                .path_param("instance_id", &id)
                .body(json!({ "old_password": old, "new_password": new }));
            Operation::new(format!("updating password of DCS instance ({})", id), &dcs, request, timeout)
                .retry_on(
                    CoreError::is_retryable_operation,
                    RetryMode::Fixed(FIXED_RETRY_INTERVAL),
                )
                .run()
                .await
                .with_context(|| format!("error updating password of DCS instance ({})", id))?;
        }

        if d.has_changes(&["flavor", "capacity"]) {
            resize_instance(provider, &dcs, &probe, d)
                .await
                .with_context(|| format!("error resizing DCS instance ({})", id))?;
        }

        if d.has_change("tags") {
            let (old, new) = d.get_change("tags");
            update_tags(&dcs, &id, &old, &new).await?;
        }

        if d.has_changes(&["whitelists", "whitelist_enable"]) {
            put_whitelist(provider, &dcs, d, timeout).await?;
        }

        if d.has_change("auto_renew") {
            let bss = provider.client("bss")?;
            bss::set_auto_renew(&bss, &id, d.get_str("auto_renew") == "true").await?;
        }

        let mut parameters_changed = false;
        if d.has_change("parameters") {
            let changed = changed_parameters(d);
            if !changed.is_empty() {
                update_parameters(&dcs, &probe, &id, &changed, timeout).await?;
                parameters_changed = true;
            }
        }

        if d.has_change("ssl_enable") {
            put_ssl(provider, &dcs, &id, d.get_bool("ssl_enable"), timeout).await?;
        }

        read_instance(provider, d, parameters_changed).await
    }

    async fn delete(&self, provider: &Provider, d: &mut ResourceData) -> Result<()> {
        let dcs = provider.client(SERVICE)?;
        let bss = provider.client("bss")?;
        let id = d.id().to_string();
        let timeout = d.timeouts().delete;
        let probe = InstanceProbe::new(&dcs, &id);

        // prepaid instances are released by unsubscribing from the order
        let (client, request, label) = if is_prepaid(d) {
            (
                &bss,
                bss::unsubscribe_request(std::slice::from_ref(&id)),
                format!("unsubscribing DCS instance ({})", id),
            )
        } else {
            (
                &dcs,
                ApiRequest::delete("v2/{project_id}/instances/{instance_id}")
                    .path_param("instance_id", &id),
                format!("deleting DCS instance ({})", id),
            )
        };
        if let Err(e) = busy_retry(label, client, request, &probe, INSTANCE_RETRY_DELAY, timeout)
            .run()
            .await
        {
            return check_deleted(d, e, &format!("error deleting DCS instance ({})", id));
        }

        wait_instance(provider, &dcs, &id, &[STATE_RUNNING], &[STATE_DELETED], timeout)
            .await
            .with_context(|| format!("error waiting for DCS instance ({}) to be deleted", id))?;
        info!("Deleted DCS instance {}", id);
        d.set_id("");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn data(v: Value) -> ResourceData {
        ResourceData::new(v.as_object().cloned().unwrap_or_else(Map::new))
    }

    #[test]
    fn test_security_group_rules() {
        let redis5 = data(json!({"engine_version": "5.0", "security_group_id": "sg-1"}));
        assert!(check_network(&redis5).is_err());
        let redis3 = data(json!({"engine_version": "3.0"}));
        assert!(check_network(&redis3).is_err());
        let redis6 = data(json!({"engine_version": "6.0"}));
        assert!(check_network(&redis6).is_ok());
    }

    #[test]
    fn test_create_body() {
        let d = data(json!({
            "name": "cache",
            "engine": "Redis",
            "engine_version": "5.0",
            "capacity": 0.125,
            "flavor": "redis.ha.xu1.tiny.r2.128",
            "availability_zones": ["cn-north-4a"],
            "vpc_id": "vpc-1",
            "subnet_id": "subnet-1",
            "password": "Secret!123",
            "backup_policy": [{"backup_type": "manual"}],
            "rename_commands": {"keys": "keys001"},
            "tags": {"env": "test"}
        }));
        let body = create_body(&d).unwrap();
        assert_eq!(body["spec_code"], "redis.ha.xu1.tiny.r2.128");
        assert_eq!(body["no_password_access"], false);
        assert_eq!(body["bss_param"]["charging_mode"], "postPaid");
        assert_eq!(body["rename_commands"]["keys"], "keys001");
        assert_eq!(body["tags"][0]["key"], "env");
        assert!(body.get("password").is_none());
        assert!(body.get("instance_backup_policy").is_none());
        assert!(body.get("port").is_none());
    }

    #[test]
    fn test_backup_policy_body() {
        let d = data(json!({
            "backup_policy": [{
                "backup_type": "auto",
                "save_days": 3,
                "begin_at": "00:00-01:00",
                "period_type": "weekly",
                "backup_at": [1, 3, 5]
            }]
        }));
        let body = backup_policy_body(&d);
        assert_eq!(body["periodical_backup_plan"]["backup_at"], json!([1, 3, 5]));
        assert_eq!(body["save_days"], 3);
    }

    #[test]
    fn test_flavor_change_type() {
        let ha2 = json!({"cache_mode": "ha", "replica_count": 2});
        let ha3 = json!({"cache_mode": "ha", "replica_count": 3});
        let cluster = json!({"cache_mode": "cluster", "replica_count": 2});
        assert_eq!(flavor_change_type(&ha2, &ha3), "createReplication");
        assert_eq!(flavor_change_type(&ha3, &ha2), "deleteReplication");
        assert_eq!(flavor_change_type(&ha2, &cluster), "instanceType");
        assert_eq!(flavor_change_type(&ha2, &ha2), "");
    }

    #[test]
    fn test_changed_parameters_only_includes_new_values() {
        let state = crate::schema::ResourceState {
            id: "inst-1".to_string(),
            attributes: json!({"parameters": [
                {"id": "1", "name": "timeout", "value": "100"},
                {"id": "2", "name": "maxmemory-policy", "value": "noeviction"}
            ]})
            .as_object()
            .cloned()
            .unwrap(),
        };
        let config = json!({"parameters": [
            {"id": "1", "name": "timeout", "value": "200"},
            {"id": "2", "name": "maxmemory-policy", "value": "noeviction"}
        ]});
        let d = ResourceData::from_state(state, config.as_object().cloned());
        let changed = changed_parameters(&d);
        assert_eq!(changed, vec![json!({"id": "1", "name": "timeout", "value": "200"})]);
    }
}
