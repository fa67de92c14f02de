//! Billing (BSS) order helpers used by prepaid resources

use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::client::{ApiRequest, ServiceClient};
use crate::error::{CoreError, Result, ResultExt};
use crate::utils::{search_array, search_string};
use crate::wait::{Refreshed, StateChangeConf};

/// Order status codes reported by BSS
const ORDER_PROCESSING: &str = "3";
const ORDER_COMPLETED: &str = "5";

/// Wait until a customer order reaches the completed status
pub async fn wait_order_complete(
    bss: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> Result<()> {
    let provider = bss.provider();
    let conf = StateChangeConf::new(&[ORDER_PROCESSING], &[ORDER_COMPLETED], timeout)
        .describe(format!("order {}", order_id))
        .delay(Duration::from_secs(5))
        .poll_interval(Duration::from_secs(5));

    provider
        .wait_for_state(conf, move || async move {
            let request = ApiRequest::get("v2/orders/customer-orders/details/{order_id}")
                .path_param("order_id", order_id);
            let body = bss.send(&request).await?.body;
            let status = search_string("order_info.status", &body).unwrap_or_default();
            Ok(Refreshed::new(body, status))
        })
        .await
        .with_context(|| format!("error waiting for order ({}) to complete", order_id))?;

    info!("Order {} completed", order_id);
    Ok(())
}

/// Wait until the main resource of an order is provisioned and return its ID
pub async fn wait_order_resource_complete(
    bss: &ServiceClient,
    order_id: &str,
    timeout: Duration,
) -> Result<String> {
    let provider = bss.provider();
    let conf = StateChangeConf::new(&["PENDING"], &["SUCCESS"], timeout)
        .describe(format!("resources of order {}", order_id))
        .delay(Duration::from_secs(5))
        .poll_interval(Duration::from_secs(5));

    let body = provider
        .wait_for_state(conf, move || async move {
            let request = ApiRequest::post("v2/orders/suscriptions/resources/query").body(json!({
                "order_id": order_id,
                "only_main_resource": 1,
            }));
            let body = bss.send(&request).await?.body;
            let state = if search_array("data", &body).is_empty() {
                "PENDING"
            } else {
                "SUCCESS"
            };
            Ok(Refreshed::new(body, state))
        })
        .await
        .with_context(|| format!("error waiting for resources of order ({})", order_id))?;

    let resource_id = body
        .as_ref()
        .and_then(|b| search_string("data[0].resource_id", b))
        .ok_or_else(|| {
            CoreError::TaskFailed(format!("order {} did not report a resource ID", order_id))
        })?;
    debug!("Order {} provisioned resource {}", order_id, resource_id);
    Ok(resource_id)
}

/// Turn automatic renewal of a prepaid resource on or off
pub async fn set_auto_renew(bss: &ServiceClient, resource_id: &str, enabled: bool) -> Result<()> {
    let path = "v2/orders/subscriptions/resources/autorenew/{resource_id}";
    let request = if enabled {
        ApiRequest::post(path).body(json!({ "resource_id": resource_id, "action_id": "autorenew" }))
    } else {
        ApiRequest::delete(path).query("action_id", "autorenew")
    };
    let request = request.path_param("resource_id", resource_id);

    bss.send(&request)
        .await
        .with_context(|| format!("error updating auto-renew of resource ({})", resource_id))?;
    info!("Auto-renew of {} set to {}", resource_id, enabled);
    Ok(())
}

/// Request unsubscription of prepaid resources
pub fn unsubscribe_request(resource_ids: &[String]) -> ApiRequest {
    ApiRequest::post("v2/orders/subscriptions/resources/unsubscribe").body(json!({
        "resource_ids": resource_ids,
        "unsubscribe_type": 1,
    }))
}
