//! Back-office endpoints against the order-management backend: operator
//! notifications, demo catalog updates, and booking cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use souk_agent::network::NetworkClient;
use souk_channel::messaging::MessagingClient;
use souk_core::config::BackendConfig;

const WEATHER_ALERT_MESSAGE: &str =
    "Weather alert: a blizzard warning has been issued near your booked stay. Reply here if you \
     want to reschedule or cancel.";
const CANCEL_BOOKING_MESSAGE: &str =
    "Your booking had to be cancelled by the property due to the weather situation. You will not \
     be charged. Reply here to rebook.";
const NEW_CATALOG_AVAILABLE_MESSAGE: &str =
    "Good news: new stays are available in your area, including pet-friendly options. Say 'find \
     hotels' to browse them.";

/// Demo catalog item the update endpoint touches.
const DEMO_ITEM_ID: &str = "1";
const DEMO_ITEM_NAME: &str = "Mountain View Room";

#[derive(Clone)]
pub struct OpsState {
    network: Arc<dyn NetworkClient>,
    messaging: Arc<dyn MessagingClient>,
    backend_base_url: Option<String>,
    backend_token: Option<String>,
    test_recipient: Option<String>,
}

impl OpsState {
    pub fn new(
        network: Arc<dyn NetworkClient>,
        messaging: Arc<dyn MessagingClient>,
        backend: &BackendConfig,
        test_recipient: Option<String>,
    ) -> Self {
        Self {
            network,
            messaging,
            backend_base_url: backend.base_url.clone(),
            backend_token: backend
                .api_token
                .as_ref()
                .map(|token| token.expose_secret().to_string()),
            test_recipient,
        }
    }

    fn backend_headers(&self) -> BTreeMap<String, String> {
        let mut headers = BTreeMap::new();
        if let Some(token) = &self.backend_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }

    fn backend_url(&self, path: &str) -> Option<String> {
        self.backend_base_url
            .as_ref()
            .map(|base| format!("{}/{}", base.trim_end_matches('/'), path))
    }
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NotifyRequest {
    #[serde(default)]
    pub user_no: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CancelBookingRequest {
    #[serde(default)]
    pub order_id: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct UpdateCatalogRequest {
    #[serde(default)]
    pub user_no: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct OpsResponse {
    pub status: bool,
    pub message: String,
}

impl OpsResponse {
    fn ok(message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::OK, Json(Self { status: true, message: message.into() }))
    }

    fn rejected(status: StatusCode, message: impl Into<String>) -> (StatusCode, Json<Self>) {
        (status, Json(Self { status: false, message: message.into() }))
    }
}

pub fn router(state: OpsState) -> Router {
    Router::new()
        .route("/ops/notify", post(notify))
        .route("/ops/cancel-booking", post(cancel_booking))
        .route("/ops/update-catalog", post(update_catalog))
        .with_state(state)
}

/// Sends an operator-supplied (or default weather-alert) message.
pub async fn notify(
    State(state): State<OpsState>,
    Json(request): Json<NotifyRequest>,
) -> (StatusCode, Json<OpsResponse>) {
    let Some(recipient) = request.user_no.or_else(|| state.test_recipient.clone()) else {
        return OpsResponse::rejected(
            StatusCode::BAD_REQUEST,
            "no recipient: pass user_no or configure channel.test_recipient",
        );
    };

    let body = request.message.unwrap_or_else(|| WEATHER_ALERT_MESSAGE.to_string());
    match state.messaging.send(&recipient, &body).await {
        Ok(_) => OpsResponse::ok("Notification delivered"),
        Err(send_error) => {
            error!(event_name = "server.ops.notify_failed", error = %send_error, "notification send failed");
            OpsResponse::rejected(StatusCode::BAD_REQUEST, "Notification failed")
        }
    }
}

/// Validates an order, marks its fulfillment cancelled in the backend, and
/// notifies the guest.
pub async fn cancel_booking(
    State(state): State<OpsState>,
    Json(request): Json<CancelBookingRequest>,
) -> (StatusCode, Json<OpsResponse>) {
    let Some(order_id) = request.order_id.filter(|id| !id.trim().is_empty()) else {
        return OpsResponse::rejected(StatusCode::BAD_REQUEST, "order_id is required");
    };
    let Some(orders_url) = state.backend_url(&format!("orders/{order_id}")) else {
        return OpsResponse::rejected(
            StatusCode::SERVICE_UNAVAILABLE,
            "order-management backend is not configured",
        );
    };

    let headers = state.backend_headers();
    if let Err(lookup_error) =
        state.network.call(&orders_url, "GET", &Value::Null, &headers).await
    {
        error!(event_name = "server.ops.order_lookup_failed", error = %lookup_error, "order lookup failed");
        return OpsResponse::rejected(StatusCode::BAD_REQUEST, "Invalid order id");
    }

    let fulfillments_url = state
        .backend_url(&format!("order-fulfillments?order_id={order_id}"))
        .expect("backend configured");
    let fulfillments = match state
        .network
        .call(&fulfillments_url, "GET", &Value::Null, &headers)
        .await
    {
        Ok(response) => response,
        Err(fetch_error) => {
            error!(event_name = "server.ops.fulfillment_lookup_failed", error = %fetch_error, "fulfillment lookup failed");
            return OpsResponse::rejected(StatusCode::BAD_REQUEST, "Cancel booking failed");
        }
    };

    let Some(fulfillment_id) = fulfillments["data"][0]["id"].as_i64() else {
        return OpsResponse::rejected(StatusCode::OK, "Cancel booking failed");
    };

    let update_url = state
        .backend_url(&format!("order-fulfillments/{fulfillment_id}"))
        .expect("backend configured");
    let update_body = json!({
        "data": { "state_code": "CANCELLED", "state_value": "CANCELLED BY HOTEL" }
    });
    if let Err(update_error) =
        state.network.call(&update_url, "PUT", &update_body, &headers).await
    {
        error!(event_name = "server.ops.fulfillment_update_failed", error = %update_error, "fulfillment update failed");
        return OpsResponse::rejected(StatusCode::BAD_REQUEST, "Cancel booking failed");
    }

    let addresses_url = state
        .backend_url(&format!("order-addresses?order_id={order_id}"))
        .expect("backend configured");
    let guest_phone = state
        .network
        .call(&addresses_url, "GET", &Value::Null, &headers)
        .await
        .ok()
        .and_then(|response| {
            response["data"][0]["attributes"]["phone"].as_str().map(str::to_string)
        });

    let Some(recipient) = guest_phone.or_else(|| state.test_recipient.clone()) else {
        return OpsResponse::ok("Booking cancelled; no guest contact on file");
    };

    match state.messaging.send(&recipient, CANCEL_BOOKING_MESSAGE).await {
        Ok(_) => {
            info!(event_name = "server.ops.booking_cancelled", order_id = %order_id, "booking cancelled and guest notified");
            OpsResponse::ok("Booking cancelled and guest notified")
        }
        Err(send_error) => {
            error!(event_name = "server.ops.cancel_notify_failed", error = %send_error, "cancellation notice send failed");
            OpsResponse::ok("Booking cancelled; guest notification failed")
        }
    }
}

/// Pushes the demo catalog update and notifies the configured recipient.
pub async fn update_catalog(
    State(state): State<OpsState>,
    Json(request): Json<UpdateCatalogRequest>,
) -> (StatusCode, Json<OpsResponse>) {
    let Some(item_url) = state.backend_url(&format!("items/{DEMO_ITEM_ID}")) else {
        return OpsResponse::rejected(
            StatusCode::SERVICE_UNAVAILABLE,
            "order-management backend is not configured",
        );
    };

    let update_body = json!({
        "data": { "name": DEMO_ITEM_NAME, "available": true }
    });
    if let Err(update_error) = state
        .network
        .call(&item_url, "PUT", &update_body, &state.backend_headers())
        .await
    {
        error!(event_name = "server.ops.catalog_update_failed", error = %update_error, "catalog update failed");
        return OpsResponse::rejected(StatusCode::BAD_REQUEST, "Catalog update failed");
    }

    let Some(recipient) = request.user_no.or_else(|| state.test_recipient.clone()) else {
        return OpsResponse::ok("Catalog updated; no recipient to notify");
    };

    match state.messaging.send(&recipient, NEW_CATALOG_AVAILABLE_MESSAGE).await {
        Ok(_) => OpsResponse::ok("Catalog updated"),
        Err(send_error) => {
            error!(event_name = "server.ops.catalog_notify_failed", error = %send_error, "catalog notification send failed");
            OpsResponse::rejected(StatusCode::BAD_REQUEST, "Notification failed")
        }
    }
}
