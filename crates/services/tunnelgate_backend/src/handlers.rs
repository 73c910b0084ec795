// --- File: crates/services/tunnelgate_backend/src/handlers.rs ---
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info, warn};
use tunnelgate_common::services::{ConnectionDescriptor, PaymentCreated, PaymentInfo, PaymentIntent};
use tunnelgate_common::{config_error, handle_json_result, validation_error, PaymentGateway, VpnProvisioner};
use tunnelgate_payment::SIGNATURE_HEADER;

use crate::app_state::AppState;
use crate::provisioning::{apply_settlement, username_for, ProvisioningOutcome};

/// Request body for starting a subscription purchase.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Deserialize, Debug)]
pub struct CheckoutRequest {
    /// Reference to the paying user; the panel account is derived from it.
    #[cfg_attr(feature = "openapi", schema(example = "42"))]
    pub user_ref: String,
    #[cfg_attr(feature = "openapi", schema(example = "month"))]
    pub plan: String,
    /// Overrides the configured return URL.
    pub return_url: Option<String>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Serialize, Debug)]
pub struct HealthResponse {
    pub status: &'static str,
    pub panel: bool,
    pub payment: bool,
}

fn disabled(service: &str) -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": {"message": format!("{} service disabled.", service), "code": 503}})),
    )
        .into_response()
}

fn provisioner(state: &AppState) -> Result<&Arc<dyn VpnProvisioner>, Response> {
    state.provisioner.as_ref().ok_or_else(|| disabled("Panel"))
}

fn payments(state: &AppState) -> Result<&Arc<dyn PaymentGateway>, Response> {
    state.payments.as_ref().ok_or_else(|| disabled("Payment"))
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service is up", body = HealthResponse)),
    tag = "Tunnelgate"
))]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        panel: state.provisioner.is_some(),
        payment: state.payments.is_some(),
    })
}

// Server-to-server settlement notifications from the payment gateway.
#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/payment/webhook",
    responses(
        (status = 200, description = "Settlement verified and applied", body = ProvisioningOutcome),
        (status = 401, description = "Missing or invalid signature"),
        (status = 400, description = "Verified body that cannot be applied"),
        (status = 502, description = "Panel failure; the gateway should redeliver")
    ),
    tag = "Payment Webhooks"
))]
pub async fn payment_webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes, // Raw body; the signature covers these exact bytes
) -> Result<Json<ProvisioningOutcome>, Response> {
    let payments = payments(&state)?;
    let provisioner = provisioner(&state)?;

    let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
    let settlement = payments.parse_webhook(&body, signature).map_err(|e| {
        warn!("[Webhook] Rejected notification: {}", e);
        e.into_response()
    })?;
    info!(
        "[Webhook] Received {} for payment {}",
        settlement.event, settlement.payment_id
    );

    let result = apply_settlement(
        provisioner.as_ref(),
        &state.applied,
        &state.config,
        &settlement,
        Utc::now(),
    )
    .await;
    if let Err(e) = &result {
        error!(
            "[Webhook] Provisioning for payment {} failed: {}",
            settlement.payment_id, e
        );
    }
    handle_json_result(result)
}

#[cfg_attr(feature = "openapi", utoipa::path(
    post,
    path = "/payment/checkout",
    request_body = CheckoutRequest,
    responses(
        (status = 200, description = "Payment created", body = PaymentCreated),
        (status = 400, description = "Unknown plan, unusable user_ref or missing return URL"),
        (status = 502, description = "Gateway error")
    ),
    tag = "Payment"
))]
pub async fn checkout_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<PaymentCreated>, Response> {
    let payments = payments(&state)?;
    // Refuse before charging: the settlement could never be provisioned.
    username_for(&request.user_ref).map_err(IntoResponse::into_response)?;
    let payment_config = state
        .config
        .payment
        .as_ref()
        .ok_or_else(|| config_error("payment settings missing").into_response())?;
    let plan = payment_config
        .plan(&request.plan)
        .ok_or_else(|| validation_error(format!("unknown plan '{}'", request.plan)).into_response())?;
    let return_url = request
        .return_url
        .or_else(|| payment_config.return_url.clone())
        .ok_or_else(|| validation_error("return_url is required").into_response())?;
    let currency = plan
        .currency
        .clone()
        .or_else(|| payment_config.default_currency.clone())
        .ok_or_else(|| config_error(format!("plan '{}' has no currency", plan.id)).into_response())?;

    let intent = PaymentIntent {
        amount: plan.unit_amount,
        currency,
        user_ref: request.user_ref,
        plan: plan.id.clone(),
        return_url,
    };
    handle_json_result(payments.create_payment(intent).await)
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/payment/{payment_id}",
    params(("payment_id" = String, Path, description = "Gateway payment id")),
    responses(
        (status = 200, description = "Current payment state", body = PaymentInfo),
        (status = 404, description = "Unknown payment")
    ),
    tag = "Payment"
))]
pub async fn payment_status_handler(
    State(state): State<Arc<AppState>>,
    Path(payment_id): Path<String>,
) -> Result<Json<PaymentInfo>, Response> {
    let payments = payments(&state)?;
    handle_json_result(payments.get_payment_status(&payment_id).await)
}

#[cfg_attr(feature = "openapi", utoipa::path(
    get,
    path = "/vpn/{username}/config",
    params(("username" = String, Path, description = "Panel username")),
    responses(
        (status = 200, description = "Connection URI and QR image", body = ConnectionDescriptor),
        (status = 404, description = "Unknown user")
    ),
    tag = "VPN"
))]
pub async fn vpn_config_handler(
    State(state): State<Arc<AppState>>,
    Path(username): Path<String>,
) -> Result<Json<ConnectionDescriptor>, Response> {
    let provisioner = provisioner(&state)?;
    let panel_config = state
        .config
        .panel
        .as_ref()
        .ok_or_else(|| config_error("panel settings missing").into_response())?;
    let host = panel_config
        .vless_host
        .as_deref()
        .ok_or_else(|| config_error("panel.vless_host is not set").into_response())?;

    handle_json_result(
        provisioner
            .connection_descriptor(&username, host, panel_config.vless_port)
            .await,
    )
}
