// --- File: crates/services/tunnelgate_backend/src/doc.rs ---
#![cfg(feature = "openapi")]
use utoipa::OpenApi;

use crate::handlers::{CheckoutRequest, HealthResponse};
use crate::provisioning::ProvisioningOutcome;
use tunnelgate_common::services::{
    AccountStatus, ConnectionDescriptor, PaymentCreated, PaymentInfo, PaymentState, RemoteAccount,
};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tunnelgate API",
        version = "0.1.0",
        description = "VPN subscription provisioning and payment webhooks",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    paths(
        crate::handlers::health_handler,
        crate::handlers::payment_webhook_handler,
        crate::handlers::checkout_handler,
        crate::handlers::payment_status_handler,
        crate::handlers::vpn_config_handler,
    ),
    components(schemas(
        CheckoutRequest,
        HealthResponse,
        ProvisioningOutcome,
        ConnectionDescriptor,
        PaymentCreated,
        PaymentInfo,
        PaymentState,
        RemoteAccount,
        AccountStatus,
    )),
    servers((url = "/api", description = "Main API Prefix")),
)]
pub struct TunnelgateApiDoc;
