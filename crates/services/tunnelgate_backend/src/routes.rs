// --- File: crates/services/tunnelgate_backend/src/routes.rs ---

use crate::app_state::AppState;
use crate::handlers::{
    checkout_handler,
    health_handler,
    payment_status_handler,
    payment_webhook_handler,
    vpn_config_handler,
};
use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Creates the API router. Paths are relative to `/api`.
pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/payment/webhook", post(payment_webhook_handler))
        .route("/payment/checkout", post(checkout_handler))
        .route("/payment/{payment_id}", get(payment_status_handler))
        .route("/vpn/{username}/config", get(vpn_config_handler))
        .with_state(state)
}

/// The full application: API routes nested under `/api` plus request tracing.
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", routes(state))
        .layer(TraceLayer::new_for_http())
}
