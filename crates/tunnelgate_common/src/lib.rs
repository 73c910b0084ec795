// --- File: crates/tunnelgate_common/src/lib.rs ---

pub mod error;    // Error handling
pub mod http;     // HTTP utilities
pub mod logging;  // Logging utilities
pub mod services; // Service abstractions

// Re-export error types and utilities for easier access
pub use error::{
    config_error,
    external_service_error,
    not_found,
    validation_error,
    Context,
    HttpStatusCode,
    TunnelgateError,
};

// Re-export HTTP utilities for easier access
pub use http::{
    client::create_client,
    handle_json_result,
    IntoHttpResponse,
};

pub use logging::{init, init_with_level, log_result};

pub use services::{BoxFuture, PaymentGateway, VpnProvisioner};
