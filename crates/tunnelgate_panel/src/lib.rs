// --- File: crates/tunnelgate_panel/src/lib.rs ---
//! Client for the remote VPN panel.
//!
//! Holds one authenticated session per client, retries transient failures
//! with exponential backoff and exposes user provisioning plus connection
//! descriptors.

pub mod client;
pub mod descriptor;
pub mod error;
pub mod global;
pub mod retry;
pub mod service;
mod session;
pub mod users;

pub use client::{PanelClient, ProvisioningDefaults};
pub use descriptor::{generate_qr_code, vless_uri};
pub use error::PanelError;
pub use retry::RetryPolicy;
pub use users::{is_valid_username, UserUpdate};
