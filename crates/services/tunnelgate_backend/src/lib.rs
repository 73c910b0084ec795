// --- File: crates/services/tunnelgate_backend/src/lib.rs ---

pub mod app_state;
pub mod doc;
pub mod handlers;
pub mod provisioning;
pub mod routes;

pub use app_state::AppState;
pub use routes::{app, routes};
