// --- File: crates/tunnelgate_panel/src/global.rs ---
//! Process-wide panel client handle.
//!
//! [`init`] is called once at startup and returns the shared client. Callers
//! racing on the first `init` queue behind a single lock, so the panel sees
//! exactly one handshake and everyone receives the same `Arc`. [`reset`]
//! drops the handle so the next `init` starts from scratch.

use once_cell::sync::Lazy;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;
use tunnelgate_config::PanelConfig;

use crate::client::PanelClient;
use crate::error::PanelError;

static PANEL_CLIENT: Lazy<Mutex<Option<Arc<PanelClient>>>> = Lazy::new(|| Mutex::new(None));

/// Returns the shared client, constructing and authenticating it on first use.
///
/// A failed handshake leaves no handle behind; the next call tries again.
pub async fn init(config: &PanelConfig) -> Result<Arc<PanelClient>, PanelError> {
    let mut slot = PANEL_CLIENT.lock().await;
    if let Some(client) = slot.as_ref() {
        return Ok(Arc::clone(client));
    }

    let client = Arc::new(PanelClient::new(config)?);
    client.authenticate().await?;
    info!("[Panel] Client initialized for {}", client.base_url());
    *slot = Some(Arc::clone(&client));
    Ok(client)
}

/// The shared client, if [`init`] has completed.
pub async fn get() -> Option<Arc<PanelClient>> {
    PANEL_CLIENT.lock().await.clone()
}

/// Drops the shared client. Outstanding `Arc`s keep working until released.
pub async fn reset() {
    if PANEL_CLIENT.lock().await.take().is_some() {
        info!("[Panel] Client handle reset");
    }
}
