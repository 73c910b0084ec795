// --- File: crates/tunnelgate_config/src/models.rs ---

use serde::{Deserialize, Serialize};

// --- General Server Config ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

// --- Panel Config ---
// Holds the panel endpoint and admin credentials. The password is normally
// "secret_from_env" in the config file and injected from TUNNELGATE_SECRET_PANEL_PASSWORD.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PanelConfig {
    pub url: String,      // Mandatory, e.g. https://panel.example.com
    pub username: String, // Mandatory
    pub password: String, // Mandatory
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// The panel issues 24h tokens; refresh one hour early.
    #[serde(default = "default_token_lifetime_secs")]
    pub token_lifetime_secs: u64,
    /// Host advertised in connection descriptors.
    pub vless_host: Option<String>,
    #[serde(default = "default_vless_port")]
    pub vless_port: u16,
    /// Data quota in bytes for users provisioned without an explicit plan limit. 0 means unlimited.
    #[serde(default)]
    pub default_data_limit: u64,
    #[serde(default = "default_inbound_tag")]
    pub inbound_tag: String,
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1000
}

fn default_token_lifetime_secs() -> u64 {
    23 * 60 * 60
}

fn default_vless_port() -> u16 {
    443
}

fn default_inbound_tag() -> String {
    "VLESS TCP REALITY".to_string()
}

// --- Payment Config ---
// Holds the gateway endpoint and credentials. Secrets use the "secret_from_env" marker.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PaymentConfig {
    pub api_url: String,        // Mandatory
    pub api_key: String,        // Mandatory
    pub api_secret: String,     // Mandatory
    pub webhook_secret: String, // Mandatory
    pub default_currency: Option<String>,
    pub return_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Subscription plans that can be bought through the gateway.
    #[serde(default)]
    pub plans: Vec<PlanConfig>,
}

#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PlanConfig {
    /// Identifier sent to the gateway in metadata and echoed back in settlements.
    pub id: String,
    /// How many days a successful payment adds to the subscription.
    pub duration_days: i64,
    /// Price in the smallest currency unit (e.g., cents).
    pub unit_amount: i64,
    pub currency: Option<String>,
    /// Data quota in bytes. None falls back to the panel default.
    pub data_limit: Option<u64>,
}

impl PaymentConfig {
    /// Finds a configured plan by id.
    pub fn plan(&self, plan_id: &str) -> Option<&PlanConfig> {
        self.plans.iter().find(|p| p.id == plan_id)
    }
}

// --- Unified App Configuration ---
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    // Server config is mandatory
    pub server: ServerConfig,

    // --- Runtime Flags (optional in config file, default to false) ---
    #[serde(default)]
    pub use_panel: bool,
    #[serde(default)]
    pub use_payment: bool,

    // --- Optional Feature Configurations ---
    #[serde(default)]
    pub panel: Option<PanelConfig>,
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}
