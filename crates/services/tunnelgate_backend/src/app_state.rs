// --- File: crates/services/tunnelgate_backend/src/app_state.rs ---
use std::sync::Arc;
use tracing::{info, warn};
use tunnelgate_common::{config_error, logging, PaymentGateway, TunnelgateError, VpnProvisioner};
use tunnelgate_config::AppConfig;
use tunnelgate_panel::global as panel;
use tunnelgate_payment::PaymentClient;

use crate::provisioning::AppliedPayments;

/// Application state shared across all routes.
///
/// Each integration is present only when its `use_*` flag is set, and is held
/// behind its service trait so handlers can be driven with fakes in tests.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub provisioner: Option<Arc<dyn VpnProvisioner>>,
    pub payments: Option<Arc<dyn PaymentGateway>>,
    /// Settlements already applied by this process.
    pub applied: Arc<AppliedPayments>,
}

impl AppState {
    /// Initializes the enabled integrations.
    ///
    /// The panel client is created through the process-wide handle and
    /// authenticates once here. The payment client is built directly and
    /// injected. A missing setting for an enabled integration is fatal.
    pub async fn new(config: Arc<AppConfig>) -> Result<Self, TunnelgateError> {
        let provisioner: Option<Arc<dyn VpnProvisioner>> = if config.use_panel {
            let panel_config = config
                .panel
                .as_ref()
                .ok_or_else(|| config_error("use_panel is set but [panel] is missing"))?;
            let client = panel::init(panel_config).await?;
            info!("Panel integration enabled ({})", client.base_url());
            Some(client as Arc<dyn VpnProvisioner>)
        } else {
            warn!("Panel integration disabled");
            None
        };

        let payments: Option<Arc<dyn PaymentGateway>> = if config.use_payment {
            let payment_config = config
                .payment
                .as_ref()
                .ok_or_else(|| config_error("use_payment is set but [payment] is missing"))?;
            let client = logging::log_result(
                PaymentClient::new(payment_config),
                "Payment integration enabled",
                "Payment client construction failed",
            )?;
            Some(Arc::new(client) as Arc<dyn PaymentGateway>)
        } else {
            warn!("Payment integration disabled");
            None
        };

        Ok(Self::with_services(config, provisioner, payments))
    }

    /// Builds state from already constructed services.
    pub fn with_services(
        config: Arc<AppConfig>,
        provisioner: Option<Arc<dyn VpnProvisioner>>,
        payments: Option<Arc<dyn PaymentGateway>>,
    ) -> Self {
        Self {
            config,
            provisioner,
            payments,
            applied: Arc::new(AppliedPayments::default()),
        }
    }
}
