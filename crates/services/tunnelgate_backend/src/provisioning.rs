// --- File: crates/services/tunnelgate_backend/src/provisioning.rs ---
//! Turns verified settlements into subscription time on the panel.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashSet;
use tokio::sync::Mutex;
use tracing::{info, warn};
use tunnelgate_common::services::{RemoteAccount, Settlement};
use tunnelgate_common::{config_error, validation_error, TunnelgateError, VpnProvisioner};
use tunnelgate_config::AppConfig;
use tunnelgate_panel::is_valid_username;

/// Panel username for a paying user reference.
///
/// Fails when the derived name is not one the panel accepts, so checkout can
/// refuse the reference before anyone is charged.
pub fn username_for(user_ref: &str) -> Result<String, TunnelgateError> {
    let username = format!("user_{}", user_ref);
    if !is_valid_username(&username) {
        return Err(validation_error(format!(
            "user_ref '{}' does not give a valid panel username",
            user_ref
        )));
    }
    Ok(username)
}

/// Payment ids whose settlement has been applied by this process.
///
/// Gateways deliver at least once. A payment id is claimed before the panel
/// is touched and released again if provisioning fails, so a redelivery of a
/// failed settlement is retried while a redelivery of an applied one is not.
/// The set lives in memory only: after a restart a redelivered settlement
/// extends the subscription a second time.
#[derive(Debug, Default)]
pub struct AppliedPayments {
    ids: Mutex<HashSet<String>>,
}

impl AppliedPayments {
    /// Marks `payment_id` as in progress. `false` if it was already claimed.
    async fn claim(&self, payment_id: &str) -> bool {
        self.ids.lock().await.insert(payment_id.to_string())
    }

    async fn release(&self, payment_id: &str) {
        self.ids.lock().await.remove(payment_id);
    }

    pub async fn contains(&self, payment_id: &str) -> bool {
        self.ids.lock().await.contains(payment_id)
    }
}

/// What a settlement did to the panel.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ProvisioningOutcome {
    /// The settlement does not grant anything (not succeeded).
    Ignored { payment_id: String, reason: String },
    /// An existing account got more time.
    Extended { username: String, expire: DateTime<Utc> },
    /// The account did not exist and was provisioned.
    Created { username: String, expire: DateTime<Utc> },
}

/// New expiry after adding `days`: counted from the current expiry while it
/// lies in the future, otherwise from `now`.
pub fn next_expiry(current: Option<DateTime<Utc>>, days: i64, now: DateTime<Utc>) -> DateTime<Utc> {
    let start = current.filter(|expire| *expire > now).unwrap_or(now);
    start + Duration::days(days)
}

/// Applies a verified settlement.
///
/// Existing accounts are extended. Missing accounts are provisioned with the
/// plan's quota. Every other panel failure is returned so the gateway
/// redelivers the notification. A payment already applied by this process is
/// ignored; see [`AppliedPayments`] for the limits of that check.
pub async fn apply_settlement(
    provisioner: &dyn VpnProvisioner,
    applied: &AppliedPayments,
    config: &AppConfig,
    settlement: &Settlement,
    now: DateTime<Utc>,
) -> Result<ProvisioningOutcome, TunnelgateError> {
    if !settlement.is_succeeded() {
        info!(
            "[Webhook] Payment {} is {:?}, nothing to provision",
            settlement.payment_id, settlement.status
        );
        return Ok(ProvisioningOutcome::Ignored {
            payment_id: settlement.payment_id.clone(),
            reason: format!("payment status is {:?}", settlement.status),
        });
    }

    let user_ref = settlement
        .user_ref()
        .ok_or_else(|| validation_error(format!("payment {} carries no user reference", settlement.payment_id)))?;
    let plan_id = settlement
        .plan()
        .ok_or_else(|| validation_error(format!("payment {} carries no plan", settlement.payment_id)))?;
    let plan = config
        .payment
        .as_ref()
        .and_then(|payment| payment.plan(plan_id))
        .ok_or_else(|| validation_error(format!("unknown plan '{}'", plan_id)))?;
    let default_data_limit = config
        .panel
        .as_ref()
        .map(|panel| panel.default_data_limit)
        .ok_or_else(|| config_error("panel settings are required to provision accounts"))?;

    let username = username_for(user_ref)?;

    if !applied.claim(&settlement.payment_id).await {
        info!("[Webhook] Payment {} was already applied", settlement.payment_id);
        return Ok(ProvisioningOutcome::Ignored {
            payment_id: settlement.payment_id.clone(),
            reason: "payment already applied".to_string(),
        });
    }

    let data_limit = plan.data_limit.unwrap_or(default_data_limit);
    let result = provision(provisioner, &username, data_limit, plan.duration_days, now).await;
    match &result {
        Ok(_) => info!("[Webhook] Applied payment {}", settlement.payment_id),
        Err(_) => applied.release(&settlement.payment_id).await,
    }
    result
}

async fn provision(
    provisioner: &dyn VpnProvisioner,
    username: &str,
    data_limit: u64,
    days: i64,
    now: DateTime<Utc>,
) -> Result<ProvisioningOutcome, TunnelgateError> {
    match provisioner.get_user(username).await {
        Ok(account) => extend(provisioner, username, &account, days, now).await,
        Err(TunnelgateError::NotFoundError(_)) => {
            let expire = next_expiry(None, days, now);
            provisioner
                .get_or_create_user(username, data_limit, Some(expire))
                .await?;
            info!("[Webhook] Provisioned '{}' until {}", username, expire);
            Ok(ProvisioningOutcome::Created {
                username: username.to_string(),
                expire,
            })
        }
        Err(e) => {
            warn!("[Webhook] Could not look up '{}': {}", username, e);
            Err(e)
        }
    }
}

async fn extend(
    provisioner: &dyn VpnProvisioner,
    username: &str,
    account: &RemoteAccount,
    days: i64,
    now: DateTime<Utc>,
) -> Result<ProvisioningOutcome, TunnelgateError> {
    let expire = next_expiry(account.expire, days, now);
    provisioner.extend_subscription(username, expire).await?;
    info!("[Webhook] Extended '{}' until {}", username, expire);
    Ok(ProvisioningOutcome::Extended {
        username: username.to_string(),
        expire,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_next_expiry_stacks_on_active_subscription() {
        let now = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let current = Utc.with_ymd_and_hms(2026, 1, 10, 0, 0, 0).unwrap();
        assert_eq!(
            next_expiry(Some(current), 30, now),
            Utc.with_ymd_and_hms(2026, 2, 9, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_next_expiry_restarts_lapsed_subscription() {
        let now = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let lapsed = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(next_expiry(Some(lapsed), 7, now), now + Duration::days(7));
        assert_eq!(next_expiry(None, 7, now), now + Duration::days(7));
    }

    #[test]
    fn test_username_for_user_ref() {
        assert_eq!(username_for("42").unwrap(), "user_42");
        assert_eq!(username_for(&"7".repeat(27)).unwrap().len(), 32);
    }

    #[test]
    fn test_username_for_rejects_refs_the_panel_would_refuse() {
        let too_long = "7".repeat(28);
        for user_ref in ["john doe", "../admin", "a/b", too_long.as_str()] {
            assert!(
                matches!(username_for(user_ref), Err(TunnelgateError::ValidationError(_))),
                "{user_ref:?} should be rejected"
            );
        }
    }

    #[tokio::test]
    async fn test_applied_payments_claim_once_until_released() {
        let applied = AppliedPayments::default();
        assert!(applied.claim("pay_1").await);
        assert!(!applied.claim("pay_1").await);
        assert!(applied.contains("pay_1").await);
        applied.release("pay_1").await;
        assert!(!applied.contains("pay_1").await);
        assert!(applied.claim("pay_1").await);
    }
}
