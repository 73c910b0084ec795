// --- File: crates/tunnelgate_common/src/services.rs ---
//! Service abstractions for the external integrations.
//!
//! The backend talks to the VPN panel and the payment gateway only through
//! these traits, so that handlers and the provisioning workflow can be tested
//! with in-process fakes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use crate::error::TunnelgateError;

/// Type alias for a boxed future that returns a Result
pub type BoxFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Provisioning operations against the remote VPN panel.
pub trait VpnProvisioner: Send + Sync {
    /// Fetch an account; a missing user is `TunnelgateError::NotFoundError`.
    fn get_user(&self, username: &str) -> BoxFuture<'_, RemoteAccount, TunnelgateError>;

    /// Whether the account can be fetched. Every failure reads as `false`.
    fn user_exists(&self, username: &str) -> Pin<Box<dyn Future<Output = bool> + Send + '_>>;

    /// Fetch the account, creating it if the fetch fails for any reason.
    fn get_or_create_user(
        &self,
        username: &str,
        data_limit: u64,
        expire: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError>;

    /// Set a new expiry and force the account active.
    fn extend_subscription(
        &self,
        username: &str,
        new_expire: DateTime<Utc>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError>;

    /// Build the connection URI and its QR image for an account.
    fn connection_descriptor(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> BoxFuture<'_, ConnectionDescriptor, TunnelgateError>;
}

/// Payment gateway operations.
pub trait PaymentGateway: Send + Sync {
    /// Create a payment. Never retried.
    fn create_payment(&self, intent: PaymentIntent) -> BoxFuture<'_, PaymentCreated, TunnelgateError>;

    /// Fetch the current state of a payment. Never retried.
    fn get_payment_status(&self, payment_id: &str) -> BoxFuture<'_, PaymentInfo, TunnelgateError>;

    /// Verify the signature of a raw webhook body and only then decode it.
    fn parse_webhook(&self, raw_body: &[u8], signature: Option<&str>) -> Result<Settlement, TunnelgateError>;
}

// --- Panel data structures ---

/// Account status as reported by the panel.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccountStatus {
    Active,
    Disabled,
    Limited,
    Expired,
    OnHold,
}

/// A VPN account held by the remote panel. Only ever an in-flight copy.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAccount {
    pub username: String,
    /// The vless proxy identity, if the panel assigned one.
    pub proxy_id: Option<String>,
    pub status: AccountStatus,
    /// Quota in bytes; None means unlimited.
    pub data_limit: Option<u64>,
    pub used_traffic: u64,
    pub expire: Option<DateTime<Utc>>,
}

impl RemoteAccount {
    /// Bytes left before the quota is hit, None when unlimited.
    pub fn remaining_traffic(&self) -> Option<u64> {
        self.data_limit
            .map(|limit| limit.saturating_sub(self.used_traffic))
    }

    /// Whether the account's expiry lies before `now`. Accounts without expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expire.map(|expire| expire <= now).unwrap_or(false)
    }
}

/// Connection URI plus its rendered QR image (`data:image/png;base64,...`).
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub uri: String,
    pub qr_code: String,
}

// --- Payment data structures ---

/// What the caller wants to charge.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Amount in the smallest currency unit (e.g., cents).
    pub amount: i64,
    pub currency: String,
    /// Reference to the paying user, echoed back in settlement metadata.
    pub user_ref: String,
    /// Plan identifier, echoed back in settlement metadata.
    pub plan: String,
    pub return_url: String,
}

/// Lifecycle state of a payment at the gateway.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentState {
    Pending,
    WaitingForCapture,
    Succeeded,
    Canceled,
    Failed,
    #[serde(other)]
    Unknown,
}

/// The gateway's answer to a payment creation.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentCreated {
    pub id: String,
    pub status: PaymentState,
    /// Where to send the user to complete the payment.
    pub redirect_url: Option<String>,
}

/// A payment as reported by the status endpoint.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentInfo {
    pub id: String,
    pub status: PaymentState,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A settlement notification, decoded only after its signature was verified.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settlement {
    /// Event name, e.g. "payment.succeeded".
    pub event: String,
    pub payment_id: String,
    pub status: PaymentState,
    pub amount: Option<i64>,
    pub currency: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// Metadata key carrying the user reference.
pub const METADATA_USER_REF: &str = "user_id";
/// Metadata key carrying the plan identifier.
pub const METADATA_PLAN: &str = "plan";

impl Settlement {
    pub fn is_succeeded(&self) -> bool {
        self.status == PaymentState::Succeeded
    }

    pub fn user_ref(&self) -> Option<&str> {
        self.metadata.get(METADATA_USER_REF).map(String::as_str)
    }

    pub fn plan(&self) -> Option<&str> {
        self.metadata.get(METADATA_PLAN).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn account(data_limit: Option<u64>, used: u64, expire: Option<DateTime<Utc>>) -> RemoteAccount {
        RemoteAccount {
            username: "alice".into(),
            proxy_id: Some("abc-123".into()),
            status: AccountStatus::Active,
            data_limit,
            used_traffic: used,
            expire,
        }
    }

    #[test]
    fn test_remaining_traffic() {
        assert_eq!(account(Some(1000), 250, None).remaining_traffic(), Some(750));
        assert_eq!(account(Some(100), 250, None).remaining_traffic(), Some(0));
        assert_eq!(account(None, 250, None).remaining_traffic(), None);
    }

    #[test]
    fn test_is_expired() {
        let now = Utc::now();
        assert!(account(None, 0, Some(now - Duration::hours(1))).is_expired(now));
        assert!(!account(None, 0, Some(now + Duration::hours(1))).is_expired(now));
        assert!(!account(None, 0, None).is_expired(now));
    }

    #[test]
    fn test_settlement_metadata_accessors() {
        let settlement: Settlement = serde_json::from_str(
            r#"{"event":"payment.succeeded","payment_id":"pay_1","status":"succeeded",
                "amount":500,"currency":"USD","metadata":{"user_id":"42","plan":"month"}}"#,
        )
        .expect("settlement should decode");
        assert!(settlement.is_succeeded());
        assert_eq!(settlement.user_ref(), Some("42"));
        assert_eq!(settlement.plan(), Some("month"));
    }

    #[test]
    fn test_unknown_payment_state_decodes() {
        let state: PaymentState = serde_json::from_str("\"refunded\"").expect("decodes");
        assert_eq!(state, PaymentState::Unknown);
    }
}
