// --- File: crates/tunnelgate_panel/src/users.rs ---
//! User provisioning on top of [`PanelClient::request`].

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use tunnelgate_common::services::{AccountStatus, RemoteAccount};
use uuid::Uuid;

use crate::client::PanelClient;
use crate::error::PanelError;

/// Flow control mode assigned to new vless identities and advertised in descriptors.
pub const VLESS_FLOW: &str = "xtls-rprx-vision";

// --- Panel wire format ---

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct VlessProxy {
    id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    flow: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
struct Proxies {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vless: Option<VlessProxy>,
}

#[derive(Serialize, Debug)]
struct UserCreateBody<'a> {
    username: &'a str,
    proxies: Proxies,
    inbounds: HashMap<&'static str, Vec<&'a str>>,
    /// Unix seconds; 0 means never.
    expire: i64,
    /// Bytes; 0 means unlimited.
    data_limit: u64,
    data_limit_reset_strategy: &'static str,
    status: AccountStatus,
}

#[derive(Deserialize, Debug)]
struct UserResponse {
    username: String,
    #[serde(default)]
    proxies: Proxies,
    status: AccountStatus,
    data_limit: Option<u64>,
    #[serde(default)]
    used_traffic: u64,
    expire: Option<i64>,
}

impl From<UserResponse> for RemoteAccount {
    fn from(user: UserResponse) -> Self {
        RemoteAccount {
            username: user.username,
            proxy_id: user
                .proxies
                .vless
                .and_then(|v| v.id)
                .filter(|id| !id.is_empty()),
            status: user.status,
            data_limit: user.data_limit.filter(|limit| *limit > 0),
            used_traffic: user.used_traffic,
            expire: user
                .expire
                .filter(|secs| *secs > 0)
                .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        }
    }
}

/// Partial update of a panel user. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserUpdate {
    pub status: Option<AccountStatus>,
    pub expire: Option<DateTime<Utc>>,
    pub data_limit: Option<u64>,
}

impl UserUpdate {
    fn to_body(&self) -> Value {
        let mut body = serde_json::Map::new();
        if let Some(status) = self.status {
            body.insert("status".into(), json!(status));
        }
        if let Some(expire) = self.expire {
            body.insert("expire".into(), json!(expire.timestamp()));
        }
        if let Some(data_limit) = self.data_limit {
            body.insert("data_limit".into(), json!(data_limit));
        }
        Value::Object(body)
    }
}

/// Whether the panel accepts `username`: 3 to 32 characters of `[A-Za-z0-9_.@-]`.
pub fn is_valid_username(username: &str) -> bool {
    (3..=32).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.' || c == '@')
}

/// Usernames are used verbatim as URL path segments, so only the panel's own
/// character set is accepted.
fn user_path(username: &str) -> Result<String, PanelError> {
    if !is_valid_username(username) {
        return Err(PanelError::InvalidUsername(username.to_string()));
    }
    Ok(format!("/api/user/{}", username))
}

fn parse_account(body: &str) -> Result<RemoteAccount, PanelError> {
    let user: UserResponse = serde_json::from_str(body)?;
    Ok(user.into())
}

impl PanelClient {
    /// Creates a user with a freshly generated vless identity.
    ///
    /// `data_limit` is in bytes (0 = unlimited). A username collision is
    /// returned as the panel's own error.
    pub async fn create_user(
        &self,
        username: &str,
        data_limit: u64,
        expire: Option<DateTime<Utc>>,
    ) -> Result<RemoteAccount, PanelError> {
        user_path(username).map_err(|e| e.during("create_user", username))?;
        let proxy_id = Uuid::new_v4().to_string();
        let inbound_tag = self.defaults().inbound_tag.as_str();

        let body = UserCreateBody {
            username,
            proxies: Proxies {
                vless: Some(VlessProxy {
                    id: Some(proxy_id),
                    flow: Some(VLESS_FLOW.to_string()),
                }),
            },
            inbounds: HashMap::from([("vless", vec![inbound_tag])]),
            expire: expire.map(|e| e.timestamp()).unwrap_or(0),
            data_limit,
            data_limit_reset_strategy: "no_reset",
            status: AccountStatus::Active,
        };
        let body = serde_json::to_value(&body).map_err(|e| PanelError::from(e).during("create_user", username))?;

        info!("[Panel] Creating user '{}' (data_limit={}, expire={:?})", username, data_limit, expire);
        let text = self
            .request(Method::POST, "/api/user", Some(&body))
            .await
            .map_err(|e| e.during("create_user", username))?;
        parse_account(&text).map_err(|e| e.during("create_user", username))
    }

    /// Applies a partial update and returns the updated account.
    pub async fn update_user(
        &self,
        username: &str,
        update: &UserUpdate,
    ) -> Result<RemoteAccount, PanelError> {
        let path = user_path(username).map_err(|e| e.during("update_user", username))?;
        debug!("[Panel] Updating user '{}': {:?}", username, update);
        let text = self
            .request(Method::PUT, &path, Some(&update.to_body()))
            .await
            .map_err(|e| not_found_for(e, username).during("update_user", username))?;
        parse_account(&text).map_err(|e| e.during("update_user", username))
    }

    /// Fetches a user. A 404 becomes [`PanelError::UserNotFound`].
    pub async fn get_user(&self, username: &str) -> Result<RemoteAccount, PanelError> {
        let path = user_path(username)?;
        let text = self
            .request(Method::GET, &path, None)
            .await
            .map_err(|e| match not_found_for(e, username) {
                not_found @ PanelError::UserNotFound(_) => not_found,
                other => other.during("get_user", username),
            })?;
        parse_account(&text).map_err(|e| e.during("get_user", username))
    }

    /// Removes a user. Deleting an already deleted user fails with a not-found error.
    pub async fn delete_user(&self, username: &str) -> Result<(), PanelError> {
        let path = user_path(username).map_err(|e| e.during("delete_user", username))?;
        self.request(Method::DELETE, &path, None)
            .await
            .map_err(|e| not_found_for(e, username).during("delete_user", username))?;
        info!("[Panel] Deleted user '{}'", username);
        Ok(())
    }

    /// Whether the user can be fetched. Every failure, not only a 404, reads as `false`.
    pub async fn user_exists(&self, username: &str) -> bool {
        match self.get_user(username).await {
            Ok(_) => true,
            Err(e) => {
                debug!("[Panel] Treating '{}' as absent: {}", username, e);
                false
            }
        }
    }

    /// Sets a new expiry and forces the account active, restoring expired users on renewal.
    pub async fn extend_subscription(
        &self,
        username: &str,
        new_expire: DateTime<Utc>,
    ) -> Result<RemoteAccount, PanelError> {
        info!("[Panel] Extending '{}' until {}", username, new_expire);
        let update = UserUpdate {
            status: Some(AccountStatus::Active),
            expire: Some(new_expire),
            data_limit: None,
        };
        self.update_user(username, &update)
            .await
            .map_err(|e| e.during("extend_subscription", username))
    }

    /// Fetches the user and creates it when the fetch fails for any reason.
    ///
    /// The fetch is attempted once; create is attempted once.
    pub async fn get_or_create_user(
        &self,
        username: &str,
        data_limit: u64,
        expire: Option<DateTime<Utc>>,
    ) -> Result<RemoteAccount, PanelError> {
        match self.get_user(username).await {
            Ok(account) => Ok(account),
            Err(e) => {
                warn!("[Panel] Fetching '{}' failed ({}), provisioning it", username, e);
                self.create_user(username, data_limit, expire).await
            }
        }
    }

    /// Enables or disables a user.
    pub async fn set_user_status(
        &self,
        username: &str,
        status: AccountStatus,
    ) -> Result<RemoteAccount, PanelError> {
        let update = UserUpdate {
            status: Some(status),
            ..UserUpdate::default()
        };
        self.update_user(username, &update)
            .await
            .map_err(|e| e.during("set_user_status", username))
    }

    /// Resets the consumed traffic counter of a user.
    pub async fn reset_user_traffic(&self, username: &str) -> Result<RemoteAccount, PanelError> {
        let path = user_path(username).map_err(|e| e.during("reset_user_traffic", username))?;
        let text = self
            .request(Method::POST, &format!("{}/reset", path), None)
            .await
            .map_err(|e| not_found_for(e, username).during("reset_user_traffic", username))?;
        parse_account(&text).map_err(|e| e.during("reset_user_traffic", username))
    }
}

/// Maps a 404 from the panel to [`PanelError::UserNotFound`].
fn not_found_for(err: PanelError, username: &str) -> PanelError {
    match err {
        PanelError::ApiError { status_code: 404, .. } => PanelError::UserNotFound(username.to_string()),
        other => other,
    }
}
