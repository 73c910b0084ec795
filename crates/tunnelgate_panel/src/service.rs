// --- File: crates/tunnelgate_panel/src/service.rs ---
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;
use tunnelgate_common::services::{BoxFuture, ConnectionDescriptor, RemoteAccount, VpnProvisioner};
use tunnelgate_common::TunnelgateError;

use crate::client::PanelClient;

impl VpnProvisioner for PanelClient {
    fn get_user(&self, username: &str) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let username = username.to_string();
        Box::pin(async move { Ok(PanelClient::get_user(self, &username).await?) })
    }

    fn user_exists(&self, username: &str) -> Pin<Box<dyn Future<Output = bool> + Send + '_>> {
        let username = username.to_string();
        Box::pin(async move { PanelClient::user_exists(self, &username).await })
    }

    fn get_or_create_user(
        &self,
        username: &str,
        data_limit: u64,
        expire: Option<DateTime<Utc>>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let username = username.to_string();
        Box::pin(async move {
            Ok(PanelClient::get_or_create_user(self, &username, data_limit, expire).await?)
        })
    }

    fn extend_subscription(
        &self,
        username: &str,
        new_expire: DateTime<Utc>,
    ) -> BoxFuture<'_, RemoteAccount, TunnelgateError> {
        let username = username.to_string();
        Box::pin(async move {
            Ok(PanelClient::extend_subscription(self, &username, new_expire).await?)
        })
    }

    fn connection_descriptor(
        &self,
        username: &str,
        host: &str,
        port: u16,
    ) -> BoxFuture<'_, ConnectionDescriptor, TunnelgateError> {
        let username = username.to_string();
        let host = host.to_string();
        Box::pin(async move {
            Ok(PanelClient::connection_descriptor(self, &username, &host, port).await?)
        })
    }
}
