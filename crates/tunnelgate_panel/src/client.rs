// --- File: crates/tunnelgate_panel/src/client.rs ---
//! Authenticated session and request engine for the panel API.
//!
//! One [`PanelClient`] owns one bearer session. All mutation of that session
//! happens inside the handshake, which runs under the client's session mutex,
//! so concurrent callers never start a second handshake while one is in flight.

use reqwest::{header, Client, Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use tunnelgate_common::create_client;
use tunnelgate_config::PanelConfig;

use crate::error::PanelError;
use crate::retry::RetryPolicy;
use crate::session::{Session, SessionState};

const TOKEN_PATH: &str = "/api/admin/token";

#[derive(Deserialize, Debug)]
struct TokenResponse {
    access_token: String,
}

#[derive(Deserialize, Debug)]
struct PanelErrorBody {
    detail: Option<Value>,
}

/// Defaults used when building connection descriptors and new accounts.
#[derive(Debug, Clone)]
pub struct ProvisioningDefaults {
    pub vless_host: Option<String>,
    pub vless_port: u16,
    pub data_limit: u64,
    pub inbound_tag: String,
}

/// Client for the remote VPN panel.
pub struct PanelClient {
    http: Client,
    base_url: String,
    username: String,
    password: String,
    policy: RetryPolicy,
    token_lifetime: Duration,
    state: Mutex<SessionState>,
    /// Mirror of `SessionState::generation`, readable without waiting for the lock.
    generation: AtomicU64,
    defaults: ProvisioningDefaults,
}

impl fmt::Debug for PanelClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PanelClient")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

fn required<'a>(value: &'a str, name: &str) -> Result<&'a str, PanelError> {
    let trimmed = value.trim();
    if trimmed.is_empty() || trimmed == "secret_from_env" {
        return Err(PanelError::ConfigError(format!("panel.{} is not set", name)));
    }
    Ok(trimmed)
}

impl PanelClient {
    /// Builds a client from configuration without contacting the panel.
    ///
    /// Fails with [`PanelError::ConfigError`] if the endpoint or credentials are missing.
    pub fn new(config: &PanelConfig) -> Result<Self, PanelError> {
        let base_url = required(&config.url, "url")?.trim_end_matches('/').to_string();
        let username = required(&config.username, "username")?.to_string();
        let password = required(&config.password, "password")?.to_string();

        let http = create_client(config.request_timeout_secs, true)?;

        Ok(Self {
            http,
            base_url,
            username,
            password,
            policy: RetryPolicy::from_config(config),
            token_lifetime: Duration::from_secs(config.token_lifetime_secs),
            state: Mutex::new(SessionState::default()),
            generation: AtomicU64::new(0),
            defaults: ProvisioningDefaults {
                vless_host: config.vless_host.clone(),
                vless_port: config.vless_port,
                data_limit: config.default_data_limit,
                inbound_tag: config.inbound_tag.clone(),
            },
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn defaults(&self) -> &ProvisioningDefaults {
        &self.defaults
    }

    /// Whether a non-expired session is currently held.
    pub async fn has_valid_session(&self) -> bool {
        self.state.lock().await.valid_token().is_some()
    }

    /// Exchanges the admin credentials for a fresh bearer token.
    ///
    /// Callers that arrive while another handshake is in flight wait for it and
    /// reuse its session instead of starting their own.
    pub async fn authenticate(&self) -> Result<(), PanelError> {
        let seen_generation = self.generation.load(Ordering::Acquire);
        self.refresh_session(seen_generation).await.map(|_| ())
    }

    /// Returns a valid token, running the handshake first if there is none.
    async fn bearer(&self) -> Result<(String, u64), PanelError> {
        let mut state = self.state.lock().await;
        if let Some(token) = state.valid_token() {
            return Ok((token, state.generation));
        }
        debug!("[Panel] No valid session, authenticating");
        let token = self.handshake_locked(&mut state).await?;
        Ok((token, state.generation))
    }

    /// Replaces the session created in `stale_generation`, unless another caller already did.
    async fn refresh_session(&self, stale_generation: u64) -> Result<String, PanelError> {
        let mut state = self.state.lock().await;
        if state.generation != stale_generation {
            if let Some(token) = state.valid_token() {
                debug!("[Panel] Session already refreshed by a concurrent caller");
                return Ok(token);
            }
        }
        self.handshake_locked(&mut state).await
    }

    /// Runs the token exchange with retries. Must be called with the session lock held.
    async fn handshake_locked(&self, state: &mut SessionState) -> Result<String, PanelError> {
        state.session = None;
        let mut attempt = 1;
        loop {
            match self.exchange_token().await {
                Ok(token) => {
                    state.session = Some(Session::new(token.clone(), self.token_lifetime));
                    state.generation += 1;
                    self.generation.store(state.generation, Ordering::Release);
                    info!(
                        "[Panel] Authenticated as '{}' (attempt {}/{})",
                        self.username, attempt, self.policy.max_attempts
                    );
                    return Ok(token);
                }
                Err(e) if self.policy.has_attempts_left(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "[Panel] Authentication attempt {}/{} failed: {}. Retrying in {:?}",
                        attempt, self.policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        "[Panel] Authentication failed after {} attempt(s): {}",
                        attempt, e
                    );
                    return Err(PanelError::AuthenticationError {
                        attempts: attempt,
                        last_error: e.to_string(),
                    });
                }
            }
        }
    }

    async fn exchange_token(&self) -> Result<String, PanelError> {
        let url = format!("{}{}", self.base_url, TOKEN_PATH);
        let form = [
            ("username", self.username.as_str()),
            ("password", self.password.as_str()),
        ];
        let response = self.http.post(&url).form(&form).send().await?;
        let body = read_body(response).await?;
        let token: TokenResponse = serde_json::from_str(&body)?;
        Ok(token.access_token)
    }

    /// Sends an authenticated request and returns the response body.
    ///
    /// Server errors and timeouts are retried with the client's backoff policy.
    /// A 401 triggers exactly one re-authentication and one replay per attempt.
    /// Other client errors are returned as-is.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String, PanelError> {
        let mut attempt = 1;
        loop {
            match self.send_with_reauth(&method, path, body).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_retryable() && self.policy.has_attempts_left(attempt) => {
                    let delay = self.policy.delay_for(attempt);
                    warn!(
                        "[Panel] {} {} failed (attempt {}/{}): {}. Retrying in {:?}",
                        method, path, attempt, self.policy.max_attempts, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn send_with_reauth(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<String, PanelError> {
        let (token, generation) = self.bearer().await?;
        let response = self.send(method, path, body, &token).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return read_body(response).await;
        }

        warn!(
            "[Panel] {} {} was rejected as unauthorized, re-authenticating once",
            method, path
        );
        let token = self.refresh_session(generation).await?;
        let response = self.send(method, path, body, &token).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            error!(
                "[Panel] {} {} still unauthorized after re-authentication",
                method, path
            );
            return Err(PanelError::Unauthorized {
                method: method.to_string(),
                path: path.to_string(),
            });
        }
        read_body(response).await
    }

    async fn send(
        &self,
        method: &Method,
        path: &str,
        body: Option<&Value>,
        token: &str,
    ) -> Result<Response, PanelError> {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self
            .http
            .request(method.clone(), &url)
            .header(header::AUTHORIZATION, format!("Bearer {}", token));
        if let Some(body) = body {
            builder = builder.json(body);
        }
        Ok(builder.send().await?)
    }
}

/// Reads a response, turning non-2xx statuses into [`PanelError::ApiError`].
async fn read_body(response: Response) -> Result<String, PanelError> {
    let status = response.status();
    let body_text = response.text().await?;
    if status.is_success() {
        return Ok(body_text);
    }

    let message = match serde_json::from_str::<PanelErrorBody>(&body_text) {
        Ok(PanelErrorBody {
            detail: Some(Value::String(detail)),
        }) => detail,
        Ok(PanelErrorBody {
            detail: Some(detail),
        }) => detail.to_string(),
        _ => body_text,
    };
    debug!("[Panel] API answered {}: {}", status, message);
    Err(PanelError::ApiError {
        status_code: status.as_u16(),
        message,
    })
}
