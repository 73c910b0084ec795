// --- File: crates/tunnelgate_panel/src/session.rs ---
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Bearer credential plus the instant after which it is no longer trusted.
///
/// Never leaves the crate and is never persisted.
pub(crate) struct Session {
    token: String,
    expires_at: Instant,
}

impl Session {
    pub(crate) fn new(token: String, lifetime: Duration) -> Self {
        Self {
            token,
            expires_at: Instant::now() + lifetime,
        }
    }

    pub(crate) fn is_valid(&self) -> bool {
        Instant::now() < self.expires_at
    }

    pub(crate) fn token(&self) -> &str {
        &self.token
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Session slot guarded by the client's mutex.
///
/// `generation` counts completed handshakes so that callers queued behind an
/// in-flight handshake can tell that a fresh session already exists.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub(crate) session: Option<Session>,
    pub(crate) generation: u64,
}

impl SessionState {
    /// The current token if it is still valid.
    pub(crate) fn valid_token(&self) -> Option<String> {
        self.session
            .as_ref()
            .filter(|s| s.is_valid())
            .map(|s| s.token().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_session_expires_after_lifetime() {
        let session = Session::new("t0k3n".into(), Duration::from_secs(23 * 60 * 60));
        assert!(session.is_valid());

        tokio::time::advance(Duration::from_secs(23 * 60 * 60 - 1)).await;
        assert!(session.is_valid());

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!session.is_valid());
    }

    #[tokio::test]
    async fn test_debug_redacts_token() {
        let session = Session::new("very-secret".into(), Duration::from_secs(60));
        let printed = format!("{:?}", session);
        assert!(!printed.contains("very-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn test_state_without_session_has_no_token() {
        assert!(SessionState::default().valid_token().is_none());
    }
}
