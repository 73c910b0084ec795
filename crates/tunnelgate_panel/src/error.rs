// --- File: crates/tunnelgate_panel/src/error.rs ---
use thiserror::Error;
use tunnelgate_common::{external_service_error, HttpStatusCode, TunnelgateError};

/// Panel-specific error types.
#[derive(Error, Debug)]
pub enum PanelError {
    /// Missing or incomplete panel configuration
    #[error("Panel configuration missing or incomplete: {0}")]
    ConfigError(String),

    /// The token exchange kept failing
    #[error("Panel authentication failed after {attempts} attempt(s): {last_error}")]
    AuthenticationError { attempts: u32, last_error: String },

    /// The panel rejected a freshly issued token
    #[error("Panel rejected the session for {method} {path} after re-authenticating")]
    Unauthorized { method: String, path: String },

    /// The requested user does not exist on the panel
    #[error("Panel user '{0}' not found")]
    UserNotFound(String),

    /// The user exists but carries no vless proxy identity
    #[error("Panel user '{0}' has no vless proxy identity")]
    MissingProxyId(String),

    /// Username contains characters the panel does not accept
    #[error("Invalid panel username '{0}'")]
    InvalidUsername(String),

    /// Error returned by the panel API
    #[error("Panel API returned an error: {message} (Status: {status_code})")]
    ApiError { status_code: u16, message: String },

    /// Error occurred during a panel API request
    #[error("Panel API request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    /// Error parsing a panel API response
    #[error("Failed to parse panel API response: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Rendering the connection URI as a QR image failed
    #[error("Failed to render QR code: {0}")]
    QrCodeError(String),

    /// A provisioning operation failed; wraps the underlying cause
    #[error("Panel operation {operation} for '{target}' failed: {source}")]
    OperationFailed {
        operation: &'static str,
        target: String,
        #[source]
        source: Box<PanelError>,
    },
}

impl PanelError {
    /// Wraps an error with the operation name and its identifying parameter.
    pub(crate) fn during(self, operation: &'static str, target: &str) -> Self {
        PanelError::OperationFailed {
            operation,
            target: target.to_string(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping operation context.
    pub fn root(&self) -> &PanelError {
        match self {
            PanelError::OperationFailed { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.root(), PanelError::UserNotFound(_))
    }

    /// Server errors and timeouts are worth another attempt; everything else is final.
    pub fn is_retryable(&self) -> bool {
        match self.root() {
            PanelError::ApiError { status_code, .. } => *status_code >= 500,
            PanelError::RequestError(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// Convert PanelError to TunnelgateError
///
/// The category comes from the innermost cause; the message keeps the
/// operation context.
impl From<PanelError> for TunnelgateError {
    fn from(err: PanelError) -> Self {
        let message = err.to_string();
        classify(&err, message)
    }
}

fn classify(err: &PanelError, message: String) -> TunnelgateError {
    match err {
        PanelError::OperationFailed { source, .. } => classify(source, message),
        PanelError::ConfigError(_) => TunnelgateError::ConfigError(message),
        PanelError::AuthenticationError { .. } | PanelError::Unauthorized { .. } => {
            TunnelgateError::AuthError(message)
        }
        PanelError::UserNotFound(_) => TunnelgateError::NotFoundError(message),
        PanelError::InvalidUsername(_) => TunnelgateError::ValidationError(message),
        PanelError::RequestError(e) if e.is_timeout() => TunnelgateError::TimeoutError(message),
        PanelError::RequestError(_) => TunnelgateError::HttpError(message),
        PanelError::ParseError(_) => TunnelgateError::ParseError(message),
        PanelError::QrCodeError(_) => TunnelgateError::InternalError(message),
        PanelError::MissingProxyId(_) | PanelError::ApiError { .. } => {
            external_service_error("Panel", message)
        }
    }
}

impl HttpStatusCode for PanelError {
    fn status_code(&self) -> u16 {
        match self {
            PanelError::OperationFailed { source, .. } => source.status_code(),
            PanelError::ConfigError(_) => 500,
            PanelError::AuthenticationError { .. } => 502,
            PanelError::Unauthorized { .. } => 502,
            PanelError::UserNotFound(_) => 404,
            PanelError::MissingProxyId(_) => 502,
            PanelError::InvalidUsername(_) => 400,
            PanelError::ApiError { .. } => 502,
            PanelError::RequestError(e) if e.is_timeout() => 504,
            PanelError::RequestError(_) => 502,
            PanelError::ParseError(_) => 502,
            PanelError::QrCodeError(_) => 500,
        }
    }
}
