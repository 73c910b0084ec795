// --- File: crates/tunnelgate_common/src/error.rs ---
use std::fmt;
use thiserror::Error;

/// The base error type shared by all Tunnelgate crates.
///
/// Integration crates keep their own error enums (`PanelError`, `PaymentError`)
/// and convert into this type with `From` at the service boundary.
#[derive(Error, Debug)]
pub enum TunnelgateError {
    /// Error occurred during an HTTP request
    #[error("HTTP request failed: {0}")]
    HttpError(String),

    /// Error occurred while parsing data
    #[error("Failed to parse data: {0}")]
    ParseError(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Authentication against a remote service failed
    #[error("Authentication error: {0}")]
    AuthError(String),

    /// An inbound message could not be authenticated (e.g. bad webhook signature)
    #[error("Security error: {0}")]
    SecurityError(String),

    /// Input rejected before reaching a remote service
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A remote service answered with an error
    #[error("External service error: {service_name} - {message}")]
    ExternalServiceError {
        service_name: String,
        message: String,
    },

    /// Resource not found
    #[error("Not found: {0}")]
    NotFoundError(String),

    /// A remote call timed out
    #[error("Timeout: {0}")]
    TimeoutError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// A trait for converting errors to HTTP status codes.
pub trait HttpStatusCode {
    /// Returns the HTTP status code for this error.
    fn status_code(&self) -> u16;
}

impl HttpStatusCode for TunnelgateError {
    fn status_code(&self) -> u16 {
        match self {
            TunnelgateError::HttpError(_) => 502,
            TunnelgateError::ParseError(_) => 400,
            TunnelgateError::ConfigError(_) => 500,
            TunnelgateError::AuthError(_) => 502,
            TunnelgateError::SecurityError(_) => 401,
            TunnelgateError::ValidationError(_) => 400,
            TunnelgateError::ExternalServiceError { .. } => 502,
            TunnelgateError::NotFoundError(_) => 404,
            TunnelgateError::TimeoutError(_) => 504,
            TunnelgateError::InternalError(_) => 500,
        }
    }
}

/// A trait for adding context to errors.
pub trait Context<T, E> {
    /// Adds context to an error.
    fn context<C>(self, context: C) -> Result<T, TunnelgateError>
    where
        C: fmt::Display + Send + Sync + 'static;

    /// Adds context to an error with a lazy context provider.
    fn with_context<C, F>(self, f: F) -> Result<T, TunnelgateError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E: std::error::Error + Send + Sync + 'static> Context<T, E> for Result<T, E> {
    fn context<C>(self, context: C) -> Result<T, TunnelgateError>
    where
        C: fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|error| TunnelgateError::InternalError(format!("{}: {}", context, error)))
    }

    fn with_context<C, F>(self, f: F) -> Result<T, TunnelgateError>
    where
        C: fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|error| TunnelgateError::InternalError(format!("{}: {}", f(), error)))
    }
}

// Common error conversions
impl From<reqwest::Error> for TunnelgateError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TunnelgateError::TimeoutError(err.to_string())
        } else {
            TunnelgateError::HttpError(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TunnelgateError {
    fn from(err: serde_json::Error) -> Self {
        TunnelgateError::ParseError(err.to_string())
    }
}

// Utility functions for error handling
pub fn config_error<T: fmt::Display>(message: T) -> TunnelgateError {
    TunnelgateError::ConfigError(message.to_string())
}

pub fn validation_error<T: fmt::Display>(message: T) -> TunnelgateError {
    TunnelgateError::ValidationError(message.to_string())
}

pub fn not_found<T: fmt::Display>(message: T) -> TunnelgateError {
    TunnelgateError::NotFoundError(message.to_string())
}

pub fn external_service_error<T: fmt::Display>(service_name: &str, message: T) -> TunnelgateError {
    TunnelgateError::ExternalServiceError {
        service_name: service_name.to_string(),
        message: message.to_string(),
    }
}
