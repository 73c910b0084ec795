// --- File: crates/tunnelgate_payment/src/error.rs ---
use thiserror::Error;
use tunnelgate_common::{external_service_error, HttpStatusCode, TunnelgateError};

/// Payment-gateway-specific error types.
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Missing or incomplete payment configuration
    #[error("Payment configuration missing or incomplete: {0}")]
    ConfigError(String),

    /// Error occurred during a gateway API request
    #[error("Payment gateway request failed during {operation}: {source}")]
    RequestError {
        operation: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// Error returned by the gateway API
    #[error("Payment gateway returned an error during {operation}: {message} (Status: {status_code})")]
    ApiError {
        operation: &'static str,
        status_code: u16,
        message: String,
    },

    /// Error parsing a gateway response or a verified webhook body
    #[error("Failed to parse payment data during {operation}: {source}")]
    ParseError {
        operation: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Payment id that cannot be used as a gateway path segment
    #[error("Invalid payment id '{0}'")]
    InvalidPaymentId(String),

    /// Webhook signature missing or not matching
    #[error("Webhook signature verification failed: {0}")]
    WebhookSignatureError(String),
}

/// Convert PaymentError to TunnelgateError
impl From<PaymentError> for TunnelgateError {
    fn from(err: PaymentError) -> Self {
        let message = err.to_string();
        match err {
            PaymentError::ConfigError(_) => TunnelgateError::ConfigError(message),
            PaymentError::RequestError { source, .. } if source.is_timeout() => {
                TunnelgateError::TimeoutError(message)
            }
            PaymentError::RequestError { .. } => TunnelgateError::HttpError(message),
            PaymentError::ApiError { status_code: 404, .. } => TunnelgateError::NotFoundError(message),
            PaymentError::ApiError { .. } => external_service_error("Payment gateway", message),
            PaymentError::ParseError { .. } => TunnelgateError::ParseError(message),
            PaymentError::InvalidPaymentId(_) => TunnelgateError::ValidationError(message),
            PaymentError::WebhookSignatureError(_) => TunnelgateError::SecurityError(message),
        }
    }
}

impl HttpStatusCode for PaymentError {
    fn status_code(&self) -> u16 {
        match self {
            PaymentError::ConfigError(_) => 500,
            PaymentError::RequestError { source, .. } if source.is_timeout() => 504,
            PaymentError::RequestError { .. } => 502,
            PaymentError::ApiError { status_code: 404, .. } => 404,
            PaymentError::ApiError { .. } => 502,
            PaymentError::ParseError { .. } => 400,
            PaymentError::InvalidPaymentId(_) => 400,
            PaymentError::WebhookSignatureError(_) => 401,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_error_is_security_error() {
        let err = PaymentError::WebhookSignatureError("mismatch".into());
        assert_eq!(err.status_code(), 401);
        assert!(matches!(TunnelgateError::from(err), TunnelgateError::SecurityError(_)));
    }

    #[test]
    fn test_api_error_keeps_operation_context() {
        let err = PaymentError::ApiError {
            operation: "get_payment_status",
            status_code: 404,
            message: "payment not found".into(),
        };
        assert!(err.to_string().contains("get_payment_status"));
        assert!(matches!(TunnelgateError::from(err), TunnelgateError::NotFoundError(_)));
    }
}
