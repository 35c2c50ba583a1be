//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment-related errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Malformed or out-of-bounds client input
    #[error("validation failed: {0}")]
    Validation(String),

    /// Webhook delivery arrived without a signature header
    #[error("missing webhook signature header")]
    MissingSignature,

    /// Webhook body is not a structurally valid event
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),

    /// Webhook signature verification failed
    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    /// The processor rejected the request
    #[error("processor error ({error_type}): {message}")]
    Processor {
        error_type: String,
        code: Option<String>,
        message: String,
    },

    /// Network or timeout failure talking to the processor; safe to retry
    #[error("processor unavailable: {0}")]
    ProcessorUnavailable(String),

    /// Transaction store failure
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Check if this error is safe for the caller to retry as-is
    pub fn is_retryable(&self) -> bool {
        matches!(self, PaymentError::ProcessorUnavailable(_))
    }

    /// Check if the failure is the caller's fault (HTTP 400 class)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PaymentError::Validation(_)
                | PaymentError::MissingSignature
                | PaymentError::InvalidPayload(_)
                | PaymentError::InvalidSignature(_)
                | PaymentError::Processor { .. }
        )
    }

    /// Get user-friendly message
    ///
    /// Processor errors are translated per error type; card declines keep the
    /// processor's own message since it tells the customer what to do next.
    pub fn user_message(&self) -> String {
        match self {
            PaymentError::Validation(msg) => msg.clone(),
            PaymentError::MissingSignature => "Missing signature".into(),
            PaymentError::InvalidPayload(_) => "Invalid payload".into(),
            PaymentError::InvalidSignature(_) => "Invalid signature".into(),
            PaymentError::Processor {
                error_type,
                message,
                ..
            } => match error_type.as_str() {
                "card_error" => format!("Card error: {message}"),
                "invalid_request_error" => "Invalid payment data".into(),
                "api_error" => "Temporary error. Try again in a few moments".into(),
                "authentication_error" => "Authentication error with the payment processor".into(),
                "rate_limit_error" => "Too many attempts. Wait a moment".into(),
                _ => "Payment processing error".into(),
            },
            PaymentError::ProcessorUnavailable(_) => {
                "Payment processor unavailable. Try again shortly".into()
            }
            PaymentError::Storage(_) | PaymentError::Config(_) => "Internal server error".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn processor(error_type: &str, message: &str) -> PaymentError {
        PaymentError::Processor {
            error_type: error_type.into(),
            code: None,
            message: message.into(),
        }
    }

    #[test]
    fn card_errors_keep_the_processor_message() {
        let err = processor("card_error", "Your card was declined.");
        assert_eq!(err.user_message(), "Card error: Your card was declined.");
    }

    #[test]
    fn processor_error_types_map_to_friendly_messages() {
        assert_eq!(
            processor("invalid_request_error", "bad param").user_message(),
            "Invalid payment data"
        );
        assert_eq!(
            processor("api_error", "boom").user_message(),
            "Temporary error. Try again in a few moments"
        );
        assert_eq!(
            processor("authentication_error", "bad key").user_message(),
            "Authentication error with the payment processor"
        );
        assert_eq!(
            processor("rate_limit_error", "slow down").user_message(),
            "Too many attempts. Wait a moment"
        );
        assert_eq!(
            processor("idempotency_error", "reuse").user_message(),
            "Payment processing error"
        );
    }

    #[test]
    fn classification_flags() {
        assert!(PaymentError::Validation("x".into()).is_client_error());
        assert!(PaymentError::MissingSignature.is_client_error());
        assert!(processor("api_error", "x").is_client_error());
        assert!(!PaymentError::Storage("x".into()).is_client_error());

        assert!(PaymentError::ProcessorUnavailable("timeout".into()).is_retryable());
        assert!(!PaymentError::Validation("x".into()).is_retryable());
    }
}
