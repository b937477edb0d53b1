use crate::http::HttpCallError;
use thiserror::Error;

pub type PaymentResult<T> = Result<T, PaymentError>;

#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    #[error("Invalid amount {amount}: {reason}")]
    InvalidAmount { amount: String, reason: String },

    #[error("Validation error: {message}")]
    ValidationError {
        message: String,
        field: Option<String>,
    },

    #[error("Payment provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Payment provider timed out after {timeout_secs}s")]
    ProviderTimeout { timeout_secs: u64 },

    #[error("Provider error: provider={provider}, message={message}")]
    ProviderError {
        provider: String,
        message: String,
        provider_code: Option<String>,
        retryable: bool,
    },

    /// The signature could not be checked; distinct from a signature mismatch
    #[error("Payment verification error: {message}")]
    VerificationError { message: String },
}

impl PaymentError {
    pub fn is_retryable(&self) -> bool {
        match self {
            PaymentError::InvalidAmount { .. } => false,
            PaymentError::ValidationError { .. } => false,
            PaymentError::ProviderUnavailable { .. } => true,
            PaymentError::ProviderTimeout { .. } => true,
            PaymentError::ProviderError { retryable, .. } => *retryable,
            PaymentError::VerificationError { .. } => false,
        }
    }

    pub fn http_status_code(&self) -> u16 {
        match self {
            PaymentError::InvalidAmount { .. } => 400,
            PaymentError::ValidationError { .. } => 400,
            PaymentError::ProviderUnavailable { .. } => 503,
            PaymentError::ProviderTimeout { .. } => 504,
            PaymentError::ProviderError { .. } => 502,
            PaymentError::VerificationError { .. } => 400,
        }
    }

    pub(crate) fn from_http(provider: &str, err: HttpCallError) -> Self {
        match err {
            HttpCallError::Timeout { timeout_secs } => PaymentError::ProviderTimeout { timeout_secs },
            HttpCallError::Transport { message } => PaymentError::ProviderUnavailable { message },
            HttpCallError::Status { status, message } if status >= 500 => {
                PaymentError::ProviderUnavailable {
                    message: format!("HTTP {}: {}", status, message),
                }
            }
            HttpCallError::Status { status, message } => PaymentError::ProviderError {
                provider: provider.to_string(),
                message,
                provider_code: Some(status.to_string()),
                retryable: status == 429,
            },
            HttpCallError::Decode { message } => PaymentError::ProviderError {
                provider: provider.to_string(),
                message: format!("invalid provider JSON response: {}", message),
                provider_code: None,
                retryable: false,
            },
        }
    }
}

impl From<PaymentError> for crate::error::AppError {
    fn from(err: PaymentError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError, ExternalError, ValidationError};

        let kind = match err {
            PaymentError::InvalidAmount { amount, reason } => {
                AppErrorKind::Validation(ValidationError::InvalidAmount { amount, reason })
            }
            PaymentError::ValidationError { message, field } => {
                AppErrorKind::Validation(ValidationError::InvalidField {
                    field: field.unwrap_or_else(|| "payment".to_string()),
                    reason: message,
                })
            }
            PaymentError::ProviderUnavailable { message } => {
                AppErrorKind::External(ExternalError::Unavailable {
                    service: "Payment gateway".to_string(),
                    message,
                })
            }
            PaymentError::ProviderTimeout { timeout_secs } => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "Payment gateway".to_string(),
                    timeout_secs,
                })
            }
            PaymentError::ProviderError {
                provider,
                message,
                retryable,
                ..
            } => AppErrorKind::External(ExternalError::PaymentProvider {
                provider,
                message,
                is_retryable: retryable,
            }),
            PaymentError::VerificationError { message } => {
                AppErrorKind::Domain(DomainError::SignatureUnverifiable { reason: message })
            }
        };

        AppError::new(kind)
    }
}
