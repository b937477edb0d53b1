use crate::http::HttpCallError;
use thiserror::Error;

pub type ShippingResult<T> = Result<T, ShippingError>;

#[derive(Debug, Clone, Error)]
pub enum ShippingError {
    /// Login rejected or no token could be obtained
    #[error("Shipping authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Shipping provider unavailable: {message}")]
    ProviderUnavailable { message: String },

    #[error("Shipping provider timed out after {timeout_secs}s")]
    ProviderTimeout { timeout_secs: u64 },

    #[error("Shipping provider rejected the request (HTTP {status}): {message}")]
    ProviderError { status: u16, message: String },

    #[error("No courier serves {pickup_postcode} -> {delivery_postcode}")]
    NoCourierAvailable {
        pickup_postcode: String,
        delivery_postcode: String,
    },

    #[error("Unexpected shipping provider response: {message}")]
    InvalidResponse { message: String },
}

impl ShippingError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ShippingError::ProviderUnavailable { .. } | ShippingError::ProviderTimeout { .. } => {
                true
            }
            ShippingError::ProviderError { status, .. } => *status == 429,
            ShippingError::AuthenticationFailed { .. }
            | ShippingError::NoCourierAvailable { .. }
            | ShippingError::InvalidResponse { .. } => false,
        }
    }

    pub(crate) fn from_http(err: HttpCallError) -> Self {
        match err {
            HttpCallError::Timeout { timeout_secs } => ShippingError::ProviderTimeout { timeout_secs },
            HttpCallError::Transport { message } => ShippingError::ProviderUnavailable { message },
            HttpCallError::Status { status, message } if status >= 500 => {
                ShippingError::ProviderUnavailable {
                    message: format!("HTTP {}: {}", status, message),
                }
            }
            HttpCallError::Status { status, message } => {
                ShippingError::ProviderError { status, message }
            }
            HttpCallError::Decode { message } => ShippingError::InvalidResponse { message },
        }
    }
}

impl From<ShippingError> for crate::error::AppError {
    fn from(err: ShippingError) -> Self {
        use crate::error::{
            AppError, AppErrorKind, ExternalError, InfrastructureError, ValidationError,
        };

        let retryable = err.is_retryable();
        let kind = match err {
            ShippingError::AuthenticationFailed { message } => {
                AppErrorKind::Infrastructure(InfrastructureError::Configuration {
                    message: format!("shipping aggregator login failed: {}", message),
                })
            }
            ShippingError::ProviderUnavailable { message } => {
                AppErrorKind::External(ExternalError::Unavailable {
                    service: "Shipping aggregator".to_string(),
                    message,
                })
            }
            ShippingError::ProviderTimeout { timeout_secs } => {
                AppErrorKind::External(ExternalError::Timeout {
                    service: "Shipping aggregator".to_string(),
                    timeout_secs,
                })
            }
            ShippingError::ProviderError { message, .. } => {
                AppErrorKind::External(ExternalError::ShippingProvider {
                    provider: "shiprocket".to_string(),
                    message,
                    is_retryable: retryable,
                })
            }
            ShippingError::NoCourierAvailable {
                pickup_postcode,
                delivery_postcode,
            } => AppErrorKind::Validation(ValidationError::InvalidField {
                field: "delivery_postcode".to_string(),
                reason: format!(
                    "no courier serves {} -> {}",
                    pickup_postcode, delivery_postcode
                ),
            }),
            ShippingError::InvalidResponse { message } => {
                AppErrorKind::External(ExternalError::ShippingProvider {
                    provider: "shiprocket".to_string(),
                    message,
                    is_retryable: false,
                })
            }
        };
        AppError::new(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ErrorCode};

    #[test]
    fn http_errors_map_to_shipping_kinds() {
        let err = ShippingError::from_http(HttpCallError::Status {
            status: 422,
            message: "Wrong pickup location".to_string(),
        });
        assert!(matches!(err, ShippingError::ProviderError { status: 422, .. }));
        assert!(!err.is_retryable());

        let err = ShippingError::from_http(HttpCallError::Status {
            status: 502,
            message: "bad gateway".to_string(),
        });
        assert!(matches!(err, ShippingError::ProviderUnavailable { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn failed_login_surfaces_as_server_error() {
        let app: AppError = ShippingError::AuthenticationFailed {
            message: "Invalid email and password combination".to_string(),
        }
        .into();
        assert_eq!(app.status_code(), 500);
        assert_eq!(app.error_code(), ErrorCode::ConfigurationError);
    }

    #[test]
    fn provider_rejection_is_bad_gateway() {
        let app: AppError = ShippingError::ProviderError {
            status: 400,
            message: "shipment already has an AWB".to_string(),
        }
        .into();
        assert_eq!(app.status_code(), 502);
        assert_eq!(app.error_code(), ErrorCode::ShippingProviderError);
    }
}
