//! Unified error handling for the checkout service
//!
//! Every subsystem error (payments, shipping, persistence, cache) converts into
//! [`AppError`], which carries an HTTP status, a machine-readable code and a
//! user-facing message.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes returned to clients for programmatic handling
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    // Domain errors (4xx)
    #[serde(rename = "ORDER_NOT_FOUND")]
    OrderNotFound,
    #[serde(rename = "VENDOR_NOT_FOUND")]
    VendorNotFound,
    #[serde(rename = "FULFILLMENT_IN_PROGRESS")]
    FulfillmentInProgress,
    #[serde(rename = "INVALID_STATE_TRANSITION")]
    InvalidStateTransition,
    #[serde(rename = "VERIFICATION_FAILED")]
    VerificationFailed,
    #[serde(rename = "VERIFICATION_ERROR")]
    VerificationError,
    #[serde(rename = "INVALID_AMOUNT")]
    InvalidAmount,

    // Auth errors
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    #[serde(rename = "FORBIDDEN")]
    Forbidden,

    // Infrastructure errors (5xx)
    #[serde(rename = "DATABASE_ERROR")]
    DatabaseError,
    #[serde(rename = "CACHE_ERROR")]
    CacheError,
    #[serde(rename = "CONFIGURATION_ERROR")]
    ConfigurationError,

    // External errors (502, 503, 504)
    #[serde(rename = "PAYMENT_PROVIDER_ERROR")]
    PaymentProviderError,
    #[serde(rename = "SHIPPING_PROVIDER_ERROR")]
    ShippingProviderError,
    #[serde(rename = "PROVIDER_UNAVAILABLE")]
    ProviderUnavailable,
    #[serde(rename = "PROVIDER_TIMEOUT")]
    ProviderTimeout,

    // Generic
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
    #[serde(rename = "VALIDATION_ERROR")]
    ValidationError,
}

/// Business rule violations in the checkout flow
#[derive(Debug, Clone)]
pub enum DomainError {
    /// No order with the given id
    OrderNotFound { order_id: String },
    /// No brand account matches the submitted pickup location or vendor id
    VendorNotFound { lookup: String },
    /// Another callback currently holds the fulfilment lease for this order
    FulfillmentInProgress { order_id: String },
    /// Fulfilment stage cannot move from `from` to `to`
    InvalidStateTransition { from: String, to: String },
    /// The payment signature did not match
    SignatureMismatch { order_id: String },
    /// The payment signature could not be checked at all
    SignatureUnverifiable { reason: String },
}

/// Infrastructure-level errors (database, cache, configuration)
#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Database { message: String, is_retryable: bool },
    Cache { message: String },
    Configuration { message: String },
}

/// Failures talking to the payment gateway or the shipping aggregator
#[derive(Debug, Clone)]
pub enum ExternalError {
    PaymentProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    ShippingProvider {
        provider: String,
        message: String,
        is_retryable: bool,
    },
    /// Transport failure or 5xx from a provider
    Unavailable { service: String, message: String },
    /// Provider did not answer within the configured timeout
    Timeout { service: String, timeout_secs: u64 },
}

/// Input validation errors
#[derive(Debug, Clone)]
pub enum ValidationError {
    MissingField { field: String },
    InvalidField { field: String, reason: String },
    InvalidAmount { amount: String, reason: String },
}

/// Authentication and authorization errors
#[derive(Debug, Clone)]
pub enum AuthError {
    MissingToken,
    InvalidToken { reason: String },
    Forbidden { reason: String },
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
    pub context: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
    Auth(AuthError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
            context: None,
        }
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MissingField {
            field: field.into(),
        }))
    }

    pub fn invalid_field(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }))
    }

    pub fn order_not_found(order_id: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Domain(DomainError::OrderNotFound {
            order_id: order_id.into(),
        }))
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => 404,
                DomainError::VendorNotFound { .. } => 404,
                DomainError::FulfillmentInProgress { .. } => 409, // Conflict
                DomainError::InvalidStateTransition { .. } => 409,
                DomainError::SignatureMismatch { .. } => 400,
                DomainError::SignatureUnverifiable { .. } => 400,
            },
            AppErrorKind::Infrastructure(_) => 500,
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => 502, // Bad Gateway
                ExternalError::ShippingProvider { .. } => 502,
                ExternalError::Unavailable { .. } => 503,
                ExternalError::Timeout { .. } => 504, // Gateway Timeout
            },
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Auth(err) => match err {
                AuthError::MissingToken | AuthError::InvalidToken { .. } => 401,
                AuthError::Forbidden { .. } => 403,
            },
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { .. } => ErrorCode::OrderNotFound,
                DomainError::VendorNotFound { .. } => ErrorCode::VendorNotFound,
                DomainError::FulfillmentInProgress { .. } => ErrorCode::FulfillmentInProgress,
                DomainError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
                DomainError::SignatureMismatch { .. } => ErrorCode::VerificationFailed,
                DomainError::SignatureUnverifiable { .. } => ErrorCode::VerificationError,
            },
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { .. } => ErrorCode::DatabaseError,
                InfrastructureError::Cache { .. } => ErrorCode::CacheError,
                InfrastructureError::Configuration { .. } => ErrorCode::ConfigurationError,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { .. } => ErrorCode::PaymentProviderError,
                ExternalError::ShippingProvider { .. } => ErrorCode::ShippingProviderError,
                ExternalError::Unavailable { .. } => ErrorCode::ProviderUnavailable,
                ExternalError::Timeout { .. } => ErrorCode::ProviderTimeout,
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidAmount { .. } => ErrorCode::InvalidAmount,
                _ => ErrorCode::ValidationError,
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::Forbidden { .. } => ErrorCode::Forbidden,
                _ => ErrorCode::Unauthorized,
            },
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::OrderNotFound { order_id } => {
                    format!("Order '{}' not found", order_id)
                }
                DomainError::VendorNotFound { lookup } => {
                    format!("No vendor registered for pickup location '{}'", lookup)
                }
                DomainError::FulfillmentInProgress { order_id } => {
                    format!("Order '{}' is already being processed", order_id)
                }
                DomainError::InvalidStateTransition { from, to } => {
                    format!("Order cannot move from '{}' to '{}'", from, to)
                }
                DomainError::SignatureMismatch { .. } => {
                    "Payment signature verification failed".to_string()
                }
                DomainError::SignatureUnverifiable { reason } => {
                    format!("Payment signature could not be verified: {}", reason)
                }
            },
            AppErrorKind::Infrastructure(_) => {
                "Service temporarily unavailable. Please try again later".to_string()
            }
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider {
                    provider,
                    is_retryable,
                    message,
                } => {
                    if *is_retryable {
                        format!(
                            "Payment provider ({}) is temporarily unavailable. Please try again",
                            provider
                        )
                    } else {
                        format!("Payment provider ({}) rejected the request: {}", provider, message)
                    }
                }
                ExternalError::ShippingProvider {
                    provider, message, ..
                } => {
                    format!("Shipping provider ({}) returned an error: {}", provider, message)
                }
                ExternalError::Unavailable { service, .. } => {
                    format!("{} is temporarily unavailable. Please try again", service)
                }
                ExternalError::Timeout {
                    service,
                    timeout_secs,
                } => {
                    format!(
                        "{} request timed out after {} seconds. Please try again",
                        service, timeout_secs
                    )
                }
            },
            AppErrorKind::Validation(err) => match err {
                ValidationError::MissingField { field } => {
                    format!("Required field '{}' is missing", field)
                }
                ValidationError::InvalidField { field, reason } => {
                    format!("Invalid value for '{}': {}", field, reason)
                }
                ValidationError::InvalidAmount { amount, reason } => {
                    format!("Invalid amount '{}': {}", amount, reason)
                }
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::MissingToken => "Authentication token is missing".to_string(),
                AuthError::InvalidToken { reason } => {
                    format!("Authentication token is invalid: {}", reason)
                }
                AuthError::Forbidden { reason } => reason.clone(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Domain(err) => {
                matches!(err, DomainError::FulfillmentInProgress { .. })
            }
            AppErrorKind::Infrastructure(err) => match err {
                InfrastructureError::Database { is_retryable, .. } => *is_retryable,
                InfrastructureError::Cache { .. } => true,
                InfrastructureError::Configuration { .. } => false,
            },
            AppErrorKind::External(err) => match err {
                ExternalError::PaymentProvider { is_retryable, .. } => *is_retryable,
                ExternalError::ShippingProvider { is_retryable, .. } => *is_retryable,
                ExternalError::Unavailable { .. } => true,
                ExternalError::Timeout { .. } => true,
            },
            AppErrorKind::Validation(_) | AppErrorKind::Auth(_) => false,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{} ({})", self.user_message(), context),
            None => write!(f, "{}", self.user_message()),
        }
    }
}

impl std::error::Error for AppError {}

/// Result type for operations that can fail with AppError
pub type AppResult<T> = Result<T, AppError>;
