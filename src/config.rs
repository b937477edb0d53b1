//! Application configuration module
//! Handles environment variable loading, configuration validation, and application settings

use crate::payments::providers::RazorpayConfig;
use crate::shipping::providers::ShiprocketConfig;
use crate::shipping::QuoteSelection;
use std::env;
use std::str::FromStr;

/// Main application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cache: CacheConfig,
    pub logging: LoggingConfig,
    pub payment: PaymentConfig,
    pub shipping: ShippingConfig,
    pub checkout: CheckoutConfig,
    pub mail: MailConfig,
    pub auth: AuthConfig,
    /// Run on in-memory stores without Postgres or Redis
    pub skip_externals: bool,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connection_timeout: u64,   // seconds
    pub idle_timeout: Option<u64>, // seconds
}

#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub redis_url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogFormat {
    Json,
    Plain,
}

/// Payment gateway credentials and call settings
#[derive(Debug, Clone)]
pub struct PaymentConfig {
    pub key_id: String,
    pub key_secret: String,
    pub base_url: String,
    pub currency: String,
    pub timeout_secs: u64,
}

/// Package dimensions sent with every shipment (cm / kg)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackageDimensions {
    pub length: f64,
    pub breadth: f64,
    pub height: f64,
    pub weight: f64,
}

impl Default for PackageDimensions {
    fn default() -> Self {
        Self {
            length: 10.0,
            breadth: 10.0,
            height: 10.0,
            weight: 0.5,
        }
    }
}

/// Shipping aggregator account and call settings
#[derive(Debug, Clone)]
pub struct ShippingConfig {
    pub email: String,
    pub password: String,
    pub base_url: String,
    pub timeout_secs: u64,
    pub max_get_retries: u32,
    pub token_ttl_secs: u64,
    pub quote_selection: QuoteSelection,
    pub package: PackageDimensions,
}

#[derive(Debug, Clone)]
pub struct CheckoutConfig {
    pub success_url: String,
    pub failed_url: String,
    /// How long one callback or worker run may hold an order
    pub lease_secs: i64,
    pub max_fulfillment_attempts: i32,
    pub retry_interval_secs: u64,
    pub retry_batch_size: i64,
}

#[derive(Debug, Clone)]
pub struct MailConfig {
    /// Mail relay endpoint; confirmation emails are skipped when unset
    pub service_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

fn parse_var<T: FromStr>(name: &str, default: &str) -> Result<T, ConfigError> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| ConfigError::InvalidValue(name.to_string()))
}

fn required_var(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingVariable(name.to_string()))
}

/// Upper bound on GET retries; the backoff doubles per attempt
const MAX_GET_RETRIES: u32 = 5;

fn validate_url(name: &str, value: &str) -> Result<(), ConfigError> {
    if !value.starts_with("http://") && !value.starts_with("https://") {
        return Err(ConfigError::InvalidValue(format!(
            "{} must be a valid http(s) URL",
            name
        )));
    }
    Ok(())
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenv::dotenv().ok();

        let skip_externals = env::var("SKIP_EXTERNALS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        Ok(AppConfig {
            server: ServerConfig::from_env()?,
            database: DatabaseConfig::from_env()?,
            cache: CacheConfig::from_env()?,
            logging: LoggingConfig::from_env()?,
            payment: PaymentConfig::from_env()?,
            shipping: ShippingConfig::from_env()?,
            checkout: CheckoutConfig::from_env()?,
            mail: MailConfig::from_env()?,
            auth: AuthConfig::from_env()?,
            skip_externals,
        })
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        if !self.skip_externals {
            self.database.validate()?;
            self.cache.validate()?;
        }
        self.logging.validate()?;
        self.payment.validate()?;
        self.shipping.validate()?;
        self.checkout.validate()?;
        self.checkout
            .validate_lease_covers(self.shipping.worst_case_step_secs())?;
        self.mail.validate()?;
        self.auth.validate()?;

        Ok(())
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(ServerConfig {
            host: env::var("SERVER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: parse_var("SERVER_PORT", "8000")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidValue(
                "SERVER_PORT cannot be 0".to_string(),
            ));
        }

        if self.host.is_empty() {
            return Err(ConfigError::InvalidValue(
                "SERVER_HOST cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(DatabaseConfig {
            url: env::var("DATABASE_URL").unwrap_or_default(),
            max_connections: parse_var("DB_MAX_CONNECTIONS", "20")?,
            min_connections: parse_var("DB_MIN_CONNECTIONS", "5")?,
            connection_timeout: parse_var("DB_CONNECTION_TIMEOUT", "30")?,
            idle_timeout: env::var("DB_IDLE_TIMEOUT")
                .ok()
                .and_then(|val| val.parse().ok()),
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.url.is_empty() {
            return Err(ConfigError::MissingVariable("DATABASE_URL".to_string()));
        }

        if self.max_connections == 0 {
            return Err(ConfigError::InvalidValue("DB_MAX_CONNECTIONS".to_string()));
        }

        if self.min_connections > self.max_connections {
            return Err(ConfigError::InvalidValue(
                "DB_MIN_CONNECTIONS must be <= DB_MAX_CONNECTIONS".to_string(),
            ));
        }

        Ok(())
    }
}

impl CacheConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CacheConfig {
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
            max_connections: parse_var("CACHE_MAX_CONNECTIONS", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(ConfigError::InvalidValue(
                "REDIS_URL must start with redis:// or rediss://".to_string(),
            ));
        }

        Ok(())
    }
}

impl LoggingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "INFO".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "plain".to_string())
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Plain,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["TRACE", "DEBUG", "INFO", "WARN", "ERROR"];
        if !valid_levels.contains(&self.level.to_uppercase().as_str()) {
            return Err(ConfigError::InvalidValue("LOG_LEVEL".to_string()));
        }

        Ok(())
    }
}

impl PaymentConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(PaymentConfig {
            key_id: required_var("RAZORPAY_KEY_ID")?,
            key_secret: required_var("RAZORPAY_KEY_SECRET")?,
            base_url: env::var("RAZORPAY_BASE_URL")
                .unwrap_or_else(|_| "https://api.razorpay.com".to_string()),
            currency: env::var("PAYMENT_CURRENCY").unwrap_or_else(|_| "INR".to_string()),
            timeout_secs: parse_var("RAZORPAY_TIMEOUT_SECS", "15")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.key_id.is_empty() || self.key_secret.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "RAZORPAY_KEY_ID and RAZORPAY_KEY_SECRET must be non-empty".to_string(),
            ));
        }
        if self.currency.len() != 3 {
            return Err(ConfigError::InvalidValue("PAYMENT_CURRENCY".to_string()));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("RAZORPAY_TIMEOUT_SECS".to_string()));
        }
        validate_url("RAZORPAY_BASE_URL", &self.base_url)
    }

    pub fn razorpay(&self) -> RazorpayConfig {
        RazorpayConfig {
            key_id: self.key_id.clone(),
            key_secret: self.key_secret.clone(),
            base_url: self.base_url.clone(),
            currency: self.currency.clone(),
            timeout_secs: self.timeout_secs,
        }
    }
}

impl ShippingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = PackageDimensions::default();
        Ok(ShippingConfig {
            email: required_var("SHIPROCKET_EMAIL")?,
            password: required_var("SHIPROCKET_PASSWORD")?,
            base_url: env::var("SHIPROCKET_BASE_URL")
                .unwrap_or_else(|_| "https://apiv2.shiprocket.in".to_string()),
            timeout_secs: parse_var("SHIPROCKET_TIMEOUT_SECS", "20")?,
            max_get_retries: parse_var("SHIPROCKET_MAX_GET_RETRIES", "2")?,
            // Aggregator tokens are valid for ten days
            token_ttl_secs: parse_var("SHIPROCKET_TOKEN_TTL_SECS", "777600")?,
            quote_selection: parse_var("SHIPPING_QUOTE_POLICY", QuoteSelection::default().as_str())?,
            package: PackageDimensions {
                length: parse_var("PACKAGE_LENGTH_CM", &defaults.length.to_string())?,
                breadth: parse_var("PACKAGE_BREADTH_CM", &defaults.breadth.to_string())?,
                height: parse_var("PACKAGE_HEIGHT_CM", &defaults.height.to_string())?,
                weight: parse_var("PACKAGE_WEIGHT_KG", &defaults.weight.to_string())?,
            },
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.email.is_empty() || self.password.is_empty() {
            return Err(ConfigError::ValidationFailed(
                "SHIPROCKET_EMAIL and SHIPROCKET_PASSWORD must be non-empty".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ConfigError::InvalidValue("SHIPROCKET_TIMEOUT_SECS".to_string()));
        }
        if self.max_get_retries > MAX_GET_RETRIES {
            return Err(ConfigError::ValidationFailed(format!(
                "SHIPROCKET_MAX_GET_RETRIES must be at most {}",
                MAX_GET_RETRIES
            )));
        }
        if self.token_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue("SHIPROCKET_TOKEN_TTL_SECS".to_string()));
        }
        let p = &self.package;
        if [p.length, p.breadth, p.height, p.weight]
            .iter()
            .any(|v| !v.is_finite() || *v <= 0.0)
        {
            return Err(ConfigError::ValidationFailed(
                "package dimensions and weight must be positive".to_string(),
            ));
        }
        validate_url("SHIPROCKET_BASE_URL", &self.base_url)
    }

    /// Longest a single fulfilment step can take: login and call, then a
    /// re-login and retried call after a rejected token
    pub fn worst_case_step_secs(&self) -> i64 {
        i64::try_from(self.timeout_secs.saturating_mul(4)).unwrap_or(i64::MAX)
    }

    pub fn shiprocket(&self) -> ShiprocketConfig {
        ShiprocketConfig {
            email: self.email.clone(),
            password: self.password.clone(),
            base_url: self.base_url.clone(),
            timeout_secs: self.timeout_secs,
            max_get_retries: self.max_get_retries,
            quote_selection: self.quote_selection,
        }
    }
}

impl CheckoutConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(CheckoutConfig {
            success_url: required_var("SUCCESS_URL")?,
            failed_url: required_var("FAILED_URL")?,
            lease_secs: parse_var("FULFILLMENT_LEASE_SECS", "120")?,
            max_fulfillment_attempts: parse_var("FULFILLMENT_MAX_ATTEMPTS", "5")?,
            retry_interval_secs: parse_var("FULFILLMENT_RETRY_INTERVAL_SECS", "60")?,
            retry_batch_size: parse_var("FULFILLMENT_RETRY_BATCH_SIZE", "20")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_url("SUCCESS_URL", &self.success_url)?;
        validate_url("FAILED_URL", &self.failed_url)?;
        if self.lease_secs <= 0 {
            return Err(ConfigError::InvalidValue("FULFILLMENT_LEASE_SECS".to_string()));
        }
        if self.max_fulfillment_attempts <= 0 {
            return Err(ConfigError::InvalidValue("FULFILLMENT_MAX_ATTEMPTS".to_string()));
        }
        if self.retry_interval_secs == 0 || self.retry_batch_size <= 0 {
            return Err(ConfigError::ValidationFailed(
                "fulfillment retry interval and batch size must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

impl CheckoutConfig {
    /// The lease must outlive one step so a slow call is not taken over
    /// between heartbeats
    pub fn validate_lease_covers(&self, step_secs: i64) -> Result<(), ConfigError> {
        if self.lease_secs <= step_secs {
            return Err(ConfigError::ValidationFailed(format!(
                "FULFILLMENT_LEASE_SECS ({}) must exceed the longest shipping step ({}s)",
                self.lease_secs, step_secs
            )));
        }
        Ok(())
    }
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            success_url: "http://localhost:3000/payment/success".to_string(),
            failed_url: "http://localhost:3000/payment/failed".to_string(),
            lease_secs: 120,
            max_fulfillment_attempts: 5,
            retry_interval_secs: 60,
            retry_batch_size: 20,
        }
    }
}

impl MailConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(MailConfig {
            service_url: env::var("MAIL_SERVICE_URL").ok().filter(|v| !v.is_empty()),
            timeout_secs: parse_var("MAIL_TIMEOUT_SECS", "10")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.service_url {
            Some(url) => validate_url("MAIL_SERVICE_URL", url),
            None => Ok(()),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(AuthConfig {
            jwt_secret: required_var("JWT_SECRET")?,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.len() < 16 {
            return Err(ConfigError::ValidationFailed(
                "JWT_SECRET must be at least 16 characters".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for configuration: {0}")]
    InvalidValue(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8000,
        };

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_port_validation() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redirect_urls_must_be_http() {
        let config = CheckoutConfig {
            success_url: "ftp://shop.example/ok".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
        assert!(CheckoutConfig::default().validate().is_ok());
    }

    #[test]
    fn test_package_dimensions_must_be_positive() {
        let mut config = ShippingConfig {
            email: "ops@store.in".to_string(),
            password: "secret".to_string(),
            base_url: "https://apiv2.shiprocket.in".to_string(),
            timeout_secs: 20,
            max_get_retries: 2,
            token_ttl_secs: 3600,
            quote_selection: QuoteSelection::LowestRate,
            package: PackageDimensions::default(),
        };
        assert!(config.validate().is_ok());

        config.package.weight = 0.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    fn shipping() -> ShippingConfig {
        ShippingConfig {
            email: "ops@store.in".to_string(),
            password: "secret".to_string(),
            base_url: "https://apiv2.shiprocket.in".to_string(),
            timeout_secs: 20,
            max_get_retries: 2,
            token_ttl_secs: 3600,
            quote_selection: QuoteSelection::LowestRate,
            package: PackageDimensions::default(),
        }
    }

    #[test]
    fn test_lease_must_outlast_slowest_step() {
        let shipping = shipping();
        assert_eq!(shipping.worst_case_step_secs(), 80);

        let checkout = CheckoutConfig::default();
        assert!(checkout
            .validate_lease_covers(shipping.worst_case_step_secs())
            .is_ok());

        let short = CheckoutConfig {
            lease_secs: 60,
            ..Default::default()
        };
        assert!(matches!(
            short.validate_lease_covers(shipping.worst_case_step_secs()),
            Err(ConfigError::ValidationFailed(_))
        ));
        let exact = CheckoutConfig {
            lease_secs: 80,
            ..Default::default()
        };
        assert!(exact
            .validate_lease_covers(shipping.worst_case_step_secs())
            .is_err());
    }

    #[test]
    fn test_get_retries_are_capped() {
        let mut config = shipping();
        config.max_get_retries = 5;
        assert!(config.validate().is_ok());

        config.max_get_retries = 40;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_short_jwt_secret_is_rejected() {
        let config = AuthConfig {
            jwt_secret: "short".to_string(),
        };
        assert!(config.validate().is_err());
    }
}
