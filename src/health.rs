//! Health check module
//! Provides health status for the application and its dependencies

use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{error, info};

#[cfg(feature = "cache")]
use crate::cache::RedisPool;
use crate::shipping::ShippingAggregator;

/// Health status response
#[derive(Debug, Serialize, Clone)]
pub struct HealthStatus {
    pub status: HealthState,
    pub checks: HashMap<String, ComponentHealth>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

/// Overall health state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Individual component health status
#[derive(Debug, Serialize, Clone)]
pub struct ComponentHealth {
    pub status: ComponentState,
    pub response_time_ms: Option<u128>,
    pub details: Option<String>,
}

/// Component state
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub enum ComponentState {
    Up,
    Down,
    Warning,
}

impl HealthStatus {
    pub fn new() -> Self {
        Self {
            status: HealthState::Healthy,
            checks: HashMap::new(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self.status, HealthState::Healthy)
    }

    /// Ready to take traffic: nothing is down
    pub fn is_ready(&self) -> bool {
        !matches!(self.status, HealthState::Unhealthy)
    }

    fn finalize(mut self) -> Self {
        let states = self.checks.values().map(|c| &c.status);
        self.status = if states.clone().any(|s| *s == ComponentState::Down) {
            HealthState::Unhealthy
        } else if states.into_iter().any(|s| *s == ComponentState::Warning) {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };
        self
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl ComponentHealth {
    pub fn up(response_time_ms: Option<u128>) -> Self {
        Self {
            status: ComponentState::Up,
            response_time_ms,
            details: None,
        }
    }

    pub fn down(details: Option<String>) -> Self {
        Self {
            status: ComponentState::Down,
            response_time_ms: None,
            details,
        }
    }

    pub fn warning(response_time_ms: Option<u128>, details: Option<String>) -> Self {
        Self {
            status: ComponentState::Warning,
            response_time_ms,
            details,
        }
    }
}

type CheckResult = Result<u128, Box<dyn std::error::Error + Send + Sync>>;

async fn timed_check<F>(name: &str, limit: Duration, check: F) -> ComponentHealth
where
    F: Future<Output = CheckResult>,
{
    match timeout(limit, check).await {
        Ok(Ok(response_time)) => {
            info!("{} health check: OK ({}ms)", name, response_time);
            ComponentHealth::up(Some(response_time))
        }
        Ok(Err(e)) => {
            error!("{} health check failed: {}", name, e);
            ComponentHealth::down(Some(e.to_string()))
        }
        Err(_) => {
            error!("{} health check timed out", name);
            ComponentHealth::down(Some("Timeout".to_string()))
        }
    }
}

/// Health checker for the application
#[derive(Clone)]
pub struct HealthChecker {
    #[cfg(feature = "database")]
    db_pool: Option<sqlx::PgPool>,
    #[cfg(feature = "cache")]
    cache: Option<RedisPool>,
    shipping: Arc<dyn ShippingAggregator>,
}

impl HealthChecker {
    pub fn new(shipping: Arc<dyn ShippingAggregator>) -> Self {
        Self {
            #[cfg(feature = "database")]
            db_pool: None,
            #[cfg(feature = "cache")]
            cache: None,
            shipping,
        }
    }

    #[cfg(feature = "database")]
    pub fn with_database(mut self, pool: sqlx::PgPool) -> Self {
        self.db_pool = Some(pool);
        self
    }

    #[cfg(feature = "cache")]
    pub fn with_cache(mut self, pool: RedisPool) -> Self {
        self.cache = Some(pool);
        self
    }

    /// Perform comprehensive health check
    pub async fn check_health(&self) -> HealthStatus {
        let mut health_status = HealthStatus::new();

        #[cfg(feature = "database")]
        if let Some(pool) = &self.db_pool {
            let check = timed_check("Database", Duration::from_secs(5), check_database_health(pool)).await;
            health_status.checks.insert("database".to_string(), check);
        }

        #[cfg(feature = "cache")]
        if let Some(pool) = &self.cache {
            let check = timed_check("Cache", Duration::from_secs(5), check_cache_health(pool)).await;
            health_status.checks.insert("cache".to_string(), check);
        }

        // The aggregator session is opened lazily, so a missing token is only a warning
        let shipping = if self.shipping.session_active().await {
            ComponentHealth::up(None)
        } else {
            ComponentHealth::warning(None, Some("no active shipping session".to_string()))
        };
        health_status
            .checks
            .insert("shipping_session".to_string(), shipping);

        health_status.finalize()
    }
}

#[cfg(feature = "database")]
pub async fn check_database_health(pool: &sqlx::PgPool) -> CheckResult {
    let start = Instant::now();
    crate::database::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(feature = "cache")]
pub async fn check_cache_health(pool: &RedisPool) -> CheckResult {
    let start = Instant::now();
    crate::cache::health_check(pool).await?;
    Ok(start.elapsed().as_millis())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_status_creation() {
        let health_status = HealthStatus::new();
        assert!(matches!(health_status.status, HealthState::Healthy));
        assert!(health_status.checks.is_empty());
        assert!(health_status.timestamp <= chrono::Utc::now());
    }

    #[test]
    fn test_component_health_states() {
        let up_health = ComponentHealth::up(Some(100));
        assert!(matches!(up_health.status, ComponentState::Up));
        assert_eq!(up_health.response_time_ms, Some(100));

        let down_health = ComponentHealth::down(Some("Test error".to_string()));
        assert!(matches!(down_health.status, ComponentState::Down));
        assert_eq!(down_health.details, Some("Test error".to_string()));
    }

    #[test]
    fn test_overall_state_follows_worst_component() {
        let mut status = HealthStatus::new();
        status
            .checks
            .insert("a".to_string(), ComponentHealth::up(Some(1)));
        status.checks.insert(
            "b".to_string(),
            ComponentHealth::warning(None, Some("slow".to_string())),
        );
        let status = status.finalize();
        assert_eq!(status.status, HealthState::Degraded);
        assert!(status.is_ready());

        let mut status = HealthStatus::new();
        status
            .checks
            .insert("db".to_string(), ComponentHealth::down(None));
        assert!(!status.finalize().is_ready());
    }
}
