use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::database::order_repository::OrderRepository;
use crate::services::fulfillment::FulfillmentEngine;

#[derive(Debug, Clone)]
pub struct FulfillmentRetryConfig {
    pub interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
}

impl Default for FulfillmentRetryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 20,
            max_attempts: 5,
        }
    }
}

/// Resumes paid orders whose shipping steps stopped part-way
pub struct FulfillmentRetryWorker {
    orders: Arc<dyn OrderRepository>,
    engine: Arc<FulfillmentEngine>,
    config: FulfillmentRetryConfig,
}

impl FulfillmentRetryWorker {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        engine: Arc<FulfillmentEngine>,
        config: FulfillmentRetryConfig,
    ) -> Self {
        Self {
            orders,
            engine,
            config,
        }
    }

    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            max_attempts = self.config.max_attempts,
            "fulfillment retry worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        info!("fulfillment retry worker stopping");
                        break;
                    }
                }
                _ = tokio::time::sleep(self.config.interval) => {
                    let resumed = self.run_cycle().await;
                    if resumed > 0 {
                        info!(confirmed = resumed, "resumed stalled fulfillments");
                    }
                }
            }
        }

        info!("fulfillment retry worker stopped");
    }

    /// One pass over resumable orders; returns how many reached `confirmed`
    pub async fn run_cycle(&self) -> usize {
        let candidates = match self
            .orders
            .find_resumable(
                chrono::Utc::now(),
                self.config.max_attempts,
                self.config.batch_size,
            )
            .await
        {
            Ok(orders) => orders,
            Err(e) => {
                error!(error = %e, "failed to load resumable orders");
                return 0;
            }
        };

        let mut confirmed = 0;
        for candidate in candidates {
            let order = match self.engine.claim(candidate.id).await {
                Ok(Some(order)) => order,
                Ok(None) => continue,
                Err(e) => {
                    warn!(order_id = %candidate.id, error = %e, "could not claim order");
                    continue;
                }
            };

            info!(
                order_id = %order.id,
                stage = %order.fulfillment_stage,
                attempt = order.fulfillment_attempts,
                "retrying fulfillment"
            );

            match self.engine.drive(order).await {
                Ok(_) => confirmed += 1,
                Err(e) => {
                    warn!(order_id = %candidate.id, error = %e, "fulfillment retry failed");
                }
            }
        }
        confirmed
    }
}
