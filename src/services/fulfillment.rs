//! Post-payment shipping workflow.
//!
//! Each step runs only from its own checkpoint and records the next one
//! before moving on, so a failed or interrupted run resumes where it stopped
//! instead of creating a second shipment or pickup.

use crate::config::PackageDimensions;
use crate::database::error::DatabaseError;
use crate::database::order_repository::{
    FulfillmentStage, Lease, Order, OrderRepository, StageUpdate,
};
use crate::services::notification::{Mailer, OrderConfirmation};
use crate::shipping::types::{ShipmentItem, ShipmentRequest};
use crate::shipping::{ShippingAggregator, ShippingError};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum FulfillmentError {
    #[error("{stage} step failed: {source}")]
    Shipping {
        /// Last checkpoint reached before the failing step
        stage: FulfillmentStage,
        #[source]
        source: ShippingError,
    },

    #[error("order {order_id} is no longer at stage {expected}")]
    StageConflict {
        order_id: Uuid,
        expected: FulfillmentStage,
    },

    #[error("order {order_id} is missing {field} at stage {stage}")]
    MissingReference {
        order_id: Uuid,
        stage: FulfillmentStage,
        field: &'static str,
    },

    #[error("processing lease on order {order_id} passed to another holder")]
    LeaseLost { order_id: Uuid },

    #[error("persistence error: {0}")]
    Persistence(#[from] DatabaseError),
}

impl From<FulfillmentError> for crate::error::AppError {
    fn from(err: FulfillmentError) -> Self {
        use crate::error::{AppError, AppErrorKind, DomainError};

        match err {
            FulfillmentError::Shipping { source, .. } => source.into(),
            FulfillmentError::StageConflict { order_id, expected } => {
                AppError::new(AppErrorKind::Domain(DomainError::InvalidStateTransition {
                    from: expected.to_string(),
                    to: format!("stored stage of order {}", order_id),
                }))
            }
            FulfillmentError::MissingReference {
                order_id,
                stage,
                field,
            } => AppError::new(AppErrorKind::Domain(DomainError::InvalidStateTransition {
                from: stage.to_string(),
                to: stage.next().map(|s| s.to_string()).unwrap_or_default(),
            }))
            .with_context(format!("order {} has no {}", order_id, field)),
            FulfillmentError::LeaseLost { order_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::FulfillmentInProgress {
                    order_id: order_id.to_string(),
                }))
            }
            FulfillmentError::Persistence(e) => e.into(),
        }
    }
}

/// Aggregator payload for an order; package size comes from configuration
pub fn build_shipment_request(order: &Order, package: &PackageDimensions) -> ShipmentRequest {
    let (first_name, last_name) = match order.billing.name.trim().split_once(' ') {
        Some((first, rest)) => (first.to_string(), rest.trim().to_string()),
        None => (order.billing.name.trim().to_string(), String::new()),
    };

    let billing_address = if order.billing.address.trim().is_empty() {
        order.address.clone()
    } else {
        order.billing.address.clone()
    };

    ShipmentRequest {
        order_id: order.id.to_string(),
        order_date: order.created_at.format("%Y-%m-%d %H:%M").to_string(),
        pickup_location: order.pickup_location.clone(),
        billing_customer_name: first_name,
        billing_last_name: last_name,
        billing_address,
        billing_city: order.billing.city.clone(),
        billing_pincode: order.billing.pincode.clone(),
        billing_state: order.billing.state.clone(),
        billing_country: order.billing.country.clone(),
        billing_email: order.billing.email.clone(),
        billing_phone: order.billing.phone.clone(),
        shipping_is_billing: true,
        order_items: order
            .items
            .iter()
            .enumerate()
            .map(|(idx, item)| ShipmentItem {
                name: item.title.clone(),
                sku: sku_for(item.title.as_str(), item.size.as_str(), idx),
                units: item.quantity,
                selling_price: item.price,
            })
            .collect(),
        payment_method: "Prepaid".to_string(),
        sub_total: order.totals.subtotal,
        length: package.length,
        breadth: package.breadth,
        height: package.height,
        weight: package.weight,
    }
}

fn sku_for(title: &str, size: &str, idx: usize) -> String {
    let base: String = title
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect::<String>()
        .to_uppercase();
    let base = if base.is_empty() { "ITEM".to_string() } else { base };
    if size.trim().is_empty() {
        format!("{}-{}", base, idx + 1)
    } else {
        format!("{}-{}-{}", base, size.trim().to_uppercase(), idx + 1)
    }
}

pub struct FulfillmentEngine {
    orders: Arc<dyn OrderRepository>,
    shipping: Arc<dyn ShippingAggregator>,
    mailer: Arc<dyn Mailer>,
    package: PackageDimensions,
    lease: Duration,
    /// How often a running step renews its lease
    heartbeat: std::time::Duration,
}

impl FulfillmentEngine {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        shipping: Arc<dyn ShippingAggregator>,
        mailer: Arc<dyn Mailer>,
        package: PackageDimensions,
        lease_secs: i64,
    ) -> Self {
        Self {
            orders,
            shipping,
            mailer,
            package,
            lease: Duration::seconds(lease_secs),
            heartbeat: std::time::Duration::from_millis(
                (lease_secs.max(1) as u64).saturating_mul(1000) / 3,
            ),
        }
    }

    /// Take the processing lease under a fresh token; `None` when the order
    /// is confirmed or someone else holds it
    pub async fn claim(&self, order_id: Uuid) -> Result<Option<Order>, DatabaseError> {
        let now = Utc::now();
        let lease = Lease {
            token: Uuid::new_v4(),
            expires_at: now + self.lease,
        };
        self.orders.claim_lease(order_id, now, lease).await
    }

    /// Give up a lease taken by [`claim`](Self::claim); a no-op once the
    /// lease has passed to someone else
    pub async fn release(&self, order: &Order) {
        let Some(token) = order.lease_token else { return };
        if let Err(e) = self.orders.release_lease(order.id, token).await {
            warn!(order_id = %order.id, error = %e, "failed to release fulfillment lease");
        }
    }

    /// Record the step that moves a leased order to its next stage and push
    /// the lease out by a full period
    pub async fn advance(
        &self,
        order: &Order,
        update: StageUpdate,
    ) -> Result<Order, FulfillmentError> {
        let from = order.fulfillment_stage;
        let conflict = FulfillmentError::StageConflict {
            order_id: order.id,
            expected: from,
        };
        let Some(to) = from.next() else {
            return Err(conflict);
        };
        let lease = Lease {
            token: self.token(order)?,
            expires_at: Utc::now() + self.lease,
        };
        self.orders
            .advance_stage(order.id, lease, from, to, update)
            .await?
            .ok_or(conflict)
    }

    /// Run the remaining shipping steps for a leased, paid order.
    ///
    /// On failure the furthest checkpoint stays persisted, `last_error` is
    /// recorded and the lease is released; status remains `Pending`.
    pub async fn drive(&self, order: Order) -> Result<Order, FulfillmentError> {
        let order_id = order.id;
        let token = self.token(&order)?;
        match self.advance_to_confirmed(order).await {
            Ok(confirmed) => {
                self.notify(&confirmed).await;
                Ok(confirmed)
            }
            Err(e) => {
                error!(order_id = %order_id, error = %e, "fulfillment stopped");
                if let Err(db) = self
                    .orders
                    .record_failure(order_id, token, &e.to_string())
                    .await
                {
                    error!(order_id = %order_id, error = %db, "failed to record fulfillment failure");
                }
                Err(e)
            }
        }
    }

    fn token(&self, order: &Order) -> Result<Uuid, FulfillmentError> {
        order
            .lease_token
            .ok_or(FulfillmentError::LeaseLost { order_id: order.id })
    }

    async fn advance_to_confirmed(&self, mut order: Order) -> Result<Order, FulfillmentError> {
        while !order.fulfillment_stage.is_terminal() {
            let update = self.run_step_leased(&order).await?;
            order = self.advance(&order, update).await?;

            info!(
                order_id = %order.id,
                stage = %order.fulfillment_stage,
                shipment_id = order.shipment_id.as_deref().unwrap_or(""),
                "fulfillment checkpoint recorded"
            );
        }
        Ok(order)
    }

    /// Run one step while renewing the lease every heartbeat. The step is
    /// abandoned as soon as a renewal finds the lease held by someone else.
    async fn run_step_leased(&self, order: &Order) -> Result<StageUpdate, FulfillmentError> {
        let token = self.token(order)?;
        let step = self.run_step(order);
        tokio::pin!(step);

        let mut heartbeat = tokio::time::interval_at(
            tokio::time::Instant::now() + self.heartbeat,
            self.heartbeat,
        );
        loop {
            tokio::select! {
                biased;
                result = &mut step => return result,
                _ = heartbeat.tick() => {
                    match self.orders.renew_lease(order.id, token, Utc::now() + self.lease).await {
                        Ok(true) => {
                            debug!(order_id = %order.id, stage = %order.fulfillment_stage, "lease renewed");
                        }
                        Ok(false) => {
                            warn!(
                                order_id = %order.id,
                                stage = %order.fulfillment_stage,
                                "lease lost mid-step, abandoning run"
                            );
                            return Err(FulfillmentError::LeaseLost { order_id: order.id });
                        }
                        Err(e) => {
                            warn!(order_id = %order.id, error = %e, "lease renewal failed");
                        }
                    }
                }
            }
        }
    }

    /// Perform the external call that moves `order` past its current stage
    async fn run_step(&self, order: &Order) -> Result<StageUpdate, FulfillmentError> {
        let stage = order.fulfillment_stage;
        let shipping_failed = |source: ShippingError| FulfillmentError::Shipping { stage, source };

        match stage {
            FulfillmentStage::AwaitingPayment => Err(FulfillmentError::MissingReference {
                order_id: order.id,
                stage,
                field: "verified payment",
            }),
            FulfillmentStage::PaymentVerified => {
                self.shipping.ensure_session().await.map_err(shipping_failed)?;
                let request = build_shipment_request(order, &self.package);
                let created = self
                    .shipping
                    .create_shipment(&request)
                    .await
                    .map_err(shipping_failed)?;
                Ok(StageUpdate {
                    shipment_id: Some(created.shipment_id),
                    ..Default::default()
                })
            }
            FulfillmentStage::ShipmentCreated => {
                let shipment_id = self.shipment_id(order)?;
                let awb = self
                    .shipping
                    .assign_awb(shipment_id)
                    .await
                    .map_err(shipping_failed)?;
                Ok(StageUpdate {
                    awb_code: Some(awb.awb_code),
                    ..Default::default()
                })
            }
            FulfillmentStage::AwbAssigned => {
                let shipment_id = self.shipment_id(order)?;
                self.shipping
                    .request_pickup(shipment_id)
                    .await
                    .map_err(shipping_failed)?;
                Ok(StageUpdate::default())
            }
            // Nothing external left; the next write flips the status
            FulfillmentStage::PickupRequested => Ok(StageUpdate::default()),
            FulfillmentStage::Confirmed => Ok(StageUpdate::default()),
        }
    }

    fn shipment_id<'a>(&self, order: &'a Order) -> Result<&'a str, FulfillmentError> {
        order
            .shipment_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or(FulfillmentError::MissingReference {
                order_id: order.id,
                stage: order.fulfillment_stage,
                field: "shipment_id",
            })
    }

    /// Best effort: a failed email never undoes a confirmed order
    async fn notify(&self, order: &Order) {
        let result = match OrderConfirmation::for_order(order) {
            Ok(confirmation) => self.mailer.send_order_confirmation(&confirmation).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!(order_id = %order.id, error = %e, "confirmation email not sent");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::order_repository::{BillingContact, LineItem, OrderStatus, Totals};
    use rust_decimal::Decimal;

    fn order() -> Order {
        let now = Utc::now();
        Order {
            id: Uuid::new_v4(),
            buyer_id: "buyer".to_string(),
            vendor_id: Uuid::new_v4(),
            address: "14 Residency Road".to_string(),
            items: vec![LineItem {
                title: "Block-print Kurta".to_string(),
                category: "apparel".to_string(),
                size: "m".to_string(),
                price: Decimal::from(450),
                quantity: 1,
            }],
            totals: Totals {
                subtotal: Decimal::from(450),
                tax: Decimal::from(50),
                shipping: Decimal::ZERO,
                total: Decimal::from(500),
            },
            billing: BillingContact {
                name: "Asha Rao Kumar".to_string(),
                address: String::new(),
                city: "Bengaluru".to_string(),
                pincode: "560025".to_string(),
                state: "Karnataka".to_string(),
                country: "India".to_string(),
                email: "asha@example.in".to_string(),
                phone: "9876543210".to_string(),
            },
            status: OrderStatus::Pending,
            fulfillment_stage: FulfillmentStage::PaymentVerified,
            gateway_order_id: Some("order_abc".to_string()),
            payment_id: Some("order_abc".to_string()),
            shipment_id: None,
            awb_code: None,
            pickup_location: "Primary".to_string(),
            last_error: None,
            fulfillment_attempts: 1,
            lease_expires_at: None,
            lease_token: Some(Uuid::new_v4()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn lost_lease_reads_as_in_progress() {
        let err: crate::error::AppError = FulfillmentError::LeaseLost {
            order_id: Uuid::new_v4(),
        }
        .into();
        assert_eq!(err.status_code(), 409);
        assert_eq!(
            err.error_code(),
            crate::error::ErrorCode::FulfillmentInProgress
        );
    }

    #[test]
    fn shipment_payload_uses_configured_package() {
        let package = PackageDimensions {
            length: 30.0,
            breadth: 20.0,
            height: 5.0,
            weight: 0.8,
        };
        let request = build_shipment_request(&order(), &package);

        assert_eq!(request.billing_customer_name, "Asha");
        assert_eq!(request.billing_last_name, "Rao Kumar");
        // empty billing address falls back to the shipping address
        assert_eq!(request.billing_address, "14 Residency Road");
        assert_eq!(request.pickup_location, "Primary");
        assert_eq!(request.order_items.len(), 1);
        assert_eq!(request.order_items[0].sku, "BLOCKPRINTKU-M-1");
        assert_eq!(request.weight, 0.8);
        assert_eq!(request.sub_total, Decimal::from(450));
    }
}
