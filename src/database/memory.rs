//! In-process repositories used when `SKIP_EXTERNALS` is set and by tests

use crate::database::error::DatabaseError;
use crate::database::order_repository::{
    FulfillmentStage, Lease, NewOrder, Order, OrderRepository, OrderStatus, StageUpdate,
};
use crate::database::user_repository::{User, UserRepository};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Overwrite a stored order; lets tests stage arbitrary checkpoints
    pub async fn put(&self, order: Order) {
        self.orders.write().await.insert(order.id, order);
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
        let now = Utc::now();
        let stored = Order {
            id: Uuid::new_v4(),
            buyer_id: order.buyer_id,
            vendor_id: order.vendor_id,
            address: order.address,
            items: order.items,
            totals: order.totals,
            billing: order.billing,
            status: OrderStatus::Pending,
            fulfillment_stage: FulfillmentStage::AwaitingPayment,
            gateway_order_id: None,
            payment_id: None,
            shipment_id: None,
            awb_code: None,
            pickup_location: order.pickup_location,
            last_error: None,
            fulfillment_attempts: 0,
            lease_expires_at: None,
            lease_token: None,
            created_at: now,
            updated_at: now,
        };
        self.orders.write().await.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn record_gateway_order(
        &self,
        id: Uuid,
        gateway_order_id: &str,
    ) -> Result<Order, DatabaseError> {
        let mut orders = self.orders.write().await;
        let order = orders
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("order", id))?;
        order.gateway_order_id = Some(gateway_order_id.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn claim_lease(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease: Lease,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.status != OrderStatus::Pending || order.lease_held_at(now) {
            return Ok(None);
        }
        order.lease_expires_at = Some(lease.expires_at);
        order.lease_token = Some(lease.token);
        order.fulfillment_attempts += 1;
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn renew_lease(
        &self,
        id: Uuid,
        token: Uuid,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, DatabaseError> {
        let mut orders = self.orders.write().await;
        match orders.get_mut(&id) {
            Some(order)
                if order.status == OrderStatus::Pending && order.lease_token == Some(token) =>
            {
                order.lease_expires_at = Some(lease_until);
                order.updated_at = Utc::now();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn advance_stage(
        &self,
        id: Uuid,
        lease: Lease,
        from: FulfillmentStage,
        to: FulfillmentStage,
        update: StageUpdate,
    ) -> Result<Option<Order>, DatabaseError> {
        let mut orders = self.orders.write().await;
        let Some(order) = orders.get_mut(&id) else {
            return Ok(None);
        };
        if order.fulfillment_stage != from
            || order.status != OrderStatus::Pending
            || order.lease_token != Some(lease.token)
        {
            return Ok(None);
        }

        order.fulfillment_stage = to;
        if update.payment_id.is_some() {
            order.payment_id = update.payment_id;
        }
        if update.shipment_id.is_some() {
            order.shipment_id = update.shipment_id;
        }
        if update.awb_code.is_some() {
            order.awb_code = update.awb_code;
        }
        if to == FulfillmentStage::Confirmed {
            order.status = OrderStatus::Confirmed;
            order.lease_expires_at = None;
            order.lease_token = None;
            order.last_error = None;
        } else {
            order.lease_expires_at = Some(lease.expires_at);
        }
        order.updated_at = Utc::now();
        Ok(Some(order.clone()))
    }

    async fn record_failure(
        &self,
        id: Uuid,
        token: Uuid,
        message: &str,
    ) -> Result<(), DatabaseError> {
        let mut orders = self.orders.write().await;
        if let Some(order) = orders.get_mut(&id).filter(|o| o.lease_token == Some(token)) {
            order.last_error = Some(message.to_string());
            order.lease_expires_at = None;
            order.lease_token = None;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn release_lease(&self, id: Uuid, token: Uuid) -> Result<(), DatabaseError> {
        let mut orders = self.orders.write().await;
        if let Some(order) = orders.get_mut(&id).filter(|o| o.lease_token == Some(token)) {
            order.lease_expires_at = None;
            order.lease_token = None;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn find_resumable(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| {
                o.status == OrderStatus::Pending
                    && o.fulfillment_stage.is_resumable()
                    && !o.lease_held_at(now)
                    && o.fulfillment_attempts < max_attempts
            })
            .cloned()
            .collect();
        found.sort_by_key(|o| o.updated_at);
        found.truncate(limit.max(0) as usize);
        Ok(found)
    }

    async fn list_by_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>, DatabaseError> {
        let orders = self.orders.read().await;
        let mut found: Vec<Order> = orders
            .values()
            .filter(|o| o.vendor_id == vendor_id)
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(found)
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<Uuid, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user: User) {
        self.users.write().await.insert(user.id, user);
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, DatabaseError> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn find_brands_by_pickup_location(
        &self,
        pickup_location: &str,
    ) -> Result<Vec<User>, DatabaseError> {
        let users = self.users.read().await;
        let mut found: Vec<User> = users
            .values()
            .filter(|u| u.is_brand && u.pickup_location.as_deref() == Some(pickup_location))
            .cloned()
            .collect();
        found.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(found)
    }

    async fn update_pickup_location(
        &self,
        id: Uuid,
        pickup_location: &str,
    ) -> Result<(), DatabaseError> {
        let mut users = self.users.write().await;
        let user = users
            .get_mut(&id)
            .ok_or_else(|| DatabaseError::not_found("user", id))?;
        user.pickup_location = Some(pickup_location.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::order_repository::{BillingContact, Totals};
    use chrono::Duration;
    use rust_decimal::Decimal;

    fn new_order() -> NewOrder {
        NewOrder {
            buyer_id: "buyer-1".to_string(),
            vendor_id: Uuid::new_v4(),
            address: "12 MG Road".to_string(),
            items: vec![],
            totals: Totals {
                subtotal: Decimal::from(450),
                tax: Decimal::from(50),
                shipping: Decimal::ZERO,
                total: Decimal::from(500),
            },
            billing: BillingContact::default(),
            pickup_location: "Primary".to_string(),
        }
    }

    fn lease(until: DateTime<Utc>) -> Lease {
        Lease {
            token: Uuid::new_v4(),
            expires_at: until,
        }
    }

    #[tokio::test]
    async fn lease_is_exclusive_until_expiry() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(new_order()).await.unwrap();
        let now = Utc::now();

        let first = repo
            .claim_lease(order.id, now, lease(now + Duration::seconds(30)))
            .await
            .unwrap();
        assert!(first.is_some());

        let second = repo
            .claim_lease(order.id, now, lease(now + Duration::seconds(30)))
            .await
            .unwrap();
        assert!(second.is_none());

        let later = now + Duration::seconds(31);
        let third = repo
            .claim_lease(order.id, later, lease(later + Duration::seconds(30)))
            .await
            .unwrap();
        assert_eq!(third.map(|o| o.fulfillment_attempts), Some(2));
    }

    #[tokio::test]
    async fn advance_requires_expected_stage_and_extends_lease() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(new_order()).await.unwrap();
        let now = Utc::now();
        let held = lease(now + Duration::seconds(30));
        repo.claim_lease(order.id, now, held).await.unwrap().unwrap();

        let skipped = repo
            .advance_stage(
                order.id,
                held,
                FulfillmentStage::PaymentVerified,
                FulfillmentStage::ShipmentCreated,
                StageUpdate::default(),
            )
            .await
            .unwrap();
        assert!(skipped.is_none());

        let extended = Lease {
            expires_at: now + Duration::seconds(90),
            ..held
        };
        let advanced = repo
            .advance_stage(
                order.id,
                extended,
                FulfillmentStage::AwaitingPayment,
                FulfillmentStage::PaymentVerified,
                StageUpdate {
                    payment_id: Some("order_abc".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(advanced.payment_id.as_deref(), Some("order_abc"));
        assert_eq!(advanced.status, OrderStatus::Pending);
        assert_eq!(advanced.lease_expires_at, Some(extended.expires_at));
    }

    #[tokio::test]
    async fn expired_holder_cannot_write_over_new_holder() {
        let repo = InMemoryOrderRepository::new();
        let order = repo.insert(new_order()).await.unwrap();
        let now = Utc::now();

        let stale = lease(now + Duration::seconds(1));
        repo.claim_lease(order.id, now, stale).await.unwrap().unwrap();

        let later = now + Duration::seconds(5);
        let current = lease(later + Duration::seconds(30));
        repo.claim_lease(order.id, later, current)
            .await
            .unwrap()
            .unwrap();

        let advanced = repo
            .advance_stage(
                order.id,
                stale,
                FulfillmentStage::AwaitingPayment,
                FulfillmentStage::PaymentVerified,
                StageUpdate::default(),
            )
            .await
            .unwrap();
        assert!(advanced.is_none());
        assert!(!repo
            .renew_lease(order.id, stale.token, later + Duration::seconds(60))
            .await
            .unwrap());
        repo.record_failure(order.id, stale.token, "timed out")
            .await
            .unwrap();
        repo.release_lease(order.id, stale.token).await.unwrap();

        let stored = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert_eq!(stored.lease_token, Some(current.token));
        assert_eq!(stored.lease_expires_at, Some(current.expires_at));
        assert_eq!(stored.fulfillment_stage, FulfillmentStage::AwaitingPayment);
        assert!(stored.last_error.is_none());

        assert!(repo
            .renew_lease(order.id, current.token, later + Duration::seconds(60))
            .await
            .unwrap());
        repo.release_lease(order.id, current.token).await.unwrap();
        let released = repo.find_by_id(order.id).await.unwrap().unwrap();
        assert!(released.lease_token.is_none());
        assert!(released.lease_expires_at.is_none());
    }
}
