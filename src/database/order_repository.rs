use crate::database::error::DatabaseError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Customer-visible order status. Wire strings are kept as the storefront
/// frontend expects them: `Pending` and `confirmed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    #[serde(rename = "Pending")]
    Pending,
    #[serde(rename = "confirmed")]
    Confirmed,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "Pending",
            OrderStatus::Confirmed => "confirmed",
        }
    }

    pub fn from_db_status(status: &str) -> Option<Self> {
        match status {
            "Pending" | "pending" => Some(OrderStatus::Pending),
            "confirmed" | "Confirmed" => Some(OrderStatus::Confirmed),
            _ => None,
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fulfilment checkpoint recorded after every completed step of the
/// post-payment workflow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FulfillmentStage {
    /// Order persisted, no verified payment yet
    AwaitingPayment,
    PaymentVerified,
    ShipmentCreated,
    AwbAssigned,
    PickupRequested,
    Confirmed,
}

impl FulfillmentStage {
    /// Stages are strictly sequential; each one has a single successor
    pub fn next(&self) -> Option<FulfillmentStage> {
        match self {
            FulfillmentStage::AwaitingPayment => Some(FulfillmentStage::PaymentVerified),
            FulfillmentStage::PaymentVerified => Some(FulfillmentStage::ShipmentCreated),
            FulfillmentStage::ShipmentCreated => Some(FulfillmentStage::AwbAssigned),
            FulfillmentStage::AwbAssigned => Some(FulfillmentStage::PickupRequested),
            FulfillmentStage::PickupRequested => Some(FulfillmentStage::Confirmed),
            FulfillmentStage::Confirmed => None,
        }
    }

    pub fn can_advance_to(&self, to: FulfillmentStage) -> bool {
        self.next() == Some(to)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, FulfillmentStage::Confirmed)
    }

    /// Payment has been verified but shipping has not finished
    pub fn is_resumable(&self) -> bool {
        !matches!(
            self,
            FulfillmentStage::AwaitingPayment | FulfillmentStage::Confirmed
        )
    }

    pub fn from_db_stage(stage: &str) -> Option<Self> {
        match stage {
            "awaiting_payment" => Some(FulfillmentStage::AwaitingPayment),
            "payment_verified" => Some(FulfillmentStage::PaymentVerified),
            "shipment_created" => Some(FulfillmentStage::ShipmentCreated),
            "awb_assigned" => Some(FulfillmentStage::AwbAssigned),
            "pickup_requested" => Some(FulfillmentStage::PickupRequested),
            "confirmed" => Some(FulfillmentStage::Confirmed),
            _ => None,
        }
    }

    pub fn to_db_stage(&self) -> &'static str {
        match self {
            FulfillmentStage::AwaitingPayment => "awaiting_payment",
            FulfillmentStage::PaymentVerified => "payment_verified",
            FulfillmentStage::ShipmentCreated => "shipment_created",
            FulfillmentStage::AwbAssigned => "awb_assigned",
            FulfillmentStage::PickupRequested => "pickup_requested",
            FulfillmentStage::Confirmed => "confirmed",
        }
    }
}

impl std::fmt::Display for FulfillmentStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.to_db_stage())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub title: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub size: String,
    pub price: Decimal,
    pub quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Decimal,
    pub tax: Decimal,
    pub shipping: Decimal,
    pub total: Decimal,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BillingContact {
    pub name: String,
    pub address: String,
    pub city: String,
    pub pincode: String,
    pub state: String,
    pub country: String,
    pub email: String,
    pub phone: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub buyer_id: String,
    pub vendor_id: Uuid,
    pub address: String,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub billing: BillingContact,
    pub status: OrderStatus,
    pub fulfillment_stage: FulfillmentStage,
    /// Gateway order intent id recorded when the order was created
    pub gateway_order_id: Option<String>,
    /// Gateway order id confirmed by a verified payment callback
    pub payment_id: Option<String>,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
    pub pickup_location: String,
    pub last_error: Option<String>,
    pub fulfillment_attempts: i32,
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Identifies the current lease holder; writes from any other holder
    /// are ignored
    #[serde(skip)]
    pub lease_token: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    pub fn is_confirmed(&self) -> bool {
        self.status == OrderStatus::Confirmed
    }

    pub fn lease_held_at(&self, now: DateTime<Utc>) -> bool {
        self.lease_expires_at.map(|until| until > now).unwrap_or(false)
    }
}

/// Values needed to persist a new order; the id is assigned by storage
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub buyer_id: String,
    pub vendor_id: Uuid,
    pub address: String,
    pub items: Vec<LineItem>,
    pub totals: Totals,
    pub billing: BillingContact,
    pub pickup_location: String,
}

/// Processing lease taken by one callback or worker run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub token: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Provider references captured alongside a stage transition
#[derive(Debug, Clone, Default)]
pub struct StageUpdate {
    pub payment_id: Option<String>,
    pub shipment_id: Option<String>,
    pub awb_code: Option<String>,
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a new order with status `Pending`
    async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError>;

    async fn record_gateway_order(
        &self,
        id: Uuid,
        gateway_order_id: &str,
    ) -> Result<Order, DatabaseError>;

    /// Atomically take the processing lease on a pending order.
    ///
    /// Returns `None` when the order is confirmed or another holder's lease
    /// has not yet expired at `now`.
    async fn claim_lease(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
        lease: Lease,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Push the expiry of a lease still held under `token`. Returns `false`
    /// when the lease has passed to another holder or was released.
    async fn renew_lease(
        &self,
        id: Uuid,
        token: Uuid,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, DatabaseError>;

    /// Move the checkpoint from `from` to `to` under `lease`, recording any
    /// provider references and extending the lease to `lease.expires_at`.
    /// Advancing to `Confirmed` also flips the status and releases the
    /// lease. Returns `None` when the stored stage is no longer `from` or
    /// the lease is held under another token.
    async fn advance_stage(
        &self,
        id: Uuid,
        lease: Lease,
        from: FulfillmentStage,
        to: FulfillmentStage,
        update: StageUpdate,
    ) -> Result<Option<Order>, DatabaseError>;

    /// Record why fulfilment stopped and release the lease held under `token`
    async fn record_failure(
        &self,
        id: Uuid,
        token: Uuid,
        message: &str,
    ) -> Result<(), DatabaseError>;

    async fn release_lease(&self, id: Uuid, token: Uuid) -> Result<(), DatabaseError>;

    /// Paid, unconfirmed orders whose lease is free and that have not used up
    /// their attempts, oldest first
    async fn find_resumable(
        &self,
        now: DateTime<Utc>,
        max_attempts: i32,
        limit: i64,
    ) -> Result<Vec<Order>, DatabaseError>;

    async fn list_by_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>, DatabaseError>;
}

#[cfg(feature = "database")]
pub use pg::PgOrderRepository;

#[cfg(feature = "database")]
mod pg {
    use super::*;
    use sqlx::types::Json;
    use sqlx::{FromRow, PgPool};

    const ORDER_COLUMNS: &str = "id, buyer_id, vendor_id, address, items, \
         subtotal, tax, shipping, total, \
         billing_name, billing_address, billing_city, billing_pincode, billing_state, \
         billing_country, billing_email, billing_phone, \
         status, fulfillment_stage, gateway_order_id, payment_id, shipment_id, awb_code, \
         pickup_location, last_error, fulfillment_attempts, lease_expires_at, lease_token, \
         created_at, updated_at";

    #[derive(Debug, FromRow)]
    struct OrderRow {
        id: Uuid,
        buyer_id: String,
        vendor_id: Uuid,
        address: String,
        items: Json<Vec<LineItem>>,
        subtotal: Decimal,
        tax: Decimal,
        shipping: Decimal,
        total: Decimal,
        billing_name: String,
        billing_address: String,
        billing_city: String,
        billing_pincode: String,
        billing_state: String,
        billing_country: String,
        billing_email: String,
        billing_phone: String,
        status: String,
        fulfillment_stage: String,
        gateway_order_id: Option<String>,
        payment_id: Option<String>,
        shipment_id: Option<String>,
        awb_code: Option<String>,
        pickup_location: String,
        last_error: Option<String>,
        fulfillment_attempts: i32,
        lease_expires_at: Option<DateTime<Utc>>,
        lease_token: Option<Uuid>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    }

    impl TryFrom<OrderRow> for Order {
        type Error = DatabaseError;

        fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
            let status = OrderStatus::from_db_status(&row.status).ok_or_else(|| {
                DatabaseError::decode(format!("unknown order status '{}'", row.status))
            })?;
            let fulfillment_stage = FulfillmentStage::from_db_stage(&row.fulfillment_stage)
                .ok_or_else(|| {
                    DatabaseError::decode(format!(
                        "unknown fulfillment stage '{}'",
                        row.fulfillment_stage
                    ))
                })?;

            Ok(Order {
                id: row.id,
                buyer_id: row.buyer_id,
                vendor_id: row.vendor_id,
                address: row.address,
                items: row.items.0,
                totals: Totals {
                    subtotal: row.subtotal,
                    tax: row.tax,
                    shipping: row.shipping,
                    total: row.total,
                },
                billing: BillingContact {
                    name: row.billing_name,
                    address: row.billing_address,
                    city: row.billing_city,
                    pincode: row.billing_pincode,
                    state: row.billing_state,
                    country: row.billing_country,
                    email: row.billing_email,
                    phone: row.billing_phone,
                },
                status,
                fulfillment_stage,
                gateway_order_id: row.gateway_order_id,
                payment_id: row.payment_id,
                shipment_id: row.shipment_id,
                awb_code: row.awb_code,
                pickup_location: row.pickup_location,
                last_error: row.last_error,
                fulfillment_attempts: row.fulfillment_attempts,
                lease_expires_at: row.lease_expires_at,
                lease_token: row.lease_token,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        }
    }

    fn into_orders(rows: Vec<OrderRow>) -> Result<Vec<Order>, DatabaseError> {
        rows.into_iter().map(Order::try_from).collect()
    }

    /// Postgres-backed order store
    pub struct PgOrderRepository {
        pool: PgPool,
    }

    impl PgOrderRepository {
        pub fn new(pool: PgPool) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl OrderRepository for PgOrderRepository {
        async fn insert(&self, order: NewOrder) -> Result<Order, DatabaseError> {
            let sql = format!(
                "INSERT INTO orders (
                    buyer_id, vendor_id, address, items, subtotal, tax, shipping, total,
                    billing_name, billing_address, billing_city, billing_pincode, billing_state,
                    billing_country, billing_email, billing_phone,
                    status, fulfillment_stage, pickup_location
                 )
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)
                 RETURNING {}",
                ORDER_COLUMNS
            );

            let row = sqlx::query_as::<_, OrderRow>(&sql)
                .bind(&order.buyer_id)
                .bind(order.vendor_id)
                .bind(&order.address)
                .bind(Json(&order.items))
                .bind(order.totals.subtotal)
                .bind(order.totals.tax)
                .bind(order.totals.shipping)
                .bind(order.totals.total)
                .bind(&order.billing.name)
                .bind(&order.billing.address)
                .bind(&order.billing.city)
                .bind(&order.billing.pincode)
                .bind(&order.billing.state)
                .bind(&order.billing.country)
                .bind(&order.billing.email)
                .bind(&order.billing.phone)
                .bind(OrderStatus::Pending.as_str())
                .bind(FulfillmentStage::AwaitingPayment.to_db_stage())
                .bind(&order.pickup_location)
                .fetch_one(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;

            row.try_into()
        }

        async fn find_by_id(&self, id: Uuid) -> Result<Option<Order>, DatabaseError> {
            let sql = format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS);
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?
                .map(Order::try_from)
                .transpose()
        }

        async fn record_gateway_order(
            &self,
            id: Uuid,
            gateway_order_id: &str,
        ) -> Result<Order, DatabaseError> {
            let sql = format!(
                "UPDATE orders SET gateway_order_id = $2, updated_at = NOW()
                 WHERE id = $1
                 RETURNING {}",
                ORDER_COLUMNS
            );
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(id)
                .bind(gateway_order_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?
                .ok_or_else(|| DatabaseError::not_found("order", id))?
                .try_into()
        }

        async fn claim_lease(
            &self,
            id: Uuid,
            now: DateTime<Utc>,
            lease: Lease,
        ) -> Result<Option<Order>, DatabaseError> {
            let sql = format!(
                "UPDATE orders
                 SET lease_expires_at = $3,
                     lease_token = $4,
                     fulfillment_attempts = fulfillment_attempts + 1,
                     updated_at = NOW()
                 WHERE id = $1
                   AND status = 'Pending'
                   AND (lease_expires_at IS NULL OR lease_expires_at <= $2)
                 RETURNING {}",
                ORDER_COLUMNS
            );
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(id)
                .bind(now)
                .bind(lease.expires_at)
                .bind(lease.token)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?
                .map(Order::try_from)
                .transpose()
        }

        async fn renew_lease(
            &self,
            id: Uuid,
            token: Uuid,
            lease_until: DateTime<Utc>,
        ) -> Result<bool, DatabaseError> {
            let result = sqlx::query(
                "UPDATE orders
                 SET lease_expires_at = $3, updated_at = NOW()
                 WHERE id = $1 AND lease_token = $2 AND status = 'Pending'",
            )
            .bind(id)
            .bind(token)
            .bind(lease_until)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            Ok(result.rows_affected() == 1)
        }

        async fn advance_stage(
            &self,
            id: Uuid,
            lease: Lease,
            from: FulfillmentStage,
            to: FulfillmentStage,
            update: StageUpdate,
        ) -> Result<Option<Order>, DatabaseError> {
            let confirming = to == FulfillmentStage::Confirmed;
            let sql = format!(
                "UPDATE orders
                 SET fulfillment_stage = $3,
                     payment_id = COALESCE($4, payment_id),
                     shipment_id = COALESCE($5, shipment_id),
                     awb_code = COALESCE($6, awb_code),
                     status = CASE WHEN $7 THEN 'confirmed' ELSE status END,
                     lease_expires_at = CASE WHEN $7 THEN NULL ELSE $8 END,
                     lease_token = CASE WHEN $7 THEN NULL ELSE lease_token END,
                     last_error = CASE WHEN $7 THEN NULL ELSE last_error END,
                     updated_at = NOW()
                 WHERE id = $1 AND fulfillment_stage = $2 AND status = 'Pending'
                   AND lease_token = $9
                 RETURNING {}",
                ORDER_COLUMNS
            );
            sqlx::query_as::<_, OrderRow>(&sql)
                .bind(id)
                .bind(from.to_db_stage())
                .bind(to.to_db_stage())
                .bind(update.payment_id)
                .bind(update.shipment_id)
                .bind(update.awb_code)
                .bind(confirming)
                .bind(lease.expires_at)
                .bind(lease.token)
                .fetch_optional(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?
                .map(Order::try_from)
                .transpose()
        }

        async fn record_failure(
            &self,
            id: Uuid,
            token: Uuid,
            message: &str,
        ) -> Result<(), DatabaseError> {
            sqlx::query(
                "UPDATE orders
                 SET last_error = $3, lease_expires_at = NULL, lease_token = NULL,
                     updated_at = NOW()
                 WHERE id = $1 AND lease_token = $2",
            )
            .bind(id)
            .bind(token)
            .bind(message)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            Ok(())
        }

        async fn release_lease(&self, id: Uuid, token: Uuid) -> Result<(), DatabaseError> {
            sqlx::query(
                "UPDATE orders
                 SET lease_expires_at = NULL, lease_token = NULL, updated_at = NOW()
                 WHERE id = $1 AND lease_token = $2",
            )
            .bind(id)
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(DatabaseError::from_sqlx)?;
            Ok(())
        }

        async fn find_resumable(
            &self,
            now: DateTime<Utc>,
            max_attempts: i32,
            limit: i64,
        ) -> Result<Vec<Order>, DatabaseError> {
            let sql = format!(
                "SELECT {} FROM orders
                 WHERE status = 'Pending'
                   AND fulfillment_stage NOT IN ('awaiting_payment', 'confirmed')
                   AND (lease_expires_at IS NULL OR lease_expires_at <= $1)
                   AND fulfillment_attempts < $2
                 ORDER BY updated_at ASC
                 LIMIT $3",
                ORDER_COLUMNS
            );
            let rows = sqlx::query_as::<_, OrderRow>(&sql)
                .bind(now)
                .bind(max_attempts)
                .bind(limit)
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            into_orders(rows)
        }

        async fn list_by_vendor(&self, vendor_id: Uuid) -> Result<Vec<Order>, DatabaseError> {
            let sql = format!(
                "SELECT {} FROM orders WHERE vendor_id = $1 ORDER BY created_at DESC",
                ORDER_COLUMNS
            );
            let rows = sqlx::query_as::<_, OrderRow>(&sql)
                .bind(vendor_id)
                .fetch_all(&self.pool)
                .await
                .map_err(DatabaseError::from_sqlx)?;
            into_orders(rows)
        }
    }
}
