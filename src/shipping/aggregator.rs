use crate::shipping::error::ShippingResult;
use crate::shipping::types::{
    AwbAssignment, CourierQuote, Invoice, PickupLocation, PickupScheduled, QuoteRequest,
    ShipmentCreated, ShipmentRequest,
};
use async_trait::async_trait;
use serde_json::Value as JsonValue;

/// Shipping aggregator operations used by checkout and the shipping routes.
///
/// Everything except [`authenticate`](Self::authenticate) runs with the
/// session's bearer token, logging in first when the session is empty.
#[async_trait]
pub trait ShippingAggregator: Send + Sync {
    /// Log in and cache the returned token in the session
    async fn authenticate(&self, email: &str, password: &str) -> ShippingResult<String>;

    /// Make sure a live token exists, logging in with the configured account
    async fn ensure_session(&self) -> ShippingResult<()>;

    /// One courier for the route, picked by the configured selection policy
    async fn delivery_quote(&self, request: &QuoteRequest) -> ShippingResult<CourierQuote>;

    async fn create_shipment(&self, request: &ShipmentRequest) -> ShippingResult<ShipmentCreated>;

    async fn assign_awb(&self, shipment_id: &str) -> ShippingResult<AwbAssignment>;

    async fn request_pickup(&self, shipment_id: &str) -> ShippingResult<PickupScheduled>;

    async fn tracking(&self, shipment_id: &str) -> ShippingResult<JsonValue>;

    async fn all_orders(&self) -> ShippingResult<Vec<JsonValue>>;

    async fn add_pickup_location(&self, location: &PickupLocation) -> ShippingResult<JsonValue>;

    async fn generate_invoice(&self, order_ids: &[String]) -> ShippingResult<Invoice>;

    /// Whether a live token is currently cached
    async fn session_active(&self) -> bool;

    fn name(&self) -> &'static str;
}
