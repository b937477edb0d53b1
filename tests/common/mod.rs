#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::{json, Value as JsonValue};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use storefront_checkout::config::{CheckoutConfig, PackageDimensions};
use storefront_checkout::database::memory::{InMemoryOrderRepository, InMemoryUserRepository};
use storefront_checkout::database::user_repository::User;
use storefront_checkout::payments::utils::checkout_signature;
use storefront_checkout::payments::{
    OrderIntent, PaymentCallback, PaymentError, PaymentGateway, PaymentResult, SignatureCheck,
};
use storefront_checkout::services::checkout::CreateOrderRequest;
use storefront_checkout::services::notification::NotificationError;
use storefront_checkout::services::{
    CheckoutService, FulfillmentEngine, Mailer, OrderConfirmation, VendorService,
};
use storefront_checkout::shipping::types::{
    AwbAssignment, CourierQuote, Invoice, PickupLocation, PickupScheduled, QuoteRequest,
    ShipmentCreated, ShipmentRequest,
};
use storefront_checkout::shipping::{ShippingAggregator, ShippingError, ShippingResult};
use uuid::Uuid;

pub const KEY_SECRET: &str = "rzp_test_secret_key";
pub const INTENT_ID: &str = "order_abc";

pub struct MockGateway {
    pub intent_id: String,
    pub fail: AtomicBool,
    pub intents_created: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Self {
        Self {
            intent_id: INTENT_ID.to_string(),
            fail: AtomicBool::new(false),
            intents_created: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order_intent(&self, amount: Decimal) -> PaymentResult<OrderIntent> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentError::ProviderError {
                provider: "mock".to_string(),
                message: "gateway rejected the order".to_string(),
                provider_code: Some("400".to_string()),
                retryable: false,
            });
        }
        self.intents_created.fetch_add(1, Ordering::SeqCst);
        Ok(OrderIntent {
            id: self.intent_id.clone(),
            amount: (amount * Decimal::ONE_HUNDRED).to_i64().unwrap(),
            currency: "INR".to_string(),
            receipt: "rcpt_test".to_string(),
            status: "created".to_string(),
        })
    }

    fn verify_payment(&self, callback: &PaymentCallback) -> PaymentResult<SignatureCheck> {
        if callback.razorpay_signature.is_empty() {
            return Err(PaymentError::VerificationError {
                message: "razorpay_signature is missing from the callback".to_string(),
            });
        }
        let expected = checkout_signature(
            KEY_SECRET,
            &callback.razorpay_order_id,
            &callback.razorpay_payment_id,
        )
        .unwrap();
        if expected == callback.razorpay_signature {
            Ok(SignatureCheck::Valid)
        } else {
            Ok(SignatureCheck::Mismatch)
        }
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAt {
    Login,
    CreateShipment,
    AssignAwb,
    RequestPickup,
}

#[derive(Default)]
pub struct MockAggregator {
    pub fail_at: Mutex<Option<FailAt>>,
    pub shipments_created: AtomicUsize,
    pub awbs_assigned: AtomicUsize,
    pub pickups_requested: AtomicUsize,
    pub logged_in: AtomicBool,
    pub last_shipment: Mutex<Option<ShipmentRequest>>,
    pub quotes: Mutex<Vec<CourierQuote>>,
    pub orders: Mutex<Vec<JsonValue>>,
    pub pickup_locations: Mutex<Vec<PickupLocation>>,
    /// Added latency on every create_shipment call
    pub create_delay: Mutex<Option<Duration>>,
}

impl MockAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_at(&self, step: Option<FailAt>) {
        *self.fail_at.lock().unwrap() = step;
    }

    pub fn delay_shipments(&self, delay: Option<Duration>) {
        *self.create_delay.lock().unwrap() = delay;
    }

    fn failing(&self, step: FailAt) -> bool {
        *self.fail_at.lock().unwrap() == Some(step)
    }

    fn provider_error(message: &str) -> ShippingError {
        ShippingError::ProviderError {
            status: 422,
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl ShippingAggregator for MockAggregator {
    async fn authenticate(&self, _email: &str, _password: &str) -> ShippingResult<String> {
        if self.failing(FailAt::Login) {
            return Err(ShippingError::AuthenticationFailed {
                message: "Invalid email and password combination".to_string(),
            });
        }
        self.logged_in.store(true, Ordering::SeqCst);
        Ok("token".to_string())
    }

    async fn ensure_session(&self) -> ShippingResult<()> {
        if self.logged_in.load(Ordering::SeqCst) {
            return Ok(());
        }
        self.authenticate("ops@example.in", "secret").await.map(|_| ())
    }

    async fn delivery_quote(&self, request: &QuoteRequest) -> ShippingResult<CourierQuote> {
        self.quotes
            .lock()
            .unwrap()
            .first()
            .cloned()
            .ok_or(ShippingError::NoCourierAvailable {
                pickup_postcode: request.pickup_postcode.clone(),
                delivery_postcode: request.delivery_postcode.clone(),
            })
    }

    async fn create_shipment(&self, request: &ShipmentRequest) -> ShippingResult<ShipmentCreated> {
        let delay = *self.create_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing(FailAt::CreateShipment) {
            return Err(Self::provider_error("Wrong pickup location entered"));
        }
        let n = self.shipments_created.fetch_add(1, Ordering::SeqCst) + 1;
        *self.last_shipment.lock().unwrap() = Some(request.clone());
        Ok(ShipmentCreated {
            shipment_id: format!("{}", 9_000 + n),
            order_id: request.order_id.clone(),
            status: Some("NEW".to_string()),
        })
    }

    async fn assign_awb(&self, shipment_id: &str) -> ShippingResult<AwbAssignment> {
        if self.failing(FailAt::AssignAwb) {
            return Err(Self::provider_error("No courier serviceable"));
        }
        self.awbs_assigned.fetch_add(1, Ordering::SeqCst);
        Ok(AwbAssignment {
            shipment_id: shipment_id.to_string(),
            awb_code: format!("AWB{}", shipment_id),
            courier_name: Some("Xpressbees".to_string()),
        })
    }

    async fn request_pickup(&self, shipment_id: &str) -> ShippingResult<PickupScheduled> {
        if self.failing(FailAt::RequestPickup) {
            return Err(Self::provider_error("Pickup could not be generated"));
        }
        self.pickups_requested.fetch_add(1, Ordering::SeqCst);
        Ok(PickupScheduled {
            shipment_id: shipment_id.to_string(),
            pickup_scheduled_date: Some("2026-10-19 10:00:00".to_string()),
            pickup_token_number: Some("TKN1".to_string()),
        })
    }

    async fn tracking(&self, shipment_id: &str) -> ShippingResult<JsonValue> {
        Ok(json!({ "tracking_data": { "shipment_id": shipment_id, "shipment_status": 6 } }))
    }

    async fn all_orders(&self) -> ShippingResult<Vec<JsonValue>> {
        Ok(self.orders.lock().unwrap().clone())
    }

    async fn add_pickup_location(&self, location: &PickupLocation) -> ShippingResult<JsonValue> {
        self.pickup_locations.lock().unwrap().push(location.clone());
        Ok(json!({ "success": true, "address": { "pickup_code": location.pickup_location } }))
    }

    async fn generate_invoice(&self, order_ids: &[String]) -> ShippingResult<Invoice> {
        Ok(Invoice {
            is_invoice_created: !order_ids.is_empty(),
            invoice_url: Some("https://invoices.example.in/1.pdf".to_string()),
        })
    }

    async fn session_active(&self) -> bool {
        self.logged_in.load(Ordering::SeqCst)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[derive(Default)]
pub struct RecordingMailer {
    pub sent: Mutex<Vec<OrderConfirmation>>,
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_order_confirmation(
        &self,
        confirmation: &OrderConfirmation,
    ) -> Result<(), NotificationError> {
        self.sent.lock().unwrap().push(confirmation.clone());
        Ok(())
    }
}

pub struct Harness {
    pub orders: Arc<InMemoryOrderRepository>,
    pub users: Arc<InMemoryUserRepository>,
    pub gateway: Arc<MockGateway>,
    pub shipping: Arc<MockAggregator>,
    pub mailer: Arc<RecordingMailer>,
    pub engine: Arc<FulfillmentEngine>,
    pub vendors: Arc<VendorService>,
    pub checkout: Arc<CheckoutService>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_lease_secs(CheckoutConfig::default().lease_secs)
    }

    pub fn with_lease_secs(lease_secs: i64) -> Self {
        let orders = Arc::new(InMemoryOrderRepository::new());
        let users = Arc::new(InMemoryUserRepository::new());
        let gateway = Arc::new(MockGateway::new());
        let shipping = Arc::new(MockAggregator::new());
        let mailer = Arc::new(RecordingMailer::default());
        let config = CheckoutConfig {
            lease_secs,
            ..Default::default()
        };

        let engine = Arc::new(FulfillmentEngine::new(
            orders.clone(),
            shipping.clone(),
            mailer.clone(),
            PackageDimensions::default(),
            config.lease_secs,
        ));
        let vendors = Arc::new(VendorService::new(users.clone(), orders.clone()));
        let checkout = Arc::new(CheckoutService::new(
            orders.clone(),
            vendors.clone(),
            gateway.clone(),
            engine.clone(),
            config,
        ));

        Self {
            orders,
            users,
            gateway,
            shipping,
            mailer,
            engine,
            vendors,
            checkout,
        }
    }

    /// Register a brand and return its id
    pub async fn add_brand(&self, label: &str, age_days: i64) -> Uuid {
        let user = brand(label, age_days);
        let id = user.id;
        self.users.add(user).await;
        id
    }
}

pub fn brand(label: &str, age_days: i64) -> User {
    let id = Uuid::new_v4();
    User {
        id,
        email: format!("{}@brands.in", id.simple()),
        name: format!("Brand {}", label),
        is_brand: true,
        pickup_location: Some(label.to_string()),
        address: Some("Plot 7, Peenya Industrial Area".to_string()),
        city: Some("Bengaluru".to_string()),
        pincode: Some("560058".to_string()),
        state: Some("Karnataka".to_string()),
        country: Some("India".to_string()),
        phone: Some("9845012345".to_string()),
        created_at: Utc::now() - ChronoDuration::days(age_days),
    }
}

pub fn order_body(pickup_location: &str) -> JsonValue {
    json!({
        "address": "14 Residency Road, Bengaluru",
        "items": [
            { "title": "Block-print Kurta", "category": "apparel", "size": "M", "price": 450, "quantity": 1 }
        ],
        "totals": { "subtotal": 450, "tax": 50, "shipping": 0, "total": 500 },
        "pickup_location": pickup_location,
        "billing_name": "Asha Rao",
        "billing_address": "14 Residency Road",
        "billing_city": "Bengaluru",
        "billing_pincode": "560025",
        "billing_state": "Karnataka",
        "billing_country": "India",
        "billing_email": "asha@example.in",
        "billing_phone": "9876543210"
    })
}

pub fn order_request(pickup_location: &str) -> CreateOrderRequest {
    serde_json::from_value(order_body(pickup_location)).unwrap()
}

pub fn signed_callback(order_id: &str, payment_id: &str) -> PaymentCallback {
    PaymentCallback {
        razorpay_payment_id: payment_id.to_string(),
        razorpay_order_id: order_id.to_string(),
        razorpay_signature: checkout_signature(KEY_SECRET, order_id, payment_id).unwrap(),
    }
}
