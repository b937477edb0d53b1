//! Checkout orchestration.
//!
//! Phase 1 (`create_order`) persists a `Pending` order and opens a gateway
//! order intent for it. Phase 2 (`handle_payment_callback`) runs when the
//! gateway redirects back: it verifies the signature, takes the order's
//! processing lease and hands it to the [`FulfillmentEngine`].

use crate::config::CheckoutConfig;
use crate::database::order_repository::{
    BillingContact, FulfillmentStage, LineItem, NewOrder, Order, OrderRepository, StageUpdate,
    Totals,
};
use crate::error::{AppError, AppErrorKind, AppResult, DomainError};
use crate::payments::{PaymentCallback, PaymentError, PaymentGateway, SignatureCheck};
use crate::services::fulfillment::{FulfillmentEngine, FulfillmentError};
use crate::services::validation;
use crate::services::vendor::VendorService;
use crate::shipping::ShippingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Deserialize)]
pub struct CreateOrderRequest {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub items: Vec<LineItem>,
    pub totals: Totals,
    #[serde(default)]
    pub pickup_location: String,
    #[serde(default)]
    pub vendor_id: Option<Uuid>,
    #[serde(default)]
    pub billing_name: String,
    #[serde(default)]
    pub billing_address: String,
    #[serde(default)]
    pub billing_city: String,
    #[serde(default)]
    pub billing_pincode: String,
    #[serde(default)]
    pub billing_state: String,
    #[serde(default)]
    pub billing_country: String,
    #[serde(default)]
    pub billing_email: String,
    #[serde(default)]
    pub billing_phone: String,
}

impl CreateOrderRequest {
    pub fn validate(&self) -> AppResult<()> {
        validation::require_non_empty("address", &self.address)?;
        if self.items.is_empty() {
            return Err(AppError::invalid_field("items", "at least one item is required"));
        }
        for (idx, item) in self.items.iter().enumerate() {
            if item.quantity == 0 {
                return Err(AppError::invalid_field(
                    format!("items[{}].quantity", idx),
                    "must be at least 1",
                ));
            }
            if item.price < Decimal::ZERO {
                return Err(AppError::invalid_field(
                    format!("items[{}].price", idx),
                    "must not be negative",
                ));
            }
        }
        if self.totals.total <= Decimal::ZERO {
            return Err(AppError::new(AppErrorKind::Validation(
                crate::error::ValidationError::InvalidAmount {
                    amount: self.totals.total.to_string(),
                    reason: "order total must be positive".to_string(),
                },
            )));
        }
        if self.vendor_id.is_none() {
            validation::require_non_empty("pickup_location", &self.pickup_location)?;
        }
        validation::require_non_empty("billing_name", &self.billing_name)?;
        validation::validate_email("billing_email", &self.billing_email)?;
        validation::validate_pincode("billing_pincode", &self.billing_pincode)?;
        validation::validate_phone("billing_phone", &self.billing_phone)?;
        Ok(())
    }

    fn billing(&self) -> BillingContact {
        BillingContact {
            name: self.billing_name.trim().to_string(),
            address: self.billing_address.trim().to_string(),
            city: self.billing_city.trim().to_string(),
            pincode: self.billing_pincode.trim().to_string(),
            state: self.billing_state.trim().to_string(),
            country: self.billing_country.trim().to_string(),
            email: self.billing_email.trim().to_string(),
            phone: self.billing_phone.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateOrderResponse {
    /// Gateway order intent id, handed to the client-side checkout
    pub orderid: String,
    /// Our persisted order id
    pub purchaseid: Uuid,
    pub email: String,
}

/// How a payment callback ended; every variant becomes a browser redirect
#[derive(Debug)]
pub enum CallbackOutcome {
    Confirmed(Order),
    /// Duplicate delivery for an order that is already confirmed
    AlreadyConfirmed(Order),
    /// Signature checked and did not match
    VerificationFailed,
    /// Signature could not be checked
    VerificationError(String),
    /// Paid, but a shipping step failed; the order waits at its checkpoint
    FulfillmentFailed {
        order_id: Uuid,
        stage: FulfillmentStage,
        error: String,
    },
}

impl CallbackOutcome {
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            CallbackOutcome::Confirmed(_) | CallbackOutcome::AlreadyConfirmed(_)
        )
    }
}

pub struct CheckoutService {
    orders: Arc<dyn OrderRepository>,
    vendors: Arc<VendorService>,
    gateway: Arc<dyn PaymentGateway>,
    fulfillment: Arc<FulfillmentEngine>,
    config: CheckoutConfig,
}

impl CheckoutService {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        vendors: Arc<VendorService>,
        gateway: Arc<dyn PaymentGateway>,
        fulfillment: Arc<FulfillmentEngine>,
        config: CheckoutConfig,
    ) -> Self {
        Self {
            orders,
            vendors,
            gateway,
            fulfillment,
            config,
        }
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Phase 1. The order is stored before the gateway is called, so a
    /// gateway failure leaves a `Pending` order without an intent.
    pub async fn create_order(
        &self,
        buyer_id: &str,
        request: CreateOrderRequest,
    ) -> AppResult<CreateOrderResponse> {
        request.validate()?;

        let vendor = self
            .vendors
            .resolve(request.vendor_id, &request.pickup_location)
            .await?;
        let pickup_location = vendor
            .pickup_location
            .clone()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| request.pickup_location.trim().to_string());

        let order = self
            .orders
            .insert(NewOrder {
                buyer_id: buyer_id.to_string(),
                vendor_id: vendor.id,
                address: request.address.trim().to_string(),
                billing: request.billing(),
                items: request.items,
                totals: request.totals,
                pickup_location,
            })
            .await?;

        info!(
            order_id = %order.id,
            vendor_id = %order.vendor_id,
            total = %order.totals.total,
            "order persisted, requesting payment intent"
        );

        let intent = match self.gateway.create_order_intent(order.totals.total).await {
            Ok(intent) => intent,
            Err(e) => {
                warn!(
                    order_id = %order.id,
                    provider = self.gateway.name(),
                    error = %e,
                    "payment intent failed, order left pending"
                );
                return Err(AppError::from(e).with_context(format!("order {}", order.id)));
            }
        };

        self.orders
            .record_gateway_order(order.id, &intent.id)
            .await?;

        info!(order_id = %order.id, gateway_order_id = %intent.id, "payment intent created");

        Ok(CreateOrderResponse {
            orderid: intent.id,
            purchaseid: order.id,
            email: order.billing.email,
        })
    }

    /// Phase 2. `Err` is returned only for a missing order, a held lease or
    /// an infrastructure failure; everything else is a [`CallbackOutcome`].
    pub async fn handle_payment_callback(
        &self,
        order_id: Uuid,
        callback: &PaymentCallback,
    ) -> AppResult<CallbackOutcome> {
        match self.gateway.verify_payment(callback) {
            Ok(SignatureCheck::Valid) => {}
            Ok(SignatureCheck::Mismatch) => {
                warn!(
                    order_id = %order_id,
                    code = "VERIFICATION_FAILED",
                    gateway_order_id = %callback.razorpay_order_id,
                    "payment signature mismatch"
                );
                return Ok(CallbackOutcome::VerificationFailed);
            }
            Err(PaymentError::VerificationError { message }) => {
                error!(
                    order_id = %order_id,
                    code = "VERIFICATION_ERROR",
                    error = %message,
                    "payment signature could not be verified"
                );
                return Ok(CallbackOutcome::VerificationError(message));
            }
            Err(other) => {
                error!(order_id = %order_id, code = "VERIFICATION_ERROR", error = %other, "payment verification failed");
                return Ok(CallbackOutcome::VerificationError(other.to_string()));
            }
        }

        let order = self
            .orders
            .find_by_id(order_id)
            .await?
            .ok_or_else(|| AppError::order_not_found(order_id.to_string()))?;

        if order.is_confirmed() {
            info!(order_id = %order_id, "order already confirmed, ignoring duplicate callback");
            return Ok(CallbackOutcome::AlreadyConfirmed(order));
        }

        // A valid signature for some other gateway order must not confirm this one
        match order.gateway_order_id.as_deref() {
            Some(expected) if expected == callback.razorpay_order_id.trim() => {}
            Some(expected) => {
                warn!(
                    order_id = %order_id,
                    code = "VERIFICATION_FAILED",
                    expected_gateway_order = %expected,
                    supplied_gateway_order = %callback.razorpay_order_id,
                    "callback is for a different payment intent"
                );
                return Ok(CallbackOutcome::VerificationFailed);
            }
            None => {
                warn!(
                    order_id = %order_id,
                    code = "VERIFICATION_FAILED",
                    supplied_gateway_order = %callback.razorpay_order_id,
                    "order has no recorded payment intent, rejecting callback"
                );
                return Ok(CallbackOutcome::VerificationFailed);
            }
        }

        let Some(order) = self.fulfillment.claim(order_id).await? else {
            return match self.orders.find_by_id(order_id).await? {
                Some(current) if current.is_confirmed() => {
                    Ok(CallbackOutcome::AlreadyConfirmed(current))
                }
                _ => Err(AppError::new(AppErrorKind::Domain(
                    DomainError::FulfillmentInProgress {
                        order_id: order_id.to_string(),
                    },
                ))),
            };
        };

        let order = if order.fulfillment_stage == FulfillmentStage::AwaitingPayment {
            let update = StageUpdate {
                payment_id: Some(callback.razorpay_order_id.trim().to_string()),
                ..Default::default()
            };
            match self.fulfillment.advance(&order, update).await {
                Ok(verified) => verified,
                Err(e) => {
                    self.fulfillment.release(&order).await;
                    return Err(e.into());
                }
            }
        } else {
            info!(
                order_id = %order_id,
                stage = %order.fulfillment_stage,
                "resuming fulfillment from checkpoint"
            );
            order
        };

        info!(order_id = %order_id, payment_id = %callback.razorpay_payment_id, "payment verified");

        match self.fulfillment.drive(order).await {
            Ok(confirmed) => {
                info!(
                    order_id = %confirmed.id,
                    shipment_id = confirmed.shipment_id.as_deref().unwrap_or(""),
                    "order confirmed"
                );
                Ok(CallbackOutcome::Confirmed(confirmed))
            }
            Err(FulfillmentError::Shipping {
                source: source @ ShippingError::AuthenticationFailed { .. },
                ..
            }) => Err(AppError::from(source).with_context(format!("order {}", order_id))),
            Err(FulfillmentError::Shipping { stage, source }) => {
                Ok(CallbackOutcome::FulfillmentFailed {
                    order_id,
                    stage,
                    error: source.to_string(),
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Where the browser goes after a callback
    pub fn redirect_target(&self, outcome: &CallbackOutcome) -> &str {
        if outcome.is_success() {
            &self.config.success_url
        } else {
            &self.config.failed_url
        }
    }
}
