use crate::payments::error::PaymentResult;
use crate::payments::types::{OrderIntent, PaymentCallback, SignatureCheck};
use async_trait::async_trait;
use rust_decimal::Decimal;

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a gateway order for `amount` (major currency units).
    async fn create_order_intent(&self, amount: Decimal) -> PaymentResult<OrderIntent>;

    /// Check the signature posted by the checkout redirect.
    ///
    /// `Ok(Mismatch)` means the check ran and failed; `Err` means it could
    /// not be run at all.
    fn verify_payment(&self, callback: &PaymentCallback) -> PaymentResult<SignatureCheck>;

    fn name(&self) -> &'static str;
}
