//! Services module for checkout orchestration and its collaborators

pub mod checkout;
pub mod fulfillment;
pub mod notification;
pub mod validation;
pub mod vendor;

pub use checkout::{CallbackOutcome, CheckoutService, CreateOrderRequest, CreateOrderResponse};
pub use fulfillment::{FulfillmentEngine, FulfillmentError};
pub use notification::{HttpMailer, LogMailer, Mailer, OrderConfirmation};
pub use vendor::{VendorSales, VendorService};
