pub mod fulfillment_retry;

pub use fulfillment_retry::{FulfillmentRetryConfig, FulfillmentRetryWorker};
