//! Shipping aggregator adapter: login session, rate lookup, shipment
//! creation, AWB assignment, pickup, tracking and invoices

pub mod aggregator;
pub mod error;
pub mod providers;
pub mod quote;
pub mod session;
pub mod types;

pub use aggregator::ShippingAggregator;
pub use error::{ShippingError, ShippingResult};
pub use quote::QuoteSelection;
pub use session::{MemoryTokenStore, ShippingSession, TokenStore};
