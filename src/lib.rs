//! Storefront checkout service: turns a cart into a paid order and hands it
//! to the shipping aggregator for fulfilment.

pub mod api;
#[cfg(feature = "cache")]
pub mod cache;
pub mod config;
pub mod database;
pub mod error;
pub mod health;
pub mod http;
pub mod logging;
pub mod middleware;
pub mod payments;
pub mod services;
pub mod shipping;
pub mod workers;
