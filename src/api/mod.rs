//! HTTP surface: checkout, payment callback, shipping pass-through and health

pub mod checkout;
pub mod shipping;

use crate::config::AuthConfig;
use crate::health::{HealthChecker, HealthStatus};
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::services::checkout::CheckoutService;
use crate::services::vendor::VendorService;
use crate::shipping::ShippingAggregator;
use axum::{
    extract::{FromRef, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::{error, info};

#[derive(Clone)]
pub struct ApiState {
    pub checkout: Arc<CheckoutService>,
    pub vendors: Arc<VendorService>,
    pub shipping: Arc<dyn ShippingAggregator>,
    pub health: HealthChecker,
    pub auth: AuthConfig,
}

impl FromRef<ApiState> for AuthConfig {
    fn from_ref(state: &ApiState) -> Self {
        state.auth.clone()
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route("/getorderid", post(checkout::create_order))
        .route("/verifypayment", post(checkout::verify_payment))
        .route("/invoice", post(shipping::generate_invoice))
        .route("/add-pickup-location", post(shipping::add_pickup_location))
        .route("/get-delivery-price", post(shipping::delivery_price))
        .route("/place-order", post(shipping::place_order))
        .route("/request-pickup", post(shipping::request_pickup))
        .route("/track-shipment/{id}", get(shipping::track_shipment))
        .route("/delivered-orders", get(shipping::delivered_orders))
        .route("/vendor-sales", get(shipping::vendor_sales))
        .route("/vendor-orders", get(shipping::vendor_orders))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn root() -> &'static str {
    "Storefront checkout service"
}

async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthStatus>) {
    let health_status = state.health.check_health().await;
    if health_status.is_ready() {
        (StatusCode::OK, Json(health_status))
    } else {
        error!(status = ?health_status.status, "health check failed");
        (StatusCode::SERVICE_UNAVAILABLE, Json(health_status))
    }
}

/// Readiness: every configured dependency answers
async fn readiness(State(state): State<ApiState>) -> (StatusCode, Json<HealthStatus>) {
    let (status, body) = health(State(state)).await;
    if status == StatusCode::OK {
        info!("readiness check passed");
    }
    (status, body)
}

/// Liveness: the process is serving requests
async fn liveness() -> &'static str {
    "OK"
}
