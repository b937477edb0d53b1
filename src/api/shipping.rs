//! Authenticated pass-through routes to the shipping aggregator, plus the
//! vendor dashboards that read local orders.

use super::ApiState;
use crate::database::order_repository::Order;
use crate::error::{AppError, AppErrorKind, AuthError};
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::error::{json_rejection, with_request_id};
use crate::services::vendor::VendorSales;
use crate::shipping::types::{
    CourierQuote, Invoice, PickupLocation, PickupScheduled, QuoteRequest, ShipmentCreated,
    ShipmentRequest,
};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

type ApiResult<T> = Result<Json<T>, AppError>;

fn body<T>(payload: Result<Json<T>, JsonRejection>, headers: &HeaderMap) -> Result<T, AppError> {
    payload
        .map(|Json(value)| value)
        .map_err(|r| with_request_id(json_rejection(r), headers))
}

fn vendor_id(user: &AuthenticatedUser, headers: &HeaderMap) -> Result<Uuid, AppError> {
    Uuid::parse_str(&user.user_id).map_err(|_| {
        with_request_id(
            AppError::new(AppErrorKind::Auth(AuthError::Forbidden {
                reason: "caller is not a vendor account".to_string(),
            })),
            headers,
        )
    })
}

#[derive(Debug, Deserialize)]
pub struct InvoiceRequest {
    pub order_ids: Vec<String>,
}

pub async fn generate_invoice(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<InvoiceRequest>, JsonRejection>,
) -> ApiResult<Invoice> {
    let request = body(payload, &headers)?;
    if request.order_ids.is_empty() {
        return Err(with_request_id(AppError::missing_field("order_ids"), &headers));
    }
    let invoice = state
        .shipping
        .generate_invoice(&request.order_ids)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(invoice))
}

/// Registers the location with the aggregator and stores the label on the
/// caller's brand profile so checkouts can resolve it
pub async fn add_pickup_location(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<PickupLocation>, JsonRejection>,
) -> ApiResult<JsonValue> {
    let location = body(payload, &headers)?;
    let vendor_id = vendor_id(&user, &headers)?;
    state
        .vendors
        .brand(vendor_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    let response = state
        .shipping
        .add_pickup_location(&location)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;

    state
        .vendors
        .set_pickup_location(vendor_id, &location.pickup_location)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    info!(vendor_id = %vendor_id, pickup_location = %location.pickup_location, "pickup location registered");
    Ok(Json(response))
}

pub async fn delivery_price(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<QuoteRequest>, JsonRejection>,
) -> ApiResult<CourierQuote> {
    let request = body(payload, &headers)?;
    let quote = state
        .shipping
        .delivery_quote(&request)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(quote))
}

pub async fn place_order(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<ShipmentRequest>, JsonRejection>,
) -> ApiResult<ShipmentCreated> {
    let request = body(payload, &headers)?;
    let created = state
        .shipping
        .create_shipment(&request)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct PickupRequest {
    pub shipment_id: String,
}

pub async fn request_pickup(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<PickupRequest>, JsonRejection>,
) -> ApiResult<PickupScheduled> {
    let request = body(payload, &headers)?;
    if request.shipment_id.trim().is_empty() {
        return Err(with_request_id(AppError::missing_field("shipment_id"), &headers));
    }
    let scheduled = state
        .shipping
        .request_pickup(request.shipment_id.trim())
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(scheduled))
}

pub async fn track_shipment(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
    Path(shipment_id): Path<String>,
) -> ApiResult<JsonValue> {
    let tracking = state
        .shipping
        .tracking(&shipment_id)
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(tracking))
}

pub async fn delivered_orders(
    State(state): State<ApiState>,
    _user: AuthenticatedUser,
    headers: HeaderMap,
) -> ApiResult<Vec<JsonValue>> {
    let orders = state
        .shipping
        .all_orders()
        .await
        .map_err(|e| with_request_id(e.into(), &headers))?;
    Ok(Json(delivered_only(orders)))
}

/// Aggregator orders whose status reads "delivered", in any case
pub fn delivered_only(orders: Vec<JsonValue>) -> Vec<JsonValue> {
    orders
        .into_iter()
        .filter(|order| {
            order
                .get("status")
                .and_then(JsonValue::as_str)
                .map(|s| s.trim().eq_ignore_ascii_case("delivered"))
                .unwrap_or(false)
        })
        .collect()
}

pub async fn vendor_sales(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> ApiResult<VendorSales> {
    let vendor_id = vendor_id(&user, &headers)?;
    let sales = state
        .vendors
        .sales(vendor_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;
    Ok(Json(sales))
}

pub async fn vendor_orders(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
) -> ApiResult<Vec<Order>> {
    let vendor_id = vendor_id(&user, &headers)?;
    let orders = state
        .vendors
        .orders(vendor_id)
        .await
        .map_err(|e| with_request_id(e, &headers))?;
    Ok(Json(orders))
}
