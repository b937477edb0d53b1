use super::ApiState;
use crate::error::AppError;
use crate::logging::mask_email;
use crate::middleware::auth::AuthenticatedUser;
use crate::middleware::error::{json_rejection, with_request_id};
use crate::payments::PaymentCallback;
use crate::services::checkout::{CallbackOutcome, CreateOrderRequest, CreateOrderResponse};
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        FromRequest, Query, Request, State,
    },
    http::{header::CONTENT_TYPE, HeaderMap},
    response::Redirect,
    Form, Json,
};
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

/// `POST /getorderid`: persist the order and open a gateway intent
pub async fn create_order(
    State(state): State<ApiState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<CreateOrderResponse>, AppError> {
    let Json(request) = payload.map_err(|r| with_request_id(json_rejection(r), &headers))?;

    info!(
        buyer = %user.user_id,
        items = request.items.len(),
        total = %request.totals.total,
        "checkout requested"
    );

    state
        .checkout
        .create_order(&user.user_id, request)
        .await
        .map(Json)
        .map_err(|e| with_request_id(e, &headers))
}

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Gateway callback fields, posted either as JSON or as a browser form
#[derive(Debug)]
pub struct CallbackBody(pub PaymentCallback);

impl<S> FromRequest<S> for CallbackBody
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.trim_start().starts_with("application/json"))
            .unwrap_or(false);

        if is_json {
            let Json(callback) = Json::<PaymentCallback>::from_request(req, state)
                .await
                .map_err(json_rejection)?;
            Ok(Self(callback))
        } else {
            let Form(callback) = Form::<PaymentCallback>::from_request(req, state)
                .await
                .map_err(|r| AppError::invalid_field("body", r.body_text()))?;
            Ok(Self(callback))
        }
    }
}

/// `POST /verifypayment?id=&email=`: verify, fulfil, then redirect the browser
pub async fn verify_payment(
    State(state): State<ApiState>,
    headers: HeaderMap,
    query: Result<Query<VerifyQuery>, QueryRejection>,
    body: Result<CallbackBody, AppError>,
) -> Result<Redirect, AppError> {
    let Query(query) = query.map_err(|r| {
        with_request_id(AppError::invalid_field("id", r.body_text()), &headers)
    })?;
    let CallbackBody(callback) = body.map_err(|e| with_request_id(e, &headers))?;

    info!(
        order_id = %query.id,
        buyer = %query.email.as_deref().map(mask_email).unwrap_or_default(),
        gateway_order_id = %callback.razorpay_order_id,
        "payment callback received"
    );

    let outcome = state
        .checkout
        .handle_payment_callback(query.id, &callback)
        .await
        .map_err(|e| with_request_id(e, &headers))?;

    match &outcome {
        CallbackOutcome::Confirmed(_) | CallbackOutcome::AlreadyConfirmed(_) => {}
        CallbackOutcome::VerificationFailed => {
            warn!(order_id = %query.id, code = "VERIFICATION_FAILED", "redirecting to failure page");
        }
        CallbackOutcome::VerificationError(reason) => {
            warn!(order_id = %query.id, code = "VERIFICATION_ERROR", reason = %reason, "redirecting to failure page");
        }
        CallbackOutcome::FulfillmentFailed { stage, error, .. } => {
            warn!(order_id = %query.id, stage = %stage, error = %error, "fulfillment incomplete, redirecting to failure page");
        }
    }

    Ok(Redirect::to(state.checkout.redirect_target(&outcome)))
}
