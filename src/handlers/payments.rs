use crate::{
    entities::OrderStatus,
    errors::ApiError,
    events::Event,
    gateway::{CallbackQuery, PaymentRequest},
    handlers::common::{json_body, see_other, success_response},
    services::orders::StatusTransition,
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    response::{Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use metrics::counter;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;

pub const SUCCESS_PAGE: &str = "/success.html";
pub const FAILURE_PAGE: &str = "/failure.html";

/// Order id as sent by clients: a JSON number or a numeric string.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(untagged)]
pub enum OrderIdParam {
    Number(i64),
    Text(String),
}

impl OrderIdParam {
    fn parse(&self) -> Option<i32> {
        match self {
            OrderIdParam::Number(n) => i32::try_from(*n).ok(),
            OrderIdParam::Text(s) => s.trim().parse::<i32>().ok(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct InitiatePaymentPayload {
    #[serde(rename = "orderId", alias = "order_id", default)]
    pub order_id: Option<OrderIdParam>,
}

/// Signed gateway form for an existing order
#[utoipa::path(
    post,
    path = "/api/initiate-payment",
    summary = "Initiate payment",
    request_body = InitiatePaymentPayload,
    responses(
        (status = 200, description = "Signed gateway form", body = PaymentRequest),
        (status = 400, description = "Missing or invalid orderId", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, payload))]
pub async fn initiate_payment(
    State(state): State<AppState>,
    payload: Result<Json<InitiatePaymentPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(payload)?;
    let raw = payload.order_id.ok_or_else(|| ApiError::BadRequest {
        message: "Missing orderId".to_string(),
    })?;
    let order_id = raw.parse().ok_or_else(|| ApiError::BadRequest {
        message: "Invalid orderId".to_string(),
    })?;

    let order = state.services.orders.get_order(order_id).await?;
    if order.status != OrderStatus::Initiated {
        info!(order_id, status = %order.status, "Payment initiated for settled order");
    }

    let request = state.services.payments.build_outbound_request(&order);
    counter!("storefront_payments_initiated_total", 1);
    Ok(success_response(request))
}

/// Gateway redirect target for both success and failure
#[utoipa::path(
    get,
    path = "/esewa-callback",
    summary = "Payment gateway callback",
    params(CallbackQuery),
    responses(
        (status = 303, description = "Redirect to /success.html or /failure.html")
    ),
    tag = "Payments"
)]
pub async fn esewa_callback(
    State(state): State<AppState>,
    query: Option<Query<CallbackQuery>>,
) -> Redirect {
    let query = query.map(|Query(q)| q).unwrap_or_default();

    let payment = match state.services.payments.verify_callback(&query) {
        Ok(payment) => payment,
        Err(failure) => {
            warn!(reason = failure.reason(), error = %failure, "Payment callback rejected");
            counter!("storefront_payment_callbacks_total", 1, "outcome" => failure.reason());
            state
                .event_sender
                .send_or_log(Event::PaymentRejected {
                    reason: failure.reason().to_string(),
                })
                .await;
            return see_other(FAILURE_PAGE);
        }
    };

    match state
        .services
        .orders
        .set_status(&payment.transaction_uuid, OrderStatus::Completed)
        .await
    {
        Ok(transition) => {
            let outcome = match &transition {
                StatusTransition::Applied { .. } => "completed",
                StatusTransition::Unchanged(_) => "duplicate",
            };
            info!(
                transaction_uuid = %payment.transaction_uuid,
                transaction_code = %payment.transaction_code,
                total_amount = %payment.total_amount,
                outcome,
                "Payment verified"
            );
            counter!("storefront_payment_callbacks_total", 1, "outcome" => outcome);
            see_other(SUCCESS_PAGE)
        }
        Err(e) => {
            error!(
                transaction_uuid = %payment.transaction_uuid,
                error = %e,
                "Verified payment could not be applied to an order"
            );
            counter!("storefront_payment_callbacks_total", 1, "outcome" => "unapplied");
            state
                .event_sender
                .send_or_log(Event::PaymentRejected {
                    reason: "order_not_updated".to_string(),
                })
                .await;
            see_other(FAILURE_PAGE)
        }
    }
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/api/initiate-payment", post(initiate_payment))
        .route("/esewa-callback", get(esewa_callback))
}
