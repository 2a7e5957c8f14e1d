use crate::{
    errors::{ApiError, ServiceError},
    handlers::common::{created_response, json_body, success_response, validate_input},
    services::catalog::ProductResponse,
    services::orders::{CartLine, Charges, CustomerDetails},
    AppState,
};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ProductListResponse {
    pub products: Vec<ProductResponse>,
}

/// One cart entry as posted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CartItemPayload {
    #[serde(rename = "productId", alias = "product_id")]
    pub product_id: i32,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

/// Checkout body. Field names follow the storefront script.
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
pub struct CreateOrderPayload {
    #[serde(rename = "customerName", alias = "customer_name")]
    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub customer_name: String,
    #[serde(rename = "customerEmail", alias = "customer_email")]
    pub customer_email: Option<String>,
    #[serde(rename = "customerPhone", alias = "customer_phone")]
    pub customer_phone: Option<String>,
    #[serde(rename = "customerAddress", alias = "customer_address")]
    pub customer_address: Option<String>,
    #[validate(length(min = 1, message = "Cart is empty"))]
    pub cart: Vec<CartItemPayload>,
    #[serde(alias = "taxAmount")]
    #[schema(value_type = f64, example = 5.0)]
    pub tax_amount: Decimal,
    #[serde(alias = "serviceCharge")]
    #[schema(value_type = f64, example = 2.0)]
    pub service_charge: Decimal,
    #[serde(alias = "deliveryCharge")]
    #[schema(value_type = f64, example = 3.0)]
    pub delivery_charge: Decimal,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderCreatedResponse {
    pub order_id: i32,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Storefront catalog
#[utoipa::path(
    get,
    path = "/api/products",
    summary = "List products",
    responses(
        (status = 200, description = "Catalog", body = ProductListResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response, ApiError> {
    let products = state.services.catalog.list_products().await?;
    Ok(success_response(ProductListResponse { products }))
}

/// Checkout: price the cart and create an INITIATED order
#[utoipa::path(
    post,
    path = "/api/order",
    summary = "Create order",
    request_body = CreateOrderPayload,
    responses(
        (status = 201, description = "Order created", body = OrderCreatedResponse),
        (status = 400, description = "Malformed body or unknown product", body = crate::errors::ErrorResponse),
        (status = 500, description = "Internal server error", body = crate::errors::ErrorResponse)
    ),
    tag = "Storefront"
)]
#[instrument(skip(state, payload))]
pub async fn create_order(
    State(state): State<AppState>,
    payload: Result<Json<CreateOrderPayload>, JsonRejection>,
) -> Result<Response, ApiError> {
    let payload = json_body(payload)?;
    validate_input(&payload)?;

    let customer = CustomerDetails {
        name: payload.customer_name.trim().to_string(),
        email: non_blank(payload.customer_email),
        phone: non_blank(payload.customer_phone),
        address: non_blank(payload.customer_address),
    };
    let cart: Vec<CartLine> = payload
        .cart
        .iter()
        .map(|item| CartLine {
            product_id: item.product_id,
            quantity: item.quantity,
        })
        .collect();
    let charges = Charges {
        tax_amount: payload.tax_amount,
        service_charge: payload.service_charge,
        delivery_charge: payload.delivery_charge,
    };

    let order = state
        .services
        .orders
        .create_order(customer, &cart, charges)
        .await
        .map_err(|e| match e {
            // An unknown product is a problem with the request, not a missing resource.
            ServiceError::NotFound(msg) => ServiceError::BadRequest(msg),
            other => other,
        })?;

    Ok(created_response(OrderCreatedResponse { order_id: order.id }))
}

pub fn storefront_routes() -> Router<AppState> {
    Router::new()
        .route("/api/products", get(list_products))
        .route("/api/order", post(create_order))
}
