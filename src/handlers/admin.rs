use crate::{
    entities::OrderStatus,
    errors::{ApiError, ServiceError},
    handlers::common::{created_response, json_body, see_other, success_response},
    services::catalog::{ProductInput, ProductResponse},
    services::orders::{OrderDetailResponse, OrderResponse, StatusTransition},
    ApiResponse, AppState,
};
use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    response::{Redirect, Response},
    routing::{get, post, put},
    Json, Router,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};

pub const PRODUCTS_PAGE: &str = "/admin/products.html";
pub const ORDERS_PAGE: &str = "/admin/orders.html";

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct DeletedResponse {
    pub id: i32,
}

/// Result of an admin status action.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct StatusChangeResponse {
    pub order: OrderResponse,
    /// False when the order already had the requested status
    pub changed: bool,
}

impl From<StatusTransition> for StatusChangeResponse {
    fn from(transition: StatusTransition) -> Self {
        let changed = transition.was_applied();
        let order = match transition {
            StatusTransition::Applied { order, .. } => order,
            StatusTransition::Unchanged(order) => order,
        };
        Self {
            order: order.into(),
            changed,
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/admin/products",
    summary = "List products",
    responses(
        (status = 200, description = "All products", body = ApiResponse<Vec<ProductResponse>>)
    ),
    tag = "Admin"
)]
pub async fn list_products(State(state): State<AppState>) -> Result<Response, ApiError> {
    let products = state.services.catalog.list_products().await?;
    Ok(success_response(ApiResponse::success(products)))
}

#[utoipa::path(
    post,
    path = "/api/admin/products",
    summary = "Create product",
    request_body = ProductInput,
    responses(
        (status = 201, description = "Product created", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
#[instrument(skip(state, payload))]
pub async fn create_product(
    State(state): State<AppState>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(payload)?;
    let product = state.services.catalog.create_product(input).await?;
    Ok(created_response(ApiResponse::success(product)))
}

#[utoipa::path(
    put,
    path = "/api/admin/products/{id}",
    summary = "Replace product",
    params(("id" = i32, Path, description = "Product id")),
    request_body = ProductInput,
    responses(
        (status = 200, description = "Product updated", body = ApiResponse<ProductResponse>),
        (status = 400, description = "Invalid product", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
#[instrument(skip(state, payload))]
pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    payload: Result<Json<ProductInput>, JsonRejection>,
) -> Result<Response, ApiError> {
    let input = json_body(payload)?;
    let product = state.services.catalog.update_product(id, input).await?;
    Ok(success_response(ApiResponse::success(product)))
}

#[utoipa::path(
    delete,
    path = "/api/admin/products/{id}",
    summary = "Delete product",
    params(("id" = i32, Path, description = "Product id")),
    responses(
        (status = 200, description = "Product deleted", body = ApiResponse<DeletedResponse>),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Product is referenced by orders", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
#[instrument(skip(state))]
pub async fn delete_product(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    state.services.catalog.delete_product(id).await?;
    Ok(success_response(ApiResponse::success(DeletedResponse { id })))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders",
    summary = "List orders",
    description = "All orders, newest first",
    responses(
        (status = 200, description = "Orders", body = ApiResponse<Vec<OrderResponse>>)
    ),
    tag = "Admin"
)]
pub async fn list_orders(State(state): State<AppState>) -> Result<Response, ApiError> {
    let orders = state.services.orders.list_orders().await?;
    Ok(success_response(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/admin/orders/{id}",
    summary = "Get order with items",
    params(("id" = i32, Path, description = "Order id")),
    responses(
        (status = 200, description = "Order with items", body = ApiResponse<OrderDetailResponse>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Response, ApiError> {
    let order = state.services.orders.get_order_with_items(id).await?;
    Ok(success_response(ApiResponse::success(order)))
}

#[utoipa::path(
    post,
    path = "/api/admin/transactions/{transaction_uuid}/confirm",
    summary = "Mark order paid",
    params(("transaction_uuid" = String, Path, description = "Gateway transaction id")),
    responses(
        (status = 200, description = "Order is COMPLETED", body = ApiResponse<StatusChangeResponse>),
        (status = 400, description = "Order already failed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
#[instrument(skip(state))]
pub async fn confirm_order(
    State(state): State<AppState>,
    Path(transaction_uuid): Path<String>,
) -> Result<Response, ApiError> {
    let transition = state
        .services
        .orders
        .set_status(&transaction_uuid, OrderStatus::Completed)
        .await?;
    Ok(success_response(ApiResponse::success(
        StatusChangeResponse::from(transition),
    )))
}

#[utoipa::path(
    post,
    path = "/api/admin/transactions/{transaction_uuid}/fail",
    summary = "Mark order failed",
    params(("transaction_uuid" = String, Path, description = "Gateway transaction id")),
    responses(
        (status = 200, description = "Order is FAILED", body = ApiResponse<StatusChangeResponse>),
        (status = 400, description = "Order already completed", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Admin"
)]
#[instrument(skip(state))]
pub async fn fail_order(
    State(state): State<AppState>,
    Path(transaction_uuid): Path<String>,
) -> Result<Response, ApiError> {
    let transition = state
        .services
        .orders
        .set_status(&transaction_uuid, OrderStatus::Failed)
        .await?;
    Ok(success_response(ApiResponse::success(
        StatusChangeResponse::from(transition),
    )))
}

/// Query string of the product form on the admin page.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct SaveProductQuery {
    /// Present when editing an existing product
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<String>,
    pub image_url: Option<String>,
}

fn filled(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl SaveProductQuery {
    /// Target id (if any) and product fields, or `None` when the form is incomplete.
    fn into_input(self) -> Result<Option<(Option<i32>, ProductInput)>, ServiceError> {
        let (Some(name), Some(description), Some(price), Some(image_url)) = (
            filled(&self.name),
            filled(&self.description),
            filled(&self.price),
            filled(&self.image_url),
        ) else {
            return Ok(None);
        };

        let price = Decimal::from_str(price)
            .map_err(|_| ServiceError::ValidationError(format!("Invalid price: {}", price)))?;
        let id = filled(&self.id)
            .map(|raw| {
                raw.parse::<i32>()
                    .map_err(|_| ServiceError::ValidationError(format!("Invalid id: {}", raw)))
            })
            .transpose()?;

        Ok(Some((
            id,
            ProductInput {
                name: name.to_string(),
                description: Some(description.to_string()),
                price,
                image_url: Some(image_url.to_string()),
            },
        )))
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct DeleteProductQuery {
    pub id: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ConfirmOrderQuery {
    pub transaction_uuid: Option<String>,
}

/// Creates or updates a product from the admin form, then returns to the product page.
/// Incomplete forms and failures leave the catalog untouched.
#[utoipa::path(
    get,
    path = "/admin/save-product",
    params(SaveProductQuery),
    responses((status = 303, description = "Redirect to the product admin page")),
    tag = "Admin forms"
)]
pub async fn save_product_form(
    State(state): State<AppState>,
    query: Option<Query<SaveProductQuery>>,
) -> Redirect {
    let query = query.map(|Query(q)| q).unwrap_or_default();
    let catalog = &state.services.catalog;

    let result = match query.into_input() {
        Ok(Some((Some(id), input))) => catalog.update_product(id, input).await.map(|p| p.id),
        Ok(Some((None, input))) => catalog.create_product(input).await.map(|p| p.id),
        Ok(None) => {
            info!("Ignoring incomplete product form");
            return see_other(PRODUCTS_PAGE);
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(id) => info!(product_id = id, "Product saved from admin form"),
        Err(e) => warn!(error = %e, "Admin product form was not saved"),
    }
    see_other(PRODUCTS_PAGE)
}

#[utoipa::path(
    get,
    path = "/admin/delete-product",
    params(DeleteProductQuery),
    responses((status = 303, description = "Redirect to the product admin page")),
    tag = "Admin forms"
)]
pub async fn delete_product_form(
    State(state): State<AppState>,
    query: Option<Query<DeleteProductQuery>>,
) -> Redirect {
    let id = query
        .as_ref()
        .and_then(|Query(q)| filled(&q.id))
        .and_then(|raw| raw.parse::<i32>().ok());

    match id {
        Some(id) => {
            if let Err(e) = state.services.catalog.delete_product(id).await {
                warn!(product_id = id, error = %e, "Admin product delete failed");
            }
        }
        None => info!("Ignoring product delete without a valid id"),
    }
    see_other(PRODUCTS_PAGE)
}

#[utoipa::path(
    get,
    path = "/admin/orders/confirm",
    params(ConfirmOrderQuery),
    responses((status = 303, description = "Redirect to the order admin page")),
    tag = "Admin forms"
)]
pub async fn confirm_order_form(
    State(state): State<AppState>,
    query: Option<Query<ConfirmOrderQuery>>,
) -> Redirect {
    let transaction_uuid = query
        .as_ref()
        .and_then(|Query(q)| filled(&q.transaction_uuid))
        .map(str::to_string);

    match transaction_uuid {
        Some(transaction_uuid) => {
            match state
                .services
                .orders
                .set_status(&transaction_uuid, OrderStatus::Completed)
                .await
            {
                Ok(transition) => info!(
                    %transaction_uuid,
                    changed = transition.was_applied(),
                    "Order confirmed from admin page"
                ),
                Err(e) => warn!(%transaction_uuid, error = %e, "Admin order confirm failed"),
            }
        }
        None => info!("Ignoring order confirm without transaction_uuid"),
    }
    see_other(ORDERS_PAGE)
}

/// JSON admin API, nested under `/api/admin`.
pub fn admin_api_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(list_products).post(create_product))
        .route("/products/:id", put(update_product).delete(delete_product))
        .route("/orders", get(list_orders))
        .route("/orders/:id", get(get_order))
        .route(
            "/transactions/:transaction_uuid/confirm",
            post(confirm_order),
        )
        .route("/transactions/:transaction_uuid/fail", post(fail_order))
}

/// Redirecting form actions used by the static admin pages, nested under `/admin`.
pub fn admin_form_routes() -> Router<AppState> {
    Router::new()
        .route("/save-product", get(save_product_form))
        .route("/delete-product", get(delete_product_form))
        .route("/orders/confirm", get(confirm_order_form))
}
