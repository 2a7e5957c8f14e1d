use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub const OPENAPI_JSON_PATH: &str = "/api-docs/openapi.json";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Storefront API",
        version = "0.1.0",
        description = r#"
# Storefront API

Product catalog, checkout and eSewa payment reconciliation.

## Payment flow

1. `POST /api/order` prices the cart and creates an `INITIATED` order.
2. `POST /api/initiate-payment` returns the signed form to post to the gateway.
3. The gateway redirects to `GET /esewa-callback`; a verified `COMPLETE`
   payload marks the order `COMPLETED`.

Storefront endpoints return plain JSON. Admin endpoints wrap results in an
envelope with `success`, `data`, `message` and `meta`.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8000", description = "Local development")
    ),
    tags(
        (name = "Storefront", description = "Catalog and checkout"),
        (name = "Payments", description = "Gateway form and callback"),
        (name = "Admin", description = "Catalog and order administration"),
        (name = "Admin forms", description = "Redirecting actions used by the admin pages"),
        (name = "Health", description = "Health check endpoints")
    ),
    paths(
        crate::health::health_check,

        crate::handlers::storefront::list_products,
        crate::handlers::storefront::create_order,

        crate::handlers::payments::initiate_payment,
        crate::handlers::payments::esewa_callback,

        crate::handlers::admin::list_products,
        crate::handlers::admin::create_product,
        crate::handlers::admin::update_product,
        crate::handlers::admin::delete_product,
        crate::handlers::admin::list_orders,
        crate::handlers::admin::get_order,
        crate::handlers::admin::confirm_order,
        crate::handlers::admin::fail_order,
        crate::handlers::admin::save_product_form,
        crate::handlers::admin::delete_product_form,
        crate::handlers::admin::confirm_order_form,
    ),
    components(
        schemas(
            crate::ResponseMeta,
            crate::entities::OrderStatus,
            crate::services::catalog::ProductInput,
            crate::services::catalog::ProductResponse,
            crate::services::orders::OrderResponse,
            crate::services::orders::OrderItemResponse,
            crate::services::orders::OrderDetailResponse,
            crate::handlers::storefront::ProductListResponse,
            crate::handlers::storefront::CreateOrderPayload,
            crate::handlers::storefront::CartItemPayload,
            crate::handlers::storefront::OrderCreatedResponse,
            crate::handlers::payments::InitiatePaymentPayload,
            crate::handlers::payments::OrderIdParam,
            crate::handlers::admin::DeletedResponse,
            crate::handlers::admin::StatusChangeResponse,
            crate::gateway::PaymentRequest,
            crate::gateway::PaymentFormData,
            crate::health::HealthInfo,
            crate::health::HealthDetail,
            crate::health::HealthStatus,

            // Error types
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDoc;

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui")
        .url(OPENAPI_JSON_PATH, ApiDoc::openapi())
        .config(utoipa_swagger_ui::Config::from(OPENAPI_JSON_PATH).try_it_out_enabled(true))
}
