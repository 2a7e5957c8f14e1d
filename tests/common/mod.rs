#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::{self, Body},
    http::{header, Method, Request},
    middleware,
    response::Response,
    Router,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};
use storefront_api::{
    app_router,
    config::AppConfig,
    db::{self, DbConfig},
    entities::order,
    events::{self, EventSender},
    gateway::signing_string,
    middleware_helpers::request_id_middleware,
    AppState,
};
use tower::ServiceExt;

/// Helper harness for spinning up the application over an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Fresh database with migrations applied and the default catalog seeded.
    pub async fn new() -> Self {
        Self::build(true).await
    }

    /// Fresh database with migrations applied and no products.
    pub async fn empty() -> Self {
        Self::build(false).await
    }

    async fn build(seed: bool) -> Self {
        let cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "development".to_string(),
        );

        let pool = db::establish_connection_with_config(&DbConfig::single_connection(
            cfg.database_url.clone(),
        ))
        .await
        .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let (event_sender, event_rx) = EventSender::channel(256);
        let event_task = tokio::spawn(events::process_events(event_rx));

        let state = AppState::new(Arc::new(pool), cfg, event_sender);
        if seed {
            state
                .services
                .catalog
                .seed_defaults()
                .await
                .expect("seed default catalog");
        }

        let router =
            app_router(state.clone()).layer(middleware::from_fn(request_id_middleware));

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional JSON body.
    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        self.send(builder.body(body).expect("failed to build request"))
            .await
    }

    /// POST with a raw body, for malformed payloads.
    pub async fn post_raw(&self, uri: &str, content_type: &str, body: &str) -> Response {
        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, content_type)
            .body(Body::from(body.to_string()))
            .expect("failed to build request");
        self.send(request).await
    }

    pub async fn send(&self, request: Request<Body>) -> Response {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.request(Method::GET, uri, None).await
    }

    /// Product id of a seeded catalog entry, looked up by name.
    pub async fn product_id(&self, name: &str) -> i32 {
        self.state
            .services
            .catalog
            .list_products()
            .await
            .expect("list products")
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .unwrap_or_else(|| panic!("product {name} not seeded"))
    }

    /// Places an order through the storefront API and returns its id.
    pub async fn place_order(&self, cart: Value, tax: f64, service: f64, delivery: f64) -> i32 {
        let response = self
            .request(
                Method::POST,
                "/api/order",
                Some(json!({
                    "customerName": "Asha Shrestha",
                    "customerEmail": "asha@example.com",
                    "customerPhone": "9800000000",
                    "customerAddress": "Kathmandu",
                    "cart": cart,
                    "tax_amount": tax,
                    "service_charge": service,
                    "delivery_charge": delivery,
                })),
            )
            .await;
        assert_eq!(response.status(), 201, "order creation should succeed");
        let body = response_json(response).await;
        body["orderId"].as_i64().expect("orderId in response") as i32
    }

    /// Two aviators with 5 + 2 + 3 in charges: subtotal 119.98, total 129.98.
    pub async fn place_aviator_order(&self) -> order::Model {
        let aviator = self.product_id("Classic Aviator Sunglasses").await;
        let id = self
            .place_order(json!([{ "productId": aviator, "quantity": 2 }]), 5.0, 2.0, 3.0)
            .await;
        self.order(id).await
    }

    pub async fn order(&self, id: i32) -> order::Model {
        self.state
            .services
            .orders
            .get_order(id)
            .await
            .expect("order exists")
    }

    pub async fn order_by_transaction(&self, transaction_uuid: &str) -> order::Model {
        self.state
            .services
            .orders
            .get_order_by_transaction(transaction_uuid)
            .await
            .expect("order exists")
    }

    /// Base64 callback payload signed with the configured merchant secret.
    pub fn signed_callback_data(
        &self,
        transaction_uuid: &str,
        total_amount: &str,
        status: &str,
    ) -> String {
        let payments = &self.state.services.payments;
        let product_code = payments.config().product_code.clone();
        let signed_field_names =
            "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names";
        let message = signing_string(&[
            ("transaction_code", "000AWEO"),
            ("status", status),
            ("total_amount", total_amount),
            ("transaction_uuid", transaction_uuid),
            ("product_code", product_code.as_str()),
            ("signed_field_names", signed_field_names),
        ]);

        let payload = json!({
            "transaction_code": "000AWEO",
            "status": status,
            "total_amount": total_amount,
            "transaction_uuid": transaction_uuid,
            "product_code": product_code,
            "signed_field_names": signed_field_names,
            "signature": payments.sign(&message),
        });
        STANDARD.encode(payload.to_string())
    }

    /// Hits the gateway callback with `data` as the query payload.
    pub async fn callback(&self, data: &str) -> Response {
        self.get(&format!("/esewa-callback?data={}", encode_query_value(data)))
            .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

/// Percent-encodes the characters base64 shares with query syntax.
pub fn encode_query_value(value: &str) -> String {
    value
        .replace('%', "%25")
        .replace('+', "%2B")
        .replace('/', "%2F")
        .replace('=', "%3D")
        .replace('&', "%26")
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

pub fn location(response: &Response) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("redirect location")
}
