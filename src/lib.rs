//! Storefront API Library
//!
//! Product catalog, order checkout and eSewa payment reconciliation behind an
//! axum HTTP surface.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod handlers;
pub mod health;
pub mod middleware_helpers;
pub mod migrator;
pub mod money;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{routing::get, Router};
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use tower_http::services::ServeDir;
use utoipa::ToSchema;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: events::EventSender,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires the services over a shared connection and an immutable gateway configuration.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
        event_sender: events::EventSender,
    ) -> Self {
        let services = handlers::AppServices::new(
            db.clone(),
            Arc::new(event_sender.clone()),
            config.gateway_config(),
        );
        Self {
            db,
            config,
            event_sender,
            services,
        }
    }
}

// Common response wrappers
#[derive(Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<ResponseMeta>,
}

#[derive(Serialize, ToSchema)]
pub struct ResponseMeta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    pub timestamp: String,
}

impl ResponseMeta {
    fn capture() -> Self {
        Self {
            request_id: crate::tracing::current_request_id().map(|rid| rid.as_str().to_string()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            meta: Some(ResponseMeta::capture()),
        }
    }
}

/// Storefront JSON API, gateway callback and admin surfaces.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health_check))
        .merge(handlers::storefront::storefront_routes())
        .merge(handlers::payments::payment_routes())
        .nest("/api/admin", handlers::admin::admin_api_routes())
        .nest("/admin", handlers::admin::admin_form_routes())
}

/// Full application router: API routes, OpenAPI docs, and the public
/// directory as a fallback for pages and assets.
pub fn app_router(state: AppState) -> Router {
    let public_dir = state.config.public_dir.clone();
    Router::new()
        .merge(api_routes())
        .merge(openapi::swagger_ui())
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
}
