pub mod admin;
pub mod common;
pub mod payments;
pub mod storefront;

use crate::db::DbPool;
use crate::events::EventSender;
use crate::gateway::{GatewayConfig, PaymentAdapter};
use crate::services::{CatalogService, OrderService};
use std::sync::Arc;

// Re-export AppState so handler modules can import it as crate::handlers::AppState
pub use crate::AppState;

/// Services layer that encapsulates business logic used by HTTP handlers
#[derive(Clone)]
pub struct AppServices {
    pub catalog: Arc<CatalogService>,
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentAdapter>,
}

impl AppServices {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        gateway: GatewayConfig,
    ) -> Self {
        Self {
            catalog: Arc::new(CatalogService::new(
                db_pool.clone(),
                Some(event_sender.clone()),
            )),
            orders: Arc::new(OrderService::new(db_pool, Some(event_sender))),
            payments: Arc::new(PaymentAdapter::new(gateway)),
        }
    }
}
