use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    entities::{order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    money::round_currency,
};
use chrono::{DateTime, Utc};
use metrics::counter;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter,
    QueryOrder, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Customer contact details captured at checkout.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CustomerDetails {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
}

/// One requested cart entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub product_id: i32,
    pub quantity: i32,
}

/// Flat charges added on top of the item subtotal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Charges {
    pub tax_amount: Decimal,
    pub service_charge: Decimal,
    pub delivery_charge: Decimal,
}

impl Charges {
    /// Each charge rounded to two places, as stored on the order.
    pub fn rounded(&self) -> Self {
        Self {
            tax_amount: round_currency(self.tax_amount),
            service_charge: round_currency(self.service_charge),
            delivery_charge: round_currency(self.delivery_charge),
        }
    }

    /// `None` when the sum overflows.
    pub fn checked_sum(&self) -> Option<Decimal> {
        self.tax_amount
            .checked_add(self.service_charge)?
            .checked_add(self.delivery_charge)
    }
}

/// Subtotal and grand total of an order, both rounded to two places.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Decimal,
    pub total: Decimal,
}

impl OrderTotals {
    /// `lines` are `(unit price, quantity)` pairs. Charges are rounded
    /// before they are added, so the total equals the sum of the stored
    /// components.
    pub fn compute(lines: &[(Decimal, i32)], charges: &Charges) -> Result<Self, ServiceError> {
        let overflow = || ServiceError::ValidationError("Order amount is too large".to_string());

        let subtotal = lines
            .iter()
            .try_fold(Decimal::ZERO, |acc, (price, quantity)| {
                price
                    .checked_mul(Decimal::from(*quantity))
                    .and_then(|line| acc.checked_add(line))
            })
            .map(round_currency)
            .ok_or_else(overflow)?;
        let total = charges
            .rounded()
            .checked_sum()
            .and_then(|charges| subtotal.checked_add(charges))
            .map(round_currency)
            .ok_or_else(overflow)?;
        Ok(Self { subtotal, total })
    }
}

/// Outcome of [`OrderService::set_status`].
#[derive(Debug, Clone, PartialEq)]
pub enum StatusTransition {
    Applied {
        order: OrderModel,
        previous: OrderStatus,
    },
    /// The order already had the requested status.
    Unchanged(OrderModel),
}

impl StatusTransition {
    pub fn order(&self) -> &OrderModel {
        match self {
            StatusTransition::Applied { order, .. } => order,
            StatusTransition::Unchanged(order) => order,
        }
    }

    pub fn was_applied(&self) -> bool {
        matches!(self, StatusTransition::Applied { .. })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: i32,
    pub transaction_uuid: String,
    pub customer_name: String,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_address: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub tax_amount: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub service_charge: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub delivery_charge: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub total_amount: Decimal,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<OrderModel> for OrderResponse {
    fn from(model: OrderModel) -> Self {
        Self {
            id: model.id,
            transaction_uuid: model.transaction_uuid,
            customer_name: model.customer_name,
            customer_email: model.customer_email,
            customer_phone: model.customer_phone,
            customer_address: model.customer_address,
            amount: round_currency(model.amount),
            tax_amount: round_currency(model.tax_amount),
            service_charge: round_currency(model.service_charge),
            delivery_charge: round_currency(model.delivery_charge),
            total_amount: round_currency(model.total_amount),
            status: model.status,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemResponse {
    pub id: i32,
    pub product_id: i32,
    /// Current product name, if the product still exists
    pub product_name: Option<String>,
    pub quantity: i32,
    /// Unit price captured when the order was placed
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64)]
    pub price: Decimal,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderDetailResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub items: Vec<OrderItemResponse>,
}

/// Service for the order lifecycle: creation, lookup and status changes.
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl OrderService {
    /// Creates a new order service instance
    pub fn new(db_pool: Arc<DbPool>, event_sender: Option<Arc<EventSender>>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(sender) = &self.event_sender {
            sender.send_or_log(event).await;
        }
    }

    fn validate_cart(cart: &[CartLine], charges: &Charges) -> Result<(), ServiceError> {
        if cart.is_empty() {
            return Err(ServiceError::ValidationError("Cart is empty".to_string()));
        }
        if let Some(line) = cart.iter().find(|line| line.quantity < 1) {
            return Err(ServiceError::ValidationError(format!(
                "Quantity for product {} must be at least 1",
                line.product_id
            )));
        }
        let negative = [
            ("tax_amount", charges.tax_amount),
            ("service_charge", charges.service_charge),
            ("delivery_charge", charges.delivery_charge),
        ]
        .into_iter()
        .find(|(_, value)| value.is_sign_negative() && !value.is_zero());
        if let Some((field, _)) = negative {
            return Err(ServiceError::ValidationError(format!(
                "{} cannot be negative",
                field
            )));
        }
        Ok(())
    }

    /// Prices the cart at current product prices and persists an INITIATED
    /// order with its items in a single transaction.
    #[instrument(skip(self, customer, cart, charges), fields(lines = cart.len()))]
    pub async fn create_order(
        &self,
        customer: CustomerDetails,
        cart: &[CartLine],
        charges: Charges,
    ) -> Result<OrderModel, ServiceError> {
        Self::validate_cart(cart, &charges)?;
        let charges = charges.rounded();

        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let product_ids: Vec<i32> = cart.iter().map(|line| line.product_id).collect();
        let prices: HashMap<i32, Decimal> = product::Entity::find()
            .filter(product::Column::Id.is_in(product_ids))
            .all(&txn)
            .await?
            .into_iter()
            .map(|p| (p.id, p.price))
            .collect();

        let mut priced = Vec::with_capacity(cart.len());
        for line in cart {
            let price = prices.get(&line.product_id).copied().ok_or_else(|| {
                warn!(product_id = line.product_id, "Order references unknown product");
                ServiceError::NotFound(format!("Product {} not found", line.product_id))
            })?;
            priced.push((*line, round_currency(price)));
        }

        let totals = OrderTotals::compute(
            &priced
                .iter()
                .map(|(line, price)| (*price, line.quantity))
                .collect::<Vec<_>>(),
            &charges,
        )?;
        let transaction_uuid = Uuid::new_v4().to_string();

        let order_model = order::ActiveModel {
            transaction_uuid: Set(transaction_uuid.clone()),
            customer_name: Set(customer.name),
            customer_email: Set(customer.email),
            customer_phone: Set(customer.phone),
            customer_address: Set(customer.address),
            amount: Set(totals.subtotal),
            tax_amount: Set(charges.tax_amount),
            service_charge: Set(charges.service_charge),
            delivery_charge: Set(charges.delivery_charge),
            total_amount: Set(totals.total),
            status: Set(OrderStatus::Initiated),
            ..Default::default()
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, %transaction_uuid, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        for (line, price) in &priced {
            order_item::ActiveModel {
                order_id: Set(order_model.id),
                product_id: Set(line.product_id),
                quantity: Set(line.quantity),
                price: Set(*price),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(|e| {
                error!(error = %e, order_id = order_model.id, "Failed to create order item");
                ServiceError::DatabaseError(e)
            })?;
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = order_model.id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        counter!("storefront_orders_created_total", 1);
        info!(
            order_id = order_model.id,
            transaction_uuid = %order_model.transaction_uuid,
            total_amount = %order_model.total_amount,
            "Order created successfully"
        );
        self.emit(Event::OrderCreated {
            order_id: order_model.id,
            transaction_uuid: order_model.transaction_uuid.clone(),
        })
        .await;

        Ok(order_model)
    }

    #[instrument(skip(self), fields(order_id = id))]
    pub async fn get_order(&self, id: i32) -> Result<OrderModel, ServiceError> {
        OrderEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", id)))
    }

    #[instrument(skip(self))]
    pub async fn get_order_by_transaction(
        &self,
        transaction_uuid: &str,
    ) -> Result<OrderModel, ServiceError> {
        find_by_transaction(&*self.db_pool, transaction_uuid)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with transaction {} not found", transaction_uuid))
            })
    }

    /// Order with its items, each joined to the product's current name.
    #[instrument(skip(self), fields(order_id = id))]
    pub async fn get_order_with_items(&self, id: i32) -> Result<OrderDetailResponse, ServiceError> {
        let order = self.get_order(id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order.id))
            .order_by_asc(order_item::Column::Id)
            .find_also_related(product::Entity)
            .all(&*self.db_pool)
            .await?
            .into_iter()
            .map(|(item, product)| OrderItemResponse {
                id: item.id,
                product_id: item.product_id,
                product_name: product.map(|p| p.name),
                quantity: item.quantity,
                price: round_currency(item.price),
            })
            .collect();

        Ok(OrderDetailResponse {
            order: order.into(),
            items,
        })
    }

    /// All orders, newest first.
    #[instrument(skip(self))]
    pub async fn list_orders(&self) -> Result<Vec<OrderResponse>, ServiceError> {
        let orders = OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .order_by_desc(order::Column::Id)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list orders");
                ServiceError::DatabaseError(e)
            })?;

        Ok(orders.into_iter().map(OrderResponse::from).collect())
    }

    /// Moves the order identified by `transaction_uuid` to `status`.
    ///
    /// Repeating the current status is reported as unchanged. Only
    /// INITIATED -> COMPLETED and INITIATED -> FAILED are applied; every
    /// other change is an invalid operation. The write is conditional on the
    /// status read inside the same transaction, so concurrent callers apply it
    /// at most once.
    #[instrument(skip(self), fields(new_status = %status))]
    pub async fn set_status(
        &self,
        transaction_uuid: &str,
        status: OrderStatus,
    ) -> Result<StatusTransition, ServiceError> {
        let txn = self.db_pool.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for status update");
            ServiceError::DatabaseError(e)
        })?;

        let current = find_by_transaction(&txn, transaction_uuid)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with transaction {} not found", transaction_uuid))
            })?;

        if current.status == status {
            info!(order_id = current.id, "Order already has requested status");
            return Ok(StatusTransition::Unchanged(current));
        }

        if !current.status.can_transition_to(status) {
            warn!(
                order_id = current.id,
                current_status = %current.status,
                "Rejected order status transition"
            );
            return Err(ServiceError::InvalidOperation(format!(
                "Cannot change order status from {} to {}",
                current.status, status
            )));
        }

        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(status))
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::TransactionUuid.eq(transaction_uuid))
            .filter(order::Column::Status.eq(current.status))
            .exec(&txn)
            .await?;

        let updated = find_by_transaction(&txn, transaction_uuid)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Order with transaction {} not found", transaction_uuid))
            })?;

        if result.rows_affected == 0 {
            // Another writer got there first.
            return if updated.status == status {
                Ok(StatusTransition::Unchanged(updated))
            } else {
                Err(ServiceError::InvalidOperation(format!(
                    "Cannot change order status from {} to {}",
                    updated.status, status
                )))
            };
        }

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = current.id, "Failed to commit status update transaction");
            ServiceError::DatabaseError(e)
        })?;

        counter!("storefront_order_status_changes_total", 1, "status" => status.as_str());
        info!(
            order_id = updated.id,
            old_status = %current.status,
            "Order status updated"
        );
        self.emit(Event::OrderStatusChanged {
            transaction_uuid: updated.transaction_uuid.clone(),
            old_status: current.status,
            new_status: status,
        })
        .await;

        Ok(StatusTransition::Applied {
            order: updated,
            previous: current.status,
        })
    }
}

async fn find_by_transaction<C: ConnectionTrait>(
    db: &C,
    transaction_uuid: &str,
) -> Result<Option<OrderModel>, ServiceError> {
    Ok(OrderEntity::find()
        .filter(order::Column::TransactionUuid.eq(transaction_uuid))
        .one(db)
        .await?)
}
