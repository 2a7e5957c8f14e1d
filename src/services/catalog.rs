use crate::{
    db::DbPool,
    entities::{order_item, product},
    errors::ServiceError,
    events::{Event, EventSender},
    money::round_currency,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument};
use utoipa::ToSchema;
use validator::{Validate, ValidationError};

/// Fields accepted when creating or replacing a product.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200, message = "Product name is required"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(custom = "validate_price")]
    #[schema(value_type = f64, example = 59.99)]
    pub price: Decimal,
    pub image_url: Option<String>,
}

fn validate_price(price: &Decimal) -> Result<(), ValidationError> {
    if price.is_sign_negative() {
        let mut err = ValidationError::new("price_negative");
        err.message = Some("Price cannot be negative".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProductResponse {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    #[serde(with = "rust_decimal::serde::float")]
    #[schema(value_type = f64, example = 59.99)]
    pub price: Decimal,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<product::Model> for ProductResponse {
    fn from(model: product::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            description: model.description,
            price: round_currency(model.price),
            image_url: model.image_url,
            created_at: model.created_at,
            updated_at: model.updated_at,
        }
    }
}

/// Starter catalog inserted into an empty database.
fn default_catalog() -> Vec<ProductInput> {
    let entry = |name: &str, description: &str, price: Decimal, image: &str| ProductInput {
        name: name.to_string(),
        description: Some(description.to_string()),
        price,
        image_url: Some(format!("/static/images/{}", image)),
    };
    vec![
        entry(
            "Classic Aviator Sunglasses",
            "Timeless aviator frames with UV400 protection and mirrored lenses.",
            dec!(59.99),
            "aviator.svg",
        ),
        entry(
            "Retro Round Sunglasses",
            "Vintage-inspired round sunglasses with polarized lenses.",
            dec!(45.50),
            "retro.svg",
        ),
        entry(
            "Sporty Wraparound Shades",
            "Durable wraparound sunglasses designed for outdoor sports.",
            dec!(39.00),
            "sporty.svg",
        ),
        entry(
            "Lucky Purchase",
            "Try your luck! Mystery sunglasses at an amazing price.",
            dec!(1.00),
            "lucky.svg",
        ),
    ]
}

/// Product catalog backed by the `products` table.
#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
    event_sender: Option<Arc<EventSender>>,
}

impl CatalogService {
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

    #[instrument(skip(self))]
    pub async fn list_products(&self) -> Result<Vec<ProductResponse>, ServiceError> {
        let products = product::Entity::find()
            .order_by_asc(product::Column::Id)
            .all(&*self.db_pool)
            .await
            .map_err(|e| {
                error!(error = %e, "Failed to list products");
                ServiceError::DatabaseError(e)
            })?;

        Ok(products.into_iter().map(ProductResponse::from).collect())
    }

    #[instrument(skip(self), fields(product_id = id))]
    pub async fn get_product(&self, id: i32) -> Result<ProductResponse, ServiceError> {
        product::Entity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .map(ProductResponse::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))
    }

    #[instrument(skip(self, input), fields(name = %input.name))]
    pub async fn create_product(&self, input: ProductInput) -> Result<ProductResponse, ServiceError> {
        input.validate()?;

        let model = product::ActiveModel {
            name: Set(input.name),
            description: Set(input.description),
            price: Set(round_currency(input.price)),
            image_url: Set(input.image_url),
            ..Default::default()
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to create product");
            ServiceError::DatabaseError(e)
        })?;

        info!(product_id = model.id, "Product created");
        self.emit(Event::ProductCreated(model.id)).await;
        Ok(model.into())
    }

    #[instrument(skip(self, input), fields(product_id = id))]
    pub async fn update_product(
        &self,
        id: i32,
        input: ProductInput,
    ) -> Result<ProductResponse, ServiceError> {
        input.validate()?;
        let db = &*self.db_pool;

        let existing = product::Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", id)))?;

        let mut active: product::ActiveModel = existing.into();
        active.name = Set(input.name);
        active.description = Set(input.description);
        active.price = Set(round_currency(input.price));
        active.image_url = Set(input.image_url);

        let model = active.update(db).await.map_err(|e| {
            error!(error = %e, "Failed to update product");
            ServiceError::DatabaseError(e)
        })?;

        self.emit(Event::ProductUpdated(model.id)).await;
        Ok(model.into())
    }

    /// Deletes a product unless an order item still references it.
    #[instrument(skip(self), fields(product_id = id))]
    pub async fn delete_product(&self, id: i32) -> Result<(), ServiceError> {
        let db = &*self.db_pool;

        let references = order_item::Entity::find()
            .filter(order_item::Column::ProductId.eq(id))
            .count(db)
            .await?;
        if references > 0 {
            return Err(ServiceError::Conflict(format!(
                "Product {} is referenced by existing orders",
                id
            )));
        }

        let result = product::Entity::delete_by_id(id).exec(db).await.map_err(|e| {
            error!(error = %e, "Failed to delete product");
            ServiceError::DatabaseError(e)
        })?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {} not found", id)));
        }

        info!("Product deleted");
        self.emit(Event::ProductDeleted(id)).await;
        Ok(())
    }

    /// Inserts the starter catalog when no products exist. Returns how many were added.
    #[instrument(skip(self))]
    pub async fn seed_defaults(&self) -> Result<usize, ServiceError> {
        let db = &*self.db_pool;
        if product::Entity::find().count(db).await? > 0 {
            return Ok(0);
        }

        let catalog = default_catalog();
        let inserted = catalog.len();
        for input in catalog {
            product::ActiveModel {
                name: Set(input.name),
                description: Set(input.description),
                price: Set(input.price),
                image_url: Set(input.image_url),
                ..Default::default()
            }
            .insert(db)
            .await?;
        }

        info!(count = inserted, "Seeded default catalog");
        Ok(inserted)
    }
}
