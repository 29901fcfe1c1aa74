use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::store::StoreError;
use super::value_objects::Dish;

/// Read access to the menu, used to resolve line items.
#[async_trait]
pub trait DishCatalog: Send + Sync {
    async fn find_dish(&self, dish_id: Uuid) -> Result<Option<Dish>, StoreError>;
}

/// Menu held in process memory. Used by the demo binary and by tests.
#[derive(Clone, Default)]
pub struct InMemoryDishCatalog {
    dishes: Arc<RwLock<HashMap<Uuid, Dish>>>,
}

impl InMemoryDishCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn upsert(&self, dish: Dish) {
        self.dishes.write().await.insert(dish.id, dish);
    }

    /// Returns false when the dish is unknown.
    pub async fn update_price(&self, dish_id: Uuid, price: Decimal) -> bool {
        match self.dishes.write().await.get_mut(&dish_id) {
            Some(dish) => {
                tracing::debug!(dish_id = %dish_id, old = %dish.price, new = %price, "Dish price changed");
                dish.price = price;
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl DishCatalog for InMemoryDishCatalog {
    async fn find_dish(&self, dish_id: Uuid) -> Result<Option<Dish>, StoreError> {
        Ok(self.dishes.read().await.get(&dish_id).cloned())
    }
}
