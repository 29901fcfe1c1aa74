use std::sync::Arc;
use uuid::Uuid;

use crate::event_sourcing::EventEnvelope;
use crate::store::OrderStore;

use super::aggregate::OrderAggregate;
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::{OrderStatus, KITCHEN_STATUSES};

/// Read side of the order lifecycle: lookups and status boards.
///
/// Listings keep insertion order and return an empty `Vec` when nothing
/// matches.
pub struct OrderQueryHandler {
    store: Arc<dyn OrderStore>,
}

impl OrderQueryHandler {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self { store }
    }

    pub async fn find_by_id(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        tracing::debug!(order_id = %order_id, "Loading order");
        self.store
            .load(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))
    }

    pub async fn list_all(&self) -> Result<Vec<OrderAggregate>, OrderError> {
        Ok(self.store.list_all().await?)
    }

    pub async fn list_by_status(&self, status: OrderStatus) -> Result<Vec<OrderAggregate>, OrderError> {
        Ok(self.store.list_by_status(&[status]).await?)
    }

    /// Orders on the kitchen board: received through on the way.
    pub async fn list_kitchen_orders(&self) -> Result<Vec<OrderAggregate>, OrderError> {
        Ok(self.store.list_by_status(&KITCHEN_STATUSES).await?)
    }

    /// Delivered orders.
    pub async fn list_history(&self) -> Result<Vec<OrderAggregate>, OrderError> {
        self.list_by_status(OrderStatus::Delivered).await
    }

    /// Audit trail of one order, oldest event first.
    pub async fn order_events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, OrderError> {
        if !self.store.exists(order_id).await? {
            return Err(OrderError::order_not_found(order_id));
        }
        Ok(self.store.load_events(order_id).await?)
    }
}
