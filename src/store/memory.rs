//! In-memory order store.
//!
//! Keeps snapshots and event logs in a map behind a single `RwLock`, which
//! makes every `save` atomic. Nothing survives a restart.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{OrderStore, StoreError};
use crate::domain::order::{OrderAggregate, OrderEvent, OrderStatus};
use crate::event_sourcing::EventEnvelope;

struct StoredOrder {
    /// Insertion sequence, used to keep listings in creation order
    seq: u64,
    order: OrderAggregate,
    events: Vec<EventEnvelope<OrderEvent>>,
}

#[derive(Default)]
struct MemoryState {
    next_seq: u64,
    orders: HashMap<Uuid, StoredOrder>,
}

impl MemoryState {
    fn listed(&self, filter: impl Fn(&OrderAggregate) -> bool) -> Vec<OrderAggregate> {
        let mut matching: Vec<&StoredOrder> =
            self.orders.values().filter(|s| filter(&s.order)).collect();
        matching.sort_by_key(|s| s.seq);
        matching.into_iter().map(|s| s.order.clone()).collect()
    }
}

#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn load(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).map(|s| s.order.clone()))
    }

    async fn save(
        &self,
        order: &OrderAggregate,
        expected_version: i64,
        events: Vec<EventEnvelope<OrderEvent>>,
    ) -> Result<(), StoreError> {
        let mut guard = self.state.write().await;
        let state = &mut *guard;

        let actual = state.orders.get(&order.id).map(|s| s.order.version).unwrap_or(0);
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual,
            });
        }

        match state.orders.get_mut(&order.id) {
            Some(stored) => {
                stored.order = order.clone();
                stored.events.extend(events);
            }
            None => {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.orders.insert(
                    order.id,
                    StoredOrder { seq, order: order.clone(), events },
                );
            }
        }

        Ok(())
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderAggregate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.listed(|o| statuses.contains(&o.status)))
    }

    async fn list_all(&self) -> Result<Vec<OrderAggregate>, StoreError> {
        let state = self.state.read().await;
        Ok(state.listed(|_| true))
    }

    async fn exists(&self, order_id: Uuid) -> Result<bool, StoreError> {
        Ok(self.state.read().await.orders.contains_key(&order_id))
    }

    async fn delete(&self, order_id: Uuid, expected_version: i64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;

        let Some(stored) = state.orders.get(&order_id) else {
            return Ok(false);
        };
        if stored.order.version != expected_version {
            return Err(StoreError::VersionConflict {
                order_id,
                expected: expected_version,
                actual: stored.order.version,
            });
        }

        state.orders.remove(&order_id);
        Ok(true)
    }

    async fn load_events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, StoreError> {
        let state = self.state.read().await;
        Ok(state.orders.get(&order_id).map(|s| s.events.clone()).unwrap_or_default())
    }
}
