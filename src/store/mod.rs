//! Order persistence.
//!
//! The core only depends on the [`OrderStore`] trait. Every call is atomic:
//! `save` writes the new aggregate snapshot and its events together, after
//! checking the version the caller loaded, so concurrent writers to the same
//! order are serialized by optimistic concurrency.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::order::{OrderAggregate, OrderEvent, OrderStatus};
use crate::event_sourcing::EventEnvelope;
use crate::utils::IsTransient;

pub mod memory;
pub mod postgres;

pub use memory::MemoryOrderStore;
pub use postgres::PostgresOrderStore;

/// Infrastructure failures, kept apart from business rule errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Another writer changed the order after it was loaded.
    #[error("Concurrency conflict on order {order_id}: expected version {expected}, found {actual}")]
    VersionConflict { order_id: Uuid, expected: i64, actual: i64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl IsTransient for StoreError {
    fn is_transient(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
    async fn load(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError>;

    /// Persist `order` and append `events` to its log in one atomic write.
    ///
    /// `expected_version` is the version the order had when it was loaded
    /// (0 for a new order). Fails with [`StoreError::VersionConflict`] if the
    /// stored version differs.
    async fn save(
        &self,
        order: &OrderAggregate,
        expected_version: i64,
        events: Vec<EventEnvelope<OrderEvent>>,
    ) -> Result<(), StoreError>;

    /// Orders whose status is in `statuses`, in insertion order.
    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderAggregate>, StoreError>;

    /// Every order, in insertion order.
    async fn list_all(&self) -> Result<Vec<OrderAggregate>, StoreError>;

    async fn exists(&self, order_id: Uuid) -> Result<bool, StoreError>;

    /// Remove an order with its lines and event log.
    ///
    /// Like `save`, fails with [`StoreError::VersionConflict`] when the stored
    /// version is not `expected_version`. Returns false if the order did not
    /// exist.
    async fn delete(&self, order_id: Uuid, expected_version: i64) -> Result<bool, StoreError>;

    /// Event log of one order, ordered by sequence number.
    async fn load_events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, StoreError>;
}
