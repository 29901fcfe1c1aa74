//! Postgres order store.
//!
//! Orders are kept as JSONB snapshots next to a plain `status` column used for
//! filtering, a `version` column for optimistic concurrency and a `seq`
//! column preserving insertion order. Events go to `order_events`. `save`
//! locks the order row, checks the version, and writes snapshot and events in
//! one transaction.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::types::Json;
use uuid::Uuid;

use super::{OrderStore, StoreError};
use crate::domain::order::{OrderAggregate, OrderEvent, OrderStatus};
use crate::event_sourcing::EventEnvelope;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS orders (
        id UUID PRIMARY KEY,
        seq BIGSERIAL NOT NULL,
        status TEXT NOT NULL,
        version BIGINT NOT NULL,
        snapshot JSONB NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS orders_status_seq_idx ON orders (status, seq)",
    "CREATE TABLE IF NOT EXISTS order_events (
        order_id UUID NOT NULL REFERENCES orders (id) ON DELETE CASCADE,
        sequence_number BIGINT NOT NULL,
        event_id UUID NOT NULL,
        event_type TEXT NOT NULL,
        envelope JSONB NOT NULL,
        recorded_at TIMESTAMPTZ NOT NULL,
        PRIMARY KEY (order_id, sequence_number)
    )",
];

#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        tracing::info!(max_connections, "Connected to Postgres order store");
        Ok(Self::new(pool))
    }

    /// Create tables and indexes if they are missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        tracing::debug!("Order schema ready");
        Ok(())
    }
}

fn status_names(statuses: &[OrderStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn load(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
        let row: Option<(Json<OrderAggregate>,)> =
            sqlx::query_as("SELECT snapshot FROM orders WHERE id = $1")
                .bind(order_id)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|(Json(order),)| order))
    }

    async fn save(
        &self,
        order: &OrderAggregate,
        expected_version: i64,
        events: Vec<EventEnvelope<OrderEvent>>,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order.id)
                .fetch_optional(&mut *tx)
                .await?;

        let actual = current.map(|(v,)| v).unwrap_or(0);
        if actual != expected_version {
            // dropping the transaction rolls it back
            return Err(StoreError::VersionConflict {
                order_id: order.id,
                expected: expected_version,
                actual,
            });
        }

        if current.is_none() {
            sqlx::query(
                "INSERT INTO orders (id, status, version, snapshot, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(order.version)
            .bind(Json(order))
            .bind(order.created_at)
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        } else {
            sqlx::query(
                "UPDATE orders SET status = $2, version = $3, snapshot = $4, updated_at = $5
                 WHERE id = $1",
            )
            .bind(order.id)
            .bind(order.status.as_str())
            .bind(order.version)
            .bind(Json(order))
            .bind(order.updated_at)
            .execute(&mut *tx)
            .await?;
        }

        for envelope in &events {
            sqlx::query(
                "INSERT INTO order_events (order_id, sequence_number, event_id, event_type, envelope, recorded_at)
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(envelope.aggregate_id)
            .bind(envelope.sequence_number)
            .bind(envelope.event_id)
            .bind(envelope.event_type.as_str())
            .bind(Json(envelope))
            .bind(envelope.timestamp)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            order_id = %order.id,
            version = order.version,
            event_count = events.len(),
            "Order snapshot and events committed"
        );

        Ok(())
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderAggregate>, StoreError> {
        let rows: Vec<(Json<OrderAggregate>,)> =
            sqlx::query_as("SELECT snapshot FROM orders WHERE status = ANY($1) ORDER BY seq")
                .bind(status_names(statuses))
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(Json(order),)| order).collect())
    }

    async fn list_all(&self) -> Result<Vec<OrderAggregate>, StoreError> {
        let rows: Vec<(Json<OrderAggregate>,)> =
            sqlx::query_as("SELECT snapshot FROM orders ORDER BY seq")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(|(Json(order),)| order).collect())
    }

    async fn exists(&self, order_id: Uuid) -> Result<bool, StoreError> {
        let (exists,): (bool,) =
            sqlx::query_as("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                .bind(order_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(exists)
    }

    async fn delete(&self, order_id: Uuid, expected_version: i64) -> Result<bool, StoreError> {
        let mut tx = self.pool.begin().await?;

        let current: Option<(i64,)> =
            sqlx::query_as("SELECT version FROM orders WHERE id = $1 FOR UPDATE")
                .bind(order_id)
                .fetch_optional(&mut *tx)
                .await?;

        let Some((actual,)) = current else {
            return Ok(false);
        };
        if actual != expected_version {
            return Err(StoreError::VersionConflict {
                order_id,
                expected: expected_version,
                actual,
            });
        }

        // order_events rows go with it (ON DELETE CASCADE)
        sqlx::query("DELETE FROM orders WHERE id = $1")
            .bind(order_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::debug!(order_id = %order_id, version = actual, "Order deleted");
        Ok(true)
    }

    async fn load_events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, StoreError> {
        let rows: Vec<(Json<EventEnvelope<OrderEvent>>,)> = sqlx::query_as(
            "SELECT envelope FROM order_events WHERE order_id = $1 ORDER BY sequence_number ASC",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        tracing::debug!(order_id = %order_id, count = rows.len(), "Loaded order events");
        Ok(rows.into_iter().map(|(Json(envelope),)| envelope).collect())
    }
}
