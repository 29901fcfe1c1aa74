use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

use crate::domain::client::ClientDirectory;
use crate::domain::dish::DishCatalog;
use crate::event_sourcing::{envelope_all, Aggregate, DomainEvent, EventEnvelope};
use crate::metrics::Metrics;
use crate::store::{OrderStore, StoreError};
use crate::utils::{retry_on_transient, RetryConfig};

use super::aggregate::OrderAggregate;
use super::commands::{AdminGrant, OrderCommand};
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Command Handler
// ============================================================================
//
// Orchestrates: Command → Aggregate → Events → Order Store
//
// Each call is one load-validate-apply-save cycle. A version conflict on
// save means another writer got there first; the whole cycle is re-run
// against the fresh state. Business rule failures are returned as-is.
//
// ============================================================================

pub struct OrderCommandHandler {
    store: Arc<dyn OrderStore>,
    dishes: Arc<dyn DishCatalog>,
    clients: Arc<dyn ClientDirectory>,
    metrics: Arc<Metrics>,
    retry: RetryConfig,
}

impl OrderCommandHandler {
    pub fn new(
        store: Arc<dyn OrderStore>,
        dishes: Arc<dyn DishCatalog>,
        clients: Arc<dyn ClientDirectory>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            store,
            dishes,
            clients,
            metrics,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    // ------------------------------------------------------------------------
    // Cart
    // ------------------------------------------------------------------------

    /// Open an empty DRAFT order for `client_id`.
    pub async fn create_draft(&self, client_id: Uuid) -> Result<OrderAggregate, OrderError> {
        let started = Instant::now();
        let result = self.open_draft(client_id).await;
        self.observe("create_draft", started, &result);
        result
    }

    /// Open a draft for the first registered client.
    ///
    /// Kept for callers that predate explicit client ids; new code should
    /// call [`create_draft`](Self::create_draft).
    pub async fn create_draft_for_default_client(&self) -> Result<OrderAggregate, OrderError> {
        let clients = self.clients.list_clients().await?;
        let first = clients.first().ok_or(OrderError::NoClientConfigured)?;
        tracing::debug!(client_id = %first.id, "Using default client for new draft");
        self.create_draft(first.id).await
    }

    /// Add `quantity` units of a dish, merging into an existing line.
    /// Returns the affected line.
    pub async fn add_item(
        &self,
        order_id: Uuid,
        dish_id: Uuid,
        quantity: u32,
    ) -> Result<OrderItem, OrderError> {
        let dish = self.dishes.find_dish(dish_id).await?;
        let order = self
            .execute(order_id, OrderCommand::AddItem { dish_id, dish, quantity })
            .await?;

        order
            .item(dish_id)
            .cloned()
            .ok_or(OrderError::NotFound { entity: "OrderItem", key: dish_id })
    }

    /// Remove `quantity` units of a dish; the line goes away when nothing is left.
    pub async fn remove_item(
        &self,
        order_id: Uuid,
        dish_id: Uuid,
        quantity: u32,
    ) -> Result<OrderAggregate, OrderError> {
        self.execute(order_id, OrderCommand::RemoveItem { dish_id, quantity }).await
    }

    /// Submit the cart: snapshot client name and delivery address, move to RECEIVED.
    pub async fn finalize(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        let client_id = self.load(order_id).await?.client_id;
        let client = self.clients.find_client(client_id).await?;
        self.execute(order_id, OrderCommand::Finalize { client }).await
    }

    /// Delete an abandoned cart together with its lines.
    ///
    /// The delete carries the version the draft was checked at, so an order
    /// finalized in between is never removed.
    pub async fn discard_draft(&self, order_id: Uuid) -> Result<(), OrderError> {
        self.run("discard_draft", order_id, move |_| self.try_discard(order_id))
            .await?;

        tracing::info!(order_id = %order_id, "🗑️ Draft discarded");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Kitchen workflow
    // ------------------------------------------------------------------------

    pub async fn advance(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        self.execute(order_id, OrderCommand::Advance).await
    }

    pub async fn regress(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        self.execute(order_id, OrderCommand::Regress).await
    }

    /// Set any status, bypassing the kitchen sequence and finalize.
    ///
    /// Overriding a DRAFT order to a later status leaves it without delivery
    /// snapshots; the emitted event is flagged and a warning is logged.
    pub async fn override_status(
        &self,
        grant: &AdminGrant,
        order_id: Uuid,
        status: OrderStatus,
    ) -> Result<OrderAggregate, OrderError> {
        self.execute(
            order_id,
            OrderCommand::OverrideStatus { status, grant: grant.clone() },
        )
        .await
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    async fn load(&self, order_id: Uuid) -> Result<OrderAggregate, OrderError> {
        self.store
            .load(order_id)
            .await?
            .ok_or_else(|| OrderError::order_not_found(order_id))
    }

    async fn open_draft(&self, client_id: Uuid) -> Result<OrderAggregate, OrderError> {
        if self.clients.find_client(client_id).await?.is_none() {
            let any_client = !self.clients.list_clients().await?.is_empty();
            return Err(if any_client {
                OrderError::NotFound { entity: "Client", key: client_id }
            } else {
                OrderError::NoClientConfigured
            });
        }

        let order_id = Uuid::new_v4();
        let events = OrderAggregate::open_draft(order_id, client_id);
        let mut order = events
            .first()
            .ok_or(OrderError::NotInitialized)
            .and_then(OrderAggregate::apply_first_event)?;

        let envelopes = envelope_all(order_id, 0, events, Uuid::new_v4());
        order.set_version(envelopes.len() as i64);
        if let Some(last) = envelopes.last() {
            order.record_timestamp(last.timestamp);
        }

        self.store.save(&order, 0, envelopes).await?;

        tracing::info!(order_id = %order_id, client_id = %client_id, "🛒 Draft order created");
        Ok(order)
    }

    async fn execute(&self, order_id: Uuid, command: OrderCommand) -> Result<OrderAggregate, OrderError> {
        let command = &command;
        self.run(command.name(), order_id, move |_| self.try_execute(order_id, command))
            .await
    }

    /// Run one load-validate-persist cycle, re-running it on version conflicts.
    async fn run<T, F, Fut>(&self, name: &'static str, order_id: Uuid, mut attempt_once: F) -> Result<T, OrderError>
    where
        F: FnMut(u32) -> Fut,
        Fut: std::future::Future<Output = Result<T, OrderError>>,
    {
        let started = Instant::now();

        let result = retry_on_transient(&self.retry, name, move |attempt| {
            let cycle = attempt_once(attempt);
            async move {
                let outcome = cycle.await;
                if let Err(OrderError::Store(StoreError::VersionConflict { .. })) = &outcome {
                    self.metrics.record_conflict();
                    tracing::debug!(order_id = %order_id, attempt, command = name, "Version conflict");
                }
                outcome
            }
        })
        .await;

        self.observe(name, started, &result);
        result
    }

    async fn try_discard(&self, order_id: Uuid) -> Result<(), OrderError> {
        let order = self.load(order_id).await?;
        if order.status != OrderStatus::Draft {
            return Err(OrderError::InvalidState {
                status: order.status,
                reason: "only draft orders can be discarded",
            });
        }

        if !self.store.delete(order_id, order.version()).await? {
            return Err(OrderError::order_not_found(order_id));
        }
        Ok(())
    }

    async fn try_execute(&self, order_id: Uuid, command: &OrderCommand) -> Result<OrderAggregate, OrderError> {
        let current = self.load(order_id).await?;
        let expected_version = current.version();

        let events = current.handle_command(command)?;

        let mut updated = current.clone();
        for event in &events {
            updated.apply_event(event)?;
        }

        let envelopes = self.wrap(order_id, expected_version, events, command);
        updated.set_version(expected_version + envelopes.len() as i64);
        if let Some(last) = envelopes.last() {
            updated.record_timestamp(last.timestamp);
        }

        self.store.save(&updated, expected_version, envelopes.clone()).await?;

        for envelope in &envelopes {
            self.log_event(order_id, &envelope.event_data);
        }

        Ok(updated)
    }

    fn wrap(
        &self,
        order_id: Uuid,
        expected_version: i64,
        events: Vec<OrderEvent>,
        command: &OrderCommand,
    ) -> Vec<EventEnvelope<OrderEvent>> {
        let envelopes = envelope_all(order_id, expected_version, events, Uuid::new_v4());
        match command {
            OrderCommand::OverrideStatus { grant, .. } => envelopes
                .into_iter()
                .map(|e| e.with_metadata("operator", grant.operator()))
                .collect(),
            _ => envelopes,
        }
    }

    fn log_event(&self, order_id: Uuid, event: &OrderEvent) {
        match event {
            OrderEvent::DraftCreated(_) => {}
            OrderEvent::ItemAdded(e) => {
                tracing::info!(order_id = %order_id, dish_id = %e.dish_id, quantity = e.quantity, "Item added to cart");
            }
            OrderEvent::ItemRemoved(e) => {
                tracing::info!(
                    order_id = %order_id,
                    dish_id = %e.dish_id,
                    quantity = e.quantity,
                    line_deleted = e.line_deleted,
                    "Item removed from cart"
                );
            }
            OrderEvent::Finalized(_) => {
                self.metrics.record_transition(OrderStatus::Draft.as_str(), OrderStatus::Received.as_str());
                tracing::info!(order_id = %order_id, "✅ Order finalized");
            }
            OrderEvent::Advanced(e) | OrderEvent::Regressed(e) => {
                self.metrics.record_transition(e.from.as_str(), e.to.as_str());
                tracing::info!(
                    order_id = %order_id,
                    from = %e.from,
                    to = %e.to,
                    event_type = event.event_type(),
                    "Kitchen status changed"
                );
            }
            OrderEvent::StatusOverridden(e) => {
                self.metrics.record_transition(e.from.as_str(), e.to.as_str());
                self.metrics.record_override();
                tracing::warn!(
                    order_id = %order_id,
                    from = %e.from,
                    to = %e.to,
                    operator = %e.operator,
                    reason = %e.reason,
                    "Order status overridden"
                );
                if e.skipped_finalize {
                    tracing::warn!(
                        order_id = %order_id,
                        "Override moved a draft past finalize; order has no delivery snapshot"
                    );
                }
            }
        }
    }

    fn observe<T>(&self, command: &str, started: Instant, result: &Result<T, OrderError>) {
        let outcome = match result {
            Ok(_) => "ok",
            Err(e) => {
                tracing::debug!(command, error = %e, "Order command rejected");
                e.kind().as_str()
            }
        };
        self.metrics.record_command(command, started.elapsed().as_secs_f64(), outcome);
    }
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::client::{Address, Client, InMemoryClientDirectory};
    use crate::domain::dish::{Dish, InMemoryDishCatalog};
    use crate::domain::order::ErrorKind;
    use crate::store::MemoryOrderStore;
    use rust_decimal::Decimal;

    struct Fixture {
        handler: OrderCommandHandler,
        store: Arc<MemoryOrderStore>,
        dishes: InMemoryDishCatalog,
        clients: InMemoryClientDirectory,
        client: Client,
        dish_a: Dish,
        dish_b: Dish,
    }

    fn address() -> Address {
        Address {
            street: "Rua Augusta".to_string(),
            neighborhood: "Consolação".to_string(),
            city: "São Paulo".to_string(),
            state: "SP".to_string(),
            postal_code: "01305-000".to_string(),
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryOrderStore::new());
        let dishes = InMemoryDishCatalog::new();
        let clients = InMemoryClientDirectory::new();

        let client = Client::new("Carla Souza")
            .with_address(address(), "250")
            .with_complement("Casa 2");
        clients.upsert(client.clone()).await;

        let dish_a = Dish::new("Moqueca", Decimal::new(6800, 2));
        let dish_b = Dish::new("Guaraná", Decimal::new(600, 2));
        dishes.upsert(dish_a.clone()).await;
        dishes.upsert(dish_b.clone()).await;

        let handler = OrderCommandHandler::new(
            store.clone(),
            Arc::new(dishes.clone()),
            Arc::new(clients.clone()),
            Arc::new(Metrics::new().unwrap()),
        );

        Fixture { handler, store, dishes, clients, client, dish_a, dish_b }
    }

    #[tokio::test]
    async fn test_full_lifecycle_scenario() {
        let f = fixture().await;
        let h = &f.handler;

        let draft = h.create_draft(f.client.id).await.unwrap();
        assert_eq!(draft.status, OrderStatus::Draft);
        assert!(draft.client_snapshot_name.is_none());

        h.add_item(draft.id, f.dish_a.id, 2).await.unwrap();
        let line = h.add_item(draft.id, f.dish_a.id, 3).await.unwrap();
        assert_eq!(line.quantity, 5);
        assert_eq!(line.unit_price, Decimal::new(6800, 2));

        let order = h.remove_item(draft.id, f.dish_a.id, 4).await.unwrap();
        assert_eq!(order.items.len(), 1);
        assert_eq!(order.items[0].quantity, 1);

        let order = h.finalize(draft.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Received);
        assert_eq!(order.client_snapshot_name.as_deref(), Some("Carla Souza"));
        assert_eq!(
            order.address_snapshot.as_deref(),
            Some("Rua Augusta, 250, Consolação - São Paulo/SP. CEP: 01305-000. Complemento: Casa 2")
        );

        assert_eq!(h.advance(draft.id).await.unwrap().status, OrderStatus::InPreparation);
        assert_eq!(h.advance(draft.id).await.unwrap().status, OrderStatus::Ready);
        assert_eq!(h.advance(draft.id).await.unwrap().status, OrderStatus::OnTheWay);

        let err = h.regress(draft.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let err = h.advance(draft.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        let stored = f.store.load(draft.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::OnTheWay);
        // 1 created + 2 adds + 1 remove + 1 finalize + 3 advances
        assert_eq!(stored.version, 8);
        assert_eq!(f.store.load_events(draft.id).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn test_add_item_overflow_is_rejected() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, u32::MAX).await.unwrap();

        let err = f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let stored = f.store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.item(f.dish_a.id).unwrap().quantity, u32::MAX);
        assert_eq!(stored.version, 2);
    }

    #[tokio::test]
    async fn test_event_log_replays_to_stored_snapshot() {
        let f = fixture().await;
        let grant = AdminGrant::new("gerente", "ajuste");
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, 3).await.unwrap();
        f.handler.remove_item(order.id, f.dish_a.id, 1).await.unwrap();
        f.handler.finalize(order.id).await.unwrap();
        f.handler.advance(order.id).await.unwrap();
        f.handler.override_status(&grant, order.id, OrderStatus::Ready).await.unwrap();

        let stored = f.store.load(order.id).await.unwrap().unwrap();
        let replayed = OrderAggregate::load_from_events(f.store.load_events(order.id).await.unwrap()).unwrap();
        assert_eq!(replayed, stored);
    }

    #[tokio::test]
    async fn test_merge_sums_quantities_per_dish() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();

        f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap();
        f.handler.add_item(order.id, f.dish_b.id, 2).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, 4).await.unwrap();

        let stored = f.store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.items.len(), 2);
        assert_eq!(stored.item(f.dish_a.id).unwrap().quantity, 5);
        assert_eq!(stored.item(f.dish_b.id).unwrap().quantity, 2);
        assert_eq!(stored.items[0].dish_id, f.dish_a.id);
    }

    #[tokio::test]
    async fn test_price_captured_at_insertion() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap();

        f.dishes.update_price(f.dish_a.id, Decimal::new(9900, 2)).await;
        let line = f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap();

        assert_eq!(line.unit_price, Decimal::new(6800, 2));
        assert_eq!(f.store.load(order.id).await.unwrap().unwrap().total(), Decimal::new(13600, 2));
    }

    #[tokio::test]
    async fn test_add_item_errors() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();

        let err = f.handler.add_item(order.id, Uuid::new_v4(), 1).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { entity: "Dish", .. }));

        let err = f.handler.add_item(order.id, f.dish_a.id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f.handler.add_item(Uuid::new_v4(), f.dish_a.id, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { entity: "Order", .. }));

        f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap();
        f.handler.finalize(order.id).await.unwrap();
        let err = f.handler.add_item(order.id, f.dish_b.id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_remove_item_errors() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, 2).await.unwrap();

        let err = f.handler.remove_item(order.id, f.dish_a.id, 0).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);

        let err = f.handler.remove_item(order.id, f.dish_b.id, 1).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { entity: "OrderItem", .. }));

        let emptied = f.handler.remove_item(order.id, f.dish_a.id, 2).await.unwrap();
        assert!(emptied.items.is_empty());

        f.handler.finalize(order.id).await.unwrap();
        let err = f.handler.remove_item(order.id, f.dish_a.id, 1).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_finalize_requires_address_and_draft() {
        let f = fixture().await;
        let homeless = Client::new("Sem Endereço");
        f.clients.upsert(homeless.clone()).await;

        let order = f.handler.create_draft(homeless.id).await.unwrap();
        let err = f.handler.finalize(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MissingAddress);
        assert_eq!(f.store.load(order.id).await.unwrap().unwrap().status, OrderStatus::Draft);

        f.clients.update_address(homeless.id, Some(address()), "10").await;
        f.handler.finalize(order.id).await.unwrap();

        let err = f.handler.finalize(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[tokio::test]
    async fn test_snapshot_survives_profile_edits() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        let finalized = f.handler.finalize(order.id).await.unwrap();

        f.clients.update_name(f.client.id, "Carla S. Lima").await;
        f.clients.update_address(f.client.id, None, "").await;
        f.handler.advance(order.id).await.unwrap();

        let stored = f.store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.client_snapshot_name.as_deref(), Some("Carla Souza"));
        assert_eq!(stored.address_snapshot, finalized.address_snapshot);
    }

    #[tokio::test]
    async fn test_regress_back_to_draft_and_refinalize() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.finalize(order.id).await.unwrap();

        let back = f.handler.regress(order.id).await.unwrap();
        assert_eq!(back.status, OrderStatus::Draft);
        assert!(back.address_snapshot.is_none());

        let err = f.handler.regress(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);

        // the cart is mutable again and picks up the current profile on finalize
        f.handler.add_item(order.id, f.dish_b.id, 1).await.unwrap();
        f.clients.update_name(f.client.id, "Carla S. Lima").await;
        let again = f.handler.finalize(order.id).await.unwrap();
        assert_eq!(again.client_snapshot_name.as_deref(), Some("Carla S. Lima"));
    }

    #[tokio::test]
    async fn test_override_bypasses_sequence() {
        let f = fixture().await;
        let grant = AdminGrant::new("gerente", "entregue pelo balcão");
        let order = f.handler.create_draft(f.client.id).await.unwrap();

        let delivered = f
            .handler
            .override_status(&grant, order.id, OrderStatus::Delivered)
            .await
            .unwrap();
        assert_eq!(delivered.status, OrderStatus::Delivered);
        assert!(delivered.address_snapshot.is_none());

        let events = f.store.load_events(order.id).await.unwrap();
        let last = events.last().unwrap();
        assert_eq!(last.event_type, "OrderStatusOverridden");
        assert_eq!(last.metadata.get("operator").map(String::as_str), Some("gerente"));
        assert!(matches!(&last.event_data, OrderEvent::StatusOverridden(e) if e.skipped_finalize));

        let err = f
            .handler
            .override_status(&grant, Uuid::new_v4(), OrderStatus::Ready)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_create_draft_client_resolution() {
        let store: Arc<dyn OrderStore> = Arc::new(MemoryOrderStore::new());
        let dishes = Arc::new(InMemoryDishCatalog::new());
        let clients = InMemoryClientDirectory::new();
        let handler = OrderCommandHandler::new(
            store,
            dishes,
            Arc::new(clients.clone()),
            Arc::new(Metrics::new().unwrap()),
        );

        let err = handler.create_draft(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoClientConfigured);
        let err = handler.create_draft_for_default_client().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NoClientConfigured);

        let first = Client::new("Primeiro");
        clients.upsert(first.clone()).await;
        clients.upsert(Client::new("Segundo")).await;

        let err = handler.create_draft(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, OrderError::NotFound { entity: "Client", .. }));

        let draft = handler.create_draft_for_default_client().await.unwrap();
        assert_eq!(draft.client_id, first.id);
        assert_eq!(draft.version, 1);
    }

    #[tokio::test]
    async fn test_discard_draft() {
        let f = fixture().await;
        let order = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.add_item(order.id, f.dish_a.id, 1).await.unwrap();

        f.handler.discard_draft(order.id).await.unwrap();
        assert!(f.store.load(order.id).await.unwrap().is_none());

        let err = f.handler.discard_draft(order.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let submitted = f.handler.create_draft(f.client.id).await.unwrap();
        f.handler.finalize(submitted.id).await.unwrap();
        let err = f.handler.discard_draft(submitted.id).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
        assert!(f.store.exists(submitted.id).await.unwrap());

        let discards = &f.handler.metrics.order_commands;
        assert_eq!(discards.with_label_values(&["discard_draft", "ok"]).get(), 1);
        assert_eq!(discards.with_label_values(&["discard_draft", "not_found"]).get(), 1);
    }

    /// Lets another writer finalize the order right before the first delete lands.
    struct FinalizeBeforeDelete {
        inner: MemoryOrderStore,
        raced: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl OrderStore for FinalizeBeforeDelete {
        async fn load(&self, order_id: Uuid) -> Result<Option<OrderAggregate>, StoreError> {
            self.inner.load(order_id).await
        }

        async fn save(
            &self,
            order: &OrderAggregate,
            expected_version: i64,
            events: Vec<EventEnvelope<OrderEvent>>,
        ) -> Result<(), StoreError> {
            self.inner.save(order, expected_version, events).await
        }

        async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<OrderAggregate>, StoreError> {
            self.inner.list_by_status(statuses).await
        }

        async fn list_all(&self) -> Result<Vec<OrderAggregate>, StoreError> {
            self.inner.list_all().await
        }

        async fn exists(&self, order_id: Uuid) -> Result<bool, StoreError> {
            self.inner.exists(order_id).await
        }

        async fn delete(&self, order_id: Uuid, expected_version: i64) -> Result<bool, StoreError> {
            if !self.raced.swap(true, std::sync::atomic::Ordering::SeqCst) {
                if let Some(mut order) = self.inner.load(order_id).await? {
                    let loaded_at = order.version;
                    order.status = OrderStatus::Received;
                    order.client_snapshot_name = Some("Carla Souza".to_string());
                    order.address_snapshot = Some("Rua Augusta, 250".to_string());
                    order.version = loaded_at + 1;
                    self.inner.save(&order, loaded_at, Vec::new()).await?;
                }
            }
            self.inner.delete(order_id, expected_version).await
        }

        async fn load_events(&self, order_id: Uuid) -> Result<Vec<EventEnvelope<OrderEvent>>, StoreError> {
            self.inner.load_events(order_id).await
        }
    }

    #[tokio::test]
    async fn test_discard_never_deletes_order_finalized_concurrently() {
        let f = fixture().await;
        let store = Arc::new(FinalizeBeforeDelete {
            inner: MemoryOrderStore::new(),
            raced: std::sync::atomic::AtomicBool::new(false),
        });
        let metrics = Arc::new(Metrics::new().unwrap());
        let handler = OrderCommandHandler::new(
            store.clone(),
            Arc::new(f.dishes.clone()),
            Arc::new(f.clients.clone()),
            metrics.clone(),
        );

        let order = handler.create_draft(f.client.id).await.unwrap();
        let err = handler.discard_draft(order.id).await.unwrap_err();

        // the retry sees the finalized order and refuses
        assert!(matches!(err, OrderError::InvalidState { status: OrderStatus::Received, .. }));
        let stored = store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Received);
        assert_eq!(metrics.store_conflicts.get(), 1);
        assert_eq!(
            metrics.order_commands.with_label_values(&["discard_draft", "invalid_state"]).get(),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_adds_are_not_lost() {
        let f = fixture().await;
        let handler = Arc::new(f.handler.with_retry(RetryConfig::default().with_max_attempts(50)));
        let order = handler.create_draft(f.client.id).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let handler = handler.clone();
            let dish_id = f.dish_a.id;
            tasks.push(tokio::spawn(async move { handler.add_item(order.id, dish_id, 1).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let stored = f.store.load(order.id).await.unwrap().unwrap();
        assert_eq!(stored.item(f.dish_a.id).unwrap().quantity, 10);
        assert_eq!(stored.version, 11);
    }
}
