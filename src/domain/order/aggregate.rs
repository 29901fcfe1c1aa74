use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::Aggregate;
use super::commands::OrderCommand;
use super::errors::OrderError;
use super::events::*;
use super::value_objects::{OrderItem, OrderStatus};

// ============================================================================
// Order Aggregate - Domain Logic
// ============================================================================
//
// Invariants:
// - items only change while the order is DRAFT
// - at most one line per dish
// - both snapshots are unset while DRAFT and set by finalize
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAggregate {
    // Identity
    pub id: Uuid,
    pub version: i64,

    pub client_id: Uuid,
    pub status: OrderStatus,
    pub items: Vec<OrderItem>,

    // Delivery details frozen at finalize
    pub client_snapshot_name: Option<String>,
    pub address_snapshot: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// Events opening a new draft for `client_id`
    pub fn open_draft(order_id: Uuid, client_id: Uuid) -> Vec<OrderEvent> {
        vec![OrderEvent::DraftCreated(DraftCreated {
            order_id,
            client_id,
            created_at: Utc::now(),
        })]
    }

    pub fn item(&self, dish_id: Uuid) -> Option<&OrderItem> {
        self.items.iter().find(|item| item.dish_id == dish_id)
    }

    pub fn total(&self) -> Decimal {
        self.items.iter().map(OrderItem::line_total).sum()
    }

    fn ensure_draft(&self, reason: &'static str) -> Result<(), OrderError> {
        match self.status {
            OrderStatus::Draft => Ok(()),
            status => Err(OrderError::InvalidState { status, reason }),
        }
    }

    fn ensure_positive(quantity: u32, action: &str) -> Result<(), OrderError> {
        if quantity == 0 {
            return Err(OrderError::InvalidArgument(format!(
                "quantity to {} must be positive",
                action
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for OrderAggregate {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn apply_first_event(event: &Self::Event) -> Result<Self, Self::Error> {
        match event {
            OrderEvent::DraftCreated(e) => Ok(Self {
                id: e.order_id,
                version: 0,
                client_id: e.client_id,
                status: OrderStatus::Draft,
                items: Vec::new(),
                client_snapshot_name: None,
                address_snapshot: None,
                created_at: e.created_at,
                updated_at: e.created_at,
            }),
            _ => Err(OrderError::NotInitialized),
        }
    }

    fn apply_event(&mut self, event: &Self::Event) -> Result<(), Self::Error> {
        match event {
            OrderEvent::DraftCreated(_) => {
                // First event already applied
            }
            OrderEvent::ItemAdded(e) => match self.items.iter_mut().find(|i| i.dish_id == e.dish_id) {
                Some(line) => line.quantity = line.quantity.saturating_add(e.quantity),
                None => self.items.push(OrderItem {
                    dish_id: e.dish_id,
                    dish_name: e.dish_name.clone(),
                    quantity: e.quantity,
                    unit_price: e.unit_price,
                }),
            },
            OrderEvent::ItemRemoved(e) => {
                if let Some(pos) = self.items.iter().position(|i| i.dish_id == e.dish_id) {
                    let line = &mut self.items[pos];
                    line.quantity = line.quantity.saturating_sub(e.quantity);
                    if e.line_deleted || line.quantity == 0 {
                        self.items.remove(pos);
                    }
                }
            }
            OrderEvent::Finalized(e) => {
                self.client_snapshot_name = Some(e.client_snapshot_name.clone());
                self.address_snapshot = Some(e.address_snapshot.clone());
                self.status = OrderStatus::Received;
            }
            OrderEvent::Advanced(e) => {
                self.status = e.to;
            }
            OrderEvent::Regressed(e) => {
                self.status = e.to;
                if e.to == OrderStatus::Draft {
                    // Back in the cart: the next finalize takes fresh snapshots
                    self.client_snapshot_name = None;
                    self.address_snapshot = None;
                }
            }
            OrderEvent::StatusOverridden(e) => {
                self.status = e.to;
            }
        }

        Ok(())
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::AddItem { dish_id, dish, quantity } => {
                self.ensure_draft("items can only be added to draft orders")?;
                Self::ensure_positive(*quantity, "add")?;

                let dish = dish.as_ref().ok_or(OrderError::NotFound {
                    entity: "Dish",
                    key: *dish_id,
                })?;

                if let Some(line) = self.item(dish.id) {
                    line.quantity.checked_add(*quantity).ok_or_else(|| {
                        OrderError::InvalidArgument(format!(
                            "quantity of {} would exceed {}",
                            line.dish_name,
                            u32::MAX
                        ))
                    })?;
                }

                Ok(vec![OrderEvent::ItemAdded(ItemAdded {
                    dish_id: dish.id,
                    dish_name: dish.name.clone(),
                    quantity: *quantity,
                    unit_price: dish.price,
                })])
            }

            OrderCommand::RemoveItem { dish_id, quantity } => {
                self.ensure_draft("items can only be removed from draft orders")?;
                Self::ensure_positive(*quantity, "remove")?;

                let line = self.item(*dish_id).ok_or(OrderError::NotFound {
                    entity: "OrderItem",
                    key: *dish_id,
                })?;

                Ok(vec![OrderEvent::ItemRemoved(ItemRemoved {
                    dish_id: *dish_id,
                    quantity: *quantity,
                    line_deleted: *quantity >= line.quantity,
                })])
            }

            OrderCommand::Finalize { client } => {
                self.ensure_draft("only draft orders can be finalized")?;

                let (name, address) = client
                    .as_ref()
                    .and_then(|c| c.delivery_address().map(|a| (c.name.clone(), a)))
                    .ok_or(OrderError::MissingAddress(self.client_id))?;

                Ok(vec![OrderEvent::Finalized(OrderFinalized {
                    client_snapshot_name: name,
                    address_snapshot: address,
                    finalized_at: Utc::now(),
                })])
            }

            OrderCommand::Advance => {
                let to = self.status.next_kitchen_step().map_err(|reason| {
                    OrderError::InvalidTransition { from: self.status, reason }
                })?;

                Ok(vec![OrderEvent::Advanced(StatusStepped { from: self.status, to })])
            }

            OrderCommand::Regress => {
                let to = self.status.previous_kitchen_step().map_err(|reason| {
                    OrderError::InvalidTransition { from: self.status, reason }
                })?;

                Ok(vec![OrderEvent::Regressed(StatusStepped { from: self.status, to })])
            }

            OrderCommand::OverrideStatus { status, grant } => {
                let skipped_finalize = self.status == OrderStatus::Draft
                    && *status != OrderStatus::Draft
                    && self.address_snapshot.is_none();

                Ok(vec![OrderEvent::StatusOverridden(StatusOverridden {
                    from: self.status,
                    to: *status,
                    operator: grant.operator().to_string(),
                    reason: grant.reason().to_string(),
                    skipped_finalize,
                })])
            }
        }
    }

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn version(&self) -> i64 {
        self.version
    }

    fn set_version(&mut self, version: i64) {
        self.version = version;
    }

    fn record_timestamp(&mut self, at: DateTime<Utc>) {
        self.updated_at = at;
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
