use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::event_sourcing::DomainEvent;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Events - Domain Events for Order Aggregate
// ============================================================================

/// Order Event - Union type for all order events
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OrderEvent {
    DraftCreated(DraftCreated),
    ItemAdded(ItemAdded),
    ItemRemoved(ItemRemoved),
    Finalized(OrderFinalized),
    Advanced(StatusStepped),
    Regressed(StatusStepped),
    StatusOverridden(StatusOverridden),
}

impl DomainEvent for OrderEvent {
    fn event_type(&self) -> &'static str {
        match self {
            OrderEvent::DraftCreated(_) => "OrderDraftCreated",
            OrderEvent::ItemAdded(_) => "OrderItemAdded",
            OrderEvent::ItemRemoved(_) => "OrderItemRemoved",
            OrderEvent::Finalized(_) => "OrderFinalized",
            OrderEvent::Advanced(_) => "OrderAdvanced",
            OrderEvent::Regressed(_) => "OrderRegressed",
            OrderEvent::StatusOverridden(_) => "OrderStatusOverridden",
        }
    }
}

// ============================================================================
// Individual Event Types
// ============================================================================

/// Draft Created - a new cart bound to a client
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DraftCreated {
    pub order_id: Uuid,
    pub client_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Item Added - merged into the existing line for the dish, or appended
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemAdded {
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: u32,
    /// Dish price at the moment of the add; only used when a new line is created
    pub unit_price: Decimal,
}

/// Item Removed - `line_deleted` is true when the whole line went away
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ItemRemoved {
    pub dish_id: Uuid,
    pub quantity: u32,
    pub line_deleted: bool,
}

/// Order Finalized - cart submitted, delivery details frozen
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderFinalized {
    pub client_snapshot_name: String,
    pub address_snapshot: String,
    pub finalized_at: DateTime<Utc>,
}

/// One kitchen step, forwards or backwards
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusStepped {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Status Overridden - administrative correction outside the kitchen sequence
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StatusOverridden {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub operator: String,
    pub reason: String,
    /// The order left DRAFT without finalize, so it carries no delivery snapshot
    pub skipped_finalize: bool,
}
