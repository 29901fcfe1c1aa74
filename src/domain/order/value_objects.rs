use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Order Value Objects
// ============================================================================

/// One (dish, quantity, captured unit price) line of an order.
///
/// `unit_price` is copied from the dish when the line is first created and
/// never re-read, so menu price changes do not touch existing orders.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct OrderItem {
    pub dish_id: Uuid,
    pub dish_name: String,
    pub quantity: u32,
    pub unit_price: Decimal,
}

impl OrderItem {
    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// Order lifecycle status, declared in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Mutable cart, not yet submitted
    Draft,
    Received,
    InPreparation,
    Ready,
    OnTheWay,
    Delivered,
}

/// Statuses shown on the kitchen board
pub const KITCHEN_STATUSES: [OrderStatus; 4] = [
    OrderStatus::Received,
    OrderStatus::InPreparation,
    OrderStatus::Ready,
    OrderStatus::OnTheWay,
];

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Draft,
        OrderStatus::Received,
        OrderStatus::InPreparation,
        OrderStatus::Ready,
        OrderStatus::OnTheWay,
        OrderStatus::Delivered,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Draft => "DRAFT",
            OrderStatus::Received => "RECEIVED",
            OrderStatus::InPreparation => "IN_PREPARATION",
            OrderStatus::Ready => "READY",
            OrderStatus::OnTheWay => "ON_THE_WAY",
            OrderStatus::Delivered => "DELIVERED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str().eq_ignore_ascii_case(value))
    }

    pub fn is_kitchen(&self) -> bool {
        KITCHEN_STATUSES.contains(self)
    }

    /// Next kitchen step. The sequence stops at ON_THE_WAY; DELIVERED is only
    /// reachable through a status override.
    pub fn next_kitchen_step(self) -> Result<OrderStatus, &'static str> {
        match self {
            OrderStatus::Received => Ok(OrderStatus::InPreparation),
            OrderStatus::InPreparation => Ok(OrderStatus::Ready),
            OrderStatus::Ready => Ok(OrderStatus::OnTheWay),
            OrderStatus::OnTheWay | OrderStatus::Delivered => {
                Err("order is already past the preparation window")
            }
            OrderStatus::Draft => Err("order has not been finalized yet"),
        }
    }

    /// Previous kitchen step. ON_THE_WAY is a one-way gate: once dispatched an
    /// order never moves back.
    pub fn previous_kitchen_step(self) -> Result<OrderStatus, &'static str> {
        match self {
            OrderStatus::OnTheWay | OrderStatus::Delivered => {
                Err("order cannot move back after dispatch or delivery")
            }
            OrderStatus::Ready => Ok(OrderStatus::InPreparation),
            OrderStatus::InPreparation => Ok(OrderStatus::Received),
            OrderStatus::Received => Ok(OrderStatus::Draft),
            OrderStatus::Draft => Err("order is already at the start"),
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
