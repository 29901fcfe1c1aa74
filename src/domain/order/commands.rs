use uuid::Uuid;

use crate::domain::client::Client;
use crate::domain::dish::Dish;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================
//
// Collaborator lookups (dish, client) are resolved by the command handler
// before the command reaches the aggregate. A failed lookup is passed as
// `None` so the aggregate can check order state first and report the
// failures in a stable order.
//
// ============================================================================

#[derive(Debug, Clone)]
pub enum OrderCommand {
    AddItem {
        dish_id: Uuid,
        dish: Option<Dish>,
        quantity: u32,
    },
    RemoveItem {
        dish_id: Uuid,
        quantity: u32,
    },
    Finalize {
        client: Option<Client>,
    },
    Advance,
    Regress,
    OverrideStatus {
        status: OrderStatus,
        grant: AdminGrant,
    },
}

impl OrderCommand {
    pub fn name(&self) -> &'static str {
        match self {
            OrderCommand::AddItem { .. } => "add_item",
            OrderCommand::RemoveItem { .. } => "remove_item",
            OrderCommand::Finalize { .. } => "finalize",
            OrderCommand::Advance => "advance",
            OrderCommand::Regress => "regress",
            OrderCommand::OverrideStatus { .. } => "override_status",
        }
    }
}

/// Capability required for the privileged status override.
///
/// Overrides bypass the kitchen sequence entirely and can push a draft past
/// finalize without a delivery snapshot, so each one names who did it and why.
#[derive(Debug, Clone, PartialEq)]
pub struct AdminGrant {
    operator: String,
    reason: String,
}

impl AdminGrant {
    pub fn new(operator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            reason: reason.into(),
        }
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}
