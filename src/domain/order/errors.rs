use uuid::Uuid;

use crate::store::StoreError;
use crate::utils::IsTransient;
use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("{entity} not found: {key}")]
    NotFound { entity: &'static str, key: Uuid },

    #[error("Operation not allowed in status {status}: {reason}")]
    InvalidState { status: OrderStatus, reason: &'static str },

    #[error("Cannot change status from {from}: {reason}")]
    InvalidTransition { from: OrderStatus, reason: &'static str },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Client {0} has no delivery address configured")]
    MissingAddress(Uuid),

    #[error("No client configured; register the initial client record first")]
    NoClientConfigured,

    #[error("Aggregate not initialized")]
    NotInitialized,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Coarse error classification for callers that map failures to responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    InvalidState,
    InvalidTransition,
    InvalidArgument,
    MissingAddress,
    NoClientConfigured,
    /// Storage or collaborator failure, not a business rule
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::InvalidState => "invalid_state",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::MissingAddress => "missing_address",
            ErrorKind::NoClientConfigured => "no_client_configured",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl OrderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OrderError::NotFound { .. } => ErrorKind::NotFound,
            OrderError::InvalidState { .. } => ErrorKind::InvalidState,
            OrderError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            OrderError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            OrderError::MissingAddress(_) => ErrorKind::MissingAddress,
            OrderError::NoClientConfigured => ErrorKind::NoClientConfigured,
            OrderError::NotInitialized | OrderError::Store(_) => ErrorKind::Infrastructure,
        }
    }

    pub(crate) fn order_not_found(order_id: Uuid) -> Self {
        OrderError::NotFound { entity: "Order", key: order_id }
    }
}

impl IsTransient for OrderError {
    fn is_transient(&self) -> bool {
        match self {
            OrderError::Store(e) => e.is_transient(),
            _ => false,
        }
    }
}
