// ============================================================================
// Order Domain - lifecycle state machine and cart protocol
// ============================================================================
//
// - Value objects (OrderItem, OrderStatus)
// - Events (OrderDraftCreated, OrderItemAdded, OrderFinalized, ...)
// - Commands (AddItem, Finalize, Advance, OverrideStatus, ...)
// - Errors (OrderError, ErrorKind)
// - Aggregate (OrderAggregate with business rules)
// - Command Handler (writes) and Query Handler (reads)
//
// ============================================================================

pub mod value_objects;
pub mod events;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod command_handler;
pub mod query_handler;

// Re-export for convenience
pub use value_objects::*;
pub use events::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use command_handler::*;
pub use query_handler::*;
