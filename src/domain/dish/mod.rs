// ============================================================================
// Dish Domain - menu lookups consumed by the cart
// ============================================================================

pub mod value_objects;
pub mod catalog;

pub use value_objects::*;
pub use catalog::*;
