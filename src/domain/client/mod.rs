// ============================================================================
// Client Domain - profiles and delivery addresses consumed by finalize
// ============================================================================

pub mod value_objects;
pub mod directory;

pub use value_objects::*;
pub use directory::*;
