// ============================================================================
// Event Sourcing Infrastructure
// ============================================================================
//
// Generic aggregate/event abstractions. Domain-specific code is in
// src/domain/, persistence backends are in src/store/.
//
// ============================================================================

mod core;

pub use self::core::*;
