// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// `order` owns the lifecycle and the cart. `dish` and `client` are the
// collaborators it reads from: menu prices when items are added, profiles
// when a draft is opened and finalized.
//
// ============================================================================

pub mod client;
pub mod dish;
pub mod order;
