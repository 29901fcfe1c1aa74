//! Restaurant order backend: the order lifecycle state machine and the cart
//! mutation protocol, with pluggable order storage.

pub mod config;
pub mod domain;
pub mod event_sourcing;
pub mod metrics;
pub mod store;
pub mod utils;
