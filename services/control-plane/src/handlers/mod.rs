//! HTTP handlers. Each maps onto one orchestrator operation or a read of the store.

pub mod agents;
pub mod sessions;
pub mod users;
