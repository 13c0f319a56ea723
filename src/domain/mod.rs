//! Domain layer - Pure sync abstractions
//!
//! This layer contains NO transport code (no reqwest client, no WebSocket).
//! Only gateway trait definitions, feed event types and domain error types.

pub mod errors;
pub mod gateways;

pub use errors::{CatalogError, ChannelError, StoreError, SyncError};
pub use gateways::*;
