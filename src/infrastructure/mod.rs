//! Infrastructure layer - Framework implementations
//!
//! This layer contains:
//! - Configuration loading (config)
//! - Database connection and migrations (db)
//! - The local store and its live queries (store)
//! - Catalog REST client (catalog_client)
//! - WebSocket realtime feed (realtime)
//! - HTTP server setup (server)
//! - Application state (state)

pub mod catalog_client;
pub mod config;
pub mod db;
pub mod realtime;
pub mod server;
pub mod state;
pub mod store;

pub use catalog_client::HttpCatalogClient;
pub use realtime::WsRealtimeFeed;
pub use state::AppState;
pub use store::{LiveQuery, LocalStore, StoreChange};
