//! Domain error types
//!
//! These errors are framework-agnostic and describe what went wrong at each
//! boundary of the sync engine: the local store, the remote catalog, the
//! realtime channel, and the coordinator that composes them.

use std::fmt;

use sea_orm::{DbErr, SqlErr};

/// Failure while reading from or writing to the local store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    /// A unique or foreign-key constraint rejected the write
    Constraint(String),
    /// Any other persistence failure
    Database(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Constraint(msg) => write!(f, "Constraint violation: {}", msg),
            StoreError::Database(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl std::error::Error for StoreError {}

impl From<DbErr> for StoreError {
    fn from(e: DbErr) -> Self {
        match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(msg)) => StoreError::Constraint(msg),
            Some(SqlErr::ForeignKeyConstraintViolation(msg)) => StoreError::Constraint(msg),
            // Some statement paths surface SQLite's message without an error code
            _ if e.to_string().contains("constraint failed") => {
                StoreError::Constraint(e.to_string())
            }
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Failure at the catalog service boundary. The client never retries.
#[derive(Debug, Clone, PartialEq)]
pub enum CatalogError {
    /// Connection refused, DNS failure, broken transport
    Network(String),
    /// The request exceeded the configured timeout
    Timeout,
    /// Non-success HTTP status
    Server(u16),
    /// The requested record does not exist remotely
    NotFound,
    /// The response body did not match the record shape
    Decode(String),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::Network(msg) => write!(f, "Network error: {}", msg),
            CatalogError::Timeout => write!(f, "Catalog request timed out"),
            CatalogError::Server(status) => write!(f, "Catalog returned status {}", status),
            CatalogError::NotFound => write!(f, "Record not found in catalog"),
            CatalogError::Decode(msg) => write!(f, "Invalid catalog response: {}", msg),
        }
    }
}

impl std::error::Error for CatalogError {}

impl From<reqwest::Error> for CatalogError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CatalogError::Timeout
        } else if e.is_decode() {
            CatalogError::Decode(e.to_string())
        } else {
            CatalogError::Network(e.to_string())
        }
    }
}

/// Fatal realtime channel failure. The subscription is closed afterwards and
/// has to be re-established by its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelError {
    Connect(String),
    Socket(String),
    Closed(String),
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::Connect(msg) => write!(f, "Realtime connect failed: {}", msg),
            ChannelError::Socket(msg) => write!(f, "Realtime socket error: {}", msg),
            ChannelError::Closed(reason) => write!(f, "Realtime channel closed: {}", reason),
        }
    }
}

impl std::error::Error for ChannelError {}

/// Error returned across the coordinator boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncError {
    Catalog(CatalogError),
    Store(StoreError),
    /// The book has no remote id yet, so there is nothing to update remotely
    NotSyncable(String),
    /// A record or document could not be turned into a mergeable record
    InvalidRecord(String),
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::Catalog(e) => write!(f, "{}", e),
            SyncError::Store(e) => write!(f, "{}", e),
            SyncError::NotSyncable(id) => write!(f, "Book {} was never synced", id),
            SyncError::InvalidRecord(msg) => write!(f, "Invalid record: {}", msg),
        }
    }
}

impl std::error::Error for SyncError {}

impl From<CatalogError> for SyncError {
    fn from(e: CatalogError) -> Self {
        SyncError::Catalog(e)
    }
}

impl From<StoreError> for SyncError {
    fn from(e: StoreError) -> Self {
        SyncError::Store(e)
    }
}

impl From<DbErr> for SyncError {
    fn from(e: DbErr) -> Self {
        SyncError::Store(e.into())
    }
}
