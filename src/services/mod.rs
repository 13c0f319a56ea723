//! Services Layer
//!
//! Read-side services that sit between the store and the HTTP handlers.

pub mod query_view;

pub use query_view::{BookDetailView, BookSummary, QueryView};
