pub mod author;
pub mod books;
pub mod health;
pub mod sync;

use axum::{
    Json, Router,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::json;

use crate::domain::{CatalogError, StoreError, SyncError};
use crate::infrastructure::AppState;

pub fn api_router(state: AppState) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Books
        .route("/books", get(books::list_books).post(books::create_book))
        .route(
            "/books/:id",
            get(books::get_book)
                .put(books::update_book)
                .delete(books::delete_book),
        )
        .route("/books/:id/refresh", post(books::refresh_book))
        // Sync
        .route("/sync/bootstrap", post(sync::bootstrap))
        .route("/sync/search", get(sync::search))
        // Authors
        .route("/authors", get(author::list_authors))
        .with_state(state)
}

pub(crate) fn sync_error_status(e: &SyncError) -> StatusCode {
    match e {
        SyncError::NotSyncable(_) => StatusCode::CONFLICT,
        SyncError::InvalidRecord(_) => StatusCode::BAD_GATEWAY,
        SyncError::Catalog(CatalogError::NotFound) => StatusCode::NOT_FOUND,
        SyncError::Catalog(CatalogError::Timeout) => StatusCode::GATEWAY_TIMEOUT,
        SyncError::Catalog(_) => StatusCode::BAD_GATEWAY,
        SyncError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub(crate) fn sync_error_response(e: SyncError) -> Response {
    (sync_error_status(&e), Json(json!({ "error": e.to_string() }))).into_response()
}

pub(crate) fn store_error_response(e: StoreError) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
    )
        .into_response()
}

pub(crate) fn not_found(what: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("{} not found", what) })),
    )
        .into_response()
}
