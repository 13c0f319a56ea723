use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

use super::store_error_response;
use crate::infrastructure::AppState;

pub async fn list_authors(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list_authors().await {
        Ok(authors) => (StatusCode::OK, Json(authors)).into_response(),
        Err(e) => store_error_response(e),
    }
}
