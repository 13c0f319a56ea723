use axum::{
    Json,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::sync_error_response;
use crate::infrastructure::AppState;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    q: String,
}

pub async fn bootstrap(State(state): State<AppState>) -> impl IntoResponse {
    match state.coordinator.bootstrap_sync().await {
        Ok(merged) => (StatusCode::OK, Json(json!({ "merged": merged }))).into_response(),
        Err(e) => sync_error_response(e),
    }
}

pub async fn search(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> impl IntoResponse {
    match state.coordinator.search_sync(&params.q).await {
        Ok(merged) => (
            StatusCode::OK,
            Json(json!({ "query": params.q, "merged": merged })),
        )
            .into_response(),
        Err(e) => sync_error_response(e),
    }
}
