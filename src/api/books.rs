use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use serde_json::json;

use super::{not_found, store_error_response, sync_error_response};
use crate::infrastructure::AppState;
use crate::models::BookEdit;

#[derive(Deserialize)]
pub struct CreateBookRequest {
    title: String,
    author_name: String,
}

pub async fn list_books(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.view.books())).into_response()
}

pub async fn get_book(State(state): State<AppState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.view.detail(&id).await {
        Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
        Ok(None) => not_found("Book"),
        Err(e) => store_error_response(e),
    }
}

pub async fn create_book(
    State(state): State<AppState>,
    Json(payload): Json<CreateBookRequest>,
) -> impl IntoResponse {
    if payload.title.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "Title is required" })),
        )
            .into_response();
    }

    match state
        .coordinator
        .create_local_draft(payload.title.trim(), payload.author_name.trim())
        .await
    {
        Ok(id) => match state.view.detail(&id).await {
            Ok(Some(detail)) => (StatusCode::CREATED, Json(detail)).into_response(),
            Ok(None) => (StatusCode::CREATED, Json(json!({ "id": id }))).into_response(),
            Err(e) => store_error_response(e),
        },
        Err(e) => sync_error_response(e),
    }
}

pub async fn update_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(edit): Json<BookEdit>,
) -> impl IntoResponse {
    match state.coordinator.update_remote_and_merge(&id, edit).await {
        Ok(Some(id)) => match state.view.detail(&id).await {
            Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
            Ok(None) => not_found("Book"),
            Err(e) => store_error_response(e),
        },
        Ok(None) => not_found("Book"),
        Err(e) => sync_error_response(e),
    }
}

pub async fn delete_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.delete_remote_and_local(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found("Book"),
        Err(e) => sync_error_response(e),
    }
}

pub async fn refresh_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.refresh_from_remote(&id).await {
        Ok(Some(id)) => match state.view.detail(&id).await {
            Ok(Some(detail)) => (StatusCode::OK, Json(detail)).into_response(),
            Ok(None) => not_found("Book"),
            Err(e) => store_error_response(e),
        },
        Ok(None) => not_found("Book"),
        Err(e) => sync_error_response(e),
    }
}
