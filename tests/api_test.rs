use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use bookcache::infrastructure::{AppState, HttpCatalogClient, LocalStore};
use bookcache::server::build_router;
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup_app(server: &MockServer) -> (Router, AppState) {
    let store = LocalStore::open("sqlite::memory:")
        .await
        .expect("Failed to open store");
    let catalog = HttpCatalogClient::new(&server.uri(), Duration::from_secs(2)).unwrap();
    let state = AppState::new(store, Arc::new(catalog)).await.unwrap();
    (build_router(state.clone(), &[]), state)
}

async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn mount_catalog(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/Books"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "id": "1", "title": "1984", "authorName": "Orwell", "rating": null },
            { "id": "2", "title": "Animal Farm", "authorName": "Orwell", "images": ["http://img/af.jpg"] }
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_health_check() {
    let server = MockServer::start().await;
    let (app, _) = setup_app(&server).await;

    let (status, body) = send(&app, "GET", "/api/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "bookcache");
}

#[tokio::test]
async fn test_bootstrap_then_list() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    let (app, state) = setup_app(&server).await;

    let (status, body) = send(&app, "POST", "/api/sync/bootstrap", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["merged"], 2);

    let (status, authors) = send(&app, "GET", "/api/authors", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(authors.as_array().unwrap().len(), 1);
    assert_eq!(authors[0]["book_ids"].as_array().unwrap().len(), 2);

    // The list is a live view, give it a moment to catch up
    let mut rx = state.view.subscribe_books();
    while rx.borrow_and_update().len() < 2 {
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .expect("list never updated")
            .unwrap();
    }

    let (status, books) = send(&app, "GET", "/api/books", None).await;
    assert_eq!(status, StatusCode::OK);
    let books = books.as_array().unwrap();
    assert_eq!(books.len(), 2);
    assert_eq!(books[0]["title"], "1984");
    assert_eq!(books[0]["rating"], 0.0);
    assert_eq!(books[1]["primary_image_url"], "http://img/af.jpg");
}

#[tokio::test]
async fn test_create_book_returns_detail() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/Books"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({
            "id": "77", "title": "Solaris", "authorName": "Lem", "description": "no description"
        })))
        .mount(&server)
        .await;
    let (app, _) = setup_app(&server).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/books",
        Some(json!({ "title": "Solaris", "author_name": "Lem" })),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["remote_id"], "77");
    assert_eq!(body["currency"], "USD");

    let id = body["id"].as_str().unwrap();
    let (status, detail) = send(&app, "GET", &format!("/api/books/{}", id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["title"], "Solaris");
}

#[tokio::test]
async fn test_create_book_requires_title() {
    let server = MockServer::start().await;
    let (app, _) = setup_app(&server).await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/books",
        Some(json!({ "title": "  ", "author_name": "Lem" })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_failed_remote_delete_is_bad_gateway() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/Books/1"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;
    let (app, state) = setup_app(&server).await;
    send(&app, "POST", "/api/sync/bootstrap", None).await;
    let book = state.store.find_by_remote_id("1").await.unwrap().unwrap();

    let (status, body) = send(&app, "DELETE", &format!("/api/books/{}", book.id), None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("500"));
    assert!(state.store.find_by_id(&book.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_removes_book() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("DELETE"))
        .and(path("/Books/2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "2" })))
        .expect(1)
        .mount(&server)
        .await;
    let (app, state) = setup_app(&server).await;
    send(&app, "POST", "/api/sync/bootstrap", None).await;
    let book = state.store.find_by_remote_id("2").await.unwrap().unwrap();

    let (status, _) = send(&app, "DELETE", &format!("/api/books/{}", book.id), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&app, "GET", &format!("/api/books/{}", book.id), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_update_round_trips_through_catalog() {
    let server = MockServer::start().await;
    mount_catalog(&server).await;
    Mock::given(method("PUT"))
        .and(path("/Books/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "1", "title": "Nineteen Eighty-Four", "authorName": "George Orwell", "pages": 328
        })))
        .mount(&server)
        .await;
    let (app, state) = setup_app(&server).await;
    send(&app, "POST", "/api/sync/bootstrap", None).await;
    let book = state.store.find_by_remote_id("1").await.unwrap().unwrap();

    let (status, body) = send(
        &app,
        "PUT",
        &format!("/api/books/{}", book.id),
        Some(json!({ "title": "1984 (edited)", "author_name": "Orwell" })),
    )
    .await;

    // The server's version wins over the submitted edit
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], book.id.as_str());
    assert_eq!(body["title"], "Nineteen Eighty-Four");
    assert_eq!(body["author_name"], "George Orwell");
    assert_eq!(body["pages"], 328);
}

#[tokio::test]
async fn test_unknown_book_is_not_found() {
    let server = MockServer::start().await;
    let (app, _) = setup_app(&server).await;

    let (status, _) = send(&app, "GET", "/api/books/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "PUT", "/api/books/nope", Some(json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "POST", "/api/books/nope/refresh", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_search_reports_catalog_failure() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Books"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    let (app, state) = setup_app(&server).await;

    let (status, body) = send(&app, "GET", "/api/sync/search?q=dune", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].is_string());
    assert_eq!(state.store.count_books().await.unwrap(), 0);
}
