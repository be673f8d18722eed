use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use recordbase_api::{build_router, AppState};
use recordbase_core::{open_db_in_memory, LocalFileStore};
use serde_json::{json, Value};
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

const ADMIN: (i64, &str) = (1, "admin");
const USER: (i64, &str) = (2, "user");

fn app() -> (Router, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let state = AppState::new(
        open_db_in_memory().unwrap(),
        LocalFileStore::new(dir.path()),
        Duration::from_secs(60),
    )
    .unwrap();
    (build_router(state), dir)
}

async fn send_raw(
    app: &Router,
    method: Method,
    uri: &str,
    principal: Option<(i64, &str)>,
    body: Option<Value>,
) -> Response {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some((id, role)) = principal {
        builder = builder
            .header("x-principal-id", id.to_string())
            .header("x-principal-role", role);
    }
    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    app.clone().oneshot(request).await.unwrap()
}

async fn send(
    app: &Router,
    method: Method,
    uri: &str,
    principal: Option<(i64, &str)>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let response = send_raw(app, method, uri, principal, body).await;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

async fn seed_tickets(app: &Router) {
    let (status, _) = send(
        app,
        Method::POST,
        "/api/admin/modules",
        Some(ADMIN),
        Some(json!({
            "name": "tickets",
            "display_name": "Tickets",
            "config": { "statuses": ["open", "closed"], "features": ["documents", "history"] }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = send(
        app,
        Method::POST,
        "/api/admin/modules/tickets/fields",
        Some(ADMIN),
        Some(json!({
            "name": "priority",
            "display_name": "Priority",
            "field_type": "select",
            "options": ["low", "high"]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
}

async fn create_ticket(app: &Router, name: &str) -> Value {
    let (status, body) = send(
        app,
        Method::POST,
        "/api/modules/tickets/records",
        Some(ADMIN),
        Some(json!({ "name": name, "data": { "priority": "low" } })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"].clone()
}

#[tokio::test]
async fn health_is_public() {
    let (app, _dir) = app();
    let (status, body) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["module"], "recordbase_api");
}

#[tokio::test]
async fn missing_principal_is_unauthorized() {
    let (app, _dir) = app();
    let (status, body) = send(&app, Method::GET, "/api/modules", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].as_str().unwrap().contains("authentication"));
}

#[tokio::test]
async fn non_admin_cannot_define_modules() {
    let (app, _dir) = app();
    let (status, _) = send(
        &app,
        Method::POST,
        "/api/admin/modules",
        Some(USER),
        Some(json!({ "name": "tickets", "display_name": "Tickets" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn unknown_module_is_not_found() {
    let (app, _dir) = app();
    let (status, _) = send(&app, Method::GET, "/api/modules/nope", Some(ADMIN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_lifecycle_over_http() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let created = create_ticket(&app, "Printer jam").await;
    assert_eq!(created["status"], "open");
    assert_eq!(created["version"], 1);
    assert_eq!(created["data"], json!({ "priority": "low" }));
    let id = created["id"].as_i64().unwrap();

    let (status, detail) = send(
        &app,
        Method::GET,
        &format!("/api/modules/tickets/records/{id}"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["data"]["name"], "Printer jam");
    assert_eq!(detail["data"]["images"], json!([]));

    let (status, updated) = send(
        &app,
        Method::PUT,
        &format!("/api/modules/tickets/records/{id}"),
        Some(ADMIN),
        Some(json!({ "data": { "priority": "high" }, "expected_version": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["data"]["version"], 2);

    let (status, history) = send(
        &app,
        Method::GET,
        &format!("/api/modules/tickets/records/{id}/history"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(history[0]["field_name"], "priority");
    assert_eq!(history.as_array().unwrap().len(), 2);

    let (status, list) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records?status=open",
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list.as_array().unwrap().len(), 1);
    assert_eq!(list[0]["data"]["priority"], "high");

    let (status, deleted) = send(
        &app,
        Method::DELETE,
        &format!("/api/modules/tickets/records/{id}?children=cascade"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deleted["data"]["deleted_record_ids"], json!([id]));
}

#[tokio::test]
async fn invalid_record_data_is_bad_request() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/tickets/records",
        Some(ADMIN),
        Some(json!({ "name": "Bad", "data": { "priority": "urgent" } })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn stale_version_is_conflict() {
    let (app, _dir) = app();
    seed_tickets(&app).await;
    let id = create_ticket(&app, "Printer jam").await["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::PUT,
        &format!("/api/modules/tickets/records/{id}"),
        Some(ADMIN),
        Some(json!({ "name": "Renamed", "expected_version": 3 })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_delete_mode_is_bad_request() {
    let (app, _dir) = app();
    seed_tickets(&app).await;
    let id = create_ticket(&app, "Printer jam").await["id"].as_i64().unwrap();

    let (status, body) = send(
        &app,
        Method::DELETE,
        &format!("/api/modules/tickets/records/{id}?children=everything"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().contains("everything"));
}

#[tokio::test]
async fn user_without_grant_is_forbidden_until_granted() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, modules) = send(&app, Method::GET, "/api/modules", Some(USER), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(modules, json!([]));

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records",
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/admin/users/2",
        Some(ADMIN),
        Some(json!({ "email": "user@example.com", "display_name": "User" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/api/admin/users/2/permissions/tickets",
        Some(ADMIN),
        Some(json!({ "level": "viewer" })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, list) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records",
        Some(USER),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list, json!([]));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/modules/tickets/records",
        Some(USER),
        Some(json!({ "name": "Not allowed" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn documents_upload_and_download() {
    let (app, _dir) = app();
    seed_tickets(&app).await;
    let id = create_ticket(&app, "Printer jam").await["id"].as_i64().unwrap();

    let (status, document) = send(
        &app,
        Method::POST,
        &format!("/api/modules/tickets/records/{id}/documents"),
        Some(ADMIN),
        Some(json!({
            "data_uri": "data:text/plain;base64,aGVsbG8gd29ybGQ=",
            "file_name": "notes.txt"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(document["file_size"], 11);
    let doc_id = document["id"].as_i64().unwrap();

    let response = send_raw(
        &app,
        Method::GET,
        &format!("/api/modules/tickets/records/{id}/documents/{doc_id}"),
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
        "text/plain"
    );
    assert!(response.headers()[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .contains("notes.txt"));
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"hello world");
}

#[tokio::test]
async fn images_require_the_module_feature() {
    let (app, _dir) = app();
    seed_tickets(&app).await;
    let id = create_ticket(&app, "Printer jam").await["id"].as_i64().unwrap();

    let (status, _) = send(
        &app,
        Method::POST,
        &format!("/api/modules/tickets/records/{id}/images"),
        Some(ADMIN),
        Some(json!({ "data_uri": "data:image/png;base64,iVBORw0KGgo=" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_body_without_principal_is_unauthorized() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/tickets/records",
        None,
        Some(json!({ "name": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["message"].is_string());
}

#[tokio::test]
async fn malformed_body_is_bad_request_with_message() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, body) = send(
        &app,
        Method::POST,
        "/api/modules/tickets/records",
        Some(ADMIN),
        Some(json!({ "name": "Printer jam", "data": [1] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("invalid request body"));
}

#[tokio::test]
async fn non_numeric_record_id_is_bad_request_with_message() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records/abc",
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("invalid path"));

    let (status, _) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records/abc",
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn malformed_query_is_bad_request_with_message() {
    let (app, _dir) = app();
    seed_tickets(&app).await;

    let (status, body) = send(
        &app,
        Method::GET,
        "/api/modules/tickets/records?limit=lots",
        Some(ADMIN),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["message"].as_str().unwrap().starts_with("invalid query"));
}
