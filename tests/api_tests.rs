//! Integration tests for the admin HTTP surface.

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use ingestors::config::PollerConfig;
use ingestors::ingest::SyncOrchestrator;
use ingestors::server::{AppState, create_app};
use sea_orm::DatabaseConnection;
use serde_json::{Value, json};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{SourceFixture, insert_endpoint, insert_source, setup_test_db};

async fn spawn_app() -> (Arc<DatabaseConnection>, Router, mpsc::Receiver<Uuid>) {
    let db = setup_test_db().await.unwrap();
    let (sync_tx, sync_rx) = mpsc::channel(8);
    let orchestrator =
        SyncOrchestrator::new(reqwest::Client::new(), db.clone(), PollerConfig::default());
    let state = AppState::new(db.clone(), sync_tx, orchestrator);
    (db.clone(), create_app(state), sync_rx)
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn put_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("PUT")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn created_source_never_exposes_token_material() {
    let (_db, app, _rx) = spawn_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/sources",
            json!({
                "name": "Inventory",
                "base_url": "https://inventory.example.com/api/",
                "auth_mode": "bearer",
                "auth_endpoint": "https://inventory.example.com/token",
                "auth_payload": {"client_secret": "hunter2"},
                "access_token": "top-secret-token",
                "refresh_token": "top-secret-refresh"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    assert!(response.headers().contains_key("location"));

    let body = json_body(response).await;
    let rendered = body.to_string();
    assert!(!rendered.contains("top-secret-token"));
    assert!(!rendered.contains("top-secret-refresh"));
    assert!(!rendered.contains("hunter2"));
    assert_eq!(body["has_access_token"], true);
    assert_eq!(body["has_refresh_token"], true);
    assert_eq!(body["auth_mode"], "bearer");
}

#[tokio::test]
async fn bearer_source_without_auth_endpoint_is_rejected() {
    let (_db, app, _rx) = spawn_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/sources",
            json!({
                "name": "Broken",
                "base_url": "https://api.example.com/",
                "auth_mode": "bearer"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn sync_now_is_accepted_and_queued() {
    let (db, app, mut rx) = spawn_app().await;

    let source = insert_source(&db, SourceFixture::unauthenticated("http://upstream.test/"))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/sources/{}/sync", source.id),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body = json_body(response).await;
    assert_eq!(body["status"], "accepted");

    // The trigger landed in the poller's queue
    assert_eq!(rx.try_recv().unwrap(), source.id);
}

#[tokio::test]
async fn sync_now_for_unknown_source_is_not_found() {
    let (_db, app, _rx) = spawn_app().await;

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/sources/{}/sync", Uuid::new_v4()),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn mapping_set_requires_an_identity_mapping() {
    let (db, app, _rx) = spawn_app().await;

    let source = insert_source(&db, SourceFixture::unauthenticated("http://upstream.test/"))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let uri = format!(
        "/api/v1/sources/{}/endpoints/{}/mappings",
        source.id, endpoint.id
    );
    let response = app
        .oneshot(put_json(
            &uri,
            json!([
                {"path_expr": "name", "target_kind": "organization", "target_field": "name"}
            ]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn mapping_replacement_preserves_evaluation_order() {
    let (db, app, _rx) = spawn_app().await;

    let source = insert_source(&db, SourceFixture::unauthenticated("http://upstream.test/"))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let uri = format!(
        "/api/v1/sources/{}/endpoints/{}/mappings",
        source.id, endpoint.id
    );
    let response = app
        .clone()
        .oneshot(put_json(
            &uri,
            json!([
                {"path_expr": "code", "target_kind": "organization", "is_identity": true},
                {"path_expr": "id", "target_kind": "organization", "is_identity": true},
                {"path_expr": "name", "target_kind": "organization", "target_field": "name"}
            ]),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let listed = app.oneshot(get(&uri)).await.unwrap();
    let body = json_body(listed).await;
    let exprs: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["path_expr"].as_str().unwrap())
        .collect();
    assert_eq!(exprs, vec!["code", "id", "name"]);
}

#[tokio::test]
async fn endpoint_with_unknown_shape_is_rejected() {
    let (db, app, _rx) = spawn_app().await;

    let source = insert_source(&db, SourceFixture::unauthenticated("http://upstream.test/"))
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!("/api/v1/sources/{}/endpoints", source.id),
            json!({"path": "orgs", "response_shape": "tree"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn endpoint_lookup_is_scoped_to_its_source() {
    let (db, app, _rx) = spawn_app().await;

    let source_a = insert_source(&db, SourceFixture::unauthenticated("http://a.test/"))
        .await
        .unwrap();
    let source_b = insert_source(&db, SourceFixture::unauthenticated("http://b.test/"))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source_a.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let response = app
        .oneshot(get(&format!(
            "/api/v1/sources/{}/endpoints/{}",
            source_b.id, endpoint.id
        )))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deleting_a_source_cascades_to_endpoints() {
    let (db, app, _rx) = spawn_app().await;

    let source = insert_source(&db, SourceFixture::unauthenticated("http://upstream.test/"))
        .await
        .unwrap();
    insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri(format!("/api/v1/sources/{}", source.id))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let listed = app
        .oneshot(get(&format!("/api/v1/sources/{}/endpoints", source.id)))
        .await
        .unwrap();
    assert_eq!(listed.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_endpoint_reports_ok() {
    let (_db, app, _rx) = spawn_app().await;

    let response = app.oneshot(get("/healthz")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn error_body_echoes_the_request_id_header() {
    let (_db, app, _rx) = spawn_app().await;

    let request = Request::builder()
        .method("GET")
        .uri(format!("/api/v1/sources/{}", Uuid::new_v4()))
        .header("x-request-id", "req-abc-123")
        .body(Body::empty())
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let body = json_body(response).await;
    assert_eq!(body["trace_id"], "req-abc-123");
}

#[tokio::test]
async fn preview_mirrors_a_non_json_auth_rejection() {
    use wiremock::matchers::{method as upstream_method, path as upstream_path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    let upstream = MockServer::start().await;
    Mock::given(upstream_method("GET"))
        .and(upstream_path("/orgs"))
        .respond_with(ResponseTemplate::new(401).set_body_raw("denied", "text/plain"))
        .mount(&upstream)
        .await;
    // Auth endpoint answers, but nothing in the body looks like a token
    Mock::given(upstream_method("POST"))
        .and(upstream_path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&upstream)
        .await;

    let (db, app, _rx) = spawn_app().await;
    let source = insert_source(
        &db,
        SourceFixture::bearer(&upstream.uri(), &format!("{}/token", upstream.uri()), "stale"),
    )
    .await
    .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let response = app
        .oneshot(post_json(
            &format!(
                "/api/v1/sources/{}/endpoints/{}/preview",
                source.id, endpoint.id
            ),
            json!({}),
        ))
        .await
        .unwrap();

    // The upstream rejection comes back untouched, content type included
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|value| value.to_str().ok())
        .unwrap()
        .to_string();
    assert!(content_type.starts_with("text/plain"));

    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(bytes.as_ref(), b"denied");
}
