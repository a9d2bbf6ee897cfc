//! Integration tests for the ingestion engine.
//!
//! Each test runs a real sync pass against a wiremock upstream and an
//! in-memory SQLite database with migrations applied.

use ingestors::error::IngestError;
use ingestors::models::{asset, equipment_type, organization, outbox_event};
use sea_orm::EntityTrait;
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[path = "test_utils/mod.rs"]
mod test_utils;

use test_utils::{
    SourceFixture, insert_endpoint, insert_mapping, insert_source, setup_test_db,
    test_orchestrator,
};

async fn org_mappings(db: &sea_orm::DatabaseConnection, endpoint_id: uuid::Uuid) {
    insert_mapping(db, endpoint_id, "id", "organization", "", true, 0)
        .await
        .unwrap();
    insert_mapping(db, endpoint_id, "name", "organization", "name", false, 1)
        .await
        .unwrap();
}

#[tokio::test]
async fn mode_none_sends_no_authorization_header() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-1", "name": "Acme"}
        ])))
        .expect(1)
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, endpoint.id).await;

    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 1);

    let requests = upstream.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(!requests[0].headers.contains_key("authorization"));
}

#[tokio::test]
async fn get_with_null_template_sends_empty_body_and_no_content_type() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    insert_endpoint(&db, source.id, "orgs", "GET", "list", Some(json!(null)))
        .await
        .unwrap();

    test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();

    let requests = upstream.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert!(requests[0].body.is_empty());
    assert!(!requests[0].headers.contains_key("content-type"));
}

#[tokio::test]
async fn rejection_triggers_one_refresh_and_one_retry() {
    let upstream = MockServer::start().await;

    // First fetch with the stale token is rejected once
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .and(header("authorization", "Bearer stale"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({"error": "expired"})))
        .expect(1)
        .mount(&upstream)
        .await;

    // The retry carries the freshly discovered token
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .and(header("authorization", "Bearer fresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-1", "name": "Acme"}
        ])))
        .expect(1)
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "accessToken": "fresh",
            "refreshToken": "fresh-refresh",
            "expiresIn": 3600
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(
        &db,
        SourceFixture::bearer(&upstream.uri(), &format!("{}/token", upstream.uri()), "stale"),
    )
    .await
    .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, endpoint.id).await;

    let source_id = source.id;
    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 1);

    // Exactly two upstream data requests: the rejection and the retry
    let requests = upstream.received_requests().await.unwrap();
    let data_requests = requests
        .iter()
        .filter(|r| r.url.path() == "/orgs")
        .count();
    assert_eq!(data_requests, 2);

    // Discovered tokens were persisted
    let stored = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.access_token.as_deref(), Some("fresh"));
    assert_eq!(stored.refresh_token.as_deref(), Some("fresh-refresh"));
}

#[tokio::test]
async fn second_rejection_is_mirrored_verbatim_with_no_third_attempt() {
    let upstream = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(
            ResponseTemplate::new(403).set_body_json(json!({"error": "still denied"})),
        )
        .expect(2)
        .mount(&upstream)
        .await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "still-bad"
        })))
        .expect(1)
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(
        &db,
        SourceFixture::bearer(&upstream.uri(), &format!("{}/token", upstream.uri()), "stale"),
    )
    .await
    .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    // The retried response comes back as-is: its status and body are the
    // upstream's second answer, untouched.
    let response = test_orchestrator(db.clone())
        .fetch_endpoint(source, &endpoint)
        .await
        .unwrap();
    assert_eq!(response.status, 403);
    let body: serde_json::Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, json!({"error": "still denied"}));
}

#[tokio::test]
async fn undiscoverable_token_surfaces_the_original_rejection() {
    let upstream = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "nope"})))
        .expect(1)
        .mount(&upstream)
        .await;

    // Auth endpoint answers, but nothing in the body looks like a token
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .expect(1)
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(
        &db,
        SourceFixture::bearer(&upstream.uri(), &format!("{}/token", upstream.uri()), "stale"),
    )
    .await
    .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let err = test_orchestrator(db.clone())
        .fetch_endpoint(source, &endpoint)
        .await
        .unwrap_err();
    match err {
        IngestError::AuthRejected {
            status,
            content_type,
            body,
        } => {
            assert_eq!(status, 401);
            assert!(content_type.unwrap().starts_with("application/json"));
            let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
            assert_eq!(body, json!({"error": "nope"}));
        }
        other => panic!("expected AuthRejected, got {:?}", other),
    }
}

#[tokio::test]
async fn unchanged_payload_processes_zero_items_on_the_second_pass() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-1", "name": "Acme"}
        ])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, endpoint.id).await;

    let source_id = source.id;
    let orchestrator = test_orchestrator(db.clone());

    let first = orchestrator.sync_source(source).await.unwrap();
    assert_eq!(first.items_upserted, 1);

    let after_first = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let first_success = after_first.last_success_at.unwrap();

    let endpoint_row = ingestors::models::Endpoint::find_by_id(endpoint.id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(endpoint_row.last_content_hash.is_some());

    let second = orchestrator.sync_source(after_first).await.unwrap();
    assert_eq!(second.items_upserted, 0);
    assert_eq!(second.endpoints_unchanged, 1);

    // Bookkeeping still advances on an unchanged pass
    let after_second = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(after_second.last_success_at.unwrap() >= first_success);

    let orgs = organization::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(orgs.len(), 1);
}

#[tokio::test]
async fn double_encoded_payload_is_unwrapped_once() {
    let intended = json!([{"id": "org-1", "name": "Acme"}]);
    let double_encoded = serde_json::to_string(&intended.to_string()).unwrap();

    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(double_encoded, "application/json"),
        )
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, endpoint.id).await;

    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 1);

    let orgs = organization::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(orgs[0].name, "Acme");
}

#[tokio::test]
async fn unknown_equipment_type_is_created_once_and_reused() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": [
            {"serial": "FL-100", "type": "forklift"},
            {"serial": "FL-200", "type": "forklift"}
        ]})))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "assets", "GET", "auto", None)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "serial", "asset", "serial", true, 0)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "type", "asset", "equipment_type_code", false, 1)
        .await
        .unwrap();

    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 2);
    assert_eq!(outcome.items_skipped, 0);

    let types = equipment_type::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].code, "forklift");

    let assets = asset::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(assets.len(), 2);
    assert!(assets.iter().all(|a| a.equipment_type_id == types[0].id));
}

#[tokio::test]
async fn name_only_type_reference_creates_the_type_on_demand() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"serial": "FL-900", "type_name": "Scissor Lift"}
        ])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "assets", "GET", "list", None)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "serial", "asset", "serial", true, 0)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "type_name", "asset", "equipment_type_name", false, 1)
        .await
        .unwrap();

    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 1);
    assert_eq!(outcome.items_skipped, 0);

    // The type was minted from the name, code derived from it
    let types = equipment_type::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(types.len(), 1);
    assert_eq!(types[0].name, "Scissor Lift");
    assert_eq!(types[0].code, "scissor lift");

    let assets = asset::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(assets[0].equipment_type_id, types[0].id);
}

#[tokio::test]
async fn each_endpoint_tracks_its_own_delta() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-1", "name": "Acme"}
        ])))
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/partners"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-2", "name": "Globex"}
        ])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let orgs = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, orgs.id).await;
    let partners = insert_endpoint(&db, source.id, "partners", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, partners.id).await;

    let source_id = source.id;
    let orchestrator = test_orchestrator(db.clone());

    let first = orchestrator.sync_source(source).await.unwrap();
    assert_eq!(first.items_upserted, 2);

    // Both payloads are byte-identical to the first pass; neither may be
    // reprocessed just because the other endpoint synced after it.
    let refreshed = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let second = orchestrator.sync_source(refreshed).await.unwrap();
    assert_eq!(second.items_upserted, 0);
    assert_eq!(second.endpoints_unchanged, 2);
}

#[tokio::test]
async fn asset_status_change_appends_an_outbox_event() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"serial": "FL-100", "type": "forklift", "state": "available"}
        ])))
        .up_to_n_times(1)
        .mount(&upstream)
        .await;
    Mock::given(method("GET"))
        .and(path("/assets"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"serial": "FL-100", "type": "forklift", "state": "in_use"}
        ])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "assets", "GET", "list", None)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "serial", "asset", "serial", true, 0)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "type", "asset", "equipment_type_code", false, 1)
        .await
        .unwrap();
    insert_mapping(&db, endpoint.id, "state", "asset", "status", false, 2)
        .await
        .unwrap();

    let source_id = source.id;
    let orchestrator = test_orchestrator(db.clone());

    let first = orchestrator.sync_source(source).await.unwrap();
    assert_eq!(first.status_transitions, 0);

    let refreshed = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    let second = orchestrator.sync_source(refreshed).await.unwrap();
    assert_eq!(second.status_transitions, 1);

    let events = outbox_event::Entity::find().all(db.as_ref()).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].kind, "asset.state_transitioned");
    assert_eq!(events[0].payload["from"], "available");
    assert_eq!(events[0].payload["to"], "in_use");
}

#[tokio::test]
async fn item_without_identity_is_skipped_without_failing_the_pass() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "org-1", "name": "Acme"},
            {"name": "Anonymous Widgets"},
            {"id": "org-2", "name": "Globex"}
        ])))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    let endpoint = insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();
    org_mappings(&db, endpoint.id).await;

    let outcome = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap();
    assert_eq!(outcome.items_upserted, 2);
    assert_eq!(outcome.items_skipped, 1);
}

#[tokio::test]
async fn upstream_failure_records_the_error_on_the_source() {
    let upstream = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/orgs"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&upstream)
        .await;

    let db = setup_test_db().await.unwrap();
    let source = insert_source(&db, SourceFixture::unauthenticated(&upstream.uri()))
        .await
        .unwrap();
    insert_endpoint(&db, source.id, "orgs", "GET", "list", None)
        .await
        .unwrap();

    let source_id = source.id;
    let err = test_orchestrator(db.clone())
        .sync_source(source)
        .await
        .unwrap_err();
    assert!(matches!(err, IngestError::Transport(_)));

    let stored = ingestors::models::Source::find_by_id(source_id)
        .one(db.as_ref())
        .await
        .unwrap()
        .unwrap();
    assert!(stored.last_error.is_some());
    assert!(stored.last_success_at.is_none());
    assert!(stored.next_sync_at.is_some());
}
