use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use draugnet_api::auth::AccessPolicy;
use draugnet_api::{router, AppState};
use draugnet_core::modules::{ExternalId, ReportItem, ReportingModule};
use draugnet_core::testing::{MemoryRepository, RepositoryCall};
use draugnet_core::{
    Dispatcher, MemoryStore, ModuleMappings, ModuleRegistry, ShareDeps, ShareService,
    TemplateRegistry, TokenService,
};
use serde_json::{json, Value};
use tower::ServiceExt;

const DOMAIN_IP: &str = r#"{
    "name": "domain-ip",
    "uuid": "43b3b146-77eb-4931-b4cc-b66c60f28734",
    "meta-category": "network",
    "description": "A domain/hostname and IP address seen as a tuple",
    "version": 11,
    "attributes": {
        "domain": {"misp-attribute": "domain", "multiple": true},
        "ip": {"misp-attribute": "ip-dst", "multiple": true}
    }
}"#;

struct Ticketing;

#[async_trait]
impl ReportingModule for Ticketing {
    fn name(&self) -> &str {
        "ticketing"
    }

    async fn create_item(&self, _item: &ReportItem<'_>) -> anyhow::Result<ExternalId> {
        Ok("T-1".into())
    }

    async fn update_item(&self, _external_id: &str, _item: &ReportItem<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

struct DenyAll;

impl AccessPolicy for DenyAll {
    fn authorize(&self, _parts: &axum::http::request::Parts) -> bool {
        false
    }
}

struct TestApp {
    app: Router,
    repo: Arc<MemoryRepository>,
    store: Arc<MemoryStore>,
    _templates: tempfile::TempDir,
}

fn test_app(access: Option<Arc<dyn AccessPolicy>>) -> TestApp {
    let repo = Arc::new(MemoryRepository::new());
    let store = Arc::new(MemoryStore::new());

    let templates = tempfile::tempdir().unwrap();
    let template_dir = templates.path().join("domain-ip");
    std::fs::create_dir_all(&template_dir).unwrap();
    std::fs::write(template_dir.join("definition.json"), DOMAIN_IP).unwrap();

    let registry = ModuleRegistry::from_modules(vec![Arc::new(Ticketing)], vec![]);
    let deps = ShareDeps {
        repository: repo.clone(),
        tokens: TokenService::new(store.clone()),
        dispatcher: Dispatcher::new(Arc::new(registry), ModuleMappings::new(store.clone())),
        templates: Arc::new(TemplateRegistry::new(templates.path(), vec![])),
    };

    let mut state = AppState::new(ShareService::new(deps));
    if let Some(access) = access {
        state = state.with_access(access);
    }

    TestApp {
        app: router(Arc::new(state)),
        repo,
        store,
        _templates: templates,
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    (status, bytes.to_vec())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::get(uri).body(Body::empty()).unwrap()
}

fn json_body(bytes: &[u8]) -> Value {
    serde_json::from_slice(bytes).unwrap()
}

#[tokio::test]
async fn raw_create_then_timestamp() {
    let t = test_app(None);

    let (status, body) = send(
        &t.app,
        post_json("/share/raw", json!({"text": "phishing campaign against payroll"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let receipt = json_body(&body);
    let token = receipt["token"].as_str().unwrap().to_string();
    assert_eq!(token.len(), 32);
    assert_eq!(receipt["status"], "ok");
    assert_eq!(receipt["record_id"], receipt["event_uuid"]);
    assert_eq!(
        receipt["modules"],
        json!([{"module": "ticketing", "status": "created", "external_id": "T-1"}])
    );

    let (status, body) = send(&t.app, get(&format!("/timestamp/{token}"))).await;
    assert_eq!(status, StatusCode::OK);
    let ts: i64 = String::from_utf8(body).unwrap().parse().unwrap();
    let now = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_secs() as i64;
    assert!((now - ts).abs() <= 5, "timestamp {ts} too far from {now}");
}

#[tokio::test]
async fn put_to_unknown_token_is_not_found() {
    let t = test_app(None);

    let request = Request::put("/share/raw/0123456789abcdef0123456789abcdef")
        .body(Body::from("more details"))
        .unwrap();
    let (status, body) = send(&t.app, request).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json_body(&body)["detail"], "Invalid token.");
    assert!(t.repo.calls().is_empty());
}

#[tokio::test]
async fn put_appends_to_existing_submission() {
    let t = test_app(None);
    let (_, body) = send(&t.app, post_json("/share/raw", json!({"text": "first"}))).await;
    let receipt = json_body(&body);
    let token = receipt["token"].as_str().unwrap().to_string();

    let request = Request::put(format!("/share/raw/{token}"))
        .body(Body::from("  second  "))
        .unwrap();
    let (status, body) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::OK);

    let update = json_body(&body);
    assert_eq!(update["token"], token.as_str());
    assert_eq!(update["record_id"], receipt["record_id"]);
    assert_eq!(update["modules"][0]["status"], "updated");
    assert_eq!(update["modules"][0]["external_id"], "T-1");
}

#[tokio::test]
async fn unknown_template_fails_without_token() {
    let t = test_app(None);

    let (status, body) = send(
        &t.app,
        post_json(
            "/share/objects",
            json!({"template_name": "no-such-template", "data": {"domain": "evil.example"}}),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = json_body(&body)["detail"].as_str().unwrap().to_string();
    assert!(detail.starts_with("Object creation failed."), "{detail}");
    assert!(t.store.is_empty());
    assert!(t.repo.calls().is_empty());
}

#[tokio::test]
async fn object_submission_and_template_listing() {
    let t = test_app(None);

    let (status, body) = send(&t.app, get("/object_templates")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body), json!(["domain-ip"]));

    let (status, body) = send(&t.app, get("/object_templates?template=domain-ip")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["name"], "domain-ip");

    let (status, _) = send(&t.app, get("/object_templates?template=../etc")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        post_json(
            "/share/objects",
            json!({"template_name": "domain-ip", "data": {"domain": "evil.example", "ip": ""}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let receipt = json_body(&body);
    assert!(matches!(t.repo.calls()[0], RepositoryCall::Create));

    let record_id = receipt["record_id"].as_str().unwrap().parse().unwrap();
    let stored = t.repo.event(record_id).unwrap();
    assert_eq!(stored.objects.len(), 1);
    assert_eq!(stored.objects[0].attributes.len(), 1);
}

#[tokio::test]
async fn retrieve_formats() {
    let t = test_app(None);
    let (_, body) = send(
        &t.app,
        post_json("/share/misp", json!({"Event": {"info": "Scanner at 198.51.100.7"}})),
    )
    .await;
    let token = json_body(&body)["token"].as_str().unwrap().to_string();

    let (status, body) = send(&t.app, get(&format!("/retrieve/{token}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        json_body(&body)["response"][0]["Event"]["info"],
        "Scanner at 198.51.100.7"
    );

    let (status, body) = send(&t.app, get(&format!("/retrieve?token={token}&format=csv"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().starts_with("csv export of"));

    let (status, _) = send(
        &t.app,
        post_json("/retrieve", json!({"token": token, "format": "suricata"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&t.app, get("/retrieve?format=csv")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, get(&format!("/retrieve/{token}?format=xml"))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, get("/retrieve/0123456789abcdef0123456789abcdef")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn empty_token_query_creates_new_submission() {
    let t = test_app(None);
    let (status, body) = send(
        &t.app,
        post_json("/share/misp?token=", json!({"info": "Credential stuffing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json_body(&body)["modules"][0]["status"], "created");
}

#[tokio::test]
async fn denied_requests_are_forbidden() {
    let t = test_app(Some(Arc::new(DenyAll)));

    let (status, body) = send(&t.app, post_json("/share/raw", json!({"text": "x"}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body)["detail"], "Not authorized.");
    assert!(t.repo.calls().is_empty());
}

#[tokio::test]
async fn responses_are_not_cached() {
    let t = test_app(None);
    let response = t.app.clone().oneshot(get("/share")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
    assert_eq!(response.headers()[header::PRAGMA], "no-cache");

    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    assert_eq!(
        json_body(&bytes)["formats"]["objects"],
        json!({
            "name": "Objects",
            "description": "Data encoded as MISP Objects",
            "url": "/share/objects",
            "method": "POST"
        })
    );
}

#[tokio::test]
async fn malformed_bodies_are_bad_requests() {
    let t = test_app(None);

    let request = Request::post("/share/misp").body(Body::from("{oops")).unwrap();
    let (status, _) = send(&t.app, request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, post_json("/share/raw", json!({"optional": {}}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, post_json("/share/raw", json!({"text": "   "}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
