//! Health endpoint tests for both services.

use std::{sync::Arc, time::Duration};

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::Value;
use serpent_api::{upload_router, webhook_router, UploadState, WebhookState};
use serpent_core::{DuplicatePolicy, LedgerStore};
use serpent_testing::{CheckoutEventBuilder, TestEnv};
use tower::ServiceExt;

fn health() -> Request<Body> {
    Request::builder().uri("/health").body(Body::empty()).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn webhook_health_reports_ledger_size() {
    let env = TestEnv::new().expect("test env");
    let ledger = LedgerStore::new(env.ledger_path(), DuplicatePolicy::Skip);
    let app = webhook_router(
        WebhookState::new(ledger, Arc::new(env.clock.clone())),
        Duration::from_secs(30),
    );

    let before = json(app.clone().oneshot(health()).await.unwrap()).await;
    assert_eq!(before["status"], "healthy");
    assert_eq!(before["service"], "serpent-webhook");
    assert_eq!(before["ledger_records"], 0);

    let request = Request::builder()
        .method("POST")
        .uri("/webhook/stripe")
        .body(Body::from(CheckoutEventBuilder::new().to_bytes()))
        .unwrap();
    assert_eq!(app.clone().oneshot(request).await.unwrap().status(), StatusCode::OK);

    let after = json(app.oneshot(health()).await.unwrap()).await;
    assert_eq!(after["ledger_records"], 1);
}

#[tokio::test]
async fn corrupt_ledger_reads_as_empty() {
    let env = TestEnv::new().expect("test env");
    std::fs::create_dir_all(env.ledger_path().parent().unwrap()).unwrap();
    std::fs::write(env.ledger_path(), "not json at all").unwrap();
    let ledger = LedgerStore::new(env.ledger_path(), DuplicatePolicy::Skip);
    let app = webhook_router(
        WebhookState::new(ledger, Arc::new(env.clock.clone())),
        Duration::from_secs(30),
    );

    let response = app.oneshot(health()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await["ledger_records"], 0);
}

#[tokio::test]
async fn health_timestamp_follows_clock() {
    let env = TestEnv::new().expect("test env");
    env.clock.jump_to(std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
    let app = upload_router(
        UploadState::new(env.upload_dir(), Arc::new(env.clock.clone())),
        Duration::from_secs(30),
    );

    let response = app.oneshot(health()).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["service"], "serpent-upload");
    assert!(body["timestamp"].as_str().unwrap().starts_with("2023-11-14T22:13:20"));
    assert!(body.get("ledger_records").is_none());
}
