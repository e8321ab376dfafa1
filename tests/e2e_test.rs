//! End-to-end storefront workflow.
//!
//! Wires the services from one `Config` the way the binary does: the catalog
//! is synced from a mocked provider, a product photo is uploaded, and a
//! signed purchase of a catalog product lands in the ledger.

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use axum::{
    body::Body,
    http::{header::CONTENT_TYPE, Request, StatusCode},
};
use serde_json::{json, Value};
use serpent_api::{upload_router, webhook_router, Config, UploadState, WebhookState};
use serpent_sync::{sync_catalog, CatalogClient};
use serpent_testing::{
    sign_payload, CheckoutEventBuilder, Clock, MockServer, MultipartBuilder, TestEnv,
};
use tower::ServiceExt;

const WEBHOOK_SECRET: &str = "whsec_e2e_secret";

fn config_for(env: &TestEnv, provider: &MockServer) -> Config {
    Config {
        ledger_path: env.ledger_path(),
        upload_dir: env.upload_dir(),
        catalog_path: env.root().join("data").join("products.json"),
        stripe_webhook_secret: Some(WEBHOOK_SECRET.into()),
        stripe_secret_key: Some("sk_test_e2e".into()),
        stripe_api_base: provider.url(),
        ..Config::default()
    }
}

#[tokio::test]
async fn catalog_upload_and_purchase_workflow() -> Result<()> {
    let env = TestEnv::new()?;
    let provider = MockServer::start().await;
    provider
        .mock_get_json(
            "/v1/products",
            json!({
                "data": [{
                    "id": "prod_snake_1",
                    "name": "Corn Snake Hatchling",
                    "active": true,
                    "metadata": { "morph": "amel" }
                }],
                "has_more": false
            }),
        )
        .await;
    provider
        .mock_get_json("/v1/prices", json!({ "data": [{ "id": "price_1", "unit_amount": 15000 }] }))
        .await;
    let config = config_for(&env, &provider);
    let clock: Arc<dyn Clock> = Arc::new(env.clock.clone());

    // Catalog
    let client = CatalogClient::new(config.provider_config()?)?;
    let items = sync_catalog(&client, &config.catalog_path).await?;
    assert_eq!(items.len(), 1);
    let catalog: Value = serde_json::from_str(&std::fs::read_to_string(&config.catalog_path)?)?;
    assert_eq!(catalog[0]["id"], "prod_snake_1");
    assert_eq!(catalog[0]["species"], "corn_snake");
    assert_eq!(catalog[0]["price"], 150.0);

    // Photo upload
    let uploads = upload_router(UploadState::from_config(&config, clock.clone()), config.request_timeout());
    let photo = vec![0xFFu8, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    let form = MultipartBuilder::new("----X").file("prod_snake_1.jpg", photo.clone());
    let response = uploads
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/")
                .header(CONTENT_TYPE, form.content_type())
                .body(Body::from(form.build()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.uploaded("prod_snake_1.jpg")?, photo);

    // Signed purchase
    let webhooks = webhook_router(WebhookState::from_config(&config, clock)?, config.request_timeout());
    let event = CheckoutEventBuilder::new().product(Some("prod_snake_1")).to_bytes();
    let signature = sign_payload(&event, WEBHOOK_SECRET, env.clock.unix_seconds());
    let response = webhooks
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/stripe")
                .header("Stripe-Signature", signature.clone())
                .body(Body::from(event.clone()))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let ledger = env.ledger_entries()?;
    assert_eq!(ledger.len(), 1);
    assert_eq!(ledger[0]["product_id"], catalog[0]["id"]);
    assert_eq!(ledger[0]["price_paid"], catalog[0]["price"]);

    // The provider retries the same delivery later; it is still accepted once.
    env.clock.advance(Duration::from_secs(60));
    let response = webhooks
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/stripe")
                .header("Stripe-Signature", signature)
                .body(Body::from(event))?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.ledger_entries()?.len(), 1);

    Ok(())
}

#[tokio::test]
async fn webhook_without_configured_secret_accepts_unsigned_events() -> Result<()> {
    let env = TestEnv::new()?;
    let config = Config {
        ledger_path: env.ledger_path(),
        ..Config::default()
    };

    let app = webhook_router(
        WebhookState::from_config(&config, Arc::new(env.clock.clone()))?,
        config.request_timeout(),
    );
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/stripe")
                .body(Body::from(CheckoutEventBuilder::new().to_bytes()))?,
        )
        .await?;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(env.ledger_entries()?.len(), 1);
    Ok(())
}
