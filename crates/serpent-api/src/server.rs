//! HTTP server configuration and request routing.
//!
//! Two routers share one middleware stack. Requests flow through it in
//! order:
//! 1. Request ID generation
//! 2. Request/response logging
//! 3. Timeout enforcement
//! 4. Handler execution
//!
//! # Graceful Shutdown
//!
//! On CTRL+C or SIGTERM the listener stops accepting connections and waits
//! for in-flight requests to finish. Uploads in progress either complete or
//! leave no partial file behind.

use std::{future::Future, net::SocketAddr, time::Duration};

use axum::{
    extract::{DefaultBodyLimit, Request},
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
    Router,
};
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    handlers,
    state::{UploadState, WebhookState},
};

/// Creates the webhook service router.
///
/// Routes:
/// - `POST /webhook/stripe` - purchase events
/// - `GET /health` - ledger-backed health probe
///
/// Any other path is answered with 404.
pub fn webhook_router(state: WebhookState, timeout: Duration) -> Router {
    let body_limit = state.max_body_bytes;

    let webhook_routes = Router::new()
        .route("/webhook/stripe", post(handlers::stripe_webhook))
        .layer(DefaultBodyLimit::max(body_limit));

    Router::new()
        .route("/health", get(handlers::webhook_health))
        .merge(webhook_routes)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Creates the upload service router.
///
/// Routes:
/// - `GET /` - upload form
/// - `POST /` - multipart upload
/// - `GET /health` - health probe
///
/// Like the form's plain HTTP handler, every other path also serves the
/// form on `GET` and accepts uploads on `POST`.
pub fn upload_router(state: UploadState, timeout: Duration) -> Router {
    Router::new()
        .route("/", get(handlers::upload_form).post(handlers::upload_file))
        .route("/health", get(handlers::upload_health))
        .fallback(handlers::upload_fallback)
        .layer(TimeoutLayer::new(timeout))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(inject_request_id))
        .with_state(state)
}

/// Middleware to inject request ID into all responses.
///
/// Adds X-Request-Id header for tracing requests across services.
async fn inject_request_id(req: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let mut req = req;
    req.extensions_mut().insert(request_id.clone());

    let mut response = next.run(req).await;

    if let Ok(header_value) = request_id.parse() {
        response.headers_mut().insert("X-Request-Id", header_value);
    }

    response
}

/// Serves `app` on `addr` until [`shutdown_signal`] resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if the port is already in use or the network
/// interface is unavailable.
pub async fn start_server(app: Router, addr: SocketAddr, name: &str) -> Result<(), std::io::Error> {
    serve_until(app, addr, name, shutdown_signal()).await
}

/// Serves `app` on `addr` until `shutdown` resolves.
///
/// # Errors
///
/// Returns `std::io::Error` if binding or accepting fails.
pub async fn serve_until<F>(
    app: Router,
    addr: SocketAddr,
    name: &str,
    shutdown: F,
) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(service = name, "Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    info!(service = name, "HTTP server listening on {}", actual_addr);

    axum::serve(listener, app).with_graceful_shutdown(shutdown).await?;

    info!(service = name, "HTTP server stopped gracefully");
    Ok(())
}

/// Waits for shutdown signal (CTRL+C or SIGTERM).
///
/// Enables graceful shutdown on:
/// - CTRL+C (SIGINT) - Development
/// - SIGTERM - Docker and systemd
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received CTRL+C, starting graceful shutdown");
        },
        () = terminate => {
            info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    warn!("Waiting for in-flight requests to complete");
}
