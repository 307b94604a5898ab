//! Demo router
//!
//! `/foo/bar` and `/whoami` sit behind [`require_auth`]; `/health` does not.

use super::middleware::require_auth;
use super::validator::ServerValidator;
use crate::error::{Error, Result};
use crate::token::AuthToken;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use bytes::Bytes;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Build the router around a validator
pub fn echo_router(validator: ServerValidator) -> Router {
    let validator = Arc::new(validator);

    // Routes above the auth layer are protected, including OPTIONS and
    // unknown paths; /health is added after it.
    Router::new()
        .route("/foo/bar", get(foo_bar).post(echo))
        .route("/whoami", get(whoami))
        .layer(middleware::from_fn_with_state(validator, require_auth))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
}

/// Serve the router on an already bound listener
pub async fn serve_listener(listener: TcpListener, validator: ServerValidator) -> Result<()> {
    axum::serve(listener, echo_router(validator))
        .await
        .map_err(|e| Error::config(format!("Server error: {e}")))
}

/// Bind `0.0.0.0:port` and serve
pub async fn serve(validator: ServerValidator, port: u16) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(scheme = %validator.scheme(), "Starting HTTP server on http://{}", addr);

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::config(format!("Failed to bind to port {port}: {e}")))?;

    serve_listener(listener, validator).await
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn foo_bar(Extension(token): Extension<AuthToken>) -> impl IntoResponse {
    format!("hello {}", token.principal())
}

/// Echo the request body verbatim
async fn echo(body: Bytes) -> Bytes {
    body
}

async fn whoami(Extension(token): Extension<AuthToken>) -> impl IntoResponse {
    Json(json!({
        "principal": token.principal(),
        "scheme": token.scheme(),
        "expires": token.expires().to_rfc3339(),
    }))
}
