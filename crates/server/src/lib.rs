//! Corral HTTP surface: `GET /ping` liveness and `POST /cattle` creation.
//!
//! Routing is transport only; all decisions live in `corral_api`. Responses
//! are always `{"message": ...}` with the status mapped from the handler
//! outcome.

#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::info;

use corral_api::{CreateHandler, CreateRequest, Outcome};

#[derive(Clone)]
struct AppState {
    handler: Arc<CreateHandler>,
}

/// Build the application router around a constructed handler.
pub fn router(handler: Arc<CreateHandler>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/cattle", post(create_cattle))
        .layer(TraceLayer::new_for_http())
        .with_state(AppState { handler })
}

/// Serve until ctrl-c.
pub async fn run(bind: SocketAddr, handler: Arc<CreateHandler>) -> anyhow::Result<()> {
    let app = router(handler);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %bind, "corral api server listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

async fn ping() -> impl IntoResponse {
    Json(json!({ "message": "pong" }))
}

async fn create_cattle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    // Decode errors are not surfaced: an unparsable body leaves the name
    // empty and falls into the invalid-request path.
    let request: CreateRequest = serde_json::from_slice(&body).unwrap_or_default();

    let outcome = state.handler.handle_create(auth, &request).await;
    let status = status_for(&outcome);
    (status, Json(json!({ "message": outcome.message() })))
}

fn status_for(outcome: &Outcome) -> StatusCode {
    match outcome {
        Outcome::Created { .. } => StatusCode::CREATED,
        Outcome::AlreadyExists { .. } => StatusCode::CONFLICT,
        Outcome::Unauthorized => StatusCode::UNAUTHORIZED,
        // 403 for an empty name is long-standing behavior; clients match on
        // it, so it stays.
        Outcome::InvalidRequest { .. } => StatusCode::FORBIDDEN,
        Outcome::GetFailed { .. } | Outcome::CreateFailed { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
