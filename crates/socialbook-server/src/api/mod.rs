//! HTTP surface: REST under `/api`, `/health`, and the `/ws` upgrade.
//!
//! Handlers write to the store first and only then emit realtime events, so
//! a client that misses an event still finds the new state on its next
//! fetch.

mod admin;
mod auth;
mod friends;
mod groups;
mod messages;
mod notifications;
mod posts;
mod stories;
mod users;

use axum::{
    extract::DefaultBodyLimit,
    http::Method,
    routing::get,
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

pub use auth::bootstrap_owner;

use crate::error::ServerError;
use crate::realtime::gateway::ws_handler;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(Any);

    let api = Router::new()
        .merge(auth::routes())
        .merge(users::routes())
        .merge(posts::routes())
        .merge(messages::routes())
        .merge(friends::routes())
        .merge(notifications::routes())
        .merge(stories::routes())
        .merge(groups::routes())
        .merge(admin::routes());

    Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.max_body_bytes))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `{"message": ...}` acknowledgement body.
fn ack(message: &str) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "message": message }))
}

fn require_text(value: &str, what: &str) -> Result<String, ServerError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ServerError::BadRequest(format!("{what} must not be empty")));
    }
    Ok(trimmed.to_string())
}

pub async fn serve(state: AppState, addr: std::net::SocketAddr) -> anyhow::Result<()> {
    let app = build_router(state);

    info!(addr = %addr, "Starting HTTP server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use axum::http::StatusCode;

    use super::test_support::call;
    use crate::state::test_support::test_state;

    #[tokio::test]
    async fn test_health() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_api_requires_token() {
        let state = test_state();
        let (status, body) = call(&state, "GET", "/api/posts", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["error"].is_string());

        let (status, _) = call(&state, "GET", "/api/posts", Some("forged"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
