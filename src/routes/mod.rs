//! Router assembly: HTTP endpoints, WebSocket upgrade, static files, CORS, and HTTP tracing.

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post, put},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    services::{ServeDir, ServeFile},
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use crate::config::ServiceConfig;
use crate::state::AppState;

pub mod http;
pub mod ws;

/// Largest request we accept: the biggest allowed file, base64-inflated, plus JSON overhead.
pub(crate) fn body_limit(cfg: &ServiceConfig) -> usize {
    let largest = cfg.limits.document_mb.max(cfg.limits.image_mb) as usize * 1024 * 1024;
    largest / 3 * 4 + 64 * 1024
}

/// Build the application router with:
/// - WebSocket at `/ws` (inline objectives panel)
/// - REST API under `/api/v1/...` (dedicated content screen)
/// - Static SPA from `./static` with index fallback
/// - CORS (allow any origin/method/headers)
/// - HTTP trace layer (per-request spans w/ method, path, status, latency)
pub fn build_router(state: Arc<AppState>) -> Router {
    // Static files with SPA fallback
    let static_service = ServeDir::new("./static")
        .append_index_html_on_directories(true)
        .not_found_service(ServeFile::new("./static/index.html"));

    let limit = body_limit(&state.cfg);

    Router::new()
        // WebSocket
        .route("/ws", get(ws::ws_upgrade))
        // Sessions
        .route("/api/v1/health", get(http::http_health))
        .route("/api/v1/sessions", post(http::http_open_session))
        .route(
            "/api/v1/sessions/:id",
            get(http::http_get_session).delete(http::http_close_session),
        )
        .route("/api/v1/sessions/:id/reload", post(http::http_reload))
        .route("/api/v1/sessions/:id/save", post(http::http_save))
        .route("/api/v1/sessions/:id/uploads", post(http::http_upload))
        .route(
            "/api/v1/sessions/:id/focus",
            post(http::http_focus).delete(http::http_clear_focus),
        )
        // Content items
        .route("/api/v1/sessions/:id/items/:kind", post(http::http_append))
        .route(
            "/api/v1/sessions/:id/items/:kind/:index",
            axum::routing::patch(http::http_update).delete(http::http_remove),
        )
        .route(
            "/api/v1/sessions/:id/items/:kind/:index/delete",
            post(http::http_delete_item),
        )
        // Objectives + library
        .route("/api/v1/objectives", post(http::http_create_objective))
        .route(
            "/api/v1/objectives/:id",
            put(http::http_update_objective).delete(http::http_delete_objective),
        )
        .route("/api/v1/resources", get(http::http_browse_resources))
        .route("/api/v1/resolve", get(http::http_resolve))
        // State + body limit + CORS + HTTP tracing
        .with_state(state)
        .layer(DefaultBodyLimit::max(limit))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_request(DefaultOnRequest::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        // Frontend fallback
        .fallback_service(static_service)
}
