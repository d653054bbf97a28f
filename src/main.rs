//! Objective Content Editor · Backend
//!
//! - Axum HTTP + WebSocket API over one shared editing session model
//! - LMS backend reached over HTTP (objectives, per-kind content, uploads, resource library)
//! - Static SPA fallback (./static/index.html)
//!
//! Important env variables:
//!   PORT                : u16 (default 3000)
//!   CONTENT_CONFIG_PATH : path to TOML config (backend URL, upload limits, folders)
//!   LMS_API_BASE_URL    : LMS backend base URL (overrides the file)
//!   LMS_PROXY_BASE_URL  : base used for `/api/upload/proxy/<key>` URLs (default: backend URL)
//!   LMS_API_TOKEN       : bearer token forwarded to the LMS backend
//!   SESSION_IDLE_SECS   : idle editor sessions are evicted after this many seconds (default 1800)
//!   LOG_LEVEL           : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT          : "pretty" (default) or "json"

mod api;
mod config;
mod domain;
mod error;
mod logic;
mod protocol;
mod resolver;
mod routes;
mod schemas;
mod session;
mod state;
mod store;
mod sync;
mod telemetry;
mod upload;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::{spawn_session_reaper, AppState};

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Shared application state (config, LMS client, session registry).
  let state = Arc::new(AppState::new()?);

  // Drop editor sessions nobody has touched for `session_idle_secs`.
  let _reaper = spawn_session_reaper(state.clone());

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state.clone());

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "objective_content", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  info!(target: "objective_content", "Server stopped");
  Ok(())
}

async fn shutdown_signal() {
  if let Err(e) = tokio::signal::ctrl_c().await {
    tracing::error!(target: "objective_content", error = %e, "Failed to listen for ctrl-c");
  }
}
