//! HTTP endpoint handlers for the dedicated content screen. These are thin wrappers that
//! forward to the session or core logic; errors map to JSON bodies via `ContentError`.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  http::StatusCode,
  response::IntoResponse,
  Json,
};
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::domain::{ContentKind, ItemId, ResourceFilters};
use crate::error::ContentResult;
use crate::logic;
use crate::protocol::*;
use crate::session::UploadOutcome;
use crate::state::AppState;

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, sessions: state.session_count().await })
}

#[instrument(level = "info", skip(state, body), fields(objective_id = %body.objective_id))]
pub async fn http_open_session(
  State(state): State<Arc<AppState>>,
  Json(body): Json<OpenSessionIn>,
) -> ContentResult<impl IntoResponse> {
  let scope = body.scope()?;
  let (session, notices) = logic::open_session(&state, scope, body.objective_id).await?;
  Ok((StatusCode::CREATED, Json(SessionOut { session: session.view().await, notices })))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<SessionOut>> {
  let session = state.session(&id).await?;
  Ok(Json(SessionOut { session: session.view().await, notices: Vec::new() }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_close_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<OkOut>> {
  state.session(&id).await?;
  state.remove_session(&id).await;
  info!(target: "objective_content", session = %id, "Session closed");
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_reload(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<SessionOut>> {
  let session = state.session(&id).await?;
  let notices = session.reload().await?;
  Ok(Json(SessionOut { session: session.view().await, notices }))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_append(
  State(state): State<Arc<AppState>>,
  Path((id, kind)): Path<(String, ContentKind)>,
  body: Option<Json<AppendIn>>,
) -> ContentResult<impl IntoResponse> {
  let session = state.session(&id).await?;
  let raw = body.and_then(|Json(b)| b.item);
  let item = logic::parse_item(kind, raw)?;
  let (index, key) = session.append(kind, item).await?;
  Ok((StatusCode::CREATED, Json(AppendOut { index, key })))
}

#[instrument(level = "info", skip(state, patch), fields(patch_len = patch.len()))]
pub async fn http_update(
  State(state): State<Arc<AppState>>,
  Path((id, kind, index)): Path<(String, ContentKind, usize)>,
  Json(patch): Json<Map<String, Value>>,
) -> ContentResult<Json<UpdateOut>> {
  let session = state.session(&id).await?;
  let applied = session.update_field(kind, index, &patch).await?;
  Ok(Json(UpdateOut { applied }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_remove(
  State(state): State<Arc<AppState>>,
  Path((id, kind, index)): Path<(String, ContentKind, usize)>,
) -> ContentResult<Json<RemoveOut>> {
  let session = state.session(&id).await?;
  let removed = session.remove_at(kind, index).await?.is_some();
  Ok(Json(RemoveOut { removed }))
}

#[instrument(level = "info", skip(state, body), fields(confirmed = body.confirmed))]
pub async fn http_delete_item(
  State(state): State<Arc<AppState>>,
  Path((id, kind, index)): Path<(String, ContentKind, usize)>,
  Json(body): Json<DeleteIn>,
) -> ContentResult<Json<SessionOut>> {
  let session = state.session(&id).await?;
  let notices = session.delete_item(kind, index, body.confirmed).await?;
  Ok(Json(SessionOut { session: session.view().await, notices }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_save(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<SaveOut>> {
  let session = state.session(&id).await?;
  let outcome = session.save().await?;
  info!(
    target: "content",
    session = %id,
    created = outcome.report.created,
    updated = outcome.report.updated,
    failed = outcome.report.failures.len(),
    "HTTP save finished"
  );
  Ok(Json(SaveOut { outcome, session: session.view().await }))
}

#[instrument(level = "info", skip(state, body), fields(target = ?body.target, name = %body.file.name))]
pub async fn http_upload(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<UploadIn>,
) -> ContentResult<Json<UploadOutcome>> {
  let session = state.session(&id).await?;
  let file = logic::decode_file(body.file)?;
  Ok(Json(session.upload(body.target, file).await?))
}

#[instrument(level = "info", skip(state))]
pub async fn http_focus(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<FocusIn>,
) -> ContentResult<Json<FocusOut>> {
  let session = state.session(&id).await?;
  let focus = session.focus(body.kind, body.index, body.mode).await?;
  Ok(Json(FocusOut { focus: Some(focus) }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_clear_focus(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<FocusOut>> {
  state.session(&id).await?.clear_focus().await;
  Ok(Json(FocusOut { focus: None }))
}

#[instrument(level = "info", skip(state, body), fields(module_id = ?body.module_id))]
pub async fn http_create_objective(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ObjectiveIn>,
) -> ContentResult<impl IntoResponse> {
  let objective = logic::create_objective(&state, body.module_id.as_deref(), &body.draft).await?;
  Ok((StatusCode::CREATED, Json(ObjectiveOut { objective })))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_update_objective(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<ObjectiveIn>,
) -> ContentResult<Json<OkOut>> {
  logic::update_objective(&state, &ItemId(id), &body.draft).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_delete_objective(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> ContentResult<Json<OkOut>> {
  logic::delete_objective(&state, &ItemId(id)).await?;
  Ok(Json(OkOut { ok: true }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_browse_resources(
  State(state): State<Arc<AppState>>,
  Query(filters): Query<ResourceFilters>,
) -> ContentResult<Json<ResourcesOut>> {
  let resources = logic::browse_resources(&state, &filters).await?;
  info!(target: "content", count = resources.len(), "HTTP resources served");
  Ok(Json(ResourcesOut { resources }))
}

#[instrument(level = "info", skip(state))]
pub async fn http_resolve(
  State(state): State<Arc<AppState>>,
  Query(q): Query<ResolveQuery>,
) -> impl IntoResponse {
  Json(ResolveOut { url: logic::resolve(&state, q.url.as_deref(), q.key.as_deref()) })
}
