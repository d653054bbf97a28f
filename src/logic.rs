//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Opening editor sessions (scope + objective) and looking them up
//!   - Decoding base64 file payloads into uploads
//!   - Objective create/update/delete
//!   - The resource browser and one-off URL resolution

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::api::FileUpload;
use crate::domain::{ContentItem, ContentKind, ItemId, Objective, ObjectiveDraft, ObjectiveScope, ResourceFilters};
use crate::error::{ContentError, ContentResult};
use crate::protocol::{FilePayload, ResourceOut};
use crate::resolver::resolve_url;
use crate::session::{EditorSession, Notice};
use crate::state::AppState;
use crate::util::trunc_for_log;

/// Register a new session and load the objective into it. A session that fails to load
/// is dropped again.
#[instrument(level = "info", skip(state))]
pub async fn open_session(
  state: &AppState,
  scope: ObjectiveScope,
  objective_id: ItemId,
) -> ContentResult<(EditorSession, Vec<Notice>)> {
  let session = state.create_session().await;
  match session.open(scope, objective_id).await {
    Ok(notices) => {
      info!(target: "objective_content", session = %session.id, "Session opened");
      Ok((session, notices))
    }
    Err(e) => {
      state.remove_session(&session.id).await;
      Err(e)
    }
  }
}

/// `None` appends the kind's default template.
pub fn parse_item(kind: ContentKind, raw: Option<Value>) -> ContentResult<Option<ContentItem>> {
  match raw {
    None | Some(Value::Null) => Ok(None),
    Some(v) => ContentItem::from_value(kind, v)
      .map(Some)
      .map_err(|e| ContentError::InvalidField(format!("{kind} item: {e}"))),
  }
}

pub fn decode_file(payload: FilePayload) -> ContentResult<FileUpload> {
  if payload.name.trim().is_empty() {
    return Err(ContentError::Validation("File name is required".into()));
  }
  let bytes = STANDARD.decode(payload.data_base64.trim()).map_err(|e| {
    warn!(target: "content", name = %trunc_for_log(&payload.name, 80), error = %e, "Rejected file payload");
    ContentError::InvalidField(format!("file data is not valid base64: {e}"))
  })?;
  Ok(FileUpload { name: payload.name, mime_type: payload.mime_type, bytes })
}

fn validate_draft(draft: &ObjectiveDraft) -> ContentResult<()> {
  if draft.title.trim().is_empty() {
    return Err(ContentError::Validation("Objective title is required".into()));
  }
  Ok(())
}

#[instrument(level = "info", skip(state, draft), fields(title = %trunc_for_log(&draft.title, 60)))]
pub async fn create_objective(state: &AppState, module_id: Option<&str>, draft: &ObjectiveDraft) -> ContentResult<Objective> {
  let module_id = module_id
    .map(str::trim)
    .filter(|m| !m.is_empty())
    .ok_or_else(|| ContentError::Validation("moduleId is required to create an objective".into()))?;
  validate_draft(draft)?;
  let objective = state.api.create_objective(module_id, draft).await?;
  info!(target: "content", %module_id, id = ?objective.id, "Objective created");
  Ok(objective)
}

#[instrument(level = "info", skip(state, draft))]
pub async fn update_objective(state: &AppState, id: &ItemId, draft: &ObjectiveDraft) -> ContentResult<()> {
  validate_draft(draft)?;
  state.api.update_objective(id, draft).await?;
  info!(target: "content", %id, "Objective updated");
  Ok(())
}

#[instrument(level = "info", skip(state))]
pub async fn delete_objective(state: &AppState, id: &ItemId) -> ContentResult<()> {
  state.api.delete_objective(id).await?;
  info!(target: "content", %id, "Objective deleted");
  Ok(())
}

/// Library resources across programs, each with a browser-loadable URL.
#[instrument(level = "info", skip(state))]
pub async fn browse_resources(state: &AppState, filters: &ResourceFilters) -> ContentResult<Vec<ResourceOut>> {
  let base = state.cfg.proxy_base();
  let resources = state.api.all_resources(filters).await?;
  Ok(
    resources
      .into_iter()
      .map(|r| {
        let view_url = resolve_url(base, Some(&r.url), Some(&r.file_key));
        ResourceOut { resource: r, view_url }
      })
      .collect(),
  )
}

pub fn resolve(state: &AppState, url: Option<&str>, key: Option<&str>) -> String {
  resolve_url(state.cfg.proxy_base(), url, key)
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use super::*;
  use crate::api::fake::FakeLmsApi;
  use crate::config::ServiceConfig;
  use crate::domain::{Resource, ResourceType};
  use serde_json::json;

  fn state_with(api: Arc<FakeLmsApi>) -> AppState {
    AppState::with_api(ServiceConfig::default(), api)
  }

  #[tokio::test]
  async fn failed_open_does_not_leave_a_session_behind() {
    let state = state_with(Arc::new(FakeLmsApi::with_objective()));
    let res = open_session(&state, ObjectiveScope::Module("m1".into()), ItemId::from("ghost")).await;
    assert!(matches!(res, Err(ContentError::NotFound(_))));
    assert_eq!(state.session_count().await, 0);

    let (session, _) = open_session(&state, ObjectiveScope::Module("m1".into()), ItemId::from("o1")).await.unwrap();
    assert!(state.session(&session.id).await.is_ok());
  }

  #[tokio::test]
  async fn blank_objective_title_is_rejected_before_the_backend() {
    let api = Arc::new(FakeLmsApi::with_objective());
    let state = state_with(api.clone());
    let draft = ObjectiveDraft { title: "  ".into(), ..ObjectiveDraft::default() };
    assert!(matches!(create_objective(&state, Some("m1"), &draft).await, Err(ContentError::Validation(_))));
    assert!(api.calls().is_empty());

    let draft = ObjectiveDraft { title: "Recursion".into(), min_duration: 30, ..ObjectiveDraft::default() };
    let created = create_objective(&state, Some("m1"), &draft).await.unwrap();
    assert_eq!(created.title, "Recursion");
    assert!(created.id.is_some());
  }

  #[tokio::test]
  async fn browsed_resources_carry_proxy_urls() {
    let api = Arc::new(FakeLmsApi::with_objective());
    api.state.lock().unwrap().resources = vec![
      Resource { title: "Slides".into(), kind: ResourceType::Document, file_key: "docs/s.pdf".into(), ..Resource::default() },
      Resource { title: "Site".into(), kind: ResourceType::Link, url: "https://example.org".into(), ..Resource::default() },
    ];
    let state = state_with(api);
    let all = browse_resources(&state, &ResourceFilters::default()).await.unwrap();
    assert_eq!(all[0].view_url, "http://localhost:5000/api/upload/proxy/docs%2Fs.pdf");
    assert_eq!(all[1].view_url, "https://example.org");

    let links = browse_resources(&state, &ResourceFilters { kind: Some(ResourceType::Link), for_whom: None }).await.unwrap();
    assert_eq!(links.len(), 1);
  }

  #[test]
  fn bad_base64_is_an_invalid_field() {
    let payload = FilePayload { name: "a.pdf".into(), mime_type: String::new(), data_base64: "%%%".into() };
    assert!(matches!(decode_file(payload), Err(ContentError::InvalidField(_))));
    let ok = FilePayload { name: "a.pdf".into(), mime_type: String::new(), data_base64: "AAEC".into() };
    assert_eq!(decode_file(ok).unwrap().bytes, vec![0, 1, 2]);
  }

  #[test]
  fn null_item_means_default_template() {
    assert!(parse_item(ContentKind::Resources, Some(Value::Null)).unwrap().is_none());
    let parsed = parse_item(ContentKind::Resources, Some(json!({"title": "T"}))).unwrap();
    assert!(matches!(parsed, Some(ContentItem::Resource(ref r)) if r.title == "T"));
  }
}
