//! Public protocol structs for WebSocket and HTTP endpoints (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::{ContentKind, ItemId, ObjectiveDraft, Objective, Resource, ResourceFilters, ObjectiveScope};
use crate::error::{ContentError, ContentResult, ErrorBody};
use crate::session::{ContentSummary, Focus, FocusMode, Notice, SaveOutcome, SessionView, UploadOutcome};
use crate::store::LocalKey;
use crate::upload::UploadSlot;

/// Messages the client can send over WebSocket.
///
/// A connection works on one session at a time: `open` starts a new one, `attach` joins a
/// session already open on the dedicated screen.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientWsMessage {
    Ping,
    #[serde(rename_all = "camelCase")]
    Open {
        #[serde(flatten)]
        target: OpenSessionIn,
    },
    #[serde(rename_all = "camelCase")]
    Attach {
        session_id: String,
    },
    Close,
    Reload,
    View,
    Summary,
    Append {
        kind: ContentKind,
        #[serde(default)]
        item: Option<Value>,
    },
    Update {
        kind: ContentKind,
        index: usize,
        patch: Map<String, Value>,
    },
    Remove {
        kind: ContentKind,
        index: usize,
    },
    Delete {
        kind: ContentKind,
        index: usize,
        #[serde(default)]
        confirmed: bool,
    },
    Save,
    Upload {
        target: UploadSlot,
        file: FilePayload,
    },
    Focus {
        kind: ContentKind,
        index: usize,
        mode: FocusMode,
    },
    ClearFocus,
    BrowseResources {
        #[serde(default)]
        filters: ResourceFilters,
    },
    #[serde(rename_all = "camelCase")]
    Resolve {
        url: Option<String>,
        key: Option<String>,
    },
}

/// Messages the server sends back over WebSocket.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerWsMessage {
    Pong,
    Session {
        session: SessionView,
        notices: Vec<Notice>,
    },
    Summary {
        summary: ContentSummary,
    },
    Appended {
        kind: ContentKind,
        index: usize,
        key: LocalKey,
    },
    Updated {
        kind: ContentKind,
        index: usize,
        applied: bool,
    },
    Removed {
        kind: ContentKind,
        index: usize,
        removed: bool,
    },
    Saved {
        outcome: SaveOutcome,
        session: SessionView,
    },
    Uploaded {
        outcome: UploadOutcome,
    },
    Focused {
        focus: Option<Focus>,
    },
    Resources {
        resources: Vec<ResourceOut>,
    },
    Resolved {
        url: String,
    },
    Closed,
    Error {
        error: ErrorBody,
    },
}

impl ServerWsMessage {
    pub fn error(e: &ContentError) -> Self {
        ServerWsMessage::Error { error: ErrorBody::from(e) }
    }
}

//
// HTTP request/response DTOs
//

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
    pub sessions: usize,
}

/// Which objective to open. Exactly one of `moduleId` / `subModuleId` must be given.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenSessionIn {
    pub objective_id: ItemId,
    pub module_id: Option<String>,
    pub sub_module_id: Option<String>,
}

impl OpenSessionIn {
    pub fn scope(&self) -> ContentResult<ObjectiveScope> {
        let blank = |s: &Option<String>| s.as_deref().map_or(true, |v| v.trim().is_empty());
        match (&self.module_id, &self.sub_module_id) {
            (Some(m), _) if blank(&self.sub_module_id) && !m.trim().is_empty() => Ok(ObjectiveScope::Module(m.clone())),
            (_, Some(s)) if blank(&self.module_id) && !s.trim().is_empty() => Ok(ObjectiveScope::SubModule(s.clone())),
            _ => Err(ContentError::Validation("Exactly one of moduleId or subModuleId is required".into())),
        }
    }
}

#[derive(Serialize)]
pub struct SessionOut {
    pub session: SessionView,
    pub notices: Vec<Notice>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AppendIn {
    #[serde(default)]
    pub item: Option<Value>,
}

#[derive(Serialize)]
pub struct AppendOut {
    pub index: usize,
    pub key: LocalKey,
}

#[derive(Serialize)]
pub struct UpdateOut {
    pub applied: bool,
}

#[derive(Serialize)]
pub struct RemoveOut {
    pub removed: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct DeleteIn {
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Serialize)]
pub struct SaveOut {
    #[serde(flatten)]
    pub outcome: SaveOutcome,
    pub session: SessionView,
}

/// File content travels base64-encoded inside JSON (HTTP body or WS frame).
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilePayload {
    pub name: String,
    #[serde(default)]
    pub mime_type: String,
    pub data_base64: String,
}

impl std::fmt::Debug for FilePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FilePayload")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("data_base64_len", &self.data_base64.len())
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct UploadIn {
    pub target: UploadSlot,
    pub file: FilePayload,
}

#[derive(Debug, Deserialize)]
pub struct FocusIn {
    pub kind: ContentKind,
    pub index: usize,
    pub mode: FocusMode,
}

#[derive(Serialize)]
pub struct FocusOut {
    pub focus: Option<Focus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectiveIn {
    /// Only used on create.
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(flatten)]
    pub draft: ObjectiveDraft,
}

#[derive(Serialize)]
pub struct ObjectiveOut {
    pub objective: Objective,
}

/// A library resource with the URL a browser can load it from.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceOut {
    #[serde(flatten)]
    pub resource: Resource,
    pub view_url: String,
}

#[derive(Serialize)]
pub struct ResourcesOut {
    pub resources: Vec<ResourceOut>,
}

#[derive(Debug, Deserialize)]
pub struct ResolveQuery {
    pub url: Option<String>,
    pub key: Option<String>,
}

#[derive(Serialize)]
pub struct ResolveOut {
    pub url: String,
}

#[derive(Serialize)]
pub struct OkOut {
    pub ok: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn open_needs_exactly_one_scope() {
        let both: OpenSessionIn =
            serde_json::from_value(json!({"objectiveId": "o1", "moduleId": "m1", "subModuleId": "s1"})).unwrap();
        assert!(both.scope().is_err());
        let sub: OpenSessionIn = serde_json::from_value(json!({"objectiveId": 7, "subModuleId": "s1"})).unwrap();
        assert_eq!(sub.scope().unwrap(), ObjectiveScope::SubModule("s1".into()));
        assert_eq!(sub.objective_id, ItemId::from("7"));
    }

    #[test]
    fn ws_upload_message_parses_slot_and_payload() {
        let msg: ClientWsMessage = serde_json::from_value(json!({
            "type": "upload",
            "target": {"slot": "mcqOptionImage", "index": 2, "option": 1},
            "file": {"name": "a.png", "mimeType": "image/png", "dataBase64": "AAEC"}
        }))
        .unwrap();
        let ClientWsMessage::Upload { target, file } = msg else { panic!("wrong variant") };
        assert_eq!(target, UploadSlot::McqOptionImage { index: 2, option: 1 });
        assert_eq!(file.data_base64, "AAEC");
    }

    #[test]
    fn ws_open_accepts_flat_target() {
        let msg: ClientWsMessage =
            serde_json::from_value(json!({"type": "open", "objectiveId": "o1", "moduleId": "m1"})).unwrap();
        let ClientWsMessage::Open { target } = msg else { panic!("wrong variant") };
        assert_eq!(target.scope().unwrap(), ObjectiveScope::Module("m1".into()));
    }
}
