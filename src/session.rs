//! Editor session: the one content-editing model both UI surfaces bind to.
//!
//! A session owns the open objective, its content store, upload bookkeeping and the single
//! focused item. Network calls never run under the session lock: state is read or marked
//! under the lock, the lock is released for the call, and results are applied after
//! re-locking. Interleaved callbacks are therefore possible and are reconciled by the full
//! reload that follows every save and delete.
//!
//! Phases: `Idle -> Loading -> Ready -> Saving -> Ready`, with `Error` when the objective
//! itself cannot be loaded.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{error, info, instrument, warn};

use crate::api::{FileUpload, LmsApi};
use crate::config::ServiceConfig;
use crate::domain::{ContentItem, ContentKind, ItemId, Objective, ObjectiveScope};
use crate::error::{ContentError, ContentResult};
use crate::resolver::resolve_url;
use crate::schemas::storage_keys;
use crate::store::{ContentCounts, ContentStore, LocalKey};
use crate::sync::{self, Collections, LoadedContent, SaveReport};
use crate::upload::{apply_upload, check_target, UploadCoordinator, UploadSlot};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Loading,
    Ready,
    Saving,
    Error,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum NoticeLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// Transient message for the UI (a toast). Never persisted in session state.
#[derive(Clone, Debug, Serialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    fn new(level: NoticeLevel, message: impl Into<String>) -> Self {
        Notice { level, message: message.into() }
    }
}

/// The one item the UI is looking at or editing. Opening another replaces it.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum Focus {
    #[serde(rename_all = "camelCase")]
    Viewing { kind: ContentKind, key: LocalKey, view_url: String },
    #[serde(rename_all = "camelCase")]
    Editing { kind: ContentKind, key: LocalKey },
}

impl Focus {
    fn key(&self) -> LocalKey {
        match self {
            Focus::Viewing { key, .. } | Focus::Editing { key, .. } => *key,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FocusMode {
    View,
    Edit,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryView {
    pub index: usize,
    pub key: LocalKey,
    /// Browser-loadable URL of the item's main file or image, if it has one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_url: Option<String>,
    pub item: ContentItem,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct KindView {
    pub kind: ContentKind,
    pub entries: Vec<EntryView>,
    /// "No <kind> found" when the collection is empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub empty_message: Option<String>,
}

/// Everything a surface needs to render the session.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    pub id: String,
    pub phase: SessionPhase,
    pub objective: Option<Objective>,
    pub counts: ContentCounts,
    pub content: Vec<KindView>,
    pub busy_uploads: Vec<String>,
    pub focus: Option<Focus>,
    pub last_error: Option<String>,
}

/// Per-kind counts plus the empty-state line for every kind with nothing in it.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentSummary {
    pub counts: ContentCounts,
    pub empty: Vec<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveOutcome {
    pub report: SaveReport,
    pub notices: Vec<Notice>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadOutcome {
    pub slot: String,
    /// False when the response was superseded or its item is gone.
    pub applied: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub item: Option<ContentItem>,
}

struct EditorState {
    phase: SessionPhase,
    scope: Option<ObjectiveScope>,
    objective_id: Option<ItemId>,
    objective: Option<Objective>,
    store: ContentStore,
    uploads: UploadCoordinator,
    focus: Option<Focus>,
    last_error: Option<String>,
}

impl EditorState {
    fn ensure_editable(&self) -> ContentResult<()> {
        match self.phase {
            SessionPhase::Ready | SessionPhase::Saving => Ok(()),
            SessionPhase::Loading => Err(ContentError::Precondition("Content is still loading".into())),
            SessionPhase::Idle | SessionPhase::Error => {
                Err(ContentError::Precondition("No objective is open in this session".into()))
            }
        }
    }

    /// Replace everything with freshly loaded state. Held indices and keys die here.
    fn install(&mut self, objective: Objective, content: LoadedContent) -> Vec<Notice> {
        self.objective = Some(objective);
        content.collections.apply_to(&mut self.store);
        self.uploads.reset();
        self.focus = None;
        self.last_error = None;
        self.phase = SessionPhase::Ready;
        content
            .failed
            .iter()
            .map(|k| Notice::new(NoticeLevel::Warning, format!("Could not load {}", k.label())))
            .collect()
    }
}

#[derive(Clone)]
pub struct EditorSession {
    pub id: String,
    api: Arc<dyn LmsApi>,
    cfg: Arc<ServiceConfig>,
    state: Arc<Mutex<EditorState>>,
}

impl EditorSession {
    pub fn new(id: String, api: Arc<dyn LmsApi>, cfg: Arc<ServiceConfig>) -> Self {
        let uploads = UploadCoordinator::new(cfg.limits.clone());
        let state = EditorState {
            phase: SessionPhase::Idle,
            scope: None,
            objective_id: None,
            objective: None,
            store: ContentStore::new(),
            uploads,
            focus: None,
            last_error: None,
        };
        Self { id, api, cfg, state: Arc::new(Mutex::new(state)) }
    }

    pub async fn phase(&self) -> SessionPhase {
        self.state.lock().await.phase
    }

    /// Open an objective: load it and its four collections.
    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    pub async fn open(&self, scope: ObjectiveScope, objective_id: ItemId) -> ContentResult<Vec<Notice>> {
        {
            let mut st = self.state.lock().await;
            st.scope = Some(scope);
            st.objective_id = Some(objective_id);
            st.objective = None;
            st.store.clear();
            st.uploads.reset();
            st.focus = None;
        }
        self.reload().await
    }

    /// Re-fetch the open objective and replace local state wholesale.
    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    pub async fn reload(&self) -> ContentResult<Vec<Notice>> {
        let (scope, objective_id) = {
            let mut st = self.state.lock().await;
            let (Some(scope), Some(id)) = (st.scope.clone(), st.objective_id.clone()) else {
                return Err(ContentError::Precondition("No objective is open in this session".into()));
            };
            st.phase = SessionPhase::Loading;
            (scope, id)
        };

        let fetched = self.fetch(&scope, &objective_id).await;

        let mut st = self.state.lock().await;
        match fetched {
            Ok((objective, content)) => {
                let notices = st.install(objective, content);
                info!(target: "content", session = %self.id, counts = ?st.store.counts(), "Objective content loaded");
                Ok(notices)
            }
            Err(e) => {
                error!(target: "content", session = %self.id, error = %e, "Loading objective failed");
                st.phase = SessionPhase::Error;
                st.last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    async fn fetch(&self, scope: &ObjectiveScope, objective_id: &ItemId) -> ContentResult<(Objective, LoadedContent)> {
        let objective = sync::load_objective(self.api.as_ref(), scope, objective_id).await?;
        let content = sync::load_content(self.api.as_ref(), objective_id).await;
        Ok((objective, content))
    }

    /// Reload after a save or delete. Failure is reported but the session stays usable.
    async fn resync(&self, notices: &mut Vec<Notice>) {
        match self.reload().await {
            Ok(mut more) => notices.append(&mut more),
            Err(e) => {
                let mut st = self.state.lock().await;
                st.phase = SessionPhase::Ready;
                notices.push(Notice::new(NoticeLevel::Error, format!("Reload failed: {e}")));
            }
        }
    }

    /// Push all local content to the backend, then reload.
    ///
    /// Only allowed from `Ready`. Validation and precondition failures send nothing and
    /// return to `Ready`; partial failures come back as a warning notice.
    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    pub async fn save(&self) -> ContentResult<SaveOutcome> {
        let (objective_id, snapshot) = {
            let mut st = self.state.lock().await;
            match st.phase {
                SessionPhase::Ready => {}
                SessionPhase::Saving => return Err(ContentError::Precondition("A save is already in progress".into())),
                _ => st.ensure_editable()?,
            }
            st.phase = SessionPhase::Saving;
            let saved_id = st.objective.as_ref().and_then(|o| o.id.clone());
            (saved_id, Collections::from_store(&st.store))
        };

        let result = sync::save_objective_content(self.api.as_ref(), objective_id.as_ref(), &snapshot).await;
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                self.state.lock().await.phase = SessionPhase::Ready;
                return Err(e);
            }
        };

        let mut notices = Vec::new();
        if report.has_failures() {
            let total = report.created + report.updated + report.failures.len();
            notices.push(Notice::new(
                NoticeLevel::Warning,
                format!("Some content failed to save ({} of {total})", report.failures.len()),
            ));
        } else if report.created + report.updated == 0 {
            notices.push(Notice::new(NoticeLevel::Info, "Nothing to save"));
        } else {
            notices.push(Notice::new(NoticeLevel::Success, "Content saved"));
        }
        self.resync(&mut notices).await;
        Ok(SaveOutcome { report, notices })
    }

    /// Delete one saved item on the backend. Needs explicit confirmation from the user.
    #[instrument(level = "info", skip(self), fields(session = %self.id))]
    pub async fn delete_item(&self, kind: ContentKind, index: usize, confirmed: bool) -> ContentResult<Vec<Notice>> {
        if !confirmed {
            return Err(ContentError::Precondition("Deletion must be confirmed".into()));
        }
        let (key, id) = {
            let st = self.state.lock().await;
            st.ensure_editable()?;
            let key = st
                .store
                .key_at(kind, index)
                .ok_or_else(|| ContentError::NotFound(format!("{} #{}", kind.label(), index + 1)))?;
            (key, st.store.get(kind, index).and_then(|i| i.id().cloned()))
        };

        let mut notices = Vec::new();
        match sync::delete_item(self.api.as_ref(), kind, id.as_ref()).await {
            Ok(()) => {
                {
                    let mut st = self.state.lock().await;
                    if let Some(i) = st.store.index_of(kind, key) {
                        self.remove_locked(&mut st, kind, i);
                    }
                }
                notices.push(Notice::new(NoticeLevel::Success, "Item deleted"));
                self.resync(&mut notices).await;
                Ok(notices)
            }
            Err(e @ ContentError::Precondition(_)) => Err(e),
            Err(e) => {
                self.resync(&mut notices).await;
                Err(e)
            }
        }
    }

    pub async fn append(&self, kind: ContentKind, item: Option<ContentItem>) -> ContentResult<(usize, LocalKey)> {
        let mut st = self.state.lock().await;
        st.ensure_editable()?;
        let key = st.store.append(kind, item)?;
        Ok((st.store.counts().get(kind) - 1, key))
    }

    pub async fn update_field(&self, kind: ContentKind, index: usize, patch: &Map<String, Value>) -> ContentResult<bool> {
        let mut st = self.state.lock().await;
        st.ensure_editable()?;
        st.store.update_field(kind, index, patch)
    }

    /// Local removal. Files the item referenced are deleted in the background; failures
    /// there are logged only.
    pub async fn remove_at(&self, kind: ContentKind, index: usize) -> ContentResult<Option<ContentItem>> {
        let mut st = self.state.lock().await;
        st.ensure_editable()?;
        Ok(self.remove_locked(&mut st, kind, index))
    }

    fn remove_locked(&self, st: &mut EditorState, kind: ContentKind, index: usize) -> Option<ContentItem> {
        let key = st.store.key_at(kind, index)?;
        let removed = st.store.remove_at(kind, index)?;
        if st.focus.as_ref().is_some_and(|f| f.key() == key) {
            st.focus = None;
        }
        self.discard_files(storage_keys(&removed));
        Some(removed)
    }

    fn discard_files(&self, keys: Vec<String>) {
        if keys.is_empty() {
            return;
        }
        let api = self.api.clone();
        let session = self.id.clone();
        tokio::spawn(async move {
            for key in keys {
                if let Err(e) = api.delete_file(&key).await {
                    warn!(target: "content", %session, %key, error = %e, "Best-effort file delete failed");
                }
            }
        });
    }

    /// Upload a file into an item's slot and merge the returned metadata.
    ///
    /// The size limit is checked before any network call. The item is pinned by its local
    /// key, so edits and removals elsewhere in the collection during the upload are safe.
    #[instrument(level = "info", skip(self, file), fields(session = %self.id, name = %file.name, size = file.size()))]
    pub async fn upload(&self, slot: UploadSlot, file: FileUpload) -> ContentResult<UploadOutcome> {
        let (ticket, folder) = {
            let mut st = self.state.lock().await;
            st.ensure_editable()?;
            let key = st
                .store
                .key_at(slot.kind(), slot.index())
                .ok_or_else(|| ContentError::NotFound(format!("{} #{}", slot.kind().label(), slot.index() + 1)))?;
            let target = slot.bind(key);
            if let Some(item) = st.store.get(slot.kind(), slot.index()) {
                check_target(item, &target)?;
            }
            let ticket = st.uploads.begin(target, file.size())?;
            (ticket, target.folder(&self.cfg.folders).to_string())
        };

        let result = self.api.upload_file(file, &folder).await;

        let mut st = self.state.lock().await;
        let current = st.uploads.finish(&ticket);
        let target = ticket.target;
        let uploaded = result?;
        let slot_name = target.to_string();

        if !current {
            self.discard_files(vec![uploaded.key]);
            return Ok(UploadOutcome { slot: slot_name, applied: false, index: None, item: None });
        }
        let Some(index) = st.store.index_of(target.kind(), target.item()) else {
            warn!(target: "content", slot = %slot_name, "Upload finished for a removed item");
            self.discard_files(vec![uploaded.key]);
            return Ok(UploadOutcome { slot: slot_name, applied: false, index: None, item: None });
        };
        let Some(item) = st.store.get_mut_by_key(target.kind(), target.item()) else {
            return Ok(UploadOutcome { slot: slot_name, applied: false, index: None, item: None });
        };
        if let Err(e) = apply_upload(item, &target, &uploaded) {
            warn!(target: "content", slot = %slot_name, error = %e, "Upload could not be merged; discarding stored file");
            self.discard_files(vec![uploaded.key]);
            return Err(e);
        }
        info!(target: "content", slot = %slot_name, key = %uploaded.key, "Upload merged");
        Ok(UploadOutcome { slot: slot_name, applied: true, index: Some(index), item: Some(item.clone()) })
    }

    /// Focus one item for viewing or editing, replacing any previous focus.
    pub async fn focus(&self, kind: ContentKind, index: usize, mode: FocusMode) -> ContentResult<Focus> {
        let mut st = self.state.lock().await;
        st.ensure_editable()?;
        let key = st
            .store
            .key_at(kind, index)
            .ok_or_else(|| ContentError::NotFound(format!("{} #{}", kind.label(), index + 1)))?;
        let focus = match mode {
            FocusMode::Edit => Focus::Editing { kind, key },
            FocusMode::View => {
                let item = st.store.get(kind, index).cloned();
                let view_url = item.as_ref().and_then(|i| self.view_url(i)).unwrap_or_default();
                Focus::Viewing { kind, key, view_url }
            }
        };
        st.focus = Some(focus.clone());
        Ok(focus)
    }

    pub async fn clear_focus(&self) {
        self.state.lock().await.focus = None;
    }

    fn view_url(&self, item: &ContentItem) -> Option<String> {
        let base = self.cfg.proxy_base();
        let url = match item {
            ContentItem::Resource(r) => resolve_url(base, Some(&r.url), Some(&r.file_key)),
            ContentItem::Mcq(q) => resolve_url(base, Some(&q.question_image_url), Some(&q.question_image_key)),
            _ => return None,
        };
        (!url.is_empty()).then_some(url)
    }

    pub async fn summary(&self) -> ContentSummary {
        let st = self.state.lock().await;
        let counts = st.store.counts();
        let empty = ContentKind::ALL
            .iter()
            .filter(|k| counts.get(**k) == 0)
            .map(|k| format!("No {} found", k.label()))
            .collect();
        ContentSummary { counts, empty }
    }

    pub async fn view(&self) -> SessionView {
        let st = self.state.lock().await;
        let content = ContentKind::ALL
            .iter()
            .map(|&kind| {
                let entries: Vec<EntryView> = st
                    .store
                    .entries(kind)
                    .iter()
                    .enumerate()
                    .map(|(index, e)| EntryView { index, key: e.key, view_url: self.view_url(&e.item), item: e.item.clone() })
                    .collect();
                let empty_message = entries.is_empty().then(|| format!("No {} found", kind.label()));
                KindView { kind, entries, empty_message }
            })
            .collect();
        SessionView {
            id: self.id.clone(),
            phase: st.phase,
            objective: st.objective.clone(),
            counts: st.store.counts(),
            content,
            busy_uploads: st.uploads.busy_slots(),
            focus: st.focus.clone(),
            last_error: st.last_error.clone(),
        }
    }
}
