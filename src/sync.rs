//! Reconciliation with the backend: loading an objective's content and pushing local edits.
//!
//! Saves are never merged back optimistically. After a save or delete the session reloads
//! everything from the backend and replaces its collections wholesale, so server-assigned
//! ids and defaults always come from the server.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{error, info, instrument, warn};

use crate::api::LmsApi;
use crate::domain::{ContentItem, ContentKind, ItemId, Objective, ObjectiveScope};
use crate::error::{ContentError, ContentResult};
use crate::schemas::{normalize_for_save, validate_for_save};
use crate::store::ContentStore;

/// Snapshot of the four collections, detached from the store.
#[derive(Clone, Debug, Default)]
pub struct Collections(HashMap<ContentKind, Vec<ContentItem>>);

impl Collections {
    pub fn from_store(store: &ContentStore) -> Self {
        Collections(ContentKind::ALL.iter().map(|k| (*k, store.items(*k))).collect())
    }

    pub fn get(&self, kind: ContentKind) -> &[ContentItem] {
        self.0.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn set(&mut self, kind: ContentKind, items: Vec<ContentItem>) {
        self.0.insert(kind, items);
    }

    pub fn apply_to(self, store: &mut ContentStore) {
        let mut map = self.0;
        for kind in ContentKind::ALL {
            store.replace_all(kind, map.remove(&kind).unwrap_or_default());
        }
    }
}

#[derive(Debug, Default)]
pub struct LoadedContent {
    pub collections: Collections,
    /// Kinds whose list call failed; they load as empty.
    pub failed: Vec<ContentKind>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailure {
    pub kind: ContentKind,
    pub index: usize,
    pub message: String,
}

#[derive(Clone, Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveReport {
    pub created: usize,
    pub updated: usize,
    pub failures: Vec<ItemFailure>,
}

impl SaveReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// The backend has no single-objective read here; list the scope and pick by id.
#[instrument(level = "info", skip_all, fields(%objective_id))]
pub async fn load_objective(api: &dyn LmsApi, scope: &ObjectiveScope, objective_id: &ItemId) -> ContentResult<Objective> {
    let objectives = api.list_objectives(scope).await?;
    objectives
        .into_iter()
        .find(|o| o.id.as_ref() == Some(objective_id))
        .ok_or_else(|| ContentError::NotFound(format!("Objective {objective_id}")))
}

/// Fetch all four kinds concurrently. A failing kind degrades to empty instead of failing
/// the whole load.
#[instrument(level = "info", skip_all, fields(%objective_id))]
pub async fn load_content(api: &dyn LmsApi, objective_id: &ItemId) -> LoadedContent {
    let (resources, assignments, practice, mcq) = tokio::join!(
        api.list_content(ContentKind::Resources, objective_id),
        api.list_content(ContentKind::Assignments, objective_id),
        api.list_content(ContentKind::PracticeCodes, objective_id),
        api.list_content(ContentKind::McqQuestions, objective_id),
    );

    let mut out = LoadedContent::default();
    let results = [
        (ContentKind::Resources, resources),
        (ContentKind::Assignments, assignments),
        (ContentKind::PracticeCodes, practice),
        (ContentKind::McqQuestions, mcq),
    ];
    for (kind, result) in results {
        match result {
            Ok(items) => out.collections.set(kind, items),
            Err(e) => {
                warn!(target: "content", %kind, %objective_id, error = %e, "Content list failed; showing none");
                out.failed.push(kind);
                out.collections.set(kind, Vec::new());
            }
        }
    }
    out
}

/// Push every item of every kind: update when it has a server id, create otherwise.
///
/// All items are validated first and nothing is sent if any is invalid. Individual call
/// failures are recorded and the rest of the batch still runs.
#[instrument(level = "info", skip_all, fields(objective_id = ?objective_id.map(|i| i.0.as_str())))]
pub async fn save_objective_content(
    api: &dyn LmsApi,
    objective_id: Option<&ItemId>,
    collections: &Collections,
) -> ContentResult<SaveReport> {
    let Some(objective_id) = objective_id else {
        return Err(ContentError::Precondition("Save the objective before adding content to it".into()));
    };

    for kind in ContentKind::ALL {
        for (index, item) in collections.get(kind).iter().enumerate() {
            validate_for_save(item)
                .map_err(|e| ContentError::Validation(format!("{} #{}: {e}", kind.label(), index + 1)))?;
        }
    }

    let mut report = SaveReport::default();
    for kind in ContentKind::ALL {
        for (index, item) in collections.get(kind).iter().enumerate() {
            let data = normalize_for_save(item.clone());
            let result = match data.id() {
                Some(id) => api.update_content(id, &data).await.map(|_| false),
                None => api.create_content(objective_id, &data).await.map(|_| true),
            };
            match result {
                Ok(true) => report.created += 1,
                Ok(false) => report.updated += 1,
                Err(e) => {
                    error!(target: "content", %kind, index, error = %e, "Saving item failed; continuing with the batch");
                    report.failures.push(ItemFailure { kind, index, message: e.to_string() });
                }
            }
        }
    }

    info!(
        target: "content",
        created = report.created,
        updated = report.updated,
        failed = report.failures.len(),
        "Content save finished"
    );
    Ok(report)
}

#[instrument(level = "info", skip(api))]
pub async fn delete_item(api: &dyn LmsApi, kind: ContentKind, id: Option<&ItemId>) -> ContentResult<()> {
    let Some(id) = id else {
        return Err(ContentError::Precondition("This item has not been saved yet".into()));
    };
    api.delete_content(kind, id).await?;
    info!(target: "content", %kind, %id, "Content item deleted");
    Ok(())
}
