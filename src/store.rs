//! In-memory content collections for the objective currently open in a session.
//!
//! Four ordered sequences, one per kind. Operations are addressed by `(kind, index)` as the
//! UI renders them; every entry also carries a stable local key, handed out on insert, so
//! that work finishing later (uploads) can find its item even if indices shifted meanwhile.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::{ContentItem, ContentKind};
use crate::error::{ContentError, ContentResult};
use crate::schemas::{default_item, reset_answers_on_type_change};

pub type LocalKey = u64;

#[derive(Clone, Debug, Serialize)]
pub struct Entry {
    pub key: LocalKey,
    pub item: ContentItem,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentCounts {
    pub resources: usize,
    pub assignments: usize,
    pub practice_codes: usize,
    pub mcq_questions: usize,
}

impl ContentCounts {
    pub fn get(&self, kind: ContentKind) -> usize {
        match kind {
            ContentKind::Resources => self.resources,
            ContentKind::Assignments => self.assignments,
            ContentKind::PracticeCodes => self.practice_codes,
            ContentKind::McqQuestions => self.mcq_questions,
        }
    }

    pub fn total(&self) -> usize {
        self.resources + self.assignments + self.practice_codes + self.mcq_questions
    }
}

#[derive(Clone, Debug, Default)]
pub struct ContentStore {
    resources: Vec<Entry>,
    assignments: Vec<Entry>,
    practice_codes: Vec<Entry>,
    mcq_questions: Vec<Entry>,
    next_key: LocalKey,
}

impl ContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn list(&self, kind: ContentKind) -> &Vec<Entry> {
        match kind {
            ContentKind::Resources => &self.resources,
            ContentKind::Assignments => &self.assignments,
            ContentKind::PracticeCodes => &self.practice_codes,
            ContentKind::McqQuestions => &self.mcq_questions,
        }
    }

    fn list_mut(&mut self, kind: ContentKind) -> &mut Vec<Entry> {
        match kind {
            ContentKind::Resources => &mut self.resources,
            ContentKind::Assignments => &mut self.assignments,
            ContentKind::PracticeCodes => &mut self.practice_codes,
            ContentKind::McqQuestions => &mut self.mcq_questions,
        }
    }

    fn issue_key(&mut self) -> LocalKey {
        self.next_key += 1;
        self.next_key
    }

    pub fn entries(&self, kind: ContentKind) -> &[Entry] {
        self.list(kind)
    }

    /// Snapshot of one collection, in order.
    pub fn items(&self, kind: ContentKind) -> Vec<ContentItem> {
        self.list(kind).iter().map(|e| e.item.clone()).collect()
    }

    /// Bulk overwrite after a reload. Every previously held index and key is invalid after this.
    pub fn replace_all(&mut self, kind: ContentKind, items: Vec<ContentItem>) {
        let mut fresh = Vec::with_capacity(items.len());
        for item in items {
            if item.kind() != kind {
                warn!(target: "content", expected = %kind, got = %item.kind(), "Dropping item of the wrong kind");
                continue;
            }
            let key = self.issue_key();
            fresh.push(Entry { key, item });
        }
        debug!(target: "content", %kind, len = fresh.len(), "Collection replaced");
        *self.list_mut(kind) = fresh;
    }

    /// Insert at the end; `None` inserts the kind's default template.
    pub fn append(&mut self, kind: ContentKind, item: Option<ContentItem>) -> ContentResult<LocalKey> {
        let item = item.unwrap_or_else(|| default_item(kind));
        if item.kind() != kind {
            return Err(ContentError::InvalidField(format!("cannot append {} to {kind}", item.kind())));
        }
        let key = self.issue_key();
        self.list_mut(kind).push(Entry { key, item });
        Ok(key)
    }

    /// Shallow-merge `patch` into the item at `index`.
    ///
    /// Out-of-range indices are a no-op (`Ok(false)`). A patch the kind cannot hold leaves the
    /// item untouched. The server id is not patchable.
    pub fn update_field(&mut self, kind: ContentKind, index: usize, patch: &Map<String, Value>) -> ContentResult<bool> {
        let Some(entry) = self.list_mut(kind).get_mut(index) else {
            debug!(target: "content", %kind, index, "update_field ignored: index out of range");
            return Ok(false);
        };
        let mut value = entry.item.to_value().map_err(|e| ContentError::InvalidField(e.to_string()))?;
        let Some(fields) = value.as_object_mut() else {
            return Err(ContentError::InvalidField(format!("{kind} item is not an object")));
        };
        for (k, v) in patch {
            if k == "id" {
                continue;
            }
            fields.insert(k.clone(), v.clone());
        }
        let mut updated = ContentItem::from_value(kind, value).map_err(|e| ContentError::InvalidField(e.to_string()))?;
        if let (ContentItem::Mcq(before), ContentItem::Mcq(after)) = (&entry.item, &mut updated) {
            let supplied: Vec<&str> = patch.keys().map(String::as_str).collect();
            if reset_answers_on_type_change(before.question_type, after, &supplied) {
                debug!(target: "content", index, "Question type changed; stale answers reset");
            }
        }
        entry.item = updated;
        Ok(true)
    }

    pub fn remove_at(&mut self, kind: ContentKind, index: usize) -> Option<ContentItem> {
        let list = self.list_mut(kind);
        if index >= list.len() {
            return None;
        }
        Some(list.remove(index).item)
    }

    pub fn get(&self, kind: ContentKind, index: usize) -> Option<&ContentItem> {
        self.list(kind).get(index).map(|e| &e.item)
    }

    pub fn index_of(&self, kind: ContentKind, key: LocalKey) -> Option<usize> {
        self.list(kind).iter().position(|e| e.key == key)
    }

    pub fn key_at(&self, kind: ContentKind, index: usize) -> Option<LocalKey> {
        self.list(kind).get(index).map(|e| e.key)
    }

    pub fn get_mut_by_key(&mut self, kind: ContentKind, key: LocalKey) -> Option<&mut ContentItem> {
        self.list_mut(kind).iter_mut().find(|e| e.key == key).map(|e| &mut e.item)
    }

    pub fn counts(&self) -> ContentCounts {
        ContentCounts {
            resources: self.resources.len(),
            assignments: self.assignments.len(),
            practice_codes: self.practice_codes.len(),
            mcq_questions: self.mcq_questions.len(),
        }
    }

    pub fn clear(&mut self) {
        for kind in ContentKind::ALL {
            self.list_mut(kind).clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{McqQuestion, QuestionType, Resource};
    use serde_json::json;

    fn titled(title: &str) -> ContentItem {
        ContentItem::Resource(Resource { title: title.into(), ..Resource::default() })
    }

    fn titles(store: &ContentStore) -> Vec<String> {
        store
            .items(ContentKind::Resources)
            .into_iter()
            .map(|i| match i {
                ContentItem::Resource(r) => r.title,
                _ => unreachable!(),
            })
            .collect()
    }

    fn patch(v: Value) -> Map<String, Value> {
        v.as_object().cloned().expect("object patch")
    }

    #[test]
    fn append_then_remove_restores_the_collection() {
        let mut store = ContentStore::new();
        store.replace_all(ContentKind::Resources, vec![titled("a"), titled("b")]);
        store.append(ContentKind::Resources, Some(titled("c"))).unwrap();
        assert_eq!(store.counts().resources, 3);
        let removed = store.remove_at(ContentKind::Resources, 2).expect("removed");
        assert_eq!(removed, titled("c"));
        assert_eq!(titles(&store), vec!["a", "b"]);
    }

    #[test]
    fn removing_from_the_middle_keeps_order() {
        let mut store = ContentStore::new();
        store.replace_all(ContentKind::Resources, vec![titled("a"), titled("b"), titled("c")]);
        store.remove_at(ContentKind::Resources, 1);
        assert_eq!(titles(&store), vec!["a", "c"]);
        assert!(store.remove_at(ContentKind::Resources, 5).is_none());
    }

    #[test]
    fn update_merges_fields_and_ignores_out_of_range() {
        let mut store = ContentStore::new();
        store.append(ContentKind::Resources, None).unwrap();
        assert!(store.update_field(ContentKind::Resources, 0, &patch(json!({"title": "Guide", "type": "LINK"}))).unwrap());
        let ContentItem::Resource(r) = store.get(ContentKind::Resources, 0).unwrap() else { unreachable!() };
        assert_eq!(r.title, "Guide");
        assert_eq!(r.kind, crate::domain::ResourceType::Link);
        assert!(!store.update_field(ContentKind::Resources, 3, &patch(json!({"title": "x"}))).unwrap());
    }

    #[test]
    fn ill_typed_patch_leaves_item_untouched() {
        let mut store = ContentStore::new();
        store.append(ContentKind::Resources, Some(titled("keep"))).unwrap();
        let err = store.update_field(ContentKind::Resources, 0, &patch(json!({"fileSize": "huge"})));
        assert!(matches!(err, Err(ContentError::InvalidField(_))));
        assert_eq!(titles(&store), vec!["keep"]);
    }

    #[test]
    fn server_id_is_not_patchable() {
        let mut store = ContentStore::new();
        store.append(ContentKind::Resources, None).unwrap();
        store.update_field(ContentKind::Resources, 0, &patch(json!({"id": "forged"}))).unwrap();
        assert!(store.get(ContentKind::Resources, 0).unwrap().id().is_none());
    }

    #[test]
    fn switching_mcq_type_resets_answers() {
        let mut store = ContentStore::new();
        let q = McqQuestion { question: "Q".into(), correct_answer: "A".into(), ..McqQuestion::default() };
        store.append(ContentKind::McqQuestions, Some(ContentItem::Mcq(q))).unwrap();
        store
            .update_field(ContentKind::McqQuestions, 0, &patch(json!({"questionType": "MULTIPLE_CHOICE"})))
            .unwrap();
        let ContentItem::Mcq(q) = store.get(ContentKind::McqQuestions, 0).unwrap() else { unreachable!() };
        assert_eq!(q.question_type, QuestionType::MultipleChoice);
        assert!(q.correct_answers.is_empty());
        assert!(q.correct_answer.is_empty());
    }

    #[test]
    fn answers_sent_with_the_type_switch_are_kept() {
        let mut store = ContentStore::new();
        let q = McqQuestion { question: "Q".into(), correct_answer: "A".into(), ..McqQuestion::default() };
        store.append(ContentKind::McqQuestions, Some(ContentItem::Mcq(q))).unwrap();
        store
            .update_field(
                ContentKind::McqQuestions,
                0,
                &patch(json!({"questionType": "MULTIPLE_CHOICE", "correctAnswers": ["A"]})),
            )
            .unwrap();
        let ContentItem::Mcq(q) = store.get(ContentKind::McqQuestions, 0).unwrap() else { unreachable!() };
        assert_eq!(q.correct_answers, vec!["A".to_string()]);
        assert!(q.correct_answer.is_empty());
    }

    #[test]
    fn keys_survive_index_shifts_but_not_replace_all() {
        let mut store = ContentStore::new();
        store.replace_all(ContentKind::Resources, vec![titled("a"), titled("b")]);
        let key_b = store.key_at(ContentKind::Resources, 1).unwrap();
        store.remove_at(ContentKind::Resources, 0);
        assert_eq!(store.index_of(ContentKind::Resources, key_b), Some(0));
        store.replace_all(ContentKind::Resources, vec![titled("b")]);
        assert_eq!(store.index_of(ContentKind::Resources, key_b), None);
    }

    #[test]
    fn wrong_kind_is_rejected_on_append() {
        let mut store = ContentStore::new();
        assert!(store.append(ContentKind::Assignments, Some(titled("r"))).is_err());
        assert_eq!(store.counts().total(), 0);
    }
}
