//! Upload bookkeeping: size limits, per-slot busy flags, and merging returned storage
//! metadata into the owning item.
//!
//! Re-uploading into a slot that is still busy is allowed. Each `begin` bumps the slot's
//! generation; only the response of the latest generation is applied, older ones are
//! discarded when they resolve (cancel-and-replace).

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::api::UploadedFile;
use crate::config::{UploadFolders, UploadLimits};
use crate::domain::{ContentItem, ContentKind, OptionKind};
use crate::error::{ContentError, ContentResult};
use crate::store::LocalKey;

const MB: u64 = 1024 * 1024;

/// Which file field of which item an upload fills. Items are named by their local key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "camelCase")]
pub enum UploadTarget {
  ResourceFile { item: LocalKey },
  AssignmentFile { item: LocalKey, resource: usize },
  McqQuestionImage { item: LocalKey },
  McqOptionImage { item: LocalKey, option: usize },
}

impl UploadTarget {
  pub fn kind(&self) -> ContentKind {
    match self {
      UploadTarget::ResourceFile { .. } => ContentKind::Resources,
      UploadTarget::AssignmentFile { .. } => ContentKind::Assignments,
      UploadTarget::McqQuestionImage { .. } | UploadTarget::McqOptionImage { .. } => ContentKind::McqQuestions,
    }
  }

  pub fn item(&self) -> LocalKey {
    match *self {
      UploadTarget::ResourceFile { item }
      | UploadTarget::AssignmentFile { item, .. }
      | UploadTarget::McqQuestionImage { item }
      | UploadTarget::McqOptionImage { item, .. } => item,
    }
  }

  fn is_image(&self) -> bool {
    matches!(self, UploadTarget::McqQuestionImage { .. } | UploadTarget::McqOptionImage { .. })
  }

  pub fn limit_mb(&self, limits: &UploadLimits) -> u64 {
    if self.is_image() { limits.image_mb } else { limits.document_mb }
  }

  pub fn folder<'a>(&self, folders: &'a UploadFolders) -> &'a str {
    match self.kind() {
      ContentKind::Resources => &folders.resources,
      ContentKind::Assignments => &folders.assignments,
      _ => &folders.mcq,
    }
  }
}

/// Slot name shown to the UI while busy, e.g. `resource-3` or `mcq-option-7-2`.
impl fmt::Display for UploadTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      UploadTarget::ResourceFile { item } => write!(f, "resource-{item}"),
      UploadTarget::AssignmentFile { item, resource } => write!(f, "assignment-{item}-resource-{resource}"),
      UploadTarget::McqQuestionImage { item } => write!(f, "mcq-{item}-question"),
      UploadTarget::McqOptionImage { item, option } => write!(f, "mcq-option-{item}-{option}"),
    }
  }
}

/// Upload slot as the UI addresses it: by the item's current index.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "camelCase")]
pub enum UploadSlot {
  ResourceFile { index: usize },
  AssignmentFile { index: usize, resource: usize },
  McqQuestionImage { index: usize },
  McqOptionImage { index: usize, option: usize },
}

impl UploadSlot {
  pub fn kind(&self) -> ContentKind {
    match self {
      UploadSlot::ResourceFile { .. } => ContentKind::Resources,
      UploadSlot::AssignmentFile { .. } => ContentKind::Assignments,
      UploadSlot::McqQuestionImage { .. } | UploadSlot::McqOptionImage { .. } => ContentKind::McqQuestions,
    }
  }

  pub fn index(&self) -> usize {
    match *self {
      UploadSlot::ResourceFile { index }
      | UploadSlot::AssignmentFile { index, .. }
      | UploadSlot::McqQuestionImage { index }
      | UploadSlot::McqOptionImage { index, .. } => index,
    }
  }

  /// Pin the slot to the item's stable key for the lifetime of the upload.
  pub fn bind(self, item: LocalKey) -> UploadTarget {
    match self {
      UploadSlot::ResourceFile { .. } => UploadTarget::ResourceFile { item },
      UploadSlot::AssignmentFile { resource, .. } => UploadTarget::AssignmentFile { item, resource },
      UploadSlot::McqQuestionImage { .. } => UploadTarget::McqQuestionImage { item },
      UploadSlot::McqOptionImage { option, .. } => UploadTarget::McqOptionImage { item, option },
    }
  }
}

#[derive(Debug)]
pub struct Ticket {
  pub target: UploadTarget,
  generation: u64,
}

#[derive(Default)]
struct Slot {
  generation: u64,
  busy: bool,
}

#[derive(Default)]
pub struct UploadCoordinator {
  limits: UploadLimits,
  slots: HashMap<UploadTarget, Slot>,
}

impl UploadCoordinator {
  pub fn new(limits: UploadLimits) -> Self {
    Self { limits, slots: HashMap::new() }
  }

  pub fn check_size(&self, target: &UploadTarget, size: u64) -> ContentResult<()> {
    let limit_mb = target.limit_mb(&self.limits);
    if size > limit_mb * MB {
      return Err(ContentError::SizeLimit { limit_mb, actual_bytes: size });
    }
    Ok(())
  }

  /// Size check, then mark the slot busy under a fresh generation.
  pub fn begin(&mut self, target: UploadTarget, size: u64) -> ContentResult<Ticket> {
    self.check_size(&target, size)?;
    let slot = self.slots.entry(target).or_default();
    if slot.busy {
      debug!(target: "content", slot = %target, "Replacing in-flight upload");
    }
    slot.generation += 1;
    slot.busy = true;
    Ok(Ticket { target, generation: slot.generation })
  }

  /// Close a ticket. Returns false when a newer upload superseded it; its result must be
  /// dropped and the slot stays busy for the newer one.
  pub fn finish(&mut self, ticket: &Ticket) -> bool {
    match self.slots.get_mut(&ticket.target) {
      Some(slot) if slot.generation == ticket.generation => {
        slot.busy = false;
        true
      }
      _ => {
        warn!(target: "content", slot = %ticket.target, "Discarding stale upload response");
        false
      }
    }
  }

  pub fn busy_slots(&self) -> Vec<String> {
    let mut out: Vec<String> = self.slots.iter().filter(|(_, s)| s.busy).map(|(t, _)| t.to_string()).collect();
    out.sort();
    out
  }

  /// Keys are reissued on reload, so nothing pending can be matched afterwards.
  pub fn reset(&mut self) {
    self.slots.clear();
  }
}

/// Check that `target` fits `item`, down to the nested supporting resource or option.
/// Run before uploading so a bad slot never reaches storage.
pub fn check_target(item: &ContentItem, target: &UploadTarget) -> ContentResult<()> {
  match (item, target) {
    (ContentItem::Assignment(a), UploadTarget::AssignmentFile { resource, .. }) if *resource >= a.resources.len() => {
      Err(ContentError::Precondition(format!("supporting resource {resource} does not exist")))
    }
    (ContentItem::Mcq(q), UploadTarget::McqOptionImage { option, .. }) if *option >= q.options.len() => {
      Err(ContentError::Precondition(format!("option {option} does not exist")))
    }
    (ContentItem::Resource(_), UploadTarget::ResourceFile { .. })
    | (ContentItem::Assignment(_), UploadTarget::AssignmentFile { .. })
    | (ContentItem::Mcq(_), UploadTarget::McqQuestionImage { .. } | UploadTarget::McqOptionImage { .. }) => Ok(()),
    (item, target) => Err(ContentError::InvalidField(format!("{target} does not belong to a {} item", item.kind()))),
  }
}

/// Write upload metadata into the item's file fields for `target`.
pub fn apply_upload(item: &mut ContentItem, target: &UploadTarget, file: &UploadedFile) -> ContentResult<()> {
  match (item, target) {
    (ContentItem::Resource(r), UploadTarget::ResourceFile { .. }) => {
      r.url = file.url.clone();
      r.file_key = file.key.clone();
      r.file_name = file.original_name.clone();
      r.file_size = file.size;
      r.mime_type = file.mime_type.clone();
      r.file = None;
    }
    (ContentItem::Assignment(a), UploadTarget::AssignmentFile { resource, .. }) => {
      let s = a
        .resources
        .get_mut(*resource)
        .ok_or_else(|| ContentError::Precondition(format!("supporting resource {resource} no longer exists")))?;
      s.url = file.url.clone();
      s.file_key = file.key.clone();
      s.file_name = file.original_name.clone();
      s.file_size = file.size;
      s.mime_type = file.mime_type.clone();
      if s.title.trim().is_empty() {
        s.title = file.original_name.clone();
      }
    }
    (ContentItem::Mcq(q), UploadTarget::McqQuestionImage { .. }) => {
      q.question_image_url = file.url.clone();
      q.question_image_key = file.key.clone();
    }
    (ContentItem::Mcq(q), UploadTarget::McqOptionImage { option, .. }) => {
      let o = q
        .options
        .get_mut(*option)
        .ok_or_else(|| ContentError::Precondition(format!("option {option} no longer exists")))?;
      let previous = std::mem::replace(&mut o.image_url, file.url.clone());
      o.image_key = file.key.clone();
      o.kind = OptionKind::Image;
      // Keep answers that referred to the old image pointing at the new one.
      if !previous.is_empty() {
        if q.correct_answer == previous {
          q.correct_answer = file.url.clone();
        }
        for a in q.correct_answers.iter_mut().filter(|a| **a == previous) {
          *a = file.url.clone();
        }
      }
    }
    (item, target) => {
      return Err(ContentError::InvalidField(format!("{target} does not belong to a {} item", item.kind())));
    }
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::domain::{Assignment, McqOption, McqQuestion, Resource, SupportingResource};
  use crate::schemas::default_item;

  fn uploaded(key: &str) -> UploadedFile {
    UploadedFile {
      url: format!("https://bucket.s3.amazonaws.com/{key}"),
      key: key.into(),
      original_name: "notes.pdf".into(),
      size: 1234,
      mime_type: "application/pdf".into(),
    }
  }

  #[test]
  fn oversized_document_is_rejected_before_marking_busy() {
    let mut up = UploadCoordinator::new(UploadLimits::default());
    let target = UploadTarget::ResourceFile { item: 1 };
    let err = up.begin(target, 60 * MB).unwrap_err();
    assert!(matches!(err, ContentError::SizeLimit { limit_mb: 50, .. }));
    assert!(up.busy_slots().is_empty());
  }

  #[test]
  fn images_have_the_smaller_limit() {
    let up = UploadCoordinator::new(UploadLimits::default());
    let image = UploadTarget::McqOptionImage { item: 1, option: 0 };
    assert!(up.check_size(&image, 11 * MB).is_err());
    assert!(up.check_size(&UploadTarget::AssignmentFile { item: 1, resource: 0 }, 11 * MB).is_ok());
  }

  #[test]
  fn latest_upload_wins_regardless_of_resolve_order() {
    let mut up = UploadCoordinator::new(UploadLimits::default());
    let target = UploadTarget::McqQuestionImage { item: 4 };
    let first = up.begin(target, 10).unwrap();
    let second = up.begin(target, 10).unwrap();
    assert!(up.finish(&second));
    assert!(up.busy_slots().is_empty());
    assert!(!up.finish(&first));
  }

  #[test]
  fn stale_finish_keeps_slot_busy_for_the_newer_upload() {
    let mut up = UploadCoordinator::new(UploadLimits::default());
    let target = UploadTarget::ResourceFile { item: 2 };
    let first = up.begin(target, 10).unwrap();
    let _second = up.begin(target, 10).unwrap();
    assert!(!up.finish(&first));
    assert_eq!(up.busy_slots(), vec!["resource-2".to_string()]);
  }

  #[test]
  fn resource_upload_fills_file_fields() {
    let mut item = ContentItem::Resource(Resource::default());
    apply_upload(&mut item, &UploadTarget::ResourceFile { item: 1 }, &uploaded("resources/notes.pdf")).unwrap();
    let ContentItem::Resource(r) = item else { unreachable!() };
    assert_eq!(r.file_key, "resources/notes.pdf");
    assert_eq!(r.file_name, "notes.pdf");
    assert_eq!(r.file_size, 1234);
  }

  #[test]
  fn supporting_file_upload_titles_untitled_entries() {
    let mut item = ContentItem::Assignment(Assignment {
      resources: vec![SupportingResource::default()],
      ..Assignment::default()
    });
    apply_upload(&mut item, &UploadTarget::AssignmentFile { item: 1, resource: 0 }, &uploaded("a/data.csv")).unwrap();
    let ContentItem::Assignment(a) = &item else { unreachable!() };
    assert_eq!(a.resources[0].title, "notes.pdf");
    let missing = apply_upload(&mut item, &UploadTarget::AssignmentFile { item: 1, resource: 3 }, &uploaded("x"));
    assert!(matches!(missing, Err(ContentError::Precondition(_))));
  }

  #[test]
  fn option_image_upload_repoints_answers() {
    let mut q = McqQuestion {
      options: vec![McqOption { image_url: "old".into(), kind: OptionKind::Image, ..McqOption::default() }],
      correct_answer: "old".into(),
      ..McqQuestion::default()
    };
    q.correct_answers = vec!["old".into()];
    let mut item = ContentItem::Mcq(q);
    apply_upload(&mut item, &UploadTarget::McqOptionImage { item: 1, option: 0 }, &uploaded("mcq/new.png")).unwrap();
    let ContentItem::Mcq(q) = item else { unreachable!() };
    assert_eq!(q.options[0].image_key, "mcq/new.png");
    assert_eq!(q.correct_answer, q.options[0].image_url);
    assert_eq!(q.correct_answers, vec![q.options[0].image_url.clone()]);
  }

  #[test]
  fn nested_slot_must_exist_before_upload() {
    let item = ContentItem::Assignment(Assignment {
      resources: vec![SupportingResource::default()],
      ..Assignment::default()
    });
    assert!(check_target(&item, &UploadTarget::AssignmentFile { item: 1, resource: 0 }).is_ok());
    let missing = check_target(&item, &UploadTarget::AssignmentFile { item: 1, resource: 5 });
    assert!(matches!(missing, Err(ContentError::Precondition(_))));
    let q = default_item(ContentKind::McqQuestions);
    assert!(check_target(&q, &UploadTarget::McqOptionImage { item: 2, option: 3 }).is_ok());
    assert!(check_target(&q, &UploadTarget::McqOptionImage { item: 2, option: 4 }).is_err());
    assert!(matches!(check_target(&q, &UploadTarget::ResourceFile { item: 2 }), Err(ContentError::InvalidField(_))));
  }

  #[test]
  fn mismatched_target_is_rejected() {
    let mut item = default_item(ContentKind::PracticeCodes);
    let res = apply_upload(&mut item, &UploadTarget::ResourceFile { item: 1 }, &uploaded("k"));
    assert!(matches!(res, Err(ContentError::InvalidField(_))));
  }
}
