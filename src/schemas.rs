//! Default templates, save-time normalisation and validation for the four content kinds.
//!
//! Everything here is pure: no I/O, fresh values on every call.

use crate::domain::{
  Assignment, ContentItem, ContentKind, McqOption, McqQuestion, PracticeCode, QuestionType, Resource,
  SupportingResource, SupportingResourceType, DEFAULT_MAX_MARKS, DEFAULT_PASSING_MARKS,
};
use crate::error::{ContentError, ContentResult};

pub const UNTITLED_ASSIGNMENT: &str = "Untitled Assignment";
const MCQ_DEFAULT_OPTIONS: usize = 4;

/// Zero-value record for a kind. Required fields are left empty on purpose, so an
/// untouched item never passes `validate_for_save`.
pub fn default_item(kind: ContentKind) -> ContentItem {
  match kind {
    ContentKind::Resources => ContentItem::Resource(Resource::default()),
    ContentKind::Assignments => ContentItem::Assignment(Assignment::default()),
    ContentKind::PracticeCodes => ContentItem::PracticeCode(PracticeCode::default()),
    ContentKind::McqQuestions => ContentItem::Mcq(McqQuestion {
      options: (0..MCQ_DEFAULT_OPTIONS).map(|_| McqOption::default()).collect(),
      ..McqQuestion::default()
    }),
  }
}

/// Canonical shape sent to the backend. Idempotent.
pub fn normalize_for_save(item: ContentItem) -> ContentItem {
  match item {
    ContentItem::Resource(r) => ContentItem::Resource(normalize_resource(r)),
    ContentItem::Assignment(a) => ContentItem::Assignment(normalize_assignment(a)),
    // Already canonical; legacy string options are coerced when decoded.
    other => other,
  }
}

fn normalize_resource(mut r: Resource) -> Resource {
  r.file = None;
  if let Some(alias) = r.file_url.take() {
    if r.url.trim().is_empty() {
      r.url = alias;
    }
  }
  if let Some(alias) = r.original_name.take() {
    if r.file_name.trim().is_empty() {
      r.file_name = alias;
    }
  }
  r
}

fn normalize_supporting(mut s: SupportingResource) -> SupportingResource {
  if s.kind == SupportingResourceType::GitRepo {
    s.file_key.clear();
    s.file_name.clear();
    s.file_size = 0;
    s.mime_type.clear();
  }
  s
}

fn normalize_assignment(mut a: Assignment) -> Assignment {
  a.resources = a
    .resources
    .into_iter()
    .filter(|s| !s.is_blank())
    .map(normalize_supporting)
    .collect();
  if a.name.trim().is_empty() {
    a.name = UNTITLED_ASSIGNMENT.into();
  }
  if a.max_marks == 0 {
    a.max_marks = DEFAULT_MAX_MARKS;
  }
  if a.passing_marks == 0 {
    a.passing_marks = DEFAULT_PASSING_MARKS.min(a.max_marks);
  }
  a
}

/// Local validation run before any network call.
pub fn validate_for_save(item: &ContentItem) -> ContentResult<()> {
  let missing = |what: &str| Err(ContentError::Validation(format!("{what} is required")));
  match item {
    ContentItem::Resource(r) if r.title.trim().is_empty() => missing("Resource title"),
    ContentItem::Assignment(a) if a.name.trim().is_empty() => missing("Assignment name"),
    ContentItem::PracticeCode(p) if p.problem.trim().is_empty() => missing("Practice problem"),
    ContentItem::Mcq(q) => validate_mcq(q),
    _ => Ok(()),
  }
}

fn validate_mcq(q: &McqQuestion) -> ContentResult<()> {
  if q.question.trim().is_empty() {
    return Err(ContentError::Validation("Question text is required".into()));
  }
  match q.question_type {
    QuestionType::SingleChoice => {
      let hits = q.options.iter().filter(|o| o.matches(&q.correct_answer)).count();
      if hits != 1 {
        return Err(ContentError::Validation(
          "Single-choice questions need exactly one option marked correct".into(),
        ));
      }
    }
    QuestionType::MultipleChoice => {
      if let Some(stray) = q.correct_answers.iter().find(|a| !q.options.iter().any(|o| o.matches(a))) {
        return Err(ContentError::Validation(format!("Correct answer '{stray}' is not one of the options")));
      }
    }
    QuestionType::OneWord => {
      if q.correct_answer.trim().is_empty() {
        return Err(ContentError::Validation("One-word questions need an expected answer".into()));
      }
    }
  }
  Ok(())
}

/// Answers of one question type mean nothing under another, so a type switch clears both.
/// Answer fields named in `supplied` arrived together with the new type and are kept.
pub fn reset_answers_on_type_change(before: QuestionType, q: &mut McqQuestion, supplied: &[&str]) -> bool {
  if before == q.question_type {
    return false;
  }
  if !supplied.contains(&"correctAnswer") {
    q.correct_answer.clear();
  }
  if !supplied.contains(&"correctAnswers") {
    q.correct_answers.clear();
  }
  true
}

/// Every storage key the item references.
pub fn storage_keys(item: &ContentItem) -> Vec<String> {
  let keys: Vec<&String> = match item {
    ContentItem::Resource(r) => vec![&r.file_key],
    ContentItem::Assignment(a) => a.resources.iter().map(|s| &s.file_key).collect(),
    ContentItem::PracticeCode(_) => Vec::new(),
    ContentItem::Mcq(q) => std::iter::once(&q.question_image_key)
      .chain(q.options.iter().map(|o| &o.image_key))
      .collect(),
  };
  keys.into_iter().filter(|k| !k.trim().is_empty()).cloned().collect()
}
