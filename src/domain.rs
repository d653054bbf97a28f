//! Domain models shared with the LMS backend: objectives and the four content-item kinds.
//!
//! Field names follow the backend JSON contract exactly (camelCase, `fileKey`, `imageKey`,
//! `correctAnswers`, ...). These types are the one place request and response shapes are
//! defined; every call site goes through them.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Backends hand out `null` for unset strings and numbers; treat that as the default.
pub fn nullable<'de, D, T>(d: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(d)?.unwrap_or_default())
}

/// Server-assigned identifier. Some collections use numeric ids, some strings.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl<'de> Deserialize<'de> for ItemId {
  fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
      Text(String),
      Number(i64),
    }
    Ok(match Raw::deserialize(d)? {
      Raw::Text(s) => ItemId(s),
      Raw::Number(n) => ItemId(n.to_string()),
    })
  }
}

impl fmt::Display for ItemId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl From<&str> for ItemId {
  fn from(s: &str) -> Self { ItemId(s.to_string()) }
}

/// The four content collections attached to an objective.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContentKind {
  #[serde(rename = "resources")]
  Resources,
  #[serde(rename = "assignments")]
  Assignments,
  #[serde(rename = "practiceCodes")]
  PracticeCodes,
  #[serde(rename = "mcqQuestions")]
  McqQuestions,
}

impl ContentKind {
  pub const ALL: [ContentKind; 4] = [
    ContentKind::Resources,
    ContentKind::Assignments,
    ContentKind::PracticeCodes,
    ContentKind::McqQuestions,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      ContentKind::Resources => "resources",
      ContentKind::Assignments => "assignments",
      ContentKind::PracticeCodes => "practiceCodes",
      ContentKind::McqQuestions => "mcqQuestions",
    }
  }

  /// Human label used in notices ("No practice codes found").
  pub fn label(&self) -> &'static str {
    match self {
      ContentKind::Resources => "resources",
      ContentKind::Assignments => "assignments",
      ContentKind::PracticeCodes => "practice codes",
      ContentKind::McqQuestions => "MCQ questions",
    }
  }
}

impl fmt::Display for ContentKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// --- Resources ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ResourceType {
  #[default]
  Document,
  Video,
  Link,
  Note,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Audience {
  #[default]
  Learner,
  Tutor,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<ItemId>,
  #[serde(rename = "type", deserialize_with = "nullable")]
  pub kind: ResourceType,
  #[serde(deserialize_with = "nullable")]
  pub for_whom: Audience,
  #[serde(deserialize_with = "nullable")]
  pub title: String,
  #[serde(deserialize_with = "nullable")]
  pub description: String,
  #[serde(deserialize_with = "nullable")]
  pub url: String,
  #[serde(deserialize_with = "nullable")]
  pub content: String,
  #[serde(deserialize_with = "nullable")]
  pub file_key: String,
  #[serde(deserialize_with = "nullable")]
  pub file_name: String,
  #[serde(deserialize_with = "nullable")]
  pub file_size: u64,
  #[serde(deserialize_with = "nullable")]
  pub mime_type: String,

  // Legacy aliases still returned by older records; promoted on save.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file_url: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub original_name: Option<String>,

  /// Browser-side file handle attached while a file is picked; never sent upstream.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub file: Option<serde_json::Value>,
}

// --- Assignments ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
  #[default]
  Beginner,
  Intermediate,
  Advanced,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SupportingResourceType {
  #[default]
  Dataset,
  Image,
  SourceFile,
  GitRepo,
}

/// File or link attached to an assignment. GIT_REPO entries carry a URL instead of a file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SupportingResource {
  #[serde(rename = "type", deserialize_with = "nullable")]
  pub kind: SupportingResourceType,
  #[serde(deserialize_with = "nullable")]
  pub title: String,
  #[serde(deserialize_with = "nullable")]
  pub url: String,
  #[serde(deserialize_with = "nullable")]
  pub file_key: String,
  #[serde(deserialize_with = "nullable")]
  pub file_name: String,
  #[serde(deserialize_with = "nullable")]
  pub file_size: u64,
  #[serde(deserialize_with = "nullable")]
  pub mime_type: String,
  #[serde(deserialize_with = "nullable")]
  pub description: String,
}

impl SupportingResource {
  pub fn is_blank(&self) -> bool {
    self.title.trim().is_empty() && self.url.trim().is_empty() && self.file_key.trim().is_empty()
  }
}

pub const DEFAULT_MAX_MARKS: u32 = 100;
pub const DEFAULT_PASSING_MARKS: u32 = 40;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Assignment {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<ItemId>,
  #[serde(deserialize_with = "nullable")]
  pub name: String,
  #[serde(deserialize_with = "nullable")]
  pub description: String,
  #[serde(deserialize_with = "nullable")]
  pub problem_statement: String,
  #[serde(deserialize_with = "nullable")]
  pub instructions: String,
  #[serde(deserialize_with = "nullable")]
  pub difficulty: Difficulty,
  #[serde(deserialize_with = "nullable")]
  pub max_marks: u32,
  #[serde(deserialize_with = "nullable")]
  pub passing_marks: u32,
  #[serde(deserialize_with = "nullable")]
  pub resources: Vec<SupportingResource>,
  /// Rubric rows are authored elsewhere; kept opaque and passed through.
  #[serde(deserialize_with = "nullable")]
  pub scoring_rubric: Vec<serde_json::Value>,
}

impl Default for Assignment {
  fn default() -> Self {
    Self {
      id: None,
      name: String::new(),
      description: String::new(),
      problem_statement: String::new(),
      instructions: String::new(),
      difficulty: Difficulty::Beginner,
      max_marks: DEFAULT_MAX_MARKS,
      passing_marks: DEFAULT_PASSING_MARKS,
      resources: Vec::new(),
      scoring_rubric: Vec::new(),
    }
  }
}

// --- Practice code ---

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TestCase {
  #[serde(deserialize_with = "nullable")]
  pub input: String,
  #[serde(deserialize_with = "nullable")]
  pub expected_output: String,
  #[serde(deserialize_with = "nullable")]
  pub explanation: String,
  #[serde(deserialize_with = "nullable")]
  pub is_sample: bool,
  #[serde(deserialize_with = "nullable")]
  pub is_hidden: bool,
  #[serde(deserialize_with = "nullable")]
  pub marks: u32,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PracticeCode {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<ItemId>,
  #[serde(deserialize_with = "nullable")]
  pub problem: String,
  #[serde(deserialize_with = "nullable")]
  pub description: String,
  #[serde(deserialize_with = "nullable")]
  pub problem_statement: String,
  #[serde(deserialize_with = "nullable")]
  pub instructions: String,
  #[serde(deserialize_with = "nullable")]
  pub input_format: String,
  #[serde(deserialize_with = "nullable")]
  pub output_format: String,
  #[serde(deserialize_with = "nullable")]
  pub constraints: String,
  #[serde(deserialize_with = "nullable")]
  pub sample_input: String,
  #[serde(deserialize_with = "nullable")]
  pub sample_output: String,
  #[serde(deserialize_with = "nullable")]
  pub explanation: String,
  #[serde(deserialize_with = "nullable")]
  pub test_cases: Vec<TestCase>,
  #[serde(deserialize_with = "nullable")]
  pub difficulty: Difficulty,
  #[serde(deserialize_with = "nullable")]
  pub language: String,
  /// Seconds.
  #[serde(deserialize_with = "nullable")]
  pub time_limit: u32,
  /// Megabytes.
  #[serde(deserialize_with = "nullable")]
  pub memory_limit: u32,
  #[serde(deserialize_with = "nullable")]
  pub starter_code: String,
  #[serde(deserialize_with = "nullable")]
  pub solution: String,
}

impl Default for PracticeCode {
  fn default() -> Self {
    Self {
      id: None,
      problem: String::new(),
      description: String::new(),
      problem_statement: String::new(),
      instructions: String::new(),
      input_format: String::new(),
      output_format: String::new(),
      constraints: String::new(),
      sample_input: String::new(),
      sample_output: String::new(),
      explanation: String::new(),
      test_cases: Vec::new(),
      difficulty: Difficulty::Beginner,
      language: "python".into(),
      time_limit: 1,
      memory_limit: 256,
      starter_code: String::new(),
      solution: String::new(),
    }
  }
}

// --- MCQ ---

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
  #[default]
  SingleChoice,
  MultipleChoice,
  OneWord,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionKind {
  #[default]
  Text,
  Image,
}

/// One answer option. Older records store options as bare strings; those are read as
/// text options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawOption", rename_all = "camelCase")]
pub struct McqOption {
  pub text: String,
  #[serde(rename = "type")]
  pub kind: OptionKind,
  pub image_url: String,
  pub image_key: String,
}

impl McqOption {
  pub fn text(text: impl Into<String>) -> Self {
    Self { text: text.into(), ..Self::default() }
  }

  /// True if `answer` names this option, by text or by image URL.
  pub fn matches(&self, answer: &str) -> bool {
    if answer.is_empty() {
      return false;
    }
    self.text == answer || (!self.image_url.is_empty() && self.image_url == answer)
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOption {
  Legacy(String),
  Full {
    #[serde(default, deserialize_with = "nullable")]
    text: String,
    #[serde(default, rename = "type", deserialize_with = "nullable")]
    kind: OptionKind,
    #[serde(default, rename = "imageUrl", deserialize_with = "nullable")]
    image_url: String,
    #[serde(default, rename = "imageKey", deserialize_with = "nullable")]
    image_key: String,
  },
}

impl From<RawOption> for McqOption {
  fn from(raw: RawOption) -> Self {
    match raw {
      RawOption::Legacy(text) => McqOption::text(text),
      RawOption::Full { text, kind, image_url, image_key } => McqOption { text, kind, image_url, image_key },
    }
  }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct McqQuestion {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub id: Option<ItemId>,
  #[serde(deserialize_with = "nullable")]
  pub question: String,
  #[serde(deserialize_with = "nullable")]
  pub question_type: QuestionType,
  #[serde(deserialize_with = "nullable")]
  pub options: Vec<McqOption>,
  #[serde(deserialize_with = "nullable")]
  pub correct_answer: String,
  #[serde(deserialize_with = "nullable")]
  pub correct_answers: Vec<String>,
  #[serde(deserialize_with = "nullable")]
  pub question_image_url: String,
  #[serde(deserialize_with = "nullable")]
  pub question_image_key: String,
  #[serde(deserialize_with = "nullable")]
  pub explanation: String,
}

// --- Sum type over the four kinds ---

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ContentItem {
  Resource(Resource),
  Assignment(Assignment),
  PracticeCode(PracticeCode),
  Mcq(McqQuestion),
}

impl ContentItem {
  pub fn kind(&self) -> ContentKind {
    match self {
      ContentItem::Resource(_) => ContentKind::Resources,
      ContentItem::Assignment(_) => ContentKind::Assignments,
      ContentItem::PracticeCode(_) => ContentKind::PracticeCodes,
      ContentItem::Mcq(_) => ContentKind::McqQuestions,
    }
  }

  pub fn id(&self) -> Option<&ItemId> {
    match self {
      ContentItem::Resource(r) => r.id.as_ref(),
      ContentItem::Assignment(a) => a.id.as_ref(),
      ContentItem::PracticeCode(p) => p.id.as_ref(),
      ContentItem::Mcq(m) => m.id.as_ref(),
    }
  }

  /// Decode a backend record as the given kind. The JSON alone is ambiguous.
  pub fn from_value(kind: ContentKind, value: serde_json::Value) -> Result<Self, serde_json::Error> {
    Ok(match kind {
      ContentKind::Resources => ContentItem::Resource(serde_json::from_value(value)?),
      ContentKind::Assignments => ContentItem::Assignment(serde_json::from_value(value)?),
      ContentKind::PracticeCodes => ContentItem::PracticeCode(serde_json::from_value(value)?),
      ContentKind::McqQuestions => ContentItem::Mcq(serde_json::from_value(value)?),
    })
  }

  pub fn to_value(&self) -> Result<serde_json::Value, serde_json::Error> {
    serde_json::to_value(self)
  }
}

// --- Objectives ---

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Objective {
  pub id: Option<ItemId>,
  #[serde(deserialize_with = "nullable")]
  pub title: String,
  #[serde(deserialize_with = "nullable")]
  pub description: String,
  /// Minutes.
  #[serde(deserialize_with = "nullable")]
  pub min_duration: u32,
  #[serde(deserialize_with = "nullable")]
  pub order: i32,
  // Read-side denormalisations; content is written through the per-kind endpoints.
  #[serde(deserialize_with = "nullable")]
  pub resources: Vec<Resource>,
  #[serde(deserialize_with = "nullable")]
  pub assignments: Vec<Assignment>,
  #[serde(deserialize_with = "nullable")]
  pub practice_codes: Vec<PracticeCode>,
  #[serde(deserialize_with = "nullable")]
  pub mcq_questions: Vec<McqQuestion>,
}

/// Body for objective create/update.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ObjectiveDraft {
  pub title: String,
  pub description: String,
  pub min_duration: u32,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub order: Option<i32>,
}

/// Where an objective lives. The backend lists objectives per module or per sub-module.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "id", rename_all = "camelCase")]
pub enum ObjectiveScope {
  Module(String),
  SubModule(String),
}

/// Filters for the cross-program resource browser.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilters {
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<ResourceType>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub for_whom: Option<Audience>,
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn legacy_string_options_become_text_options() {
    let q: McqQuestion = serde_json::from_value(json!({
      "question": "2 + 2?",
      "options": ["3", "4", {"text": "", "type": "image", "imageUrl": "u", "imageKey": "k"}],
      "correctAnswer": "4"
    }))
    .expect("decode");
    assert_eq!(q.options[0], McqOption::text("3"));
    assert_eq!(q.options[1].kind, OptionKind::Text);
    assert_eq!(q.options[2].kind, OptionKind::Image);
    assert_eq!(q.options[2].image_key, "k");
  }

  #[test]
  fn numeric_ids_and_nulls_are_tolerated() {
    let r: Resource = serde_json::from_value(json!({
      "id": 42, "title": "Intro", "description": null, "type": null, "fileSize": null
    }))
    .expect("decode");
    assert_eq!(r.id, Some(ItemId("42".into())));
    assert_eq!(r.kind, ResourceType::Document);
    assert_eq!(r.description, "");
    assert_eq!(r.file_size, 0);
  }

  #[test]
  fn unsaved_items_serialize_without_id() {
    let v = ContentItem::Resource(Resource::default()).to_value().expect("encode");
    assert!(v.get("id").is_none());
    assert_eq!(v["type"], "DOCUMENT");
    assert_eq!(v["forWhom"], "LEARNER");
    assert!(v.get("file").is_none());
  }

  #[test]
  fn kind_names_match_backend_paths() {
    let k: ContentKind = serde_json::from_value(json!("practiceCodes")).expect("decode");
    assert_eq!(k, ContentKind::PracticeCodes);
    assert_eq!(ContentKind::McqQuestions.to_string(), "mcqQuestions");
  }
}
