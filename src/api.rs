//! Client for the LMS REST backend.
//!
//! `LmsApi` is the whole call contract the editor core depends on; `HttpLmsApi` speaks it
//! over HTTP. Every endpoint answers with the `{ success, data, message? }` envelope.
//!
//! NOTE: we never log the bearer token or request bodies, only ids, paths and sizes.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::ServiceConfig;
use crate::domain::{
    ContentItem, ContentKind, ItemId, Objective, ObjectiveDraft, ObjectiveScope, Resource, ResourceFilters,
};

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("backend HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("backend rejected the request: {0}")]
    Rejected(String),

    #[error("unexpected backend response: {0}")]
    Decode(String),
}

/// Response envelope used by every backend endpoint.
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(default)]
    pub message: Option<String>,
}

impl<T> Envelope<T> {
    fn into_result(self) -> Result<Option<T>, ApiError> {
        if self.success {
            Ok(self.data)
        } else {
            Err(ApiError::Rejected(self.message.unwrap_or_else(|| "request unsuccessful".into())))
        }
    }
}

/// A file picked in the browser, ready to be forwarded to the upload API.
#[derive(Clone, Debug)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Storage metadata returned by the upload API.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub url: String,
    pub key: String,
    #[serde(default)]
    pub original_name: String,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub mime_type: String,
}

#[async_trait]
pub trait LmsApi: Send + Sync {
    async fn list_objectives(&self, scope: &ObjectiveScope) -> Result<Vec<Objective>, ApiError>;
    async fn create_objective(&self, module_id: &str, draft: &ObjectiveDraft) -> Result<Objective, ApiError>;
    async fn update_objective(&self, id: &ItemId, draft: &ObjectiveDraft) -> Result<(), ApiError>;
    async fn delete_objective(&self, id: &ItemId) -> Result<(), ApiError>;

    async fn list_content(&self, kind: ContentKind, objective_id: &ItemId) -> Result<Vec<ContentItem>, ApiError>;
    /// Returns the server id of the new record when the backend echoes it.
    async fn create_content(&self, objective_id: &ItemId, item: &ContentItem) -> Result<Option<ItemId>, ApiError>;
    async fn update_content(&self, id: &ItemId, item: &ContentItem) -> Result<(), ApiError>;
    async fn delete_content(&self, kind: ContentKind, id: &ItemId) -> Result<(), ApiError>;

    async fn upload_file(&self, file: FileUpload, folder: &str) -> Result<UploadedFile, ApiError>;
    async fn delete_file(&self, key: &str) -> Result<(), ApiError>;

    async fn all_resources(&self, filters: &ResourceFilters) -> Result<Vec<Resource>, ApiError>;
}

fn segment(kind: ContentKind) -> &'static str {
    match kind {
        ContentKind::Resources => "resources",
        ContentKind::Assignments => "assignments",
        ContentKind::PracticeCodes => "practice-codes",
        ContentKind::McqQuestions => "mcq-questions",
    }
}

#[derive(Clone)]
pub struct HttpLmsApi {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpLmsApi {
    pub fn from_config(cfg: &ServiceConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: cfg.api_base_url.trim_end_matches('/').to_string(),
            token: cfg.api_token.clone(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .request(method, self.url(path))
            .header(USER_AGENT, "objective-content-backend/0.1");
        if let Some(token) = &self.token {
            req = req.header(AUTHORIZATION, format!("Bearer {token}"));
        }
        req
    }

    async fn send<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<Option<T>, ApiError> {
        let res = req.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            let message = extract_message(&body).unwrap_or(body);
            return Err(ApiError::Status { status: status.as_u16(), message });
        }
        let body = res.text().await?;
        debug!(target: "lms_api", status = status.as_u16(), body_len = body.len(), "Backend response");
        let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| ApiError::Decode(e.to_string()))?;
        envelope.into_result()
    }

    async fn send_list<T: DeserializeOwned>(&self, req: reqwest::RequestBuilder) -> Result<Vec<T>, ApiError> {
        Ok(self.send::<Vec<T>>(req).await?.unwrap_or_default())
    }

    async fn send_unit(&self, req: reqwest::RequestBuilder) -> Result<(), ApiError> {
        self.send::<serde_json::Value>(req).await.map(|_| ())
    }
}

#[async_trait]
impl LmsApi for HttpLmsApi {
    #[instrument(level = "info", skip(self), target = "lms_api")]
    async fn list_objectives(&self, scope: &ObjectiveScope) -> Result<Vec<Objective>, ApiError> {
        let path = match scope {
            ObjectiveScope::Module(id) => format!("objectives/module/{id}"),
            ObjectiveScope::SubModule(id) => format!("objectives/submodule/{id}"),
        };
        self.send_list(self.request(reqwest::Method::GET, &path)).await
    }

    #[instrument(level = "info", skip(self, draft), target = "lms_api")]
    async fn create_objective(&self, module_id: &str, draft: &ObjectiveDraft) -> Result<Objective, ApiError> {
        let req = self
            .request(reqwest::Method::POST, &format!("objectives/module/{module_id}"))
            .json(draft);
        self.send(req)
            .await?
            .ok_or_else(|| ApiError::Decode("create objective returned no data".into()))
    }

    #[instrument(level = "info", skip_all, fields(%id), target = "lms_api")]
    async fn update_objective(&self, id: &ItemId, draft: &ObjectiveDraft) -> Result<(), ApiError> {
        let req = self.request(reqwest::Method::PUT, &format!("objectives/{id}")).json(draft);
        self.send_unit(req).await
    }

    #[instrument(level = "info", skip_all, fields(%id), target = "lms_api")]
    async fn delete_objective(&self, id: &ItemId) -> Result<(), ApiError> {
        self.send_unit(self.request(reqwest::Method::DELETE, &format!("objectives/{id}"))).await
    }

    #[instrument(level = "info", skip_all, fields(%kind, %objective_id), target = "lms_api")]
    async fn list_content(&self, kind: ContentKind, objective_id: &ItemId) -> Result<Vec<ContentItem>, ApiError> {
        let path = format!("{}/objective/{objective_id}", segment(kind));
        let raw: Vec<serde_json::Value> = self.send_list(self.request(reqwest::Method::GET, &path)).await?;
        raw.into_iter()
            .map(|v| ContentItem::from_value(kind, v).map_err(|e| ApiError::Decode(e.to_string())))
            .collect()
    }

    #[instrument(level = "info", skip_all, fields(kind = %item.kind(), %objective_id), target = "lms_api")]
    async fn create_content(&self, objective_id: &ItemId, item: &ContentItem) -> Result<Option<ItemId>, ApiError> {
        #[derive(Deserialize)]
        struct Created {
            id: Option<ItemId>,
        }
        let path = format!("{}/objective/{objective_id}", segment(item.kind()));
        let created: Option<Created> = self.send(self.request(reqwest::Method::POST, &path).json(item)).await?;
        Ok(created.and_then(|c| c.id))
    }

    #[instrument(level = "info", skip_all, fields(kind = %item.kind(), %id), target = "lms_api")]
    async fn update_content(&self, id: &ItemId, item: &ContentItem) -> Result<(), ApiError> {
        let path = format!("{}/{id}", segment(item.kind()));
        self.send_unit(self.request(reqwest::Method::PUT, &path).json(item)).await
    }

    #[instrument(level = "info", skip_all, fields(%kind, %id), target = "lms_api")]
    async fn delete_content(&self, kind: ContentKind, id: &ItemId) -> Result<(), ApiError> {
        let path = format!("{}/{id}", segment(kind));
        self.send_unit(self.request(reqwest::Method::DELETE, &path)).await
    }

    #[instrument(level = "info", skip_all, fields(name = %file.name, size = file.size(), %folder), target = "lms_api")]
    async fn upload_file(&self, file: FileUpload, folder: &str) -> Result<UploadedFile, ApiError> {
        let mut part = Part::bytes(file.bytes).file_name(file.name);
        if !file.mime_type.is_empty() {
            part = part.mime_str(&file.mime_type)?;
        }
        let form = Form::new().text("folder", folder.to_string()).part("file", part);
        self.send(self.request(reqwest::Method::POST, "upload").multipart(form))
            .await?
            .ok_or_else(|| ApiError::Decode("upload returned no file metadata".into()))
    }

    #[instrument(level = "info", skip(self), target = "lms_api")]
    async fn delete_file(&self, key: &str) -> Result<(), ApiError> {
        let path = format!("upload/{}", urlencoding::encode(key));
        self.send_unit(self.request(reqwest::Method::DELETE, &path)).await
    }

    #[instrument(level = "info", skip(self), target = "lms_api")]
    async fn all_resources(&self, filters: &ResourceFilters) -> Result<Vec<Resource>, ApiError> {
        self.send_list(self.request(reqwest::Method::GET, "resources").query(filters)).await
    }
}

/// Pull a readable message out of an error body (`{"message": "..."}` or `{"error": "..."}`).
fn extract_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct Body {
        message: Option<String>,
        error: Option<String>,
    }
    let b = serde_json::from_str::<Body>(body).ok()?;
    b.message.or(b.error)
}

/// In-memory backend used by unit tests across the crate.
#[cfg(test)]
pub mod fake {
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    pub struct FakeState {
        pub objectives: Vec<(ObjectiveScope, Objective)>,
        pub content: HashMap<(ContentKind, ItemId), Vec<ContentItem>>,
        pub resources: Vec<Resource>,
        pub calls: Vec<String>,
        pub next_id: u64,
        pub create_calls: usize,
        /// 1-based create-call numbers that should fail.
        pub fail_creates: HashSet<usize>,
        pub fail_lists: HashSet<ContentKind>,
        pub fail_deletes: bool,
        pub fail_uploads: bool,
        pub fail_file_deletes: bool,
    }

    #[derive(Default)]
    pub struct FakeLmsApi {
        pub state: Mutex<FakeState>,
    }

    impl FakeLmsApi {
        /// Backend holding one objective `o1` under module `m1`.
        pub fn with_objective() -> Self {
            let fake = FakeLmsApi::default();
            {
                let mut st = fake.state.lock().unwrap();
                st.objectives.push((
                    ObjectiveScope::Module("m1".into()),
                    Objective { id: Some("o1".into()), title: "Loops".into(), ..Objective::default() },
                ));
            }
            fake
        }

        pub fn calls(&self) -> Vec<String> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn stored(&self, kind: ContentKind, objective_id: &str) -> Vec<ContentItem> {
            let st = self.state.lock().unwrap();
            st.content.get(&(kind, ItemId::from(objective_id))).cloned().unwrap_or_default()
        }

        pub fn seed(&self, objective_id: &str, items: Vec<ContentItem>) {
            let mut st = self.state.lock().unwrap();
            for item in items {
                st.next_id += 1;
                let id = ItemId(format!("srv-{}", st.next_id));
                let stored = with_id(item, id);
                st.content.entry((stored.kind(), ItemId::from(objective_id))).or_default().push(stored);
            }
        }
    }

    fn with_id(item: ContentItem, id: ItemId) -> ContentItem {
        match item {
            ContentItem::Resource(mut r) => {
                r.id = Some(id);
                ContentItem::Resource(r)
            }
            ContentItem::Assignment(mut a) => {
                a.id = Some(id);
                ContentItem::Assignment(a)
            }
            ContentItem::PracticeCode(mut p) => {
                p.id = Some(id);
                ContentItem::PracticeCode(p)
            }
            ContentItem::Mcq(mut q) => {
                q.id = Some(id);
                ContentItem::Mcq(q)
            }
        }
    }

    fn rejected(what: &str) -> ApiError {
        ApiError::Rejected(format!("{what} failed"))
    }

    #[async_trait]
    impl LmsApi for FakeLmsApi {
        async fn list_objectives(&self, scope: &ObjectiveScope) -> Result<Vec<Objective>, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push("list_objectives".into());
            Ok(st.objectives.iter().filter(|(s, _)| s == scope).map(|(_, o)| o.clone()).collect())
        }

        async fn create_objective(&self, module_id: &str, draft: &ObjectiveDraft) -> Result<Objective, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.next_id += 1;
            let obj = Objective {
                id: Some(ItemId(format!("obj-{}", st.next_id))),
                title: draft.title.clone(),
                description: draft.description.clone(),
                min_duration: draft.min_duration,
                ..Objective::default()
            };
            st.calls.push(format!("create_objective {module_id}"));
            st.objectives.push((ObjectiveScope::Module(module_id.into()), obj.clone()));
            Ok(obj)
        }

        async fn update_objective(&self, id: &ItemId, draft: &ObjectiveDraft) -> Result<(), ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("update_objective {id}"));
            match st.objectives.iter_mut().find(|(_, o)| o.id.as_ref() == Some(id)) {
                Some((_, o)) => {
                    o.title = draft.title.clone();
                    o.description = draft.description.clone();
                    o.min_duration = draft.min_duration;
                    Ok(())
                }
                None => Err(ApiError::Status { status: 404, message: "objective not found".into() }),
            }
        }

        async fn delete_objective(&self, id: &ItemId) -> Result<(), ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("delete_objective {id}"));
            st.objectives.retain(|(_, o)| o.id.as_ref() != Some(id));
            Ok(())
        }

        async fn list_content(&self, kind: ContentKind, objective_id: &ItemId) -> Result<Vec<ContentItem>, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("list {kind} {objective_id}"));
            if st.fail_lists.contains(&kind) {
                return Err(rejected("list"));
            }
            Ok(st.content.get(&(kind, objective_id.clone())).cloned().unwrap_or_default())
        }

        async fn create_content(&self, objective_id: &ItemId, item: &ContentItem) -> Result<Option<ItemId>, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.create_calls += 1;
            let n = st.create_calls;
            st.calls.push(format!("create {} {objective_id}", item.kind()));
            if st.fail_creates.contains(&n) {
                return Err(rejected("create"));
            }
            st.next_id += 1;
            let id = ItemId(format!("srv-{}", st.next_id));
            let stored = with_id(item.clone(), id.clone());
            st.content.entry((item.kind(), objective_id.clone())).or_default().push(stored);
            Ok(Some(id))
        }

        async fn update_content(&self, id: &ItemId, item: &ContentItem) -> Result<(), ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("update {} {id}", item.kind()));
            for ((kind, _), items) in st.content.iter_mut() {
                if *kind != item.kind() {
                    continue;
                }
                if let Some(slot) = items.iter_mut().find(|i| i.id() == Some(id)) {
                    *slot = item.clone();
                    return Ok(());
                }
            }
            Err(ApiError::Status { status: 404, message: "not found".into() })
        }

        async fn delete_content(&self, kind: ContentKind, id: &ItemId) -> Result<(), ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("delete {kind} {id}"));
            if st.fail_deletes {
                return Err(rejected("delete"));
            }
            for ((k, _), items) in st.content.iter_mut() {
                if *k == kind {
                    items.retain(|i| i.id() != Some(id));
                }
            }
            Ok(())
        }

        async fn upload_file(&self, file: FileUpload, folder: &str) -> Result<UploadedFile, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("upload {folder}/{}", file.name));
            if st.fail_uploads {
                return Err(rejected("upload"));
            }
            let key = format!("{folder}/{}", file.name);
            Ok(UploadedFile {
                url: format!("https://bucket.s3.amazonaws.com/{key}"),
                key,
                original_name: file.name.clone(),
                size: file.size(),
                mime_type: file.mime_type.clone(),
            })
        }

        async fn delete_file(&self, key: &str) -> Result<(), ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push(format!("delete_file {key}"));
            if st.fail_file_deletes {
                return Err(rejected("delete_file"));
            }
            Ok(())
        }

        async fn all_resources(&self, filters: &ResourceFilters) -> Result<Vec<Resource>, ApiError> {
            let mut st = self.state.lock().unwrap();
            st.calls.push("all_resources".into());
            Ok(st
                .resources
                .iter()
                .filter(|r| filters.kind.map_or(true, |k| r.kind == k))
                .filter(|r| filters.for_whom.map_or(true, |w| r.for_whom == w))
                .cloned()
                .collect())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unsuccessful_envelope_carries_backend_message() {
        let env: Envelope<serde_json::Value> =
            serde_json::from_value(json!({"success": false, "message": "Objective not found"})).unwrap();
        match env.into_result() {
            Err(ApiError::Rejected(m)) => assert_eq!(m, "Objective not found"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn upload_metadata_uses_backend_field_names() {
        let env: Envelope<UploadedFile> = serde_json::from_value(json!({
            "success": true,
            "data": {"url": "https://b.s3.amazonaws.com/k", "key": "k", "originalName": "a.pdf", "size": 12, "mimeType": "application/pdf"}
        }))
        .unwrap();
        let f = env.into_result().unwrap().unwrap();
        assert_eq!(f.original_name, "a.pdf");
        assert_eq!(f.size, 12);
    }

    #[test]
    fn error_bodies_yield_readable_messages() {
        assert_eq!(extract_message(r#"{"message":"nope"}"#).as_deref(), Some("nope"));
        assert_eq!(extract_message(r#"{"error":"bad"}"#).as_deref(), Some("bad"));
        assert_eq!(extract_message("<html>"), None);
    }
}
