//! Application state: service config, the LMS API client, and open editor sessions.
//!
//! Sessions are keyed by a random id. The REST screen and the WebSocket panel can both
//! address the same session, so its content is never duplicated between surfaces.
//!
//! The registry is bounded in time: every lookup refreshes a session's last-use stamp,
//! WebSocket connections pin the sessions they are bound to, and `evict_idle` drops
//! unpinned sessions that went quiet.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::api::{ApiError, HttpLmsApi, LmsApi};
use crate::config::{load_service_config_from_env, ServiceConfig};
use crate::error::{ContentError, ContentResult};
use crate::session::EditorSession;

struct Registered {
    session: EditorSession,
    last_used: Instant,
    /// WebSocket connections currently bound to this session.
    attached: usize,
}

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<ServiceConfig>,
    pub api: Arc<dyn LmsApi>,
    sessions: Arc<RwLock<HashMap<String, Registered>>>,
}

impl AppState {
    /// Build state from env: load config, then the HTTP client for the LMS backend.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Result<Self, ApiError> {
        let cfg = load_service_config_from_env();
        let api = HttpLmsApi::from_config(&cfg)?;
        info!(
            target: "objective_content",
            api_base_url = %cfg.api_base_url,
            proxy_base = %cfg.proxy_base(),
            authenticated = cfg.api_token.is_some(),
            session_idle_secs = cfg.session_idle_secs,
            "LMS backend configured"
        );
        Ok(Self::with_api(cfg, Arc::new(api)))
    }

    pub fn with_api(cfg: ServiceConfig, api: Arc<dyn LmsApi>) -> Self {
        Self {
            cfg: Arc::new(cfg),
            api,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// A fresh idle session, registered under a new id.
    pub async fn create_session(&self) -> EditorSession {
        let id = Uuid::new_v4().to_string();
        let session = EditorSession::new(id.clone(), self.api.clone(), self.cfg.clone());
        let entry = Registered { session: session.clone(), last_used: Instant::now(), attached: 0 };
        self.sessions.write().await.insert(id, entry);
        session
    }

    /// Look a session up and mark it as used.
    pub async fn session(&self, id: &str) -> ContentResult<EditorSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| ContentError::NotFound(format!("Session {id}")))?;
        entry.last_used = Instant::now();
        Ok(entry.session.clone())
    }

    pub async fn remove_session(&self, id: &str) -> bool {
        self.sessions.write().await.remove(id).is_some()
    }

    /// Pin a session to a WebSocket connection so idle eviction leaves it alone.
    pub async fn attach(&self, id: &str) -> ContentResult<EditorSession> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions
            .get_mut(id)
            .ok_or_else(|| ContentError::NotFound(format!("Session {id}")))?;
        entry.attached += 1;
        entry.last_used = Instant::now();
        Ok(entry.session.clone())
    }

    /// Release a connection's pin. The session stays registered.
    pub async fn detach(&self, id: &str) {
        if let Some(entry) = self.sessions.write().await.get_mut(id) {
            entry.attached = entry.attached.saturating_sub(1);
            entry.last_used = Instant::now();
        }
    }

    /// Drop every unpinned session unused for at least `max_idle`. Returns how many went.
    pub async fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|id, entry| {
            let keep = entry.attached > 0 || entry.last_used.elapsed() < max_idle;
            if !keep {
                debug!(target: "objective_content", session = %id, "Evicting idle session");
            }
            keep
        });
        before - sessions.len()
    }

    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Periodically evict idle sessions for the lifetime of the process.
pub fn spawn_session_reaper(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    let max_idle = Duration::from_secs(state.cfg.session_idle_secs);
    let period = (max_idle / 4).max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(period);
        loop {
            tick.tick().await;
            let evicted = state.evict_idle(max_idle).await;
            if evicted > 0 {
                info!(target: "objective_content", evicted, "Idle sessions evicted");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::fake::FakeLmsApi;

    fn state() -> AppState {
        AppState::with_api(ServiceConfig::default(), Arc::new(FakeLmsApi::with_objective()))
    }

    #[tokio::test]
    async fn idle_sessions_are_evicted_unless_pinned() {
        let state = state();
        let loose = state.create_session().await;
        let pinned = state.create_session().await;
        state.attach(&pinned.id).await.unwrap();

        assert_eq!(state.evict_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(state.evict_idle(Duration::ZERO).await, 1);
        assert!(state.session(&loose.id).await.is_err());
        assert!(state.session(&pinned.id).await.is_ok());

        state.detach(&pinned.id).await;
        assert_eq!(state.evict_idle(Duration::ZERO).await, 1);
        assert_eq!(state.session_count().await, 0);
    }

    #[tokio::test]
    async fn attaching_an_unknown_session_fails() {
        let state = state();
        assert!(matches!(state.attach("nope").await, Err(ContentError::NotFound(_))));
        state.detach("nope").await;
    }
}
