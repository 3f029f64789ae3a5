use crate::config::Config;
use crate::session::SpeechSession;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Explicit cache of live sessions, keyed by session id.
///
/// Owned by [`AppState`] rather than living in a process-wide map; eviction
/// is explicit (`remove` on stop), never implicit.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<SpeechSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Fails if the id is already live.
    pub async fn insert(&self, session: Arc<SpeechSession>) -> Result<(), Arc<SpeechSession>> {
        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(session.session_id()) {
            return Err(session);
        }
        sessions.insert(session.session_id().to_string(), session);
        Ok(())
    }

    pub async fn get(&self, session_id: &str) -> Option<Arc<SpeechSession>> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Evict a session from the registry. The caller still owns the returned
    /// handle and is responsible for closing it.
    pub async fn remove(&self, session_id: &str) -> Option<Arc<SpeechSession>> {
        self.sessions.write().await.remove(session_id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            registry: Arc::new(SessionRegistry::new()),
            config: Arc::new(config),
        }
    }
}
