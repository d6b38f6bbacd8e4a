use std::collections::HashMap;

use tokio::sync::RwLock;

use souk_core::session::SessionState;

use super::{RepositoryError, SessionRepository};

/// In-memory session store for tests and single-process demos.
#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, SessionState>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned())
    }

    async fn save(&self, session: &SessionState) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.session_id.clone(), session.clone());
        Ok(())
    }
}
