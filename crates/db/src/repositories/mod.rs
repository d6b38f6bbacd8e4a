use async_trait::async_trait;
use thiserror::Error;

use souk_core::session::SessionState;

pub mod memory;
pub mod session;

pub use memory::InMemorySessionRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

/// Persisted per-session state: profile, running transaction, and the
/// conversation buffer, keyed by the sender's channel identity.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, RepositoryError>;
    async fn save(&self, session: &SessionState) -> Result<(), RepositoryError>;
}
