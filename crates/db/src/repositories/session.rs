use serde_json::Value;
use sqlx::Row;

use souk_core::actions::TransactionProgress;
use souk_core::profile::Profile;
use souk_core::session::{SessionState, Turn};

use super::{RepositoryError, SessionRepository};
use crate::DbPool;

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn load(&self, session_id: &str) -> Result<Option<SessionState>, RepositoryError> {
        let row = sqlx::query(
            "SELECT session_id, profile, transaction_id, progress, history
             FROM sessions WHERE session_id = ?",
        )
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let profile: Profile = decode_json(&row.get::<String, _>("profile"), "profile")?;
        let history: Vec<Turn> = decode_json(&row.get::<String, _>("history"), "history")?;
        let progress = progress_from_text(&row.get::<String, _>("progress"));

        Ok(Some(SessionState {
            session_id: row.get::<String, _>("session_id"),
            profile,
            transaction_id: row.get::<Option<String>, _>("transaction_id"),
            progress,
            history,
        }))
    }

    async fn save(&self, session: &SessionState) -> Result<(), RepositoryError> {
        let profile = encode_json(&session.profile, "profile")?;
        let history = encode_json(&session.history, "history")?;
        let progress = progress_to_text(session.progress);

        // Whole-row upsert: a turn is committed atomically or not at all.
        sqlx::query(
            "INSERT INTO sessions (session_id, profile, transaction_id, progress, history)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(session_id) DO UPDATE SET
                 profile = excluded.profile,
                 transaction_id = excluded.transaction_id,
                 progress = excluded.progress,
                 history = excluded.history,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        )
        .bind(&session.session_id)
        .bind(profile)
        .bind(&session.transaction_id)
        .bind(progress)
        .bind(history)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(
    raw: &str,
    field: &str,
) -> Result<T, RepositoryError> {
    serde_json::from_str(raw)
        .map_err(|error| RepositoryError::Decode(format!("sessions.{field}: {error}")))
}

fn encode_json<T: serde::Serialize>(value: &T, field: &str) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|error| RepositoryError::Decode(format!("sessions.{field}: {error}")))
}

fn progress_to_text(progress: TransactionProgress) -> String {
    serde_json::to_value(progress)
        .ok()
        .and_then(|value| value.as_str().map(str::to_string))
        .unwrap_or_else(|| "idle".to_string())
}

fn progress_from_text(raw: &str) -> TransactionProgress {
    serde_json::from_value(Value::String(raw.to_string())).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use souk_core::actions::TransactionProgress;
    use souk_core::profile::ProfileUpdate;
    use souk_core::session::{SessionState, Turn};

    use super::{progress_from_text, progress_to_text, SqlSessionRepository};
    use crate::repositories::SessionRepository;
    use crate::{connect_with_settings, migrations};

    async fn repository() -> SqlSessionRepository {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        SqlSessionRepository::new(pool)
    }

    fn session_fixture() -> SessionState {
        let mut session = SessionState::new("whatsapp:+15550001111");
        session.profile.merge(&ProfileUpdate {
            name: Some("Alex".to_string()),
            email: Some("alex@example.com".to_string()),
            ..ProfileUpdate::default()
        });
        session.transaction_id = Some("txn-1".to_string());
        session.progress = TransactionProgress::Searched;
        session.push_turn(Turn::user("find hotels"));
        session.push_turn(Turn::assistant("1. Mountain Lodge"));
        session
    }

    #[tokio::test]
    async fn missing_session_loads_as_none() {
        let repo = repository().await;
        let loaded = repo.load("whatsapp:+19990000000").await.expect("load");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn session_round_trips_through_sql() {
        let repo = repository().await;
        let session = session_fixture();

        repo.save(&session).await.expect("save");
        let loaded = repo.load(&session.session_id).await.expect("load").expect("present");

        assert_eq!(loaded, session);
    }

    #[tokio::test]
    async fn save_is_a_whole_row_upsert() {
        let repo = repository().await;
        let mut session = session_fixture();
        repo.save(&session).await.expect("first save");

        session.progress = TransactionProgress::Selected;
        session.push_turn(Turn::user("select the first one"));
        repo.save(&session).await.expect("second save");

        let loaded = repo.load(&session.session_id).await.expect("load").expect("present");
        assert_eq!(loaded.progress, TransactionProgress::Selected);
        assert_eq!(loaded.history.len(), 3);
    }

    #[test]
    fn progress_text_round_trips() {
        for progress in [
            TransactionProgress::Idle,
            TransactionProgress::Searched,
            TransactionProgress::Selected,
            TransactionProgress::Initialized,
        ] {
            assert_eq!(progress_from_text(&progress_to_text(progress)), progress);
        }
    }

    #[test]
    fn unknown_progress_text_defaults_to_idle() {
        assert_eq!(progress_from_text("garbled"), TransactionProgress::Idle);
    }
}
