use serde::{Deserialize, Serialize};

use crate::actions::TransactionProgress;
use crate::profile::Profile;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
    System,
}

/// One conversation turn as stored in session history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: TurnRole::Assistant, text: text.into() }
    }
}

/// Everything the agent knows about one user session, keyed by the sender's
/// channel identity. One instance per session; no process-wide state.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: String,
    pub profile: Profile,
    /// Stable for the whole lifecycle of one order; `None` between orders.
    pub transaction_id: Option<String>,
    pub progress: TransactionProgress,
    pub history: Vec<Turn>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: session_id.into(), ..Self::default() }
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    pub fn last_turn(&self) -> Option<&Turn> {
        self.history.last()
    }

    /// The most recent `limit` turns, oldest first.
    pub fn recent_history(&self, limit: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(limit);
        &self.history[start..]
    }

    /// Discards the running conversation and any in-flight order, keeping
    /// the accumulated profile.
    pub fn clear_chat(&mut self) {
        self.history.clear();
        self.transaction_id = None;
        self.progress = TransactionProgress::Idle;
    }

    /// Discards conversation, in-flight order, and profile.
    pub fn clear_all(&mut self) {
        self.clear_chat();
        self.profile = Profile::default();
    }
}
