use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use souk_core::session::{Turn, TurnRole};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }

    pub fn from_turn(turn: &Turn) -> Self {
        let role = match turn.role {
            TurnRole::User => ChatRole::User,
            TurnRole::Assistant => ChatRole::Assistant,
            TurnRole::System => ChatRole::System,
        };
        Self { role, content: turn.text.clone() }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CompletionOptions {
    /// Request temperature-zero sampling.
    pub deterministic: bool,
    /// Request a single JSON object as output.
    pub json_object: bool,
}

impl CompletionOptions {
    pub fn structured() -> Self {
        Self { deterministic: true, json_object: true }
    }

    pub fn freeform() -> Self {
        Self { deterministic: true, json_object: false }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("llm request timed out after {0}s")]
    Timeout(u64),
    #[error("llm transport failure: {0}")]
    Transport(String),
    #[error("llm returned malformed output: {0}")]
    Malformed(String),
}

/// Seam to the language-model capability. Implementations live at the edge
/// (HTTP client in the server crate, scripted mocks in tests) and must bound
/// every call with a timeout.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, LlmError>;
}

/// Scripted doubles for exercising the pipeline without a live model.
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{ChatMessage, CompletionOptions, LlmClient, LlmError};

    /// Replays a fixed script of completions, one per call, and records the
    /// prompts it was given.
    pub struct ScriptedLlm {
        responses: Mutex<Vec<Result<String, LlmError>>>,
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedLlm {
        pub fn new(responses: Vec<Result<String, LlmError>>) -> Self {
            let mut reversed = responses;
            reversed.reverse();
            Self { responses: Mutex::new(reversed), prompts: Mutex::new(Vec::new()) }
        }

        pub fn single(response: &str) -> Self {
            Self::new(vec![Ok(response.to_string())])
        }

        pub fn failing(message: &str) -> Self {
            Self::new(vec![Err(LlmError::Transport(message.to_string()))])
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            messages: &[ChatMessage],
            _options: CompletionOptions,
        ) -> Result<String, LlmError> {
            self.prompts.lock().expect("prompt log").push(messages.to_vec());
            self.responses
                .lock()
                .expect("script")
                .pop()
                .unwrap_or_else(|| Err(LlmError::Transport("script exhausted".to_string())))
        }
    }
}
