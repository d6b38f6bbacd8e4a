use serde::Deserialize;
use tracing::warn;

use souk_core::actions::ProtocolAction;
use souk_core::session::Turn;

use crate::llm::{ChatMessage, CompletionOptions, LlmClient};

/// Verdict for one utterance. `action: None` with a reply means the model
/// answered conversationally; `None` without a reply means classification
/// failed and the turn is a no-op.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassifyOutcome {
    pub action: Option<ProtocolAction>,
    pub reply: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClassifierVerdict {
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    response: Option<String>,
}

/// Maps an utterance to one of the supported protocol actions, or to none.
///
/// Only the single most recent prior turn is included as context; more
/// history measurably degrades classification. The outcome is advisory —
/// the orchestrator owns ordering validity.
#[derive(Clone, Debug, Default)]
pub struct ActionClassifier;

impl ActionClassifier {
    pub fn new() -> Self {
        Self
    }

    pub async fn classify(
        &self,
        llm: &dyn LlmClient,
        utterance: &str,
        previous_turn: Option<&Turn>,
    ) -> ClassifyOutcome {
        let mut messages = vec![
            ChatMessage::system(format!(
                "Decide whether the user's message maps to one of these actions: {}.",
                action_catalog()
            )),
            ChatMessage::system(
                "Answer with a JSON object {\"action\": \"<action>\" | null, \"response\": \"<text>\"}. \
                 Set `action` only when the message clearly matches one of the listed actions; \
                 otherwise set it to null and put a conversational answer in `response`.",
            ),
            ChatMessage::system(
                "When asked to plan a trip or build an itinerary, ask for preferences \
                 (accommodation type, dates, destination, party size, dietary needs) instead of \
                 picking an action.",
            ),
        ];
        if let Some(turn) = previous_turn {
            messages.push(ChatMessage::from_turn(turn));
        }
        messages.push(ChatMessage::user(utterance));

        let raw = match llm.complete(&messages, CompletionOptions::structured()).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(event_name = "agent.classifier.llm_failed", error = %error, "classification failed; treating as no action");
                return ClassifyOutcome::default();
            }
        };

        match serde_json::from_str::<ClassifierVerdict>(&raw) {
            Ok(verdict) => ClassifyOutcome {
                action: verdict.action.as_deref().and_then(ProtocolAction::parse),
                reply: verdict.response.filter(|reply| !reply.trim().is_empty()),
            },
            Err(error) => {
                warn!(event_name = "agent.classifier.unparsable", error = %error, "classifier output was not valid JSON; treating as no action");
                ClassifyOutcome::default()
            }
        }
    }
}

fn action_catalog() -> String {
    ProtocolAction::descriptions()
        .iter()
        .map(|(action, description)| format!("`{action}` — {description}"))
        .collect::<Vec<_>>()
        .join("; ")
}
