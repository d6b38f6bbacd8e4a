use serde_json::Value;
use tracing::warn;

use souk_core::actions::ProtocolAction;
use souk_core::profile::Profile;
use souk_core::session::Turn;

use crate::llm::{ChatMessage, CompletionOptions, LlmClient};

/// How many conversation turns the narrator may look back at.
const HISTORY_WINDOW: usize = 4;

const APOLOGY: &str =
    "Sorry, something went wrong while preparing your reply. Please try again.";

/// A narrated reply for the user. `status: false` means the turn failed and
/// `message` carries the best user-safe explanation available.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Narration {
    pub status: bool,
    pub message: String,
}

/// Turns protocol responses (or failures) into a single human-readable
/// message.
///
/// The response content is summarized by the model; the call-to-action that
/// follows it is appended deterministically from the action and the profile,
/// so the lifecycle prompts never depend on model output.
#[derive(Clone, Debug, Default)]
pub struct Narrator;

impl Narrator {
    pub fn new() -> Self {
        Self
    }

    pub async fn narrate(
        &self,
        llm: &dyn LlmClient,
        action: ProtocolAction,
        response: &Value,
        history: &[Turn],
        profile: &Profile,
    ) -> Narration {
        if !is_narratable(response) {
            return Narration {
                status: false,
                message: "The network returned an empty response. Please try again.".to_string(),
            };
        }

        let summary = self.summarize(llm, action, response, history).await;
        let call_to_action = call_to_action(action, response, profile);

        let message = match summary {
            Some(summary) if !summary.trim().is_empty() => {
                format!("{}\n\n{}", summary.trim(), call_to_action)
            }
            _ => {
                // Narration failure is a hard stop for the turn; the user
                // still gets an apologetic message rather than silence.
                return Narration { status: false, message: APOLOGY.to_string() };
            }
        };

        Narration { status: true, message }
    }

    /// Summarizes an error shape in plain language, excluding technical
    /// detail. Falls back to a generic message when the model fails too.
    pub async fn narrate_error(&self, llm: &dyn LlmClient, error_text: &str) -> Narration {
        let messages = vec![
            ChatMessage::system(
                "Explain the following problem to a shopper in one or two friendly sentences. \
                 No technical terms, no codes, no URLs.",
            ),
            ChatMessage::user(error_text.to_string()),
        ];

        match llm.complete(&messages, CompletionOptions::freeform()).await {
            Ok(summary) if !summary.trim().is_empty() => {
                Narration { status: false, message: summary.trim().to_string() }
            }
            Ok(_) => Narration { status: false, message: APOLOGY.to_string() },
            Err(error) => {
                warn!(event_name = "agent.narrator.error_summary_failed", error = %error, "error narration failed; using generic apology");
                Narration { status: false, message: APOLOGY.to_string() }
            }
        }
    }

    async fn summarize(
        &self,
        llm: &dyn LlmClient,
        action: ProtocolAction,
        response: &Value,
        history: &[Turn],
    ) -> Option<String> {
        let framing = match action {
            ProtocolAction::Search => {
                "List each offered item concisely: name, price, rating, location, and a one-line \
                 summary. Number the items so the user can pick one."
            }
            ProtocolAction::Select => {
                "Summarize the selected items with their prices and the order total so far."
            }
            ProtocolAction::Init => {
                "Summarize the drafted order: items, billing details on file, and total."
            }
            ProtocolAction::Confirm => "Summarize the confirmed order in one short paragraph.",
            _ => "Summarize the response in one short paragraph.",
        };

        let mut messages = vec![
            ChatMessage::system(
                "You are a shopping assistant reporting a commerce network response to the user. \
                 Write one compact message; plain text, no JSON.",
            ),
            ChatMessage::system(framing),
        ];
        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for turn in &history[start..] {
            messages.push(ChatMessage::from_turn(turn));
        }
        messages.push(ChatMessage::user(format!("The network response: {response}")));

        match llm.complete(&messages, CompletionOptions::freeform()).await {
            Ok(summary) => Some(summary),
            Err(error) => {
                warn!(event_name = "agent.narrator.summary_failed", error = %error, "response summarization failed");
                None
            }
        }
    }
}

fn is_narratable(response: &Value) -> bool {
    match response {
        Value::Object(map) => !map.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Null => false,
        Value::String(text) => !text.trim().is_empty(),
        _ => true,
    }
}

/// The lifecycle prompt appended after the summary. Deterministic on purpose:
/// what the user is asked to do next must not depend on model phrasing.
fn call_to_action(action: ProtocolAction, response: &Value, profile: &Profile) -> String {
    match action {
        ProtocolAction::Search => {
            "Reply with the item you would like to select.".to_string()
        }
        ProtocolAction::Select => {
            let missing = profile.missing_billing_fields();
            if missing.is_empty() {
                "Say 'proceed' when you are ready to initiate the order.".to_string()
            } else {
                format!(
                    "Before we can initiate the order, please share your billing details: {}. \
                     Then say 'proceed'.",
                    missing.join(", ")
                )
            }
        }
        ProtocolAction::Init => "Reply 'confirm' to place the order.".to_string(),
        ProtocolAction::Confirm => match find_order_id(response) {
            Some(order_id) => format!(
                "Your order {order_id} has been placed successfully. Send a new request whenever \
                 you want to start another order."
            ),
            None => {
                "Your order has been placed successfully. Send a new request whenever you want \
                 to start another order."
                    .to_string()
            }
        },
        ProtocolAction::ClearChat | ProtocolAction::ClearAll => String::new(),
    }
}

/// Finds the confirmed order identifier wherever the counterparty put it.
fn find_order_id(response: &Value) -> Option<String> {
    for path in [
        &["message", "order", "id"][..],
        &["message", "order_id"][..],
        &["order", "id"][..],
        &["order_id"][..],
    ] {
        let mut cursor = response;
        let mut found = true;
        for key in path {
            match cursor.get(key) {
                Some(next) => cursor = next,
                None => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            if let Some(id) = cursor.as_str() {
                return Some(id.to_string());
            }
        }
    }

    // Aggregated responses nest per-counterparty blocks.
    response
        .get("responses")
        .and_then(Value::as_array)
        .and_then(|blocks| blocks.iter().find_map(find_order_id))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use souk_core::actions::ProtocolAction;
    use souk_core::profile::Profile;

    use super::{find_order_id, Narrator};
    use crate::llm::testing::ScriptedLlm;

    fn complete_profile() -> Profile {
        Profile {
            name: "Alex".to_string(),
            email: "alex@example.com".to_string(),
            phone: "+919999999999".to_string(),
            ..Profile::default()
        }
    }

    #[tokio::test]
    async fn empty_response_fails_without_calling_the_model() {
        let llm = ScriptedLlm::new(Vec::new());
        let narration = Narrator::new()
            .narrate(&llm, ProtocolAction::Search, &json!({}), &[], &Profile::default())
            .await;

        assert!(!narration.status);
        assert!(narration.message.contains("empty response"));
        assert!(llm.prompts.lock().expect("log").is_empty());
    }

    #[tokio::test]
    async fn search_narration_prompts_for_selection() {
        let llm = ScriptedLlm::single("1. Mountain Lodge — $120/night, 4.5 stars, Bangalore.");
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Search,
                &json!({ "providers": [ { "id": "p1" } ] }),
                &[],
                &Profile::default(),
            )
            .await;

        assert!(narration.status);
        assert!(narration.message.contains("Mountain Lodge"));
        assert!(narration.message.contains("Reply with the item you would like to select."));
    }

    #[tokio::test]
    async fn select_narration_requests_missing_billing_details() {
        let llm = ScriptedLlm::single("You picked the Deluxe Room at Mountain Lodge.");
        let profile = Profile { name: "Alex".to_string(), ..Profile::default() };
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Select,
                &json!({ "message": { "order": {} } }),
                &[],
                &profile,
            )
            .await;

        assert!(narration.status);
        assert!(narration.message.contains("billing details"));
        assert!(narration.message.contains("email"));
        assert!(narration.message.contains("phone"));
        assert!(!narration.message.contains("name,"));
    }

    #[tokio::test]
    async fn select_narration_with_complete_profile_skips_billing_request() {
        let llm = ScriptedLlm::single("You picked the Deluxe Room at Mountain Lodge.");
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Select,
                &json!({ "message": { "order": {} } }),
                &[],
                &complete_profile(),
            )
            .await;

        assert!(narration.status);
        assert!(!narration.message.contains("billing details"));
        assert!(narration.message.contains("proceed"));
    }

    #[tokio::test]
    async fn init_narration_prompts_for_confirmation() {
        let llm = ScriptedLlm::single("Your order draft is ready: 1x Deluxe Room, $120.");
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Init,
                &json!({ "message": { "order": { "id": "draft" } } }),
                &[],
                &complete_profile(),
            )
            .await;

        assert!(narration.status);
        assert!(narration.message.contains("Reply 'confirm' to place the order."));
    }

    #[tokio::test]
    async fn confirm_narration_states_order_id_and_success() {
        let llm = ScriptedLlm::single("Your stay at Mountain Lodge is booked.");
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Confirm,
                &json!({ "order_id": "ORD123" }),
                &[],
                &complete_profile(),
            )
            .await;

        assert!(narration.status);
        assert!(narration.message.contains("ORD123"));
        assert!(narration.message.contains("successfully"));
        assert!(narration.message.contains("new request"));
    }

    #[tokio::test]
    async fn narration_failure_yields_apology_not_silence() {
        let llm = ScriptedLlm::failing("model unavailable");
        let narration = Narrator::new()
            .narrate(
                &llm,
                ProtocolAction::Search,
                &json!({ "providers": [] }),
                &[],
                &Profile::default(),
            )
            .await;

        assert!(!narration.status);
        assert!(narration.message.contains("Sorry"));
    }

    #[tokio::test]
    async fn error_narration_excludes_technical_detail_via_prompt() {
        let llm = ScriptedLlm::single("The booking service is busy right now; please retry.");
        let narration = Narrator::new()
            .narrate_error(&llm, "network call failed with status 502: upstream unavailable")
            .await;

        assert!(!narration.status);
        assert_eq!(narration.message, "The booking service is busy right now; please retry.");
    }

    #[tokio::test]
    async fn error_narration_falls_back_to_generic_apology() {
        let llm = ScriptedLlm::failing("model unavailable");
        let narration = Narrator::new().narrate_error(&llm, "boom").await;

        assert!(!narration.status);
        assert!(narration.message.contains("Sorry"));
    }

    #[test]
    fn order_id_is_found_in_nested_shapes() {
        assert_eq!(
            find_order_id(&json!({ "message": { "order": { "id": "O-1" } } })).as_deref(),
            Some("O-1")
        );
        assert_eq!(find_order_id(&json!({ "order_id": "O-2" })).as_deref(), Some("O-2"));
        assert_eq!(
            find_order_id(&json!({ "responses": [ { "message": { "order": { "id": "O-3" } } } ] }))
                .as_deref(),
            Some("O-3")
        );
        assert!(find_order_id(&json!({ "message": {} })).is_none());
    }
}
