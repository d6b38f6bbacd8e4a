use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use souk_core::actions::{OrderingViolation, ProtocolAction};
use souk_core::registry::NetworkRegistry;
use souk_core::schema::SchemaRegistry;
use souk_core::session::{SessionState, Turn};

use crate::classifier::ActionClassifier;
use crate::composer::PayloadComposer;
use crate::compressor::compress_catalog;
use crate::context::ContextBuilder;
use crate::extractor::ProfileExtractor;
use crate::llm::LlmClient;
use crate::narrator::Narrator;
use crate::network::NetworkClient;

const FALLBACK_REPLY: &str =
    "I can help you search for services, pick an item, and place the order. What are you looking for?";

/// Result of one fully processed incoming message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnOutcome {
    pub status: bool,
    pub message: String,
}

impl TurnOutcome {
    fn ok(message: impl Into<String>) -> Self {
        Self { status: true, message: message.into() }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self { status: false, message: message.into() }
    }
}

/// Sequences one turn through the pipeline:
/// classify → ordering guard → resolve schema → build context → compose →
/// network call → compress (search only) → narrate.
///
/// Stages are strictly sequential; any failure short-circuits the rest and
/// yields a user-facing failure message without retry. Failed turns never
/// touch the session: profile, history, and order state are committed only
/// after narration succeeds.
pub struct TurnOrchestrator {
    llm: Arc<dyn LlmClient>,
    network: Arc<dyn NetworkClient>,
    registry: Arc<NetworkRegistry>,
    schemas: SchemaRegistry,
    classifier: ActionClassifier,
    composer: PayloadComposer,
    narrator: Narrator,
    extractor: ProfileExtractor,
}

impl TurnOrchestrator {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        network: Arc<dyn NetworkClient>,
        registry: Arc<NetworkRegistry>,
    ) -> Self {
        Self {
            llm,
            network,
            registry,
            schemas: SchemaRegistry::standard(),
            classifier: ActionClassifier::new(),
            composer: PayloadComposer::new(),
            narrator: Narrator::new(),
            extractor: ProfileExtractor::new(),
        }
    }

    pub async fn handle_message(&self, session: &mut SessionState, text: &str) -> TurnOutcome {
        let session_id = session.session_id.clone();
        info!(
            event_name = "agent.turn.received",
            session_id = %session_id,
            "processing incoming message"
        );

        let verdict = self.classifier.classify(self.llm.as_ref(), text, session.last_turn()).await;

        let Some(action) = verdict.action else {
            // Conversational turn: relay the classifier's own reply.
            let reply = verdict.reply.unwrap_or_else(|| FALLBACK_REPLY.to_string());
            session.push_turn(Turn::user(text));
            session.push_turn(Turn::assistant(reply.clone()));
            return TurnOutcome::ok(reply);
        };

        info!(
            event_name = "agent.turn.classified",
            session_id = %session_id,
            action = %action,
            "utterance classified"
        );

        match action {
            ProtocolAction::ClearChat => {
                session.clear_chat();
                return TurnOutcome::ok(
                    "Conversation cleared. What would you like to do next?",
                );
            }
            ProtocolAction::ClearAll => {
                session.clear_all();
                return TurnOutcome::ok(
                    "Conversation and profile cleared. We are starting fresh.",
                );
            }
            _ => {}
        }

        // The classifier is advisory; order validity is decided here.
        if let Err(violation) = session.progress.permits(action) {
            warn!(
                event_name = "agent.turn.ordering_rejected",
                session_id = %session_id,
                action = %action,
                error = %violation,
                "action rejected by ordering guard"
            );
            return TurnOutcome::failed(ordering_message(&violation));
        }

        // Learn profile details before composing so the payload can use them.
        // Merged into a scratch copy; the session sees it only on success.
        let extraction =
            self.extractor.extract(self.llm.as_ref(), text, &session.profile).await;
        let mut profile = session.profile.clone();
        profile.merge(&extraction.data);

        let schema = self.schemas.resolve(action);

        let context_builder = ContextBuilder::new(&self.registry);
        let (envelope, policy) = match context_builder.build(text, action, session) {
            Ok(built) => built,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.context_failed",
                    session_id = %session_id,
                    error = %error,
                    "context build failed"
                );
                return TurnOutcome::failed(
                    "I couldn't tell which service you mean. Could you rephrase what you are \
                     looking for?",
                );
            }
        };

        let request = match self
            .composer
            .compose(
                self.llm.as_ref(),
                &schema,
                &envelope,
                policy,
                &profile,
                session.recent_history(8),
                text,
            )
            .await
        {
            Ok(request) => request,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.compose_failed",
                    session_id = %session_id,
                    error = %error,
                    "payload composition failed"
                );
                return TurnOutcome::failed(
                    "I couldn't prepare the network request for that. Please try rephrasing \
                     your message.",
                );
            }
        };

        info!(
            event_name = "agent.turn.calling_network",
            session_id = %session_id,
            url = %request.url,
            "sending protocol request"
        );

        let response = match self
            .network
            .call(&request.url, &request.method, &request.body, &request.headers)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(
                    event_name = "agent.turn.network_failed",
                    session_id = %session_id,
                    error = %error,
                    "network call failed"
                );
                return TurnOutcome::failed(format!("Failed to reach the network: {error}"));
            }
        };

        let narration_input: Value = if action == ProtocolAction::Search {
            let compressed = compress_catalog(&response);
            serde_json::to_value(&compressed).unwrap_or(response)
        } else {
            response
        };

        let narration = self
            .narrator
            .narrate(
                self.llm.as_ref(),
                action,
                &narration_input,
                session.recent_history(8),
                &profile,
            )
            .await;

        if !narration.status {
            return TurnOutcome::failed(narration.message);
        }

        // Success: commit the turn to session state.
        session.profile = profile;
        session.progress = session.progress.advance(action);
        session.transaction_id = if action == ProtocolAction::Confirm {
            None
        } else {
            Some(envelope.transaction_id.clone())
        };
        session.push_turn(Turn::user(text));
        session.push_turn(Turn::assistant(narration.message.clone()));

        info!(
            event_name = "agent.turn.completed",
            session_id = %session_id,
            action = %action,
            "turn completed"
        );

        TurnOutcome::ok(narration.message)
    }
}

fn ordering_message(violation: &OrderingViolation) -> String {
    let hint = match violation.required {
        ProtocolAction::Search => "Start by searching for what you need.",
        ProtocolAction::Select => "Pick one of the items from the search results first.",
        ProtocolAction::Init => "Initiate the order with your billing details first.",
        _ => "Complete the previous step first.",
    };
    format!("We can't {} yet. {}", violation.action, hint)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use souk_core::actions::TransactionProgress;
    use souk_core::registry::NetworkRegistry;
    use souk_core::session::{SessionState, Turn};

    use super::TurnOrchestrator;
    use crate::llm::testing::ScriptedLlm;
    use crate::network::testing::ScriptedNetwork;

    fn registry() -> Arc<NetworkRegistry> {
        Arc::new(NetworkRegistry::builtin("bap.test", "https://bap.test"))
    }

    fn search_response() -> serde_json::Value {
        json!({
            "responses": [ {
                "context": { "bpp_id": "bpp.hotels.example", "bpp_uri": "https://bpp.hotels.example" },
                "message": { "catalog": { "providers": [ {
                    "id": "provider-1",
                    "descriptor": { "name": "Mountain Lodge" },
                    "items": [ { "id": "item-1", "descriptor": { "name": "Deluxe Room" } } ]
                } ] } }
            } ]
        })
    }

    #[tokio::test]
    async fn non_action_message_returns_the_classifier_reply() {
        let llm = Arc::new(ScriptedLlm::single(
            r#"{"action":null,"response":"Hello! Ask me to find hotels or chargers."}"#,
        ));
        let network = Arc::new(ScriptedNetwork::responding(json!({})));
        let orchestrator = TurnOrchestrator::new(llm, network.clone(), registry());
        let mut session = SessionState::new("wa:+15550001111");

        let outcome = orchestrator.handle_message(&mut session, "hi").await;

        assert!(outcome.status);
        assert!(outcome.message.contains("Hello!"));
        assert!(network.calls.lock().expect("calls").is_empty());
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn confirm_without_init_is_rejected_before_composition() {
        let llm = Arc::new(ScriptedLlm::single(r#"{"action":"confirm","response":null}"#));
        let network = Arc::new(ScriptedNetwork::responding(json!({})));
        let orchestrator = TurnOrchestrator::new(llm.clone(), network.clone(), registry());
        let mut session = SessionState::new("wa:+15550001111");
        session.progress = TransactionProgress::Selected;

        let outcome = orchestrator.handle_message(&mut session, "confirm my order").await;

        assert!(!outcome.status);
        assert!(outcome.message.contains("billing details"));
        // only the classification reached the model; nothing reached the wire
        assert_eq!(llm.prompts.lock().expect("prompts").len(), 1);
        assert!(network.calls.lock().expect("calls").is_empty());
        assert_eq!(session.progress, TransactionProgress::Selected);
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn end_to_end_search_composes_tagged_request_and_advances_progress() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"action":"search","response":null}"#.to_string()),
            Ok("{}".to_string()),
            Ok(r#"{"method":"POST","body":{"context":{},"message":{"intent":{"item":{"descriptor":{"name":"hotels"}}}}}}"#.to_string()),
            Ok("1. Mountain Lodge — Deluxe Room.".to_string()),
        ]));
        let network = Arc::new(ScriptedNetwork::responding(search_response()));
        let orchestrator = TurnOrchestrator::new(llm, network.clone(), registry());
        let mut session = SessionState::new("wa:+15550001111");

        let outcome = orchestrator
            .handle_message(&mut session, "find pet-friendly hotels near Bangalore")
            .await;

        assert!(outcome.status, "turn should succeed: {}", outcome.message);
        assert!(outcome.message.contains("Mountain Lodge"));
        assert!(outcome.message.contains("select"));

        let calls = network.calls.lock().expect("calls");
        assert_eq!(calls.len(), 1);
        let (url, method, body) = &calls[0];
        assert_eq!(url, "https://gateway.souk.example/hospitality/search");
        assert_eq!(method, "POST");

        let tags = body["message"]["intent"]["item"]["tags"][0]["list"]
            .as_array()
            .expect("tag list");
        assert!(tags.iter().any(|entry| {
            entry["descriptor"]["code"] == "pet-friendly" && entry["value"] == "yes"
        }));

        assert_eq!(session.progress, TransactionProgress::Searched);
        assert!(session.transaction_id.is_some());
        assert_eq!(session.history.len(), 2);
    }

    #[tokio::test]
    async fn confirm_turn_reports_order_id_and_closes_the_transaction() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"action":"confirm","response":null}"#.to_string()),
            Ok("{}".to_string()),
            Ok(r#"{"method":"POST","body":{"context":{},"message":{"order":{"items":[{"id":"item-1"}]}}}}"#.to_string()),
            Ok("Your stay at Mountain Lodge is booked.".to_string()),
        ]));
        let network = Arc::new(ScriptedNetwork::responding(
            json!({ "message": { "order": { "id": "ORD123" } } }),
        ));
        let orchestrator = TurnOrchestrator::new(llm, network, registry());
        let mut session = SessionState::new("wa:+15550001111");
        session.progress = TransactionProgress::Initialized;
        session.transaction_id = Some("txn-1".to_string());
        session.push_turn(Turn::assistant("Reply 'confirm' to place the order."));

        let outcome = orchestrator.handle_message(&mut session, "confirm the hotel order").await;

        assert!(outcome.status, "turn should succeed: {}", outcome.message);
        assert!(outcome.message.contains("ORD123"));
        assert!(outcome.message.contains("successfully"));
        assert_eq!(session.progress, TransactionProgress::Idle);
        assert!(session.transaction_id.is_none());
    }

    #[tokio::test]
    async fn network_failure_fails_the_turn_without_mutating_the_session() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"action":"search","response":null}"#.to_string()),
            Ok("{}".to_string()),
            Ok(r#"{"method":"POST","body":{"context":{},"message":{"intent":{}}}}"#.to_string()),
        ]));
        let network = Arc::new(ScriptedNetwork::failing("gateway unavailable"));
        let orchestrator = TurnOrchestrator::new(llm, network, registry());
        let mut session = SessionState::new("wa:+15550001111");

        let outcome = orchestrator.handle_message(&mut session, "find hotels nearby").await;

        assert!(!outcome.status);
        assert!(outcome.message.contains("gateway unavailable"));
        assert_eq!(session.progress, TransactionProgress::Idle);
        assert!(session.transaction_id.is_none());
        assert!(session.history.is_empty());
    }

    #[tokio::test]
    async fn clear_chat_resets_conversation_but_keeps_profile() {
        let llm = Arc::new(ScriptedLlm::single(r#"{"action":"clear_chat","response":null}"#));
        let network = Arc::new(ScriptedNetwork::responding(json!({})));
        let orchestrator = TurnOrchestrator::new(llm, network, registry());
        let mut session = SessionState::new("wa:+15550001111");
        session.profile.merge(&souk_core::profile::ProfileUpdate {
            name: Some("Alex".to_string()),
            ..Default::default()
        });
        session.push_turn(Turn::user("find hotels"));
        session.transaction_id = Some("txn-1".to_string());

        let outcome = orchestrator.handle_message(&mut session, "start over").await;

        assert!(outcome.status);
        assert!(session.history.is_empty());
        assert!(session.transaction_id.is_none());
        assert_eq!(session.profile.name, "Alex");
    }

    #[tokio::test]
    async fn unresolvable_domain_is_reported_not_guessed() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            Ok(r#"{"action":"search","response":null}"#.to_string()),
            Ok("{}".to_string()),
        ]));
        let network = Arc::new(ScriptedNetwork::responding(json!({})));
        let orchestrator = TurnOrchestrator::new(llm, network.clone(), registry());
        let mut session = SessionState::new("wa:+15550001111");

        let outcome = orchestrator.handle_message(&mut session, "find me something nice").await;

        assert!(!outcome.status);
        assert!(outcome.message.contains("rephrase"));
        assert!(network.calls.lock().expect("calls").is_empty());
    }
}
