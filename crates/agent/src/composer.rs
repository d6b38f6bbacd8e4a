use std::collections::BTreeMap;

use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::debug;

use souk_core::actions::ProtocolAction;
use souk_core::envelope::Envelope;
use souk_core::profile::Profile;
use souk_core::registry::DomainPolicy;
use souk_core::schema::RequestSchema;
use souk_core::session::Turn;

use crate::llm::{ChatMessage, CompletionOptions, LlmClient, LlmError};

/// How many conversation turns the composer may look back at.
const HISTORY_WINDOW: usize = 6;

/// A fully-formed request ready for the network call. Created once per turn
/// and discarded after the call completes.
#[derive(Clone, Debug, PartialEq)]
pub struct ProtocolRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub body: Value,
}

#[derive(Debug, Error)]
pub enum ComposeError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("composer returned invalid JSON: {0}")]
    InvalidJson(String),
    #[error("composed payload is missing `{0}`")]
    MissingField(&'static str),
}

/// Merges schema, envelope, profile, policy, and conversation into a protocol
/// request body, then runs the deterministic post-passes.
///
/// Precedence when sources disagree: schema structure < policy defaults <
/// domain guidance < profile < history < the explicit instruction. The
/// envelope always wins over any model-generated context block.
#[derive(Clone, Debug, Default)]
pub struct PayloadComposer;

impl PayloadComposer {
    pub fn new() -> Self {
        Self
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn compose(
        &self,
        llm: &dyn LlmClient,
        schema: &RequestSchema,
        envelope: &Envelope,
        policy: &DomainPolicy,
        profile: &Profile,
        history: &[Turn],
        instruction: &str,
    ) -> Result<ProtocolRequest, ComposeError> {
        let messages = self.prompt(schema, envelope, policy, profile, history, instruction);
        let raw = llm.complete(&messages, CompletionOptions::structured()).await?;

        let parsed: Value = serde_json::from_str(raw.trim())
            .map_err(|error| ComposeError::InvalidJson(error.to_string()))?;

        let method = parsed
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or("POST")
            .to_ascii_uppercase();

        let mut body = match parsed.get("body") {
            Some(Value::Object(map)) => Value::Object(map.clone()),
            // Some models answer with the body at the top level.
            None if parsed.get("message").is_some() => parsed.clone(),
            _ => return Err(ComposeError::MissingField("body")),
        };

        // The generated context is never trusted; the authoritative envelope
        // replaces it wholesale before anything else happens.
        body["context"] = envelope.to_value();

        let Some(message) = body.get("message").cloned() else {
            return Err(ComposeError::MissingField("body.message"));
        };

        let mut message = message;
        apply_domain_guidance(&mut message, envelope.action, policy, instruction);
        let message = strip_empty(&message).unwrap_or_else(|| json!({}));
        if !message.is_object() {
            return Err(ComposeError::MissingField("body.message"));
        }
        body["message"] = message;

        let url = derive_url(&policy.endpoint, envelope.action);
        debug!(event_name = "agent.composer.request_ready", url = %url, method = %method, "composed protocol request");

        let mut headers = BTreeMap::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());

        Ok(ProtocolRequest { url, method, headers, body })
    }

    fn prompt(
        &self,
        schema: &RequestSchema,
        envelope: &Envelope,
        policy: &DomainPolicy,
        profile: &Profile,
        history: &[Turn],
        instruction: &str,
    ) -> Vec<ChatMessage> {
        let mut messages = vec![
            ChatMessage::system(format!(
                "Schema definition for `{}`: {}",
                schema.action, schema.template
            )),
            ChatMessage::system(
                "Build the request body for the last user message from the schema and the \
                 conversation. Answer with a JSON object \
                 {\"method\": \"POST\", \"body\": {\"context\": {}, \"message\": {}}}.",
            ),
            ChatMessage::system("A typical order flow is search > select > init > confirm."),
            ChatMessage::system(
                "Select items from the assistant's earlier search results. For select, init and \
                 confirm use the item `id`, never its name.",
            ),
            ChatMessage::system(format!(
                "Use these presets verbatim for the `context` block: {}",
                envelope.to_value()
            )),
        ];

        if !schema.required.is_empty() {
            messages.push(ChatMessage::system(format!(
                "These fields are required in the message: {}.",
                schema.required.join(", ")
            )));
        }

        if !policy.supported_tags.is_empty() {
            messages.push(ChatMessage::system(format!(
                "The network policy for this domain supports the search tags: {}. Use them to \
                 express user preferences.",
                policy.supported_tags.join(", ")
            )));
        }

        if policy.fulfillment_stops {
            messages.push(ChatMessage::system(
                "For this domain, searches must not use item.descriptor.name; prefer tag-based \
                 filtering. When searching by fulfillment there must be exactly two stops, one \
                 `check-in` and one `check-out`.",
            ));
        }

        if profile != &Profile::default() {
            let profile_json = serde_json::to_value(profile).unwrap_or(Value::Null);
            messages.push(ChatMessage::system(format!(
                "Known user profile, usable for billing details: {profile_json}"
            )));
        }

        let start = history.len().saturating_sub(HISTORY_WINDOW);
        for turn in &history[start..] {
            messages.push(ChatMessage::from_turn(turn));
        }

        messages.push(ChatMessage::user(instruction));
        messages
    }
}

/// The target URL is always derived, never left to generation.
pub fn derive_url(endpoint: &str, action: ProtocolAction) -> String {
    format!("{}/{}", endpoint.trim_end_matches('/'), action)
}

/// Removes empty strings, nulls, and empty containers from a JSON tree.
/// Returns `None` when the whole value collapses. Applying the pass twice
/// yields the same result as applying it once.
pub fn strip_empty(value: &Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(text) if text.trim().is_empty() => None,
        Value::Array(items) => {
            let cleaned: Vec<Value> = items.iter().filter_map(strip_empty).collect();
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Array(cleaned))
            }
        }
        Value::Object(map) => {
            let mut cleaned = Map::new();
            for (key, entry) in map {
                if let Some(kept) = strip_empty(entry) {
                    cleaned.insert(key.clone(), kept);
                }
            }
            if cleaned.is_empty() {
                None
            } else {
                Some(Value::Object(cleaned))
            }
        }
        other => Some(other.clone()),
    }
}

/// Deterministic domain guidance for search intents. For fulfillment-stop
/// domains (hospitality): item-name framing is dropped, instruction
/// preferences become policy-declared tag filters, and fulfillment-based
/// searches carry exactly a check-in and a check-out stop.
fn apply_domain_guidance(
    message: &mut Value,
    action: ProtocolAction,
    policy: &DomainPolicy,
    instruction: &str,
) {
    if action != ProtocolAction::Search || !policy.fulfillment_stops {
        return;
    }

    let matched_tags = match_supported_tags(policy, instruction);

    let Some(intent) = ensure_object(message, "intent") else {
        return;
    };

    if let Some(item) = intent.get_mut("item") {
        if let Some(descriptor) = item.get_mut("descriptor") {
            if let Some(descriptor) = descriptor.as_object_mut() {
                descriptor.remove("name");
            }
        }
    }

    if !matched_tags.is_empty() {
        let item = ensure_object(intent, "item").expect("intent is an object");
        let tags = item
            .as_object_mut()
            .expect("item is an object")
            .entry("tags")
            .or_insert_with(|| json!([{ "list": [] }]));

        if !tags.is_array() {
            *tags = json!([{ "list": [] }]);
        }
        let groups = tags.as_array_mut().expect("tags is an array");
        if groups.is_empty() {
            groups.push(json!({ "list": [] }));
        }
        let list = groups[0]
            .as_object_mut()
            .map(|group| group.entry("list").or_insert_with(|| json!([])))
            .filter(|list| list.is_array())
            .map(|list| list.as_array_mut().expect("list is an array"));

        if let Some(list) = list {
            for code in matched_tags {
                let already_present = list.iter().any(|entry| {
                    entry["descriptor"]["code"].as_str() == Some(code.as_str())
                });
                if !already_present {
                    list.push(json!({ "descriptor": { "code": code }, "value": "yes" }));
                }
            }
        }
    }

    if let Some(fulfillment) = intent.get_mut("fulfillment") {
        normalize_fulfillment_stops(fulfillment);
    }
}

fn match_supported_tags(policy: &DomainPolicy, instruction: &str) -> Vec<String> {
    let normalized = instruction.to_ascii_lowercase();
    policy
        .supported_tags
        .iter()
        .filter(|tag| {
            normalized.contains(tag.as_str()) || normalized.contains(&tag.replace('-', " "))
        })
        .cloned()
        .collect()
}

/// Rewrites a fulfillment block so it carries exactly one check-in and one
/// check-out stop, reusing any provided location/time details.
fn normalize_fulfillment_stops(fulfillment: &mut Value) {
    let Some(fulfillment) = fulfillment.as_object_mut() else {
        return;
    };
    let existing = fulfillment
        .get("stops")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let stop_for = |kind: &str| -> Value {
        existing
            .iter()
            .find(|stop| stop["type"].as_str() == Some(kind))
            .cloned()
            .unwrap_or_else(|| {
                let mut template =
                    existing.first().cloned().unwrap_or_else(|| json!({}));
                if let Some(template) = template.as_object_mut() {
                    template.insert("type".to_string(), json!(kind));
                }
                template
            })
    };

    fulfillment.insert("stops".to_string(), json!([stop_for("check-in"), stop_for("check-out")]));
}

fn ensure_object<'a>(value: &'a mut Value, key: &str) -> Option<&'a mut Value> {
    let map = value.as_object_mut()?;
    let entry = map.entry(key).or_insert_with(|| json!({}));
    if !entry.is_object() {
        *entry = json!({});
    }
    Some(entry)
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use serde_json::json;

    use souk_core::actions::ProtocolAction;
    use souk_core::envelope::{new_message_id, new_transaction_id, Envelope};
    use souk_core::profile::Profile;
    use souk_core::registry::NetworkRegistry;
    use souk_core::schema::SchemaRegistry;

    use super::{derive_url, strip_empty, PayloadComposer, ProtocolRequest};
    use crate::llm::testing::ScriptedLlm;

    fn envelope(action: ProtocolAction) -> Envelope {
        Envelope {
            domain: "hospitality".to_string(),
            action,
            version: "1.1.0".to_string(),
            bap_id: "bap.test".to_string(),
            bap_uri: "https://bap.test".to_string(),
            bpp_id: Some("bpp.hotels.example".to_string()),
            bpp_uri: Some("https://bpp.hotels.example".to_string()),
            location: None,
            transaction_id: new_transaction_id(),
            message_id: new_message_id(),
            timestamp: Utc::now(),
        }
    }

    async fn compose_search(llm_output: &str, instruction: &str) -> ProtocolRequest {
        let registry = NetworkRegistry::builtin("bap.test", "https://bap.test");
        let policy = registry.domain("hospitality").expect("hospitality policy");
        let schemas = SchemaRegistry::standard();
        let schema = schemas.resolve(ProtocolAction::Search);
        let llm = ScriptedLlm::single(llm_output);

        PayloadComposer::new()
            .compose(
                &llm,
                &schema,
                &envelope(ProtocolAction::Search),
                policy,
                &Profile::default(),
                &[],
                instruction,
            )
            .await
            .expect("composition should succeed")
    }

    #[test]
    fn strip_empty_removes_empty_fields() {
        let value = json!({
            "keep": "value",
            "blank": "",
            "null": null,
            "nested": { "empty": {}, "list": [] },
            "items": [ { "id": "1" }, {} ]
        });

        let cleaned = strip_empty(&value).expect("non-empty result");
        assert_eq!(cleaned, json!({ "keep": "value", "items": [ { "id": "1" } ] }));
    }

    #[test]
    fn strip_empty_is_idempotent() {
        let value = json!({
            "a": "",
            "b": { "c": [null, ""], "d": "x" },
            "e": [ {}, { "f": 1 } ]
        });

        let once = strip_empty(&value).expect("non-empty");
        let twice = strip_empty(&once).expect("non-empty");
        assert_eq!(once, twice);
    }

    #[test]
    fn strip_empty_collapses_fully_empty_trees() {
        assert!(strip_empty(&json!({ "a": { "b": [""] } })).is_none());
    }

    #[test]
    fn url_is_derived_from_endpoint_and_action() {
        assert_eq!(
            derive_url("https://gateway.test/hospitality/", ProtocolAction::Search),
            "https://gateway.test/hospitality/search"
        );
    }

    #[tokio::test]
    async fn generated_context_is_overwritten_by_the_envelope() {
        let request = compose_search(
            r#"{"method":"post","body":{"context":{"bap_id":"forged.example","action":"select"},"message":{"intent":{"item":{"descriptor":{"name":"hotels"}}}}}}"#,
            "find hotels in Bangalore",
        )
        .await;

        assert_eq!(request.method, "POST");
        assert_eq!(request.body["context"]["bap_id"], "bap.test");
        assert_eq!(request.body["context"]["action"], "search");
    }

    #[tokio::test]
    async fn hospitality_search_prefers_tags_over_item_names() {
        let request = compose_search(
            r#"{"method":"POST","body":{"context":{},"message":{"intent":{"item":{"descriptor":{"name":"pet hotels"}}}}}}"#,
            "find pet-friendly hotels near Bangalore",
        )
        .await;

        let message = &request.body["message"];
        assert!(message["intent"]["item"]["descriptor"].get("name").is_none());

        let list = message["intent"]["item"]["tags"][0]["list"]
            .as_array()
            .expect("tag list should exist");
        assert!(list.iter().any(|entry| {
            entry["descriptor"]["code"] == "pet-friendly" && entry["value"] == "yes"
        }));
    }

    #[tokio::test]
    async fn fulfillment_searches_carry_check_in_and_check_out() {
        let request = compose_search(
            r#"{"method":"POST","body":{"context":{},"message":{"intent":{"fulfillment":{"stops":[{"type":"check-in","location":{"gps":"12.97,77.59"}}]}}}}}"#,
            "book a hotel room in Bangalore for tonight",
        )
        .await;

        let stops = request.body["message"]["intent"]["fulfillment"]["stops"]
            .as_array()
            .expect("stops present");
        assert_eq!(stops.len(), 2);
        assert_eq!(stops[0]["type"], "check-in");
        assert_eq!(stops[1]["type"], "check-out");
        assert_eq!(stops[1]["location"]["gps"], "12.97,77.59");
    }

    #[tokio::test]
    async fn invalid_json_is_a_structured_failure() {
        let registry = NetworkRegistry::builtin("bap.test", "https://bap.test");
        let policy = registry.domain("hospitality").expect("policy");
        let schemas = SchemaRegistry::standard();
        let schema = schemas.resolve(ProtocolAction::Search);
        let llm = ScriptedLlm::single("not json at all");

        let error = PayloadComposer::new()
            .compose(
                &llm,
                &schema,
                &envelope(ProtocolAction::Search),
                policy,
                &Profile::default(),
                &[],
                "find hotels",
            )
            .await
            .expect_err("invalid model output must fail");

        assert!(error.to_string().contains("invalid JSON"));
    }

    #[tokio::test]
    async fn missing_message_is_rejected() {
        let registry = NetworkRegistry::builtin("bap.test", "https://bap.test");
        let policy = registry.domain("hospitality").expect("policy");
        let schemas = SchemaRegistry::standard();
        let schema = schemas.resolve(ProtocolAction::Search);
        let llm = ScriptedLlm::single(r#"{"method":"POST","body":{"context":{}}}"#);

        let error = PayloadComposer::new()
            .compose(
                &llm,
                &schema,
                &envelope(ProtocolAction::Search),
                policy,
                &Profile::default(),
                &[],
                "find hotels",
            )
            .await
            .expect_err("body without message must fail");

        assert!(error.to_string().contains("body.message"));
    }
}
