use tracing::warn;

use souk_core::profile::{Profile, ProfileUpdate};

use crate::llm::{ChatMessage, CompletionOptions, LlmClient};

/// Result of one extraction pass. An empty `data` with `status: true` means
/// nothing new was found, which is expected, not an error.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub status: bool,
    pub data: ProfileUpdate,
}

/// Incrementally learns profile fields from free text.
///
/// Only unambiguous values that are new or more specific than what is already
/// known are reported; the never-downgrade merge itself lives in
/// `souk_core::profile`.
#[derive(Clone, Debug, Default)]
pub struct ProfileExtractor;

impl ProfileExtractor {
    pub fn new() -> Self {
        Self
    }

    pub async fn extract(
        &self,
        llm: &dyn LlmClient,
        text: &str,
        existing: &Profile,
    ) -> ExtractOutcome {
        let existing_json = serde_json::to_value(existing).unwrap_or_default();
        let messages = vec![
            ChatMessage::system(
                "Extract user profile details from the message. Answer with a JSON object of the \
                 shape {\"name\": string?, \"email\": string?, \"phone\": string?, \
                 \"attributes\": {string: string}}. Include a field ONLY when the message states \
                 it unambiguously AND it is new or more specific than the known profile. When \
                 nothing new is present answer {}.",
            ),
            ChatMessage::system(format!("Known profile: {existing_json}")),
            ChatMessage::user(text.to_string()),
        ];

        let raw = match llm.complete(&messages, CompletionOptions::structured()).await {
            Ok(raw) => raw,
            Err(error) => {
                warn!(event_name = "agent.extractor.llm_failed", error = %error, "profile extraction failed; keeping profile unchanged");
                return ExtractOutcome::default();
            }
        };

        match serde_json::from_str::<ProfileUpdate>(&raw) {
            Ok(data) => ExtractOutcome { status: true, data },
            Err(error) => {
                warn!(event_name = "agent.extractor.unparsable", error = %error, "profile extraction output was not valid JSON; keeping profile unchanged");
                ExtractOutcome::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use souk_core::profile::Profile;

    use super::ProfileExtractor;
    use crate::llm::testing::ScriptedLlm;

    #[tokio::test]
    async fn extracts_newly_stated_fields() {
        let llm =
            ScriptedLlm::single(r#"{"name":"Alex Carter","email":"alex@example.com"}"#);
        let outcome =
            ProfileExtractor::new().extract(&llm, "I'm Alex Carter, alex@example.com", &Profile::default()).await;

        assert!(outcome.status);
        assert_eq!(outcome.data.name.as_deref(), Some("Alex Carter"));
        assert_eq!(outcome.data.email.as_deref(), Some("alex@example.com"));
        assert!(outcome.data.phone.is_none());
    }

    #[tokio::test]
    async fn nothing_new_yields_an_empty_success() {
        let llm = ScriptedLlm::single("{}");
        let outcome =
            ProfileExtractor::new().extract(&llm, "find hotels", &Profile::default()).await;

        assert!(outcome.status);
        assert!(outcome.data.is_empty());
    }

    #[tokio::test]
    async fn extraction_failure_is_an_empty_no_op() {
        let llm = ScriptedLlm::failing("timeout");
        let outcome =
            ProfileExtractor::new().extract(&llm, "find hotels", &Profile::default()).await;

        assert!(!outcome.status);
        assert!(outcome.data.is_empty());
    }

    #[tokio::test]
    async fn unparsable_output_is_an_empty_no_op() {
        let llm = ScriptedLlm::single("name: Alex");
        let outcome =
            ProfileExtractor::new().extract(&llm, "I'm Alex", &Profile::default()).await;

        assert!(!outcome.status);
        assert!(outcome.data.is_empty());
    }
}
