//! OpenAI-compatible chat-completions client for the `LlmClient` seam.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};

use souk_agent::llm::{ChatMessage, CompletionOptions, LlmClient, LlmError};
use souk_core::config::LlmConfig;

pub struct OpenAiChatClient {
    client: Client,
    api_base: String,
    api_key: SecretString,
    model: String,
    timeout_secs: u64,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig) -> anyhow::Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow::anyhow!("llm.api_key is required to build the LLM client"))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key,
            model: config.model.clone(),
            timeout_secs: config.timeout_secs,
        })
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        options: CompletionOptions,
    ) -> Result<String, LlmError> {
        let mut request = json!({
            "model": self.model,
            "messages": messages,
        });
        if options.deterministic {
            request["temperature"] = json!(0);
        }
        if options.json_object {
            request["response_format"] = json!({ "type": "json_object" });
        }

        let response = self
            .client
            .post(format!("{}/chat/completions", self.api_base))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    LlmError::Timeout(self.timeout_secs)
                } else {
                    LlmError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        let payload: Value = response
            .json()
            .await
            .map_err(|error| LlmError::Malformed(error.to_string()))?;

        if !status.is_success() {
            let detail = payload["error"]["message"]
                .as_str()
                .unwrap_or("provider returned an error")
                .to_string();
            return Err(LlmError::Transport(format!("status {status}: {detail}")));
        }

        payload["choices"][0]["message"]["content"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                LlmError::Malformed("completion response carried no message content".to_string())
            })
    }
}
