//! Twilio-style REST implementation of the `MessagingClient` seam.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tracing::info;

use souk_channel::events::normalize_sender;
use souk_channel::messaging::{Delivery, MessagingClient, MessagingError};
use souk_core::config::ChannelConfig;

const PROVIDER_API_BASE: &str = "https://api.twilio.com/2010-04-01";

pub struct TwilioMessagingClient {
    client: Client,
    api_base: String,
    account_sid: String,
    auth_token: SecretString,
    sender: String,
    timeout_secs: u64,
}

impl TwilioMessagingClient {
    pub fn from_config(config: &ChannelConfig) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            api_base: PROVIDER_API_BASE.to_string(),
            account_sid: config.account_sid.clone(),
            auth_token: config.auth_token.clone(),
            sender: config.sender.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    #[cfg(test)]
    fn with_api_base(mut self, api_base: &str) -> Self {
        self.api_base = api_base.to_string();
        self
    }
}

#[async_trait]
impl MessagingClient for TwilioMessagingClient {
    async fn send(&self, recipient: &str, text: &str) -> Result<Delivery, MessagingError> {
        let url = format!("{}/Accounts/{}/Messages.json", self.api_base, self.account_sid);
        let form = [
            ("From", normalize_sender(&self.sender)),
            ("To", normalize_sender(recipient)),
            ("Body", text.to_string()),
        ];

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(self.auth_token.expose_secret()))
            .form(&form)
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    MessagingError::Timeout(self.timeout_secs)
                } else {
                    MessagingError::Transport(error.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response
                .json::<Value>()
                .await
                .ok()
                .and_then(|payload| payload["message"].as_str().map(str::to_string))
                .unwrap_or_else(|| format!("provider returned status {status}"));
            return Err(MessagingError::Rejected(detail));
        }

        info!(
            event_name = "channel.message_sent",
            recipient = %normalize_sender(recipient),
            "outbound message accepted by provider"
        );
        Ok(Delivery::Delivered)
    }
}
