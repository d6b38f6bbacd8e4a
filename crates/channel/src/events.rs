use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

/// Raw webhook form payload as the messaging provider posts it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct InboundPayload {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "MessageSid", default)]
    pub message_sid: Option<String>,
    #[serde(rename = "SmsStatus", default)]
    pub sms_status: Option<String>,
}

impl InboundPayload {
    /// Classifies the webhook payload. Status callbacks and payloads without
    /// a sender or text are not user messages.
    pub fn into_event(self) -> ChannelEvent {
        if let Some(status) = &self.sms_status {
            let terminal = matches!(status.as_str(), "delivered" | "failed" | "undelivered");
            if terminal {
                return ChannelEvent::DeliveryStatus {
                    message_sid: self.message_sid.unwrap_or_default(),
                    status: status.clone(),
                };
            }
        }

        if self.from.trim().is_empty() || self.body.trim().is_empty() {
            return ChannelEvent::Unsupported;
        }

        ChannelEvent::Message(InboundMessage {
            sender: normalize_sender(&self.from),
            text: self.body,
            provider_message_id: self.message_sid,
        })
    }
}

/// One user message received over the channel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Session key: the sender's channel identity, e.g. `whatsapp:+15550001111`.
    pub sender: String,
    pub text: String,
    pub provider_message_id: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Message(InboundMessage),
    DeliveryStatus { message_sid: String, status: String },
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    /// A reply that should be sent back to the sender.
    Replied(String),
    /// Handled with no user-visible reply.
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandlerError {
    #[error("message handler failure: {0}")]
    Message(String),
}

#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<HandlerResult, HandlerError>;
}

/// Routes channel events to the registered message handler. Delivery status
/// callbacks and unsupported payloads are acknowledged without side effects.
pub struct MessageDispatcher {
    handler: Arc<dyn MessageHandler>,
}

impl MessageDispatcher {
    pub fn new(handler: Arc<dyn MessageHandler>) -> Self {
        Self { handler }
    }

    pub async fn dispatch(
        &self,
        event: ChannelEvent,
        ctx: &EventContext,
    ) -> Result<HandlerResult, HandlerError> {
        match event {
            ChannelEvent::Message(message) => self.handler.handle(&message, ctx).await,
            ChannelEvent::DeliveryStatus { message_sid, status } => {
                debug!(
                    event_name = "channel.delivery_status",
                    correlation_id = %ctx.correlation_id,
                    message_sid = %message_sid,
                    status = %status,
                    "delivery status received"
                );
                Ok(HandlerResult::Processed)
            }
            ChannelEvent::Unsupported => Ok(HandlerResult::Ignored),
        }
    }
}

/// Sender identities always carry the channel prefix so they can be used
/// directly as reply recipients and session keys.
pub fn normalize_sender(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.starts_with("whatsapp:") {
        trimmed.to_string()
    } else {
        format!("whatsapp:{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{
        normalize_sender, ChannelEvent, EventContext, HandlerError, HandlerResult, InboundMessage,
        InboundPayload, MessageDispatcher, MessageHandler,
    };

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(
            &self,
            message: &InboundMessage,
            _ctx: &EventContext,
        ) -> Result<HandlerResult, HandlerError> {
            Ok(HandlerResult::Replied(format!("echo: {}", message.text)))
        }
    }

    fn ctx() -> EventContext {
        EventContext { correlation_id: "req-1".to_string() }
    }

    #[test]
    fn webhook_payload_becomes_a_message_event() {
        let payload = InboundPayload {
            from: "+15550001111".to_string(),
            body: "find hotels".to_string(),
            message_sid: Some("SM123".to_string()),
            sms_status: None,
        };

        match payload.into_event() {
            ChannelEvent::Message(message) => {
                assert_eq!(message.sender, "whatsapp:+15550001111");
                assert_eq!(message.text, "find hotels");
                assert_eq!(message.provider_message_id.as_deref(), Some("SM123"));
            }
            other => panic!("expected message event, got {other:?}"),
        }
    }

    #[test]
    fn delivery_callbacks_are_not_messages() {
        let payload = InboundPayload {
            from: "+15550001111".to_string(),
            body: String::new(),
            message_sid: Some("SM123".to_string()),
            sms_status: Some("delivered".to_string()),
        };

        assert!(matches!(payload.into_event(), ChannelEvent::DeliveryStatus { .. }));
    }

    #[test]
    fn empty_payloads_are_unsupported() {
        assert_eq!(InboundPayload::default().into_event(), ChannelEvent::Unsupported);
    }

    #[test]
    fn sender_normalization_is_stable() {
        assert_eq!(normalize_sender("+15550001111"), "whatsapp:+15550001111");
        assert_eq!(normalize_sender("whatsapp:+15550001111"), "whatsapp:+15550001111");
    }

    #[tokio::test]
    async fn dispatcher_routes_messages_to_the_handler() {
        let dispatcher = MessageDispatcher::new(Arc::new(EchoHandler));
        let event = ChannelEvent::Message(InboundMessage {
            sender: "whatsapp:+15550001111".to_string(),
            text: "hello".to_string(),
            provider_message_id: None,
        });

        let result = dispatcher.dispatch(event, &ctx()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Replied("echo: hello".to_string()));
    }

    #[tokio::test]
    async fn dispatcher_acknowledges_status_events_without_reply() {
        let dispatcher = MessageDispatcher::new(Arc::new(EchoHandler));
        let event = ChannelEvent::DeliveryStatus {
            message_sid: "SM123".to_string(),
            status: "delivered".to_string(),
        };

        let result = dispatcher.dispatch(event, &ctx()).await.expect("dispatch");
        assert_eq!(result, HandlerResult::Processed);
    }
}
