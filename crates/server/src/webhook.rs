//! Inbound messaging webhook: provider form payload → one pipeline turn →
//! reply send.

use std::sync::Arc;

use async_trait::async_trait;
use axum::{extract::State, http::StatusCode, routing::post, Form, Json, Router};
use serde::Serialize;
use tracing::{error, info, warn};
use uuid::Uuid;

use souk_agent::runtime::TurnOrchestrator;
use souk_channel::events::{
    ChannelEvent, EventContext, HandlerError, HandlerResult, InboundMessage, InboundPayload,
    MessageDispatcher, MessageHandler,
};
use souk_channel::messaging::MessagingClient;
use souk_core::session::SessionState;
use souk_db::repositories::SessionRepository;

#[derive(Clone)]
pub struct WebhookState {
    dispatcher: Arc<MessageDispatcher>,
    messaging: Arc<dyn MessagingClient>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct WebhookResponse {
    pub status: bool,
}

/// Runs one orchestrated turn per inbound message against the sender's
/// session. A failed turn still produces a reply; only persistence errors
/// bubble up as handler failures.
pub struct TurnHandler {
    orchestrator: Arc<TurnOrchestrator>,
    sessions: Arc<dyn SessionRepository>,
}

impl TurnHandler {
    pub fn new(
        orchestrator: Arc<TurnOrchestrator>,
        sessions: Arc<dyn SessionRepository>,
    ) -> Self {
        Self { orchestrator, sessions }
    }
}

#[async_trait]
impl MessageHandler for TurnHandler {
    async fn handle(
        &self,
        message: &InboundMessage,
        ctx: &EventContext,
    ) -> Result<HandlerResult, HandlerError> {
        let mut session = self
            .sessions
            .load(&message.sender)
            .await
            .map_err(|error| HandlerError::Message(error.to_string()))?
            .unwrap_or_else(|| SessionState::new(message.sender.clone()));

        let outcome = self.orchestrator.handle_message(&mut session, &message.text).await;

        // Failed turns leave the session untouched by design; saving is
        // cheap either way and keeps the row's updated_at honest.
        self.sessions
            .save(&session)
            .await
            .map_err(|error| HandlerError::Message(error.to_string()))?;

        info!(
            event_name = "server.webhook.turn_finished",
            correlation_id = %ctx.correlation_id,
            session_id = %message.sender,
            turn_status = outcome.status,
            "turn finished"
        );

        Ok(HandlerResult::Replied(outcome.message))
    }
}

pub fn router(
    orchestrator: Arc<TurnOrchestrator>,
    sessions: Arc<dyn SessionRepository>,
    messaging: Arc<dyn MessagingClient>,
) -> Router {
    let handler = TurnHandler::new(orchestrator, sessions);
    let state = WebhookState {
        dispatcher: Arc::new(MessageDispatcher::new(Arc::new(handler))),
        messaging,
    };
    Router::new().route("/webhook", post(webhook)).with_state(state)
}

pub async fn webhook(
    State(state): State<WebhookState>,
    Form(payload): Form<InboundPayload>,
) -> (StatusCode, Json<WebhookResponse>) {
    let correlation_id = Uuid::new_v4().to_string();
    let ctx = EventContext { correlation_id: correlation_id.clone() };

    let event = payload.into_event();
    let recipient = match &event {
        ChannelEvent::Message(message) => Some(message.sender.clone()),
        _ => None,
    };

    let result = match state.dispatcher.dispatch(event, &ctx).await {
        Ok(result) => result,
        Err(dispatch_error) => {
            error!(
                event_name = "server.webhook.dispatch_failed",
                correlation_id = %correlation_id,
                error = %dispatch_error,
                "webhook dispatch failed"
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(WebhookResponse { status: false }));
        }
    };

    if let (HandlerResult::Replied(text), Some(recipient)) = (&result, recipient) {
        if let Err(send_error) = state.messaging.send(&recipient, text).await {
            warn!(
                event_name = "server.webhook.reply_send_failed",
                correlation_id = %correlation_id,
                error = %send_error,
                "reply could not be delivered"
            );
            return (StatusCode::BAD_GATEWAY, Json(WebhookResponse { status: false }));
        }
    }

    (StatusCode::OK, Json(WebhookResponse { status: true }))
}
