//! Messaging-channel interface.
//!
//! This crate models the WhatsApp-style channel souk listens on:
//! - **Inbound** (`events`) — webhook payload parsing, the event model, and
//!   the dispatcher that routes messages to a handler
//! - **Outbound** (`messaging`) — the `MessagingClient` seam used to send
//!   replies and back-office notifications
//!
//! The HTTP specifics (webhook server, provider REST client) live in the
//! server crate; everything here is transport-agnostic and mockable.

pub mod events;
pub mod messaging;

pub use events::{
    ChannelEvent, EventContext, HandlerError, HandlerResult, InboundMessage, InboundPayload,
    MessageDispatcher, MessageHandler,
};
pub use messaging::{Delivery, MessagingClient, MessagingError, NoopMessagingClient};
