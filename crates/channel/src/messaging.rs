use async_trait::async_trait;
use thiserror::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    Failed,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("messaging provider rejected the send: {0}")]
    Rejected(String),
    #[error("messaging transport failure: {0}")]
    Transport(String),
    #[error("messaging send timed out after {0}s")]
    Timeout(u64),
}

/// Seam to the outbound messaging provider. The core only ever supplies the
/// recipient identity and the final narration text.
#[async_trait]
pub trait MessagingClient: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<Delivery, MessagingError>;
}

/// Used in tests and when no provider is configured; sends go nowhere and
/// report success.
#[derive(Default)]
pub struct NoopMessagingClient;

#[async_trait]
impl MessagingClient for NoopMessagingClient {
    async fn send(&self, _recipient: &str, _text: &str) -> Result<Delivery, MessagingError> {
        Ok(Delivery::Delivered)
    }
}

/// Recording double for asserting on outbound sends in tests.
pub mod testing {
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::{Delivery, MessagingClient, MessagingError};

    /// Records every send for assertion.
    #[derive(Default)]
    pub struct RecordingMessagingClient {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl MessagingClient for RecordingMessagingClient {
        async fn send(&self, recipient: &str, text: &str) -> Result<Delivery, MessagingError> {
            self.sent.lock().expect("send log").push((recipient.to_string(), text.to_string()));
            Ok(Delivery::Delivered)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Delivery, MessagingClient, NoopMessagingClient};

    #[tokio::test]
    async fn noop_client_reports_delivery() {
        let client = NoopMessagingClient;
        let delivery =
            client.send("whatsapp:+15550001111", "hello").await.expect("noop send succeeds");
        assert_eq!(delivery, Delivery::Delivered);
    }
}
