use std::collections::BTreeMap;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("network call failed with status {status}: {detail}")]
    Upstream { status: u16, detail: String },
    #[error("network transport failure: {0}")]
    Transport(String),
    #[error("network call timed out after {0}s")]
    Timeout(u64),
}

/// Seam to the commerce network and backend HTTP capability. The pipeline
/// supplies fully-formed requests; implementations never retry on their own.
#[async_trait]
pub trait NetworkClient: Send + Sync {
    async fn call(
        &self,
        url: &str,
        method: &str,
        body: &Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<Value, NetworkError>;
}

/// Scripted doubles for exercising the pipeline without a live network.
pub mod testing {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use serde_json::Value;

    use super::{NetworkClient, NetworkError};

    /// Returns a fixed response for every call and records the requests made.
    pub struct ScriptedNetwork {
        response: Result<Value, String>,
        pub calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl ScriptedNetwork {
        pub fn responding(response: Value) -> Self {
            Self { response: Ok(response), calls: Mutex::new(Vec::new()) }
        }

        pub fn failing(detail: &str) -> Self {
            Self { response: Err(detail.to_string()), calls: Mutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl NetworkClient for ScriptedNetwork {
        async fn call(
            &self,
            url: &str,
            method: &str,
            body: &Value,
            _headers: &BTreeMap<String, String>,
        ) -> Result<Value, NetworkError> {
            self.calls
                .lock()
                .expect("call log")
                .push((url.to_string(), method.to_string(), body.clone()));
            match &self.response {
                Ok(value) => Ok(value.clone()),
                Err(detail) => {
                    Err(NetworkError::Upstream { status: 502, detail: detail.clone() })
                }
            }
        }
    }
}
