//! Reqwest-backed `NetworkClient` for commerce network and backend calls.
//!
//! The pipeline supplies fully-formed requests; this client never retries.

use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, Method};
use serde_json::Value;

use souk_agent::network::{NetworkClient, NetworkError};

pub struct HttpNetworkClient {
    client: Client,
    timeout_secs: u64,
}

impl HttpNetworkClient {
    pub fn new(timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self { client, timeout_secs })
    }
}

#[async_trait]
impl NetworkClient for HttpNetworkClient {
    async fn call(
        &self,
        url: &str,
        method: &str,
        body: &Value,
        headers: &BTreeMap<String, String>,
    ) -> Result<Value, NetworkError> {
        let method = Method::from_str(&method.to_ascii_uppercase())
            .map_err(|_| NetworkError::Transport(format!("unsupported method `{method}`")))?;

        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_str(name)
                .map_err(|_| NetworkError::Transport(format!("invalid header name `{name}`")))?;
            let value = HeaderValue::from_str(value).map_err(|_| {
                NetworkError::Transport(format!("invalid header value for `{name:?}`"))
            })?;
            header_map.insert(name, value);
        }

        let mut request = self.client.request(method.clone(), url).headers(header_map);
        if method != Method::GET {
            request = request.json(body);
        }

        let response = request.send().await.map_err(|error| {
            if error.is_timeout() {
                NetworkError::Timeout(self.timeout_secs)
            } else {
                NetworkError::Transport(error.to_string())
            }
        })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|error| NetworkError::Transport(error.to_string()))?;

        if !status.is_success() {
            return Err(NetworkError::Upstream {
                status: status.as_u16(),
                detail: truncate(&text, 512),
            });
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&text).map_err(|error| {
            NetworkError::Transport(format!("response was not valid JSON: {error}"))
        })
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.len() <= limit {
        text.to_string()
    } else {
        let mut cut = limit;
        while !text.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &text[..cut])
    }
}

#[cfg(test)]
mod tests {
    use super::truncate;

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate("short", 512), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let text = "héllo wörld".repeat(100);
        let cut = truncate(&text, 512);
        assert!(cut.len() <= 512 + '…'.len_utf8());
    }
}
