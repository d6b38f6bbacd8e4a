use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::actions::ProtocolAction;

/// The protocol context block that accompanies every network request.
///
/// `message_id` is fresh for every request; `transaction_id` stays stable for
/// the whole search→select→init→confirm flow of one order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub domain: String,
    pub action: ProtocolAction,
    pub version: String,
    pub bap_id: String,
    pub bap_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<CityLocation>,
    pub transaction_id: String,
    pub message_id: String,
    pub timestamp: DateTime<Utc>,
}

/// City/country defaults a domain declares for intent building.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityLocation {
    pub city: LocationCode,
    pub country: LocationCode,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationCode {
    pub name: String,
    pub code: String,
}

impl Envelope {
    /// The envelope as the JSON `context` object of a request body.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Collision-resistant identifier for a single request.
pub fn new_message_id() -> String {
    Uuid::new_v4().to_string()
}

/// Identifier minted once per order flow, at `search`.
pub fn new_transaction_id() -> String {
    Uuid::new_v4().to_string()
}
