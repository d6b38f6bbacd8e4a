use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Accumulated, session-scoped knowledge about the user. Grows additively
/// over the conversation; cleared only by an explicit `clear_all`.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    /// Free-form travel/preference attributes (dietary, accommodation type,
    /// party size, ...), keyed by attribute name.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Partial profile produced by one extraction pass. Absent fields mean
/// "nothing new learned"; empty strings are treated the same way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        fn blank(field: &Option<String>) -> bool {
            field.as_deref().map(str::trim).unwrap_or("").is_empty()
        }
        blank(&self.name)
            && blank(&self.email)
            && blank(&self.phone)
            && self.attributes.values().all(|value| value.trim().is_empty())
    }
}

impl Profile {
    /// Additive merge: a known non-empty value is never replaced by an empty
    /// or absent incoming one.
    pub fn merge(&mut self, update: &ProfileUpdate) {
        merge_field(&mut self.name, update.name.as_deref());
        merge_field(&mut self.email, update.email.as_deref());
        merge_field(&mut self.phone, update.phone.as_deref());

        for (key, value) in &update.attributes {
            let trimmed = value.trim();
            if !trimmed.is_empty() {
                self.attributes.insert(key.clone(), trimmed.to_string());
            }
        }
    }

    /// Billing fields still required before an order can be initiated.
    pub fn missing_billing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.trim().is_empty() {
            missing.push("name");
        }
        if self.email.trim().is_empty() {
            missing.push("email");
        }
        if self.phone.trim().is_empty() {
            missing.push("phone");
        }
        missing
    }

    pub fn is_billing_complete(&self) -> bool {
        self.missing_billing_fields().is_empty()
    }
}

fn merge_field(existing: &mut String, incoming: Option<&str>) {
    if let Some(value) = incoming {
        let trimmed = value.trim();
        if !trimmed.is_empty() {
            *existing = trimmed.to_string();
        }
    }
}
