use std::collections::HashMap;

use serde_json::{json, Value};

use crate::actions::ProtocolAction;

/// Structural template for one action's request body: the shape the composed
/// `message` must follow plus the fields that must be present.
#[derive(Clone, Debug, PartialEq)]
pub struct RequestSchema {
    pub action: ProtocolAction,
    pub template: Value,
    pub required: Vec<&'static str>,
}

/// Explicit map of per-action request schemas with a declared default entry.
///
/// Actions without a dedicated schema fall back to the combined default
/// schema narrowed to the `/{action}` sub-schema, extracted as a JSON object.
#[derive(Clone, Debug)]
pub struct SchemaRegistry {
    dedicated: HashMap<ProtocolAction, RequestSchema>,
    default_paths: Value,
}

impl SchemaRegistry {
    /// Registry seeded with the core transaction schemas.
    pub fn standard() -> Self {
        let mut dedicated = HashMap::new();

        dedicated.insert(
            ProtocolAction::Search,
            RequestSchema {
                action: ProtocolAction::Search,
                template: json!({
                    "intent": {
                        "item": {
                            "descriptor": { "name": "string (optional)" },
                            "tags": [{
                                "list": [{
                                    "descriptor": { "code": "string" },
                                    "value": "string"
                                }]
                            }]
                        },
                        "fulfillment": {
                            "stops": [{
                                "type": "string",
                                "location": { "gps": "string" },
                                "time": { "timestamp": "RFC3339 string" }
                            }]
                        }
                    }
                }),
                required: vec!["intent"],
            },
        );

        dedicated.insert(
            ProtocolAction::Select,
            RequestSchema {
                action: ProtocolAction::Select,
                template: json!({
                    "order": {
                        "provider": { "id": "string" },
                        "items": [{ "id": "string" }]
                    }
                }),
                required: vec!["order", "order.provider", "order.items"],
            },
        );

        dedicated.insert(
            ProtocolAction::Init,
            RequestSchema {
                action: ProtocolAction::Init,
                template: json!({
                    "order": {
                        "provider": { "id": "string" },
                        "items": [{ "id": "string" }],
                        "billing": {
                            "name": "string",
                            "email": "string",
                            "phone": "string"
                        },
                        "fulfillments": [{
                            "stops": [{
                                "type": "string",
                                "time": { "timestamp": "RFC3339 string" }
                            }]
                        }]
                    }
                }),
                required: vec!["order", "order.items", "order.billing"],
            },
        );

        dedicated.insert(
            ProtocolAction::Confirm,
            RequestSchema {
                action: ProtocolAction::Confirm,
                template: json!({
                    "order": {
                        "provider": { "id": "string" },
                        "items": [{ "id": "string" }],
                        "billing": {
                            "name": "string",
                            "email": "string",
                            "phone": "string"
                        },
                        "payments": [{
                            "status": "string",
                            "type": "string"
                        }]
                    }
                }),
                required: vec!["order", "order.items"],
            },
        );

        Self { dedicated, default_paths: default_combined_schema() }
    }

    /// Resolves the schema for an action. Total: a missing dedicated schema
    /// falls back to the default combined schema narrowed to `/{action}`,
    /// and an unknown path yields the reduced generic shape.
    pub fn resolve(&self, action: ProtocolAction) -> RequestSchema {
        if let Some(schema) = self.dedicated.get(&action) {
            return schema.clone();
        }

        let path = format!("/{}", action.as_str());
        let template = self
            .default_paths
            .get("paths")
            .and_then(|paths| paths.get(&path))
            .cloned()
            .unwrap_or_else(generic_message_shape);

        RequestSchema { action, template, required: Vec::new() }
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// The combined default schema: one sub-schema per action path. Kept small;
/// dedicated schemas above cover the transaction lifecycle.
fn default_combined_schema() -> Value {
    json!({
        "paths": {
            "/status": {
                "order_id": "string"
            },
            "/cancel": {
                "order_id": "string",
                "cancellation_reason_id": "string (optional)"
            }
        }
    })
}

fn generic_message_shape() -> Value {
    json!({})
}
