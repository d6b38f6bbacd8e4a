use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Minimal catalog shape handed to narration after a search. Everything the
/// user does not pick from is dropped here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedCatalog {
    pub providers: Vec<CompressedProvider>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedProvider {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    pub items: Vec<CompressedItem>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompressedItem {
    pub id: String,
    pub name: String,
}

/// Reduces a raw search response to providers and their items.
///
/// Deterministic for deterministic input: a plain JSON walk, no model call.
/// Providers with no items after filtering are dropped entirely, and bpp
/// identifiers come from each provider's own response context, never from a
/// sibling's.
pub fn compress_catalog(raw: &Value) -> CompressedCatalog {
    let mut providers = Vec::new();

    for response in response_blocks(raw) {
        let bpp_id = response["context"]["bpp_id"].as_str().map(str::to_string);
        let bpp_uri = response["context"]["bpp_uri"].as_str().map(str::to_string);

        let Some(raw_providers) =
            response["message"]["catalog"]["providers"].as_array()
        else {
            continue;
        };

        for raw_provider in raw_providers {
            let items: Vec<CompressedItem> = raw_provider["items"]
                .as_array()
                .map(|items| items.iter().filter_map(compress_item).collect())
                .unwrap_or_default();

            if items.is_empty() {
                continue;
            }

            providers.push(CompressedProvider {
                id: string_field(raw_provider, "id"),
                name: display_name(raw_provider),
                bpp_id: bpp_id.clone(),
                bpp_uri: bpp_uri.clone(),
                items,
            });
        }
    }

    CompressedCatalog { providers }
}

/// A gateway response aggregates one block per counterparty under
/// `responses`; a direct counterparty response is a single block.
fn response_blocks(raw: &Value) -> Vec<&Value> {
    match raw.get("responses").and_then(Value::as_array) {
        Some(blocks) => blocks.iter().collect(),
        None => vec![raw],
    }
}

fn compress_item(raw_item: &Value) -> Option<CompressedItem> {
    let id = raw_item["id"].as_str()?;
    Some(CompressedItem { id: id.to_string(), name: display_name(raw_item) })
}

fn display_name(value: &Value) -> String {
    value["descriptor"]["name"]
        .as_str()
        .or_else(|| value["name"].as_str())
        .unwrap_or_default()
        .to_string()
}

fn string_field(value: &Value, key: &str) -> String {
    value[key].as_str().unwrap_or_default().to_string()
}
