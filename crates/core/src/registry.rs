use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::envelope::{CityLocation, LocationCode};

/// Read-only description of the commerce network: the requesting participant
/// identity plus one policy block per supported domain. Loaded once at
/// bootstrap and never mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkRegistry {
    pub version: String,
    pub bap_id: String,
    pub bap_uri: String,
    pub domains: Vec<DomainPolicy>,
}

/// Per-domain network policy: wire domain code, counterparty endpoint, and
/// the search tags the domain's providers understand.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DomainPolicy {
    /// Stable registry key, e.g. `hospitality`.
    pub key: String,
    /// Domain code placed on the wire.
    pub domain_code: String,
    /// Counterparty gateway base; request URLs are `{endpoint}/{action}`.
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpp_uri: Option<String>,
    /// Instruction keywords that select this domain.
    pub keywords: Vec<String>,
    /// Tag codes providers in this domain can filter on.
    #[serde(default)]
    pub supported_tags: Vec<String>,
    /// Whether searches in this domain use fulfillment stops
    /// (check-in/check-out) rather than item descriptors.
    #[serde(default)]
    pub fulfillment_stops: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CityLocation>,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("could not read registry file `{path}`: {source}")]
    ReadFile { path: String, source: std::io::Error },
    #[error("could not parse registry file `{path}`: {source}")]
    ParseFile { path: String, source: toml::de::Error },
    #[error("registry validation failed: {0}")]
    Validation(String),
}

impl NetworkRegistry {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = fs::read_to_string(path).map_err(|source| RegistryError::ReadFile {
            path: path.display().to_string(),
            source,
        })?;
        let registry: Self = toml::from_str(&raw).map_err(|source| RegistryError::ParseFile {
            path: path.display().to_string(),
            source,
        })?;
        registry.validate()?;
        Ok(registry)
    }

    pub fn validate(&self) -> Result<(), RegistryError> {
        if self.bap_id.trim().is_empty() || self.bap_uri.trim().is_empty() {
            return Err(RegistryError::Validation(
                "registry bap_id and bap_uri are required".to_string(),
            ));
        }
        if self.domains.is_empty() {
            return Err(RegistryError::Validation(
                "registry must declare at least one domain".to_string(),
            ));
        }
        for domain in &self.domains {
            if domain.endpoint.trim().is_empty() {
                return Err(RegistryError::Validation(format!(
                    "domain `{}` is missing an endpoint",
                    domain.key
                )));
            }
            if domain.keywords.is_empty() {
                return Err(RegistryError::Validation(format!(
                    "domain `{}` declares no instruction keywords",
                    domain.key
                )));
            }
        }
        Ok(())
    }

    pub fn domain(&self, key: &str) -> Option<&DomainPolicy> {
        self.domains.iter().find(|domain| domain.key == key)
    }

    /// Resolves the domain an instruction refers to by keyword match.
    /// Exactly one matching domain wins; zero or several matches mean the
    /// domain cannot be determined and must not be guessed.
    pub fn resolve_domain(&self, instruction: &str) -> Option<&DomainPolicy> {
        let normalized = instruction.to_ascii_lowercase();
        let mut matches = self.domains.iter().filter(|domain| {
            domain.keywords.iter().any(|keyword| normalized.contains(keyword.as_str()))
        });

        let first = matches.next()?;
        if matches.next().is_some() {
            return None;
        }
        Some(first)
    }

    /// Built-in registry used when no registry file is configured. Covers the
    /// hospitality and EV-charging demo domains of the sandbox network.
    pub fn builtin(bap_id: &str, bap_uri: &str) -> Self {
        Self {
            version: "1.1.0".to_string(),
            bap_id: bap_id.to_string(),
            bap_uri: bap_uri.to_string(),
            domains: vec![
                DomainPolicy {
                    key: "hospitality".to_string(),
                    domain_code: "hospitality".to_string(),
                    endpoint: "https://gateway.souk.example/hospitality".to_string(),
                    bpp_id: Some("bpp.hotels.example".to_string()),
                    bpp_uri: Some("https://bpp.hotels.example".to_string()),
                    keywords: ["hotel", "hotels", "room", "stay", "campsite", "accommodation"]
                        .map(str::to_string)
                        .to_vec(),
                    supported_tags: ["pet-friendly", "ev-charging", "accommodation-type"]
                        .map(str::to_string)
                        .to_vec(),
                    fulfillment_stops: true,
                    location: Some(CityLocation {
                        city: LocationCode {
                            name: "Bangalore".to_string(),
                            code: "std:080".to_string(),
                        },
                        country: LocationCode { name: "India".to_string(), code: "IND".to_string() },
                    }),
                },
                DomainPolicy {
                    key: "charging".to_string(),
                    domain_code: "uei:charging".to_string(),
                    endpoint: "https://gateway.souk.example/charging".to_string(),
                    bpp_id: None,
                    bpp_uri: None,
                    keywords: ["charger", "charging", "ev station"].map(str::to_string).to_vec(),
                    supported_tags: ["connector-type", "vehicle-type"].map(str::to_string).to_vec(),
                    fulfillment_stops: false,
                    location: None,
                },
            ],
        }
    }
}
