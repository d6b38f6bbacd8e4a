use chrono::Utc;
use thiserror::Error;

use souk_core::actions::ProtocolAction;
use souk_core::envelope::{new_message_id, new_transaction_id, Envelope};
use souk_core::registry::{DomainPolicy, NetworkRegistry};
use souk_core::session::SessionState;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ContextError {
    #[error("could not resolve a single network domain for this instruction")]
    UnresolvedDomain,
}

/// Assembles the protocol envelope for one request from the registry and the
/// session's order state.
///
/// The message identifier is fresh on every call. The transaction identifier
/// is taken from session state when an order flow is running; a new one is
/// minted only when none exists yet (the `search` that opens a flow).
#[derive(Clone, Debug)]
pub struct ContextBuilder<'a> {
    registry: &'a NetworkRegistry,
}

impl<'a> ContextBuilder<'a> {
    pub fn new(registry: &'a NetworkRegistry) -> Self {
        Self { registry }
    }

    pub fn build(
        &self,
        instruction: &str,
        action: ProtocolAction,
        session: &SessionState,
    ) -> Result<(Envelope, &'a DomainPolicy), ContextError> {
        let domain =
            self.registry.resolve_domain(instruction).ok_or(ContextError::UnresolvedDomain)?;

        let transaction_id =
            session.transaction_id.clone().unwrap_or_else(new_transaction_id);

        let envelope = Envelope {
            domain: domain.domain_code.clone(),
            action,
            version: self.registry.version.clone(),
            bap_id: self.registry.bap_id.clone(),
            bap_uri: self.registry.bap_uri.clone(),
            bpp_id: domain.bpp_id.clone(),
            bpp_uri: domain.bpp_uri.clone(),
            location: domain.location.clone(),
            transaction_id,
            message_id: new_message_id(),
            timestamp: Utc::now(),
        };

        Ok((envelope, domain))
    }
}

#[cfg(test)]
mod tests {
    use souk_core::actions::ProtocolAction;
    use souk_core::registry::NetworkRegistry;
    use souk_core::session::SessionState;

    use super::{ContextBuilder, ContextError};

    fn registry() -> NetworkRegistry {
        NetworkRegistry::builtin("bap.test", "https://bap.test")
    }

    #[test]
    fn mints_a_transaction_id_when_none_exists() {
        let registry = registry();
        let builder = ContextBuilder::new(&registry);
        let session = SessionState::new("wa:+15550001111");

        let (envelope, domain) = builder
            .build("find hotels in Bangalore", ProtocolAction::Search, &session)
            .expect("hospitality should resolve");

        assert_eq!(domain.key, "hospitality");
        assert!(!envelope.transaction_id.is_empty());
        assert!(!envelope.message_id.is_empty());
        assert_eq!(envelope.bap_id, "bap.test");
    }

    #[test]
    fn reuses_the_session_transaction_id() {
        let registry = registry();
        let builder = ContextBuilder::new(&registry);
        let mut session = SessionState::new("wa:+15550001111");
        session.transaction_id = Some("txn-running".to_string());

        let (envelope, _) = builder
            .build("select the first hotel", ProtocolAction::Select, &session)
            .expect("hospitality should resolve");

        assert_eq!(envelope.transaction_id, "txn-running");
    }

    #[test]
    fn message_id_is_fresh_per_build() {
        let registry = registry();
        let builder = ContextBuilder::new(&registry);
        let session = SessionState::new("wa:+15550001111");

        let (first, _) =
            builder.build("find hotels", ProtocolAction::Search, &session).expect("build");
        let (second, _) =
            builder.build("find hotels", ProtocolAction::Search, &session).expect("build");

        assert_ne!(first.message_id, second.message_id);
    }

    #[test]
    fn unresolvable_domain_is_a_build_failure() {
        let registry = registry();
        let builder = ContextBuilder::new(&registry);
        let session = SessionState::new("wa:+15550001111");

        let error = builder
            .build("tell me a joke", ProtocolAction::Search, &session)
            .expect_err("no domain keyword should resolve");
        assert_eq!(error, ContextError::UnresolvedDomain);
    }

    #[test]
    fn ambiguous_domain_is_not_guessed() {
        let registry = registry();
        let builder = ContextBuilder::new(&registry);
        let session = SessionState::new("wa:+15550001111");

        let error = builder
            .build("hotel with ev charging on the way", ProtocolAction::Search, &session)
            .expect_err("two matching domains must not be guessed between");
        assert_eq!(error, ContextError::UnresolvedDomain);
    }
}
