use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The closed set of network protocol actions the agent can drive, plus the
/// two session reset commands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolAction {
    Search,
    Select,
    Init,
    Confirm,
    ClearChat,
    ClearAll,
}

impl ProtocolAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Select => "select",
            Self::Init => "init",
            Self::Confirm => "confirm",
            Self::ClearChat => "clear_chat",
            Self::ClearAll => "clear_all",
        }
    }

    /// Tolerant parse of a model-produced action label. Anything outside the
    /// supported set is `None`; the caller treats that as "no action".
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "search" => Some(Self::Search),
            "select" => Some(Self::Select),
            "init" => Some(Self::Init),
            "confirm" => Some(Self::Confirm),
            "clear_chat" => Some(Self::ClearChat),
            "clear_all" => Some(Self::ClearAll),
            _ => None,
        }
    }

    /// True for the four actions that form an order lifecycle and travel to
    /// the network; false for local session resets.
    pub fn is_order_stage(&self) -> bool {
        matches!(self, Self::Search | Self::Select | Self::Init | Self::Confirm)
    }

    /// Action descriptions handed to the classifier prompt.
    pub fn descriptions() -> &'static [(ProtocolAction, &'static str)] {
        &[
            (
                ProtocolAction::Search,
                "Perform a search for a service or product. If no service or product is specified, it is not a search. Listing existing bookings is not a search.",
            ),
            (
                ProtocolAction::Select,
                "The user likes or picks one of the items returned by a search.",
            ),
            (
                ProtocolAction::Init,
                "The user wants to place the order after search and select and has shared billing details.",
            ),
            (ProtocolAction::Confirm, "The user confirms the order."),
            (ProtocolAction::ClearChat, "The user wants to clear or restart the conversation."),
            (
                ProtocolAction::ClearAll,
                "The user wants to clear the complete session including their profile.",
            ),
        ]
    }
}

impl std::fmt::Display for ProtocolAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How far the current order flow has progressed. The classifier is advisory;
/// this guard is the source of truth for order validity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionProgress {
    #[default]
    Idle,
    Searched,
    Selected,
    Initialized,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("`{action}` is not valid yet: `{required}` has to happen first")]
pub struct OrderingViolation {
    pub action: ProtocolAction,
    pub required: ProtocolAction,
}

impl TransactionProgress {
    /// Checks whether `action` may run at this point of the lifecycle.
    /// `search` always restarts the flow; resets are always permitted.
    pub fn permits(&self, action: ProtocolAction) -> Result<(), OrderingViolation> {
        let required = match action {
            ProtocolAction::Select if *self == Self::Idle => Some(ProtocolAction::Search),
            ProtocolAction::Init if matches!(self, Self::Idle) => Some(ProtocolAction::Search),
            ProtocolAction::Init if matches!(self, Self::Searched) => Some(ProtocolAction::Select),
            ProtocolAction::Confirm if matches!(self, Self::Idle) => Some(ProtocolAction::Search),
            ProtocolAction::Confirm if matches!(self, Self::Searched) => {
                Some(ProtocolAction::Select)
            }
            ProtocolAction::Confirm if matches!(self, Self::Selected) => Some(ProtocolAction::Init),
            _ => None,
        };

        match required {
            Some(required) => Err(OrderingViolation { action, required }),
            None => Ok(()),
        }
    }

    /// The progress reached after `action` completed against the network.
    /// `confirm` closes the flow and returns the session to idle.
    pub fn advance(&self, action: ProtocolAction) -> Self {
        match action {
            ProtocolAction::Search => Self::Searched,
            ProtocolAction::Select => Self::Selected,
            ProtocolAction::Init => Self::Initialized,
            ProtocolAction::Confirm => Self::Idle,
            ProtocolAction::ClearChat | ProtocolAction::ClearAll => Self::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ProtocolAction, TransactionProgress};

    #[test]
    fn parse_accepts_supported_actions_only() {
        assert_eq!(ProtocolAction::parse(" Search "), Some(ProtocolAction::Search));
        assert_eq!(ProtocolAction::parse("clear_all"), Some(ProtocolAction::ClearAll));
        assert_eq!(ProtocolAction::parse("cancel"), None);
        assert_eq!(ProtocolAction::parse(""), None);
        assert_eq!(ProtocolAction::parse("null"), None);
    }

    #[test]
    fn search_is_always_permitted() {
        for progress in [
            TransactionProgress::Idle,
            TransactionProgress::Searched,
            TransactionProgress::Selected,
            TransactionProgress::Initialized,
        ] {
            assert!(progress.permits(ProtocolAction::Search).is_ok());
        }
    }

    #[test]
    fn confirm_requires_prior_init() {
        let violation = TransactionProgress::Selected
            .permits(ProtocolAction::Confirm)
            .expect_err("confirm before init must be rejected");
        assert_eq!(violation.required, ProtocolAction::Init);

        assert!(TransactionProgress::Initialized.permits(ProtocolAction::Confirm).is_ok());
    }

    #[test]
    fn select_requires_prior_search() {
        let violation = TransactionProgress::Idle
            .permits(ProtocolAction::Select)
            .expect_err("select before search must be rejected");
        assert_eq!(violation.required, ProtocolAction::Search);

        assert!(TransactionProgress::Searched.permits(ProtocolAction::Select).is_ok());
    }

    #[test]
    fn confirm_returns_flow_to_idle() {
        let progress = TransactionProgress::Initialized.advance(ProtocolAction::Confirm);
        assert_eq!(progress, TransactionProgress::Idle);
    }

    #[test]
    fn full_lifecycle_advances_in_order() {
        let mut progress = TransactionProgress::Idle;
        for action in [
            ProtocolAction::Search,
            ProtocolAction::Select,
            ProtocolAction::Init,
            ProtocolAction::Confirm,
        ] {
            progress.permits(action).expect("lifecycle order should be permitted");
            progress = progress.advance(action);
        }
        assert_eq!(progress, TransactionProgress::Idle);
    }
}
