//! Fact types.

use parley_core::ComposeId;
use serde::{Deserialize, Serialize};

/// An immutable record in the journal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Fact {
    /// A proposed, unsent draft.
    ComposeIntent {
        compose_id: ComposeId,
        #[serde(default)]
        text: String,
    },
    /// A draft was withdrawn.
    ComposeDismissed { compose_id: ComposeId },
    /// The counterpart sent something. Facts before it are settled.
    RemoteSent {
        #[serde(default)]
        text: String,
    },
    /// Free-form planner annotation.
    Note { text: String },
}

impl Fact {
    /// Create a compose intent with a fresh id.
    pub fn compose_intent(text: impl Into<String>) -> Self {
        Self::ComposeIntent {
            compose_id: ComposeId::generate(),
            text: text.into(),
        }
    }

    /// Create a dismissal for a draft.
    pub fn compose_dismissed(compose_id: ComposeId) -> Self {
        Self::ComposeDismissed { compose_id }
    }

    /// Create a remote send.
    pub fn remote_sent(text: impl Into<String>) -> Self {
        Self::RemoteSent { text: text.into() }
    }

    /// Create a note.
    pub fn note(text: impl Into<String>) -> Self {
        Self::Note { text: text.into() }
    }

    /// Wire name of the fact type.
    pub fn fact_type(&self) -> &'static str {
        match self {
            Self::ComposeIntent { .. } => "compose_intent",
            Self::ComposeDismissed { .. } => "compose_dismissed",
            Self::RemoteSent { .. } => "remote_sent",
            Self::Note { .. } => "note",
        }
    }

    /// The draft this fact refers to, if any.
    pub fn compose_id(&self) -> Option<&ComposeId> {
        match self {
            Self::ComposeIntent { compose_id, .. } | Self::ComposeDismissed { compose_id } => {
                Some(compose_id)
            }
            Self::RemoteSent { .. } | Self::Note { .. } => None,
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects
)]
mod tests {
    use super::*;

    #[test]
    fn should_tag_facts_by_type() {
        let fact = Fact::ComposeDismissed {
            compose_id: ComposeId::new("a"),
        };
        let json = serde_json::to_value(&fact).unwrap();
        assert_eq!(json["type"], "compose_dismissed");
        assert_eq!(json["compose_id"], "a");
    }

    #[test]
    fn should_default_missing_text() {
        let fact: Fact = serde_json::from_str(r#"{"type":"remote_sent"}"#).unwrap();
        assert_eq!(fact, Fact::remote_sent(""));
    }

    #[test]
    fn should_expose_compose_id_only_for_draft_facts() {
        assert!(Fact::compose_intent("hi").compose_id().is_some());
        assert!(Fact::remote_sent("hi").compose_id().is_none());
        assert_eq!(Fact::note("x").fact_type(), "note");
    }
}
