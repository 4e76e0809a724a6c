//! Protocol stages.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a test in the GIVEN → WHEN → THEN protocol.
///
/// A test starts at [`Stage::Given`] and only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Preconditions are being registered
    #[default]
    Given,
    /// The system under test has been invoked (or is staged for invocation)
    When,
    /// Assertions have started; terminal
    Then,
}

impl Stage {
    /// Upper-case protocol name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Given => "GIVEN",
            Self::When => "WHEN",
            Self::Then => "THEN",
        }
    }

    /// Whether the protocol is complete
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Then)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_given() {
        assert_eq!(Stage::default(), Stage::Given);
    }

    #[test]
    fn ordering_follows_protocol() {
        assert!(Stage::Given < Stage::When);
        assert!(Stage::When < Stage::Then);
    }

    #[test]
    fn only_then_is_terminal() {
        assert!(!Stage::Given.is_terminal());
        assert!(!Stage::When.is_terminal());
        assert!(Stage::Then.is_terminal());
    }

    #[test]
    fn serializes_upper_case() {
        let json = serde_json::to_string(&Stage::When).unwrap();
        assert_eq!(json, "\"WHEN\"");
        let back: Stage = serde_json::from_str("\"THEN\"").unwrap();
        assert_eq!(back, Stage::Then);
    }
}
