//! Control/target group typing.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Role of a group within a campaign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// Held back from treatment (always ordinal 1)
    Control,
    /// Receives treatment
    Target,
}

impl GroupKind {
    /// Kind of the group at a 1-based ordinal. This is the one place the
    /// ordinal-to-kind rule lives; creation and incremental assignment both
    /// go through it.
    #[must_use]
    pub fn for_ordinal(ordinal: u32) -> Self {
        if ordinal == 1 {
            Self::Control
        } else {
            Self::Target
        }
    }

    /// Convert to database string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Control => "control",
            Self::Target => "target",
        }
    }

    /// Parse from database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "control" => Some(Self::Control),
            "target" => Some(Self::Target),
            _ => None,
        }
    }
}

impl fmt::Display for GroupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_ordinal_is_control() {
        assert_eq!(GroupKind::for_ordinal(1), GroupKind::Control);
        assert_eq!(GroupKind::for_ordinal(2), GroupKind::Target);
        assert_eq!(GroupKind::for_ordinal(7), GroupKind::Target);
    }

    #[test]
    fn test_parse_round_trips_as_str() {
        for kind in [GroupKind::Control, GroupKind::Target] {
            assert_eq!(GroupKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(GroupKind::parse("holdout"), None);
    }
}
