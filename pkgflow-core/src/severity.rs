//! Outcome severity levels
//!
//! Levels are totally ordered `OK < NOTE < WARNING < ERROR`. Merging two
//! levels keeps the more severe one; equal levels keep the existing value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Severity of a check finding or of a whole check run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Nothing to report
    #[default]
    Ok,
    /// Informational finding
    Note,
    /// Finding that deserves attention
    Warning,
    /// Finding that fails the check
    Error,
}

impl Severity {
    /// All levels in ascending order
    pub const ALL: [Severity; 4] = [Self::Ok, Self::Note, Self::Warning, Self::Error];

    /// Parse a trailing status tag as printed by the check toolchain
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "OK" => Some(Self::Ok),
            "NOTE" => Some(Self::Note),
            "WARNING" => Some(Self::Warning),
            "ERROR" => Some(Self::Error),
            _ => None,
        }
    }

    /// Tag text for this level
    pub fn as_tag(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Note => "NOTE",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
        }
    }

    /// Merge with another level. Only a strictly greater level replaces `self`.
    #[must_use]
    pub fn merge(self, other: Self) -> Self {
        if other > self { other } else { self }
    }

    /// Most severe level of a sequence, `Ok` when empty
    pub fn rollup<I: IntoIterator<Item = Severity>>(levels: I) -> Self {
        levels.into_iter().fold(Self::Ok, Self::merge)
    }

    /// Whether this level fails a check on its own
    pub fn fails(self) -> bool {
        self == Self::Error
    }

    /// Whether a fail-override pattern may escalate a finding of this level
    pub fn overridable(self) -> bool {
        matches!(self, Self::Note | Self::Warning)
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Severity::Ok < Severity::Note);
        assert!(Severity::Note < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
    }

    #[test]
    fn test_merge_keeps_more_severe() {
        assert_eq!(Severity::Note.merge(Severity::Error), Severity::Error);
        assert_eq!(Severity::Error.merge(Severity::Note), Severity::Error);
        assert_eq!(Severity::Warning.merge(Severity::Warning), Severity::Warning);
    }

    #[test]
    fn test_rollup() {
        assert_eq!(Severity::rollup([]), Severity::Ok);
        assert_eq!(
            Severity::rollup([Severity::Note, Severity::Ok, Severity::Warning, Severity::Note]),
            Severity::Warning
        );
    }

    #[test]
    fn test_tags_round_trip() {
        for level in Severity::ALL {
            assert_eq!(Severity::from_tag(level.as_tag()), Some(level));
        }
        assert_eq!(Severity::from_tag("Package"), None);
        assert_eq!(Severity::from_tag("note"), None);
    }

    #[test]
    fn test_serde_uses_tags() {
        assert_eq!(serde_json::to_string(&Severity::Warning).unwrap(), "\"WARNING\"");
        let level: Severity = serde_json::from_str("\"NOTE\"").unwrap();
        assert_eq!(level, Severity::Note);
    }

    #[test]
    fn test_only_note_and_warning_are_overridable() {
        assert!(!Severity::Ok.overridable());
        assert!(Severity::Note.overridable());
        assert!(Severity::Warning.overridable());
        assert!(!Severity::Error.overridable());
        assert!(Severity::Error.fails());
        assert!(!Severity::Warning.fails());
    }
}
