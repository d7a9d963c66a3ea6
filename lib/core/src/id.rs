//! Identifier types for conversations and their turns.
//!
//! Identifiers wrap a ULID so they sort by creation time, and display with a
//! short prefix (`conv_…`, `turn_…`) that makes log lines easy to scan.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ulid::Ulid;

/// Error returned when an identifier cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseIdError {
    /// Which identifier type was being parsed.
    pub id_type: &'static str,
    /// Why parsing failed.
    pub reason: String,
}

impl fmt::Display for ParseIdError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to parse {}: {}", self.id_type, self.reason)
    }
}

impl std::error::Error for ParseIdError {}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Ulid);

        impl $name {
            /// Generates a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(Ulid::new())
            }

            /// Returns the underlying ULID.
            #[must_use]
            pub const fn as_ulid(&self) -> Ulid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "_{}"), self.0)
            }
        }

        impl FromStr for $name {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let raw = s.strip_prefix(concat!($prefix, "_")).unwrap_or(s);
                Ulid::from_str(raw).map(Self).map_err(|e| ParseIdError {
                    id_type: stringify!($name),
                    reason: e.to_string(),
                })
            }
        }
    };
}

define_id!(
    /// Identifies one conversation manager instance and its log.
    ConversationId,
    "conv"
);

define_id!(
    /// Identifies a single turn within a conversation log.
    TurnId,
    "turn"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_prefix() {
        assert!(ConversationId::new().to_string().starts_with("conv_"));
        assert!(TurnId::new().to_string().starts_with("turn_"));
    }

    #[test]
    fn parses_prefixed_and_raw_forms() {
        let id = TurnId::new();
        let prefixed: TurnId = id.to_string().parse().expect("prefixed should parse");
        let raw: TurnId = id.as_ulid().to_string().parse().expect("raw should parse");
        assert_eq!(prefixed, id);
        assert_eq!(raw, id);
    }

    #[test]
    fn rejects_garbage() {
        let err = "turn_nope".parse::<TurnId>().unwrap_err();
        assert_eq!(err.id_type, "TurnId");
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = TurnId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = TurnId::new();
        assert!(first < second);
    }

    #[test]
    fn serializes_as_bare_ulid() {
        let id = ConversationId::new();
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, format!("\"{}\"", id.as_ulid()));
    }
}
