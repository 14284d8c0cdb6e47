//! Excel-style sentinel tokens.
//!
//! A sentinel is stored as a node's value when evaluation fails at runtime.
//! It is a normal, persisted outcome that flows to dependents like any other
//! value, never a thrown error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Token a read returns in place of a value the requester may not see.
pub const UNAUTHORIZED_TOKEN: &str = "#AUTH!";

/// Every `#...` token the formula scanner must never read as an identifier.
pub const RESERVED_TOKENS: [&str; 8] = [
    "#REF!", "#N/A", "#VALUE!", "#NAME?", "#DIV/0!", "#NUM!", "#NULL!", "#AUTH!",
];

/// The canonical runtime failure tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sentinel {
    /// `#REF!`: reference to a deleted node.
    Ref,
    /// `#N/A`: an operand was null where a value is required.
    NotAvailable,
    /// `#VALUE!`: operand types incompatible with the operation.
    Value,
    /// `#NAME?`: call to an undefined function.
    Name,
    /// `#DIV/0!`: infinite numeric result.
    DivZero,
    /// `#NUM!`: NaN or otherwise invalid numeric result.
    Num,
}

impl Sentinel {
    pub const ALL: [Sentinel; 6] = [
        Sentinel::Ref,
        Sentinel::NotAvailable,
        Sentinel::Value,
        Sentinel::Name,
        Sentinel::DivZero,
        Sentinel::Num,
    ];

    pub fn token(self) -> &'static str {
        match self {
            Sentinel::Ref => "#REF!",
            Sentinel::NotAvailable => "#N/A",
            Sentinel::Value => "#VALUE!",
            Sentinel::Name => "#NAME?",
            Sentinel::DivZero => "#DIV/0!",
            Sentinel::Num => "#NUM!",
        }
    }

    pub fn from_token(token: &str) -> Option<Sentinel> {
        Sentinel::ALL.into_iter().find(|s| s.token() == token)
    }

    /// Default diagnostic stored in a node's `error` alongside the token.
    pub fn description(self) -> &'static str {
        match self {
            Sentinel::Ref => "reference to deleted node",
            Sentinel::NotAvailable => "value not available (null) in operation",
            Sentinel::Value => "incompatible type in operation",
            Sentinel::Name => "unknown or undefined function",
            Sentinel::DivZero => "division by zero or infinite result",
            Sentinel::Num => "invalid numeric result (NaN)",
        }
    }
}

impl fmt::Display for Sentinel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_roundtrip_through_lookup() {
        for s in Sentinel::ALL {
            assert_eq!(Sentinel::from_token(s.token()), Some(s));
        }
        assert_eq!(Sentinel::from_token("#NULL!"), None);
        assert_eq!(Sentinel::from_token("REF"), None);
    }

    #[test]
    fn every_sentinel_is_reserved() {
        for s in Sentinel::ALL {
            assert!(RESERVED_TOKENS.contains(&s.token()));
        }
        assert!(RESERVED_TOKENS.contains(&UNAUTHORIZED_TOKEN));
    }
}
