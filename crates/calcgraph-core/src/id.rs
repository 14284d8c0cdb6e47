//! Stable node identifier.
//!
//! A [`NodeId`] is both the primary key of a node and the variable name other
//! formulas use to reference it, so it must lex as a single identifier and
//! must not collide with a keyword of the formula language.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CoreError;

/// Keywords of the formula language. None of them can be a node id.
pub const RESERVED_WORDS: [&str; 10] = [
    "true", "false", "null", "nil", "if", "else", "in", "and", "or", "not",
];

/// Stable node identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Validates `id` and wraps it.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if let Some(reason) = identifier_violation(&id) {
            return Err(CoreError::InvalidNodeId { id, reason });
        }
        Ok(NodeId(id))
    }

    /// Generates a fresh random id (`n` + 32 hex digits).
    pub fn generate() -> Self {
        NodeId(format!("n{}", Uuid::new_v4().simple()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

/// Returns true if `s` is usable as a node id.
pub fn is_identifier(s: &str) -> bool {
    identifier_violation(s).is_none()
}

fn identifier_violation(s: &str) -> Option<&'static str> {
    let mut chars = s.chars();
    match chars.next() {
        None => return Some("empty"),
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        Some(_) => return Some("must start with a letter or '_'"),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Some("only ASCII letters, digits and '_' are allowed");
    }
    if RESERVED_WORDS.iter().any(|w| w.eq_ignore_ascii_case(s)) {
        return Some("reserved word");
    }
    None
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for NodeId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeId::new(s)
    }
}

impl AsRef<str> for NodeId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for NodeId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(NodeId::new("total").is_ok());
        assert!(NodeId::new("_tmp2").is_ok());
        assert!(NodeId::new("A").is_ok());
    }

    #[test]
    fn rejects_non_identifiers() {
        assert!(NodeId::new("").is_err());
        assert!(NodeId::new("2abc").is_err());
        assert!(NodeId::new("a-b").is_err());
        assert!(NodeId::new("a.b").is_err());
    }

    #[test]
    fn rejects_keywords_case_insensitively() {
        assert!(NodeId::new("if").is_err());
        assert!(NodeId::new("TRUE").is_err());
        assert!(NodeId::new("In").is_err());
    }

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert!(is_identifier(a.as_str()));
        assert_eq!(a.as_str().len(), 33);
        assert_ne!(a, b);
    }

    #[test]
    fn serializes_transparently() {
        let id = NodeId::new("price").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"price\"");
    }
}
