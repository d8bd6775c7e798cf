//! Input bindings: literal values and `"<node>.<key>"` references.
//!
//! Reference strings are parsed once, when the binding is declared, so the
//! resolver only ever deals with a structured `(node, key)` pair.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::EngineError;

/// A pointer to another node's output: `<node>.<key>`.
///
/// The string is split at the first dot, so `"search.results.0"` names node
/// `search` and key `results.0`.  Subflow outputs are addressed this way:
/// `"S.X.y"` reads key `X.y` published by subflow `S`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    node: String,
    key: String,
}

impl Reference {
    pub fn new(node: impl Into<String>, key: impl Into<String>) -> Result<Self, EngineError> {
        let node = node.into();
        let key = key.into();
        if node.is_empty() || key.is_empty() {
            return Err(EngineError::InvalidReference(format!("{node}.{key}")));
        }
        Ok(Self { node, key })
    }

    pub fn parse(raw: &str) -> Result<Self, EngineError> {
        match raw.split_once('.') {
            Some((node, key)) if !node.is_empty() && !key.is_empty() => Ok(Self {
                node: node.to_owned(),
                key: key.to_owned(),
            }),
            _ => Err(EngineError::InvalidReference(raw.to_owned())),
        }
    }

    pub fn node(&self) -> &str {
        &self.node
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// The flat output-store key this reference reads.
    pub fn store_key(&self) -> String {
        format!("{}.{}", self.node, self.key)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.node, self.key)
    }
}

impl FromStr for Reference {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// How a unit's declared input gets its value.
#[derive(Debug, Clone, PartialEq)]
pub enum Binding {
    /// Passed through unchanged.
    Literal(Value),
    /// Looked up in the output store when the unit starts.
    Reference(Reference),
}

impl Binding {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn reference(raw: &str) -> Result<Self, EngineError> {
        Reference::parse(raw).map(Self::Reference)
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Self::Reference(r) => Some(r),
            Self::Literal(_) => None,
        }
    }
}

impl From<Reference> for Binding {
    fn from(reference: Reference) -> Self {
        Self::Reference(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_at_first_dot() {
        let r = Reference::parse("S.X.y").unwrap();
        assert_eq!(r.node(), "S");
        assert_eq!(r.key(), "X.y");
        assert_eq!(r.store_key(), "S.X.y");
        assert_eq!(r.to_string(), "S.X.y");
    }

    #[test]
    fn malformed_references_are_rejected() {
        for raw in ["", "nodot", ".key", "node.", "."] {
            assert!(
                matches!(Reference::parse(raw), Err(EngineError::InvalidReference(_))),
                "{raw:?} should be rejected"
            );
        }
        assert!(Reference::new("", "k").is_err());
    }

    #[test]
    fn binding_constructors() {
        assert_eq!(Binding::literal(3), Binding::Literal(Value::from(3)));
        let b = Binding::reference("A.x").unwrap();
        assert_eq!(b.as_reference().map(Reference::node), Some("A"));
        assert!(Binding::reference("A").is_err());
    }
}
