//! Property value types.

use std::fmt;

use crate::core::{NodeId, TokenError, PROPERTY_TOKEN_FIELDS};
use crate::wire::{escape_and_join, split_and_unescape};

/// Composite identity of a property slot: (origin node, property key).
///
/// This is the *only* identity that matters for set semantics; sequence
/// number and value never take part in equality or hashing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompositeKey {
    origin: NodeId,
    key: String,
}

impl CompositeKey {
    /// Create a composite key.
    pub fn new(origin: NodeId, key: impl Into<String>) -> Self {
        Self {
            origin,
            key: key.into(),
        }
    }

    /// The node that authored the property slot.
    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    /// The property key within that node's namespace.
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl fmt::Display for CompositeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.origin, self.key)
    }
}

/// One published node property: an immutable (origin, key, sequence, value)
/// record.
///
/// An absent value represents a retraction of the key; the entry itself still
/// circulates so the retraction can overwrite stale copies on other nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeProperty {
    origin: NodeId,
    key: String,
    sequence_no: u64,
    value: Option<String>,
}

impl NodeProperty {
    /// Create a property record.
    pub fn new(
        origin: NodeId,
        key: impl Into<String>,
        sequence_no: u64,
        value: Option<String>,
    ) -> Self {
        Self {
            origin,
            key: key.into(),
            sequence_no,
            value,
        }
    }

    /// The node that authored this property.
    pub fn origin(&self) -> &NodeId {
        &self.origin
    }

    /// The property key.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The logical version of this entry within its composite key's history.
    pub fn sequence_no(&self) -> u64 {
        self.sequence_no
    }

    /// The property value; `None` for a retraction.
    pub fn value(&self) -> Option<&str> {
        self.value.as_deref()
    }

    /// Whether this entry retracts its key.
    pub fn is_retraction(&self) -> bool {
        self.value.is_none()
    }

    /// The composite identity of this property's slot.
    pub fn composite_key(&self) -> CompositeKey {
        CompositeKey::new(self.origin.clone(), self.key.clone())
    }

    /// Encode into the 4-field wire token.
    pub fn to_token(&self) -> String {
        let sequence = self.sequence_no.to_string();
        escape_and_join([
            Some(self.origin.as_str()),
            Some(self.key.as_str()),
            Some(sequence.as_str()),
            self.value.as_deref(),
        ])
    }

    /// Decode from the 4-field wire token.
    pub fn from_token(token: &str) -> Result<Self, TokenError> {
        let mut fields = split_and_unescape(token);
        if fields.len() != PROPERTY_TOKEN_FIELDS {
            return Err(TokenError::FieldCount {
                expected: PROPERTY_TOKEN_FIELDS,
                actual: fields.len(),
            });
        }
        let value = fields.pop().expect("length checked");
        let sequence = fields.pop().expect("length checked");
        let key = fields.pop().expect("length checked");
        let origin = fields.pop().expect("length checked");

        let origin = origin.ok_or(TokenError::NullField("origin node id"))?;
        let key = key.ok_or(TokenError::NullField("property key"))?;
        let sequence = sequence.ok_or(TokenError::NullField("sequence number"))?;
        let sequence_no = sequence
            .parse::<u64>()
            .map_err(|_| TokenError::InvalidSequenceNumber(sequence))?;

        Ok(Self {
            origin: NodeId::from(origin),
            key,
            sequence_no,
            value,
        })
    }
}

impl fmt::Display for NodeProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.value {
            Some(value) => write!(
                f,
                "({}, '{}' := '{}' [{}])",
                self.origin, self.key, value, self.sequence_no
            ),
            None => write!(
                f,
                "({}, '{}' retracted [{}])",
                self.origin, self.key, self.sequence_no
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prop(origin: &str, key: &str, seq: u64, value: Option<&str>) -> NodeProperty {
        NodeProperty::new(NodeId::from(origin), key, seq, value.map(String::from))
    }

    #[test]
    fn test_token_roundtrip() {
        let original = prop("node-1", "displayName", 42, Some("Alice"));
        let decoded = NodeProperty::from_token(&original.to_token()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_token_roundtrip_with_separators_in_value() {
        let original = prop("node-1", "endpoint", 7, Some("tcp://host:21000\\x"));
        let decoded = NodeProperty::from_token(&original.to_token()).unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_retraction_roundtrip() {
        let original = prop("node-1", "displayName", 43, None);
        let decoded = NodeProperty::from_token(&original.to_token()).unwrap();
        assert!(decoded.is_retraction());
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_wrong_field_count_is_rejected() {
        let result = NodeProperty::from_token("only:three:fields");
        assert_eq!(
            result,
            Err(TokenError::FieldCount {
                expected: 4,
                actual: 3
            })
        );

        let result = NodeProperty::from_token("a:b:1:v:extra");
        assert_eq!(
            result,
            Err(TokenError::FieldCount {
                expected: 4,
                actual: 5
            })
        );
    }

    #[test]
    fn test_bad_sequence_number_is_rejected() {
        let result = NodeProperty::from_token("a:b:not-a-number:v");
        assert!(matches!(
            result,
            Err(TokenError::InvalidSequenceNumber(_))
        ));
    }

    #[test]
    fn test_null_mandatory_field_is_rejected() {
        let result = NodeProperty::from_token("\\0:b:1:v");
        assert_eq!(result, Err(TokenError::NullField("origin node id")));
    }

    #[test]
    fn test_identity_ignores_sequence_and_value() {
        let a = prop("n", "k", 1, Some("x"));
        let b = prop("n", "k", 99, None);
        assert_eq!(a.composite_key(), b.composite_key());

        let c = prop("n", "other", 1, Some("x"));
        assert_ne!(a.composite_key(), c.composite_key());
    }
}
