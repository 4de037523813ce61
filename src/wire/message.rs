//! Property update messages.

use crate::core::{ProtocolError, TokenError, SUBTYPE_INCREMENTAL, SUBTYPE_INITIAL};
use crate::knowledge::NodeProperty;
use crate::wire::escape::{escape_and_join, split_and_unescape};

/// Kind of a property update message.
///
/// The subtype set is closed; any other token on the wire is a
/// [`ProtocolError::UnknownSubtype`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateKind {
    /// Anti-entropy exchange opening a new neighbor link; the receiver
    /// answers with its complementing knowledge.
    Initial,
    /// Incremental delta; the receiver answers with an empty acknowledgement.
    Incremental,
}

impl UpdateKind {
    /// The wire token of this subtype.
    pub fn token(self) -> &'static str {
        match self {
            UpdateKind::Initial => SUBTYPE_INITIAL,
            UpdateKind::Incremental => SUBTYPE_INCREMENTAL,
        }
    }

    /// Parse a wire subtype token.
    pub fn from_token(token: &str) -> Result<Self, ProtocolError> {
        match token {
            SUBTYPE_INITIAL => Ok(UpdateKind::Initial),
            SUBTYPE_INCREMENTAL => Ok(UpdateKind::Incremental),
            other => Err(ProtocolError::UnknownSubtype(other.to_string())),
        }
    }
}

/// A decoded property update message: subtype plus a batch of entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyUpdate {
    /// The update subtype.
    pub kind: UpdateKind,
    /// The property entries carried by this update.
    pub entries: Vec<NodeProperty>,
}

impl PropertyUpdate {
    /// Create an update message.
    pub fn new(kind: UpdateKind, entries: Vec<NodeProperty>) -> Self {
        Self { kind, entries }
    }

    /// Encode to the wire body: the subtype token followed by one token per
    /// entry, escape-joined.
    pub fn encode(&self) -> String {
        let entry_tokens: Vec<String> = self.entries.iter().map(NodeProperty::to_token).collect();
        let mut parts: Vec<Option<&str>> = Vec::with_capacity(entry_tokens.len() + 1);
        parts.push(Some(self.kind.token()));
        parts.extend(entry_tokens.iter().map(|token| Some(token.as_str())));
        escape_and_join(parts)
    }

    /// Decode from a wire body.
    pub fn decode(body: &str) -> Result<Self, ProtocolError> {
        if body.is_empty() {
            return Err(ProtocolError::EmptyBody);
        }

        let parts = split_and_unescape(body);
        let mut parts = parts.into_iter();
        let kind = match parts.next() {
            Some(Some(token)) => UpdateKind::from_token(&token)?,
            Some(None) | None => return Err(ProtocolError::EmptyBody),
        };

        let mut entries = Vec::new();
        for part in parts {
            let token = part.ok_or(ProtocolError::Token(TokenError::NullField(
                "property token",
            )))?;
            entries.push(NodeProperty::from_token(&token)?);
        }

        Ok(Self { kind, entries })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::NodeId;

    fn prop(origin: &str, key: &str, seq: u64, value: Option<&str>) -> NodeProperty {
        NodeProperty::new(NodeId::from(origin), key, seq, value.map(String::from))
    }

    #[test]
    fn test_encode_decode_roundtrip() {
        let update = PropertyUpdate::new(
            UpdateKind::Incremental,
            vec![
                prop("node-1", "displayName", 100, Some("Alice")),
                prop("node-1", "endpoint", 100, Some("tcp://host:21000")),
                prop("node-2", "displayName", 7, None),
            ],
        );

        let decoded = PropertyUpdate::decode(&update.encode()).unwrap();
        assert_eq!(decoded, update);
    }

    #[test]
    fn test_empty_update_roundtrip() {
        let update = PropertyUpdate::new(UpdateKind::Initial, Vec::new());
        assert_eq!(update.encode(), "init");

        let decoded = PropertyUpdate::decode("init").unwrap();
        assert_eq!(decoded.kind, UpdateKind::Initial);
        assert!(decoded.entries.is_empty());
    }

    #[test]
    fn test_unknown_subtype_is_rejected() {
        let result = PropertyUpdate::decode("gossip:a:b:1:v");
        assert_eq!(
            result,
            Err(ProtocolError::UnknownSubtype("gossip".to_string()))
        );
    }

    #[test]
    fn test_empty_body_is_rejected() {
        assert_eq!(PropertyUpdate::decode(""), Err(ProtocolError::EmptyBody));
        // The encoded empty part list carries no subtype either.
        assert_eq!(PropertyUpdate::decode("\\"), Err(ProtocolError::EmptyBody));
    }

    #[test]
    fn test_malformed_entry_token_is_rejected() {
        let body = escape_and_join([Some("delta"), Some("only:two")]);
        let result = PropertyUpdate::decode(&body);
        assert_eq!(
            result,
            Err(ProtocolError::Token(TokenError::FieldCount {
                expected: 4,
                actual: 2
            }))
        );
    }

    #[test]
    fn test_subtype_tokens() {
        assert_eq!(UpdateKind::Initial.token(), "init");
        assert_eq!(UpdateKind::Incremental.token(), "delta");
        assert_eq!(UpdateKind::from_token("init"), Ok(UpdateKind::Initial));
        assert_eq!(
            UpdateKind::from_token("delta"),
            Ok(UpdateKind::Incremental)
        );
    }
}
