//! The tagged message unit that flows through the shared channel.

use crate::errors::EnvelopeError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Discriminator identifying which stage should consume an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// A new item entering the pipeline.
    Submission,
    /// An item that has been assigned an identifier.
    Confirmation,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Submission => write!(f, "submission"),
            Self::Confirmation => write!(f, "confirmation"),
        }
    }
}

/// A tagged message: a kind, a bounded name and, for confirmations, an
/// identifier.
///
/// Envelopes are immutable once built and can only be built through the
/// validating constructors, so every envelope on the channel has a
/// non-empty name of at most [`MAX_NAME_LEN`](Self::MAX_NAME_LEN) bytes and
/// carries an id exactly when it is a confirmation. A stage that needs a
/// different kind builds a new envelope from the fields it carries forward.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EnvelopeRepr", into = "EnvelopeRepr")]
pub struct Envelope {
    kind: MessageKind,
    name: String,
    id: Option<u32>,
}

/// Wire form: one variant per kind, tagged by `kind`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EnvelopeRepr {
    Submission { name: String },
    Confirmation { name: String, id: u32 },
}

impl TryFrom<EnvelopeRepr> for Envelope {
    type Error = EnvelopeError;

    fn try_from(repr: EnvelopeRepr) -> Result<Self, Self::Error> {
        match repr {
            EnvelopeRepr::Submission { name } => Self::submission(name),
            EnvelopeRepr::Confirmation { name, id } => Self::confirmation(name, id),
        }
    }
}

impl From<Envelope> for EnvelopeRepr {
    fn from(envelope: Envelope) -> Self {
        match envelope.id {
            Some(id) => Self::Confirmation {
                name: envelope.name,
                id,
            },
            None => Self::Submission {
                name: envelope.name,
            },
        }
    }
}

impl Envelope {
    /// Maximum name length in bytes.
    pub const MAX_NAME_LEN: usize = 49;

    /// Bytes taken by the kind tag on the wire.
    pub const TAG_SIZE: usize = 8;

    /// Bytes taken by an identifier on the wire.
    pub const ID_SIZE: usize = 4;

    /// Wire size of the largest variant: a confirmation with a full-length name.
    pub const MAX_WIRE_SIZE: usize = Self::TAG_SIZE + Self::MAX_NAME_LEN + Self::ID_SIZE;

    /// Wire size of the smallest variant: a submission with a one-byte name.
    pub const MIN_WIRE_SIZE: usize = Self::TAG_SIZE + 1;

    /// Builds a submission envelope.
    pub fn submission(name: impl Into<String>) -> Result<Self, EnvelopeError> {
        Ok(Self {
            kind: MessageKind::Submission,
            name: validate_name(name.into())?,
            id: None,
        })
    }

    /// Builds a confirmation envelope.
    pub fn confirmation(name: impl Into<String>, id: u32) -> Result<Self, EnvelopeError> {
        Ok(Self {
            kind: MessageKind::Confirmation,
            name: validate_name(name.into())?,
            id: Some(id),
        })
    }

    /// Builds a confirmation for this submission with a freshly assigned id.
    ///
    /// Fails if `self` is not a submission.
    pub fn confirm(&self, id: u32) -> Result<Self, EnvelopeError> {
        if self.kind != MessageKind::Submission {
            return Err(EnvelopeError::UnexpectedKind {
                expected: MessageKind::Submission.to_string(),
                actual: self.kind.to_string(),
            });
        }
        Ok(Self {
            kind: MessageKind::Confirmation,
            name: self.name.clone(),
            id: Some(id),
        })
    }

    /// Returns the kind tag.
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    /// Returns the carried name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the assigned identifier, if this kind carries one.
    #[must_use]
    pub fn id(&self) -> Option<u32> {
        self.id
    }

    /// Splits the envelope into its name and identifier.
    #[must_use]
    pub fn into_parts(self) -> (String, Option<u32>) {
        (self.name, self.id)
    }

    /// Returns the number of bytes this envelope occupies on the wire.
    #[must_use]
    pub fn wire_size(&self) -> usize {
        let id = if self.id.is_some() { Self::ID_SIZE } else { 0 };
        Self::TAG_SIZE + self.name.len() + id
    }
}

impl fmt::Display for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.id {
            None => write!(f, "submission({})", self.name),
            Some(id) => write!(f, "confirmation({}, {id})", self.name),
        }
    }
}

fn validate_name(name: String) -> Result<String, EnvelopeError> {
    if name.is_empty() {
        return Err(EnvelopeError::EmptyName);
    }
    if name.len() > Envelope::MAX_NAME_LEN {
        return Err(EnvelopeError::NameTooLong {
            len: name.len(),
            max: Envelope::MAX_NAME_LEN,
        });
    }
    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_kind_and_fields() {
        let env = Envelope::submission("Alice").unwrap();
        assert_eq!(env.kind(), MessageKind::Submission);
        assert_eq!(env.name(), "Alice");
        assert_eq!(env.id(), None);
    }

    #[test]
    fn test_confirm_carries_name_and_fresh_id() {
        let sub = Envelope::submission("Bob").unwrap();
        let conf = sub.confirm(1002).unwrap();

        assert_eq!(conf.kind(), MessageKind::Confirmation);
        assert_eq!(conf.name(), "Bob");
        assert_eq!(conf.id(), Some(1002));
        // The source envelope is untouched.
        assert_eq!(sub.kind(), MessageKind::Submission);
    }

    #[test]
    fn test_confirm_rejects_confirmation() {
        let conf = Envelope::confirmation("Carol", 7).unwrap();
        let err = conf.confirm(8).unwrap_err();
        assert!(matches!(err, EnvelopeError::UnexpectedKind { .. }));
    }

    #[test]
    fn test_name_bounds() {
        assert_eq!(Envelope::submission("").unwrap_err(), EnvelopeError::EmptyName);

        let longest = "x".repeat(Envelope::MAX_NAME_LEN);
        assert!(Envelope::submission(longest.clone()).is_ok());

        let too_long = format!("{longest}y");
        assert_eq!(
            Envelope::submission(too_long).unwrap_err(),
            EnvelopeError::NameTooLong { len: 50, max: 49 }
        );
    }

    #[test]
    fn test_wire_size_bounded_by_largest_variant() {
        let longest = "x".repeat(Envelope::MAX_NAME_LEN);
        let conf = Envelope::confirmation(longest, u32::MAX).unwrap();
        assert_eq!(conf.wire_size(), Envelope::MAX_WIRE_SIZE);

        let small = Envelope::submission("a").unwrap();
        assert_eq!(small.wire_size(), Envelope::MIN_WIRE_SIZE);
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let conf = Envelope::confirmation("Alice", 1001).unwrap();
        let json = serde_json::to_value(&conf).unwrap();
        assert_eq!(json["kind"], "confirmation");
        assert_eq!(json["id"], 1001);

        let sub = serde_json::to_value(Envelope::submission("Bob").unwrap()).unwrap();
        assert_eq!(sub, serde_json::json!({"kind": "submission", "name": "Bob"}));
    }

    #[test]
    fn test_deserialize_validates_name() {
        let conf: Envelope =
            serde_json::from_str(r#"{"kind": "confirmation", "name": "Alice", "id": 7}"#).unwrap();
        assert_eq!(conf, Envelope::confirmation("Alice", 7).unwrap());

        let empty = serde_json::from_str::<Envelope>(r#"{"kind": "submission", "name": ""}"#);
        assert!(empty.unwrap_err().to_string().contains("must not be empty"));

        let long = format!(r#"{{"kind": "submission", "name": "{}"}}"#, "x".repeat(50));
        assert!(serde_json::from_str::<Envelope>(&long).is_err());
    }
}
