//! # Identifier Newtypes
//!
//! Artifacts, actors and withdrawal requests each get their own UUID
//! newtype. Mixing them up is a type error.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

/// Unique identifier for an artifact (a preprint or registration version).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactId(pub Uuid);

/// Identity of a user or service acting on artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(pub Uuid);

/// Unique identifier for a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

macro_rules! impl_uuid_newtype {
    ($ty:ident, $kind:literal) => {
        impl $ty {
            /// Generate a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Access the inner UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            /// Parse from the hyphenated UUID form.
            pub fn parse(s: &str) -> Result<Self, ValidationError> {
                Uuid::parse_str(s.trim())
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidIdentifier {
                        kind: $kind,
                        value: s.to_string(),
                    })
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $ty {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::parse(s)
            }
        }

        impl std::fmt::Display for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

impl_uuid_newtype!(ArtifactId, "artifact");
impl_uuid_newtype!(ActorId, "actor");
impl_uuid_newtype!(RequestId, "request");

impl ActorId {
    /// The actor recorded for scheduled operations, such as lifting an
    /// elapsed embargo. Never a contributor.
    pub fn system() -> Self {
        Self(Uuid::nil())
    }

    pub fn is_system(&self) -> bool {
        self.0.is_nil()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_actor_is_stable() {
        assert_eq!(ActorId::system(), ActorId::system());
        assert!(ActorId::system().is_system());
        assert!(!ActorId::new().is_system());
    }

    #[test]
    fn new_ids_are_distinct() {
        assert_ne!(ArtifactId::new(), ArtifactId::new());
        assert_ne!(ActorId::new(), ActorId::new());
    }

    #[test]
    fn parse_accepts_hyphenated_uuid() {
        let raw = "0b6f3c1e-7f57-4f0b-9a53-3f3c2c9d1a10";
        let id = ArtifactId::parse(raw).unwrap();
        assert_eq!(id.to_string(), raw);
    }

    #[test]
    fn parse_trims_whitespace() {
        let id = ActorId::parse(" 0b6f3c1e-7f57-4f0b-9a53-3f3c2c9d1a10 ").unwrap();
        assert_eq!(id.to_string(), "0b6f3c1e-7f57-4f0b-9a53-3f3c2c9d1a10");
    }

    #[test]
    fn parse_rejects_garbage_with_kind() {
        let err = RequestId::parse("abc12").unwrap_err();
        match err {
            ValidationError::InvalidIdentifier { kind, value } => {
                assert_eq!(kind, "request");
                assert_eq!(value, "abc12");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn serde_is_transparent() {
        let id = ArtifactId::parse("0b6f3c1e-7f57-4f0b-9a53-3f3c2c9d1a10").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"0b6f3c1e-7f57-4f0b-9a53-3f3c2c9d1a10\"");
    }
}
