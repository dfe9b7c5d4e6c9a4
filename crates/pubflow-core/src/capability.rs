//! # Capability Levels
//!
//! What an actor may do to an artifact. The derived `Ord` follows the
//! declaration order, so holding `Admin` satisfies a `Write` requirement.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Capability an actor holds over an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// May view a non-public artifact.
    Read,
    /// May edit metadata, submit for review, request withdrawal, version.
    Write,
    /// May change visibility, publish, resolve withdrawals, moderate.
    Admin,
}

impl Capability {
    /// Whether holding `self` satisfies a requirement of `required`.
    pub fn satisfies(&self, required: Capability) -> bool {
        *self >= required
    }

    /// Return the string representation of this capability.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Read => "read",
            Self::Write => "write",
            Self::Admin => "admin",
        }
    }

    /// Parse from the lowercase wire name.
    pub fn from_name(name: &str) -> Result<Self, ValidationError> {
        match name {
            "read" => Ok(Self::Read),
            "write" => Ok(Self::Write),
            "admin" => Ok(Self::Admin),
            other => Err(ValidationError::UnknownCapability(other.to_string())),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_satisfies_everything() {
        assert!(Capability::Admin.satisfies(Capability::Read));
        assert!(Capability::Admin.satisfies(Capability::Write));
        assert!(Capability::Admin.satisfies(Capability::Admin));
    }

    #[test]
    fn read_satisfies_only_read() {
        assert!(Capability::Read.satisfies(Capability::Read));
        assert!(!Capability::Read.satisfies(Capability::Write));
        assert!(!Capability::Read.satisfies(Capability::Admin));
    }

    #[test]
    fn name_round_trip() {
        for cap in [Capability::Read, Capability::Write, Capability::Admin] {
            assert_eq!(Capability::from_name(cap.as_str()).unwrap(), cap);
        }
    }

    #[test]
    fn unknown_name_rejected() {
        assert!(matches!(
            Capability::from_name("owner"),
            Err(ValidationError::UnknownCapability(_))
        ));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&Capability::Admin).unwrap();
        assert_eq!(json, "\"admin\"");
    }
}
