//! # Error Types
//!
//! Validation errors for the foundational types. State machine errors live
//! next to the state machine in `pubflow-state`.

use thiserror::Error;

/// Validation failure for a foundational value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Identifier string is not a UUID.
    #[error("invalid {kind} identifier {value:?}")]
    InvalidIdentifier {
        /// Identifier namespace ("artifact", "actor", "request").
        kind: &'static str,
        /// The rejected input.
        value: String,
    },

    /// Timestamp string is not valid RFC 3339.
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Capability name is not one of read/write/admin.
    #[error("unknown capability {0:?}")]
    UnknownCapability(String),
}
