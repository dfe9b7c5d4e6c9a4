//! Controller errors.

use thiserror::Error;

use pubflow_core::{ArtifactId, RequestId};
use pubflow_state::LifecycleError;

/// Errors returned by [`crate::LifecycleController`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ControllerError {
    /// Rejected by the state machine. The artifact is unchanged.
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Another transition on the same artifact is in progress, or the
    /// caller's observed revision is stale. Safe to retry after re-reading.
    #[error("conflicting transition on artifact {artifact}: {detail}")]
    ConflictingTransition { artifact: ArtifactId, detail: String },

    #[error("artifact {0} not found")]
    NotFound(ArtifactId),

    #[error("withdrawal request {0} not found")]
    RequestNotFound(RequestId),
}

impl ControllerError {
    /// Short machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Lifecycle(err) => match err {
                LifecycleError::PermissionDenied { .. } => "PERMISSION_DENIED",
                LifecycleError::InvalidTransition { .. } => "INVALID_TRANSITION",
                LifecycleError::PreconditionFailed { .. } => "PRECONDITION_FAILED",
                LifecycleError::ConflictingRequest { .. } => "CONFLICTING_REQUEST",
                LifecycleError::AlreadyResolved { .. } => "ALREADY_RESOLVED",
                LifecycleError::RequestNotFound { .. } => "NOT_FOUND",
                LifecycleError::InvariantViolated(_) => "INTERNAL_ERROR",
            },
            Self::ConflictingTransition { .. } => "CONFLICTING_TRANSITION",
            Self::NotFound(_) | Self::RequestNotFound(_) => "NOT_FOUND",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pubflow_state::LifecycleState;

    #[test]
    fn lifecycle_errors_convert_transparently() {
        let err: ControllerError = LifecycleError::InvalidTransition {
            from: LifecycleState::Draft,
            operation: "make_private",
            reason: "no make_private transition from DRAFT".to_string(),
        }
        .into();
        assert_eq!(err.code(), "INVALID_TRANSITION");
        assert_eq!(
            err.to_string(),
            "cannot make_private from DRAFT: no make_private transition from DRAFT"
        );
    }

    #[test]
    fn conflict_code() {
        let err = ControllerError::ConflictingTransition {
            artifact: ArtifactId::new(),
            detail: "busy".to_string(),
        };
        assert_eq!(err.code(), "CONFLICTING_TRANSITION");
    }
}
