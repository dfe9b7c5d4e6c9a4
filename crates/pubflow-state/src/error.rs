//! # Lifecycle Errors
//!
//! Every rejection carries enough context to tell the caller what was
//! attempted, from where, and why. All checks run before any mutation, so
//! an error always means the artifact is unchanged.

use thiserror::Error;

use pubflow_core::{ActorId, ArtifactId, Capability, RequestId};

use crate::lifecycle::LifecycleState;
use crate::withdrawal::Resolution;

/// Errors raised by the lifecycle state machine.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// The actor lacks the capability the operation requires.
    #[error("actor {actor} lacks {required} capability for {operation}")]
    PermissionDenied {
        /// Who attempted the operation.
        actor: ActorId,
        /// Capability the operation requires.
        required: Capability,
        /// Operation name.
        operation: &'static str,
    },

    /// The operation is not legal from the artifact's current state.
    #[error("cannot {operation} from {from}: {reason}")]
    InvalidTransition {
        /// State at the time of the attempt.
        from: LifecycleState,
        /// Operation name.
        operation: &'static str,
        /// Why the transition was rejected.
        reason: String,
    },

    /// A structural precondition for the operation is not met.
    #[error("precondition failed for {operation}: {reason}")]
    PreconditionFailed {
        /// Operation name.
        operation: &'static str,
        /// What is missing.
        reason: String,
    },

    /// A withdrawal request is already pending for the artifact.
    #[error("artifact {artifact} already has pending withdrawal request {request}")]
    ConflictingRequest {
        /// The artifact.
        artifact: ArtifactId,
        /// The request that is still pending.
        request: RequestId,
    },

    /// The withdrawal request was resolved earlier.
    #[error("withdrawal request {request} is already {resolution}")]
    AlreadyResolved {
        /// The request.
        request: RequestId,
        /// Its existing resolution.
        resolution: Resolution,
    },

    /// No withdrawal request with this id belongs to the artifact.
    #[error("withdrawal request {request} not found")]
    RequestNotFound {
        /// The missing request.
        request: RequestId,
    },

    /// A computed snapshot broke an artifact invariant. Indicates a bug in
    /// the transition table; the snapshot is discarded.
    #[error("invariant violated: {0}")]
    InvariantViolated(String),
}
