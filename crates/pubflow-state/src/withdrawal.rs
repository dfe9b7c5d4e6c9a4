//! # Withdrawal Requests
//!
//! A request to remove a published artifact from public view. Owned by
//! the artifact; at most one may be pending at a time. Resolved requests
//! stay in the artifact's history as the auditable record of the
//! withdrawal.

use serde::{Deserialize, Serialize};

use pubflow_core::{ActorId, ArtifactId, RequestId, Timestamp};

use crate::error::LifecycleError;

/// Resolution state of a withdrawal request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Awaiting a moderator decision.
    Pending,
    /// Approved; the artifact was withdrawn.
    Approved,
    /// Rejected; the artifact stayed published.
    Rejected,
}

impl Resolution {
    /// Whether the request still awaits a decision.
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Return the string representation of this resolution.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight or resolved request to withdraw an artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Request identifier.
    pub id: RequestId,
    /// The artifact the request targets.
    pub artifact_id: ArtifactId,
    /// Who filed the request.
    pub requester: ActorId,
    /// Justification given by the requester.
    pub reason: String,
    /// When the request was filed.
    pub requested_at: Timestamp,
    /// Current resolution.
    pub resolution: Resolution,
    /// When the request was resolved.
    pub resolved_at: Option<Timestamp>,
    /// Who resolved the request.
    pub resolver: Option<ActorId>,
}

impl WithdrawalRequest {
    /// File a new pending request.
    pub fn new(
        id: RequestId,
        artifact_id: ArtifactId,
        requester: ActorId,
        reason: String,
        requested_at: Timestamp,
    ) -> Self {
        Self {
            id,
            artifact_id,
            requester,
            reason,
            requested_at,
            resolution: Resolution::Pending,
            resolved_at: None,
            resolver: None,
        }
    }

    /// Whether the request still awaits a decision.
    pub fn is_pending(&self) -> bool {
        self.resolution.is_pending()
    }

    /// Record the moderator's decision. Fails if already resolved.
    pub fn resolve(
        &mut self,
        approve: bool,
        resolver: ActorId,
        at: Timestamp,
    ) -> Result<(), LifecycleError> {
        if !self.is_pending() {
            return Err(LifecycleError::AlreadyResolved {
                request: self.id,
                resolution: self.resolution,
            });
        }
        self.resolution = if approve {
            Resolution::Approved
        } else {
            Resolution::Rejected
        };
        self.resolved_at = Some(at);
        self.resolver = Some(resolver);
        Ok(())
    }
}
