//! # Permission Oracle
//!
//! Answers "what may this actor do to this artifact". The controller asks
//! once per operation, under the artifact lock, before any state check.
//! Implementations must answer from local data; they run on the
//! synchronous transition path.

use std::collections::HashSet;

use pubflow_core::{ActorId, Capability};
use pubflow_state::Artifact;

/// Identity/permission collaborator.
pub trait PermissionOracle: Send + Sync {
    /// Highest capability `actor` holds over `artifact`, if any.
    fn capability_of(&self, actor: &ActorId, artifact: &Artifact) -> Option<Capability>;

    fn has_capability(&self, actor: &ActorId, artifact: &Artifact, required: Capability) -> bool {
        self.capability_of(actor, artifact)
            .is_some_and(|held| held.satisfies(required))
    }
}

/// Grants contributors their role's capability and site moderators
/// `Admin` over every artifact.
#[derive(Debug, Clone, Default)]
pub struct ContributorPermissions {
    moderators: HashSet<ActorId>,
}

impl ContributorPermissions {
    pub fn new<I: IntoIterator<Item = ActorId>>(moderators: I) -> Self {
        Self {
            moderators: moderators.into_iter().collect(),
        }
    }

    pub fn is_moderator(&self, actor: &ActorId) -> bool {
        self.moderators.contains(actor)
    }
}

impl PermissionOracle for ContributorPermissions {
    fn capability_of(&self, actor: &ActorId, artifact: &Artifact) -> Option<Capability> {
        if self.is_moderator(actor) {
            return Some(Capability::Admin);
        }
        artifact.contributor_role(actor)
    }
}
