//! # Artifact Record
//!
//! The shared research object (a preprint or registration version) whose
//! lifecycle the state machine governs.
//!
//! ## Invariants
//!
//! [`Artifact::check_invariants`] is evaluated on every snapshot the state
//! machine produces:
//!
//! - `published_at` is set iff `is_published`.
//! - A deleted artifact is never public.
//! - Any withdrawal request implies the artifact was published.
//! - At most one withdrawal request is pending, and only in `WithdrawalPending`.
//! - `withdrawn_at` is set iff the state is `Withdrawn`.
//! - Visibility and publication flags agree with the lifecycle state.
//! - An embargo is only held by a draft or an artifact in review.
//!
//! ## Versions
//!
//! Versions form a chain through `previous_version`. Only the latest
//! version of a chain (or an artifact that never left review) accepts
//! metadata edits.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use pubflow_core::{ActorId, ArtifactId, Capability, Timestamp};

use crate::effect::Effect;
use crate::error::LifecycleError;
use crate::lifecycle::{LifecycleState, TransitionRecord, WithdrawnFrom, MAX_TRANSITION_RECORDS};
use crate::withdrawal::WithdrawalRequest;

/// How many withdrawal requests an artifact retains.
pub const MAX_WITHDRAWAL_REQUESTS: usize = 16;

/// A contributor and the capability their role grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contributor {
    /// The contributing actor.
    pub actor: ActorId,
    /// Capability granted by the contributor role.
    pub role: Capability,
}

/// Input for creating a new artifact.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArtifact {
    /// Display title.
    pub title: String,
    /// Optional parent container (project) reference.
    pub parent: Option<String>,
    /// Classification tags (subjects).
    pub tags: Vec<String>,
    /// Reference to the primary file held by the storage service.
    pub primary_file: Option<String>,
}

/// Partial metadata update. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataPatch {
    /// New title.
    pub title: Option<String>,
    /// Replacement tag set.
    pub tags: Option<Vec<String>>,
    /// New primary file reference.
    pub primary_file: Option<String>,
    /// New parent container reference.
    pub parent: Option<String>,
}

impl MetadataPatch {
    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.tags.is_none()
            && self.primary_file.is_none()
            && self.parent.is_none()
    }
}

/// A research artifact with its lifecycle state and audit history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: ArtifactId,
    pub title: String,
    pub created_at: Timestamp,
    pub modified_at: Timestamp,
    /// Soft-deletion stamp. The record is retained.
    pub deleted_at: Option<Timestamp>,
    pub is_public: bool,
    pub is_published: bool,
    /// Stamped once, when `is_published` first becomes true.
    pub published_at: Option<Timestamp>,
    /// Cached result of [`Artifact::publication_blockers`] being empty.
    pub verified_publishable: bool,
    pub parent: Option<String>,
    pub tags: BTreeSet<String>,
    /// Contributors in bibliographic order.
    pub contributors: Vec<Contributor>,
    pub primary_file: Option<String>,
    pub state: LifecycleState,
    pub spam_flagged: bool,
    /// Withdrawal requests, oldest first. Only the most recent
    /// [`MAX_WITHDRAWAL_REQUESTS`] are retained; a pending one is never dropped.
    pub withdrawal_requests: Vec<WithdrawalRequest>,
    pub withdrawn_at: Option<Timestamp>,
    pub withdrawal_justification: Option<String>,
    /// Bumped on every committed mutation. Used for optimistic checks.
    pub revision: u64,
    /// 1-based position in the version chain.
    pub version: u32,
    pub previous_version: Option<ArtifactId>,
    /// While set, the artifact may only become public by lifting the embargo.
    #[serde(default)]
    pub embargo_until: Option<Timestamp>,
    /// Most recent lifecycle transitions, oldest first. Capped at
    /// [`MAX_TRANSITION_RECORDS`].
    pub transitions: Vec<TransitionRecord>,
}

impl Artifact {
    /// Create a new draft. The creator becomes its first admin contributor.
    pub fn create(id: ArtifactId, creator: ActorId, input: NewArtifact, now: Timestamp) -> Self {
        let mut artifact = Self {
            id,
            title: input.title.trim().to_string(),
            created_at: now,
            modified_at: now,
            deleted_at: None,
            is_public: false,
            is_published: false,
            published_at: None,
            verified_publishable: false,
            parent: input.parent,
            tags: normalize_tags(input.tags),
            contributors: vec![Contributor {
                actor: creator,
                role: Capability::Admin,
            }],
            primary_file: input.primary_file,
            state: LifecycleState::Draft,
            spam_flagged: false,
            withdrawal_requests: Vec::new(),
            withdrawn_at: None,
            withdrawal_justification: None,
            revision: 0,
            version: 1,
            previous_version: None,
            embargo_until: None,
            transitions: Vec::new(),
        };
        artifact.refresh_publishable();
        artifact
    }

    /// Whether the artifact has been soft-deleted.
    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The pending withdrawal request, if any.
    pub fn pending_request(&self) -> Option<&WithdrawalRequest> {
        self.withdrawal_requests.iter().find(|r| r.is_pending())
    }

    /// The role held by `actor`, if they are a contributor.
    pub fn contributor_role(&self, actor: &ActorId) -> Option<Capability> {
        self.contributors
            .iter()
            .find(|c| &c.actor == actor)
            .map(|c| c.role)
    }

    /// Reasons the artifact cannot be published yet. Empty means publishable.
    pub fn publication_blockers(&self) -> Vec<&'static str> {
        let mut blockers = Vec::new();
        if self.title.trim().is_empty() {
            blockers.push("title is empty");
        }
        if self.tags.is_empty() {
            blockers.push("no subjects assigned");
        }
        if self.primary_file.is_none() {
            blockers.push("no primary file");
        }
        if !self.contributors.iter().any(|c| c.role == Capability::Admin) {
            blockers.push("no admin contributor");
        }
        blockers
    }

    /// Recompute the cached `verified_publishable` flag.
    pub fn refresh_publishable(&mut self) {
        self.verified_publishable = self.publication_blockers().is_empty();
    }

    /// Whether metadata may be edited. `is_latest` tells whether no newer
    /// version of this artifact exists.
    pub fn is_editable(&self, is_latest: bool) -> bool {
        if self.is_deleted() || self.state.is_withdrawn() {
            return false;
        }
        is_latest || matches!(self.state, LifecycleState::Draft | LifecycleState::PendingReview)
    }

    /// Apply a metadata patch, returning the effects the change requires.
    pub fn apply_patch(
        &mut self,
        patch: MetadataPatch,
        is_latest: bool,
        now: Timestamp,
    ) -> Result<Vec<Effect>, LifecycleError> {
        if !self.is_editable(is_latest) {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                operation: "update_metadata",
                reason: if self.is_deleted() {
                    "artifact is deleted".to_string()
                } else if self.state.is_withdrawn() {
                    "withdrawn artifacts are read-only".to_string()
                } else {
                    "previous versions are read-only".to_string()
                },
            });
        }
        if patch.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(title) = patch.title {
            self.title = title.trim().to_string();
        }
        if let Some(tags) = patch.tags {
            self.tags = normalize_tags(tags);
        }
        if let Some(file) = patch.primary_file {
            self.primary_file = Some(file);
        }
        if let Some(parent) = patch.parent {
            self.parent = Some(parent);
        }
        self.refresh_publishable();
        self.touch(now);
        Ok(self.metadata_effects())
    }

    /// Effects owed after a metadata change: visible artifacts are
    /// reindexed and published ones resynced with the registry.
    pub fn metadata_effects(&self) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.is_public {
            effects.push(Effect::Reindex(self.id));
        }
        if self.is_published {
            effects.push(Effect::ResyncMetadata(self.id));
        }
        effects
    }

    /// Add, re-role, or (with `role == None`) remove a contributor.
    ///
    /// The last admin contributor cannot be removed or demoted.
    pub fn set_contributor(
        &mut self,
        actor: ActorId,
        role: Option<Capability>,
        now: Timestamp,
    ) -> Result<(), LifecycleError> {
        if self.is_deleted() {
            return Err(LifecycleError::InvalidTransition {
                from: self.state,
                operation: "set_contributor",
                reason: "artifact is deleted".to_string(),
            });
        }
        let remaining_admins = self
            .contributors
            .iter()
            .filter(|c| c.role == Capability::Admin && c.actor != actor)
            .count();
        let loses_admin = self.contributor_role(&actor) == Some(Capability::Admin)
            && role != Some(Capability::Admin);
        if loses_admin && remaining_admins == 0 {
            return Err(LifecycleError::PreconditionFailed {
                operation: "set_contributor",
                reason: "an artifact must keep at least one admin contributor".to_string(),
            });
        }

        match (self.contributors.iter().position(|c| c.actor == actor), role) {
            (Some(idx), Some(role)) if self.contributors[idx].role == role => return Ok(()),
            (Some(idx), Some(role)) => self.contributors[idx].role = role,
            (Some(idx), None) => {
                self.contributors.remove(idx);
            }
            (None, Some(role)) => self.contributors.push(Contributor { actor, role }),
            (None, None) => return Ok(()),
        }
        self.refresh_publishable();
        self.touch(now);
        Ok(())
    }

    /// Build the next version of this artifact as a fresh draft.
    ///
    /// Title, tags, parent and contributors carry over. The file and all
    /// publication and withdrawal stamps do not. `self` is not modified.
    pub fn derive_version(&self, id: ArtifactId, now: Timestamp) -> Artifact {
        let mut next = Artifact {
            id,
            title: self.title.clone(),
            created_at: now,
            modified_at: now,
            deleted_at: None,
            is_public: false,
            is_published: false,
            published_at: None,
            verified_publishable: false,
            parent: self.parent.clone(),
            tags: self.tags.clone(),
            contributors: self.contributors.clone(),
            primary_file: None,
            state: LifecycleState::Draft,
            spam_flagged: false,
            withdrawal_requests: Vec::new(),
            withdrawn_at: None,
            withdrawal_justification: None,
            revision: 0,
            version: self.version.saturating_add(1),
            previous_version: Some(self.id),
            embargo_until: None,
            transitions: Vec::new(),
        };
        next.refresh_publishable();
        next
    }

    /// Check every artifact invariant, naming the first violation.
    pub fn check_invariants(&self) -> Result<(), String> {
        if self.published_at.is_some() != self.is_published {
            return Err(format!(
                "published_at present={} but is_published={}",
                self.published_at.is_some(),
                self.is_published
            ));
        }
        if self.is_deleted() && self.is_public {
            return Err("deleted artifact is public".to_string());
        }
        if !self.withdrawal_requests.is_empty() && !self.is_published {
            return Err("withdrawal request on an unpublished artifact".to_string());
        }
        let pending = self.withdrawal_requests.iter().filter(|r| r.is_pending()).count();
        if pending > 1 {
            return Err(format!("{pending} pending withdrawal requests"));
        }
        if (pending == 1) != (self.state == LifecycleState::WithdrawalPending) {
            return Err(format!(
                "{pending} pending withdrawal requests in state {}",
                self.state
            ));
        }
        if self.withdrawn_at.is_some() != self.state.is_withdrawn() {
            return Err(format!(
                "withdrawn_at present={} in state {}",
                self.withdrawn_at.is_some(),
                self.state
            ));
        }

        if self.embargo_until.is_some()
            && !matches!(
                self.state,
                LifecycleState::Draft | LifecycleState::PendingReview
            )
        {
            return Err(format!("embargo held in state {}", self.state));
        }

        let (public, published) = match self.state {
            LifecycleState::Draft | LifecycleState::PendingReview => (false, false),
            LifecycleState::Public => (true, false),
            LifecycleState::Published | LifecycleState::WithdrawalPending => (true, true),
            LifecycleState::Withdrawn(WithdrawnFrom::Public) => (false, false),
            LifecycleState::Withdrawn(WithdrawnFrom::Published) => (false, true),
        };
        if self.is_public != public || self.is_published != published {
            return Err(format!(
                "is_public={} is_published={} disagree with state {}",
                self.is_public, self.is_published, self.state
            ));
        }
        Ok(())
    }

    /// Append to the transition log, dropping the oldest record past the cap.
    pub fn record_transition(&mut self, record: TransitionRecord) {
        self.transitions.push(record);
        let excess = self.transitions.len().saturating_sub(MAX_TRANSITION_RECORDS);
        if excess > 0 {
            self.transitions.drain(..excess);
        }
    }

    /// File a withdrawal request, dropping the oldest resolved requests
    /// past the cap.
    pub fn record_withdrawal_request(&mut self, request: WithdrawalRequest) {
        self.withdrawal_requests.push(request);
        while self.withdrawal_requests.len() > MAX_WITHDRAWAL_REQUESTS {
            match self.withdrawal_requests.iter().position(|r| !r.is_pending()) {
                Some(oldest) => {
                    self.withdrawal_requests.remove(oldest);
                }
                None => break,
            }
        }
    }

    fn touch(&mut self, now: Timestamp) {
        self.modified_at = now;
        self.revision += 1;
    }
}

fn normalize_tags(tags: Vec<String>) -> BTreeSet<String> {
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}
