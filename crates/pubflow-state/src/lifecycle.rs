//! # Lifecycle State Machine
//!
//! States, events and the pure transition function.
//!
//! ## Transition Table
//!
//! | From | Event | To |
//! |---|---|---|
//! | `DRAFT` | `submit` | `PENDING_REVIEW` |
//! | `PENDING_REVIEW` | `return_to_draft` | `DRAFT` |
//! | `DRAFT`, `PENDING_REVIEW` | `make_public` | `PUBLIC` |
//! | `PUBLIC` | `make_private` | `DRAFT` |
//! | `PUBLIC` | `make_published` | `PUBLISHED` |
//! | `PUBLISHED`, `WITHDRAWAL_PENDING` | `make_published` | unchanged (no-op) |
//! | `PUBLISHED` | `request_withdrawal` | `WITHDRAWAL_PENDING` |
//! | `WITHDRAWAL_PENDING` | `resolve_withdrawal(approve)` | `WITHDRAWN` |
//! | `WITHDRAWAL_PENDING` | `resolve_withdrawal(reject)` | `PUBLISHED` |
//! | `PUBLIC`, `PUBLISHED` | `force_withdraw` | `WITHDRAWN` |
//! | `WITHDRAWN` | `unwithdraw` | sub-state it was withdrawn from |
//! | any | `flag_spam`, `clear_spam` | unchanged |
//! | `DRAFT`, `PENDING_REVIEW` | `delete` | unchanged (soft delete) |
//! | `DRAFT`, `PENDING_REVIEW` | `embargo` | unchanged (sets `embargo_until`) |
//! | `DRAFT`, `PENDING_REVIEW` | `lift_embargo` | `PUBLIC` |
//!
//! Every other pair is rejected with [`LifecycleError::InvalidTransition`].
//!
//! ## Check Order
//!
//! [`apply`] validates in a fixed order so callers see the most specific
//! error: deletion, capability, idempotent no-ops, request conflicts, the
//! table, preconditions. Only after every check passes is a new snapshot
//! built, and that snapshot must satisfy [`Artifact::check_invariants`].

use serde::{Deserialize, Serialize};

use pubflow_core::{ActorId, Capability, RequestId, Timestamp};

use crate::artifact::Artifact;
use crate::effect::Effect;
use crate::error::LifecycleError;
use crate::withdrawal::WithdrawalRequest;

// ─── States ─────────────────────────────────────────────────────────

/// The sub-state an artifact was in when it was withdrawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawnFrom {
    /// Visible but never published.
    Public,
    /// Published.
    Published,
}

impl WithdrawnFrom {
    /// The state `unwithdraw` returns to.
    pub fn restored(self) -> LifecycleState {
        match self {
            Self::Public => LifecycleState::Public,
            Self::Published => LifecycleState::Published,
        }
    }
}

/// Lifecycle state of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleState {
    /// Private working copy. Initial state.
    Draft,
    /// Submitted to moderators, still private.
    PendingReview,
    /// Visible, not yet published.
    Public,
    /// Visible and published. Publication is permanent.
    Published,
    /// Published with a pending withdrawal request.
    WithdrawalPending,
    /// Removed from public view. Carries the sub-state to restore.
    Withdrawn(WithdrawnFrom),
}

impl LifecycleState {
    /// Every state, for exhaustive table tests.
    pub const ALL: [LifecycleState; 7] = [
        Self::Draft,
        Self::PendingReview,
        Self::Public,
        Self::Published,
        Self::WithdrawalPending,
        Self::Withdrawn(WithdrawnFrom::Public),
        Self::Withdrawn(WithdrawnFrom::Published),
    ];

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Draft => "DRAFT",
            Self::PendingReview => "PENDING_REVIEW",
            Self::Public => "PUBLIC",
            Self::Published => "PUBLISHED",
            Self::WithdrawalPending => "WITHDRAWAL_PENDING",
            Self::Withdrawn(_) => "WITHDRAWN",
        }
    }

    pub fn is_withdrawn(&self) -> bool {
        matches!(self, Self::Withdrawn(_))
    }

    /// Whether publication has happened and is still in effect.
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published | Self::WithdrawalPending)
    }

    /// Target state for `event`, or `None` if the table has no such edge.
    ///
    /// This is the bare table. Guards, preconditions and no-op detection
    /// live in [`apply`].
    pub fn target(&self, event: &LifecycleEvent) -> Option<LifecycleState> {
        use LifecycleEvent as E;
        use LifecycleState as S;
        match (self, event) {
            (S::Draft, E::Submit) => Some(S::PendingReview),
            (S::PendingReview, E::ReturnToDraft) => Some(S::Draft),
            (S::Draft | S::PendingReview, E::MakePublic) => Some(S::Public),
            (S::Public, E::MakePrivate) => Some(S::Draft),
            (S::Public, E::MakePublished) => Some(S::Published),
            (S::Published | S::WithdrawalPending, E::MakePublished) => Some(*self),
            (S::Published, E::RequestWithdrawal { .. }) => Some(S::WithdrawalPending),
            (S::WithdrawalPending, E::ResolveWithdrawal { approve: true, .. }) => {
                Some(S::Withdrawn(WithdrawnFrom::Published))
            }
            (S::WithdrawalPending, E::ResolveWithdrawal { approve: false, .. }) => {
                Some(S::Published)
            }
            (S::Public, E::ForceWithdraw { .. }) => Some(S::Withdrawn(WithdrawnFrom::Public)),
            (S::Published, E::ForceWithdraw { .. }) => {
                Some(S::Withdrawn(WithdrawnFrom::Published))
            }
            (S::Withdrawn(from), E::Unwithdraw) => Some(from.restored()),
            (_, E::FlagSpam | E::ClearSpam) => Some(*self),
            (S::Draft | S::PendingReview, E::Delete | E::Embargo { .. }) => Some(*self),
            (S::Draft | S::PendingReview, E::LiftEmbargo) => Some(S::Public),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ─── Events ─────────────────────────────────────────────────────────

/// An event requesting a lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Submit,
    ReturnToDraft,
    MakePublic,
    MakePrivate,
    MakePublished,
    /// File a withdrawal request. The id is allocated by the caller.
    RequestWithdrawal { request_id: RequestId, reason: String },
    ResolveWithdrawal { request_id: RequestId, approve: bool },
    /// Administrative withdrawal without a request.
    ForceWithdraw { justification: String },
    Unwithdraw,
    FlagSpam,
    ClearSpam,
    Delete,
    /// Keep a private artifact private until `until`, then make it public.
    Embargo { until: Timestamp },
    /// End an embargo and make the artifact public.
    LiftEmbargo,
}

impl LifecycleEvent {
    /// Operation name used in errors, records and logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::ReturnToDraft => "return_to_draft",
            Self::MakePublic => "make_public",
            Self::MakePrivate => "make_private",
            Self::MakePublished => "make_published",
            Self::RequestWithdrawal { .. } => "request_withdrawal",
            Self::ResolveWithdrawal { .. } => "resolve_withdrawal",
            Self::ForceWithdraw { .. } => "force_withdraw",
            Self::Unwithdraw => "unwithdraw",
            Self::FlagSpam => "flag_spam",
            Self::ClearSpam => "clear_spam",
            Self::Delete => "delete",
            Self::Embargo { .. } => "embargo",
            Self::LiftEmbargo => "lift_embargo",
        }
    }

    /// Capability the actor must hold over the artifact.
    pub fn required_capability(&self) -> Capability {
        match self {
            Self::Submit | Self::RequestWithdrawal { .. } => Capability::Write,
            _ => Capability::Admin,
        }
    }
}

// ─── Transition ─────────────────────────────────────────────────────

/// Who is acting, and what they may do to the artifact.
///
/// The capability is resolved by the caller (a permission oracle) before
/// calling [`apply`]; `None` means the actor holds no capability at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GuardContext {
    pub actor: ActorId,
    pub capability: Option<Capability>,
}

impl GuardContext {
    pub fn new(actor: ActorId, capability: Option<Capability>) -> Self {
        Self { actor, capability }
    }

    pub fn permits(&self, required: Capability) -> bool {
        self.capability.is_some_and(|c| c.satisfies(required))
    }

    /// Fail with `PermissionDenied` unless the actor holds `required`.
    pub fn require(
        &self,
        required: Capability,
        operation: &'static str,
    ) -> Result<(), LifecycleError> {
        if self.permits(required) {
            Ok(())
        } else {
            Err(LifecycleError::PermissionDenied {
                actor: self.actor,
                required,
                operation,
            })
        }
    }
}

/// How many records an artifact's transition log retains. Older records
/// are dropped; the controller's audit trail keeps the full picture.
pub const MAX_TRANSITION_RECORDS: usize = 50;

/// One entry of an artifact's transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// Operation name.
    pub event: String,
    pub actor: ActorId,
    pub at: Timestamp,
    /// Free text attached to the event (reason, justification).
    pub note: Option<String>,
}

/// Outcome of a successful [`apply`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// The next artifact snapshot. Equal to the input when `changed` is false.
    pub artifact: Artifact,
    /// Effects to dispatch once the snapshot has been committed.
    pub effects: Vec<Effect>,
    /// False for idempotent no-ops.
    pub changed: bool,
}

impl Transition {
    fn unchanged(artifact: &Artifact) -> Self {
        Self {
            artifact: artifact.clone(),
            effects: Vec::new(),
            changed: false,
        }
    }
}

/// Apply `event` to `artifact`.
///
/// Pure: the input is never modified. On error nothing changes; on success
/// the caller commits `Transition::artifact` and then dispatches
/// `Transition::effects`.
pub fn apply(
    artifact: &Artifact,
    event: &LifecycleEvent,
    guard: &GuardContext,
    now: Timestamp,
) -> Result<Transition, LifecycleError> {
    let operation = event.name();
    let from = artifact.state;

    if artifact.is_deleted() {
        return Err(LifecycleError::InvalidTransition {
            from,
            operation,
            reason: "artifact is deleted".to_string(),
        });
    }

    guard.require(event.required_capability(), operation)?;

    // Idempotent operations short-circuit before the table.
    match event {
        LifecycleEvent::MakePublished if from.is_published() => {
            return Ok(Transition::unchanged(artifact));
        }
        LifecycleEvent::FlagSpam if artifact.spam_flagged => {
            return Ok(Transition::unchanged(artifact));
        }
        LifecycleEvent::ClearSpam if !artifact.spam_flagged => {
            return Ok(Transition::unchanged(artifact));
        }
        _ => {}
    }

    check_requests(artifact, event)?;

    let to = from
        .target(event)
        .ok_or_else(|| LifecycleError::InvalidTransition {
            from,
            operation,
            reason: invalid_reason(artifact, event),
        })?;

    check_preconditions(artifact, event, now)?;

    let mut next = artifact.clone();
    let mut effects = Vec::new();
    let mut note = None;

    match event {
        LifecycleEvent::Submit | LifecycleEvent::ReturnToDraft => {}
        LifecycleEvent::MakePublic => {
            next.is_public = true;
            effects.push(Effect::Reindex(next.id));
        }
        LifecycleEvent::MakePrivate => {
            next.is_public = false;
            effects.push(Effect::Reindex(next.id));
        }
        LifecycleEvent::MakePublished => {
            next.is_published = true;
            next.published_at.get_or_insert(now);
            effects.push(Effect::Reindex(next.id));
            effects.push(Effect::ResyncMetadata(next.id));
        }
        LifecycleEvent::RequestWithdrawal { request_id, reason } => {
            next.record_withdrawal_request(WithdrawalRequest::new(
                *request_id,
                next.id,
                guard.actor,
                reason.clone(),
                now,
            ));
            note = Some(reason.clone());
        }
        LifecycleEvent::ResolveWithdrawal {
            request_id,
            approve,
        } => {
            let request = next
                .withdrawal_requests
                .iter_mut()
                .find(|r| r.id == *request_id)
                .ok_or(LifecycleError::RequestNotFound {
                    request: *request_id,
                })?;
            request.resolve(*approve, guard.actor, now)?;
            if *approve {
                let reason = request.reason.clone();
                next.is_public = false;
                next.withdrawn_at = Some(now);
                next.withdrawal_justification = Some(reason.clone());
                note = Some(reason);
                effects.push(Effect::Reindex(next.id));
                effects.push(Effect::ResyncMetadata(next.id));
            }
        }
        LifecycleEvent::ForceWithdraw { justification } => {
            next.is_public = false;
            next.withdrawn_at = Some(now);
            next.withdrawal_justification = Some(justification.clone());
            note = Some(justification.clone());
            effects.push(Effect::Reindex(next.id));
            if next.is_published {
                effects.push(Effect::ResyncMetadata(next.id));
            }
        }
        LifecycleEvent::Unwithdraw => {
            next.is_public = true;
            next.withdrawn_at = None;
            next.withdrawal_justification = None;
            effects.push(Effect::Reindex(next.id));
            if next.is_published {
                effects.push(Effect::ResyncMetadata(next.id));
            }
        }
        LifecycleEvent::FlagSpam => {
            next.spam_flagged = true;
            effects.push(Effect::FlagSpam(next.id));
            effects.push(Effect::Reindex(next.id));
        }
        LifecycleEvent::ClearSpam => {
            next.spam_flagged = false;
            effects.push(Effect::ClearSpam(next.id));
            effects.push(Effect::Reindex(next.id));
        }
        LifecycleEvent::Delete => {
            next.deleted_at = Some(now);
        }
        LifecycleEvent::Embargo { until } => {
            next.embargo_until = Some(*until);
            note = Some(format!("embargoed until {until}"));
        }
        LifecycleEvent::LiftEmbargo => {
            next.embargo_until = None;
            next.is_public = true;
            effects.push(Effect::Reindex(next.id));
        }
    }

    next.state = to;
    next.modified_at = now;
    next.revision += 1;
    next.record_transition(TransitionRecord {
        from,
        to,
        event: operation.to_string(),
        actor: guard.actor,
        at: now,
        note,
    });
    next.check_invariants()
        .map_err(LifecycleError::InvariantViolated)?;

    Ok(Transition {
        artifact: next,
        effects,
        changed: true,
    })
}

fn check_requests(artifact: &Artifact, event: &LifecycleEvent) -> Result<(), LifecycleError> {
    match event {
        LifecycleEvent::RequestWithdrawal { .. } | LifecycleEvent::ForceWithdraw { .. } => {
            if let Some(pending) = artifact.pending_request() {
                return Err(LifecycleError::ConflictingRequest {
                    artifact: artifact.id,
                    request: pending.id,
                });
            }
        }
        LifecycleEvent::ResolveWithdrawal { request_id, .. } => {
            let request = artifact
                .withdrawal_requests
                .iter()
                .find(|r| r.id == *request_id)
                .ok_or(LifecycleError::RequestNotFound {
                    request: *request_id,
                })?;
            if !request.is_pending() {
                return Err(LifecycleError::AlreadyResolved {
                    request: request.id,
                    resolution: request.resolution,
                });
            }
        }
        _ => {}
    }
    Ok(())
}

fn check_preconditions(
    artifact: &Artifact,
    event: &LifecycleEvent,
    now: Timestamp,
) -> Result<(), LifecycleError> {
    let operation = event.name();
    match event {
        LifecycleEvent::MakePublic
        | LifecycleEvent::MakePublished
        | LifecycleEvent::LiftEmbargo
            if artifact.spam_flagged =>
        {
            Err(LifecycleError::PreconditionFailed {
                operation,
                reason: "artifact is flagged as spam".to_string(),
            })
        }
        LifecycleEvent::MakePublic => match artifact.embargo_until {
            Some(until) => Err(LifecycleError::PreconditionFailed {
                operation,
                reason: format!("artifact is under embargo until {until}"),
            }),
            None => Ok(()),
        },
        LifecycleEvent::LiftEmbargo if artifact.embargo_until.is_none() => {
            Err(LifecycleError::PreconditionFailed {
                operation,
                reason: "artifact is not under embargo".to_string(),
            })
        }
        LifecycleEvent::Embargo { until } if *until <= now => {
            Err(LifecycleError::PreconditionFailed {
                operation,
                reason: format!("embargo end {until} is not in the future"),
            })
        }
        LifecycleEvent::MakePublished if !artifact.verified_publishable => {
            Err(LifecycleError::PreconditionFailed {
                operation,
                reason: format!(
                    "artifact is not publishable: {}",
                    artifact.publication_blockers().join(", ")
                ),
            })
        }
        _ => Ok(()),
    }
}

fn invalid_reason(artifact: &Artifact, event: &LifecycleEvent) -> String {
    match event {
        LifecycleEvent::MakePrivate if artifact.is_published => {
            "published artifacts cannot be hidden".to_string()
        }
        LifecycleEvent::Delete if artifact.is_public || artifact.is_published => {
            "only never-visible artifacts can be deleted".to_string()
        }
        _ => format!("no {} transition from {}", event.name(), artifact.state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::NewArtifact;
    use crate::withdrawal::Resolution;
    use pubflow_core::ArtifactId;

    fn admin() -> GuardContext {
        GuardContext::new(ActorId::new(), Some(Capability::Admin))
    }

    fn writer() -> GuardContext {
        GuardContext::new(ActorId::new(), Some(Capability::Write))
    }

    fn publishable_draft() -> Artifact {
        Artifact::create(
            ArtifactId::new(),
            ActorId::new(),
            NewArtifact {
                title: "Sleep and memory consolidation".to_string(),
                parent: None,
                tags: vec!["neuroscience".to_string()],
                primary_file: Some("file-1".to_string()),
            },
            Timestamp::now(),
        )
    }

    fn step(a: &Artifact, event: LifecycleEvent) -> Artifact {
        apply(a, &event, &admin(), Timestamp::now()).unwrap().artifact
    }

    fn published() -> Artifact {
        let a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        step(&a, LifecycleEvent::MakePublished)
    }

    fn with_pending_request() -> (Artifact, RequestId) {
        let request_id = RequestId::new();
        let a = step(
            &published(),
            LifecycleEvent::RequestWithdrawal {
                request_id,
                reason: "data error".to_string(),
            },
        );
        (a, request_id)
    }

    #[test]
    fn state_names() {
        assert_eq!(LifecycleState::PendingReview.to_string(), "PENDING_REVIEW");
        assert_eq!(
            LifecycleState::Withdrawn(WithdrawnFrom::Published).to_string(),
            "WITHDRAWN"
        );
    }

    #[test]
    fn make_public_sets_visibility_and_reindexes() {
        let a = publishable_draft();
        let t = apply(&a, &LifecycleEvent::MakePublic, &admin(), Timestamp::now()).unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Public);
        assert!(t.artifact.is_public);
        assert_eq!(t.effects, vec![Effect::Reindex(a.id)]);
        assert_eq!(t.artifact.revision, a.revision + 1);
        assert_eq!(t.artifact.transitions.len(), 1);
    }

    #[test]
    fn make_public_requires_admin() {
        let a = publishable_draft();
        let err = apply(&a, &LifecycleEvent::MakePublic, &writer(), Timestamp::now()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::PermissionDenied {
                required: Capability::Admin,
                ..
            }
        ));
    }

    #[test]
    fn no_capability_is_denied_even_for_write_events() {
        let a = publishable_draft();
        let guard = GuardContext::new(ActorId::new(), None);
        let err = apply(&a, &LifecycleEvent::Submit, &guard, Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::PermissionDenied { .. }));
    }

    #[test]
    fn make_public_from_published_is_invalid() {
        let a = published();
        let err = apply(&a, &LifecycleEvent::MakePublic, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidTransition {
                from: LifecycleState::Published,
                ..
            }
        ));
    }

    #[test]
    fn make_private_returns_to_draft() {
        let a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let t = apply(&a, &LifecycleEvent::MakePrivate, &admin(), Timestamp::now()).unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Draft);
        assert!(!t.artifact.is_public);
    }

    #[test]
    fn make_private_on_published_is_invalid() {
        let a = published();
        let err = apply(&a, &LifecycleEvent::MakePrivate, &admin(), Timestamp::now()).unwrap_err();
        match err {
            LifecycleError::InvalidTransition { reason, .. } => {
                assert!(reason.contains("cannot be hidden"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn make_published_stamps_once_and_is_idempotent() {
        let a = published();
        let stamp = a.published_at;
        assert!(stamp.is_some());

        let t = apply(&a, &LifecycleEvent::MakePublished, &admin(), Timestamp::now()).unwrap();
        assert!(!t.changed);
        assert!(t.effects.is_empty());
        assert_eq!(t.artifact.published_at, stamp);
        assert_eq!(t.artifact.revision, a.revision);
    }

    #[test]
    fn make_published_requires_publishable() {
        let mut a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        a.primary_file = None;
        a.refresh_publishable();
        let err =
            apply(&a, &LifecycleEvent::MakePublished, &admin(), Timestamp::now()).unwrap_err();
        match err {
            LifecycleError::PreconditionFailed { reason, .. } => {
                assert!(reason.contains("no primary file"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn make_published_from_draft_is_invalid() {
        let a = publishable_draft();
        let err =
            apply(&a, &LifecycleEvent::MakePublished, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn spam_flag_blocks_publication() {
        let a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let a = step(&a, LifecycleEvent::FlagSpam);
        let err =
            apply(&a, &LifecycleEvent::MakePublished, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed { .. }));
    }

    #[test]
    fn spam_flag_is_idempotent() {
        let a = step(&publishable_draft(), LifecycleEvent::FlagSpam);
        assert!(a.spam_flagged);
        let t = apply(&a, &LifecycleEvent::FlagSpam, &admin(), Timestamp::now()).unwrap();
        assert!(!t.changed);
        let t = apply(&a, &LifecycleEvent::ClearSpam, &admin(), Timestamp::now()).unwrap();
        assert!(t.changed);
        assert_eq!(t.effects, vec![Effect::ClearSpam(a.id), Effect::Reindex(a.id)]);
    }

    #[test]
    fn request_withdrawal_requires_published() {
        let a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let event = LifecycleEvent::RequestWithdrawal {
            request_id: RequestId::new(),
            reason: "x".to_string(),
        };
        let err = apply(&a, &event, &writer(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn second_withdrawal_request_conflicts() {
        let (a, first) = with_pending_request();
        assert_eq!(a.state, LifecycleState::WithdrawalPending);
        let event = LifecycleEvent::RequestWithdrawal {
            request_id: RequestId::new(),
            reason: "again".to_string(),
        };
        let err = apply(&a, &event, &writer(), Timestamp::now()).unwrap_err();
        assert_eq!(
            err,
            LifecycleError::ConflictingRequest {
                artifact: a.id,
                request: first
            }
        );
    }

    #[test]
    fn approve_withdraws_and_keeps_publication() {
        let (a, request_id) = with_pending_request();
        let t = apply(
            &a,
            &LifecycleEvent::ResolveWithdrawal {
                request_id,
                approve: true,
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap();
        let w = t.artifact;
        assert_eq!(w.state, LifecycleState::Withdrawn(WithdrawnFrom::Published));
        assert!(!w.is_public);
        assert!(w.is_published);
        assert!(w.withdrawn_at.is_some());
        assert_eq!(w.withdrawal_justification.as_deref(), Some("data error"));
        assert_eq!(w.withdrawal_requests[0].resolution, Resolution::Approved);
        assert_eq!(t.effects, vec![Effect::Reindex(w.id), Effect::ResyncMetadata(w.id)]);
    }

    #[test]
    fn reject_returns_to_published_without_effects() {
        let (a, request_id) = with_pending_request();
        let t = apply(
            &a,
            &LifecycleEvent::ResolveWithdrawal {
                request_id,
                approve: false,
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Published);
        assert_eq!(t.artifact.withdrawal_requests[0].resolution, Resolution::Rejected);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn resolving_twice_is_already_resolved() {
        let (a, request_id) = with_pending_request();
        let event = LifecycleEvent::ResolveWithdrawal {
            request_id,
            approve: false,
        };
        let a = step(&a, event.clone());
        let err = apply(&a, &event, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::AlreadyResolved {
                resolution: Resolution::Rejected,
                ..
            }
        ));
    }

    #[test]
    fn resolving_unknown_request_is_not_found() {
        let (a, _) = with_pending_request();
        let request_id = RequestId::new();
        let err = apply(
            &a,
            &LifecycleEvent::ResolveWithdrawal {
                request_id,
                approve: true,
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert_eq!(err, LifecycleError::RequestNotFound { request: request_id });
    }

    #[test]
    fn resolve_requires_admin() {
        let (a, request_id) = with_pending_request();
        let err = apply(
            &a,
            &LifecycleEvent::ResolveWithdrawal {
                request_id,
                approve: true,
            },
            &writer(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::PermissionDenied { .. }));
    }

    #[test]
    fn unwithdraw_restores_published() {
        let (a, request_id) = with_pending_request();
        let w = step(
            &a,
            LifecycleEvent::ResolveWithdrawal {
                request_id,
                approve: true,
            },
        );
        let t = apply(&w, &LifecycleEvent::Unwithdraw, &admin(), Timestamp::now()).unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Published);
        assert!(t.artifact.is_public);
        assert!(t.artifact.withdrawn_at.is_none());
        assert_eq!(t.artifact.published_at, a.published_at);
    }

    #[test]
    fn force_withdraw_from_public_restores_public() {
        let a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let t = apply(
            &a,
            &LifecycleEvent::ForceWithdraw {
                justification: "copyright".to_string(),
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Withdrawn(WithdrawnFrom::Public));
        assert_eq!(t.effects, vec![Effect::Reindex(a.id)]);
        let back = step(&t.artifact, LifecycleEvent::Unwithdraw);
        assert_eq!(back.state, LifecycleState::Public);
        assert!(!back.is_published);
    }

    #[test]
    fn force_withdraw_with_pending_request_conflicts() {
        let (a, _) = with_pending_request();
        let err = apply(
            &a,
            &LifecycleEvent::ForceWithdraw {
                justification: "x".to_string(),
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::ConflictingRequest { .. }));
    }

    #[test]
    fn delete_only_from_private_states() {
        let a = step(&publishable_draft(), LifecycleEvent::Delete);
        assert!(a.is_deleted());
        let err = apply(&a, &LifecycleEvent::Submit, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));

        let p = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let err = apply(&p, &LifecycleEvent::Delete, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn failed_apply_leaves_input_untouched() {
        let a = published();
        let before = a.clone();
        let _ = apply(&a, &LifecycleEvent::MakePrivate, &admin(), Timestamp::now());
        assert_eq!(a, before);
    }

    #[test]
    fn review_round_trip() {
        let a = publishable_draft();
        let r = apply(&a, &LifecycleEvent::Submit, &writer(), Timestamp::now()).unwrap();
        assert_eq!(r.artifact.state, LifecycleState::PendingReview);
        assert!(r.effects.is_empty());
        let d = step(&r.artifact, LifecycleEvent::ReturnToDraft);
        assert_eq!(d.state, LifecycleState::Draft);
        assert_eq!(d.transitions.len(), 2);
    }

    fn far_future() -> Timestamp {
        Timestamp::parse("2999-01-01T00:00:00Z").unwrap()
    }

    fn embargoed() -> Artifact {
        step(
            &publishable_draft(),
            LifecycleEvent::Embargo {
                until: far_future(),
            },
        )
    }

    #[test]
    fn embargo_keeps_the_artifact_private() {
        let a = embargoed();
        assert_eq!(a.state, LifecycleState::Draft);
        assert_eq!(a.embargo_until, Some(far_future()));
        assert!(!a.is_public);

        let err = apply(&a, &LifecycleEvent::MakePublic, &admin(), Timestamp::now()).unwrap_err();
        match err {
            LifecycleError::PreconditionFailed { reason, .. } => {
                assert!(reason.contains("under embargo"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn embargo_end_must_be_in_the_future() {
        let past = Timestamp::parse("2000-01-01T00:00:00Z").unwrap();
        let err = apply(
            &publishable_draft(),
            &LifecycleEvent::Embargo { until: past },
            &admin(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed { .. }));
    }

    #[test]
    fn embargo_only_on_private_artifacts() {
        let p = step(&publishable_draft(), LifecycleEvent::MakePublic);
        let err = apply(
            &p,
            &LifecycleEvent::Embargo {
                until: far_future(),
            },
            &admin(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::InvalidTransition { .. }));
    }

    #[test]
    fn lifting_an_embargo_makes_the_artifact_public() {
        let a = embargoed();
        let t = apply(&a, &LifecycleEvent::LiftEmbargo, &admin(), Timestamp::now()).unwrap();
        assert_eq!(t.artifact.state, LifecycleState::Public);
        assert!(t.artifact.is_public);
        assert_eq!(t.artifact.embargo_until, None);
        assert_eq!(t.effects, vec![Effect::Reindex(a.id)]);
    }

    #[test]
    fn lift_without_embargo_fails_precondition() {
        let err = apply(
            &publishable_draft(),
            &LifecycleEvent::LiftEmbargo,
            &admin(),
            Timestamp::now(),
        )
        .unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed { .. }));
    }

    #[test]
    fn spam_blocks_lifting_an_embargo() {
        let a = step(&embargoed(), LifecycleEvent::FlagSpam);
        let err = apply(&a, &LifecycleEvent::LiftEmbargo, &admin(), Timestamp::now()).unwrap_err();
        assert!(matches!(err, LifecycleError::PreconditionFailed { .. }));
    }

    #[test]
    fn transition_log_keeps_only_recent_records() {
        let mut a = step(&publishable_draft(), LifecycleEvent::MakePublic);
        for _ in 0..MAX_TRANSITION_RECORDS {
            a = step(&a, LifecycleEvent::MakePrivate);
            a = step(&a, LifecycleEvent::MakePublic);
        }
        assert_eq!(a.transitions.len(), MAX_TRANSITION_RECORDS);
        assert_eq!(a.transitions.last().map(|r| r.event.as_str()), Some("make_public"));
        assert_eq!(a.revision, 1 + 2 * MAX_TRANSITION_RECORDS as u64);
    }
}
