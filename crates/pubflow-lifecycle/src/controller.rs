//! # Lifecycle Controller
//!
//! Serializes operations per artifact and commits the snapshots the state
//! machine computes.
//!
//! Every mutating operation follows the same sequence:
//!
//! 1. Take the artifact's try-lock. A held lock fails with
//!    [`ControllerError::ConflictingTransition`].
//! 2. Compare the caller's `expected_revision`, if any.
//! 3. Resolve the actor's capability through the [`PermissionOracle`].
//! 4. Compute the next snapshot (pure; no mutation on error).
//! 5. Commit the snapshot to the store.
//! 6. Hand the effects to the [`EffectSink`], then release the lock, so
//!    batches for one artifact reach the sink in commit order. A refused
//!    hand-off becomes a warning on the report, never an error.
//!
//! [`LifecycleController::lift_elapsed_embargoes`] is the one operation not
//! driven by a caller: it runs as the system actor with admin capability.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

use pubflow_core::{ActorId, ArtifactId, Capability, RequestId, Timestamp};
use pubflow_notify::{EffectBatch, EffectSink};
use pubflow_state::{
    apply, Artifact, Effect, GuardContext, LifecycleError, LifecycleEvent, MetadataPatch,
    NewArtifact, WithdrawalRequest,
};

use crate::audit::{AuditEntry, AuditEntryType, AuditTrail};
use crate::error::ControllerError;
use crate::locks::{ArtifactGuard, ArtifactLocks};
use crate::permission::PermissionOracle;
use crate::store::Store;

// ─── Call Context ───────────────────────────────────────────────────

/// Who is calling, and which revision they last observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub actor: ActorId,
    /// When set, the operation fails with `ConflictingTransition` unless the
    /// artifact is still at this revision.
    pub expected_revision: Option<u64>,
}

impl Invocation {
    pub fn new(actor: ActorId) -> Self {
        Self {
            actor,
            expected_revision: None,
        }
    }

    pub fn expecting(mut self, revision: u64) -> Self {
        self.expected_revision = Some(revision);
        self
    }
}

/// Result of a successful operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransitionReport {
    /// The committed snapshot (for `assign_new_version`, the new version).
    pub artifact: Artifact,
    /// False for idempotent no-ops; nothing was committed.
    pub changed: bool,
    /// Effects handed to the notifier, de-duplicated.
    pub effects: Vec<Effect>,
    /// Recoverable problems after commit, such as a refused effect hand-off.
    pub warnings: Vec<String>,
}

/// Where an operation's capability comes from.
#[derive(Debug, Clone, Copy)]
enum Authority {
    /// Resolved for the invoking actor through the permission oracle.
    Caller,
    /// Scheduled maintenance; always admin.
    System,
}

struct Outcome {
    artifact: Artifact,
    effects: Vec<Effect>,
    changed: bool,
    entry_type: AuditEntryType,
}

// ─── Controller ─────────────────────────────────────────────────────

/// The publication lifecycle controller.
pub struct LifecycleController {
    artifacts: Store<ArtifactId, Artifact>,
    /// Withdrawal request → owning artifact.
    requests: Store<RequestId, ArtifactId>,
    /// Version → its direct successor.
    successors: Store<ArtifactId, ArtifactId>,
    locks: ArtifactLocks,
    permissions: Arc<dyn PermissionOracle>,
    sink: Arc<dyn EffectSink>,
    audit: Mutex<AuditTrail>,
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("artifacts", &self.artifacts.len())
            .field("requests", &self.requests.len())
            .finish_non_exhaustive()
    }
}

impl LifecycleController {
    pub fn new(permissions: Arc<dyn PermissionOracle>, sink: Arc<dyn EffectSink>) -> Self {
        Self {
            artifacts: Store::new(),
            requests: Store::new(),
            successors: Store::new(),
            locks: ArtifactLocks::new(),
            permissions,
            sink,
            audit: Mutex::new(AuditTrail::default()),
        }
    }

    /// Replace the audit trail capacity. Existing entries are discarded.
    pub fn with_audit_capacity(self, max_entries: usize) -> Self {
        *self.audit.lock() = AuditTrail::new(max_entries);
        self
    }

    /// Load previously persisted artifacts. Records that fail their
    /// invariants are skipped. Returns the number loaded.
    pub fn hydrate(&self, artifacts: impl IntoIterator<Item = Artifact>) -> usize {
        let mut loaded = 0;
        for artifact in artifacts {
            if let Err(violation) = artifact.check_invariants() {
                tracing::warn!(artifact = %artifact.id, %violation, "skipping inconsistent artifact");
                continue;
            }
            self.index(&artifact);
            self.artifacts.insert(artifact.id, artifact);
            loaded += 1;
        }
        loaded
    }

    fn index(&self, artifact: &Artifact) {
        for request in &artifact.withdrawal_requests {
            self.requests.insert_new(request.id, artifact.id);
        }
        if let Some(previous) = artifact.previous_version {
            self.successors.insert(previous, artifact.id);
        }
    }

    // ── Reads ──────────────────────────────────────────────────────

    pub fn get(&self, id: ArtifactId) -> Result<Artifact, ControllerError> {
        self.artifacts.get(&id).ok_or(ControllerError::NotFound(id))
    }

    /// Fetch an artifact as `actor` sees it. Non-public artifacts need
    /// `Read` capability.
    pub fn view(&self, id: ArtifactId, actor: ActorId) -> Result<Artifact, ControllerError> {
        let artifact = self.get(id)?;
        if self.can_see(&artifact, &actor) {
            Ok(artifact)
        } else {
            Err(LifecycleError::PermissionDenied {
                actor,
                required: Capability::Read,
                operation: "view",
            }
            .into())
        }
    }

    /// Artifacts visible to `actor`, oldest first.
    pub fn list_visible(&self, actor: ActorId) -> Vec<Artifact> {
        let mut visible = self.artifacts.filter(|a| self.can_see(a, &actor));
        visible.sort_by_key(|a| (a.created_at, a.id));
        visible
    }

    fn can_see(&self, artifact: &Artifact, actor: &ActorId) -> bool {
        (artifact.is_public && !artifact.is_deleted())
            || self
                .permissions
                .has_capability(actor, artifact, Capability::Read)
    }

    /// The newest version in `id`'s chain.
    pub fn latest_version(&self, id: ArtifactId) -> Result<Artifact, ControllerError> {
        let mut current = self.get(id)?;
        while let Some(next) = self.successors.get(&current.id) {
            current = self.get(next)?;
        }
        Ok(current)
    }

    /// Every version in `id`'s chain visible to `actor`, oldest first.
    pub fn versions(&self, id: ArtifactId, actor: ActorId) -> Result<Vec<Artifact>, ControllerError> {
        let mut root = self.view(id, actor)?;
        while let Some(previous) = root.previous_version {
            root = self.get(previous)?;
        }
        let mut chain = vec![root];
        while let Some(next) = chain
            .last()
            .and_then(|last| self.successors.get(&last.id))
        {
            chain.push(self.get(next)?);
        }
        chain.retain(|a| self.can_see(a, &actor));
        Ok(chain)
    }

    pub fn find_request(&self, request: RequestId) -> Result<WithdrawalRequest, ControllerError> {
        let artifact = self
            .requests
            .get(&request)
            .ok_or(ControllerError::RequestNotFound(request))?;
        self.get(artifact)?
            .withdrawal_requests
            .into_iter()
            .find(|r| r.id == request)
            .ok_or(ControllerError::RequestNotFound(request))
    }

    /// Audit entries for one artifact, oldest first.
    pub fn audit_entries(&self, id: ArtifactId) -> Vec<AuditEntry> {
        self.audit.lock().entries_for(&id)
    }

    /// Number of undeleted artifacts in each lifecycle state.
    pub fn state_counts(&self) -> BTreeMap<&'static str, usize> {
        let mut counts = BTreeMap::new();
        for artifact in self.artifacts.list() {
            if !artifact.is_deleted() {
                *counts.entry(artifact.state.name()).or_insert(0) += 1;
            }
        }
        counts
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    // ── Creation and versioning ────────────────────────────────────

    /// Create a new draft owned by `creator`.
    pub fn create_artifact(&self, creator: ActorId, input: NewArtifact) -> Artifact {
        let artifact = Artifact::create(ArtifactId::new(), creator, input, Timestamp::now());
        self.artifacts.insert(artifact.id, artifact.clone());
        self.record(AuditEntry::new(
            AuditEntryType::ArtifactCreated,
            artifact.id,
            Some(creator),
            "create_artifact",
            None,
        ));
        tracing::info!(artifact = %artifact.id, actor = %creator, "artifact created");
        artifact
    }

    /// Create the next version of `id` as a new draft. The source is not
    /// modified and must be the latest, undeleted version of its chain.
    pub fn assign_new_version(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        const OPERATION: &str = "assign_new_version";
        let _lock = self.lock(id)?;
        let source = self.get(id)?;
        self.check_revision(&source, &invocation)?;

        let checked = self
            .guard(&invocation, &source)
            .require(Capability::Write, OPERATION)
            .and_then(|()| {
                let blocked = if source.is_deleted() {
                    Some("artifact is deleted")
                } else if self.successors.contains(&id) {
                    Some("only the latest version can be versioned")
                } else {
                    None
                };
                match blocked {
                    Some(reason) => Err(LifecycleError::InvalidTransition {
                        from: source.state,
                        operation: OPERATION,
                        reason: reason.to_string(),
                    }),
                    None => Ok(()),
                }
            });
        if let Err(err) = checked {
            self.record_rejection(id, invocation.actor, OPERATION, &err);
            return Err(err.into());
        }

        let next = source.derive_version(ArtifactId::new(), Timestamp::now());
        self.artifacts.insert(next.id, next.clone());
        self.index(&next);
        self.record(AuditEntry::new(
            AuditEntryType::VersionCreated,
            next.id,
            Some(invocation.actor),
            OPERATION,
            Some(serde_json::json!({ "previous_version": id, "version": next.version })),
        ));
        tracing::info!(
            artifact = %next.id,
            previous = %id,
            version = next.version,
            "new version created"
        );
        Ok(TransitionReport {
            artifact: next,
            changed: true,
            effects: Vec::new(),
            warnings: Vec::new(),
        })
    }

    // ── Lifecycle transitions ──────────────────────────────────────

    pub fn submit_for_review(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::Submit)
    }

    pub fn return_to_draft(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::ReturnToDraft)
    }

    pub fn make_public(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::MakePublic)
    }

    pub fn make_private(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::MakePrivate)
    }

    /// Publish. Idempotent: an already published artifact is returned
    /// unchanged with its original `published_at`.
    pub fn make_published(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::MakePublished)
    }

    /// File a withdrawal request. Returns the report and the new request id.
    pub fn request_withdrawal(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        reason: impl Into<String>,
    ) -> Result<(TransitionReport, RequestId), ControllerError> {
        let request_id = RequestId::new();
        let report = self.transition(
            id,
            invocation,
            LifecycleEvent::RequestWithdrawal {
                request_id,
                reason: reason.into(),
            },
        )?;
        Ok((report, request_id))
    }

    pub fn resolve_withdrawal(
        &self,
        request: RequestId,
        invocation: Invocation,
        approve: bool,
    ) -> Result<TransitionReport, ControllerError> {
        let artifact = self
            .requests
            .get(&request)
            .ok_or(ControllerError::RequestNotFound(request))?;
        self.transition(
            artifact,
            invocation,
            LifecycleEvent::ResolveWithdrawal {
                request_id: request,
                approve,
            },
        )
    }

    pub fn force_withdraw(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        justification: impl Into<String>,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(
            id,
            invocation,
            LifecycleEvent::ForceWithdraw {
                justification: justification.into(),
            },
        )
    }

    pub fn unwithdraw(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::Unwithdraw)
    }

    pub fn flag_spam(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::FlagSpam)
    }

    pub fn clear_spam(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::ClearSpam)
    }

    /// Soft-delete a never-visible artifact.
    pub fn delete(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::Delete)
    }

    /// Keep a private artifact from becoming public before `until`.
    pub fn embargo(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        until: Timestamp,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::Embargo { until })
    }

    /// End an embargo early and make the artifact public.
    pub fn lift_embargo(
        &self,
        id: ArtifactId,
        invocation: Invocation,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition(id, invocation, LifecycleEvent::LiftEmbargo)
    }

    /// Make public every artifact whose embargo ended at or before `now`.
    ///
    /// Runs as the system actor. Artifacts that cannot be lifted right now
    /// (lock held, flagged as spam) are logged and left for the next sweep.
    pub fn lift_elapsed_embargoes(&self, now: Timestamp) -> Vec<TransitionReport> {
        let mut due = self
            .artifacts
            .filter(|a| !a.is_deleted() && a.embargo_until.is_some_and(|until| until <= now));
        due.sort_by_key(|a| (a.embargo_until, a.id));

        let invocation = Invocation::new(ActorId::system());
        let mut lifted = Vec::with_capacity(due.len());
        for artifact in due {
            match self.transition_as(
                artifact.id,
                invocation,
                LifecycleEvent::LiftEmbargo,
                Authority::System,
            ) {
                Ok(report) => lifted.push(report),
                Err(err) => {
                    tracing::warn!(artifact = %artifact.id, error = %err, "embargo not lifted");
                }
            }
        }
        if !lifted.is_empty() {
            tracing::info!(count = lifted.len(), "elapsed embargoes lifted");
        }
        lifted
    }

    // ── Metadata ───────────────────────────────────────────────────

    pub fn update_metadata(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        patch: MetadataPatch,
    ) -> Result<TransitionReport, ControllerError> {
        self.commit(id, invocation, "update_metadata", Authority::Caller, |current, guard| {
            guard.require(Capability::Write, "update_metadata")?;
            let is_latest = !self.successors.contains(&current.id);
            let mut next = current.clone();
            let effects = next.apply_patch(patch, is_latest, Timestamp::now())?;
            Ok(Outcome {
                changed: next.revision != current.revision,
                artifact: next,
                effects,
                entry_type: AuditEntryType::MetadataUpdated,
            })
        })
    }

    /// Add a contributor, change their role, or remove them (`role == None`).
    pub fn set_contributor(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        contributor: ActorId,
        role: Option<Capability>,
    ) -> Result<TransitionReport, ControllerError> {
        self.commit(id, invocation, "set_contributor", Authority::Caller, |current, guard| {
            guard.require(Capability::Admin, "set_contributor")?;
            let mut next = current.clone();
            next.set_contributor(contributor, role, Timestamp::now())?;
            let changed = next.revision != current.revision;
            Ok(Outcome {
                effects: if changed { next.metadata_effects() } else { Vec::new() },
                artifact: next,
                changed,
                entry_type: AuditEntryType::ContributorChanged,
            })
        })
    }

    // ── Internals ──────────────────────────────────────────────────

    fn transition(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        event: LifecycleEvent,
    ) -> Result<TransitionReport, ControllerError> {
        self.transition_as(id, invocation, event, Authority::Caller)
    }

    fn transition_as(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        event: LifecycleEvent,
        authority: Authority,
    ) -> Result<TransitionReport, ControllerError> {
        self.commit(id, invocation, event.name(), authority, |current, guard| {
            let t = apply(current, &event, guard, Timestamp::now())?;
            Ok(Outcome {
                artifact: t.artifact,
                effects: t.effects,
                changed: t.changed,
                entry_type: AuditEntryType::TransitionCommitted,
            })
        })
    }

    fn commit<F>(
        &self,
        id: ArtifactId,
        invocation: Invocation,
        operation: &'static str,
        authority: Authority,
        compute: F,
    ) -> Result<TransitionReport, ControllerError>
    where
        F: FnOnce(&Artifact, &GuardContext) -> Result<Outcome, LifecycleError>,
    {
        let lock = self.lock(id)?;
        let current = self.get(id)?;
        self.check_revision(&current, &invocation)?;
        let guard = match authority {
            Authority::Caller => self.guard(&invocation, &current),
            Authority::System => GuardContext::new(invocation.actor, Some(Capability::Admin)),
        };

        let outcome = match compute(&current, &guard) {
            Ok(outcome) => outcome,
            Err(err) => {
                self.record_rejection(id, invocation.actor, operation, &err);
                return Err(err.into());
            }
        };

        if !outcome.changed {
            tracing::debug!(artifact = %id, operation, "operation was a no-op");
            return Ok(TransitionReport {
                artifact: outcome.artifact,
                changed: false,
                effects: Vec::new(),
                warnings: Vec::new(),
            });
        }

        let artifact = outcome.artifact;
        self.artifacts.insert(id, artifact.clone());
        self.index(&artifact);

        self.record(AuditEntry::new(
            outcome.entry_type,
            id,
            Some(invocation.actor),
            operation,
            Some(serde_json::json!({
                "from": current.state,
                "to": artifact.state,
                "revision": artifact.revision,
            })),
        ));
        tracing::info!(
            artifact = %id,
            actor = %invocation.actor,
            operation,
            from = %current.state,
            to = %artifact.state,
            revision = artifact.revision,
            "operation committed"
        );

        let batch: EffectBatch = outcome.effects.into_iter().collect();
        let effects = batch.iter().copied().collect::<Vec<_>>();
        let warnings = self.dispatch(id, invocation.actor, operation, batch);
        drop(lock);

        Ok(TransitionReport {
            artifact,
            changed: true,
            effects,
            warnings,
        })
    }

    fn dispatch(
        &self,
        id: ArtifactId,
        actor: ActorId,
        operation: &'static str,
        batch: EffectBatch,
    ) -> Vec<String> {
        if batch.is_empty() {
            return Vec::new();
        }
        let detail = serde_json::to_value(batch.iter().collect::<Vec<_>>()).ok();
        match self.sink.enqueue(batch) {
            Ok(()) => {
                self.record(AuditEntry::new(
                    AuditEntryType::EffectsEnqueued,
                    id,
                    Some(actor),
                    operation,
                    detail,
                ));
                Vec::new()
            }
            Err(err) => {
                tracing::warn!(artifact = %id, operation, error = %err, "post-commit effects not queued");
                self.record(AuditEntry::new(
                    AuditEntryType::EnqueueFailed,
                    id,
                    Some(actor),
                    operation,
                    Some(serde_json::json!({ "error": err.to_string() })),
                ));
                vec![format!("post-commit notification not queued: {err}")]
            }
        }
    }

    fn lock(&self, id: ArtifactId) -> Result<ArtifactGuard, ControllerError> {
        self.locks
            .try_acquire(id)
            .ok_or_else(|| ControllerError::ConflictingTransition {
                artifact: id,
                detail: "another transition is in progress".to_string(),
            })
    }

    fn check_revision(
        &self,
        current: &Artifact,
        invocation: &Invocation,
    ) -> Result<(), ControllerError> {
        match invocation.expected_revision {
            Some(expected) if expected != current.revision => {
                Err(ControllerError::ConflictingTransition {
                    artifact: current.id,
                    detail: format!(
                        "expected revision {expected}, artifact is at {}",
                        current.revision
                    ),
                })
            }
            _ => Ok(()),
        }
    }

    fn guard(&self, invocation: &Invocation, artifact: &Artifact) -> GuardContext {
        GuardContext::new(
            invocation.actor,
            self.permissions.capability_of(&invocation.actor, artifact),
        )
    }

    fn record_rejection(
        &self,
        id: ArtifactId,
        actor: ActorId,
        operation: &'static str,
        err: &LifecycleError,
    ) {
        if let LifecycleError::InvariantViolated(violation) = err {
            tracing::error!(artifact = %id, operation, %violation, "transition produced an inconsistent artifact");
        } else {
            tracing::info!(artifact = %id, %actor, operation, error = %err, "operation rejected");
        }
        self.record(AuditEntry::new(
            AuditEntryType::TransitionRejected,
            id,
            Some(actor),
            operation,
            Some(serde_json::json!({ "error": err.to_string() })),
        ));
    }

    fn record(&self, entry: AuditEntry) {
        self.audit.lock().append(entry);
    }
}
