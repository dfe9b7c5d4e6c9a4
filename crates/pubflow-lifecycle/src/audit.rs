//! # Controller Audit Trail
//!
//! Records every committed and rejected operation, and every effect
//! hand-off, for moderator review. Per-artifact transition records live on
//! the artifact itself; this trail additionally keeps rejections and
//! delivery hand-offs, which never reach the artifact.
//!
//! The trail is bounded: when it exceeds its capacity the oldest 10% of
//! entries are dropped.

use serde::{Deserialize, Serialize};

use pubflow_core::{ActorId, ArtifactId, Timestamp};

/// Kind of audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEntryType {
    ArtifactCreated,
    VersionCreated,
    MetadataUpdated,
    ContributorChanged,
    TransitionCommitted,
    /// An operation was refused; the artifact is unchanged.
    TransitionRejected,
    EffectsEnqueued,
    /// Effects were committed but could not be queued for delivery.
    EnqueueFailed,
}

impl AuditEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ArtifactCreated => "artifact_created",
            Self::VersionCreated => "version_created",
            Self::MetadataUpdated => "metadata_updated",
            Self::ContributorChanged => "contributor_changed",
            Self::TransitionCommitted => "transition_committed",
            Self::TransitionRejected => "transition_rejected",
            Self::EffectsEnqueued => "effects_enqueued",
            Self::EnqueueFailed => "enqueue_failed",
        }
    }
}

impl std::fmt::Display for AuditEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub entry_type: AuditEntryType,
    pub timestamp: Timestamp,
    pub artifact_id: ArtifactId,
    pub actor: Option<ActorId>,
    /// Operation name.
    pub operation: String,
    /// Structured detail (error text, state change, effect list).
    pub detail: Option<serde_json::Value>,
}

impl AuditEntry {
    pub fn new(
        entry_type: AuditEntryType,
        artifact_id: ArtifactId,
        actor: Option<ActorId>,
        operation: impl Into<String>,
        detail: Option<serde_json::Value>,
    ) -> Self {
        Self {
            entry_type,
            timestamp: Timestamp::now(),
            artifact_id,
            actor,
            operation: operation.into(),
            detail,
        }
    }
}

/// Bounded, append-only audit log.
pub struct AuditTrail {
    entries: Vec<AuditEntry>,
    max_entries: usize,
}

impl AuditTrail {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Vec::new(),
            max_entries,
        }
    }

    /// Append, trimming the oldest 10% once over capacity.
    pub fn append(&mut self, entry: AuditEntry) {
        self.entries.push(entry);
        if self.entries.len() > self.max_entries {
            let trim_count = (self.max_entries / 10).max(1);
            self.entries.drain(..trim_count.min(self.entries.len()));
        }
    }

    pub fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries concerning one artifact, oldest first.
    pub fn entries_for(&self, artifact: &ArtifactId) -> Vec<AuditEntry> {
        self.entries
            .iter()
            .filter(|e| &e.artifact_id == artifact)
            .cloned()
            .collect()
    }

    pub fn entries_by_type(&self, entry_type: AuditEntryType) -> Vec<&AuditEntry> {
        self.entries
            .iter()
            .filter(|e| e.entry_type == entry_type)
            .collect()
    }
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::new(10_000)
    }
}

impl std::fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditTrail")
            .field("entries", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}
