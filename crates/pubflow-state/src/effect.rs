//! # Post-Commit Effects
//!
//! Side effects a committed transition asks external collaborators to
//! perform. Effects are data: the state machine returns them, the
//! notifier delivers them. Collaborators must treat them idempotently;
//! delivery is at-least-once.

use serde::{Deserialize, Serialize};

use pubflow_core::ArtifactId;

/// A side effect to run after a transition has been committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "artifact_id", rename_all = "snake_case")]
pub enum Effect {
    /// Ask the search collaborator to reindex the artifact.
    Reindex(ArtifactId),
    /// Ask the metadata registry (DOI provider) to resync the artifact.
    ResyncMetadata(ArtifactId),
    /// Report the artifact to the spam collaborator.
    FlagSpam(ArtifactId),
    /// Clear a previous spam report.
    ClearSpam(ArtifactId),
}

impl Effect {
    /// The artifact this effect concerns.
    pub fn artifact_id(&self) -> ArtifactId {
        match self {
            Self::Reindex(id) | Self::ResyncMetadata(id) | Self::FlagSpam(id) | Self::ClearSpam(id) => {
                *id
            }
        }
    }

    /// Stable name used in logs and delivery reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Reindex(_) => "reindex",
            Self::ResyncMetadata(_) => "resync_metadata",
            Self::FlagSpam(_) => "flag_spam",
            Self::ClearSpam(_) => "clear_spam",
        }
    }
}

impl std::fmt::Display for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind(), self.artifact_id())
    }
}
