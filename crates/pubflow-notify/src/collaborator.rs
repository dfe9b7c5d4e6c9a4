//! # Collaborator Ports
//!
//! The external services a committed transition notifies. Implementations
//! live outside this workspace (search cluster, DOI registry, spam
//! service); [`crate::memory`] provides logging and recording stand-ins.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use pubflow_core::ArtifactId;
use pubflow_state::Effect;

/// A collaborator call failed. Every variant is retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The service could not be reached or timed out.
    #[error("{service} unavailable: {message}")]
    Unavailable {
        service: &'static str,
        message: String,
    },

    /// The service answered but refused the call.
    #[error("{service} rejected the call: {message}")]
    Rejected {
        service: &'static str,
        message: String,
    },
}

/// Search-indexing collaborator.
#[async_trait]
pub trait SearchIndexer: Send + Sync {
    /// Bring the search index entry for the artifact up to date, adding or
    /// removing it according to its current visibility.
    async fn reindex(&self, artifact: ArtifactId) -> Result<(), CollaboratorError>;
}

/// Metadata-registry (DOI provider) collaborator.
#[async_trait]
pub trait MetadataRegistry: Send + Sync {
    async fn resync(&self, artifact: ArtifactId) -> Result<(), CollaboratorError>;
}

/// Spam moderation collaborator.
#[async_trait]
pub trait SpamModerator: Send + Sync {
    async fn flag_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError>;
    async fn clear_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError>;
}

/// The set of collaborators effects are routed to.
#[derive(Clone)]
pub struct Collaborators {
    pub indexer: Arc<dyn SearchIndexer>,
    pub registry: Arc<dyn MetadataRegistry>,
    pub moderator: Arc<dyn SpamModerator>,
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

impl Collaborators {
    /// Route every effect kind to one object implementing all three ports.
    pub fn uniform<C>(collaborator: Arc<C>) -> Self
    where
        C: SearchIndexer + MetadataRegistry + SpamModerator + 'static,
    {
        Self {
            indexer: collaborator.clone(),
            registry: collaborator.clone(),
            moderator: collaborator,
        }
    }

    /// Perform one delivery attempt.
    pub async fn deliver(&self, effect: Effect) -> Result<(), CollaboratorError> {
        match effect {
            Effect::Reindex(id) => self.indexer.reindex(id).await,
            Effect::ResyncMetadata(id) => self.registry.resync(id).await,
            Effect::FlagSpam(id) => self.moderator.flag_spam(id).await,
            Effect::ClearSpam(id) => self.moderator.clear_spam(id).await,
        }
    }
}
