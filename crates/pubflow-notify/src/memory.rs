//! In-process collaborators.
//!
//! [`LoggingCollaborator`] is the default when no real services are wired
//! in: it records each call as a structured log line. [`RecordingCollaborator`]
//! keeps every successful delivery in memory and can be told to fail, for
//! exercising retry paths in tests.

use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use pubflow_core::ArtifactId;
use pubflow_state::Effect;

use crate::collaborator::{CollaboratorError, MetadataRegistry, SearchIndexer, SpamModerator};

/// Logs every call and always succeeds.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingCollaborator;

#[async_trait]
impl SearchIndexer for LoggingCollaborator {
    async fn reindex(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        tracing::info!(%artifact, "search reindex requested");
        Ok(())
    }
}

#[async_trait]
impl MetadataRegistry for LoggingCollaborator {
    async fn resync(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        tracing::info!(%artifact, "metadata registry resync requested");
        Ok(())
    }
}

#[async_trait]
impl SpamModerator for LoggingCollaborator {
    async fn flag_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        tracing::info!(%artifact, "artifact reported as spam");
        Ok(())
    }

    async fn clear_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        tracing::info!(%artifact, "spam report cleared");
        Ok(())
    }
}

/// Records deliveries; fails the next `n` calls on request.
#[derive(Debug, Default)]
pub struct RecordingCollaborator {
    delivered: Mutex<Vec<Effect>>,
    attempts: AtomicU32,
    failures_left: AtomicU32,
}

impl RecordingCollaborator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` calls fail with [`CollaboratorError::Unavailable`].
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Effects delivered successfully, in delivery order.
    pub fn delivered(&self) -> Vec<Effect> {
        self.delivered.lock().clone()
    }

    /// Total calls made, failed ones included.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn record(&self, service: &'static str, effect: Effect) -> Result<(), CollaboratorError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CollaboratorError::Unavailable {
                service,
                message: "injected failure".to_string(),
            });
        }
        self.delivered.lock().push(effect);
        Ok(())
    }
}

#[async_trait]
impl SearchIndexer for RecordingCollaborator {
    async fn reindex(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        self.record("search", Effect::Reindex(artifact))
    }
}

#[async_trait]
impl MetadataRegistry for RecordingCollaborator {
    async fn resync(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        self.record("registry", Effect::ResyncMetadata(artifact))
    }
}

#[async_trait]
impl SpamModerator for RecordingCollaborator {
    async fn flag_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        self.record("spam", Effect::FlagSpam(artifact))
    }

    async fn clear_spam(&self, artifact: ArtifactId) -> Result<(), CollaboratorError> {
        self.record("spam", Effect::ClearSpam(artifact))
    }
}
