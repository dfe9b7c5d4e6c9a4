//! Shared fixtures for controller tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use pubflow_core::ActorId;
use pubflow_lifecycle::{ContributorPermissions, LifecycleController};
use pubflow_notify::{EffectBatch, EffectSink, EnqueueError};
use pubflow_state::{Effect, NewArtifact};

/// Sink that keeps every enqueued effect, or refuses on demand.
#[derive(Default)]
pub struct CollectingSink {
    effects: Mutex<Vec<Effect>>,
    refuse: AtomicBool,
}

impl CollectingSink {
    pub fn effects(&self) -> Vec<Effect> {
        self.effects.lock().clone()
    }

    pub fn clear(&self) {
        self.effects.lock().clear();
    }

    pub fn refuse(&self, refuse: bool) {
        self.refuse.store(refuse, Ordering::SeqCst);
    }
}

impl EffectSink for CollectingSink {
    fn enqueue(&self, batch: EffectBatch) -> Result<(), EnqueueError> {
        if self.refuse.load(Ordering::SeqCst) {
            return Err(EnqueueError::QueueFull {
                rejected: batch.into_effects(),
            });
        }
        self.effects.lock().extend(batch.into_effects());
        Ok(())
    }
}

pub struct Fixture {
    pub controller: LifecycleController,
    pub sink: Arc<CollectingSink>,
    pub owner: ActorId,
    pub moderator: ActorId,
}

pub fn fixture() -> Fixture {
    let moderator = ActorId::new();
    let sink = Arc::new(CollectingSink::default());
    let controller = LifecycleController::new(
        Arc::new(ContributorPermissions::new([moderator])),
        sink.clone(),
    );
    Fixture {
        controller,
        sink,
        owner: ActorId::new(),
        moderator,
    }
}

pub fn publishable() -> NewArtifact {
    NewArtifact {
        title: "Effects of caffeine on working memory".to_string(),
        parent: Some("project-42".to_string()),
        tags: vec!["psychology".to_string(), "cognition".to_string()],
        primary_file: Some("osfstorage/abc123".to_string()),
    }
}
