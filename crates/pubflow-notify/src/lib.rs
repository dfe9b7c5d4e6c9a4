//! # pubflow-notify — Post-Commit Effect Delivery
//!
//! Hands the [`Effect`](pubflow_state::Effect)s of committed transitions to
//! the external collaborators that act on them: the search indexer, the
//! metadata registry and the spam moderator.
//!
//! Delivery is decoupled from the transition path. The controller pushes an
//! [`EffectBatch`] into an [`EffectSink`] without blocking; the
//! [`Notifier`] drains a bounded queue on a background task and retries
//! failing deliveries with exponential backoff. Accepted effects are
//! delivered at least once and in commit order per artifact, so
//! collaborators must handle repeats idempotently.
//!
//! A failure here never undoes a committed transition. It is logged,
//! retried, and counted in the [`DeliveryReport`]. Effects refused at
//! intake because the queue is full are returned to the caller and counted
//! as `rejected`; the notifier does not hold on to them.

pub mod backoff;
pub mod batch;
pub mod collaborator;
pub mod memory;
pub mod notifier;

pub use backoff::BackoffPolicy;
pub use batch::EffectBatch;
pub use collaborator::{
    CollaboratorError, Collaborators, MetadataRegistry, SearchIndexer, SpamModerator,
};
pub use memory::{LoggingCollaborator, RecordingCollaborator};
pub use notifier::{
    DeliveryReport, EffectSink, EnqueueError, Notifier, NotifierConfig, NotifierHandle,
};
