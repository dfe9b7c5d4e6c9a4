//! # Asynchronous Notifier
//!
//! A bounded queue plus one background worker. Enqueueing uses
//! `try_send`, so the transition path never waits on collaborators: a full
//! queue is reported back to the caller as a warning instead.
//!
//! Deliveries for different artifacts run concurrently, up to
//! `max_in_flight`. Effects for one artifact are delivered strictly in the
//! order they were committed: the next one starts only after the previous
//! one was acknowledged or abandoned. A failing delivery is retried per the
//! [`BackoffPolicy`] and counted as failed once the budget is spent.
//!
//! When every delivery slot is busy the worker stops reading the queue, so
//! a slow collaborator makes `enqueue` refuse with
//! [`EnqueueError::QueueFull`]. Refused effects are handed back to the
//! caller inside the error and are not retried by the notifier.
//!
//! [`Notifier::shutdown`] stops intake, drains what is queued, waits for
//! in-flight deliveries (retries included) and returns the final
//! [`DeliveryReport`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{self, JoinHandle, JoinSet};

use pubflow_core::ArtifactId;
use pubflow_state::Effect;

use crate::backoff::BackoffPolicy;
use crate::batch::EffectBatch;
use crate::collaborator::Collaborators;

// ─── Intake ─────────────────────────────────────────────────────────

/// Effects could not be queued. Carries the effects that were not accepted.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("notification queue is full; {} effects not queued", .rejected.len())]
    QueueFull { rejected: Vec<Effect> },

    #[error("notifier is shut down; {} effects not queued", .rejected.len())]
    Closed { rejected: Vec<Effect> },
}

impl EnqueueError {
    pub fn rejected(&self) -> &[Effect] {
        match self {
            Self::QueueFull { rejected } | Self::Closed { rejected } => rejected,
        }
    }
}

/// Where committed transitions hand off their effects.
///
/// Must not block: implementations either accept the batch or refuse it.
pub trait EffectSink: Send + Sync {
    fn enqueue(&self, batch: EffectBatch) -> Result<(), EnqueueError>;
}

// ─── Statistics ─────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct DeliveryStats {
    enqueued: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    retried: AtomicU64,
    failed: AtomicU64,
}

impl DeliveryStats {
    fn snapshot(&self) -> DeliveryReport {
        DeliveryReport {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
        }
    }
}

/// Delivery counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryReport {
    /// Effects accepted into the queue.
    pub enqueued: u64,
    /// Effects refused at intake (queue full or closed).
    pub rejected: u64,
    /// Effects a collaborator acknowledged.
    pub delivered: u64,
    /// Failed attempts that were retried.
    pub retried: u64,
    /// Effects abandoned after exhausting the retry budget.
    pub failed: u64,
}

impl DeliveryReport {
    /// Effects accepted but not yet delivered or abandoned.
    pub fn outstanding(&self) -> u64 {
        self.enqueued
            .saturating_sub(self.delivered)
            .saturating_sub(self.failed)
    }
}

// ─── Notifier ───────────────────────────────────────────────────────

/// Notifier settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierConfig {
    /// Maximum number of queued, not yet dispatched effects. Also bounds
    /// the effects parked behind a busy artifact.
    pub queue_capacity: usize,
    /// Maximum number of deliveries running at once.
    pub max_in_flight: usize,
    pub backoff: BackoffPolicy,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            max_in_flight: 32,
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Cloneable intake side of a [`Notifier`].
#[derive(Debug, Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<Effect>,
    stats: Arc<DeliveryStats>,
}

impl NotifierHandle {
    /// Current delivery counters.
    pub fn report(&self) -> DeliveryReport {
        self.stats.snapshot()
    }

    /// Whether the worker has stopped taking effects.
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl EffectSink for NotifierHandle {
    fn enqueue(&self, batch: EffectBatch) -> Result<(), EnqueueError> {
        let mut effects = batch.into_effects().into_iter();
        while let Some(effect) = effects.next() {
            match self.sender.try_send(effect) {
                Ok(()) => {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                }
                Err(err) => {
                    let full = matches!(err, mpsc::error::TrySendError::Full(_));
                    let mut rejected = vec![err.into_inner()];
                    rejected.extend(effects);
                    self.stats
                        .rejected
                        .fetch_add(rejected.len() as u64, Ordering::Relaxed);
                    tracing::error!(
                        rejected = rejected.len(),
                        queue_full = full,
                        "could not queue post-commit effects"
                    );
                    return Err(if full {
                        EnqueueError::QueueFull { rejected }
                    } else {
                        EnqueueError::Closed { rejected }
                    });
                }
            }
        }
        Ok(())
    }
}

/// Owns the background delivery worker.
#[derive(Debug)]
pub struct Notifier {
    handle: NotifierHandle,
    shutdown: oneshot::Sender<()>,
    worker: JoinHandle<()>,
}

impl Notifier {
    /// Spawn the delivery worker. Must be called within a tokio runtime.
    pub fn start(collaborators: Collaborators, config: NotifierConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (shutdown, shutdown_rx) = oneshot::channel();
        let stats = Arc::new(DeliveryStats::default());
        let worker = tokio::spawn(run_worker(
            receiver,
            shutdown_rx,
            collaborators,
            config,
            stats.clone(),
        ));
        tracing::info!(
            queue_capacity = config.queue_capacity,
            max_in_flight = config.max_in_flight,
            max_attempts = config.backoff.max_attempts,
            "notifier started"
        );
        Self {
            handle: NotifierHandle { sender, stats },
            shutdown,
            worker,
        }
    }

    /// A handle for enqueueing effects.
    pub fn handle(&self) -> NotifierHandle {
        self.handle.clone()
    }

    pub fn report(&self) -> DeliveryReport {
        self.handle.report()
    }

    /// Stop intake, finish every queued and in-flight delivery, and return
    /// the final counters.
    pub async fn shutdown(self) -> DeliveryReport {
        let _ = self.shutdown.send(());
        if let Err(err) = self.worker.await {
            tracing::error!(error = %err, "notifier worker terminated abnormally");
        }
        let report = self.handle.report();
        tracing::info!(
            delivered = report.delivered,
            retried = report.retried,
            failed = report.failed,
            rejected = report.rejected,
            "notifier stopped"
        );
        report
    }
}

/// Per-artifact ordering.
///
/// An artifact has a lane while one of its effects is being delivered.
/// Effects that arrive for it meanwhile wait in the lane and are started
/// one at a time, so a collaborator sees them in commit order even when an
/// earlier one needs retries.
#[derive(Debug, Default)]
struct Lanes {
    waiting: HashMap<ArtifactId, VecDeque<Effect>>,
    backlog: usize,
}

impl Lanes {
    /// Open a lane for `effect`'s artifact, or queue it behind the effect
    /// already in progress. Returns the effect if it can start now.
    fn admit(&mut self, effect: Effect) -> Option<Effect> {
        match self.waiting.get_mut(&effect.artifact_id()) {
            Some(lane) => {
                lane.push_back(effect);
                self.backlog += 1;
                None
            }
            None => {
                self.waiting.insert(effect.artifact_id(), VecDeque::new());
                Some(effect)
            }
        }
    }

    /// The next waiting effect for `artifact`. Closes the lane when empty.
    fn advance(&mut self, artifact: ArtifactId) -> Option<Effect> {
        let lane = self.waiting.get_mut(&artifact)?;
        match lane.pop_front() {
            Some(next) => {
                self.backlog -= 1;
                Some(next)
            }
            None => {
                self.waiting.remove(&artifact);
                None
            }
        }
    }
}

struct Worker {
    collaborators: Collaborators,
    policy: BackoffPolicy,
    stats: Arc<DeliveryStats>,
    lanes: Lanes,
    in_flight: JoinSet<ArtifactId>,
    tasks: HashMap<task::Id, ArtifactId>,
    max_in_flight: usize,
    backlog_limit: usize,
}

impl Worker {
    /// Whether another effect may be taken off the queue. While this is
    /// false the channel fills up and intake starts refusing.
    fn has_room(&self) -> bool {
        self.in_flight.len() < self.max_in_flight && self.lanes.backlog < self.backlog_limit
    }

    fn dispatch(&mut self, effect: Effect) {
        if let Some(effect) = self.lanes.admit(effect) {
            self.spawn(effect);
        }
    }

    fn spawn(&mut self, effect: Effect) {
        let handle = self.in_flight.spawn(deliver(
            self.collaborators.clone(),
            effect,
            self.policy,
            self.stats.clone(),
        ));
        self.tasks.insert(handle.id(), effect.artifact_id());
    }

    fn settle(&mut self, joined: Result<(task::Id, ArtifactId), task::JoinError>) {
        let id = match joined {
            Ok((id, _)) => id,
            Err(err) => {
                tracing::error!(error = %err, "effect delivery task failed");
                err.id()
            }
        };
        if let Some(artifact) = self.tasks.remove(&id) {
            if let Some(next) = self.lanes.advance(artifact) {
                self.spawn(next);
            }
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<Effect>,
    mut shutdown: oneshot::Receiver<()>,
    collaborators: Collaborators,
    config: NotifierConfig,
    stats: Arc<DeliveryStats>,
) {
    let mut worker = Worker {
        collaborators,
        policy: config.backoff,
        stats,
        lanes: Lanes::default(),
        in_flight: JoinSet::new(),
        tasks: HashMap::new(),
        max_in_flight: config.max_in_flight.max(1),
        backlog_limit: config.queue_capacity.max(1),
    };
    let mut closing = false;
    let mut drained = false;

    loop {
        let room = !drained && worker.has_room();
        tokio::select! {
            biased;
            _ = &mut shutdown, if !closing => {
                // Refuse new effects; buffered ones are still received below.
                receiver.close();
                closing = true;
            }
            Some(joined) = worker.in_flight.join_next_with_id(), if !worker.in_flight.is_empty() => {
                worker.settle(joined);
            }
            received = receiver.recv(), if room => match received {
                Some(effect) => worker.dispatch(effect),
                None => drained = true,
            },
            else => break,
        }
        if drained && worker.in_flight.is_empty() {
            break;
        }
    }
}

async fn deliver(
    collaborators: Collaborators,
    effect: Effect,
    policy: BackoffPolicy,
    stats: Arc<DeliveryStats>,
) -> ArtifactId {
    let mut attempt = 1;
    loop {
        match collaborators.deliver(effect).await {
            Ok(()) => {
                stats.delivered.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(%effect, attempt, "effect delivered");
                return effect.artifact_id();
            }
            Err(err) if policy.should_retry(attempt) => {
                let delay = policy.delay(attempt);
                stats.retried.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    %effect,
                    attempt,
                    max_attempts = policy.max_attempts,
                    "effect delivery failed, retrying in {delay:?}: {err}"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                stats.failed.fetch_add(1, Ordering::Relaxed);
                tracing::error!(%effect, attempt, error = %err, "effect delivery abandoned");
                return effect.artifact_id();
            }
        }
    }
}
