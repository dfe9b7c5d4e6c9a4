//! # Embargo Sweeper
//!
//! Periodic task that lifts elapsed embargoes through the controller and
//! writes each lifted artifact through to the database. A missed tick is
//! delayed rather than bursted; an artifact that cannot be lifted on one
//! run is retried on the next.

use std::time::Duration;

use pubflow_core::Timestamp;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::routes::persist;
use crate::state::AppState;

/// Lift every embargo that ended at or before `now`. Returns how many
/// artifacts became public.
pub async fn sweep_once(state: &AppState, now: Timestamp) -> usize {
    let lifted = state.controller.lift_elapsed_embargoes(now);
    for report in &lifted {
        // The in-memory snapshot stays ahead of the database until the
        // artifact is written again.
        if let Err(e) = persist(state, &report.artifact).await {
            tracing::warn!(artifact = %report.artifact.id, error = %e, "lifted embargo not persisted");
        }
    }
    lifted.len()
}

/// Handle to the running sweeper task.
#[derive(Debug)]
pub struct EmbargoSweeper {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl EmbargoSweeper {
    /// Sweep every `period`, starting one period from now.
    pub fn start(state: AppState, period: Duration) -> Self {
        let (shutdown, mut stop) = watch::channel(false);
        let task = tokio::spawn(async move {
            let mut ticks = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = stop.changed() => break,
                    _ = ticks.tick() => {
                        let lifted = sweep_once(&state, Timestamp::now()).await;
                        tracing::debug!(lifted, "embargo sweep finished");
                    }
                }
            }
        });
        Self { shutdown, task }
    }

    /// Stop the task after any sweep in progress completes.
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::error!("embargo sweeper task failed: {e}");
        }
    }
}
