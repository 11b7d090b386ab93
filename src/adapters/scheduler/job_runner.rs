//! JobRunner - ticks a `ScheduledJob` on its interval until shutdown.
//!
//! One runner per job; `main` spawns each onto the tokio runtime and flips a
//! shared watch channel on SIGINT/SIGTERM. A failed run is logged and the
//! next tick proceeds normally.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::ports::ScheduledJob;

/// Drives a single scheduled job.
pub struct JobRunner {
    job: Arc<dyn ScheduledJob>,
}

impl JobRunner {
    pub fn new(job: Arc<dyn ScheduledJob>) -> Self {
        Self { job }
    }

    /// Run the job loop until the shutdown signal flips to `true`.
    ///
    /// The first tick fires immediately, so every job runs once at startup.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.job.interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            job = self.job.name(),
            interval_secs = self.job.interval().as_secs(),
            "Scheduled job started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        tracing::info!(job = self.job.name(), "Scheduled job stopping");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Run the job exactly once, logging any failure.
    pub async fn tick(&self) {
        if let Err(e) = self.job.run_once().await {
            tracing::error!(job = self.job.name(), error = %e, "Scheduled job failed");
        }
    }
}
