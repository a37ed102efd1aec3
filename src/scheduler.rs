use crate::pipeline::{Pipeline, StoreOutcome};
use crate::tokens::TokenStore;
use std::{
    future::Future,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};
use thiserror::Error;
use tokio::{
    task::JoinHandle,
    time::{MissedTickBehavior, interval, timeout},
};
use tracing::{info, warn};

/// How long shutdown waits for a run that is still writing.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(120);

#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("a remediation run is already in flight")]
    AlreadyRunning,
}

/// At most one run at a time; the permit releases the guard when dropped.
#[derive(Debug, Clone, Default)]
pub struct RunGuard {
    running: Arc<AtomicBool>,
}

impl RunGuard {
    pub fn try_acquire(&self) -> Option<RunPermit> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunPermit {
                running: self.running.clone(),
            })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

#[derive(Debug)]
pub struct RunPermit {
    running: Arc<AtomicBool>,
}

impl Drop for RunPermit {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Scheduler {
    pipeline: Pipeline,
    store: Arc<dyn TokenStore>,
    guard: RunGuard,
    every: Duration,
}

impl Scheduler {
    pub fn new(pipeline: Pipeline, store: Arc<dyn TokenStore>, every: Duration) -> Self {
        Self {
            pipeline,
            store,
            guard: RunGuard::default(),
            every,
        }
    }

    pub async fn trigger(&self) -> Result<Vec<StoreOutcome>, ScheduleError> {
        let _permit = self
            .guard
            .try_acquire()
            .ok_or(ScheduleError::AlreadyRunning)?;
        Ok(self.pipeline.run_all(self.store.as_ref()).await)
    }

    /// Fires a multi-store run every interval until `shutdown` resolves.
    /// Runs execute on their own task, so a slow run makes later ticks skip
    /// rather than queue. A run still in flight at shutdown is awaited for
    /// up to `SHUTDOWN_GRACE`.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) {
        let mut ticker = interval(self.every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);
        info!(
            target = "remedy.scheduler",
            every_secs = self.every.as_secs(),
            "scheduler_started"
        );
        let mut in_flight: Option<JoinHandle<()>> = None;
        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    if in_flight.as_ref().is_some_and(|run| !run.is_finished()) {
                        info!(target = "remedy.scheduler", "tick_skipped");
                        continue;
                    }
                    let scheduler = self.clone();
                    in_flight = Some(tokio::spawn(async move { scheduler.tick().await }));
                }
            }
        }

        let Some(run) = in_flight.filter(|run| !run.is_finished()) else {
            info!(target = "remedy.scheduler", "scheduler_stopped");
            return;
        };
        info!(target = "remedy.scheduler", "waiting_for_in_flight_run");
        match timeout(SHUTDOWN_GRACE, run).await {
            Ok(Ok(())) => info!(target = "remedy.scheduler", "scheduler_stopped"),
            Ok(Err(err)) => warn!(
                target = "remedy.scheduler",
                error = %err,
                "in_flight_run_panicked"
            ),
            Err(_) => warn!(
                target = "remedy.scheduler",
                grace_secs = SHUTDOWN_GRACE.as_secs(),
                "in_flight_run_abandoned"
            ),
        }
    }

    async fn tick(&self) {
        match self.trigger().await {
            Ok(outcomes) => {
                let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
                info!(
                    target = "remedy.scheduler",
                    stores = outcomes.len(),
                    failed,
                    "scheduled_run_finished"
                );
            }
            Err(err) => info!(target = "remedy.scheduler", error = %err, "tick_skipped"),
        }
    }
}
