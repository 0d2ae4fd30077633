//! Background loop that runs a [`MonitorCycle`] on a fixed interval
//!
//! ```text
//! Idle ──start()──► Running ──stop()──► Stopping ──loop exited──► Stopped
//! ```
//!
//! The first cycle runs right after `start()`. The interval is measured from the
//! end of one cycle to the start of the next, so cycles never overlap.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::FutureExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

use super::Cancellation;
use super::cycle::{CycleError, MonitorCycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopping,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerError {
    /// `start()` is only valid once, from [`SchedulerState::Idle`]
    AlreadyStarted(SchedulerState),
}

impl fmt::Display for SchedulerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedulerError::AlreadyStarted(state) => {
                write!(f, "scheduler cannot start from state {:?}", state)
            }
        }
    }
}

impl std::error::Error for SchedulerError {}

/// Cycle counters, shared with the background loop
#[derive(Debug, Default)]
struct Counters {
    completed: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub completed: u64,
    pub failed: u64,
}

pub struct Scheduler {
    cycle: Arc<MonitorCycle>,
    interval: Duration,
    state: SchedulerState,
    shutdown: Option<watch::Sender<bool>>,
    task: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl Scheduler {
    pub fn new(cycle: MonitorCycle, interval: Duration) -> Self {
        Self {
            cycle: Arc::new(cycle),
            interval,
            state: SchedulerState::Idle,
            shutdown: None,
            task: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Spawns the background loop. Must be called from within a tokio runtime.
    pub fn start(&mut self) -> Result<(), SchedulerError> {
        if self.state != SchedulerState::Idle {
            return Err(SchedulerError::AlreadyStarted(self.state));
        }

        let (tx, cancel) = Cancellation::channel();
        self.task = Some(tokio::spawn(run_loop(
            self.cycle.clone(),
            self.interval,
            cancel,
            self.counters.clone(),
        )));
        self.shutdown = Some(tx);
        self.state = SchedulerState::Running;
        Ok(())
    }

    /// Requests a stop and waits until the loop, including any in-flight
    /// cycle, has exited.
    pub async fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            self.state = SchedulerState::Stopped;
            return;
        };

        self.state = SchedulerState::Stopping;
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }

        if let Err(e) = task.await {
            error!("scheduler loop ended abnormally: {e}");
        }
        self.state = SchedulerState::Stopped;
        info!("Stopped background website checking task");
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(true);
        }
    }
}

#[instrument(skip_all, fields(interval = ?interval))]
async fn run_loop(
    cycle: Arc<MonitorCycle>,
    interval: Duration,
    cancel: Cancellation,
    counters: Arc<Counters>,
) {
    info!("Started background website checking task");

    loop {
        match AssertUnwindSafe(cycle.run(&cancel)).catch_unwind().await {
            Ok(Ok(report)) => {
                counters.completed.fetch_add(1, Ordering::SeqCst);
                debug!("cycle finished: {report:?}");
            }
            Ok(Err(CycleError::Cancelled)) => {
                debug!("cycle abandoned on stop request");
                break;
            }
            Ok(Err(e)) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!("Error in background check: {e}");
            }
            Err(_) => {
                counters.failed.fetch_add(1, Ordering::SeqCst);
                error!("Error in background check: cycle panicked");
            }
        }

        if cancel.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = cancel.cancelled() => break,
        }
    }
}
