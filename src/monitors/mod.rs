//! The periodic monitoring engine
//!
//! ```text
//! Scheduler ──tick──► MonitorCycle ──► probes      (JoinSet, one task per target)
//!     ▲                    │      └──► collections (JoinSet, one task per profiled target)
//!     │                    ▼
//!     │               AlertGate ×4 per target ──► Notifier
//!     │                    │
//!     └── sleep(interval) ◄┴── TargetStore::commit (once per cycle)
//! ```
//!
//! Stopping is cooperative: the scheduler flips a [`Cancellation`] that the
//! cycle checks while waiting on its fan-outs and the loop checks while sleeping.

pub mod cycle;
pub mod scheduler;

use tokio::sync::watch;

/// Read side of a stop request
#[derive(Debug, Clone)]
pub struct Cancellation {
    rx: watch::Receiver<bool>,
}

impl Cancellation {
    /// A fresh signal and the sender that triggers it
    pub fn channel() -> (watch::Sender<bool>, Cancellation) {
        let (tx, rx) = watch::channel(false);
        (tx, Cancellation { rx })
    }

    /// A signal that never fires, for one-off cycles
    pub fn never() -> Cancellation {
        Self::channel().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once a stop was requested. Pends forever if the sender is gone
    /// without having requested one.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
