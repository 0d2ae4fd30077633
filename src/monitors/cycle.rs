//! One monitoring pass over every stored target
//!
//! ## Phases
//!
//! 1. load all targets (one read)
//! 2. probe every URL concurrently and wait for all probes
//! 3. collect resources for every target with a usable server profile,
//!    concurrently, and wait for all collections
//! 4. apply results and evaluate the four alert channels of each target
//! 5. write everything back (one commit)
//!
//! The cycle is the only writer of monitor state while it runs. Results of the
//! concurrent tasks are handed back by index and applied here, so no two tasks
//! ever touch the same target.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument, warn};

use super::Cancellation;
use crate::alerts::{AlertCondition, AlertGate, AlertMessage};
use crate::config::{Config, MonitorConfig};
use crate::metrics::MetricCollector;
use crate::notify::{self, Notifier};
use crate::probe::{HttpProbe, Probe};
use crate::storage::{StorageError, TargetStore};
use crate::{Resource, ResourceSnapshot, Target};

#[derive(Debug)]
pub enum CycleError {
    /// Loading or committing targets failed; nothing was written
    Storage(StorageError),

    /// A stop was requested before the cycle could commit
    Cancelled,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::Storage(err) => write!(f, "monitor cycle storage error: {}", err),
            CycleError::Cancelled => write!(f, "monitor cycle cancelled"),
        }
    }
}

impl std::error::Error for CycleError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CycleError::Storage(err) => Some(err),
            CycleError::Cancelled => None,
        }
    }
}

impl From<StorageError> for CycleError {
    fn from(err: StorageError) -> Self {
        CycleError::Storage(err)
    }
}

/// What a finished cycle did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub targets: usize,
    pub up: usize,
    pub down: usize,
    /// Collections that produced at least one reading
    pub collected: usize,
    pub alerts_sent: usize,
    /// Alerts that were due but not delivered; they are retried next cycle
    pub alerts_failed: usize,
}

pub struct MonitorCycle {
    store: Arc<dyn TargetStore>,
    probe: Arc<dyn Probe>,
    collector: Arc<MetricCollector>,
    notifier: Arc<dyn Notifier>,
    gate: AlertGate,
    threshold: f64,
}

impl MonitorCycle {
    pub fn new(
        store: Arc<dyn TargetStore>,
        probe: Arc<dyn Probe>,
        collector: Arc<MetricCollector>,
        notifier: Arc<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            store,
            probe,
            collector,
            notifier,
            gate: AlertGate::new(config.cooldown()),
            threshold: config.resource_threshold,
        }
    }

    /// Wires up the HTTP probe, SSH collector and notifiers described by `config`
    pub fn from_config(config: &Config, store: Arc<dyn TargetStore>) -> Result<Self> {
        let probe = Arc::new(HttpProbe::new(&config.monitor.probe)?);
        let collector =
            Arc::new(MetricCollector::ssh(&config.monitor.ssh).with_test_mode(config.test_mode));
        let notifier = notify::from_config(&config.notifiers)?;

        Ok(Self::new(store, probe, collector, notifier, &config.monitor))
    }

    #[instrument(skip_all)]
    pub async fn run(&self, cancel: &Cancellation) -> Result<CycleReport, CycleError> {
        let mut targets = self.store.list_targets().await?;
        if targets.is_empty() {
            debug!("no targets to check");
            return Ok(CycleReport::default());
        }

        let statuses = self.probe_all(&targets, cancel).await?;
        let snapshots = self.collect_all(&targets, cancel).await?;

        let mut report = CycleReport {
            targets: targets.len(),
            ..CycleReport::default()
        };

        for ((target, is_up), snapshot) in targets.iter_mut().zip(statuses).zip(snapshots) {
            self.apply(target, is_up.unwrap_or(false), snapshot, &mut report)
                .await;
        }

        // alerts may already be out, so the results are committed even if a
        // stop came in meanwhile
        self.store.commit(&targets).await?;

        info!(
            "Auto-checked {} websites ({} up, {} down)",
            report.targets, report.up, report.down
        );
        Ok(report)
    }

    async fn probe_all(
        &self,
        targets: &[Target],
        cancel: &Cancellation,
    ) -> Result<Vec<Option<bool>>, CycleError> {
        let mut tasks = JoinSet::new();
        for (index, target) in targets.iter().enumerate() {
            let probe = self.probe.clone();
            let url = target.url.clone();
            tasks.spawn(async move { (index, probe.probe(&url).await) });
        }

        join_indexed(tasks, targets.len(), cancel, "probe").await
    }

    async fn collect_all(
        &self,
        targets: &[Target],
        cancel: &Cancellation,
    ) -> Result<Vec<Option<ResourceSnapshot>>, CycleError> {
        let mut tasks = JoinSet::new();
        for (index, target) in targets.iter().enumerate() {
            let Some(profile) = &target.server else {
                continue;
            };
            if !profile.credentials.is_usable() {
                warn!(
                    "{}: server {} has no usable credentials, skipping collection",
                    target.url, profile.host
                );
                continue;
            }

            let collector = self.collector.clone();
            let profile = profile.clone();
            tasks.spawn(async move { (index, collector.collect_profile(&profile).await) });
        }

        join_indexed(tasks, targets.len(), cancel, "collection").await
    }

    async fn apply(
        &self,
        target: &mut Target,
        is_up: bool,
        snapshot: Option<ResourceSnapshot>,
        report: &mut CycleReport,
    ) {
        let now = Utc::now();

        target.is_up = is_up;
        target.last_checked = now;
        if is_up {
            report.up += 1;
        } else {
            report.down += 1;
        }

        if let (Some(server), Some(snapshot)) = (target.server.as_mut(), snapshot) {
            if !snapshot.is_unknown() {
                report.collected += 1;
            }
            server.record(&snapshot, now);

            for resource in Resource::ALL {
                let Some(usage) = snapshot.get(resource) else {
                    continue;
                };
                let condition = AlertCondition::Resource {
                    usage: Some(usage),
                    threshold: self.threshold,
                };
                if !self
                    .gate
                    .should_alert(condition, server.last_alert(resource), now)
                {
                    continue;
                }

                let message = AlertMessage::resource(
                    &target.url,
                    &server.host,
                    resource,
                    usage,
                    self.threshold,
                    now,
                );
                if self.deliver(&message, report).await {
                    server.set_last_alert(resource, now);
                }
            }
        }

        if target.notify_on_down
            && self.gate.should_alert(
                AlertCondition::Down { is_up },
                target.last_notification_sent,
                now,
            )
        {
            let message = AlertMessage::website_down(&target.url, now);
            if self.deliver(&message, report).await {
                target.last_notification_sent = Some(now);
            }
        }
    }

    async fn deliver(&self, message: &AlertMessage, report: &mut CycleReport) -> bool {
        let delivered = self.notifier.notify(&message.subject, &message.body).await;
        if delivered {
            info!("{}", message.subject);
            report.alerts_sent += 1;
        } else {
            warn!(
                "{} was not delivered by {}, will retry next cycle",
                message.subject,
                self.notifier.name()
            );
            report.alerts_failed += 1;
        }
        delivered
    }
}

/// Waits for every task and places its result at the index it was spawned
/// for. A task that panicked leaves its slot empty. On cancellation the
/// remaining tasks are aborted and awaited before returning.
async fn join_indexed<T: Send + 'static>(
    mut tasks: JoinSet<(usize, T)>,
    len: usize,
    cancel: &Cancellation,
    what: &str,
) -> Result<Vec<Option<T>>, CycleError> {
    let mut slots: Vec<Option<T>> = std::iter::repeat_with(|| None).take(len).collect();

    loop {
        tokio::select! {
            joined = tasks.join_next() => match joined {
                Some(Ok((index, value))) => slots[index] = Some(value),
                Some(Err(e)) => error!("{what} task failed: {e}"),
                None => break,
            },
            _ = cancel.cancelled() => {
                debug!("cancelling {} outstanding {what} tasks", tasks.len());
                tasks.shutdown().await;
                return Err(CycleError::Cancelled);
            }
        }
    }

    Ok(slots)
}
