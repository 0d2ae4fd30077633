//! In-memory storage backend (no persistence)
//!
//! Useful for:
//! - Testing without database dependencies
//! - Running with `"backend": "none"`
//!
//! All data is lost on restart.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::TargetStore;
use super::error::{StorageError, StorageResult};
use crate::{ServerProfile, Target};

#[derive(Default)]
pub struct MemoryStore {
    /// Targets keyed by URL
    targets: RwLock<BTreeMap<String, Target>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with complete targets
    pub fn with_targets(targets: impl IntoIterator<Item = Target>) -> Self {
        Self {
            targets: RwLock::new(
                targets
                    .into_iter()
                    .map(|target| (target.url.clone(), target))
                    .collect(),
            ),
        }
    }
}

/// Copies the monitor-owned fields of `observed` onto `stored`.
fn apply_observed(stored: &mut Target, observed: &Target) {
    stored.is_up = observed.is_up;
    stored.last_checked = observed.last_checked;
    stored.last_notification_sent = observed.last_notification_sent;

    if let (Some(server), Some(seen)) = (stored.server.as_mut(), observed.server.as_ref()) {
        server.cpu_usage = seen.cpu_usage;
        server.ram_usage = seen.ram_usage;
        server.disk_usage = seen.disk_usage;
        server.last_checked = seen.last_checked;
        server.last_cpu_alert = seen.last_cpu_alert;
        server.last_ram_alert = seen.last_ram_alert;
        server.last_disk_alert = seen.last_disk_alert;
    }
}

#[async_trait]
impl TargetStore for MemoryStore {
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        Ok(self.targets.read().await.values().cloned().collect())
    }

    async fn get_target(&self, url: &str) -> StorageResult<Option<Target>> {
        Ok(self.targets.read().await.get(url).cloned())
    }

    async fn commit(&self, targets: &[Target]) -> StorageResult<()> {
        debug!("in-memory commit of {} targets", targets.len());

        let mut stored_targets = self.targets.write().await;
        for observed in targets {
            if let Some(stored) = stored_targets.get_mut(&observed.url) {
                apply_observed(stored, observed);
            }
        }
        Ok(())
    }

    async fn add_target(&self, url: &str) -> StorageResult<()> {
        self.targets
            .write()
            .await
            .entry(url.to_string())
            .or_insert_with(|| Target::new(url));
        Ok(())
    }

    async fn remove_target(&self, url: &str) -> StorageResult<bool> {
        Ok(self.targets.write().await.remove(url).is_some())
    }

    async fn toggle_notify(&self, url: &str) -> StorageResult<Option<bool>> {
        let mut targets = self.targets.write().await;
        Ok(targets.get_mut(url).map(|target| {
            target.notify_on_down = !target.notify_on_down;
            target.notify_on_down
        }))
    }

    async fn attach_server(&self, url: &str, profile: ServerProfile) -> StorageResult<()> {
        let mut targets = self.targets.write().await;
        let target = targets
            .get_mut(url)
            .ok_or_else(|| StorageError::NotFound(url.to_string()))?;
        target.server = Some(profile);
        Ok(())
    }

    async fn detach_server(&self, url: &str) -> StorageResult<bool> {
        let mut targets = self.targets.write().await;
        Ok(targets
            .get_mut(url)
            .is_some_and(|target| target.server.take().is_some()))
    }
}
