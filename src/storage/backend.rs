//! Storage trait for monitored targets

use async_trait::async_trait;

use super::error::StorageResult;
use crate::{ServerProfile, Target};

/// Durable home of targets and their server profiles
///
/// The monitor cycle only uses `list_targets` and `commit`; the remaining
/// operations back the operator CLI.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync`; the scheduler task holds the store
/// for its whole lifetime.
#[async_trait]
pub trait TargetStore: Send + Sync {
    /// All targets, each with its server profile if one is attached
    async fn list_targets(&self) -> StorageResult<Vec<Target>>;

    async fn get_target(&self, url: &str) -> StorageResult<Option<Target>>;

    /// Writes back observed state of the given targets in one transaction
    ///
    /// Only state owned by the monitor is written (status, timestamps, readings,
    /// cooldowns). Targets removed in the meantime are skipped.
    async fn commit(&self, targets: &[Target]) -> StorageResult<()>;

    /// Adds a target. Adding an existing URL is a no-op.
    async fn add_target(&self, url: &str) -> StorageResult<()>;

    /// Removes a target and its profile. Returns whether it existed.
    async fn remove_target(&self, url: &str) -> StorageResult<bool>;

    /// Flips `notify_on_down`. Returns the new value, `None` for unknown URLs.
    async fn toggle_notify(&self, url: &str) -> StorageResult<Option<bool>>;

    /// Attaches or replaces the server profile of a target
    async fn attach_server(&self, url: &str, profile: ServerProfile) -> StorageResult<()>;

    /// Drops the server profile of a target. Returns whether there was one.
    async fn detach_server(&self, url: &str) -> StorageResult<bool>;
}
