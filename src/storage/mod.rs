//! Persistence of monitored targets
//!
//! The monitor talks to storage through the `TargetStore` trait:
//!
//! - **SQLite** (default): Embedded database file
//! - **In-Memory**: No persistence, for tests or `"backend": "none"`
//!
//! ## Usage
//!
//! ```no_run
//! use site_sentinel::storage::{TargetStore, sqlite::SqliteStore};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = SqliteStore::new("./targets.db").await?;
//!     store.add_target("https://example.com").await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

use std::sync::Arc;

pub use backend::TargetStore;
pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;

use crate::config::StorageConfig;

/// Opens the store described by the configuration
pub async fn open(config: &StorageConfig) -> StorageResult<Arc<dyn TargetStore>> {
    match config {
        StorageConfig::None => Ok(Arc::new(MemoryStore::new())),
        #[cfg(feature = "storage-sqlite")]
        StorageConfig::Sqlite { path } => Ok(Arc::new(sqlite::SqliteStore::new(path).await?)),
        #[cfg(not(feature = "storage-sqlite"))]
        StorageConfig::Sqlite { .. } => Err(StorageError::Unavailable(
            "built without the storage-sqlite feature".to_string(),
        )),
    }
}
