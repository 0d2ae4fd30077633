//! Table layout and row decoding
//!
//! Two tables, see `migrations/`:
//!
//! - `targets`: one row per monitored URL
//! - `server_profiles`: at most one row per target, deleted with it
//!
//! Timestamps are stored as Unix milliseconds (UTC).

use chrono::{DateTime, Utc};

/// Helper to convert a timestamp to Unix milliseconds for SQLite
pub fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Helper to convert Unix milliseconds from SQLite to DateTime
pub fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
}

/// Columns selected for a target joined with its optional profile
pub const SELECT_TARGETS: &str = r#"
    SELECT t.url, t.is_up, t.last_checked, t.notify_on_down, t.last_notification_sent,
           p.host, p.port, p.username, p.password, p.key_path,
           p.cpu_usage, p.ram_usage, p.disk_usage,
           p.last_checked AS server_last_checked,
           p.last_cpu_alert, p.last_ram_alert, p.last_disk_alert
    FROM targets t
    LEFT JOIN server_profiles p ON p.target_url = t.url
"#;

#[cfg(feature = "storage-sqlite")]
pub use sqlite_rows::target_from_row;

#[cfg(feature = "storage-sqlite")]
mod sqlite_rows {
    use sqlx::Row;
    use sqlx::sqlite::SqliteRow;

    use super::millis_to_timestamp;
    use crate::storage::error::{StorageError, StorageResult};
    use crate::{Credentials, ServerProfile, Target};

    fn optional_timestamp(
        row: &SqliteRow,
        column: &str,
    ) -> StorageResult<Option<chrono::DateTime<chrono::Utc>>> {
        let millis: Option<i64> = row.try_get(column)?;
        Ok(millis.map(millis_to_timestamp))
    }

    /// Decodes one row of [`super::SELECT_TARGETS`]
    pub fn target_from_row(row: &SqliteRow) -> StorageResult<Target> {
        let url: String = row.try_get("url")?;

        let host: Option<String> = row.try_get("host")?;
        let server = match host {
            Some(host) => {
                let port: i64 = row.try_get("port")?;
                let port = u16::try_from(port).map_err(|_| {
                    StorageError::InvalidData(format!("port {port} of {url} out of range"))
                })?;

                Some(ServerProfile {
                    host,
                    port,
                    credentials: Credentials {
                        username: row.try_get("username")?,
                        password: row.try_get("password")?,
                        key_path: row.try_get("key_path")?,
                    },
                    cpu_usage: row.try_get("cpu_usage")?,
                    ram_usage: row.try_get("ram_usage")?,
                    disk_usage: row.try_get("disk_usage")?,
                    last_checked: optional_timestamp(row, "server_last_checked")?,
                    last_cpu_alert: optional_timestamp(row, "last_cpu_alert")?,
                    last_ram_alert: optional_timestamp(row, "last_ram_alert")?,
                    last_disk_alert: optional_timestamp(row, "last_disk_alert")?,
                })
            }
            None => None,
        };

        Ok(Target {
            is_up: row.try_get("is_up")?,
            last_checked: millis_to_timestamp(row.try_get("last_checked")?),
            notify_on_down: row.try_get("notify_on_down")?,
            last_notification_sent: optional_timestamp(row, "last_notification_sent")?,
            server,
            url,
        })
    }
}
