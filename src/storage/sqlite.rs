//! SQLite storage backend implementation
//!
//! ## Features
//!
//! - **Embedded**: No separate database server required
//! - **WAL mode**: Readers (the CLI) do not block the monitor's commits
//! - **Migrations**: Automatic schema versioning with sqlx
//! - **One transaction per commit**: a cycle's writes land together or not at all

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::TargetStore;
use super::error::{StorageError, StorageResult};
use super::schema::{SELECT_TARGETS, target_from_row, timestamp_to_millis};
use crate::{ServerProfile, Target};

pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Opens (and creates if missing) the database and runs migrations
    ///
    /// ```no_run
    /// # use site_sentinel::storage::sqlite::SqliteStore;
    /// # async fn example() -> anyhow::Result<()> {
    /// let store = SqliteStore::new("./targets.db").await?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> StorageResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite store at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;

        debug!("running database migrations");
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("database migrations complete");

        Ok(Self { pool })
    }

    pub async fn close(&self) {
        info!("closing SQLite store");
        self.pool.close().await;
    }

    async fn target_exists(&self, url: &str) -> StorageResult<bool> {
        let row = sqlx::query("SELECT 1 FROM targets WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl TargetStore for SqliteStore {
    #[instrument(skip(self))]
    async fn list_targets(&self) -> StorageResult<Vec<Target>> {
        let sql = format!("{SELECT_TARGETS} ORDER BY t.url");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        rows.iter().map(target_from_row).collect()
    }

    #[instrument(skip(self))]
    async fn get_target(&self, url: &str) -> StorageResult<Option<Target>> {
        let sql = format!("{SELECT_TARGETS} WHERE t.url = ?");
        let row = sqlx::query(&sql)
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(target_from_row).transpose()
    }

    #[instrument(skip(self, targets), fields(count = targets.len()))]
    async fn commit(&self, targets: &[Target]) -> StorageResult<()> {
        if targets.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;

        for target in targets {
            sqlx::query(
                r#"
                UPDATE targets
                SET is_up = ?, last_checked = ?, last_notification_sent = ?
                WHERE url = ?
                "#,
            )
            .bind(target.is_up)
            .bind(timestamp_to_millis(&target.last_checked))
            .bind(target.last_notification_sent.as_ref().map(timestamp_to_millis))
            .bind(&target.url)
            .execute(&mut *tx)
            .await?;

            let Some(server) = &target.server else {
                continue;
            };

            sqlx::query(
                r#"
                UPDATE server_profiles
                SET cpu_usage = ?, ram_usage = ?, disk_usage = ?, last_checked = ?,
                    last_cpu_alert = ?, last_ram_alert = ?, last_disk_alert = ?
                WHERE target_url = ?
                "#,
            )
            .bind(server.cpu_usage)
            .bind(server.ram_usage)
            .bind(server.disk_usage)
            .bind(server.last_checked.as_ref().map(timestamp_to_millis))
            .bind(server.last_cpu_alert.as_ref().map(timestamp_to_millis))
            .bind(server.last_ram_alert.as_ref().map(timestamp_to_millis))
            .bind(server.last_disk_alert.as_ref().map(timestamp_to_millis))
            .bind(&target.url)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!("commit complete");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_target(&self, url: &str) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO targets (url, is_up, last_checked, notify_on_down)
            VALUES (?, 0, ?, 0)
            ON CONFLICT (url) DO NOTHING
            "#,
        )
        .bind(url)
        .bind(timestamp_to_millis(&Utc::now()))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_target(&self, url: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM targets WHERE url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn toggle_notify(&self, url: &str) -> StorageResult<Option<bool>> {
        let row = sqlx::query(
            "UPDATE targets SET notify_on_down = NOT notify_on_down WHERE url = ? RETURNING notify_on_down",
        )
        .bind(url)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.try_get("notify_on_down"))
            .transpose()
            .map_err(StorageError::from)
    }

    #[instrument(skip(self, profile), fields(host = %profile.host))]
    async fn attach_server(&self, url: &str, profile: ServerProfile) -> StorageResult<()> {
        if !self.target_exists(url).await? {
            return Err(StorageError::NotFound(url.to_string()));
        }

        sqlx::query(
            r#"
            INSERT INTO server_profiles (
                target_url, host, port, username, password, key_path,
                cpu_usage, ram_usage, disk_usage, last_checked,
                last_cpu_alert, last_ram_alert, last_disk_alert
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (target_url) DO UPDATE SET
                host = excluded.host,
                port = excluded.port,
                username = excluded.username,
                password = excluded.password,
                key_path = excluded.key_path,
                cpu_usage = excluded.cpu_usage,
                ram_usage = excluded.ram_usage,
                disk_usage = excluded.disk_usage,
                last_checked = excluded.last_checked,
                last_cpu_alert = excluded.last_cpu_alert,
                last_ram_alert = excluded.last_ram_alert,
                last_disk_alert = excluded.last_disk_alert
            "#,
        )
        .bind(url)
        .bind(&profile.host)
        .bind(i64::from(profile.port))
        .bind(&profile.credentials.username)
        .bind(&profile.credentials.password)
        .bind(&profile.credentials.key_path)
        .bind(profile.cpu_usage)
        .bind(profile.ram_usage)
        .bind(profile.disk_usage)
        .bind(profile.last_checked.as_ref().map(timestamp_to_millis))
        .bind(profile.last_cpu_alert.as_ref().map(timestamp_to_millis))
        .bind(profile.last_ram_alert.as_ref().map(timestamp_to_millis))
        .bind(profile.last_disk_alert.as_ref().map(timestamp_to_millis))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn detach_server(&self, url: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM server_profiles WHERE target_url = ?")
            .bind(url)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
