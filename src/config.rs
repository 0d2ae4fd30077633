use std::path::PathBuf;
use std::time::Duration;

use chrono::TimeDelta;
use tracing::trace;

use crate::util;

/// Storage backend configuration
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum StorageConfig {
    /// In-memory storage (no persistence)
    #[serde(rename = "none")]
    None,

    /// SQLite database (default for most deployments)
    Sqlite {
        /// Path to the SQLite database file
        #[serde(default = "default_sqlite_path")]
        path: PathBuf,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Sqlite {
            path: default_sqlite_path(),
        }
    }
}

fn default_sqlite_path() -> PathBuf {
    PathBuf::from("./targets.db")
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct Config {
    #[serde(default)]
    pub monitor: MonitorConfig,

    /// Storage configuration (optional - defaults to SQLite)
    pub storage: Option<StorageConfig>,

    /// Where alerts go. Without any, alerts are only logged.
    #[serde(default)]
    pub notifiers: Vec<NotifierConfig>,

    #[serde(default)]
    pub test_mode: TestModeConfig,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct MonitorConfig {
    /// Pause between the end of one cycle and the start of the next
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_cooldown")]
    pub cooldown_secs: u64,
    #[serde(default = "default_threshold")]
    pub resource_threshold: f64,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub ssh: SshConfig,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval(),
            cooldown_secs: default_cooldown(),
            resource_threshold: default_threshold(),
            probe: ProbeConfig::default(),
            ssh: SshConfig::default(),
        }
    }
}

impl MonitorConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn cooldown(&self) -> TimeDelta {
        TimeDelta::seconds(self.cooldown_secs as i64)
    }
}

fn default_interval() -> u64 {
    60
}

fn default_cooldown() -> u64 {
    3600
}

fn default_threshold() -> f64 {
    90.0
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
    /// Timeout for the retry without certificate validation
    #[serde(default = "default_insecure_timeout")]
    pub insecure_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_probe_timeout(),
            insecure_timeout_secs: default_insecure_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_probe_timeout() -> u64 {
    5
}

fn default_insecure_timeout() -> u64 {
    10
}

fn default_user_agent() -> String {
    String::from(
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    )
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout(),
            command_timeout_secs: default_command_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_command_timeout() -> u64 {
    // installing sysstat on a fresh host takes a while
    120
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifierConfig {
    Email(Email),
    Webhook(Webhook),
    Discord(Discord),
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Email {
    pub smtp_server: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    pub username: String,
    pub password: Option<String>,
    /// Sender address, the SMTP username if absent
    pub from: Option<String>,
    pub to: String,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

fn default_smtp_port() -> u16 {
    587
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Webhook {
    pub url: String,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, serde::Deserialize)]
pub struct Discord {
    pub url: String,
    pub user_id: Option<String>,
    #[serde(default = "default_notify_timeout")]
    pub timeout_secs: u64,
}

/// Upper bound for one delivery attempt
fn default_notify_timeout() -> u64 {
    10
}

/// Fixed readings returned instead of talking to real hosts
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize)]
pub struct TestModeConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub ram: f64,
    #[serde(default)]
    pub disk: f64,
}

impl Config {
    /// Lets the environment switch on test mode and supply SMTP secrets.
    pub fn apply_env(&mut self) {
        if let Some(enabled) = util::get_test_mode() {
            self.test_mode.enabled = enabled;
        }
        if let Some(cpu) = util::get_test_cpu() {
            self.test_mode.cpu = cpu;
        }
        if let Some(ram) = util::get_test_ram() {
            self.test_mode.ram = ram;
        }
        if let Some(disk) = util::get_test_disk() {
            self.test_mode.disk = disk;
        }

        if let Some(password) = util::get_smtp_password() {
            for notifier in &mut self.notifiers {
                if let NotifierConfig::Email(email) = notifier {
                    email.password.get_or_insert_with(|| password.clone());
                }
            }
        }
    }
}

pub fn read_config_file(path: &str) -> anyhow::Result<Config> {
    let file_content = std::fs::read_to_string(path)?;
    parse_config(&file_content).inspect(|config| trace!("loaded config: {config:?}"))
}

pub fn parse_config(content: &str) -> anyhow::Result<Config> {
    serde_json::from_str(content)
        .map_err(|e| anyhow::anyhow!("Invalid configuration file provided: {e}"))
}
