pub mod alerts;
pub mod config;
pub mod discord;
pub mod metrics;
pub mod monitors;
pub mod notify;
pub mod probe;
pub mod storage;
pub mod util;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A monitored HTTP endpoint, identified by its URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub url: String,
    pub is_up: bool,
    pub last_checked: DateTime<Utc>,
    pub notify_on_down: bool,
    /// Last time a down alert was delivered for this target
    pub last_notification_sent: Option<DateTime<Utc>>,
    pub server: Option<ServerProfile>,
}

impl Target {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            is_up: false,
            last_checked: Utc::now(),
            notify_on_down: false,
            last_notification_sent: None,
            server: None,
        }
    }

    pub fn with_server(mut self, server: ServerProfile) -> Self {
        self.server = Some(server);
        self
    }

    pub fn notify_on_down(mut self, enabled: bool) -> Self {
        self.notify_on_down = enabled;
        self
    }
}

/// The machine behind a target, reachable over SSH.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerProfile {
    pub host: String,
    #[serde(default = "crate::util::get_default_ssh_port")]
    pub port: u16,
    pub credentials: Credentials,
    pub cpu_usage: Option<f64>,
    pub ram_usage: Option<f64>,
    pub disk_usage: Option<f64>,
    pub last_checked: Option<DateTime<Utc>>,
    pub last_cpu_alert: Option<DateTime<Utc>>,
    pub last_ram_alert: Option<DateTime<Utc>>,
    pub last_disk_alert: Option<DateTime<Utc>>,
}

impl ServerProfile {
    pub fn new(host: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port: util::get_default_ssh_port(),
            credentials,
            cpu_usage: None,
            ram_usage: None,
            disk_usage: None,
            last_checked: None,
            last_cpu_alert: None,
            last_ram_alert: None,
            last_disk_alert: None,
        }
    }

    /// Records a fresh collection. Unknown readings keep the previous value.
    pub fn record(&mut self, snapshot: &ResourceSnapshot, now: DateTime<Utc>) {
        if snapshot.is_unknown() {
            return;
        }

        if let Some(cpu) = snapshot.cpu {
            self.cpu_usage = Some(cpu);
        }
        if let Some(ram) = snapshot.ram {
            self.ram_usage = Some(ram);
        }
        if let Some(disk) = snapshot.disk {
            self.disk_usage = Some(disk);
        }
        self.last_checked = Some(now);
    }

    pub fn last_alert(&self, resource: Resource) -> Option<DateTime<Utc>> {
        match resource {
            Resource::Cpu => self.last_cpu_alert,
            Resource::Ram => self.last_ram_alert,
            Resource::Disk => self.last_disk_alert,
        }
    }

    pub fn set_last_alert(&mut self, resource: Resource, at: DateTime<Utc>) {
        match resource {
            Resource::Cpu => self.last_cpu_alert = Some(at),
            Resource::Ram => self.last_ram_alert = Some(at),
            Resource::Disk => self.last_disk_alert = Some(at),
        }
    }
}

/// SSH login for a server profile. A key file wins over a password.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: Option<String>,
    pub key_path: Option<String>,
}

impl Credentials {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: Some(password.into()),
            key_path: None,
        }
    }

    pub fn key_file(username: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: None,
            key_path: Some(key_path.into()),
        }
    }

    /// Whether there is anything to authenticate with at all.
    pub fn is_usable(&self) -> bool {
        !self.username.is_empty() && (self.password.is_some() || self.key_path.is_some())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    Cpu,
    Ram,
    Disk,
}

impl Resource {
    pub const ALL: [Resource; 3] = [Resource::Cpu, Resource::Ram, Resource::Disk];

    pub fn label(&self) -> &'static str {
        match self {
            Resource::Cpu => "CPU",
            Resource::Ram => "RAM",
            Resource::Disk => "Disk",
        }
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Utilization percentages from a single collection; `None` means unknown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    pub cpu: Option<f64>,
    pub ram: Option<f64>,
    pub disk: Option<f64>,
}

impl ResourceSnapshot {
    pub fn unknown() -> Self {
        Self::default()
    }

    pub fn get(&self, resource: Resource) -> Option<f64> {
        match resource {
            Resource::Cpu => self.cpu,
            Resource::Ram => self.ram,
            Resource::Disk => self.disk,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.cpu.is_none() && self.ram.is_none() && self.disk.is_none()
    }
}
