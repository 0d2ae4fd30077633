//! Remote resource collection
//!
//! One SSH session per collection. CPU, RAM and disk are measured
//! independently: a failing measurement only turns its own reading unknown,
//! and a failed connection turns all three unknown. Nothing here returns an
//! error to the caller.

pub mod cpu;
pub mod shell;

use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use tracing::{debug, error, info, instrument};

use crate::config::{SshConfig, TestModeConfig};
use crate::{Credentials, ResourceSnapshot, ServerProfile};

use cpu::{CpuStrategy, measure_cpu};
use shell::{ShellConnector, ShellSession, SshConnector};

pub struct MetricCollector {
    connector: Arc<dyn ShellConnector>,
    cpu_chain: Vec<Box<dyn CpuStrategy>>,

    /// Fixed readings that replace any network access
    test_mode: Option<TestModeConfig>,
}

impl MetricCollector {
    pub fn new(connector: Arc<dyn ShellConnector>) -> Self {
        Self {
            connector,
            cpu_chain: cpu::default_chain(),
            test_mode: None,
        }
    }

    pub fn ssh(config: &SshConfig) -> Self {
        Self::new(Arc::new(SshConnector::new(config)))
    }

    pub fn with_cpu_chain(mut self, chain: Vec<Box<dyn CpuStrategy>>) -> Self {
        self.cpu_chain = chain;
        self
    }

    pub fn with_test_mode(mut self, test_mode: TestModeConfig) -> Self {
        self.test_mode = test_mode.enabled.then_some(test_mode);
        self
    }

    pub async fn collect_profile(&self, profile: &ServerProfile) -> ResourceSnapshot {
        self.collect(&profile.host, profile.port, &profile.credentials)
            .await
    }

    #[instrument(skip(self, credentials))]
    pub async fn collect(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> ResourceSnapshot {
        if let Some(TestModeConfig { cpu, ram, disk, .. }) = self.test_mode {
            info!("Test mode: CPU={cpu}%, RAM={ram}%, Disk={disk}%");
            return ResourceSnapshot {
                cpu: Some(cpu),
                ram: Some(ram),
                disk: Some(disk),
            };
        }

        let session = match self.connector.connect(host, port, credentials).await {
            Ok(session) => session,
            Err(e) => {
                error!("Error getting metrics from {host}: {e:#}");
                return ResourceSnapshot::unknown();
            }
        };

        let snapshot = self.measure(session.as_ref()).await;
        debug!("collected {snapshot:?}");
        snapshot
    }

    async fn measure(&self, session: &dyn ShellSession) -> ResourceSnapshot {
        let cpu = measure_cpu(&self.cpu_chain, session).await;
        if cpu.is_none() {
            error!("all CPU measurement methods failed");
        }

        let ram = measure_ram(session)
            .await
            .inspect_err(|e| error!("Error getting RAM metrics: {e:#}"))
            .ok();

        let disk = measure_disk(session)
            .await
            .inspect_err(|e| error!("Error getting disk metrics: {e:#}"))
            .ok();

        ResourceSnapshot { cpu, ram, disk }
    }
}

async fn measure_ram(session: &dyn ShellSession) -> Result<f64> {
    let output = session.exec("free").await?.into_stdout()?;
    parse_free(&output)
}

async fn measure_disk(session: &dyn ShellSession) -> Result<f64> {
    let output = session.exec("df -P /").await?.into_stdout()?;
    parse_df(&output)
}

/// `used / total * 100` from the `Mem:` line of `free`.
pub fn parse_free(output: &str) -> Result<f64> {
    let line = output
        .lines()
        .find(|line| line.starts_with("Mem:"))
        .ok_or_else(|| anyhow!("no Mem: line in free output"))?;

    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 3 {
        bail!("truncated Mem: line `{line}`");
    }

    let total: f64 = fields[1].parse().context("malformed total memory")?;
    let used: f64 = fields[2].parse().context("malformed used memory")?;
    if total <= 0.0 {
        bail!("total memory reported as {total}");
    }

    Ok(used / total * 100.0)
}

/// Capacity column of the last line of `df -P /`.
pub fn parse_df(output: &str) -> Result<f64> {
    let line = output
        .lines()
        .rfind(|line| !line.trim().is_empty())
        .ok_or_else(|| anyhow!("empty df output"))?;

    let capacity = line
        .split_whitespace()
        .nth(4)
        .ok_or_else(|| anyhow!("truncated df line `{line}`"))?;

    capacity
        .trim_end_matches('%')
        .parse()
        .with_context(|| format!("unexpected df capacity `{capacity}`"))
}
