//! CPU utilization strategies
//!
//! Hosts differ in what they have installed, so CPU load is measured by an
//! ordered chain of strategies. The first one producing a finite number wins:
//!
//! 1. [`Mpstat`] - `100 - idle%` from sysstat's `mpstat`, installed on demand
//! 2. [`ProcStat`] - two samples of the aggregate `cpu` line in `/proc/stat`
//! 3. [`Top`] - `us + sy + ni` from the second iteration of `top`

use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use regex::Regex;
use tracing::{debug, trace};

use super::shell::ShellSession;

#[async_trait]
pub trait CpuStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// Raw utilization in percent. May lie outside `[0, 100]`.
    async fn measure(&self, session: &dyn ShellSession) -> Result<f64>;
}

pub fn default_chain() -> Vec<Box<dyn CpuStrategy>> {
    vec![
        Box::new(Mpstat),
        Box::new(ProcStat::new(Duration::from_secs(1))),
        Box::new(Top),
    ]
}

/// Walks the chain and returns the first usable reading, clamped into `[0, 100]`.
pub async fn measure_cpu(
    chain: &[Box<dyn CpuStrategy>],
    session: &dyn ShellSession,
) -> Option<f64> {
    for strategy in chain {
        match strategy.measure(session).await {
            Ok(usage) if usage.is_finite() => {
                trace!("CPU usage from {}: {usage}%", strategy.name());
                return Some(clamp_percentage(usage));
            }
            Ok(usage) => debug!("{} produced unusable value {usage}", strategy.name()),
            Err(e) => debug!("{} method failed: {e:#}", strategy.name()),
        }
    }
    None
}

pub fn clamp_percentage(value: f64) -> f64 {
    value.clamp(0.0, 100.0)
}

const INSTALL_SYSSTAT: &str = "command -v mpstat || (apt-get update && apt-get install -y sysstat) || (yum install -y sysstat) || (apk add --no-cache sysstat)";

pub struct Mpstat;

#[async_trait]
impl CpuStrategy for Mpstat {
    fn name(&self) -> &'static str {
        "mpstat"
    }

    async fn measure(&self, session: &dyn ShellSession) -> Result<f64> {
        // best effort, the measurement below tells whether it worked
        if let Err(e) = session.exec(INSTALL_SYSSTAT).await {
            debug!("sysstat presence check failed: {e:#}");
        }

        let output = session.exec("mpstat 1 1 | tail -1").await?.into_stdout()?;
        parse_mpstat(&output)
    }
}

/// Last column of mpstat's summary line is `%idle`.
pub fn parse_mpstat(output: &str) -> Result<f64> {
    let idle = output
        .split_whitespace()
        .last()
        .ok_or_else(|| anyhow!("empty mpstat output"))?;
    let idle: f64 = idle
        .parse()
        .with_context(|| format!("unexpected mpstat idle value `{idle}`"))?;
    Ok(100.0 - idle)
}

pub struct ProcStat {
    sample_interval: Duration,
}

impl ProcStat {
    pub fn new(sample_interval: Duration) -> Self {
        Self { sample_interval }
    }
}

#[async_trait]
impl CpuStrategy for ProcStat {
    fn name(&self) -> &'static str {
        "/proc/stat"
    }

    async fn measure(&self, session: &dyn ShellSession) -> Result<f64> {
        const CMD: &str = "grep '^cpu ' /proc/stat";

        let first = parse_proc_stat(&session.exec(CMD).await?.into_stdout()?)?;
        tokio::time::sleep(self.sample_interval).await;
        let second = parse_proc_stat(&session.exec(CMD).await?.into_stdout()?)?;

        second.usage_since(&first)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CpuTimes {
    pub idle: f64,
    pub total: f64,
}

impl CpuTimes {
    pub fn usage_since(&self, earlier: &CpuTimes) -> Result<f64> {
        let idle = self.idle - earlier.idle;
        let total = self.total - earlier.total;
        if total <= 0.0 {
            bail!("CPU counters did not advance");
        }
        Ok(100.0 * (1.0 - idle / total))
    }
}

/// Parses the aggregate `cpu` line; idle counts `idle` and `iowait`.
pub fn parse_proc_stat(line: &str) -> Result<CpuTimes> {
    let mut fields = line.split_whitespace();
    if fields.next() != Some("cpu") {
        bail!("not an aggregate cpu line: `{}`", line.trim());
    }

    let values = fields
        .map(|field| field.parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .context("malformed /proc/stat counter")?;

    if values.len() < 5 {
        bail!("expected at least 5 counters, got {}", values.len());
    }

    Ok(CpuTimes {
        idle: values[3] + values[4],
        total: values.iter().sum(),
    })
}

pub struct Top;

#[async_trait]
impl CpuStrategy for Top {
    fn name(&self) -> &'static str {
        "top"
    }

    async fn measure(&self, session: &dyn ShellSession) -> Result<f64> {
        let output = session
            .exec("top -bn2 -d 0.1 | grep '^%Cpu' | tail -1")
            .await?
            .into_stdout()?;
        parse_top(&output)
    }
}

static TOP_CPU: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([\d.]+)\s*us,\s*([\d.]+)\s*sy,\s*([\d.]+)\s*ni").expect("valid regex")
});

pub fn parse_top(output: &str) -> Result<f64> {
    let captures = TOP_CPU
        .captures(output)
        .ok_or_else(|| anyhow!("no %Cpu line in top output"))?;

    let mut usage = 0.0;
    for index in 1..=3 {
        let value: f64 = captures[index]
            .parse()
            .with_context(|| format!("unexpected top value `{}`", &captures[index]))?;
        usage += value;
    }
    Ok(usage)
}
