//! Alert decisions and alert texts
//!
//! ## Cooldown
//!
//! Every alert channel (website down, CPU, RAM, disk) carries its own
//! "last fired" timestamp. The [`AlertGate`] decides whether a channel may fire:
//!
//! ```text
//! condition not met                     → no alert
//! condition met, never fired            → alert
//! condition met, now - last <= cooldown → no alert (suppressed)
//! condition met, now - last >  cooldown → alert
//! ```
//!
//! The gate never mutates anything. Callers move `last_fired` to `now` only once
//! the notification was actually delivered, so a failed delivery is retried on
//! the next evaluation.

use chrono::{DateTime, TimeDelta, Utc};

use crate::Resource;

/// What is being evaluated on one alert channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlertCondition {
    /// Reachability of a target; fires while it is down
    Down { is_up: bool },

    /// A utilization reading; fires at or above the threshold, never while unknown
    Resource { usage: Option<f64>, threshold: f64 },
}

impl AlertCondition {
    pub fn is_triggered(&self) -> bool {
        match *self {
            AlertCondition::Down { is_up } => !is_up,
            AlertCondition::Resource { usage, threshold } => {
                usage.is_some_and(|usage| usage >= threshold)
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlertGate {
    cooldown: TimeDelta,
}

impl AlertGate {
    pub fn new(cooldown: TimeDelta) -> Self {
        Self { cooldown }
    }

    pub fn should_alert(
        &self,
        condition: AlertCondition,
        last_fired: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> bool {
        if !condition.is_triggered() {
            return false;
        }

        match last_fired {
            None => true,
            Some(last) => now - last > self.cooldown,
        }
    }
}

impl Default for AlertGate {
    fn default() -> Self {
        Self::new(TimeDelta::seconds(3600))
    }
}

/// Subject and body of one outgoing alert
#[derive(Debug, Clone, PartialEq)]
pub struct AlertMessage {
    pub subject: String,
    pub body: String,
}

impl AlertMessage {
    pub fn website_down(url: &str, at: DateTime<Utc>) -> Self {
        Self {
            subject: format!("Website Status Alert - {url}"),
            body: format!(
                "Website Status Alert\n\n\
                 URL: {url}\n\
                 Status: DOWN\n\
                 Time: {} UTC\n\n\
                 This is an automated notification from site-sentinel.",
                at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }

    pub fn resource(
        url: &str,
        host: &str,
        resource: Resource,
        usage: f64,
        threshold: f64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            subject: format!("Server {resource} Alert - {host}"),
            body: format!(
                "Server Resource Alert\n\n\
                 Server: {host}\n\
                 Website: {url}\n\
                 {resource} usage: {usage:.1}% (limit: {threshold:.1}%)\n\
                 Time: {} UTC\n\n\
                 This is an automated notification from site-sentinel.",
                at.format("%Y-%m-%d %H:%M:%S")
            ),
        }
    }
}
