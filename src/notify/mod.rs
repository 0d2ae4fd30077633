//! Outbound alert delivery
//!
//! A [`Notifier`] reports delivery as a boolean and never errors: the monitor
//! only needs to know whether to advance an alert cooldown.

pub mod email;
pub mod webhook;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{info, warn};

use crate::config::NotifierConfig;
use crate::discord::DiscordNotifier;

pub use email::EmailNotifier;
pub use webhook::WebhookNotifier;

#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    /// Returns whether the message was delivered
    async fn notify(&self, subject: &str, body: &str) -> bool;
}

/// Builds the notifier for the configured transports
pub fn from_config(configs: &[NotifierConfig]) -> Result<Arc<dyn Notifier>> {
    let mut notifiers: Vec<Arc<dyn Notifier>> = Vec::with_capacity(configs.len());
    for config in configs {
        let notifier: Arc<dyn Notifier> = match config {
            NotifierConfig::Email(email) => Arc::new(EmailNotifier::new(email)?),
            NotifierConfig::Webhook(webhook) => Arc::new(WebhookNotifier::new(webhook)?),
            NotifierConfig::Discord(discord) => Arc::new(DiscordNotifier::new(discord)?),
        };
        info!("alerts go to {}", notifier.name());
        notifiers.push(notifier);
    }

    Ok(match notifiers.len() {
        0 => {
            warn!("no notifier configured, alerts will only be logged");
            Arc::new(LogNotifier)
        }
        1 => notifiers.remove(0),
        _ => Arc::new(FanoutNotifier::new(notifiers)),
    })
}

/// Sends to every transport; delivered if at least one delivered.
pub struct FanoutNotifier {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl FanoutNotifier {
    pub fn new(notifiers: Vec<Arc<dyn Notifier>>) -> Self {
        Self { notifiers }
    }
}

#[async_trait]
impl Notifier for FanoutNotifier {
    fn name(&self) -> &str {
        "fanout"
    }

    async fn notify(&self, subject: &str, body: &str) -> bool {
        let results = join_all(
            self.notifiers
                .iter()
                .map(|notifier| notifier.notify(subject, body)),
        )
        .await;

        results.into_iter().any(|delivered| delivered)
    }
}

/// Stand-in when no transport is configured. Nothing is delivered, so
/// cooldowns never start and the alert keeps showing up in the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, subject: &str, body: &str) -> bool {
        warn!("undelivered alert: {subject}\n{body}");
        false
    }
}
