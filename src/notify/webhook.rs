use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use reqwest::Client;
use serde_json::json;
use tracing::{error, info, instrument};

use super::Notifier;
use crate::config::Webhook;

/// POSTs `{subject, message, timestamp}` as JSON to a URL
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(webhook: &Webhook) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(webhook.timeout_secs))
            .build()
            .context("failed to build webhook HTTP client")?;

        Ok(Self {
            client,
            url: webhook.url.clone(),
        })
    }
}

#[async_trait::async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> &str {
        "webhook"
    }

    #[instrument(skip(self, body))]
    async fn notify(&self, subject: &str, body: &str) -> bool {
        let payload = json!({
            "subject": subject,
            "message": body,
            "timestamp": Utc::now().to_rfc3339()
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) => {
                if response.status().is_success() {
                    info!("Successfully sent webhook alert");
                    true
                } else {
                    error!("Webhook alert failed with status: {}", response.status());
                    false
                }
            }
            Err(e) => {
                error!("Failed to send webhook alert: {}", e);
                false
            }
        }
    }
}
