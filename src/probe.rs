//! HTTP reachability checks
//!
//! A target counts as reachable when a GET (following redirects) ends in a
//! status in `[200, 400)`. A certificate problem is not downtime: when strict
//! validation fails on the certificate, the request is repeated once without
//! validation and with a longer timeout.

use std::error::Error as _;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, instrument, trace, warn};

use crate::config::ProbeConfig;

/// Something that can tell whether a URL is reachable. Never fails.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, url: &str) -> bool;
}

pub struct HttpProbe {
    /// Validates certificates, short timeout
    strict: reqwest::Client,

    /// Accepts any certificate, longer timeout
    insecure: reqwest::Client,
}

impl HttpProbe {
    pub fn new(config: &ProbeConfig) -> Result<Self> {
        let strict = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .build()
            .context("failed to build HTTP client")?;

        let insecure = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.insecure_timeout_secs))
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(true)
            .build()
            .context("failed to build HTTP client without certificate validation")?;

        Ok(Self { strict, insecure })
    }

    async fn status_of(client: &reqwest::Client, url: &str) -> reqwest::Result<u16> {
        let response = client.get(url).send().await?;
        Ok(response.status().as_u16())
    }
}

#[async_trait]
impl Probe for HttpProbe {
    #[instrument(skip(self))]
    async fn probe(&self, url: &str) -> bool {
        trace!("probing {url}");

        match Self::status_of(&self.strict, url).await {
            Ok(status) => is_reachable_status(status),
            Err(e) if is_certificate_error(&e) => {
                debug!("certificate validation failed, retrying without it: {e}");
                match Self::status_of(&self.insecure, url).await {
                    Ok(status) => is_reachable_status(status),
                    Err(e) => {
                        warn!("probe without certificate validation failed: {e}");
                        false
                    }
                }
            }
            Err(e) => {
                warn!("error checking {url}: {e}");
                false
            }
        }
    }
}

fn is_reachable_status(status: u16) -> bool {
    (200..400).contains(&status)
}

/// reqwest does not expose TLS failures as a kind, so the source chain is searched.
fn is_certificate_error(error: &reqwest::Error) -> bool {
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string().to_lowercase();
        if text.contains("certificate") || text.contains("unknownissuer") {
            return true;
        }
        source = cause.source();
    }
    false
}
