use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials as SmtpCredentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{error, info, instrument};

use super::Notifier;
use crate::config::Email;

/// Plain-text mail over SMTP with STARTTLS
pub struct EmailNotifier {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
    to: Mailbox,
}

impl EmailNotifier {
    pub fn new(config: &Email) -> Result<Self> {
        let from: Mailbox = config
            .from
            .as_deref()
            .unwrap_or(&config.username)
            .parse()
            .context("invalid sender address")?;
        let to: Mailbox = config.to.parse().context("invalid recipient address")?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_server)
            .with_context(|| format!("invalid SMTP server {}", config.smtp_server))?
            .port(config.smtp_port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));

        if let Some(password) = &config.password {
            builder = builder.credentials(SmtpCredentials::new(
                config.username.clone(),
                password.clone(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from,
            to,
        })
    }

    async fn send(&self, subject: &str, body: &str) -> Result<()> {
        let email = Message::builder()
            .from(self.from.clone())
            .to(self.to.clone())
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .context("failed to build email")?;

        self.mailer
            .send(email)
            .await
            .context("SMTP delivery failed")?;
        Ok(())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    #[instrument(skip(self, body), fields(to = %self.to))]
    async fn notify(&self, subject: &str, body: &str) -> bool {
        match self.send(subject, body).await {
            Ok(()) => {
                info!("Successfully sent email notification");
                true
            }
            Err(e) => {
                error!("Failed to send email notification: {e:#}");
                false
            }
        }
    }
}
