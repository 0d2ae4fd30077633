//! Remote command execution over SSH
//!
//! The collector only needs "run this command and give me stdout", so the SSH
//! client sits behind two small traits. A session is owned by whoever called
//! [`ShellConnector::connect`] and the connection is closed when it is dropped.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use async_ssh2_tokio::client::{AuthMethod, Client, ServerCheckMethod};
use async_trait::async_trait;
use tracing::{debug, instrument, trace};

use crate::Credentials;
use crate::config::SshConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            exit_status: 0,
        }
    }

    /// stdout of a command that exited with status 0
    pub fn into_stdout(self) -> Result<String> {
        if self.exit_status != 0 {
            bail!("command exited with status {}", self.exit_status);
        }
        Ok(self.stdout)
    }
}

#[async_trait]
pub trait ShellSession: Send + Sync {
    async fn exec(&self, command: &str) -> Result<CommandOutput>;
}

#[async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<Box<dyn ShellSession>>;
}

pub struct SshConnector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl SshConnector {
    pub fn new(config: &SshConfig) -> Self {
        Self {
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            command_timeout: Duration::from_secs(config.command_timeout_secs),
        }
    }
}

#[async_trait]
impl ShellConnector for SshConnector {
    #[instrument(skip(self, credentials), fields(user = %credentials.username))]
    async fn connect(
        &self,
        host: &str,
        port: u16,
        credentials: &Credentials,
    ) -> Result<Box<dyn ShellSession>> {
        let auth = match (&credentials.key_path, &credentials.password) {
            (Some(key_path), _) => AuthMethod::with_key_file(key_path, None),
            (None, Some(password)) => AuthMethod::with_password(password),
            (None, None) => bail!("no password or key file configured"),
        };

        debug!("connecting to {host}:{port}");

        // host keys are not pinned; targets are added by the operator
        let client = tokio::time::timeout(
            self.connect_timeout,
            Client::connect(
                (host, port),
                &credentials.username,
                auth,
                ServerCheckMethod::NoCheck,
            ),
        )
        .await
        .context("SSH connect timed out")?
        .context("SSH connect failed")?;

        Ok(Box::new(SshSession {
            client,
            command_timeout: self.command_timeout,
        }))
    }
}

struct SshSession {
    client: Client,
    command_timeout: Duration,
}

#[async_trait]
impl ShellSession for SshSession {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        trace!("running `{command}`");

        let result = tokio::time::timeout(self.command_timeout, self.client.execute(command))
            .await
            .with_context(|| format!("`{command}` timed out"))?
            .with_context(|| format!("failed to run `{command}`"))?;

        Ok(CommandOutput {
            stdout: result.stdout,
            exit_status: result.exit_status,
        })
    }
}
