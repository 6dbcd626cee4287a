//! Session initializers.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use regex::Regex;
use secrecy::ExposeSecret;

use super::{CliInitializer, InitContext};
use crate::error::{ChannelError, Result};
use crate::session::Session;

const DEFAULT_SETTLE: Duration = Duration::from_millis(500);

/// For devices that need no handshake.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInitializer;

#[async_trait]
impl CliInitializer for NoopInitializer {
    async fn initialize(&self, _session: &dyn Session, _ctx: InitContext<'_>) -> Result<()> {
        Ok(())
    }
}

/// Sends a fixed list of commands, draining whatever each one prints.
#[derive(Debug, Clone)]
pub struct CommandsInitializer {
    commands: Vec<String>,
    settle: Duration,
}

impl CommandsInitializer {
    pub fn new<I, S>(commands: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            commands: commands.into_iter().map(Into::into).collect(),
            settle: DEFAULT_SETTLE,
        }
    }

    /// How long to collect output after each command.
    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    pub fn commands(&self) -> &[String] {
        &self.commands
    }
}

#[async_trait]
impl CliInitializer for CommandsInitializer {
    async fn initialize(&self, session: &dyn Session, ctx: InitContext<'_>) -> Result<()> {
        for command in &self.commands {
            debug!("[{}] init: {}", ctx.id, command);
            session.write(&format!("{command}\n")).await?;
            session.read(self.settle).await?;
        }
        Ok(())
    }
}

/// EdgeSwitch style handshake: `enable` (answering the password prompt if
/// one appears) and turn off paging.
#[derive(Debug, Clone)]
pub struct UbiquitiInitializer {
    settle: Duration,
}

static PASSWORD_PROMPT: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"(?i)password:\s*$"));

impl UbiquitiInitializer {
    pub fn new() -> Self {
        Self {
            settle: DEFAULT_SETTLE,
        }
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

impl Default for UbiquitiInitializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CliInitializer for UbiquitiInitializer {
    async fn initialize(&self, session: &dyn Session, ctx: InitContext<'_>) -> Result<()> {
        let password_prompt = PASSWORD_PROMPT
            .as_ref()
            .map_err(|e| ChannelError::InitializationFailed(e.to_string()))?;

        session.write("enable\n").await?;
        let output = session.read(self.settle).await?;

        if password_prompt.is_match(output.trim_end_matches(['\r', '\n'])) {
            match ctx.password {
                Some(password) => {
                    debug!("[{}] init: answering enable password prompt", ctx.id);
                    session
                        .write(&format!("{}\n", password.expose_secret()))
                        .await?;
                    session.read(self.settle).await?;
                }
                None => {
                    warn!("[{}] enable asked for a password but none is configured", ctx.id);
                    return Err(ChannelError::InitializationFailed(
                        "enable password required".to_string(),
                    )
                    .into());
                }
            }
        }

        session.write("terminal length 0\n").await?;
        session.read(self.settle).await?;
        Ok(())
    }
}
