//! Prompt-framed command execution on a raw session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{debug, trace};

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::{Error, Result};
use crate::flavour::{Flavour, InitContext};
use crate::session::Session;

/// Frames each command's output between its echo and the next prompt.
///
/// Not safe for concurrent use: one command at a time must be guaranteed
/// by a [`QueuedCli`](super::QueuedCli) above.
pub struct PromptAwareCli {
    id: String,
    session: Arc<dyn Session>,
    prompt: String,
    destroyed: AtomicBool,
}

impl PromptAwareCli {
    /// Run the flavour's handshake and resolve the prompt.
    pub async fn connect(
        id: impl Into<String>,
        session: Arc<dyn Session>,
        flavour: &Flavour,
        ctx: InitContext<'_>,
    ) -> Result<Self> {
        let id = id.into();
        debug!("[{}] initializing session as '{}'", id, flavour.name);
        flavour.initializer.initialize(session.as_ref(), ctx).await?;
        let prompt = flavour.resolver.resolve_prompt(session.as_ref()).await?;
        debug!("[{}] prompt is {:?}", id, prompt);
        Ok(Self::with_prompt(id, session, prompt))
    }

    /// Wrap a session whose prompt is already known.
    pub fn with_prompt(
        id: impl Into<String>,
        session: Arc<dyn Session>,
        prompt: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            session,
            prompt: prompt.into(),
            destroyed: AtomicBool::new(false),
        }
    }

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.destroyed.load(Ordering::Acquire) {
            Err(Error::disconnected())
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl Cli for PromptAwareCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        self.ensure_alive()?;
        let text = cmd.raw();
        trace!("[{}] read #{} {:?}", self.id, cmd.sequence_id(), text);

        self.session.write(text).await?;
        let mut output = self.session.read_until_output(text).await?;
        self.session.write("\n").await?;
        output.push_str(&self.session.read_until_output(&self.prompt).await?);
        Ok(output)
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.ensure_alive()?;
        let text = cmd.raw();
        trace!("[{}] write #{} {:?}", self.id, cmd.sequence_id(), text);

        // The device echoes "\r\n" for a newline, so match on the bare line.
        let echo = text.trim_end_matches(['\r', '\n']);
        self.session.write(text).await?;
        let mut output = self.session.read_until_output(echo).await?;
        output.push_str(echo);
        Ok(output)
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("[{}] closing session", self.id);
        self.session.close().await
    }
}
