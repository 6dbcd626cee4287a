//! The `Cli` capability and its decorator layers.
//!
//! Every layer implements [`Cli`] and owns the next layer down as an
//! `Arc<dyn Cli>`. Stacks are assembled by explicit construction, innermost
//! first:
//!
//! ```text
//! Logging → Reconnecting → Keepalive → Timeout → Queue → ReadCache → PromptAware → Session
//! ```
//!
//! Assembly rules: the queue must sit above the cache and prompt-aware
//! layers, timeout and keepalive above the queue, and reconnecting (if
//! used) outermost below logging.

mod keepalive;
mod logging;
mod prompt_aware;
mod queued;
mod read_cache;
mod reconnecting;
mod timeout;

pub use keepalive::KeepaliveCli;
pub use logging::LoggingCli;
pub use prompt_aware::PromptAwareCli;
pub use queued::QueuedCli;
pub use read_cache::{DEFAULT_CACHE_CAPACITY, ReadCache, ReadCachingCli};
pub use reconnecting::{CliFactory, ReconnectingCli};
pub use timeout::TimeoutTrackingCli;

use async_trait::async_trait;
use log::debug;

use crate::command::{Command, ReadCommand, WriteCommand};
use crate::error::Result;

/// Asynchronous command execution against one device.
#[async_trait]
pub trait Cli: Send + Sync {
    /// Run a command and return its output.
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String>;

    /// Run a command whose only output is its echo.
    async fn execute_write(&self, cmd: WriteCommand) -> Result<String>;

    /// Tear the layer (and everything below it) down.
    ///
    /// Idempotent. Once it returns no background work of the layer touches
    /// the layers below any more; later calls fail with `Disconnected`.
    async fn destroy(&self) -> Result<()>;

    /// Dispatch on the command kind.
    async fn execute(&self, cmd: Command) -> Result<String> {
        match cmd {
            Command::Read(cmd) => self.execute_read(cmd).await,
            Command::Write(cmd) => self.execute_write(cmd).await,
        }
    }
}

/// Run a multi-line read as in-order writes followed by the final read.
///
/// Outputs are concatenated in submission order. Steps are submitted one
/// after another, so without a queue below other callers may interleave;
/// [`QueuedCli::execute_read`] runs the same split as one queue entry.
pub async fn execute_multiline(cli: &dyn Cli, cmd: ReadCommand) -> Result<String> {
    if !cmd.is_multiline() {
        debug!(
            "single-line command {:?} (seq {}) sent through execute_multiline, use execute_read",
            cmd.raw(),
            cmd.sequence_id()
        );
        return cli.execute_read(cmd).await;
    }

    let mut output = String::new();
    for step in Command::split_multiline(&cmd) {
        output.push_str(&cli.execute(step).await?);
    }
    Ok(output)
}
