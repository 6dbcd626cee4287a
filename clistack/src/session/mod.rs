//! Session transport: one physical shell on one device.
//!
//! The [`Session`] trait is the seam between the prompt-aware layer and
//! whatever carries the bytes. [`SessionChannel`] implements it on top of a
//! writer and a bounded chunk queue; the SSH transport produces one of
//! those per shell.

mod buffer;
mod channel;

pub use buffer::OutputBuffer;
pub use channel::{DEFAULT_POLL_INTERVAL, SessionChannel};

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

/// Text-level primitives over a single interactive shell.
///
/// Only one command can be in progress on a session at a time; callers
/// serialise access through the queue layer.
#[async_trait]
pub trait Session: Send + Sync {
    /// Send `text` verbatim.
    async fn write(&self, text: &str) -> Result<()>;

    /// Collect whatever arrives within `timeout`. May return an empty
    /// string. Used for prompt probing only.
    async fn read(&self, timeout: Duration) -> Result<String>;

    /// Accumulate output until `marker` appears and return everything
    /// before it. The marker itself is consumed; output after it stays
    /// buffered.
    async fn read_until_output(&self, marker: &str) -> Result<String>;

    /// Discard buffered and queued output.
    async fn clear_buffer(&self) -> Result<()>;

    /// Stop background activity, wait for readers to let go, then release
    /// the connection. Idempotent.
    async fn close(&self) -> Result<()>;

    fn is_open(&self) -> bool;
}
