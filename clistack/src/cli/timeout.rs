//! Per-command deadlines.
//!
//! The deadline only changes what the caller observes. The inner call runs
//! in its own task and is left running when the deadline fires, so a device
//! that never answers keeps the queue below busy until its command
//! completes or the stack is destroyed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::{CommandError, Result};

pub struct TimeoutTrackingCli {
    id: String,
    inner: Arc<dyn Cli>,
    timeout: Duration,
}

impl TimeoutTrackingCli {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Cli>, timeout: Duration) -> Self {
        Self {
            id: id.into(),
            inner,
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn race<F>(&self, command: String, call: F) -> Result<String>
    where
        F: Future<Output = Result<String>> + Send + 'static,
    {
        let task = tokio::spawn(call);
        match tokio::time::timeout(self.timeout, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => {
                warn!("[{}] command task for {:?} failed: {}", self.id, command, join_error);
                Err(CommandError::ExecutionFailed {
                    command,
                    message: join_error.to_string(),
                }
                .into())
            }
            Err(_) => {
                debug!("[{}] {:?} timed out after {:?}", self.id, command, self.timeout);
                Err(CommandError::TimedOut {
                    command,
                    timeout: self.timeout,
                }
                .into())
            }
        }
    }
}

#[async_trait]
impl Cli for TimeoutTrackingCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        let inner = self.inner.clone();
        let command = cmd.raw().to_string();
        self.race(command, async move { inner.execute_read(cmd).await })
            .await
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        let inner = self.inner.clone();
        let command = cmd.raw().to_string();
        self.race(command, async move { inner.execute_write(cmd).await })
            .await
    }

    async fn destroy(&self) -> Result<()> {
        self.inner.destroy().await
    }
}
