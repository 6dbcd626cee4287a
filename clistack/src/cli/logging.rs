//! Outermost layer: one log line per command.

use std::sync::Arc;

use async_trait::async_trait;
use log::{debug, warn};

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::Result;

pub struct LoggingCli {
    id: String,
    inner: Arc<dyn Cli>,
}

impl LoggingCli {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Cli>) -> Self {
        Self {
            id: id.into(),
            inner,
        }
    }

    fn finish(&self, kind: &str, sequence_id: u64, text: &str, result: &Result<String>) {
        match result {
            Ok(output) => debug!(
                "[{}] {} #{} {:?} ok ({} bytes)",
                self.id,
                kind,
                sequence_id,
                text,
                output.len()
            ),
            Err(e) => warn!(
                "[{}] {} #{} {:?} failed: {}",
                self.id, kind, sequence_id, text, e
            ),
        }
    }
}

#[async_trait]
impl Cli for LoggingCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        let (sequence_id, text) = (cmd.sequence_id(), cmd.raw().to_string());
        debug!("[{}] read #{} {:?}", self.id, sequence_id, text);
        let result = self.inner.execute_read(cmd).await;
        self.finish("read", sequence_id, &text, &result);
        result
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        let (sequence_id, text) = (cmd.sequence_id(), cmd.raw().to_string());
        debug!("[{}] write #{} {:?}", self.id, sequence_id, text);
        let result = self.inner.execute_write(cmd).await;
        self.finish("write", sequence_id, &text, &result);
        result
    }

    async fn destroy(&self) -> Result<()> {
        debug!("[{}] destroying stack", self.id);
        self.inner.destroy().await
    }
}
