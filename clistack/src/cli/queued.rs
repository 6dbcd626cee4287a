//! Serialisation of concurrent callers onto one inner CLI.
//!
//! Callers push jobs onto an unbounded channel; a single consumer task
//! executes them one at a time against the inner layer. Each job carries a
//! oneshot sender, so a result is delivered exactly once and a caller that
//! gave up simply leaves it undelivered.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::Cli;
use crate::command::{Command, ReadCommand, WriteCommand};
use crate::error::{Error, Result};

/// How long `destroy()` waits for queued work before forcing the inner
/// layer down.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

enum Job {
    /// Steps run in order; outputs concatenated; first failure ends the job.
    Run {
        steps: Vec<Command>,
        reply: oneshot::Sender<Result<String>>,
    },
    /// Completes once every job queued before it has completed.
    Barrier(oneshot::Sender<()>),
}

/// FIFO queue with exactly one command in flight.
pub struct QueuedCli {
    id: String,
    inner: Arc<dyn Cli>,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
    drain_timeout: Duration,
}

impl QueuedCli {
    /// Create the queue and start its consumer on the current runtime.
    pub fn new(id: impl Into<String>, inner: Arc<dyn Cli>) -> Self {
        let id = id.into();
        let (sender, receiver) = mpsc::unbounded_channel();
        let consumer = tokio::spawn(consume(id.clone(), inner.clone(), receiver));

        Self {
            id,
            inner,
            sender: Mutex::new(Some(sender)),
            consumer: Mutex::new(Some(consumer)),
            destroyed: AtomicBool::new(false),
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    async fn enqueue(&self, steps: Vec<Command>) -> Result<String> {
        let (reply, result) = oneshot::channel();
        {
            let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
            let sender = sender.as_ref().ok_or_else(Error::disconnected)?;
            sender
                .send(Job::Run { steps, reply })
                .map_err(|_| Error::disconnected())?;
        }
        // A dropped reply means the consumer is gone.
        result.await.unwrap_or_else(|_| Err(Error::disconnected()))
    }

    fn take_consumer(&self) -> Option<JoinHandle<()>> {
        self.consumer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn consume(id: String, inner: Arc<dyn Cli>, mut receiver: mpsc::UnboundedReceiver<Job>) {
    while let Some(job) = receiver.recv().await {
        match job {
            Job::Run { steps, reply } => {
                let result = run_steps(inner.as_ref(), steps).await;
                if reply.send(result).is_err() {
                    trace!("[{}] caller went away before its result arrived", id);
                }
            }
            Job::Barrier(done) => {
                let _ = done.send(());
            }
        }
    }
    trace!("[{}] queue consumer finished", id);
}

async fn run_steps(inner: &dyn Cli, steps: Vec<Command>) -> Result<String> {
    let mut output = String::new();
    for step in steps {
        output.push_str(&inner.execute(step).await?);
    }
    Ok(output)
}

#[async_trait]
impl Cli for QueuedCli {
    /// Multi-line reads are split and queued as a single job, so no other
    /// caller's command runs between their steps.
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        self.enqueue(Command::split_multiline(&cmd)).await
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.enqueue(vec![Command::Write(cmd)]).await
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        debug!("[{}] draining queue", self.id);

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let mut forced = None;
        if let Some(sender) = sender {
            let (done, drained) = oneshot::channel();
            let barrier_sent = sender.send(Job::Barrier(done)).is_ok();
            drop(sender);

            if barrier_sent && tokio::time::timeout(self.drain_timeout, drained).await.is_err() {
                warn!(
                    "[{}] queue not drained after {:?}, forcing inner layer down",
                    self.id, self.drain_timeout
                );
                let result = self.inner.destroy().await;
                if let Err(e) = &result {
                    warn!("[{}] forced teardown failed: {}", self.id, e);
                }
                forced = Some(result);
            }
        }

        // The consumer is always reaped, even when the forced teardown failed.
        if let Some(consumer) = self.take_consumer() {
            let _ = consumer.await;
        }

        match forced {
            Some(result) => result,
            None => self.inner.destroy().await,
        }
    }
}

impl Drop for QueuedCli {
    fn drop(&mut self) {
        if let Some(consumer) = self.take_consumer() {
            if !self.destroyed.load(Ordering::Acquire) {
                warn!("[{}] queue dropped without destroy()", self.id);
            }
            consumer.abort();
        }
    }
}
