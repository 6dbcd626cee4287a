//! Byte-queue backed shell session.
//!
//! A pump task (the only producer) pushes raw chunks read from the device
//! into a bounded queue. All reads go through one reader lock, so there is
//! exactly one consumer and chunks are seen in arrival order, which the
//! echo/prompt matching depends on.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::Session;
use super::buffer::OutputBuffer;
use crate::error::{ChannelError, Result};

/// Default wake-up interval of `read_until_output` when no data arrives.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

struct ReadState {
    rx: mpsc::Receiver<Bytes>,
    buffer: OutputBuffer,
}

/// A [`Session`] over any writer plus a queue of incoming chunks.
pub struct SessionChannel {
    id: String,
    writer: tokio::sync::Mutex<Option<BoxedWriter>>,
    reader: tokio::sync::Mutex<ReadState>,
    open: AtomicBool,
    pump: Mutex<Option<JoinHandle<()>>>,
    poll_interval: Duration,
}

impl SessionChannel {
    /// Create a session from a writer and the consumer end of the byte queue.
    pub fn new(
        id: impl Into<String>,
        writer: impl AsyncWrite + Send + Unpin + 'static,
        rx: mpsc::Receiver<Bytes>,
    ) -> Self {
        Self {
            id: id.into(),
            writer: tokio::sync::Mutex::new(Some(Box::new(writer))),
            reader: tokio::sync::Mutex::new(ReadState {
                rx,
                buffer: OutputBuffer::new(),
            }),
            open: AtomicBool::new(true),
            pump: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Attach the producer task so that `close()` can stop and await it.
    pub fn with_pump(mut self, pump: JoinHandle<()>) -> Self {
        let slot = match self.pump.get_mut() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(pump);
        self
    }

    /// Set how often a blocked read wakes up to re-check the open flag.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn ensure_open(&self) -> Result<()> {
        if self.open.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ChannelError::Closed.into())
        }
    }

    fn take_pump(&self) -> Option<JoinHandle<()>> {
        match self.pump.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }
}

#[async_trait]
impl Session for SessionChannel {
    async fn write(&self, text: &str) -> Result<()> {
        self.ensure_open()?;
        trace!("[{}] write {:?}", self.id, text);

        let mut writer = self.writer.lock().await;
        let writer = writer.as_mut().ok_or(ChannelError::Closed)?;
        let written = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        }
        .await;

        written.map_err(|e| {
            debug!("[{}] write failed: {}", self.id, e);
            self.open.store(false, Ordering::Release);
            ChannelError::Closed.into()
        })
    }

    async fn read(&self, timeout: Duration) -> Result<String> {
        self.ensure_open()?;
        let mut state = self.reader.lock().await;
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            match tokio::time::timeout_at(deadline, state.rx.recv()).await {
                Ok(Some(chunk)) => state.buffer.extend(&chunk),
                Ok(None) => {
                    self.open.store(false, Ordering::Release);
                    if state.buffer.is_empty() {
                        return Err(ChannelError::Closed.into());
                    }
                    break;
                }
                Err(_) => break,
            }
        }

        let data = state.buffer.take();
        trace!("[{}] read {} bytes", self.id, data.len());
        Ok(String::from_utf8_lossy(&data).into_owned())
    }

    async fn read_until_output(&self, marker: &str) -> Result<String> {
        let mut state = self.reader.lock().await;
        let marker = marker.as_bytes();
        let mut from = 0;

        loop {
            if let Some(head) = state.buffer.split_at_marker(marker, from) {
                return Ok(String::from_utf8_lossy(&head).into_owned());
            }
            from = state.buffer.resume_offset(marker);

            // Checked after every poll so close() is observed promptly.
            self.ensure_open()?;

            match tokio::time::timeout(self.poll_interval, state.rx.recv()).await {
                Ok(Some(chunk)) => {
                    trace!("[{}] received {} bytes", self.id, chunk.len());
                    state.buffer.extend(&chunk);
                }
                Ok(None) => {
                    debug!("[{}] device closed the stream", self.id);
                    self.open.store(false, Ordering::Release);
                    return Err(ChannelError::Closed.into());
                }
                Err(_) => continue,
            }
        }
    }

    async fn clear_buffer(&self) -> Result<()> {
        self.ensure_open()?;
        let mut state = self.reader.lock().await;
        while let Ok(_stale) = state.rx.try_recv() {}
        state.buffer.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        if !self.open.swap(false, Ordering::AcqRel) && self.writer.lock().await.is_none() {
            return Ok(());
        }
        debug!("[{}] closing session", self.id);

        // Wait for any in-flight read to observe the flag and release the
        // reader before stopping the producer.
        let mut state = self.reader.lock().await;

        if let Some(pump) = self.take_pump() {
            pump.abort();
            let _ = pump.await;
        }

        state.rx.close();
        state.buffer.clear();
        drop(state);

        if let Some(mut writer) = self.writer.lock().await.take() {
            let _ = writer.shutdown().await;
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }
}

impl Drop for SessionChannel {
    fn drop(&mut self) {
        if let Some(pump) = self.take_pump() {
            pump.abort();
        }
    }
}
