//! Fakes shared by the unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::cli::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::{ChannelError, CommandError, Error, Result};
use crate::session::Session;

/// A `Cli` that answers every command with its own text.
#[derive(Default)]
pub struct EchoCli {
    delay: Duration,
    delays: HashMap<String, Duration>,
    fail_on: HashSet<String>,
    reads: Mutex<Vec<String>>,
    writes: Mutex<Vec<String>>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    destroyed: AtomicBool,
    destroy_calls: AtomicUsize,
    destroy_delay: Duration,
    fail_destroy: bool,
}

impl EchoCli {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every command.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Delay one command text.
    pub fn with_delay_for(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail one command text with an execution failure.
    pub fn fail_on(mut self, text: &str) -> Self {
        self.fail_on.insert(text.to_string());
        self
    }

    /// Take `delay` to tear down.
    pub fn with_destroy_delay(mut self, delay: Duration) -> Self {
        self.destroy_delay = delay;
        self
    }

    /// Report an error from `destroy()` after marking itself destroyed.
    pub fn failing_destroy(mut self) -> Self {
        self.fail_destroy = true;
        self
    }

    pub fn reads(&self) -> Vec<String> {
        self.reads.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().unwrap().clone()
    }

    /// Command texts in completion order.
    pub fn completed(&self) -> Vec<String> {
        self.completed.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.reads.lock().unwrap().len() + self.writes.lock().unwrap().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::SeqCst)
    }

    pub fn destroy_calls(&self) -> usize {
        self.destroy_calls.load(Ordering::SeqCst)
    }

    async fn run(&self, text: &str) -> Result<String> {
        if self.is_destroyed() {
            return Err(Error::disconnected());
        }

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let delay = self.delays.get(text).copied().unwrap_or(self.delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.lock().unwrap().push(text.to_string());

        if self.fail_on.contains(text) {
            return Err(CommandError::ExecutionFailed {
                command: text.to_string(),
                message: "injected failure".to_string(),
            }
            .into());
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Cli for EchoCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        self.reads.lock().unwrap().push(cmd.raw().to_string());
        self.run(cmd.raw()).await
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.writes.lock().unwrap().push(cmd.raw().to_string());
        self.run(cmd.raw()).await
    }

    async fn destroy(&self) -> Result<()> {
        self.destroy_calls.fetch_add(1, Ordering::SeqCst);
        if !self.destroy_delay.is_zero() {
            tokio::time::sleep(self.destroy_delay).await;
        }
        self.destroyed.store(true, Ordering::SeqCst);
        if self.fail_destroy {
            return Err(ChannelError::Closed.into());
        }
        Ok(())
    }
}

#[derive(Default)]
struct DeviceState {
    output: String,
    line: String,
    writes: Vec<String>,
    probe_results: VecDeque<String>,
    read_timeouts: Vec<Duration>,
    closed: bool,
    close_calls: usize,
}

/// A `Session` simulating a line-oriented device shell.
///
/// Typed characters are echoed; a newline prints `\r\n`, the configured
/// response for the completed line (if any) and the prompt. A marker that
/// is not in the pending output fails the read, since nothing else will
/// ever arrive.
pub struct FakeDevice {
    prompt: String,
    responses: HashMap<String, String>,
    state: Mutex<DeviceState>,
}

impl FakeDevice {
    pub fn new(prompt: &str) -> Self {
        Self {
            prompt: prompt.to_string(),
            responses: HashMap::new(),
            state: Mutex::new(DeviceState::default()),
        }
    }

    /// Output printed when `command` is entered.
    pub fn with_response(mut self, command: &str, output: &str) -> Self {
        self.responses
            .insert(command.to_string(), output.to_string());
        self
    }

    /// Canned results for successive `read()` calls, replacing the
    /// simulated output while any remain.
    pub fn with_probe_results<I, S>(self, results: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.state
            .lock()
            .unwrap()
            .probe_results
            .extend(results.into_iter().map(Into::into));
        self
    }

    pub fn writes(&self) -> Vec<String> {
        self.state.lock().unwrap().writes.clone()
    }

    pub fn read_timeouts(&self) -> Vec<Duration> {
        self.state.lock().unwrap().read_timeouts.clone()
    }

    pub fn close_calls(&self) -> usize {
        self.state.lock().unwrap().close_calls
    }

    /// Simulate the device dropping the connection.
    pub fn hang_up(&self) {
        self.state.lock().unwrap().closed = true;
    }
}

#[async_trait]
impl Session for FakeDevice {
    async fn write(&self, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ChannelError::Closed.into());
        }
        state.writes.push(text.to_string());

        for ch in text.chars() {
            if ch == '\n' {
                let line = std::mem::take(&mut state.line);
                state.output.push_str("\r\n");
                if let Some(response) = self.responses.get(&line) {
                    state.output.push_str(response);
                    state.output.push_str("\r\n");
                }
                state.output.push_str(&self.prompt);
            } else {
                state.output.push(ch);
                state.line.push(ch);
            }
        }
        Ok(())
    }

    async fn read(&self, timeout: Duration) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ChannelError::Closed.into());
        }
        state.read_timeouts.push(timeout);
        match state.probe_results.pop_front() {
            Some(result) => {
                state.output.clear();
                Ok(result)
            }
            None => Ok(std::mem::take(&mut state.output)),
        }
    }

    async fn read_until_output(&self, marker: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        if state.closed {
            return Err(ChannelError::Closed.into());
        }
        match state.output.find(marker) {
            Some(pos) => {
                let head = state.output[..pos].to_string();
                state.output.drain(..pos + marker.len());
                Ok(head)
            }
            None => Err(ChannelError::Closed.into()),
        }
    }

    async fn clear_buffer(&self) -> Result<()> {
        self.state.lock().unwrap().output.clear();
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.close_calls += 1;
        Ok(())
    }

    fn is_open(&self) -> bool {
        !self.state.lock().unwrap().closed
    }
}
