//! Automatic reconnection around a rebuildable stack.
//!
//! The layer owns a factory that builds the whole stack below it (session,
//! prompt handling, queue, timeout, keepalive). Any command failure retires
//! the stack it ran on and schedules a rebuild after a quiet period; callers
//! arriving meanwhile wait for the new stack.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_core::future::BoxFuture;
use log::{debug, info, warn};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::{Error, Result};

/// Builds a fresh lower stack. Called once per connection attempt.
pub type CliFactory = Arc<dyn Fn() -> BoxFuture<'static, Result<Arc<dyn Cli>>> + Send + Sync>;

#[derive(Default)]
struct State {
    current: Option<Arc<dyn Cli>>,
    reconnecting: bool,
    shut_down: bool,
}

struct Shared {
    id: String,
    factory: CliFactory,
    quiet_period: Duration,
    state: Mutex<State>,
    /// Bumped on every state transition.
    changed: watch::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn notify(&self) {
        self.changed.send_replace(());
    }

    fn spawn_reconnect(self: &Arc<Self>, retired: Option<Arc<dyn Cli>>, wait_first: bool) {
        let task = tokio::spawn(reconnect(self.clone(), retired, wait_first));
        let previous = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        // Only one reconnect runs at a time; a previous handle is finished.
        drop(previous);
    }

    /// Resolves once `destroy()` has been called.
    async fn shut_down(&self) {
        let mut changes = self.changed.subscribe();
        loop {
            if self.state().shut_down {
                return;
            }
            if changes.changed().await.is_err() {
                return;
            }
        }
    }
}

async fn reconnect(shared: Arc<Shared>, retired: Option<Arc<dyn Cli>>, mut wait_first: bool) {
    if let Some(stack) = retired {
        if let Err(e) = stack.destroy().await {
            debug!("[{}] tearing down failed stack: {}", shared.id, e);
        }
    }

    loop {
        if wait_first {
            tokio::select! {
                _ = tokio::time::sleep(shared.quiet_period) => {}
                _ = shared.shut_down() => return,
            }
        }
        wait_first = true;

        if shared.state().shut_down {
            return;
        }

        debug!("[{}] connecting", shared.id);
        let built = tokio::select! {
            built = (shared.factory)() => built,
            _ = shared.shut_down() => {
                debug!("[{}] shut down while connecting, abandoning attempt", shared.id);
                return;
            }
        };
        match built {
            Ok(stack) => {
                let orphan = {
                    let mut state = shared.state();
                    if state.shut_down {
                        Some(stack)
                    } else {
                        state.current = Some(stack);
                        state.reconnecting = false;
                        None
                    }
                };
                shared.notify();

                match orphan {
                    Some(stack) => {
                        debug!("[{}] connected after shutdown, discarding stack", shared.id);
                        let _ = stack.destroy().await;
                    }
                    None => info!("[{}] connected", shared.id),
                }
                return;
            }
            Err(e) => warn!(
                "[{}] connect failed: {}; retrying in {:?}",
                shared.id, e, shared.quiet_period
            ),
        }
    }
}

/// Rebuilds the lower stack whenever a command on it fails.
///
/// The caller of the failing command gets the original error; later
/// callers wait until the rebuilt stack is in place. After `destroy()`
/// every call fails as disconnected.
pub struct ReconnectingCli {
    shared: Arc<Shared>,
}

impl ReconnectingCli {
    /// Start connecting immediately in the background.
    pub fn new(id: impl Into<String>, factory: CliFactory, quiet_period: Duration) -> Self {
        let (changed, _) = watch::channel(());
        let shared = Arc::new(Shared {
            id: id.into(),
            factory,
            quiet_period,
            state: Mutex::new(State {
                reconnecting: true,
                ..State::default()
            }),
            changed,
            task: Mutex::new(None),
        });
        shared.spawn_reconnect(None, false);
        Self { shared }
    }

    /// Whether a usable stack is currently in place.
    pub fn is_connected(&self) -> bool {
        self.shared.state().current.is_some()
    }

    pub fn is_reconnecting(&self) -> bool {
        self.shared.state().reconnecting
    }

    /// The current stack, waiting for a connection in progress.
    async fn current(&self) -> Result<Arc<dyn Cli>> {
        let mut changes = self.shared.changed.subscribe();
        loop {
            {
                let state = self.shared.state();
                if state.shut_down {
                    return Err(Error::disconnected());
                }
                if let Some(stack) = &state.current {
                    return Ok(stack.clone());
                }
            }
            changes.changed().await.map_err(|_| Error::disconnected())?;
        }
    }

    /// Retire `failed` if it is still current and schedule a rebuild.
    fn on_failure(&self, failed: &Arc<dyn Cli>, error: &Error) {
        {
            let mut state = self.shared.state();
            let is_current = state
                .current
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, failed));
            if state.shut_down || !is_current {
                return;
            }
            state.reconnecting = true;
            let retired = state.current.take();
            // Spawned under the state lock so destroy() always finds the handle.
            self.shared.spawn_reconnect(retired, true);
        }
        self.shared.notify();

        warn!(
            "[{}] command failed ({}), reconnecting in {:?}",
            self.shared.id, error, self.shared.quiet_period
        );
    }

    async fn run<F, Fut>(&self, call: F) -> Result<String>
    where
        F: FnOnce(Arc<dyn Cli>) -> Fut + Send,
        Fut: Future<Output = Result<String>> + Send,
    {
        let stack = self.current().await?;
        match call(stack.clone()).await {
            Ok(output) => Ok(output),
            Err(e) => {
                self.on_failure(&stack, &e);
                Err(e)
            }
        }
    }
}

#[async_trait]
impl Cli for ReconnectingCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        self.run(|stack| async move { stack.execute_read(cmd).await })
            .await
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.run(|stack| async move { stack.execute_write(cmd).await })
            .await
    }

    async fn destroy(&self) -> Result<()> {
        let current = {
            let mut state = self.shared.state();
            if state.shut_down {
                return Ok(());
            }
            state.shut_down = true;
            state.reconnecting = false;
            state.current.take()
        };
        self.shared.notify();
        debug!("[{}] shutting down", self.shared.id);

        // The task finishes tearing down a retired stack and abandons any
        // connect in progress.
        let task = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!("[{}] reconnect task failed: {}", self.shared.id, e);
            }
        }

        match current {
            Some(stack) => stack.destroy().await,
            None => Ok(()),
        }
    }
}

impl Drop for ReconnectingCli {
    fn drop(&mut self) {
        let shut_down = self.shared.state().shut_down;
        if !shut_down {
            warn!("[{}] reconnecting layer dropped without destroy()", self.shared.id);
        }
        if let Some(task) = self
            .shared
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CommandError, TransportError};
    use crate::testing::EchoCli;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{Instant, sleep};

    /// Records every stack it builds; fails while `fail_until` is ahead.
    struct Builds {
        stacks: Mutex<Vec<Arc<EchoCli>>>,
        attempts: AtomicUsize,
        fail_until: Instant,
        build_delay: Duration,
        fail_on: Option<&'static str>,
        destroy_delay: Duration,
    }

    impl Builds {
        fn new() -> Arc<Self> {
            Self::configured(Duration::ZERO, Duration::ZERO, None)
        }

        fn configured(
            fail_for: Duration,
            build_delay: Duration,
            fail_on: Option<&'static str>,
        ) -> Arc<Self> {
            Self::with_teardown(fail_for, build_delay, fail_on, Duration::ZERO)
        }

        fn with_teardown(
            fail_for: Duration,
            build_delay: Duration,
            fail_on: Option<&'static str>,
            destroy_delay: Duration,
        ) -> Arc<Self> {
            Arc::new(Self {
                stacks: Mutex::new(Vec::new()),
                attempts: AtomicUsize::new(0),
                fail_until: Instant::now() + fail_for,
                build_delay,
                fail_on,
                destroy_delay,
            })
        }

        fn factory(self: &Arc<Self>) -> CliFactory {
            let builds = self.clone();
            Arc::new(move || -> BoxFuture<'static, Result<Arc<dyn Cli>>> {
                let builds = builds.clone();
                Box::pin(async move {
                    builds.attempts.fetch_add(1, Ordering::SeqCst);
                    if !builds.build_delay.is_zero() {
                        sleep(builds.build_delay).await;
                    }
                    if Instant::now() < builds.fail_until {
                        return Err(TransportError::Disconnected.into());
                    }
                    let mut echo = EchoCli::new()
                        .with_delay(Duration::from_millis(10))
                        .with_destroy_delay(builds.destroy_delay);
                    if let Some(text) = builds.fail_on {
                        echo = echo.fail_on(text);
                    }
                    let echo = Arc::new(echo);
                    builds.stacks.lock().unwrap().push(echo.clone());
                    Ok(echo as Arc<dyn Cli>)
                })
            })
        }

        fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        fn stack(&self, index: usize) -> Arc<EchoCli> {
            self.stacks.lock().unwrap()[index].clone()
        }

        fn built(&self) -> usize {
            self.stacks.lock().unwrap().len()
        }
    }

    fn reconnecting(builds: &Arc<Builds>) -> ReconnectingCli {
        ReconnectingCli::new("dev", builds.factory(), Duration::from_secs(2))
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_wait_for_first_connection() {
        let builds = Builds::configured(Duration::ZERO, Duration::from_millis(500), None);
        let cli = reconnecting(&builds);
        assert!(!cli.is_connected());

        let out = cli.execute_read(ReadCommand::create("show version")).await.unwrap();
        assert_eq!(out, "show version");
        assert!(cli.is_connected());
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_factory_failing_for_a_while_then_succeeding() {
        let start = Instant::now();
        let builds = Builds::configured(Duration::from_secs(3), Duration::ZERO, None);
        let cli = reconnecting(&builds);

        let out = cli.execute_read(ReadCommand::create("show ip")).await.unwrap();
        assert_eq!(out, "show ip");
        // Attempts at 0s and 2s fail, the one at 4s succeeds.
        assert_eq!(builds.attempts(), 3);
        assert!(start.elapsed() >= Duration::from_secs(4));
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_returns_original_error_and_rebuilds() {
        let builds = Builds::configured(Duration::ZERO, Duration::ZERO, Some("bad"));
        let cli = reconnecting(&builds);

        let err = cli.execute_read(ReadCommand::create("bad")).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Command(CommandError::ExecutionFailed { .. })
        ));
        assert!(cli.is_reconnecting());

        let out = cli.execute_read(ReadCommand::create("good")).await.unwrap();
        assert_eq!(out, "good");
        assert_eq!(builds.built(), 2);
        assert!(builds.stack(0).is_destroyed());
        assert_eq!(builds.stack(1).reads(), vec!["good"]);
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_failures_rebuild_once() {
        let builds = Builds::configured(Duration::ZERO, Duration::ZERO, Some("bad"));
        let cli = reconnecting(&builds);
        cli.execute_read(ReadCommand::create("warmup")).await.unwrap();

        let (a, b) = tokio::join!(
            cli.execute_read(ReadCommand::create("bad")),
            cli.execute_write(WriteCommand::create("bad")),
        );
        assert!(a.is_err() && b.is_err());

        sleep(Duration::from_secs(10)).await;
        assert_eq!(builds.attempts(), 2);
        assert!(cli.is_connected());
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_fails_later_calls() {
        let builds = Builds::new();
        let cli = reconnecting(&builds);
        cli.execute_read(ReadCommand::create("show")).await.unwrap();

        cli.destroy().await.unwrap();
        assert!(builds.stack(0).is_destroyed());

        let err = cli.execute_read(ReadCommand::create("show")).await.unwrap_err();
        assert!(err.is_disconnected());
        cli.destroy().await.unwrap();
        assert_eq!(builds.stack(0).destroy_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_while_connecting_releases_waiters() {
        let builds = Builds::configured(Duration::ZERO, Duration::from_secs(10), None);
        let cli = Arc::new(reconnecting(&builds));

        let waiter = {
            let cli = cli.clone();
            tokio::spawn(async move { cli.execute_read(ReadCommand::create("show")).await })
        };
        tokio::task::yield_now().await;

        cli.destroy().await.unwrap();
        assert!(waiter.await.unwrap().unwrap_err().is_disconnected());

        // The attempt in progress is abandoned, so no stack ever appears.
        sleep(Duration::from_secs(11)).await;
        assert_eq!(builds.attempts(), 1);
        assert_eq!(builds.built(), 0);
        assert!(!cli.is_connected());
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_waits_for_retired_stack_teardown() {
        let builds = Builds::with_teardown(
            Duration::ZERO,
            Duration::ZERO,
            Some("bad"),
            Duration::from_secs(5),
        );
        let cli = reconnecting(&builds);
        cli.execute_read(ReadCommand::create("warmup")).await.unwrap();

        let err = cli.execute_read(ReadCommand::create("bad")).await.unwrap_err();
        assert!(!err.is_disconnected());
        assert!(!builds.stack(0).is_destroyed());

        let start = Instant::now();
        cli.destroy().await.unwrap();
        assert!(builds.stack(0).is_destroyed());
        assert!(start.elapsed() >= Duration::from_secs(5));
        assert_eq!(builds.built(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_during_quiet_period_stops_retrying() {
        let builds = Builds::configured(Duration::from_secs(3600), Duration::ZERO, None);
        let cli = reconnecting(&builds);

        sleep(Duration::from_secs(1)).await;
        assert_eq!(builds.attempts(), 1);
        cli.destroy().await.unwrap();

        sleep(Duration::from_secs(60)).await;
        assert_eq!(builds.attempts(), 1);
    }
}
