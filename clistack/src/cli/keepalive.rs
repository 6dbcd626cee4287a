//! Idle-session keepalive.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::Result;

/// Last time a command was submitted or completed, as milliseconds since
/// `base`.
struct Activity {
    base: Instant,
    last_ms: AtomicU64,
}

impl Activity {
    fn new() -> Self {
        Self {
            base: Instant::now(),
            last_ms: AtomicU64::new(0),
        }
    }

    fn touch(&self) {
        let now = self.base.elapsed().as_millis() as u64;
        self.last_ms.fetch_max(now, Ordering::AcqRel);
    }

    fn idle(&self) -> Duration {
        let now = self.base.elapsed().as_millis() as u64;
        Duration::from_millis(now.saturating_sub(self.last_ms.load(Ordering::Acquire)))
    }
}

/// Sends a keepalive command when the session has been idle for a full
/// interval.
///
/// Keepalives go through the inner layer like any other read, so with a
/// queue below they never interleave with real commands. An empty command
/// just sends a newline. A zero interval disables the timer.
pub struct KeepaliveCli {
    id: String,
    inner: Arc<dyn Cli>,
    activity: Arc<Activity>,
    timer: Mutex<Option<JoinHandle<()>>>,
    destroyed: AtomicBool,
}

impl KeepaliveCli {
    pub fn new(
        id: impl Into<String>,
        inner: Arc<dyn Cli>,
        command: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let id = id.into();
        let command = command.into();
        let activity = Arc::new(Activity::new());

        let timer = if interval.is_zero() {
            debug!("[{}] keepalive disabled", id);
            None
        } else {
            Some(tokio::spawn(run_timer(
                id.clone(),
                inner.clone(),
                activity.clone(),
                command,
                interval,
            )))
        };

        Self {
            id,
            inner,
            activity,
            timer: Mutex::new(timer),
            destroyed: AtomicBool::new(false),
        }
    }

    fn take_timer(&self) -> Option<JoinHandle<()>> {
        self.timer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

async fn run_timer(
    id: String,
    inner: Arc<dyn Cli>,
    activity: Arc<Activity>,
    command: String,
    interval: Duration,
) {
    let mut ticks = tokio::time::interval_at(Instant::now() + interval, interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;
        if activity.idle() < interval {
            continue;
        }

        trace!("[{}] idle for {:?}, sending keepalive", id, activity.idle());
        match inner
            .execute_read(ReadCommand::create_skip_cache(command.as_str()))
            .await
        {
            Ok(_) => trace!("[{}] keepalive ok", id),
            Err(e) => warn!("[{}] keepalive {:?} failed: {}", id, command, e),
        }
        activity.touch();
    }
}

#[async_trait]
impl Cli for KeepaliveCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        self.activity.touch();
        let result = self.inner.execute_read(cmd).await;
        self.activity.touch();
        result
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.activity.touch();
        let result = self.inner.execute_write(cmd).await;
        self.activity.touch();
        result
    }

    async fn destroy(&self) -> Result<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        if let Some(timer) = self.take_timer() {
            timer.abort();
            let _ = timer.await;
        }
        self.inner.destroy().await
    }
}

impl Drop for KeepaliveCli {
    fn drop(&mut self) {
        if let Some(timer) = self.take_timer() {
            if !self.destroyed.load(Ordering::Acquire) {
                warn!("[{}] keepalive dropped without destroy()", self.id);
            }
            timer.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::EchoCli;
    use tokio::time::sleep;

    fn keepalive(echo: &Arc<EchoCli>, command: &str) -> KeepaliveCli {
        KeepaliveCli::new("dev", echo.clone(), command, Duration::from_secs(60))
    }

    fn keepalives(echo: &EchoCli) -> usize {
        echo.reads().iter().filter(|r| *r == "show clock").count()
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_session_gets_keepalive_each_interval() {
        let echo = Arc::new(EchoCli::new());
        let cli = keepalive(&echo, "show clock");

        sleep(Duration::from_secs(61)).await;
        assert_eq!(keepalives(&echo), 1);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(keepalives(&echo), 2);

        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_traffic_suppresses_keepalive() {
        let echo = Arc::new(EchoCli::new());
        let cli = keepalive(&echo, "show clock");

        sleep(Duration::from_secs(30)).await;
        cli.execute_read(ReadCommand::create("show version")).await.unwrap();
        sleep(Duration::from_secs(60)).await;
        cli.execute_write(WriteCommand::create("configure\n")).await.unwrap();
        sleep(Duration::from_secs(35)).await;

        assert_eq!(keepalives(&echo), 0);
        assert_eq!(echo.reads(), vec!["show version"]);
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_bypasses_cache() {
        let echo = Arc::new(EchoCli::new());
        let cache = crate::cli::ReadCache::default();
        let cached = Arc::new(crate::cli::ReadCachingCli::new("dev", echo.clone(), cache.clone()));
        let cli = KeepaliveCli::new("dev", cached, "show clock", Duration::from_secs(60));

        sleep(Duration::from_secs(130)).await;
        assert_eq!(keepalives(&echo), 2);
        assert!(cache.is_empty());
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_keepalive_failure_is_not_fatal() {
        let echo = Arc::new(EchoCli::new().fail_on("show clock"));
        let cli = keepalive(&echo, "show clock");

        sleep(Duration::from_secs(125)).await;
        assert_eq!(keepalives(&echo), 2);
        assert_eq!(
            cli.execute_read(ReadCommand::create("show version")).await.unwrap(),
            "show version"
        );
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_command_still_sent() {
        let echo = Arc::new(EchoCli::new());
        let cli = keepalive(&echo, "");

        sleep(Duration::from_secs(130)).await;
        assert_eq!(echo.reads(), vec!["", ""]);
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_interval_disables_timer() {
        let echo = Arc::new(EchoCli::new());
        let cli = KeepaliveCli::new("dev", echo.clone(), "show clock", Duration::ZERO);

        sleep(Duration::from_secs(600)).await;
        assert_eq!(echo.calls(), 0);
        cli.destroy().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_destroy_stops_timer() {
        let echo = Arc::new(EchoCli::new());
        let cli = keepalive(&echo, "show clock");

        cli.destroy().await.unwrap();
        sleep(Duration::from_secs(600)).await;

        assert_eq!(echo.calls(), 0);
        assert!(echo.is_destroyed());
        cli.destroy().await.unwrap();
        assert_eq!(echo.destroy_calls(), 1);
    }
}
