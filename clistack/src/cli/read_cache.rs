//! Memoisation of read command output.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use indexmap::IndexMap;
use log::trace;

use super::Cli;
use crate::command::{ReadCommand, WriteCommand};
use crate::error::Result;

/// Sized for one device's distinct polling commands.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Least-recently-used map; front is oldest.
#[derive(Debug)]
struct Lru {
    entries: IndexMap<String, String>,
    capacity: usize,
}

impl Lru {
    fn promote(&mut self, key: &str) {
        if let Some(index) = self.entries.get_index_of(key) {
            let last = self.entries.len() - 1;
            self.entries.move_index(index, last);
        }
    }

    fn insert(&mut self, key: String, value: String) {
        if self.capacity == 0 {
            return;
        }
        if let Some(index) = self.entries.get_index_of(&key) {
            self.entries[index] = value;
            self.promote(&key);
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.shift_remove_index(0);
        }
        self.entries.insert(key, value);
    }
}

/// Bounded command-text → output cache.
///
/// Cloning yields another handle to the same cache, so several layers can
/// share one if the caller wires them that way.
#[derive(Debug, Clone)]
pub struct ReadCache {
    inner: Arc<RwLock<Lru>>,
}

impl ReadCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Lru {
                entries: IndexMap::with_capacity(capacity),
                capacity,
            })),
        }
    }

    /// Cached output for `command`, marking it most recently used.
    pub fn get(&self, command: &str) -> Option<String> {
        let hit = self
            .inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(command)
            .cloned();
        if hit.is_some() {
            self.inner
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .promote(command);
        }
        hit
    }

    pub fn insert(&self, command: impl Into<String>, output: impl Into<String>) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(command.into(), output.into());
    }

    /// Drop every entry, e.g. when device state may have changed.
    pub fn clear(&self) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .clear();
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .capacity
    }
}

impl Default for ReadCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

/// Serves repeated reads from a [`ReadCache`].
///
/// Writes never touch the cache and invalidate nothing; callers clear the
/// cache when device state may have changed.
pub struct ReadCachingCli {
    id: String,
    inner: Arc<dyn Cli>,
    cache: ReadCache,
}

impl ReadCachingCli {
    pub fn new(id: impl Into<String>, inner: Arc<dyn Cli>, cache: ReadCache) -> Self {
        Self {
            id: id.into(),
            inner,
            cache,
        }
    }

    pub fn cache(&self) -> &ReadCache {
        &self.cache
    }
}

#[async_trait]
impl Cli for ReadCachingCli {
    async fn execute_read(&self, cmd: ReadCommand) -> Result<String> {
        if cmd.skip_cache() {
            return self.inner.execute_read(cmd).await;
        }

        if let Some(output) = self.cache.get(cmd.raw()) {
            trace!("[{}] cache hit for {:?}", self.id, cmd.raw());
            return Ok(output);
        }

        let key = cmd.raw().to_string();
        let output = self.inner.execute_read(cmd).await?;
        self.cache.insert(key, output.clone());
        Ok(output)
    }

    async fn execute_write(&self, cmd: WriteCommand) -> Result<String> {
        self.inner.execute_write(cmd).await
    }

    async fn destroy(&self) -> Result<()> {
        self.inner.destroy().await
    }
}
