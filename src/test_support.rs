//! Scriptable cache used by unit tests across the crate.

use crate::cache::{Cache, CacheValue};
use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// In-memory `Cache<T>` with call counters, an optional per-call delay and
/// injectable failures. Stored TTLs are reported back verbatim.
pub(crate) struct ScriptedCache<T> {
    entries: DashMap<String, (T, Duration)>,
    delay: Option<Duration>,
    get_err: Option<Error>,
    set_err: Option<Error>,
    delete_err: Option<Error>,
    clear_err: Option<Error>,
    gets: AtomicUsize,
    sets: AtomicUsize,
    deletes: AtomicUsize,
    clears: AtomicUsize,
}

impl<T: CacheValue> ScriptedCache<T> {
    pub(crate) fn new() -> Self {
        ScriptedCache {
            entries: DashMap::new(),
            delay: None,
            get_err: None,
            set_err: None,
            delete_err: None,
            clear_err: None,
            gets: AtomicUsize::new(0),
            sets: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub(crate) fn failing_get(mut self, err: Error) -> Self {
        self.get_err = Some(err);
        self
    }

    pub(crate) fn failing_set(mut self, err: Error) -> Self {
        self.set_err = Some(err);
        self
    }

    pub(crate) fn failing_delete(mut self, err: Error) -> Self {
        self.delete_err = Some(err);
        self
    }

    pub(crate) fn failing_clear(mut self, err: Error) -> Self {
        self.clear_err = Some(err);
        self
    }

    pub(crate) fn insert(&self, key: &str, val: T) {
        self.entries.insert(key.to_string(), (val, Duration::ZERO));
    }

    pub(crate) fn peek(&self, key: &str) -> Option<(T, Duration)> {
        self.entries.get(key).map(|e| e.value().clone())
    }

    pub(crate) fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub(crate) fn sets(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    pub(crate) fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub(crate) fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    async fn pause(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }

    fn lookup(&self, key: &str) -> Result<(T, Duration)> {
        if let Some(err) = &self.get_err {
            return Err(err.clone());
        }
        self.peek(key)
            .ok_or_else(|| Error::NotFound(key.to_string()))
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for ScriptedCache<T> {
    async fn get(&self, _ctx: &Context, key: &str) -> Result<T> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.lookup(key).map(|(val, _)| val)
    }

    async fn set(&self, _ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        if let Some(err) = &self.set_err {
            return Err(err.clone());
        }
        self.entries.insert(key.to_string(), (val, ttl));
        Ok(())
    }

    async fn get_with_ttl(&self, _ctx: &Context, key: &str) -> Result<(T, Duration)> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.pause().await;
        self.lookup(key)
    }

    async fn delete(&self, _ctx: &Context, key: &str) -> Result<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.delete_err {
            return Err(err.clone());
        }
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self, _ctx: &Context) -> Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = &self.clear_err {
            return Err(err.clone());
        }
        self.entries.clear();
        Ok(())
    }
}
