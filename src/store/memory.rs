//! In-memory store backed by a concurrent hash map.

use super::{Store, StoreValue};
use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Clone)]
struct Entry {
    value: StoreValue,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if now >= at)
    }
}

/// In-process store with physical expiry.
///
/// Expired entries are dropped lazily on access. Cloning shares the
/// underlying map.
///
/// # Example
///
/// ```
/// # use cache_stack::store::{MemoryStore, Store};
/// # use cache_stack::Context;
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cache_stack::Result<()> {
/// let store = MemoryStore::new();
/// let ctx = Context::background();
/// store.set(&ctx, "key", Arc::new(b"value".to_vec()), Duration::from_secs(60)).await?;
/// assert!(store.get(&ctx, "key").await.is_ok());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemoryStore {
    name: String,
    entries: Arc<DashMap<String, Entry>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_name("memory")
    }

    pub fn with_name(name: impl Into<String>) -> Self {
        MemoryStore {
            name: name.into(),
            entries: Arc::new(DashMap::new()),
        }
    }

    /// Number of entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, key: &str) -> Result<Entry> {
        let now = Instant::now();
        let entry = self
            .entries
            .get(key)
            .map(|e| e.value().clone())
            .ok_or_else(|| Error::NotFound(format!("{} (store: {})", key, self.name)))?;

        if entry.is_expired(now) {
            self.entries.remove_if(key, |_, e| e.is_expired(now));
            debug!("✗ {} GET {} -> EXPIRED", self.name, key);
            return Err(Error::NotFound(format!("{} (store: {})", key, self.name)));
        }
        Ok(entry)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, ctx: &Context, key: &str) -> Result<StoreValue> {
        ctx.check()?;
        self.lookup(key).map(|e| e.value)
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: StoreValue,
        ttl: Duration,
    ) -> Result<()> {
        ctx.check()?;
        let expires_at = (!ttl.is_zero()).then(|| Instant::now() + ttl);
        self.entries
            .insert(key.to_string(), Entry { value, expires_at });
        debug!("✓ {} SET {} (TTL: {:?})", self.name, key, ttl);
        Ok(())
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(StoreValue, Duration)> {
        ctx.check()?;
        let entry = self.lookup(key)?;
        let remaining = entry
            .expires_at
            .map(|at| at.saturating_duration_since(Instant::now()))
            .unwrap_or(Duration::ZERO);
        Ok((entry.value, remaining))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        ctx.check()?;
        self.entries.remove(key);
        debug!("✓ {} DELETE {}", self.name, key);
        Ok(())
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        ctx.check()?;
        self.entries.clear();
        warn!("⚠ {} CLEAR executed - all entries removed", self.name);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::downcast_value;

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let store = MemoryStore::new();
        let ctx = Context::background();

        store
            .set(&ctx, "k", Arc::new("v".to_string()), Duration::from_secs(60))
            .await
            .expect("Failed to set");

        let value = store.get(&ctx, "k").await.expect("Failed to get");
        assert_eq!(downcast_value::<String>(value).expect("downcast"), "v");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .get(&Context::background(), "missing")
            .await
            .expect_err("should miss");
        assert!(err.is_not_found());
    }

    #[tokio::test(start_paused = true)]
    async fn test_physical_expiry() {
        let store = MemoryStore::new();
        let ctx = Context::background();

        store
            .set(&ctx, "k", Arc::new(1_u32), Duration::from_secs(5))
            .await
            .expect("Failed to set");

        let (_, ttl) = store.get_with_ttl(&ctx, "k").await.expect("present");
        assert_eq!(ttl, Duration::from_secs(5));

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(store.get(&ctx, "k").await.expect_err("expired").is_not_found());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_zero_ttl_never_expires() {
        let store = MemoryStore::new();
        let ctx = Context::background();

        store
            .set(&ctx, "k", Arc::new(1_u32), Duration::ZERO)
            .await
            .expect("Failed to set");

        let (_, ttl) = store.get_with_ttl(&ctx, "k").await.expect("present");
        assert_eq!(ttl, Duration::ZERO);
    }

    #[tokio::test]
    async fn test_delete_and_clear() {
        let store = MemoryStore::new();
        let ctx = Context::background();

        for key in ["a", "b", "c"] {
            store
                .set(&ctx, key, Arc::new(key.to_string()), Duration::ZERO)
                .await
                .expect("Failed to set");
        }

        store.delete(&ctx, "a").await.expect("Failed to delete");
        assert_eq!(store.len(), 2);

        store.clear(&ctx).await.expect("Failed to clear");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_context_is_rejected() {
        let store = MemoryStore::new();
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let err = store.get(&ctx, "k").await.expect_err("cancelled");
        assert!(matches!(err, Error::Cancelled));
    }
}
