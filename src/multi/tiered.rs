//! The multi-tier orchestrator and its observable layer.

use super::fetch::{FetchContext, FetchPolicy, Tiers, WriteBackFilter, MULTI_STORE_NAME};
use super::write_back::WriteBack;
use super::{ErrorHandleMode, MultiCache};
use crate::cache::{CacheValue, DynCache};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::observability::{CacheResult, Event, EventTags, Observable, Op};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Ordered tiers plus a fallback loader behind one façade.
pub struct TieredCache<T: CacheValue> {
    tiers: Tiers<T>,
    fetch_policy: Arc<dyn FetchPolicy<T>>,
    filter: Arc<dyn WriteBackFilter<T>>,
    write_back: Arc<dyn WriteBack<T>>,
    mode: ErrorHandleMode,
    ob: Observable,
}

impl<T: CacheValue> TieredCache<T> {
    pub fn new(
        tiers: Tiers<T>,
        fetch_policy: Arc<dyn FetchPolicy<T>>,
        filter: Arc<dyn WriteBackFilter<T>>,
        write_back: Arc<dyn WriteBack<T>>,
        mode: ErrorHandleMode,
        ob: Observable,
    ) -> Self {
        TieredCache {
            tiers,
            fetch_policy,
            filter,
            write_back,
            mode,
            ob,
        }
    }
}

#[async_trait]
impl<T: CacheValue> MultiCache<T> for TieredCache<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let mut fetch = FetchContext {
            key: key.to_string(),
            tiers: self.tiers.clone(),
            value: None,
        };

        let (val, failed) = self.fetch_policy.fetch(ctx, &fetch).await?;
        fetch.value = Some(val.clone());

        let targets = self.filter.filter(ctx, &fetch, failed);
        if let Err(e) = self.write_back.write_back(ctx, &fetch, targets).await {
            match self.mode {
                ErrorHandleMode::Strict => return Err(e),
                ErrorHandleMode::Tolerant => self.ob.error(
                    ctx,
                    format_args!("[TieredCache] cache write back error. key={} err={}", key, e),
                ),
            }
        }
        Ok(val)
    }

    /// Writes every tier concurrently. Every write is driven to completion;
    /// the first error observed is returned.
    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        let mut writes: FuturesUnordered<_> = self
            .tiers
            .caches()
            .iter()
            .map(|cache| cache.set(ctx, key, val.clone(), ttl))
            .collect();

        let mut first_err = None;
        while let Some(res) = writes.next().await {
            if let Err(e) = res {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deletes tier by tier; all failures are joined.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        let mut errors = Vec::new();
        for cache in self.tiers.caches() {
            if let Err(e) = cache.delete(ctx, key).await {
                errors.push(e);
            }
        }
        Error::join(errors).map_or(Ok(()), Err)
    }

    /// Clears tier by tier; all failures are joined.
    async fn clear(&self, ctx: &Context) -> Result<()> {
        let mut errors = Vec::new();
        for cache in self.tiers.caches() {
            if let Err(e) = cache.clear(ctx).await {
                errors.push(e);
            }
        }
        Error::join(errors).map_or(Ok(()), Err)
    }

    fn caches(&self) -> &[DynCache<T>] {
        self.tiers.caches()
    }
}

/// Records one event per multi-tier operation.
pub struct ObservableMultiCache<T: CacheValue> {
    inner: Arc<dyn MultiCache<T>>,
    name: String,
    ob: Observable,
}

impl<T: CacheValue> ObservableMultiCache<T> {
    pub fn new(inner: Arc<dyn MultiCache<T>>, name: impl Into<String>, ob: Observable) -> Self {
        ObservableMultiCache {
            inner,
            name: name.into(),
            ob,
        }
    }

    fn record<R>(&self, ctx: &Context, op: Op, tags: EventTags, start: Instant, res: &Result<R>) {
        let mut event = Event::new(op, &self.name, MULTI_STORE_NAME, tags);
        event.latency = start.elapsed();
        if op == Op::Get {
            event.result = Some(CacheResult::from_result(res));
        }
        event.error = res.as_ref().err().cloned();
        self.ob.record(ctx, &event);
    }
}

#[async_trait]
impl<T: CacheValue> MultiCache<T> for ObservableMultiCache<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let tags = EventTags::default();
        let start = Instant::now();
        let res = self.inner.get(&ctx.with_event_tags(tags.clone()), key).await;
        self.record(ctx, Op::Get, tags, start, &res);
        res
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        let tags = EventTags::default();
        let start = Instant::now();
        let res = self
            .inner
            .set(&ctx.with_event_tags(tags.clone()), key, val, ttl)
            .await;
        self.record(ctx, Op::Set, tags, start, &res);
        res
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        let tags = EventTags::default();
        let start = Instant::now();
        let res = self.inner.delete(&ctx.with_event_tags(tags.clone()), key).await;
        self.record(ctx, Op::Delete, tags, start, &res);
        res
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        let tags = EventTags::default();
        let start = Instant::now();
        let res = self.inner.clear(&ctx.with_event_tags(tags.clone())).await;
        self.record(ctx, Op::Clear, tags, start, &res);
        res
    }

    fn caches(&self) -> &[DynCache<T>] {
        self.inner.caches()
    }
}
