//! Fetch policies and write-back filters: how tiers are queried and which
//! of the tiers that failed receive the obtained value.

use crate::cache::{CacheValue, DynCache};
use crate::context::Context;
use crate::decorator::LoaderFn;
use crate::error::{Error, Result};
use crate::observability::{add_custom_fields, CacheResult, Event, EventTags, Observable, Op};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;

/// Store name reported in events recorded by a multi-tier cache.
pub(crate) const MULTI_STORE_NAME: &str = "multi";

/// The ordered tiers and fallback loader of one multi-tier cache.
///
/// Cheap to clone; handed to fetch policies and write-back functions.
#[derive(Clone)]
pub struct Tiers<T: CacheValue> {
    caches: Arc<[DynCache<T>]>,
    loader: Option<LoaderFn<T>>,
    name: Arc<str>,
    ob: Observable,
}

impl<T: CacheValue> Tiers<T> {
    pub fn new(
        name: impl Into<Arc<str>>,
        caches: Vec<DynCache<T>>,
        loader: Option<LoaderFn<T>>,
        ob: Observable,
    ) -> Self {
        Tiers {
            caches: caches.into(),
            loader,
            name: name.into(),
            ob,
        }
    }

    /// Tiers in priority order, fastest first.
    pub fn caches(&self) -> &[DynCache<T>] {
        &self.caches
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Load `key` from the source of truth. Recorded as a
    /// `fetch_by_loader` event.
    pub async fn fetch_by_loader(&self, ctx: &Context, key: &str) -> Result<T> {
        let tags = EventTags::default();
        let child = ctx.with_event_tags(tags.clone());
        let start = Instant::now();

        let res = match &self.loader {
            Some(load) => load(child, key.to_string()).await,
            None => Err(Error::ConfigError(format!(
                "multi cache [{}] has no loader configured",
                self.name
            ))),
        };

        let mut event = Event::new(Op::FetchByLoader, &self.name, MULTI_STORE_NAME, tags);
        event.latency = start.elapsed();
        event.result = Some(CacheResult::from_result(&res));
        event.error = res.as_ref().err().cloned();
        self.ob.record(ctx, &event);
        res
    }
}

/// Per-call state of one multi-tier `get`.
#[derive(Clone)]
pub struct FetchContext<T: CacheValue> {
    pub key: String,
    pub tiers: Tiers<T>,
    /// Set once the fetch policy obtained a value.
    pub value: Option<T>,
}

/// A tier that failed during a fetch, with its error.
#[derive(Clone)]
pub struct FailedCache<T: CacheValue> {
    pub index: usize,
    pub cache: DynCache<T>,
    pub error: Error,
}

/// Decides how tiers and the loader are queried.
///
/// An `Err` aborts the `get` without any write-back.
#[async_trait]
pub trait FetchPolicy<T: CacheValue>: Send + Sync {
    async fn fetch(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
    ) -> Result<(T, Vec<FailedCache<T>>)>;
}

/// Query tiers strictly in order and fall back to the loader when every
/// tier missed or failed. Tags the event with `source = cache_<i>|loader`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SequentialFetch;

#[async_trait]
impl<T: CacheValue> FetchPolicy<T> for SequentialFetch {
    async fn fetch(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
    ) -> Result<(T, Vec<FailedCache<T>>)> {
        let mut failed = Vec::new();

        for (index, cache) in fetch.tiers.caches().iter().enumerate() {
            match cache.get(ctx, &fetch.key).await {
                Ok(val) => {
                    add_custom_fields(ctx, [("source", format!("cache_{}", index))]);
                    return Ok((val, failed));
                }
                Err(error) => failed.push(FailedCache {
                    index,
                    cache: Arc::clone(cache),
                    error,
                }),
            }
        }

        let val = fetch
            .tiers
            .fetch_by_loader(ctx, &fetch.key)
            .await
            .map_err(|e| Error::stage("sequential fetch: get from source failed", e))?;
        add_custom_fields(ctx, [("source", "loader")]);
        Ok((val, failed))
    }
}

/// Picks the failed tiers that should receive the obtained value.
pub trait WriteBackFilter<T: CacheValue>: Send + Sync {
    fn filter(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
        failed: Vec<FailedCache<T>>,
    ) -> Vec<DynCache<T>>;
}

/// Only tiers that reported not-found are written back.
#[derive(Debug, Clone, Copy, Default)]
pub struct MissedCacheFilter;

impl<T: CacheValue> WriteBackFilter<T> for MissedCacheFilter {
    fn filter(
        &self,
        _ctx: &Context,
        _fetch: &FetchContext<T>,
        failed: Vec<FailedCache<T>>,
    ) -> Vec<DynCache<T>> {
        failed
            .into_iter()
            .filter(|f| f.error.is_not_found())
            .map(|f| f.cache)
            .collect()
    }
}
