//! Observability: per-operation events, metrics sinks and the logger seam.

use crate::context::Context;
use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

/// Operation an [`Event`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Get,
    Set,
    GetWithTtl,
    Delete,
    Clear,
    FetchByLoader,
}

impl Op {
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Get => "get",
            Op::Set => "set",
            Op::GetWithTtl => "get_with_ttl",
            Op::Delete => "delete",
            Op::Clear => "clear",
            Op::FetchByLoader => "fetch_by_loader",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheResult {
    Hit,
    Miss,
    Fail,
}

impl CacheResult {
    /// Classify the outcome of a read: success is a hit, not-found a miss,
    /// anything else a failure.
    pub fn from_result<T>(res: &Result<T>) -> Self {
        match res {
            Ok(_) => CacheResult::Hit,
            Err(e) if e.is_not_found() => CacheResult::Miss,
            Err(_) => CacheResult::Fail,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheResult::Hit => "hit",
            CacheResult::Miss => "miss",
            CacheResult::Fail => "fail",
        }
    }
}

/// Custom string tags of one event.
///
/// Sibling tasks sharing one context (e.g. the parallel fan-out of a
/// multi-tier `set`) may write concurrently, hence the mutex.
#[derive(Debug, Clone, Default)]
pub struct EventTags {
    fields: Arc<Mutex<HashMap<String, String>>>,
}

impl EventTags {
    pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
        self.fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
    }

    /// Snapshot of the current tags.
    pub fn snapshot(&self) -> HashMap<String, String> {
        self.fields
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Add tags to the event attached to `ctx`. No-op when the call is not
/// observed.
pub fn add_custom_fields<I, K, V>(ctx: &Context, fields: I)
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    if let Some(tags) = ctx.event_tags() {
        for (k, v) in fields {
            tags.insert(k, v);
        }
    }
}

/// One record per observed operation.
#[derive(Debug, Clone)]
pub struct Event {
    pub op: Op,
    pub cache_name: String,
    pub store_name: String,
    pub latency: Duration,
    /// Only set for `get`, `get_with_ttl` and `fetch_by_loader`.
    pub result: Option<CacheResult>,
    pub error: Option<Error>,
    tags: EventTags,
}

impl Event {
    pub(crate) fn new(op: Op, cache_name: &str, store_name: &str, tags: EventTags) -> Self {
        Event {
            op,
            cache_name: cache_name.to_string(),
            store_name: store_name.to_string(),
            latency: Duration::ZERO,
            result: None,
            error: None,
            tags,
        }
    }

    pub fn custom_fields(&self) -> HashMap<String, String> {
        self.tags.snapshot()
    }

    pub fn custom_field(&self, key: &str) -> Option<String> {
        self.tags.snapshot().remove(key)
    }
}

/// Sink for observed operations. May fail; failures are logged only.
pub trait Metrics: Send + Sync {
    fn record(&self, ctx: &Context, event: &Event) -> Result<()>;

    /// Called whenever a logically expired entry is served.
    fn record_logic_expire(&self, _ctx: &Context) {}
}

/// Metrics sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMetrics;

impl Metrics for NoOpMetrics {
    fn record(&self, _ctx: &Context, _event: &Event) -> Result<()> {
        Ok(())
    }
}

/// Simple atomic counters, enough for dashboards and tests.
#[derive(Debug, Default)]
pub struct CounterMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    failures: AtomicU64,
    writes: AtomicU64,
    logic_expired: AtomicU64,
}

impl CounterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }

    pub fn logic_expired(&self) -> u64 {
        self.logic_expired.load(Ordering::Relaxed)
    }

    /// Hit rate over all classified reads, 0.0 when nothing was read.
    pub fn hit_rate(&self) -> f64 {
        let hits = self.hits() as f64;
        let total = hits + self.misses() as f64 + self.failures() as f64;
        if total == 0.0 {
            0.0
        } else {
            hits / total
        }
    }
}

impl Metrics for CounterMetrics {
    fn record(&self, _ctx: &Context, event: &Event) -> Result<()> {
        match event.result {
            Some(CacheResult::Hit) => self.hits.fetch_add(1, Ordering::Relaxed),
            Some(CacheResult::Miss) => self.misses.fetch_add(1, Ordering::Relaxed),
            Some(CacheResult::Fail) => self.failures.fetch_add(1, Ordering::Relaxed),
            None if event.op == Op::Set => self.writes.fetch_add(1, Ordering::Relaxed),
            None => 0,
        };
        Ok(())
    }

    fn record_logic_expire(&self, _ctx: &Context) {
        self.logic_expired.fetch_add(1, Ordering::Relaxed);
    }
}

/// Leveled, context-scoped logger.
pub trait Logger: Send + Sync {
    fn log(&self, ctx: &Context, level: log::Level, args: fmt::Arguments<'_>);
}

/// Forwards to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFacade;

impl Logger for LogFacade {
    fn log(&self, _ctx: &Context, level: log::Level, args: fmt::Arguments<'_>) {
        log!(level, "{}", args);
    }
}

/// Metrics and logger handed to every layer of a compiled cache.
#[derive(Clone)]
pub struct Observable {
    pub metrics: Arc<dyn Metrics>,
    pub logger: Arc<dyn Logger>,
}

impl Default for Observable {
    fn default() -> Self {
        Observable {
            metrics: Arc::new(NoOpMetrics),
            logger: Arc::new(LogFacade),
        }
    }
}

impl Observable {
    pub fn new(metrics: Arc<dyn Metrics>, logger: Arc<dyn Logger>) -> Self {
        Observable { metrics, logger }
    }

    pub fn error(&self, ctx: &Context, args: fmt::Arguments<'_>) {
        self.logger.log(ctx, log::Level::Error, args);
    }

    pub fn warn(&self, ctx: &Context, args: fmt::Arguments<'_>) {
        self.logger.log(ctx, log::Level::Warn, args);
    }

    pub fn debug(&self, ctx: &Context, args: fmt::Arguments<'_>) {
        self.logger.log(ctx, log::Level::Debug, args);
    }

    /// Record `event`, logging (never returning) a sink failure.
    pub fn record(&self, ctx: &Context, event: &Event) {
        if let Err(e) = self.metrics.record(ctx, event) {
            self.error(
                ctx,
                format_args!("[{}] record metrics failed: {}", event.op, e),
            );
        }
    }
}

impl fmt::Debug for Observable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable").finish_non_exhaustive()
    }
}
