//! Multi-tier caching: ordered tiers plus a fallback loader behind one
//! façade.
//!
//! A `get` runs the [`FetchPolicy`], filters the tiers that failed through
//! the [`WriteBackFilter`], then pushes the obtained value into them with
//! the [`WriteBack`] function. Whether a failed write-back fails the `get`
//! is decided by the [`ErrorHandleMode`].
//!
//! `set` fans out to every tier concurrently and reports the first error;
//! `delete` and `clear` walk the tiers in order and report every error.
//! There is no `get_with_ttl`: the remaining TTL of a value held by several
//! tiers has no single answer.

pub mod builder;
pub mod fetch;
pub mod tiered;
pub mod write_back;

pub use builder::MultiBuilder;
pub use fetch::{
    FailedCache, FetchContext, FetchPolicy, MissedCacheFilter, SequentialFetch, Tiers,
    WriteBackFilter,
};
pub use tiered::{ObservableMultiCache, TieredCache};
pub use write_back::{ConfiguredWriteBack, ErrorCallback, ParallelWriteBack, WriteBack, WriteBackBuilder};

use crate::cache::{CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

/// What a multi-tier `get` does when the write-back fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandleMode {
    /// Return the write-back error even though a value was obtained.
    Strict,
    /// Log the write-back error and return the value.
    #[default]
    Tolerant,
}

#[async_trait]
pub trait MultiCache<T: CacheValue>: Send + Sync {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T>;

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;

    async fn clear(&self, ctx: &Context) -> Result<()>;

    /// The tiers, in priority order.
    fn caches(&self) -> &[DynCache<T>];
}
