//! Write-back: pushing an obtained value into the tiers that lacked it.

use super::fetch::FetchContext;
use crate::cache::{CacheValue, DynCache};
use crate::config::DEFAULT_MULTI_WRITE_BACK_TTL;
use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Writes `fetch.value` into `caches`. An `Err` is surfaced or swallowed
/// according to the multi-tier cache's [`super::ErrorHandleMode`].
#[async_trait]
pub trait WriteBack<T: CacheValue>: Send + Sync {
    async fn write_back(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
        caches: Vec<DynCache<T>>,
    ) -> Result<()>;
}

/// Writes every target concurrently and waits for all of them; failures
/// are joined into one error.
#[derive(Debug, Clone, Copy)]
pub struct ParallelWriteBack {
    ttl: Duration,
}

impl ParallelWriteBack {
    pub fn new(ttl: Duration) -> Self {
        ParallelWriteBack { ttl }
    }
}

impl Default for ParallelWriteBack {
    fn default() -> Self {
        Self::new(DEFAULT_MULTI_WRITE_BACK_TTL)
    }
}

#[async_trait]
impl<T: CacheValue> WriteBack<T> for ParallelWriteBack {
    async fn write_back(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
        caches: Vec<DynCache<T>>,
    ) -> Result<()> {
        let Some(val) = &fetch.value else {
            return Ok(());
        };

        let results = join_all(
            caches
                .iter()
                .map(|cache| cache.set(ctx, &fetch.key, val.clone(), self.ttl)),
        )
        .await;

        let errors: Vec<Error> = results.into_iter().filter_map(|r| r.err()).collect();
        match Error::join(errors) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Called with the error of a failed write-back.
pub type ErrorCallback<T> =
    Arc<dyn Fn(&Context, &FetchContext<T>, &[DynCache<T>], &Error) + Send + Sync>;

/// Assembles a [`WriteBack`]: parallel by default, optionally custom,
/// optionally detached onto the runtime, with an optional error callback.
///
/// # Example
///
/// ```
/// # use cache_stack::multi::WriteBackBuilder;
/// # use std::time::Duration;
/// let write_back = WriteBackBuilder::<String>::new()
///     .with_ttl(Duration::from_secs(30))
///     .with_async(true)
///     .with_error_callback(|_ctx, fetch, _caches, err| {
///         eprintln!("write back of {} failed: {}", fetch.key, err);
///     })
///     .build();
/// # let _ = write_back;
/// ```
pub struct WriteBackBuilder<T: CacheValue> {
    ttl: Duration,
    custom: Option<Arc<dyn WriteBack<T>>>,
    detached: bool,
    on_error: Option<ErrorCallback<T>>,
}

impl<T: CacheValue> Default for WriteBackBuilder<T> {
    fn default() -> Self {
        WriteBackBuilder {
            ttl: DEFAULT_MULTI_WRITE_BACK_TTL,
            custom: None,
            detached: false,
            on_error: None,
        }
    }
}

impl<T: CacheValue> WriteBackBuilder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// TTL used by the default parallel write-back.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// Replace the default parallel write-back.
    pub fn with_custom(mut self, write_back: impl WriteBack<T> + 'static) -> Self {
        self.custom = Some(Arc::new(write_back));
        self
    }

    /// Spawn the write-back on the tokio runtime and return immediately.
    /// A detached write-back never reports an error to the caller.
    pub fn with_async(mut self, enable: bool) -> Self {
        self.detached = enable;
        self
    }

    pub fn with_error_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Context, &FetchContext<T>, &[DynCache<T>], &Error) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    pub fn build(self) -> ConfiguredWriteBack<T> {
        let inner = self
            .custom
            .unwrap_or_else(|| Arc::new(ParallelWriteBack::new(self.ttl)) as Arc<dyn WriteBack<T>>);
        ConfiguredWriteBack {
            inner,
            detached: self.detached,
            on_error: self.on_error,
        }
    }
}

/// Output of [`WriteBackBuilder::build`].
pub struct ConfiguredWriteBack<T: CacheValue> {
    inner: Arc<dyn WriteBack<T>>,
    detached: bool,
    on_error: Option<ErrorCallback<T>>,
}

impl<T: CacheValue> ConfiguredWriteBack<T> {
    async fn run(
        inner: &dyn WriteBack<T>,
        on_error: Option<&ErrorCallback<T>>,
        ctx: &Context,
        fetch: &FetchContext<T>,
        caches: Vec<DynCache<T>>,
    ) -> Result<()> {
        let res = inner.write_back(ctx, fetch, caches.clone()).await;
        if let (Err(e), Some(callback)) = (&res, on_error) {
            callback(ctx, fetch, &caches, e);
        }
        res
    }
}

#[async_trait]
impl<T: CacheValue> WriteBack<T> for ConfiguredWriteBack<T> {
    async fn write_back(
        &self,
        ctx: &Context,
        fetch: &FetchContext<T>,
        caches: Vec<DynCache<T>>,
    ) -> Result<()> {
        if !self.detached {
            return Self::run(self.inner.as_ref(), self.on_error.as_ref(), ctx, fetch, caches).await;
        }

        let inner = Arc::clone(&self.inner);
        let on_error = self.on_error.clone();
        let ctx = ctx.clone();
        let fetch = fetch.clone();
        tokio::spawn(async move {
            if let Err(e) = Self::run(inner.as_ref(), on_error.as_ref(), &ctx, &fetch, caches).await {
                warn!("⚠ Detached write back of key={} failed: {}", fetch.key, e);
            }
        });
        Ok(())
    }
}
