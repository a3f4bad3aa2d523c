//! Builder for multi-tier caches.

use super::fetch::{FetchPolicy, MissedCacheFilter, SequentialFetch, Tiers, WriteBackFilter};
use super::tiered::{ObservableMultiCache, TieredCache};
use super::write_back::{ParallelWriteBack, WriteBack};
use super::{ErrorHandleMode, MultiCache};
use crate::cache::{CacheValue, DynCache};
use crate::decorator::{singleflight_loader, LoaderFn};
use crate::error::{Error, Result};
use crate::observability::{LogFacade, Logger, Metrics, NoOpMetrics, Observable};
use std::sync::Arc;

/// Fluent builder for a [`MultiCache`].
///
/// Defaults: [`SequentialFetch`], [`MissedCacheFilter`], a
/// [`ParallelWriteBack`] with a one minute TTL, [`ErrorHandleMode::Tolerant`]
/// and a singleflight-wrapped loader.
///
/// # Example
///
/// ```
/// # use cache_stack::{Builder, Context, MemoryStore, MultiBuilder, MultiCache};
/// # use cache_stack::decorator::loader;
/// # use std::sync::Arc;
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> cache_stack::Result<()> {
/// let local = Builder::<String>::new("local", Arc::new(MemoryStore::new())).build()?;
/// let shared = Builder::<String>::new("shared", Arc::new(MemoryStore::new())).build()?;
///
/// let users = MultiBuilder::new("users", vec![local, shared])
///     .with_loader(loader(|_ctx, key: String| async move { Ok(format!("row {}", key)) }))
///     .build()?;
///
/// assert_eq!(users.get(&Context::background(), "42").await?, "row 42");
/// # Ok(())
/// # }
/// ```
pub struct MultiBuilder<T: CacheValue> {
    name: String,
    caches: Vec<DynCache<T>>,
    errors: Vec<Error>,

    loader: Option<LoaderFn<T>>,
    loader_required: bool,
    singleflight_loader: bool,

    fetch_policy: Arc<dyn FetchPolicy<T>>,
    filter: Arc<dyn WriteBackFilter<T>>,
    write_back: Arc<dyn WriteBack<T>>,
    mode: ErrorHandleMode,

    metrics: Arc<dyn Metrics>,
    logger: Arc<dyn Logger>,
}

impl<T: CacheValue> MultiBuilder<T> {
    /// Start a builder for the multi-tier cache `name`; `caches` are the
    /// tiers, fastest first.
    pub fn new(name: impl Into<String>, caches: Vec<DynCache<T>>) -> Self {
        let name = name.into();
        let mut errors = Vec::new();
        if name.is_empty() {
            errors.push(Error::ConfigError("cache name cannot be empty".to_string()));
        }

        MultiBuilder {
            name,
            caches,
            errors,
            loader: None,
            loader_required: true,
            singleflight_loader: true,
            fetch_policy: Arc::new(SequentialFetch),
            filter: Arc::new(MissedCacheFilter),
            write_back: Arc::new(ParallelWriteBack::default()),
            mode: ErrorHandleMode::default(),
            metrics: Arc::new(NoOpMetrics),
            logger: Arc::new(LogFacade),
        }
    }

    /// Source of truth queried when every tier misses or fails.
    pub fn with_loader(mut self, loader: LoaderFn<T>) -> Self {
        self.loader = Some(loader);
        self
    }

    /// Allow building without a loader. A fallback then fails with a
    /// configuration error.
    pub fn with_loader_required(mut self, required: bool) -> Self {
        self.loader_required = required;
        self
    }

    /// Coalesce concurrent loads of one key (on by default).
    pub fn with_singleflight_loader(mut self, enable: bool) -> Self {
        self.singleflight_loader = enable;
        self
    }

    pub fn with_fetch_policy(mut self, policy: impl FetchPolicy<T> + 'static) -> Self {
        self.fetch_policy = Arc::new(policy);
        self
    }

    pub fn with_write_back_filter(mut self, filter: impl WriteBackFilter<T> + 'static) -> Self {
        self.filter = Arc::new(filter);
        self
    }

    /// Replace the write-back function, e.g. with the output of
    /// [`super::WriteBackBuilder::build`].
    pub fn with_write_back(mut self, write_back: impl WriteBack<T> + 'static) -> Self {
        self.write_back = Arc::new(write_back);
        self
    }

    pub fn with_error_handling(mut self, mode: ErrorHandleMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Metrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Assemble the orchestrator wrapped in its observable layer.
    ///
    /// # Errors
    ///
    /// `Error::InvalidConfig` with every violation: empty name, no tiers,
    /// missing loader while one is required.
    pub fn build(mut self) -> Result<Arc<dyn MultiCache<T>>> {
        if self.caches.is_empty() {
            self.errors
                .push(Error::ConfigError("at least one cache is required".to_string()));
        }
        if self.loader_required && self.loader.is_none() {
            self.errors
                .push(Error::ConfigError("loader function is required".to_string()));
        }
        if !self.errors.is_empty() {
            return Err(Error::InvalidConfig(self.errors));
        }

        let ob = Observable::new(self.metrics, self.logger);
        let loader = match self.loader {
            Some(load) if self.singleflight_loader => Some(singleflight_loader(load)),
            other => other,
        };
        let tiers = Tiers::new(self.name.as_str(), self.caches, loader, ob.clone());
        let tiered = TieredCache::new(
            tiers,
            self.fetch_policy,
            self.filter,
            self.write_back,
            self.mode,
            ob.clone(),
        );

        debug!(
            "✓ Built multi cache [{}] with {} tiers",
            self.name,
            tiered.caches().len()
        );
        Ok(Arc::new(ObservableMultiCache::new(
            Arc::new(tiered),
            self.name,
            ob,
        )))
    }
}
