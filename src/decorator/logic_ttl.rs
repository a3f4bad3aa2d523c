//! Logical (soft) expiry with inline refresh.
//!
//! Entries carry an application-level expiry on top of the store's physical
//! TTL. A logically expired entry that the store still holds is returned as
//! is, and the same call reloads it from the source and writes it back.
//! Refresh failures are logged only: the caller already has a usable value.

use super::loader::LoaderFn;
use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use crate::observability::Observable;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime};

/// Value plus its logical expiry as written to the wire cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogicTtlValue<T> {
    pub val: T,
    /// `None` means the value never expires logically.
    pub expire_at: Option<SystemTime>,
}

impl<T> LogicTtlValue<T> {
    pub fn is_expired(&self) -> bool {
        matches!(self.expire_at, Some(at) if SystemTime::now() > at)
    }
}

pub struct LogicTtlConfig<T: CacheValue> {
    pub cache: DynCache<LogicTtlValue<T>>,
    /// Logical lifetime given to every write. Zero disables logical expiry.
    pub default_logic_ttl: Duration,
    /// Reload function. Expected to be singleflight-wrapped so concurrent
    /// readers of one stale key trigger a single reload.
    pub loader: Option<LoaderFn<T>>,
    /// Physical TTL used when writing a refreshed value back.
    pub write_back_ttl: Duration,
    pub observable: Observable,
}

pub struct LogicTtlDecorator<T: CacheValue> {
    cache: DynCache<LogicTtlValue<T>>,
    default_logic_ttl: Duration,
    loader: Option<LoaderFn<T>>,
    write_back_ttl: Duration,
    ob: Observable,
}

impl<T: CacheValue> LogicTtlDecorator<T> {
    pub fn new(config: LogicTtlConfig<T>) -> Self {
        LogicTtlDecorator {
            cache: config.cache,
            default_logic_ttl: config.default_logic_ttl,
            loader: config.loader,
            write_back_ttl: config.write_back_ttl,
            ob: config.observable,
        }
    }

    fn wrap(&self, val: T) -> LogicTtlValue<T> {
        let expire_at = (!self.default_logic_ttl.is_zero())
            .then(|| SystemTime::now() + self.default_logic_ttl);
        LogicTtlValue { val, expire_at }
    }

    async fn on_expire(&self, ctx: &Context, key: &str) {
        self.ob.metrics.record_logic_expire(ctx);

        let Some(loader) = &self.loader else {
            self.ob.debug(
                ctx,
                format_args!("[LogicTtlDecorator] key={} expired, no loader configured", key),
            );
            return;
        };

        let fresh = match loader(ctx.clone(), key.to_string()).await {
            Ok(fresh) => fresh,
            Err(e) => {
                self.ob.error(
                    ctx,
                    format_args!("[LogicTtlDecorator] load from source failed. key={} err={}", key, e),
                );
                return;
            }
        };

        if let Err(e) = self
            .cache
            .set(ctx, key, self.wrap(fresh), self.write_back_ttl)
            .await
        {
            self.ob.error(
                ctx,
                format_args!("[LogicTtlDecorator] write back failed. key={} err={}", key, e),
            );
        }
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for LogicTtlDecorator<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let wrapped = self.cache.get(ctx, key).await?;
        if wrapped.is_expired() {
            self.on_expire(ctx, key).await;
        }
        Ok(wrapped.val)
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.cache.set(ctx, key, self.wrap(val), ttl).await
    }

    /// Returns the physical TTL left in the store; the logical horizon is
    /// not exposed.
    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let (wrapped, ttl) = self.cache.get_with_ttl(ctx, key).await?;
        Ok((wrapped.val, ttl))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.cache.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.cache.clear(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::BaseCache;
    use crate::decorator::loader::{loader, singleflight_loader};
    use crate::error::Error;
    use crate::observability::CounterMetrics;
    use crate::store::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const LOGIC_TTL: Duration = Duration::from_millis(200);

    fn build(
        loads: Arc<AtomicUsize>,
        metrics: Arc<CounterMetrics>,
        fail: bool,
    ) -> LogicTtlDecorator<String> {
        let load = loader(move |_ctx, key: String| {
            let loads = Arc::clone(&loads);
            async move {
                let n = loads.fetch_add(1, Ordering::SeqCst) + 1;
                if fail {
                    Err(Error::LoaderError("source down".to_string()))
                } else {
                    Ok(format!("{}-v{}", key, n + 1))
                }
            }
        });

        LogicTtlDecorator::new(LogicTtlConfig {
            cache: Arc::new(BaseCache::new(Arc::new(MemoryStore::new()))),
            default_logic_ttl: LOGIC_TTL,
            loader: Some(singleflight_loader(load)),
            write_back_ttl: Duration::from_secs(3600),
            observable: Observable::new(metrics, Arc::new(crate::observability::LogFacade)),
        })
    }

    #[tokio::test]
    async fn test_fresh_entry_does_not_reload() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = build(Arc::clone(&loads), Arc::new(CounterMetrics::new()), false);
        let ctx = Context::background();

        cache
            .set(&ctx, "k", "k-v1".to_string(), Duration::from_secs(3600))
            .await
            .expect("Failed to set");

        assert_eq!(cache.get(&ctx, "k").await.expect("get"), "k-v1");
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_entry_served_stale_then_refreshed() {
        let loads = Arc::new(AtomicUsize::new(0));
        let metrics = Arc::new(CounterMetrics::new());
        let cache = build(Arc::clone(&loads), Arc::clone(&metrics), false);
        let ctx = Context::background();

        cache
            .set(&ctx, "k", "k-v1".to_string(), Duration::from_secs(3600))
            .await
            .expect("Failed to set");

        tokio::time::sleep(LOGIC_TTL + Duration::from_millis(50)).await;

        assert_eq!(cache.get(&ctx, "k").await.expect("stale"), "k-v1");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
        assert_eq!(metrics.logic_expired(), 1);

        assert_eq!(cache.get(&ctx, "k").await.expect("refreshed"), "k-v2");
        assert_eq!(loads.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_value() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = build(Arc::clone(&loads), Arc::new(CounterMetrics::new()), true);
        let ctx = Context::background();

        cache
            .set(&ctx, "k", "k-v1".to_string(), Duration::from_secs(3600))
            .await
            .expect("Failed to set");
        tokio::time::sleep(LOGIC_TTL + Duration::from_millis(50)).await;

        assert_eq!(cache.get(&ctx, "k").await.expect("stale"), "k-v1");
        assert_eq!(cache.get(&ctx, "k").await.expect("still stale"), "k-v1");
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_key_propagates_not_found() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = build(Arc::clone(&loads), Arc::new(CounterMetrics::new()), false);

        let err = cache
            .get(&Context::background(), "missing")
            .await
            .expect_err("missing");
        assert!(err.is_not_found());
        assert_eq!(loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_get_with_ttl_reports_physical_ttl() {
        let loads = Arc::new(AtomicUsize::new(0));
        let cache = build(loads, Arc::new(CounterMetrics::new()), false);
        let ctx = Context::background();

        cache
            .set(&ctx, "k", "v".to_string(), Duration::from_secs(3600))
            .await
            .expect("Failed to set");

        let (val, ttl) = cache.get_with_ttl(&ctx, "k").await.expect("get");
        assert_eq!(val, "v");
        assert!(ttl > LOGIC_TTL);
        assert!(ttl <= Duration::from_secs(3600));
    }

    #[test]
    fn test_zero_logic_ttl_never_expires() {
        let value = LogicTtlValue {
            val: 1,
            expire_at: None,
        };
        assert!(!value.is_expired());
    }
}
