//! Lazy load on miss: a not-found from the inner cache is answered by the
//! loader and the result is written back.

use super::loader::LoaderFn;
use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use crate::observability::Observable;
use async_trait::async_trait;
use std::time::Duration;

pub struct MissedLoaderDecorator<T: CacheValue> {
    inner: DynCache<T>,
    loader: LoaderFn<T>,
    write_back_ttl: Duration,
    ob: Observable,
}

impl<T: CacheValue> MissedLoaderDecorator<T> {
    pub fn new(
        inner: DynCache<T>,
        loader: LoaderFn<T>,
        write_back_ttl: Duration,
        ob: Observable,
    ) -> Self {
        MissedLoaderDecorator {
            inner,
            loader,
            write_back_ttl,
            ob,
        }
    }

    async fn load_and_write_back(&self, ctx: &Context, key: &str) -> Result<T> {
        let val = (self.loader)(ctx.clone(), key.to_string()).await?;

        if let Err(e) = self
            .inner
            .set(ctx, key, val.clone(), self.write_back_ttl)
            .await
        {
            self.ob.error(
                ctx,
                format_args!("[MissedLoaderDecorator] write back failed. key={} err={}", key, e),
            );
        }
        Ok(val)
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for MissedLoaderDecorator<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        match self.inner.get(ctx, key).await {
            Err(e) if e.is_not_found() => self.load_and_write_back(ctx, key).await,
            other => other,
        }
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.inner.set(ctx, key, val, ttl).await
    }

    /// A loaded value reports the write-back TTL it was stored with.
    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        match self.inner.get_with_ttl(ctx, key).await {
            Err(e) if e.is_not_found() => {
                let val = self.load_and_write_back(ctx, key).await?;
                Ok((val, self.write_back_ttl))
            }
            other => other,
        }
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.inner.clear(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decorator::loader::loader;
    use crate::error::Error;
    use crate::test_support::ScriptedCache;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const WRITE_BACK_TTL: Duration = Duration::from_secs(30);

    fn counting_loader(calls: Arc<AtomicUsize>) -> LoaderFn<String> {
        loader(move |_ctx, key: String| {
            let calls = Arc::clone(&calls);
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(format!("loaded-{}", key))
            }
        })
    }

    #[tokio::test]
    async fn test_miss_loads_and_writes_back() {
        let inner = Arc::new(ScriptedCache::<String>::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MissedLoaderDecorator::new(
            inner.clone(),
            counting_loader(Arc::clone(&calls)),
            WRITE_BACK_TTL,
            Observable::default(),
        );
        let ctx = Context::background();

        assert_eq!(cache.get(&ctx, "a").await.expect("Failed to get"), "loaded-a");
        assert_eq!(
            inner.peek("a"),
            Some(("loaded-a".to_string(), WRITE_BACK_TTL))
        );

        assert_eq!(cache.get(&ctx, "a").await.expect("Failed to get"), "loaded-a");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_get_with_ttl_reports_write_back_ttl() {
        let inner = Arc::new(ScriptedCache::<String>::new());
        let cache = MissedLoaderDecorator::new(
            inner,
            counting_loader(Arc::new(AtomicUsize::new(0))),
            WRITE_BACK_TTL,
            Observable::default(),
        );

        let (val, ttl) = cache
            .get_with_ttl(&Context::background(), "a")
            .await
            .expect("Failed to get");
        assert_eq!(val, "loaded-a");
        assert_eq!(ttl, WRITE_BACK_TTL);
    }

    #[tokio::test]
    async fn test_loader_error_propagates() {
        let inner = Arc::new(ScriptedCache::<String>::new());
        let cache = MissedLoaderDecorator::new(
            inner.clone(),
            loader(|_ctx, _key: String| async { Err(Error::LoaderError("db down".to_string())) }),
            WRITE_BACK_TTL,
            Observable::default(),
        );

        let err = cache
            .get(&Context::background(), "a")
            .await
            .expect_err("loader failed");
        assert!(matches!(err, Error::LoaderError(_)));
        assert_eq!(inner.sets(), 0);
    }

    #[tokio::test]
    async fn test_other_inner_errors_pass_through() {
        let inner = Arc::new(
            ScriptedCache::<String>::new().failing_get(Error::BackendError("timeout".to_string())),
        );
        let calls = Arc::new(AtomicUsize::new(0));
        let cache = MissedLoaderDecorator::new(
            inner,
            counting_loader(Arc::clone(&calls)),
            WRITE_BACK_TTL,
            Observable::default(),
        );

        let err = cache
            .get(&Context::background(), "a")
            .await
            .expect_err("backend error");
        assert!(matches!(err, Error::BackendError(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_write_back_failure_still_returns_value() {
        let inner = Arc::new(
            ScriptedCache::<String>::new().failing_set(Error::BackendError("read only".to_string())),
        );
        let cache = MissedLoaderDecorator::new(
            inner,
            counting_loader(Arc::new(AtomicUsize::new(0))),
            WRITE_BACK_TTL,
            Observable::default(),
        );

        assert_eq!(
            cache.get(&Context::background(), "a").await.expect("Failed to get"),
            "loaded-a"
        );
    }
}
