//! Anti-penetration: keys the source does not have are answered with a
//! protective default, cached with a short write-back TTL.

use super::loader::ProtectionFn;
use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use crate::observability::Observable;
use async_trait::async_trait;
use std::time::Duration;

pub struct NilCacheDecorator<T: CacheValue> {
    inner: DynCache<T>,
    protection: ProtectionFn<T>,
    write_back_ttl: Duration,
    ob: Observable,
}

impl<T: CacheValue> NilCacheDecorator<T> {
    pub fn new(
        inner: DynCache<T>,
        protection: ProtectionFn<T>,
        write_back_ttl: Duration,
        ob: Observable,
    ) -> Self {
        NilCacheDecorator {
            inner,
            protection,
            write_back_ttl,
            ob,
        }
    }

    async fn protect(&self, ctx: &Context, key: &str) -> T {
        let val = (self.protection)(key);

        if let Err(e) = self
            .inner
            .set(ctx, key, val.clone(), self.write_back_ttl)
            .await
        {
            self.ob.error(
                ctx,
                format_args!("[NilCacheDecorator] write back failed. key={} err={}", key, e),
            );
        }
        val
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for NilCacheDecorator<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        match self.inner.get(ctx, key).await {
            Err(e) if e.is_not_found() => Ok(self.protect(ctx, key).await),
            other => other,
        }
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.inner.set(ctx, key, val, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        match self.inner.get_with_ttl(ctx, key).await {
            Err(e) if e.is_not_found() => Ok((self.protect(ctx, key).await, self.write_back_ttl)),
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
