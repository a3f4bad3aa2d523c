//! Terminal adapter: typed values over a byte cache through a [`Codec`].

use crate::cache::{Cache, CacheValue, DynCache};
use crate::codec::Codec;
use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::time::Duration;

pub struct CodecDecorator<T, C> {
    inner: DynCache<Vec<u8>>,
    codec: C,
    _marker: PhantomData<fn() -> T>,
}

impl<T, C> CodecDecorator<T, C> {
    pub fn new(inner: DynCache<Vec<u8>>, codec: C) -> Self {
        CodecDecorator {
            inner,
            codec,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T, C> Cache<T> for CodecDecorator<T, C>
where
    T: CacheValue + Serialize + DeserializeOwned,
    C: Codec,
{
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let raw = self.inner.get(ctx, key).await?;
        self.codec.unmarshal(&raw)
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        let raw = self.codec.marshal(&val)?;
        self.inner.set(ctx, key, raw, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let (raw, ttl) = self.inner.get_with_ttl(ctx, key).await?;
        Ok((self.codec.unmarshal(&raw)?, ttl))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.inner.clear(ctx).await
    }
}
