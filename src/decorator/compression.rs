//! Byte-stage transform compressing values on the way to the store.

use crate::cache::{Cache, DynCache};
use crate::codec::CompressionCodec;
use crate::context::Context;
use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub struct CompressionDecorator<C> {
    inner: DynCache<Vec<u8>>,
    codec: C,
}

impl<C: CompressionCodec> CompressionDecorator<C> {
    pub fn new(inner: DynCache<Vec<u8>>, codec: C) -> Self {
        CompressionDecorator { inner, codec }
    }
}

#[async_trait]
impl<C: CompressionCodec> Cache<Vec<u8>> for CompressionDecorator<C> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<Vec<u8>> {
        let raw = self.inner.get(ctx, key).await?;
        self.codec.decompress(&raw)
    }

    async fn set(&self, ctx: &Context, key: &str, val: Vec<u8>, ttl: Duration) -> Result<()> {
        let compressed = self.codec.compress(&val)?;
        self.inner.set(ctx, key, compressed, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(Vec<u8>, Duration)> {
        let (raw, ttl) = self.inner.get_with_ttl(ctx, key).await?;
        Ok((self.codec.decompress(&raw)?, ttl))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.inner.clear(ctx).await
    }
}

#[cfg(all(test, feature = "gzip"))]
mod tests {
    use super::*;
    use crate::cache::BaseCache;
    use crate::codec::GzipCompression;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_store_sees_compressed_bytes() {
        let raw: DynCache<Vec<u8>> = Arc::new(BaseCache::new(Arc::new(MemoryStore::new())));
        let cache = CompressionDecorator::new(Arc::clone(&raw), GzipCompression::default());
        let ctx = Context::background();
        let plain = b"hello-compress".repeat(16);

        cache
            .set(&ctx, "k", plain.clone(), Duration::from_secs(60))
            .await
            .expect("Failed to set");

        let stored = raw.get(&ctx, "k").await.expect("stored");
        assert_ne!(stored, plain);

        let (back, ttl) = cache.get_with_ttl(&ctx, "k").await.expect("Failed to get");
        assert_eq!(back, plain);
        assert!(ttl <= Duration::from_secs(60));
    }
}
