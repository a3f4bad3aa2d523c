//! Bridges used when the value type itself is `Vec<u8>`.
//!
//! The builder only selects these adapters after checking
//! [`is_bytes_type`], so the conversions below cannot fail for a cache it
//! compiled; they still report [`Error::TypeMismatch`] instead of panicking.

use super::logic_ttl::LogicTtlValue;
use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Length of the logical expiry prefix in the bytes wire layout.
pub const LOGIC_TTL_HEADER_LEN: usize = 8;

pub fn is_bytes_type<T: 'static>() -> bool {
    TypeId::of::<T>() == TypeId::of::<Vec<u8>>()
}

fn into_bytes<T: 'static>(val: T) -> Result<Vec<u8>> {
    let boxed: Box<dyn Any> = Box::new(val);
    boxed
        .downcast::<Vec<u8>>()
        .map(|b| *b)
        .map_err(|_| Error::type_mismatch::<Vec<u8>>("value bridged to bytes"))
}

fn from_bytes<T: 'static>(raw: Vec<u8>) -> Result<T> {
    let boxed: Box<dyn Any> = Box::new(raw);
    boxed
        .downcast::<T>()
        .map(|b| *b)
        .map_err(|_| Error::type_mismatch::<T>("bytes bridged to value"))
}

/// Identity adapter: `T` is `Vec<u8>`, so the byte cache is used as-is.
pub struct BytesPassThrough<T> {
    inner: DynCache<Vec<u8>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> BytesPassThrough<T> {
    pub fn new(inner: DynCache<Vec<u8>>) -> Result<Self> {
        if !is_bytes_type::<T>() {
            return Err(Error::type_mismatch::<Vec<u8>>(format!(
                "bytes pass-through cannot carry {}",
                std::any::type_name::<T>()
            )));
        }
        Ok(BytesPassThrough {
            inner,
            _marker: PhantomData,
        })
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for BytesPassThrough<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        from_bytes(self.inner.get(ctx, key).await?)
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.inner.set(ctx, key, into_bytes(val)?, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let (raw, ttl) = self.inner.get_with_ttl(ctx, key).await?;
        Ok((from_bytes(raw)?, ttl))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.inner.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.inner.clear(ctx).await
    }
}

/// Stores `LogicTtlValue<Vec<u8>>` without a codec.
///
/// # Format
///
/// ```text
/// [EXPIRE_AT: 8 bytes LE, Unix nanoseconds, 0 = no logical expiry] [RAW PAYLOAD]
/// ```
pub struct LogicTtlBytesAdapter<T> {
    inner: DynCache<Vec<u8>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> LogicTtlBytesAdapter<T> {
    pub fn new(inner: DynCache<Vec<u8>>) -> Result<Self> {
        if !is_bytes_type::<T>() {
            return Err(Error::ConfigError(format!(
                "logic TTL bytes adapter only supports Vec<u8> values, got {}",
                std::any::type_name::<T>()
            )));
        }
        Ok(LogicTtlBytesAdapter {
            inner,
            _marker: PhantomData,
        })
    }
}

pub fn encode_logic_ttl_bytes(payload: &[u8], expire_at: Option<SystemTime>) -> Result<Vec<u8>> {
    let nanos: i64 = match expire_at {
        None => 0,
        Some(at) => match at.duration_since(UNIX_EPOCH) {
            Ok(d) => nanos_i64(d.as_nanos())?,
            Err(before) => -nanos_i64(before.duration().as_nanos())?,
        },
    };
    let mut out = Vec::with_capacity(LOGIC_TTL_HEADER_LEN + payload.len());
    out.extend_from_slice(&nanos.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}

fn nanos_i64(nanos: u128) -> Result<i64> {
    i64::try_from(nanos).map_err(|_| {
        Error::stage(
            "logic TTL bytes encode",
            Error::SerializationError(format!(
                "logical expiry of {}ns does not fit the 8-byte header",
                nanos
            )),
        )
    })
}

pub fn decode_logic_ttl_bytes(mut raw: Vec<u8>) -> Result<(Vec<u8>, Option<SystemTime>)> {
    if raw.len() < LOGIC_TTL_HEADER_LEN {
        return Err(Error::InvalidCacheEntry(format!(
            "invalid logic TTL bytes payload: len={}",
            raw.len()
        )));
    }
    let mut header = [0u8; LOGIC_TTL_HEADER_LEN];
    header.copy_from_slice(&raw[..LOGIC_TTL_HEADER_LEN]);
    let nanos = i64::from_le_bytes(header);
    let expire_at = (nanos > 0).then(|| UNIX_EPOCH + Duration::from_nanos(nanos as u64));

    let payload = raw.split_off(LOGIC_TTL_HEADER_LEN);
    Ok((payload, expire_at))
}

impl<T: CacheValue> LogicTtlBytesAdapter<T> {
    fn decode(raw: Vec<u8>) -> Result<LogicTtlValue<T>> {
        let (payload, expire_at) = decode_logic_ttl_bytes(raw)?;
        Ok(LogicTtlValue {
            val: from_bytes(payload)?,
            expire_at,
        })
    }
}

#[async_trait]
impl<T: CacheValue> Cache<LogicTtlValue<T>> for LogicTtlBytesAdapter<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<LogicTtlValue<T>> {
        Self::decode(self.inner.get(ctx, key).await?)
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        val: LogicTtlValue<T>,
        ttl: Duration,
    ) -> Result<()> {
        let payload = into_bytes(val.val)?;
        let raw = encode_logic_ttl_bytes(&payload, val.expire_at)?;
        self.inner.set(ctx, key, raw, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(LogicTtlValue<T>, Duration)> {
        let (raw, ttl) = self.inner.get_with_ttl(ctx, key).await?;
        Ok((Self::decode(raw)?, ttl))
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
    use crate::cache::BaseCache;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn byte_cache() -> DynCache<Vec<u8>> {
        Arc::new(BaseCache::new(Arc::new(MemoryStore::new())))
    }

    #[test]
    fn test_wire_layout_is_bit_exact() {
        let at = UNIX_EPOCH + Duration::from_nanos(0x0102_0304_0506_0708);
        let raw = encode_logic_ttl_bytes(b"xyz", Some(at)).expect("encode");
        assert_eq!(
            raw,
            vec![0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01, b'x', b'y', b'z']
        );

        let (payload, expire_at) = decode_logic_ttl_bytes(raw).expect("decode");
        assert_eq!(payload, b"xyz");
        assert_eq!(expire_at, Some(at));
    }

    #[test]
    fn test_zero_timestamp_means_no_expiry() {
        let raw = encode_logic_ttl_bytes(b"p", None).expect("encode");
        assert_eq!(&raw[..8], &[0u8; 8]);
        let (_, expire_at) = decode_logic_ttl_bytes(raw).expect("decode");
        assert!(expire_at.is_none());
    }

    #[test]
    fn test_expiry_beyond_header_range_rejected() {
        // i64 nanoseconds end in 2262.
        let far = UNIX_EPOCH + Duration::from_secs(400 * 365 * 24 * 3600);
        let err = encode_logic_ttl_bytes(b"p", Some(far)).expect_err("overflow");
        assert!(matches!(err, Error::Stage { .. }));
        assert!(err.to_string().contains("does not fit"));
    }

    #[tokio::test]
    async fn test_adapter_set_reports_overflowing_expiry() {
        let inner = byte_cache();
        let adapter = LogicTtlBytesAdapter::<Vec<u8>>::new(Arc::clone(&inner)).expect("adapter");
        let ctx = Context::background();

        let res = adapter
            .set(
                &ctx,
                "k",
                LogicTtlValue {
                    val: b"payload".to_vec(),
                    expire_at: Some(UNIX_EPOCH + Duration::from_secs(400 * 365 * 24 * 3600)),
                },
                Duration::ZERO,
            )
            .await;
        assert!(res.is_err());
        assert!(inner.get(&ctx, "k").await.expect_err("nothing written").is_not_found());
    }

    #[test]
    fn test_short_payload_rejected() {
        let err = decode_logic_ttl_bytes(vec![1, 2, 3]).expect_err("short");
        assert!(matches!(err, Error::InvalidCacheEntry(_)));
    }

    #[test]
    fn test_adapters_reject_non_bytes_types() {
        assert!(BytesPassThrough::<String>::new(byte_cache()).is_err());
        assert!(LogicTtlBytesAdapter::<String>::new(byte_cache()).is_err());
        assert!(BytesPassThrough::<Vec<u8>>::new(byte_cache()).is_ok());
    }

    #[tokio::test]
    async fn test_logic_adapter_through_cache() {
        let inner = byte_cache();
        let adapter = LogicTtlBytesAdapter::<Vec<u8>>::new(Arc::clone(&inner)).expect("adapter");
        let ctx = Context::background();
        let at = SystemTime::now() + Duration::from_secs(30);

        adapter
            .set(
                &ctx,
                "k",
                LogicTtlValue {
                    val: b"payload".to_vec(),
                    expire_at: Some(at),
                },
                Duration::ZERO,
            )
            .await
            .expect("Failed to set");

        let raw = inner.get(&ctx, "k").await.expect("raw");
        assert_eq!(raw.len(), LOGIC_TTL_HEADER_LEN + b"payload".len());

        let back = adapter.get(&ctx, "k").await.expect("Failed to get");
        assert_eq!(back.val, b"payload");
        assert!(back.expire_at.is_some());
    }
}
