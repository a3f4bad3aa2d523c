//! The typed cache contract and the base cache that bridges it to a store.
//!
//! Every feature in this crate is a [`Cache<T>`] wrapping another
//! [`Cache<T>`]; a compiled cache is a strict nesting of them:
//!
//! ```text
//! outer decorators → Observable → extra decorators → Singleflight
//!   → Nil-Cache → Missed-Loader → staged cache (codec/compression/logic TTL)
//!   → BaseCache → Store
//! ```

use crate::context::Context;
use crate::error::Result;
use crate::observability::Observable;
use crate::store::{downcast_value, Store};
use async_trait::async_trait;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Bound shared by every cacheable value type.
pub trait CacheValue: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> CacheValue for T {}

/// Typed cache operations.
#[async_trait]
pub trait Cache<T: CacheValue>: Send + Sync {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T>;

    /// Store `val` under `key`. `ttl == Duration::ZERO` never expires.
    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()>;

    /// Value plus remaining physical TTL (`Duration::ZERO` when the entry
    /// never expires).
    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;

    async fn clear(&self, ctx: &Context) -> Result<()>;
}

/// Shared handle to a cache layer.
pub type DynCache<T> = Arc<dyn Cache<T>>;

/// Builds the innermost typed cache from the store.
pub type CacheFactory<T> =
    Box<dyn FnOnce(Arc<dyn Store>, &Observable) -> Result<DynCache<T>> + Send>;

/// Wraps one cache layer in another.
pub type Decorator<T> = Box<dyn FnOnce(DynCache<T>, &Observable) -> Result<DynCache<T>> + Send>;

/// Box a closure as a [`Decorator`].
pub fn decorator<T, F>(f: F) -> Decorator<T>
where
    T: CacheValue,
    F: FnOnce(DynCache<T>, &Observable) -> Result<DynCache<T>> + Send + 'static,
{
    Box::new(f)
}

/// Typed view over a store.
///
/// Values are written as-is and converted back to `T` on read; a stored
/// value of any other type yields [`crate::Error::TypeMismatch`].
pub struct BaseCache<T> {
    store: Arc<dyn Store>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: CacheValue> BaseCache<T> {
    pub fn new(store: Arc<dyn Store>) -> Self {
        BaseCache {
            store,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for BaseCache<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let value = self.store.get(ctx, key).await?;
        downcast_value(value)
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.store.set(ctx, key, Arc::new(val), ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let (value, ttl) = self.store.get_with_ttl(ctx, key).await?;
        Ok((downcast_value(value)?, ttl))
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        self.store.delete(ctx, key).await
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        self.store.clear(ctx).await
    }
}
