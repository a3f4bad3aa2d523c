//! Store abstraction: the raw key/value/ttl contract every cache sits on.
//!
//! A store holds type-erased values. The typed [`crate::cache::BaseCache`]
//! is the one place a stored value is converted back to a static type.

#[cfg(feature = "inmemory")]
pub mod memory;

#[cfg(feature = "inmemory")]
pub use memory::MemoryStore;

use crate::context::Context;
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

/// Opaque value held by a store.
pub type StoreValue = Arc<dyn Any + Send + Sync>;

/// Minimal key/value backend contract.
///
/// - `ttl == Duration::ZERO` means never expire; `get_with_ttl` reports
///   `Duration::ZERO` for such entries.
/// - Missing keys are reported as [`Error::NotFound`].
/// - Implementations check [`Context::check`] at entry and do not add
///   behavior beyond wrapping the client.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, ctx: &Context, key: &str) -> Result<StoreValue>;

    async fn set(&self, ctx: &Context, key: &str, value: StoreValue, ttl: Duration)
        -> Result<()>;

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(StoreValue, Duration)>;

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()>;

    async fn clear(&self, ctx: &Context) -> Result<()>;

    fn name(&self) -> &str;
}

/// Convert an opaque store value back to `T`.
pub fn downcast_value<T>(value: StoreValue) -> Result<T>
where
    T: Clone + Send + Sync + 'static,
{
    match value.downcast::<T>() {
        Ok(typed) => Ok(Arc::try_unwrap(typed).unwrap_or_else(|shared| (*shared).clone())),
        Err(_) => Err(Error::type_mismatch::<T>("stored value has a different type")),
    }
}
