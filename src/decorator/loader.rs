//! Loader and protection function types shared by the decorators.

use crate::cache::CacheValue;
use crate::context::Context;
use crate::error::Result;
use crate::singleflight::Group;
use futures::future::{BoxFuture, FutureExt};
use std::future::Future;
use std::sync::Arc;

/// Loads the value for a key from the source of truth.
pub type LoaderFn<T> = Arc<dyn Fn(Context, String) -> BoxFuture<'static, Result<T>> + Send + Sync>;

/// Produces the protective default cached for keys the source does not
/// have. Synchronous and infallible.
pub type ProtectionFn<T> = Arc<dyn Fn(&str) -> T + Send + Sync>;

/// Build a [`LoaderFn`] from an async closure.
///
/// # Example
///
/// ```
/// # use cache_stack::decorator::loader;
/// # use cache_stack::Error;
/// let load = loader(|_ctx, key: String| async move {
///     if key.starts_with("user:") {
///         Ok(format!("profile of {}", key))
///     } else {
///         Err(Error::NotFound(key))
///     }
/// });
/// # let _ = load;
/// ```
pub fn loader<T, F, Fut>(f: F) -> LoaderFn<T>
where
    T: CacheValue,
    F: Fn(Context, String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
{
    Arc::new(move |ctx, key| f(ctx, key).boxed())
}

/// Build a [`ProtectionFn`] from a closure.
pub fn protection<T, F>(f: F) -> ProtectionFn<T>
where
    T: CacheValue,
    F: Fn(&str) -> T + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Wrap `load` so that concurrent loads of the same key run once.
pub fn singleflight_loader<T: CacheValue>(load: LoaderFn<T>) -> LoaderFn<T> {
    let group = Arc::new(Group::<T>::new());
    Arc::new(move |ctx, key| {
        let group = Arc::clone(&group);
        let load = Arc::clone(&load);
        async move {
            let work_ctx = ctx.clone();
            let work_key = key.clone();
            let (res, _) = group
                .work(&ctx, &key, move || load(work_ctx, work_key))
                .await;
            res
        }
        .boxed()
    })
}
