//! Coalesces concurrent reads of one key into a single inner execution.

use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use crate::observability::add_custom_fields;
use crate::singleflight::{Group, Role};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Event tag carrying the caller's [`Role`].
pub const SINGLEFLIGHT_TAG: &str = "singleflight";

pub struct SingleflightDecorator<T: CacheValue> {
    inner: DynCache<T>,
    gets: Group<T>,
    gets_with_ttl: Group<(T, Duration)>,
}

impl<T: CacheValue> SingleflightDecorator<T> {
    pub fn new(inner: DynCache<T>) -> Self {
        SingleflightDecorator {
            inner,
            gets: Group::new(),
            gets_with_ttl: Group::new(),
        }
    }
}

fn tag_role(ctx: &Context, role: Role) {
    add_custom_fields(ctx, [(SINGLEFLIGHT_TAG, role.as_str())]);
}

#[async_trait]
impl<T: CacheValue> Cache<T> for SingleflightDecorator<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let inner = Arc::clone(&self.inner);
        let work_ctx = ctx.clone();
        let work_key = key.to_string();
        let (res, role) = self
            .gets
            .work(ctx, key, move || async move {
                inner.get(&work_ctx, &work_key).await
            })
            .await;
        tag_role(ctx, role);
        res
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        self.inner.set(ctx, key, val, ttl).await
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let inner = Arc::clone(&self.inner);
        let work_ctx = ctx.clone();
        let work_key = key.to_string();
        let (res, role) = self
            .gets_with_ttl
            .work(ctx, key, move || async move {
                inner.get_with_ttl(&work_ctx, &work_key).await
            })
            .await;
        tag_role(ctx, role);
        res
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
    use crate::observability::EventTags;
    use crate::test_support::ScriptedCache;
    use std::collections::HashSet;

    #[tokio::test]
    async fn test_concurrent_gets_hit_inner_once() {
        let inner = Arc::new(ScriptedCache::<String>::new().with_delay(Duration::from_millis(50)));
        inner.insert("k", "v".to_string());
        let cache = Arc::new(SingleflightDecorator::new(inner.clone() as DynCache<String>));

        let mut handles = Vec::new();
        let mut all_tags = Vec::new();
        for _ in 0..10 {
            let cache = Arc::clone(&cache);
            let tags = EventTags::default();
            all_tags.push(tags.clone());
            handles.push(tokio::spawn(async move {
                let ctx = Context::background().with_event_tags(tags);
                cache.get(&ctx, "k").await
            }));
        }
        for h in handles {
            assert_eq!(h.await.expect("join").expect("Failed to get"), "v");
        }

        assert_eq!(inner.gets(), 1);
        let roles: Vec<String> = all_tags
            .iter()
            .filter_map(|t| t.snapshot().remove(SINGLEFLIGHT_TAG))
            .collect();
        assert_eq!(roles.len(), 10);
        assert_eq!(roles.iter().filter(|r| *r == "leader").count(), 1);
        let distinct: HashSet<_> = roles.into_iter().collect();
        assert!(distinct.is_subset(&HashSet::from(["leader".to_string(), "follower".to_string()])));
    }

    #[tokio::test]
    async fn test_errors_are_shared_not_cached() {
        let inner = Arc::new(ScriptedCache::<String>::new().with_delay(Duration::from_millis(30)));
        let cache = Arc::new(SingleflightDecorator::new(inner.clone() as DynCache<String>));

        let results = futures::future::join_all((0..5).map(|_| {
            let cache = Arc::clone(&cache);
            async move { cache.get(&Context::background(), "missing").await }
        }))
        .await;
        for res in results {
            assert!(res.expect_err("missing").is_not_found());
        }
        assert_eq!(inner.gets(), 1);

        inner.insert("missing", "now-here".to_string());
        assert_eq!(
            cache.get(&Context::background(), "missing").await.expect("Failed to get"),
            "now-here"
        );
        assert_eq!(inner.gets(), 2);
    }

    #[tokio::test]
    async fn test_writes_are_not_coalesced() {
        let inner = Arc::new(ScriptedCache::<String>::new());
        let cache = SingleflightDecorator::new(inner.clone() as DynCache<String>);
        let ctx = Context::background();

        for _ in 0..3 {
            cache
                .set(&ctx, "k", "v".to_string(), Duration::ZERO)
                .await
                .expect("Failed to set");
        }
        assert_eq!(inner.sets(), 3);

        let (val, ttl) = cache.get_with_ttl(&ctx, "k").await.expect("Failed to get");
        assert_eq!(val, "v");
        assert_eq!(ttl, Duration::ZERO);
    }
}
