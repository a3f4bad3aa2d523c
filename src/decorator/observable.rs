//! Records one [`Event`] per operation and hands it to the metrics sink.

use crate::cache::{Cache, CacheValue, DynCache};
use crate::context::Context;
use crate::error::Result;
use crate::observability::{CacheResult, Event, EventTags, Observable, Op};
use async_trait::async_trait;
use std::time::{Duration, Instant};

pub struct ObservableDecorator<T: CacheValue> {
    inner: DynCache<T>,
    cache_name: String,
    store_name: String,
    ob: Observable,
}

/// One in-progress observed call.
struct Span {
    op: Op,
    tags: EventTags,
    ctx: Context,
    start: Instant,
}

impl<T: CacheValue> ObservableDecorator<T> {
    pub fn new(
        inner: DynCache<T>,
        cache_name: impl Into<String>,
        store_name: impl Into<String>,
        ob: Observable,
    ) -> Self {
        ObservableDecorator {
            inner,
            cache_name: cache_name.into(),
            store_name: store_name.into(),
            ob,
        }
    }

    fn start(&self, ctx: &Context, op: Op) -> Span {
        let tags = EventTags::default();
        Span {
            op,
            ctx: ctx.with_event_tags(tags.clone()),
            tags,
            start: Instant::now(),
        }
    }

    fn finish<R>(&self, ctx: &Context, span: Span, res: &Result<R>) {
        let mut event = Event::new(span.op, &self.cache_name, &self.store_name, span.tags);
        event.latency = span.start.elapsed();
        if matches!(span.op, Op::Get | Op::GetWithTtl) {
            event.result = Some(CacheResult::from_result(res));
        }
        event.error = res.as_ref().err().cloned();
        self.ob.record(ctx, &event);
    }
}

#[async_trait]
impl<T: CacheValue> Cache<T> for ObservableDecorator<T> {
    async fn get(&self, ctx: &Context, key: &str) -> Result<T> {
        let span = self.start(ctx, Op::Get);
        let res = self.inner.get(&span.ctx, key).await;
        self.finish(ctx, span, &res);
        res
    }

    async fn set(&self, ctx: &Context, key: &str, val: T, ttl: Duration) -> Result<()> {
        let span = self.start(ctx, Op::Set);
        let res = self.inner.set(&span.ctx, key, val, ttl).await;
        self.finish(ctx, span, &res);
        res
    }

    async fn get_with_ttl(&self, ctx: &Context, key: &str) -> Result<(T, Duration)> {
        let span = self.start(ctx, Op::GetWithTtl);
        let res = self.inner.get_with_ttl(&span.ctx, key).await;
        self.finish(ctx, span, &res);
        res
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<()> {
        let span = self.start(ctx, Op::Delete);
        let res = self.inner.delete(&span.ctx, key).await;
        self.finish(ctx, span, &res);
        res
    }

    async fn clear(&self, ctx: &Context) -> Result<()> {
        let span = self.start(ctx, Op::Clear);
        let res = self.inner.clear(&span.ctx).await;
        self.finish(ctx, span, &res);
        res
    }
}
