//! Per-key request coalescing.
//!
//! A [`Group`] lets at most one execution per key be in flight; callers
//! arriving while it runs wait for it and receive a clone of its outcome.
//! Nothing is cached once the execution finishes.

use crate::context::Context;
use crate::error::{Error, Result};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::oneshot;

type Call<V> = Shared<BoxFuture<'static, Result<V>>>;

/// Whether a caller ran the work or joined someone else's.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Leader,
    Follower,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Leader => "leader",
            Role::Follower => "follower",
        }
    }
}

pub struct Group<V> {
    calls: Arc<DashMap<String, Call<V>>>,
}

impl<V> Default for Group<V> {
    fn default() -> Self {
        Group {
            calls: Arc::new(DashMap::new()),
        }
    }
}

/// Releases a key once its execution is over, including when the task
/// running it panics or is dropped with the runtime.
struct Release<V> {
    calls: Arc<DashMap<String, Call<V>>>,
    key: String,
}

impl<V> Drop for Release<V> {
    fn drop(&mut self) {
        self.calls.remove(&self.key);
    }
}

impl<V> Group<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `work` for `key` unless a run is already in flight, in which case
    /// wait for that one instead.
    ///
    /// The execution runs on its own tokio task. A caller that gives up
    /// (deadline or cancellation on `ctx`) stops waiting but the execution
    /// still completes and releases the key; remaining waiters get its
    /// result.
    pub async fn work<F, Fut>(&self, ctx: &Context, key: &str, work: F) -> (Result<V>, Role)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let (call, done) = match self.calls.entry(key.to_string()) {
            Entry::Occupied(e) => (e.get().clone(), None),
            Entry::Vacant(e) => {
                let (tx, rx) = oneshot::channel();
                let call = async move {
                    rx.await.unwrap_or_else(|_| {
                        Err(Error::BackendError(
                            "shared execution ended without a result".to_string(),
                        ))
                    })
                }
                .boxed()
                .shared();
                e.insert(call.clone());
                (call, Some(tx))
            }
        };

        // The shard lock is released here; `work` may touch the group.
        let role = match done {
            Some(tx) => {
                let release = Release {
                    calls: Arc::clone(&self.calls),
                    key: key.to_string(),
                };
                let fut = work();
                tokio::spawn(async move {
                    let res = fut.await;
                    drop(release);
                    let _ = tx.send(res);
                });
                Role::Leader
            }
            None => Role::Follower,
        };

        (ctx.run(call).await, role)
    }

    /// Number of keys with an execution in flight.
    pub fn in_flight(&self) -> usize {
        self.calls.len()
    }
}
