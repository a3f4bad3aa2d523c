//! Per-call context: deadline, cancellation, call options and the event the
//! current operation is reported under.

use crate::error::{Error, Result};
use crate::observability::EventTags;
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

/// Context passed to every cache and store operation.
///
/// Cloning is cheap. Decorators pass it through unchanged; the Observable
/// decorator hands a child carrying a fresh event to the layers below it,
/// with the same deadline and cancellation signal.
#[derive(Clone, Default)]
pub struct Context {
    deadline: Option<Instant>,
    cancel: Option<watch::Receiver<bool>>,
    tags: Option<EventTags>,
    options: Arc<HashMap<String, Value>>,
}

/// Cancels every context derived from [`Context::with_cancel`].
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

impl Context {
    /// Context with no deadline, no cancellation and no options.
    pub fn background() -> Self {
        Self::default()
    }

    /// Derive a context that expires after `timeout`.
    ///
    /// An existing earlier deadline is kept.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let mut ctx = self.clone();
        ctx.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        ctx
    }

    /// Derive a cancellable context.
    pub fn with_cancel(&self) -> (Self, CancelHandle) {
        let (tx, rx) = watch::channel(false);
        let mut ctx = self.clone();
        ctx.cancel = Some(rx);
        (ctx, CancelHandle { tx })
    }

    /// Attach a custom call option, visible to every layer below.
    pub fn with_option(&self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut ctx = self.clone();
        Arc::make_mut(&mut ctx.options).insert(key.into(), value.into());
        ctx
    }

    pub fn option(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn options(&self) -> &HashMap<String, Value> {
        &self.options
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn with_event_tags(&self, tags: EventTags) -> Self {
        let mut ctx = self.clone();
        ctx.tags = Some(tags);
        ctx
    }

    pub(crate) fn event_tags(&self) -> Option<&EventTags> {
        self.tags.as_ref()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Fail fast if the context is already cancelled or past its deadline.
    ///
    /// Stores call this at entry.
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(Error::Timeout("context deadline exceeded".to_string()))
            }
            _ => Ok(()),
        }
    }

    /// Drive `fut` until it completes, the deadline passes, or the context
    /// is cancelled, whichever comes first.
    pub async fn run<F, R>(&self, fut: F) -> Result<R>
    where
        F: Future<Output = Result<R>>,
    {
        self.check()?;

        let deadline = self.deadline;
        let mut cancel = self.cancel.clone();

        let expired = async move {
            match deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending::<()>().await,
            }
        };
        let cancelled = async move {
            match cancel.as_mut() {
                Some(rx) => {
                    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
                        // Handle dropped without cancelling.
                        std::future::pending::<()>().await;
                    }
                }
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            res = fut => res,
            _ = expired => Err(Error::Timeout("context deadline exceeded".to_string())),
            _ = cancelled => Err(Error::Cancelled),
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("deadline", &self.deadline)
            .field("cancelled", &self.is_cancelled())
            .field("options", &self.options)
            .finish()
    }
}
