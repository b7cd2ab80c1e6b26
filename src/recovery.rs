//! Retry policies, recovery and cancellation.
//
// The session driver never gives up on its own: by default every failed
// exchange is retried after a reconnect, forever. The types here make that
// loop bounded and interruptible when the caller wants it to be.

use crate::error::LinkError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Defines how often and how quickly a failed operation is retried.
///
/// # Example
///
/// ```rust
/// use robot_link::recovery::RetryPolicy;
/// use std::time::Duration;
///
/// let policy = RetryPolicy::bounded(5, Duration::from_millis(200));
/// assert!(policy.allows_retry(4));
/// assert!(!policy.allows_retry(5));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum failed attempts before giving up. `None` retries forever.
    pub max_attempts: Option<u32>,

    /// Delay between a failure and the next attempt.
    #[serde(with = "humantime_serde")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    /// Unbounded, immediate retry.
    fn default() -> Self {
        Self::unbounded()
    }
}

impl RetryPolicy {
    /// Retry forever without delay.
    pub fn unbounded() -> Self {
        Self {
            max_attempts: None,
            backoff: Duration::ZERO,
        }
    }

    /// Give up after `max_attempts` failures, sleeping `backoff` in between.
    pub fn bounded(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: Some(max_attempts),
            backoff,
        }
    }

    /// Whether another attempt may follow `failures` failed ones.
    pub fn allows_retry(&self, failures: u32) -> bool {
        self.max_attempts.map_or(true, |max| failures < max)
    }
}

/// A connection that can be brought back after a transient failure.
#[async_trait]
pub trait Recoverable<E> {
    /// Attempts to recover from a failure.
    async fn recover(&mut self) -> Result<(), E>;
}

/// Owner side of a cancellation signal.
///
/// Cloning the handle shares the same signal. Cancelling is sticky: once
/// fired, every current and future [`CancelSignal`] reports cancelled.
#[derive(Clone, Debug)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelHandle {
    /// Fresh, not yet cancelled handle.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Fire the signal.
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    /// A signal observing this handle.
    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

/// Observer side of a cancellation signal, checked at every retry point.
#[derive(Clone, Debug)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// Whether the signal has fired.
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Fail fast with `LinkError::Cancelled` if the signal has fired.
    pub fn check(&self) -> Result<(), LinkError> {
        if self.is_cancelled() {
            Err(LinkError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Resolves once the signal fires. Never resolves if the handle is
    /// dropped without cancelling.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|cancelled| *cancelled).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Run `fut` unless the signal fires first.
    pub async fn guard<F: Future>(&self, fut: F) -> Result<F::Output, LinkError> {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(LinkError::Cancelled),
            out = fut => Ok(out),
        }
    }

    /// Sleep for `duration`, returning early with `Cancelled` if the signal
    /// fires. A zero duration still yields to the scheduler.
    pub async fn sleep(&self, duration: Duration) -> Result<(), LinkError> {
        if duration.is_zero() {
            tokio::task::yield_now().await;
            return self.check();
        }
        self.guard(tokio::time::sleep(duration)).await
    }
}
