//! # Cancellation context handed to every operation.
//!
//! [`Context`] layers a deadline and a recorded end reason on top of
//! [`CancellationToken`]. Children are derived with [`Context::child`],
//! [`Context::with_timeout`] or [`Context::with_deadline`]; cancelling a parent
//! cancels every descendant, never the other way round.
//!
//! ## Reason resolution
//! ```text
//! err():
//!   ├─ own reason recorded (cancel() or own timer) ─► that reason
//!   ├─ token not cancelled                         ─► None
//!   └─ cancelled by propagation                    ─► parent.err() (walks up)
//! ```
//!
//! ## Timers
//! A context with its own deadline spawns one timer task that records
//! `DeadlineExceeded` and cancels the token. The timer exits as soon as the token
//! is cancelled for any reason, so cancelling the context (or dropping its
//! [`ContextGuard`]) releases it.

use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::error::DoneReason;

#[derive(Debug)]
struct Inner {
    token: CancellationToken,
    deadline: Option<Instant>,
    reason: OnceLock<DoneReason>,
    parent: Option<Context>,
}

/// Cancellation scope with an optional deadline.
///
/// Cheap to clone; clones share the same scope.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use retryvisor::{Context, DoneReason};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let root = Context::background();
/// let child = root.with_timeout(Duration::from_millis(10));
///
/// child.done().await;
/// assert_eq!(child.err(), Some(DoneReason::DeadlineExceeded));
/// assert_eq!(root.err(), None);
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

impl From<CancellationToken> for Context {
    fn from(token: CancellationToken) -> Self {
        Self::from_token(token)
    }
}

impl Context {
    /// Root context: never ends unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::from_token(CancellationToken::new())
    }

    /// Root context driven by an existing token.
    ///
    /// Cancelling `token` from outside is reported as [`DoneReason::Cancelled`].
    pub fn from_token(token: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                token,
                deadline: None,
                reason: OnceLock::new(),
                parent: None,
            }),
        }
    }

    /// Derives a child that ends when this context ends. Inherits the deadline.
    pub fn child(&self) -> Context {
        self.derive(self.inner.deadline)
    }

    /// Derives a child that additionally ends after `timeout`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn with_timeout(&self, timeout: Duration) -> Context {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derives a child that additionally ends at `at`.
    ///
    /// If this context already has an earlier deadline the child simply inherits it.
    /// Must be called from within a tokio runtime.
    pub fn with_deadline(&self, at: Instant) -> Context {
        if let Some(parent_at) = self.inner.deadline {
            if parent_at <= at {
                return self.child();
            }
        }

        let child = self.derive(Some(at));
        let inner = Arc::clone(&child.inner);
        tokio::spawn(async move {
            tokio::select! {
                _ = time::sleep_until(at) => {
                    let _ = inner.reason.set(DoneReason::DeadlineExceeded);
                    inner.token.cancel();
                }
                _ = inner.token.cancelled() => {}
            }
        });
        child
    }

    fn derive(&self, deadline: Option<Instant>) -> Context {
        Context {
            inner: Arc::new(Inner {
                token: self.inner.token.child_token(),
                deadline,
                reason: OnceLock::new(),
                parent: Some(self.clone()),
            }),
        }
    }

    /// Cancels this context and all of its descendants.
    ///
    /// The first recorded reason wins; cancelling after a deadline keeps `DeadlineExceeded`.
    pub fn cancel(&self) {
        let _ = self.inner.reason.set(DoneReason::Cancelled);
        self.inner.token.cancel();
    }

    /// Returns `true` once the context has ended.
    pub fn is_done(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    /// Completes when the context ends.
    pub async fn done(&self) {
        self.inner.token.cancelled().await
    }

    /// Why the context ended, or `None` while it is live.
    pub fn err(&self) -> Option<DoneReason> {
        if let Some(reason) = self.inner.reason.get() {
            return Some(*reason);
        }
        if !self.inner.token.is_cancelled() {
            return None;
        }
        self.inner
            .parent
            .as_ref()
            .and_then(Context::err)
            .or(Some(DoneReason::Cancelled))
    }

    /// Effective deadline, if any ancestor or this context has one.
    pub fn deadline(&self) -> Option<Instant> {
        self.inner.deadline
    }

    /// Underlying token, for APIs that speak `tokio_util` directly.
    pub fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    /// Returns a guard that cancels this context when dropped.
    #[must_use = "the context is cancelled as soon as the guard is dropped"]
    pub fn guard(&self) -> ContextGuard {
        ContextGuard {
            ctx: Some(self.clone()),
        }
    }

    /// Sleeps for `d` unless the context ends first.
    ///
    /// Convenience for operations; the error converts into [`OpError`](crate::OpError) with `?`.
    pub async fn sleep(&self, d: Duration) -> Result<(), DoneReason> {
        tokio::select! {
            _ = time::sleep(d) => Ok(()),
            _ = self.done() => Err(self.err().unwrap_or(DoneReason::Cancelled)),
        }
    }
}

/// Cancels its context on drop.
///
/// Used to release derived scopes (and their timers) on every exit path.
#[derive(Debug)]
pub struct ContextGuard {
    ctx: Option<Context>,
}

impl ContextGuard {
    /// Gives the context back without cancelling it.
    pub fn disarm(mut self) -> Context {
        self.ctx.take().unwrap_or_default()
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx.take() {
            ctx.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_timeout_records_deadline() {
        let root = Context::background();
        let child = root.with_timeout(Duration::from_millis(100));
        assert!(!child.is_done());
        assert_eq!(child.err(), None);

        child.done().await;
        assert_eq!(child.err(), Some(DoneReason::DeadlineExceeded));
        assert!(!root.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_propagates_reason() {
        let root = Context::background();
        let child = root.with_timeout(Duration::from_secs(10));
        let grandchild = child.child();

        root.cancel();
        assert!(grandchild.is_done());
        assert_eq!(child.err(), Some(DoneReason::Cancelled));
        assert_eq!(grandchild.err(), Some(DoneReason::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_inherits_parent_deadline_reason() {
        let root = Context::background();
        let parent = root.with_timeout(Duration::from_millis(50));
        let child = parent.with_timeout(Duration::from_secs(5));
        assert_eq!(child.deadline(), parent.deadline());

        child.done().await;
        assert_eq!(child.err(), Some(DoneReason::DeadlineExceeded));
        assert_eq!(parent.err(), Some(DoneReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_child_cancel_does_not_touch_parent() {
        let root = Context::background();
        let child = root.child();
        child.cancel();
        assert_eq!(child.err(), Some(DoneReason::Cancelled));
        assert!(!root.is_done());
    }

    #[tokio::test]
    async fn test_guard_cancels_on_drop() {
        let root = Context::background();
        let child = root.child();
        {
            let _g = child.guard();
        }
        assert!(child.is_done());

        let other = root.child();
        let kept = other.guard().disarm();
        assert!(!kept.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sleep_interrupted_by_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(20));
        let res = ctx.sleep(Duration::from_secs(1)).await;
        assert_eq!(res, Err(DoneReason::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_external_token_cancel() {
        let token = CancellationToken::new();
        let ctx = Context::from(token.clone());
        token.cancel();
        assert_eq!(ctx.err(), Some(DoneReason::Cancelled));
    }
}
