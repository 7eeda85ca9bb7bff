//! # Function-backed operation (`OpFn`)
//!
//! [`OpFn`] wraps a closure `F: Fn(Context) -> Fut`, producing a fresh future per
//! attempt. There is no hidden mutation between attempts; if state must be shared,
//! capture an `Arc<...>` explicitly inside the closure.
//!
//! ## Example
//! ```rust
//! use retryvisor::{Context, OpFn, OpRef, OpError};
//!
//! let op: OpRef = OpFn::arc("worker", |ctx: Context| async move {
//!     if ctx.is_done() {
//!         return Ok(());
//!     }
//!     // do work...
//!     Ok::<_, OpError>(())
//! });
//!
//! assert_eq!(op.name(), "worker");
//! ```

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Context;
use crate::error::OpError;
use crate::ops::operation::Operation;

/// Function-backed operation.
///
/// Wraps a closure that *creates* a new future per attempt.
#[derive(Debug)]
pub struct OpFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> OpFn<F> {
    /// Creates a new function-backed operation.
    ///
    /// Prefer [`OpFn::arc`] when you immediately need an [`OpRef`](crate::OpRef).
    pub fn new<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Self
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OpError>> + Send + 'static,
    {
        Self { name: name.into(), f }
    }

    /// Creates the operation and returns it as a shared handle.
    pub fn arc<Fut>(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self>
    where
        F: Fn(Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), OpError>> + Send + 'static,
    {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Operation for OpFn<F>
where
    F: Fn(Context) -> Fut + Send + Sync + 'static, // Fn, not FnMut
    Fut: Future<Output = Result<(), OpError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> Result<(), OpError> {
        (self.f)(ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_fresh_future_per_run() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let op = OpFn::arc("count", move |_ctx: Context| {
            let counter = Arc::clone(&counter);
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        op.run(Context::background()).await.expect("first");
        op.run(Context::background()).await.expect("second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_error_passthrough() {
        let op = OpFn::arc("fail", |_ctx: Context| async { Err(OpError::msg("nope")) });
        let err = op.run(Context::background()).await.unwrap_err();
        assert_eq!(err.to_string(), "execution failed: nope");
    }
}
