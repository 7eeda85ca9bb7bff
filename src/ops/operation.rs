//! # Operation abstraction.
//!
//! This module defines the [`Operation`] trait (async, cancelable) and the shared
//! handle type [`OpRef`], an `Arc<dyn Operation>` suitable for sharing across tasks.
//!
//! An operation receives a [`Context`] and should observe it to stop cooperatively:
//! the framework cancels scopes but never aborts an operation's task.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::Context;
use crate::error::OpError;

/// # Shared handle to an operation.
///
/// Identity of the handle (the `Arc` allocation) is what fan-out aggregates key on.
pub type OpRef = Arc<dyn Operation>;

/// # Asynchronous, cancelable unit of work.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use retryvisor::{Context, OpError, Operation};
///
/// struct Ping;
///
/// #[async_trait]
/// impl Operation for Ping {
///     fn name(&self) -> &str { "ping" }
///
///     async fn run(&self, ctx: Context) -> Result<(), OpError> {
///         if let Some(reason) = ctx.err() {
///             return Err(reason.into());
///         }
///         // do work...
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Operation: Send + Sync + 'static {
    /// Returns a stable, human-readable name used in errors and events.
    fn name(&self) -> &str;

    /// Executes the operation once.
    ///
    /// Implementations should watch `ctx` (`ctx.done()`, `ctx.sleep(..)`) and return
    /// promptly once it ends, typically with `Err(ctx.err().into())`.
    async fn run(&self, ctx: Context) -> Result<(), OpError>;
}
