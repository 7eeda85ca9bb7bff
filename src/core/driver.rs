//! # Retry: the retry/repeat driver.
//!
//! Wraps one [`Operation`](crate::Operation) with a [`Policy`] and is itself an
//! operation, so wrapped operations can be wrapped again or fanned out.
//!
//! ## Event flow
//! For each attempt, the driver and runner publish (when a bus is configured):
//! ```text
//! AttemptStarting → [attempt] → AttemptSucceeded | AttemptFailed | TimeoutHit | CrashCaptured
//!                             → InterruptReceived | ParentCancelled   (terminal)
//!
//! If another pass follows:
//!   → RetryScheduled → [sleep] → (next attempt)
//! After the last pass:
//!   → BudgetExhausted
//! ```
//!
//! ## Architecture
//! ```text
//! Retry::run(ctx)
//!   signals = SignalWatch::subscribe(policy.signals)   (held for the whole run)
//!
//! while attempts.allows(made) {
//!   ├─► made += 1, started = now
//!   ├─► run_once(ctx, op, policy, made, signals)
//!   │     ├─► Done(res)       → return res
//!   │     └─► Continue(err)   → last = err
//!   └─► sleep(period - elapsed) racing ctx.done() and signals
//!         ├─► parent done     → return ParentCancelled
//!         └─► signal          → return Interrupted
//! }
//! last.map_or(Ok, BudgetExhausted)
//! ```
//!
//! ## Rules
//! - Attempts run **sequentially** within one run (never parallel).
//! - The sleep compensates for time spent inside the attempt, so passes start
//!   `period` apart instead of `attempt + period` apart.
//! - Parent cancellation is returned as-is, never wrapped in `BudgetExhausted`.
//! - Watched signals are terminal during an attempt and during the sleep after it.

use std::borrow::Cow;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{self, Instant};

use crate::core::context::Context;
use crate::core::runner::{Iteration, interrupted, publish_parent_cancelled, run_once};
use crate::core::signals::{InterruptSignal, SignalWatch};
use crate::error::{DoneReason, OpError};
use crate::events::{Event, EventKind};
use crate::ops::{OpFn, OpRef, Operation};
use crate::policies::{Opt, Policy};

/// An operation driven by a retry/repeat/timeout [`Policy`].
///
/// # Example
/// ```
/// use std::time::Duration;
/// use retryvisor::{Context, OpError, OpFn, OpRef, Opt, Retry};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let flaky: OpRef = OpFn::arc("flaky", |_ctx: Context| async { Err(OpError::msg("nope")) });
/// let op = Retry::from_opts(flaky, [Opt::retry(3, Duration::from_millis(1))]);
///
/// let err = op.execute(Context::background()).await.unwrap_err();
/// assert!(err.is_budget_exhausted());
/// # }
/// ```
pub struct Retry {
    op: OpRef,
    policy: Policy,
}

impl Retry {
    /// Wraps `op` with an explicit policy.
    pub fn new(op: OpRef, policy: Policy) -> Self {
        Self { op, policy }
    }

    /// Wraps `op` with a policy built from `opts`.
    pub fn from_opts(op: OpRef, opts: impl IntoIterator<Item = Opt>) -> Self {
        Self::new(op, Policy::from_opts(opts))
    }

    /// Returns the wrapped operation.
    pub fn inner(&self) -> &OpRef {
        &self.op
    }

    /// Returns the policy.
    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Runs the driver loop under `ctx`.
    ///
    /// ### Exit conditions
    /// - a terminal attempt outcome (success under Retry, parent cancelled, interrupt,
    ///   crash with `RecoverAndStop`)
    /// - parent cancellation or a watched signal during the inter-attempt sleep
    /// - a failed signal subscription (`SignalSetup`), before the first attempt
    /// - the attempt budget is spent → `BudgetExhausted` (or `Ok` if the last pass had no error)
    pub async fn execute(&self, ctx: Context) -> Result<(), OpError> {
        let policy = &self.policy;
        let mut last: Option<OpError> = None;
        let mut made: u64 = 0;
        let mut signals = SignalWatch::subscribe(policy.signals())
            .map_err(|error| OpError::SignalSetup { error })?;

        while policy.attempts().allows(made) {
            made += 1;
            let started = Instant::now();
            policy.publish(|| {
                let ev = Event::new(EventKind::AttemptStarting)
                    .with_op(self.op.name())
                    .with_attempt(made);
                match policy.deadline() {
                    Some(d) => ev.with_timeout(d),
                    None => ev,
                }
            });

            match run_once(&ctx, &self.op, policy, made, &mut signals).await {
                Iteration::Done(res) => return res,
                Iteration::Continue(err) => last = err,
            }

            let delay = policy.period().saturating_sub(started.elapsed());
            policy.publish(|| {
                let ev = Event::new(EventKind::RetryScheduled)
                    .with_op(self.op.name())
                    .with_attempt(made)
                    .with_delay(delay);
                match &last {
                    Some(e) => ev.with_error(e.to_string()),
                    None => ev,
                }
            });

            match pause(&ctx, delay, &mut signals).await {
                Pause::Elapsed => {}
                Pause::ParentDone(reason) => {
                    publish_parent_cancelled(policy, &self.op, made, reason);
                    return Err(OpError::ParentCancelled { reason });
                }
                Pause::Signal(signal) => {
                    return Err(interrupted(signal, &self.op, policy, made));
                }
            }
        }

        policy.publish(|| {
            let ev = Event::new(EventKind::BudgetExhausted)
                .with_op(self.op.name())
                .with_attempt(made);
            match &last {
                Some(e) => ev.with_error(e.to_string()),
                None => ev,
            }
        });

        match last {
            Some(source) => Err(OpError::BudgetExhausted {
                attempts: made,
                source: Box::new(source),
            }),
            None => Ok(()),
        }
    }
}

enum Pause {
    Elapsed,
    ParentDone(DoneReason),
    Signal(InterruptSignal),
}

/// Sleeps `delay` unless `ctx` ends or a watched signal arrives first.
/// A zero delay still observes a finished `ctx`.
async fn pause(ctx: &Context, delay: Duration, signals: &mut SignalWatch) -> Pause {
    if let Some(reason) = ctx.err() {
        return Pause::ParentDone(reason);
    }
    if delay.is_zero() {
        return Pause::Elapsed;
    }
    tokio::select! {
        biased;
        _ = ctx.done() => Pause::ParentDone(ctx.err().unwrap_or(DoneReason::Cancelled)),
        signal = signals.recv() => Pause::Signal(signal),
        _ = time::sleep(delay) => Pause::Elapsed,
    }
}

#[async_trait]
impl Operation for Retry {
    fn name(&self) -> &str {
        self.op.name()
    }

    async fn run(&self, ctx: Context) -> Result<(), OpError> {
        self.execute(ctx).await
    }
}

/// Wraps `op` with a policy built from `opts`.
///
/// Shorthand for `Arc::new(Retry::from_opts(op, opts))`.
pub fn wrap(op: OpRef, opts: impl IntoIterator<Item = Opt>) -> OpRef {
    std::sync::Arc::new(Retry::from_opts(op, opts))
}

/// Wraps a closure with a policy built from `opts`.
pub fn wrap_fn<F, Fut>(
    name: impl Into<Cow<'static, str>>,
    f: F,
    opts: impl IntoIterator<Item = Opt>,
) -> OpRef
where
    F: Fn(Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), OpError>> + Send + 'static,
{
    wrap(OpFn::arc(name, f), opts)
}

/// Bounds a single attempt of `op` by `timeout`. Same as `wrap(op, [Opt::timeout(timeout)])`.
pub fn timeout(op: OpRef, timeout: Duration) -> OpRef {
    wrap(op, [Opt::timeout(timeout)])
}
