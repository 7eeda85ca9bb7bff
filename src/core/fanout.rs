//! # Multi: run several operations concurrently as one.
//!
//! [`Multi`] launches every operation on its own task and combines the outcomes
//! according to an [`Aggregation`] mode. It is an [`Operation`] itself, so it can be
//! wrapped with a retry policy or nested in another fan-out.
//!
//! ## Architecture
//! ```text
//! Multi::run(ctx)
//!   ├─► scope = ctx (CollectAll) | ctx.child() (FailFast)
//!   ├─► spawn op[0..n](scope) ──► catch_unwind ──► tx.send((index, result))
//!   │                                                    │
//!   └─► loop (biased select) ◄───────── rx (mpsc, capacity n)
//!         ├─► parent done    → CollectAll: Aggregate(aborted_by)
//!         │                    FailFast:   ParentCancelled(reason)
//!         ├─► (i, Ok)        → pending -= 1
//!         └─► (i, Err(e))    → CollectAll: record failure
//!                              FailFast:   FailFast { op[i], e } (scope cancelled)
//! ```
//!
//! ## Rules
//! - Every operation is spawned exactly once per run and sends exactly one result.
//! - A panic inside an operation becomes [`OpError::Crash`]; it never tears down the
//!   combinator.
//! - The parent wins ties with results that are ready at the same time.
//! - Tasks that are still running when the combinator returns are detached, not aborted.
//!   Under `FailFast` they see their shared scope cancelled.

use std::borrow::Cow;
use std::panic::AssertUnwindSafe;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;

use crate::core::context::Context;
use crate::core::runner::panic_message;
use crate::error::{AggregateError, DoneReason, FailFastError, OpError};
use crate::events::{Bus, Event, EventKind};
use crate::ops::{OpRef, Operation};

/// How a [`Multi`] combines the results of its operations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Aggregation {
    /// Wait for every operation and report all failures together (default).
    ///
    /// If the parent scope ends before every operation has reported, the result is an
    /// [`AggregateError`] with only [`aborted_by`](AggregateError::aborted_by) set.
    /// Failures gathered so far are dropped. An operation whose own attempt timeout is
    /// longer than the parent deadline therefore never gets a timeout entry; the whole
    /// fan-out reports the parent's `DeadlineExceeded` instead.
    #[default]
    CollectAll,
    /// Return at the first failure and cancel the rest.
    FailFast,
}

/// A fan-out of operations combined into one.
///
/// # Example
/// ```
/// use retryvisor::{Context, OpError, OpFn, OpRef, all};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let ok: OpRef = OpFn::arc("ok", |_ctx: Context| async { Ok(()) });
/// let bad: OpRef = OpFn::arc("bad", |_ctx: Context| async { Err(OpError::msg("nope")) });
///
/// let err = all([ok, bad.clone()]).run_all(Context::background()).await.unwrap_err();
/// match err {
///     OpError::Aggregate(agg) => {
///         assert_eq!(agg.len(), 1);
///         assert!(agg.contains(&bad));
///     }
///     other => panic!("unexpected: {other}"),
/// }
/// # }
/// ```
pub struct Multi {
    ops: Vec<OpRef>,
    mode: Aggregation,
    name: Cow<'static, str>,
    bus: Option<Bus>,
}

type Outcome = (usize, Result<(), OpError>);

impl Multi {
    /// Creates a fan-out over `ops` using `mode`.
    pub fn new(ops: impl IntoIterator<Item = OpRef>, mode: Aggregation) -> Self {
        let name = match mode {
            Aggregation::CollectAll => "all",
            Aggregation::FailFast => "fail_fast",
        };
        Self {
            ops: ops.into_iter().collect(),
            mode,
            name: Cow::Borrowed(name),
            bus: None,
        }
    }

    /// Sets the name reported by [`Operation::name`] and in events.
    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Publishes fan-out events to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Operations in launch order.
    pub fn ops(&self) -> &[OpRef] {
        &self.ops
    }

    /// Aggregation mode.
    pub fn mode(&self) -> Aggregation {
        self.mode
    }

    /// Runs every operation under `ctx` and combines the results.
    ///
    /// The end of `ctx` takes priority over results. It is checked once more after the
    /// last result arrives, so failures that land in the same instant as the parent
    /// ending are discarded and the run reports the abort:
    /// `Aggregate` with `aborted_by` under [`Aggregation::CollectAll`],
    /// [`OpError::ParentCancelled`] under [`Aggregation::FailFast`].
    pub async fn run_all(&self, ctx: Context) -> Result<(), OpError> {
        self.publish(|| Event::new(EventKind::FanOutStarted).with_count(self.ops.len()));
        match self.mode {
            Aggregation::CollectAll => self.collect_all(&ctx).await,
            Aggregation::FailFast => self.first_failure(&ctx).await,
        }
    }

    async fn collect_all(&self, parent: &Context) -> Result<(), OpError> {
        let mut rx = self.launch(parent);
        let mut failures = AggregateError::default();
        let mut pending = self.ops.len();

        while pending > 0 {
            tokio::select! {
                biased;

                _ = parent.done() => {
                    return Err(OpError::Aggregate(AggregateError::aborted(self.abort(parent))));
                }

                msg = rx.recv() => match msg {
                    Some((index, res)) => {
                        pending -= 1;
                        if let Err(e) = res {
                            failures.insert(index, OpRef::clone(&self.ops[index]), e);
                        }
                    }
                    None => break,
                },
            }
        }
        if parent.is_done() {
            return Err(OpError::Aggregate(AggregateError::aborted(self.abort(parent))));
        }

        if failures.is_empty() {
            self.publish(|| Event::new(EventKind::FanOutCompleted).with_count(self.ops.len()));
            return Ok(());
        }
        self.publish(|| {
            Event::new(EventKind::FanOutFailed)
                .with_count(failures.len())
                .with_error(failures.to_string())
        });
        Err(OpError::Aggregate(failures))
    }

    async fn first_failure(&self, parent: &Context) -> Result<(), OpError> {
        let scope = parent.child();
        let _scope = scope.guard();
        let mut rx = self.launch(&scope);
        let mut pending = self.ops.len();

        while pending > 0 {
            tokio::select! {
                biased;

                _ = parent.done() => {
                    return Err(OpError::ParentCancelled { reason: self.abort(parent) });
                }

                msg = rx.recv() => match msg {
                    Some((_, Ok(()))) => pending -= 1,
                    Some((index, Err(e))) => {
                        let err = FailFastError::new(OpRef::clone(&self.ops[index]), e);
                        self.publish(|| {
                            Event::new(EventKind::FanOutFailed)
                                .with_count(1)
                                .with_error(err.to_string())
                        });
                        return Err(OpError::FailFast(err));
                    }
                    None => break,
                },
            }
        }
        if parent.is_done() {
            return Err(OpError::ParentCancelled { reason: self.abort(parent) });
        }

        self.publish(|| Event::new(EventKind::FanOutCompleted).with_count(self.ops.len()));
        Ok(())
    }

    /// Spawns one task per operation; each sends its single result on the returned channel.
    fn launch(&self, ctx: &Context) -> mpsc::Receiver<Outcome> {
        let (tx, rx) = mpsc::channel(self.ops.len().max(1));
        for (index, op) in self.ops.iter().enumerate() {
            let op = OpRef::clone(op);
            let ctx = ctx.clone();
            let tx = tx.clone();
            tokio::spawn(async move {
                let res = AssertUnwindSafe(op.run(ctx))
                    .catch_unwind()
                    .await
                    .unwrap_or_else(|payload| {
                        Err(OpError::Crash {
                            message: panic_message(payload),
                        })
                    });
                let _ = tx.send((index, res)).await;
            });
        }
        rx
    }

    /// Reports that `parent` ended first and returns its reason.
    fn abort(&self, parent: &Context) -> DoneReason {
        let reason = parent.err().unwrap_or(DoneReason::Cancelled);
        self.publish(|| Event::new(EventKind::FanOutAborted).with_error(reason.to_string()));
        reason
    }

    fn publish(&self, ev: impl FnOnce() -> Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev().with_op(self.name.as_ref()));
        }
    }
}

#[async_trait]
impl Operation for Multi {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: Context) -> Result<(), OpError> {
        self.run_all(ctx).await
    }
}

/// Runs `ops` concurrently and reports every failure: `Multi::new(ops, CollectAll)`.
pub fn all(ops: impl IntoIterator<Item = OpRef>) -> Multi {
    Multi::new(ops, Aggregation::CollectAll)
}

/// Runs `ops` concurrently and stops at the first failure: `Multi::new(ops, FailFast)`.
pub fn fail_fast(ops: impl IntoIterator<Item = OpRef>) -> Multi {
    Multi::new(ops, Aggregation::FailFast)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    use tokio::time::{self, Instant};

    use crate::core::driver::{timeout, wrap};
    use crate::ops::OpFn;
    use crate::policies::Opt;

    async fn fail_after(ctx: Context, d: Duration, msg: &'static str) -> Result<(), OpError> {
        ctx.sleep(d).await?;
        Err(OpError::msg(msg))
    }

    async fn ok_after(ctx: Context, d: Duration) -> Result<(), OpError> {
        ctx.sleep(d).await?;
        Ok(())
    }

    async fn boom() -> Result<(), OpError> {
        panic!("fanned-out panic")
    }

    fn failing(name: &'static str, ms: u64) -> OpRef {
        OpFn::arc(name, move |ctx: Context| {
            fail_after(ctx, Duration::from_millis(ms), name)
        })
    }

    fn succeeding(name: &'static str, ms: u64) -> OpRef {
        OpFn::arc(name, move |ctx: Context| ok_after(ctx, Duration::from_millis(ms)))
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_returns_first_failure() {
        let first = failing("first", 100);
        let second = failing("second", 200);
        let third = failing("third", 300);

        let started = Instant::now();
        let err = fail_fast([third, first.clone(), second])
            .run_all(Context::background())
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(150));
        match err {
            OpError::FailFast(ff) => {
                assert!(Arc::ptr_eq(ff.op(), &first));
                assert_eq!(ff.to_string(), "[first] execution failed: first");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_cancels_shared_scope() {
        let cancelled = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&cancelled);
        let waiter: OpRef = OpFn::arc("waiter", move |ctx: Context| {
            let seen = Arc::clone(&seen);
            async move {
                let res = ctx.sleep(Duration::from_secs(10)).await;
                if res == Err(DoneReason::Cancelled) {
                    seen.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            }
        });

        let err = fail_fast([waiter.clone(), failing("quick", 10), waiter])
            .run_all(Context::background())
            .await
            .unwrap_err();
        assert!(matches!(err, OpError::FailFast(_)));

        time::sleep(Duration::from_millis(1)).await;
        assert_eq!(cancelled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_parent_first() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let err = fail_fast([succeeding("slow", 500), failing("late", 400)])
            .run_all(parent)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            OpError::ParentCancelled {
                reason: DoneReason::DeadlineExceeded
            }
        ));
        assert!(err.is_parent_cancelled());
        assert!(err.is_deadline_exceeded());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_parent_cancelled_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let slow: OpRef = OpFn::arc("slow", move |ctx: Context| {
            counter.fetch_add(1, Ordering::SeqCst);
            ok_after(ctx, Duration::from_secs(1))
        });
        let group: OpRef = Arc::new(fail_fast([slow]));
        let retried = wrap(group, [Opt::retry(3, Duration::ZERO)]);

        let parent = Context::background();
        let canceller = parent.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let err = retried.run(parent).await.unwrap_err();
        assert!(err.is_parent_cancelled());
        assert!(err.is_cancelled());
        assert!(!err.is_budget_exhausted());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fail_fast_all_succeed() {
        fail_fast([succeeding("a", 10), succeeding("b", 20)])
            .run_all(Context::background())
            .await
            .expect("every op succeeds");
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_keeps_only_failures() {
        let parent = Context::background().with_timeout(Duration::from_millis(250));
        let op1 = failing("op1", 100);
        let op2 = failing("op2", 200);
        let op3 = timeout(succeeding("op3", 300), Duration::from_millis(220));
        let op4 = succeeding("op4", 50);

        let err = all([op1.clone(), op2.clone(), op3.clone(), op4.clone()])
            .run_all(parent)
            .await
            .unwrap_err();

        let OpError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(agg.aborted_by(), None);
        assert_eq!(agg.len(), 3);
        assert!(agg.contains(&op1));
        assert!(agg.contains(&op2));
        assert!(agg.get(&op3).is_some_and(OpError::is_deadline_exceeded));
        assert!(!agg.contains(&op4));
        assert!(agg.iter().all(|f| !f.error().to_string().is_empty()));

        let order: Vec<usize> = agg.iter().map(|f| f.index()).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_op_timeout_past_parent_deadline_reports_abort() {
        let parent = Context::background().with_timeout(Duration::from_millis(250));
        let op1 = failing("op1", 100);
        let op3 = timeout(succeeding("op3", 600), Duration::from_millis(400));

        let err = all([op1, op3]).run_all(parent).await.unwrap_err();

        assert!(err.is_parent_cancelled());
        assert!(err.is_deadline_exceeded());
        let OpError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(agg.aborted_by(), Some(DoneReason::DeadlineExceeded));
        assert!(agg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_parent_wins_tie_with_failure() {
        let parent = Context::background();
        let p = parent.clone();
        let last: OpRef = OpFn::arc("last", move |_ctx: Context| {
            let p = p.clone();
            async move {
                p.cancel();
                Err(OpError::msg("lost in the tie"))
            }
        });

        let err = all([last]).run_all(parent).await.unwrap_err();
        let OpError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(agg.aborted_by(), Some(DoneReason::Cancelled));
        assert!(agg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_parent_abort() {
        let stubborn: OpRef = OpFn::arc("stubborn", |_ctx: Context| async {
            time::sleep(Duration::from_secs(1)).await;
            Ok(())
        });
        let parent = Context::background().with_timeout(Duration::from_millis(100));

        let started = Instant::now();
        let err = all([stubborn, failing("quick", 10)])
            .run_all(parent)
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_millis(150));
        let OpError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        assert_eq!(agg.aborted_by(), Some(DoneReason::DeadlineExceeded));
        assert!(agg.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_all_success_and_empty() {
        all([succeeding("a", 10), succeeding("b", 30)])
            .run_all(Context::background())
            .await
            .expect("all succeed");
        all(Vec::new())
            .run_all(Context::background())
            .await
            .expect("nothing to run");
    }

    #[tokio::test]
    async fn test_panic_is_reported_as_crash() {
        let bad: OpRef = OpFn::arc("bad", |_ctx: Context| boom());
        let err = all([bad.clone(), succeeding("good", 0)])
            .run_all(Context::background())
            .await
            .unwrap_err();

        let OpError::Aggregate(agg) = err else {
            panic!("expected aggregate");
        };
        match agg.get(&bad) {
            Some(OpError::Crash { message }) => assert!(message.contains("fanned-out panic")),
            other => panic!("unexpected entry: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wrapped_fan_out_retries_whole_group() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let flaky: OpRef = OpFn::arc("flaky", move |_ctx: Context| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(OpError::msg("first run"))
                } else {
                    Ok(())
                }
            }
        });

        let group: OpRef = Arc::new(all([flaky, succeeding("steady", 5)]).with_name("group"));
        assert_eq!(group.name(), "group");

        let retried = wrap(group, [Opt::retry(3, Duration::from_millis(20))]);
        retried.run(Context::background()).await.expect("second pass succeeds");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_events() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();

        let _ = all([failing("a", 5), succeeding("b", 5)])
            .with_bus(bus)
            .run_all(Context::background())
            .await;

        let started = rx.try_recv().expect("started");
        assert_eq!(started.kind, EventKind::FanOutStarted);
        assert_eq!(started.op.as_deref(), Some("all"));
        assert_eq!(started.count, Some(2));

        let failed = rx.try_recv().expect("failed");
        assert_eq!(failed.kind, EventKind::FanOutFailed);
        assert_eq!(failed.count, Some(1));
    }
}
