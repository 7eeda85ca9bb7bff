//! # Run a single supervised attempt of an operation.
//!
//! Executes one attempt of an [`Operation`](crate::Operation) under a derived scope and
//! classifies how it ended. It never retries on its own; the driver decides.
//!
//! - **Derive child scope** per attempt (`with_timeout(period)` or plain `child()`)
//! - **Spawn** the operation as its own task, optionally behind `catch_unwind`
//! - **Watch signals** through the caller's [`SignalWatch`], if configured
//! - **Race** the outcomes and publish events
//!
//! ## Race (biased, first listed wins a tie)
//! ```text
//! child scope ended ─► parent done?         → Done(ParentCancelled)
//!                  └─► own deadline?        → Continue(Timeout)
//!                  └─► cancelled by the op  → wait for its result (parent/signal still win)
//! operation result ─► Ok  → Retry: Done(Ok) | Repeat: Continue(None)
//!                  └─► Err → Continue(err)
//! panic captured   ─► Continue(Crash) | RecoverAndStop: Done(Crash)
//! task cancelled   ─► Done(ParentCancelled) (runtime shutting down)
//! signal observed  ─► Done(Interrupted)
//! ```
//!
//! ## Rules
//! - The child scope is cancelled on **every** exit path (guard), which stops its timer
//!   and tells a still-running operation to wind down.
//! - Losing branches are abandoned: the operation task is detached, not aborted.
//! - Parent cancellation is checked before the child's own deadline, so a simultaneous
//!   parent cancel and attempt timeout is always reported as the former. The same
//!   priority applies to a parent cancel racing a successful result.
//! - An operation may cancel its own scope; that never turns its result into success.
//! - Panics are captured only for the spawned operation task; with
//!   [`CrashRecovery::Disabled`] they are resumed on the caller's task.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Instant;

use crate::core::context::Context;
use crate::core::signals::{InterruptSignal, SignalWatch};
use crate::error::{DoneReason, OpError};
use crate::events::{Event, EventKind};
use crate::ops::OpRef;
use crate::policies::{CrashRecovery, DriveMode, Policy};

/// How one attempt ended, from the driver's point of view.
#[derive(Debug)]
pub(crate) enum Iteration {
    /// Stop the loop with this result.
    Done(Result<(), OpError>),
    /// Another pass is allowed; carries the attempt's error, if any.
    Continue(Option<OpError>),
}

/// Result delivered by the spawned attempt task: `Err` holds a captured panic message.
type Completion = Result<Result<(), OpError>, String>;

/// Executes one attempt of `op` under `parent` as configured by `policy`.
///
/// `signals` is owned by the driver so that it outlives a single attempt.
pub(crate) async fn run_once(
    parent: &Context,
    op: &OpRef,
    policy: &Policy,
    attempt: u64,
    signals: &mut SignalWatch,
) -> Iteration {
    let child = match policy.deadline() {
        Some(d) => parent.with_timeout(d),
        None => parent.child(),
    };
    let _scope = child.guard();

    let recover = policy.crash_recovery().recovers();
    let mut task: JoinHandle<Completion> = {
        let op = OpRef::clone(op);
        let ctx = child.clone();
        tokio::spawn(async move {
            if recover {
                AssertUnwindSafe(op.run(ctx))
                    .catch_unwind()
                    .await
                    .map_err(panic_message)
            } else {
                Ok(op.run(ctx).await)
            }
        })
    };

    tokio::select! {
        biased;

        _ = child.done() => {
            if let Some(reason) = parent_ended(parent) {
                return parent_cancelled(reason, op, policy, attempt);
            }
            if let (Some(DoneReason::DeadlineExceeded), Some(timeout)) =
                (child.err(), policy.deadline())
            {
                policy.publish(|| {
                    Event::new(EventKind::TimeoutHit)
                        .with_op(op.name())
                        .with_attempt(attempt)
                        .with_timeout(timeout)
                });
                return Iteration::Continue(Some(OpError::Timeout { timeout }));
            }
            // The operation cancelled its own scope: its result still decides.
            tokio::select! {
                biased;

                _ = parent.done() => {
                    let reason = parent.err().unwrap_or(DoneReason::Cancelled);
                    parent_cancelled(reason, op, policy, attempt)
                }
                joined = &mut task => finished(joined, op, policy, attempt),
                signal = signals.recv() => {
                    Iteration::Done(Err(interrupted(signal, op, policy, attempt)))
                }
            }
        }

        joined = &mut task => finished(joined, op, policy, attempt),

        signal = signals.recv() => {
            Iteration::Done(Err(interrupted(signal, op, policy, attempt)))
        }
    }
}

/// Parent end reason, counting a parent deadline that is due but whose timer has not
/// fired yet.
fn parent_ended(parent: &Context) -> Option<DoneReason> {
    parent.err().or_else(|| {
        parent
            .deadline()
            .filter(|at| *at <= Instant::now())
            .map(|_| DoneReason::DeadlineExceeded)
    })
}

/// Classifies the joined attempt task.
fn finished(
    joined: Result<Completion, JoinError>,
    op: &OpRef,
    policy: &Policy,
    attempt: u64,
) -> Iteration {
    match joined {
        Ok(Ok(res)) => completed(res, op, policy, attempt),
        Ok(Err(message)) => crashed(message, op, policy, attempt),
        Err(join_err) if join_err.is_panic() => {
            // Crash recovery is disabled: behave like an unrecovered panic.
            std::panic::resume_unwind(join_err.into_panic())
        }
        // Only a runtime shutdown cancels the task; the enclosing scope is gone.
        Err(_cancelled) => parent_cancelled(DoneReason::Cancelled, op, policy, attempt),
    }
}

fn parent_cancelled(reason: DoneReason, op: &OpRef, policy: &Policy, attempt: u64) -> Iteration {
    publish_parent_cancelled(policy, op, attempt, reason);
    Iteration::Done(Err(OpError::ParentCancelled { reason }))
}

/// Publishes the interrupt and returns the terminal error for it.
pub(crate) fn interrupted(
    signal: InterruptSignal,
    op: &OpRef,
    policy: &Policy,
    attempt: u64,
) -> OpError {
    policy.publish(|| {
        Event::new(EventKind::InterruptReceived)
            .with_op(op.name())
            .with_attempt(attempt)
            .with_signal(signal)
    });
    OpError::Interrupted { signal }
}

fn completed(res: Result<(), OpError>, op: &OpRef, policy: &Policy, attempt: u64) -> Iteration {
    match res {
        Ok(()) => {
            policy.publish(|| {
                Event::new(EventKind::AttemptSucceeded)
                    .with_op(op.name())
                    .with_attempt(attempt)
            });
            match policy.mode() {
                DriveMode::Repeat => Iteration::Continue(None),
                DriveMode::Retry => Iteration::Done(Ok(())),
            }
        }
        Err(e) => {
            policy.publish(|| {
                Event::new(EventKind::AttemptFailed)
                    .with_op(op.name())
                    .with_attempt(attempt)
                    .with_error(e.to_string())
            });
            Iteration::Continue(Some(e))
        }
    }
}

fn crashed(message: String, op: &OpRef, policy: &Policy, attempt: u64) -> Iteration {
    policy.publish(|| {
        Event::new(EventKind::CrashCaptured)
            .with_op(op.name())
            .with_attempt(attempt)
            .with_error(message.as_str())
    });
    let err = OpError::Crash { message };
    match policy.crash_recovery() {
        CrashRecovery::RecoverAndStop => Iteration::Done(Err(err)),
        _ => Iteration::Continue(Some(err)),
    }
}

pub(crate) fn publish_parent_cancelled(
    policy: &Policy,
    op: &OpRef,
    attempt: u64,
    reason: DoneReason,
) {
    policy.publish(|| {
        Event::new(EventKind::ParentCancelled)
            .with_op(op.name())
            .with_attempt(attempt)
            .with_error(reason.to_string())
    });
}

/// Renders a panic payload as text.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(err) = payload.downcast_ref::<OpError>() {
        format!("error: {err}")
    } else if let Some(msg) = payload.downcast_ref::<&'static str>() {
        format!("message: {msg}")
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("message: {msg}")
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time;

    use crate::ops::OpFn;
    use crate::policies::Opt;

    async fn supervise(parent: &Context, op: &OpRef, policy: &Policy, attempt: u64) -> Iteration {
        let mut signals = SignalWatch::subscribe(policy.signals()).expect("signal watch");
        run_once(parent, op, policy, attempt, &mut signals).await
    }

    fn sleeper(d: Duration) -> OpRef {
        OpFn::arc("sleeper", move |ctx: Context| async move {
            ctx.sleep(d).await?;
            Ok(())
        })
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_is_terminal_under_retry() {
        let policy = Policy::from_opts([Opt::retry(3, Duration::from_secs(1))]);
        let it = supervise(&Context::background(), &sleeper(Duration::from_millis(10)), &policy, 1).await;
        assert!(matches!(it, Iteration::Done(Ok(()))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_continues_under_repeat() {
        let policy = Policy::from_opts([Opt::repeat(3, Duration::from_secs(1))]);
        let it = supervise(&Context::background(), &sleeper(Duration::from_millis(10)), &policy, 1).await;
        assert!(matches!(it, Iteration::Continue(None)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_own_deadline_is_continuable_timeout() {
        let policy = Policy::from_opts([Opt::timeout(Duration::from_millis(50))]);
        let it = supervise(&Context::background(), &sleeper(Duration::from_secs(5)), &policy, 1).await;
        match it {
            Iteration::Continue(Some(OpError::Timeout { timeout })) => {
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_deadline_wins_over_own_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(30));
        let policy = Policy::from_opts([Opt::timeout(Duration::from_millis(50))]);
        let it = supervise(&parent, &sleeper(Duration::from_secs(5)), &policy, 1).await;
        assert!(matches!(
            it,
            Iteration::Done(Err(OpError::ParentCancelled {
                reason: DoneReason::DeadlineExceeded
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_equal_deadlines_report_parent() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        let policy = Policy::from_opts([Opt::timeout(Duration::from_millis(50))]);
        let it = supervise(&parent, &sleeper(Duration::from_secs(5)), &policy, 1).await;
        assert!(matches!(
            it,
            Iteration::Done(Err(OpError::ParentCancelled {
                reason: DoneReason::DeadlineExceeded
            }))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_due_parent_deadline_wins_over_own_timer() {
        let parent = Context::background().with_timeout(Duration::from_millis(50));
        assert!(parent_ended(&parent).is_none());

        time::advance(Duration::from_millis(50)).await;
        assert_eq!(parent_ended(&parent), Some(DoneReason::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_cancelled_failure_is_reported() {
        let op: OpRef = OpFn::arc("self-cancel", |ctx: Context| async move {
            ctx.cancel();
            Err(OpError::msg("real failure"))
        });
        let policy = Policy::from_opts([Opt::retry(3, Duration::from_millis(100))]);
        match supervise(&Context::background(), &op, &policy, 1).await {
            Iteration::Continue(Some(OpError::Fail { error })) => {
                assert_eq!(error.to_string(), "real failure");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_self_cancelled_success_is_kept() {
        let op: OpRef = OpFn::arc("self-cancel", |ctx: Context| async move {
            ctx.cancel();
            Ok(())
        });
        let it = supervise(&Context::background(), &op, &Policy::default(), 1).await;
        assert!(matches!(it, Iteration::Done(Ok(()))));
    }

    #[tokio::test]
    async fn test_cancelled_task_maps_to_parent_cancelled() {
        let handle: JoinHandle<Completion> = tokio::spawn(std::future::pending());
        handle.abort();
        let joined = handle.await;
        assert!(joined.as_ref().is_err_and(JoinError::is_cancelled));

        let op = sleeper(Duration::ZERO);
        let it = finished(joined, &op, &Policy::default(), 1);
        match it {
            Iteration::Done(Err(err)) => {
                assert!(err.is_parent_cancelled());
                assert!(err.is_cancelled());
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_parent_cancel_beats_simultaneous_success() {
        // Policy choice: a parent that is already done wins over a result that is
        // ready at the same time.
        let parent = Context::background();
        let p = parent.clone();
        let op: OpRef = OpFn::arc("cancel-then-ok", move |_ctx: Context| {
            let p = p.clone();
            async move {
                p.cancel();
                Ok(())
            }
        });
        let it = supervise(&parent, &op, &Policy::default(), 1).await;
        assert!(matches!(
            it,
            Iteration::Done(Err(OpError::ParentCancelled {
                reason: DoneReason::Cancelled
            }))
        ));
    }

    #[tokio::test]
    async fn test_panic_captured_when_recovering() {
        let op: OpRef = OpFn::arc("boom", |_ctx: Context| async { panic!("kaboom") });

        let policy = Policy::from_opts([Opt::recover_panic(true)]);
        match supervise(&Context::background(), &op, &policy, 1).await {
            Iteration::Continue(Some(OpError::Crash { message })) => {
                assert!(message.contains("kaboom"), "message: {message}");
            }
            other => panic!("unexpected outcome: {other:?}"),
        }

        let policy = Policy::from_opts([Opt::recover_panic(false)]);
        assert!(matches!(
            supervise(&Context::background(), &op, &policy, 1).await,
            Iteration::Done(Err(OpError::Crash { .. }))
        ));
    }

    #[tokio::test]
    #[should_panic(expected = "unrecovered")]
    async fn test_panic_propagates_without_recovery() {
        let op: OpRef = OpFn::arc("boom", |_ctx: Context| async { panic!("unrecovered") });
        let _ = supervise(&Context::background(), &op, &Policy::default(), 1).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_scope_released_after_attempt() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None::<Context>));
        let slot = std::sync::Arc::clone(&seen);
        let op: OpRef = OpFn::arc("capture", move |ctx: Context| {
            let slot = std::sync::Arc::clone(&slot);
            async move {
                *slot.lock().expect("lock") = Some(ctx);
                Ok(())
            }
        });
        let policy = Policy::from_opts([Opt::timeout(Duration::from_secs(60))]);
        let _ = supervise(&Context::background(), &op, &policy, 1).await;

        let ctx = seen.lock().expect("lock").take().expect("captured context");
        assert!(ctx.is_done());
        assert_eq!(ctx.err(), Some(DoneReason::Cancelled));
    }

    #[test]
    fn test_panic_message_kinds() {
        assert_eq!(panic_message(Box::new("static")), "message: static");
        assert_eq!(panic_message(Box::new(String::from("owned"))), "message: owned");
        assert_eq!(panic_message(Box::new(7_u8)), "unknown panic payload");
        assert_eq!(
            panic_message(Box::new(OpError::msg("typed"))),
            "error: execution failed: typed"
        );
    }
}
