//! # retryvisor
//!
//! **Retryvisor** supervises async operations: it bounds each attempt with a deadline,
//! retries or repeats on a fixed period, optionally captures panics and watches process
//! signals, and runs groups of operations concurrently with collect-all or fail-fast
//! semantics.
//!
//! Everything composes through one trait: a wrapped operation and a fan-out are both
//! [`Operation`]s, so they can be wrapped or fanned out again.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │  Operation   │   │  Operation   │   │  Operation   │
//!     │  (user #1)   │   │  (user #2)   │   │  (user #3)   │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//!     ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//!     │    Retry     │   │    Retry     │   │  (unwrapped) │
//!     │ (Policy #1)  │   │ (Policy #2)  │   │              │
//!     └──────┬───────┘   └──────┬───────┘   └──────┬───────┘
//!            ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │  Multi (CollectAll | FailFast)                                    │
//! │  - one task per operation, results over a bounded channel         │
//! │  - panics converted to OpError::Crash                             │
//! └─────────────────────────────────┬─────────────────────────────────┘
//!                                   ▼
//!                         Result<(), OpError>
//!
//! Optional observability:
//!   run_once / Retry / Multi ── publish(Event) ──► Bus ──► SubscriberSet ──► Subscribe impls
//! ```
//!
//! ### Lifecycle of a wrapped operation
//! ```text
//! Retry::run(ctx)
//!   signals = subscribe(policy.signals)    (held until the run returns)
//!
//! loop while attempts.allows(made) {
//!   ├─► publish AttemptStarting{ op, attempt }
//!   ├─► run_once(ctx, op, policy, attempt)
//!   │       ├─► child = ctx.with_timeout(period) | ctx.child()
//!   │       ├─► spawn op.run(child)  (catch_unwind if crash recovery is on)
//!   │       └─► race: child done | result | signal
//!   │             ├─ parent done          ─► ParentCancelled, exit
//!   │             ├─ own deadline         ─► Timeout, continue
//!   │             ├─ Ok                   ─► Retry: exit Ok | Repeat: continue
//!   │             ├─ Err                  ─► continue
//!   │             ├─ panic captured       ─► Crash, continue (or exit)
//!   │             └─ signal               ─► Interrupted, exit
//!   ├─► publish RetryScheduled{ delay = period - elapsed }
//!   └─► sleep(delay) racing ctx, signals   ─► parent done: ParentCancelled, exit
//!                                           ─► signal: Interrupted, exit
//! }
//! publish BudgetExhausted ─► Err(BudgetExhausted{ last }) | Ok
//! ```
//!
//! ## Features
//! | Area              | Description                                                  | Key types / traits                          |
//! |-------------------|--------------------------------------------------------------|---------------------------------------------|
//! | **Operations**    | Units of work run under a cancellable scope.                 | [`Operation`], [`OpRef`], [`OpFn`]          |
//! | **Scopes**        | Cancellation with deadlines and a recorded end reason.       | [`Context`], [`DoneReason`]                 |
//! | **Policies**      | Attempt budget, period, repeat mode, panics, signals.        | [`Policy`], [`Opt`], [`Attempts`]           |
//! | **Driving**       | Retry/repeat/timeout wrappers.                               | [`Retry`], [`wrap`], [`timeout`]            |
//! | **Fan-out**       | Concurrent collect-all and fail-fast combinators.            | [`Multi`], [`all`], [`fail_fast`]           |
//! | **Errors**        | One error type for every layer, with chain classification.   | [`OpError`], [`AggregateError`]             |
//! | **Subscriber API**| Observe attempts and fan-outs (logging, metrics, custom).    | [`Subscribe`], [`SubscriberSet`], [`Bus`]   |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in `LogWriter` _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use retryvisor::{Context, OpError, OpFn, OpRef, Opt, all, wrap};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), OpError> {
//!     let fetch: OpRef = OpFn::arc("fetch", |ctx: Context| async move {
//!         ctx.sleep(Duration::from_millis(5)).await?;
//!         Ok(())
//!     });
//!     let store: OpRef = OpFn::arc("store", |_ctx: Context| async { Ok(()) });
//!
//!     // Each attempt of `fetch` gets 100ms; at most 3 attempts.
//!     let fetch = wrap(fetch, [Opt::retry(3, Duration::from_millis(100))]);
//!
//!     all([fetch, store]).run_all(Context::background()).await
//! }
//! ```
mod core;
mod error;
mod events;
mod ops;
mod policies;
mod subscribers;

// ---- Public re-exports ----

pub use core::{
    Aggregation, Context, ContextGuard, InterruptSignal, Multi, Retry, all, fail_fast, timeout,
    wrap, wrap_fn,
};
pub use error::{AggregateError, BoxError, DoneReason, FailFastError, Failure, OpError, OpId};
pub use events::{Bus, Event, EventKind};
pub use ops::{OpFn, OpRef, Operation};
pub use policies::{Attempts, CrashRecovery, DriveMode, Opt, Policy};
pub use subscribers::{Subscribe, SubscriberSet};

// Optional: expose a simple built-in logger subscriber (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use subscribers::LogWriter;
