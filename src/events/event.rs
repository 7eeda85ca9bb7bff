//! # Runtime events emitted by the supervisor, the retry driver and fan-out combinators.
//!
//! The [`EventKind`] enum classifies event types across three categories:
//! - **Attempt events**: one supervised attempt (starting, succeeded, failed, timeout, crash, interrupt)
//! - **Driver events**: decisions between attempts (retry scheduled, budget exhausted, parent cancelled)
//! - **Fan-out events**: start and outcome of a combinator run
//!
//! The [`Event`] struct carries metadata such as timestamps, operation name,
//! attempt number, error text and delays.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use retryvisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::AttemptFailed)
//!     .with_op("fetch")
//!     .with_error("boom")
//!     .with_attempt(3)
//!     .with_timeout(Duration::from_secs(5));
//!
//! assert_eq!(ev.kind, EventKind::AttemptFailed);
//! assert_eq!(ev.op.as_deref(), Some("fetch"));
//! assert_eq!(ev.error.as_deref(), Some("boom"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::core::InterruptSignal;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets:
    /// - `op`: subscriber name
    /// - `error`: panic info/message
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `op`: subscriber name
    /// - `error`: reason string (e.g., "full", "closed")
    SubscriberOverflow,

    // === Attempt events ===
    /// An attempt is about to start.
    ///
    /// Sets:
    /// - `op`: operation name
    /// - `attempt`: attempt number (1-based, per driver run)
    /// - `timeout`: per-attempt deadline, if any
    AttemptStarting,

    /// The operation completed without error.
    ///
    /// Sets:
    /// - `op`, `attempt`
    AttemptSucceeded,

    /// The operation returned an error.
    ///
    /// Sets:
    /// - `op`, `attempt`
    /// - `error`: failure message
    AttemptFailed,

    /// The attempt's own deadline elapsed.
    ///
    /// Sets:
    /// - `op`, `attempt`
    /// - `timeout`: the per-attempt deadline
    TimeoutHit,

    /// The operation's task panicked and the panic was captured.
    ///
    /// Sets:
    /// - `op`, `attempt`
    /// - `error`: panic message
    CrashCaptured,

    /// A watched signal ended the attempt.
    ///
    /// Sets:
    /// - `op`, `attempt`
    /// - `signal`: the signal observed
    InterruptReceived,

    // === Driver events ===
    /// The enclosing scope ended during an attempt or a retry sleep.
    ///
    /// Sets:
    /// - `op`, `attempt`
    /// - `error`: parent's reason
    ParentCancelled,

    /// Another attempt follows after `delay`.
    ///
    /// Sets:
    /// - `op`
    /// - `attempt`: the attempt that just finished
    /// - `delay`: sleep before the next attempt
    /// - `error`: last failure message, if the attempt failed
    RetryScheduled,

    /// Every attempt was spent.
    ///
    /// Sets:
    /// - `op`
    /// - `attempt`: number of attempts made
    /// - `error`: last failure message, if any
    BudgetExhausted,

    // === Fan-out events ===
    /// A combinator launched its operations.
    ///
    /// Sets:
    /// - `op`: combinator name
    /// - `count`: number of operations launched
    FanOutStarted,

    /// A combinator finished with one or more failures.
    ///
    /// Sets:
    /// - `op`: combinator name
    /// - `count`: number of failures reported
    /// - `error`: aggregated message
    FanOutFailed,

    /// The parent ended before the combinator finished.
    ///
    /// Sets:
    /// - `op`: combinator name
    /// - `error`: parent's reason
    FanOutAborted,

    /// Every operation of a combinator succeeded.
    ///
    /// Sets:
    /// - `op`: combinator name
    /// - `count`: number of operations
    FanOutCompleted,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Name of the operation (or subscriber), if applicable.
    pub op: Option<Arc<str>>,
    /// Attempt number (starting from 1).
    pub attempt: Option<u64>,
    /// Human-readable error or reason.
    pub error: Option<Arc<str>>,
    /// Per-attempt deadline.
    pub timeout: Option<Duration>,
    /// Delay before the next attempt.
    pub delay: Option<Duration>,
    /// Signal that interrupted the attempt.
    pub signal: Option<InterruptSignal>,
    /// Operation or failure count for fan-out events.
    pub count: Option<usize>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            op: None,
            attempt: None,
            error: None,
            timeout: None,
            delay: None,
            signal: None,
            count: None,
        }
    }

    /// Attaches an operation name.
    #[inline]
    pub fn with_op(mut self, op: impl Into<Arc<str>>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Attaches an attempt number.
    #[inline]
    pub fn with_attempt(mut self, n: u64) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches an error or reason message.
    #[inline]
    pub fn with_error(mut self, error: impl Into<Arc<str>>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attaches a per-attempt deadline.
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        self.timeout = Some(d);
        self
    }

    /// Attaches the delay before the next attempt.
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay = Some(d);
        self
    }

    /// Attaches the signal that interrupted an attempt.
    #[inline]
    pub fn with_signal(mut self, signal: InterruptSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Attaches an operation or failure count.
    #[inline]
    pub fn with_count(mut self, n: usize) -> Self {
        self.count = Some(n);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::SubscriberOverflow)
            .with_op(subscriber)
            .with_error(format!("subscriber={subscriber} reason={reason}"))
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        Event::new(EventKind::SubscriberPanicked)
            .with_op(subscriber)
            .with_error(info)
    }
}
