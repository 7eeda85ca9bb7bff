//! Error types produced by operations, the retry driver and fan-out combinators.
//!
//! This module defines:
//!
//! - [`OpError`] — the single error type every [`Operation`](crate::Operation) returns.
//!   Wrapped and combined operations return it too, which is what lets them nest.
//! - [`DoneReason`] — why a [`Context`](crate::Context) ended.
//! - [`AggregateError`] — collect-all fan-out failures keyed by operation identity.
//! - [`FailFastError`] — the first failure of a fail-fast fan-out and the operation that produced it.
//!
//! Every wrapping layer keeps its cause, so the classification helpers on
//! [`OpError`] (`is_deadline_exceeded`, `is_parent_cancelled`, `is_crash`, ...)
//! answer for the whole chain, not only the outermost variant.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::core::InterruptSignal;
use crate::ops::OpRef;

/// Boxed user error carried by [`OpError::Fail`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// # Why a context ended.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DoneReason {
    /// The context (or an ancestor) was cancelled explicitly.
    #[error("context canceled")]
    Cancelled,
    /// The context (or an ancestor) reached its deadline.
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}

/// # Errors produced by operations and the layers that supervise them.
///
/// Some variants come from the operation itself (`Fail`, `Context`), the rest are
/// produced by the supervisor, the retry driver or a fan-out combinator.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum OpError {
    /// The operation failed on its own.
    #[error("execution failed: {error}")]
    Fail {
        /// The underlying error.
        #[source]
        error: BoxError,
    },

    /// The operation stopped because its context ended and reported that as its result.
    #[error(transparent)]
    Context(#[from] DoneReason),

    /// The attempt's own deadline elapsed while the parent scope was still live.
    #[error("attempt timed out after {timeout:?}")]
    Timeout {
        /// Per-attempt deadline that was exceeded.
        timeout: Duration,
    },

    /// The enclosing scope ended independently of the attempt. Never retried.
    #[error("parent context is done prematurely: {reason}")]
    ParentCancelled {
        /// Why the parent ended.
        #[source]
        reason: DoneReason,
    },

    /// The operation's task panicked and the panic was captured.
    #[error("encountered panic: {message}")]
    Crash {
        /// Panic payload rendered as text.
        message: String,
    },

    /// A watched process signal arrived during the attempt. Never retried.
    #[error("encountered signal: {signal}")]
    Interrupted {
        /// The signal that fired.
        signal: InterruptSignal,
    },

    /// Subscribing to the configured signals failed.
    #[error("failed to watch signals: {error}")]
    SignalSetup {
        /// Registration error reported by the signal driver.
        #[source]
        error: std::io::Error,
    },

    /// Every attempt was spent; wraps the error of the last one.
    #[error("max retry count reached after {attempts} attempts, underlying error: {source}")]
    BudgetExhausted {
        /// Number of attempts made.
        attempts: u64,
        /// Error of the last attempt.
        #[source]
        source: Box<OpError>,
    },

    /// Collect-all fan-out finished with failures or was aborted by its parent.
    #[error(transparent)]
    Aggregate(AggregateError),

    /// Fail-fast fan-out stopped at its first failure.
    #[error(transparent)]
    FailFast(FailFastError),
}

impl OpError {
    /// Wraps any error as an operation failure.
    ///
    /// # Example
    /// ```
    /// use retryvisor::OpError;
    ///
    /// let err = OpError::fail(std::io::Error::other("disk full"));
    /// assert_eq!(err.as_label(), "op_failed");
    /// assert!(err.downcast_ref::<std::io::Error>().is_some());
    /// ```
    pub fn fail(error: impl Into<BoxError>) -> Self {
        OpError::Fail {
            error: error.into(),
        }
    }

    /// Creates an operation failure from a plain message.
    pub fn msg(message: impl Into<String>) -> Self {
        OpError::Fail {
            error: message.into().into(),
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            OpError::Fail { .. } => "op_failed",
            OpError::Context(DoneReason::Cancelled) => "op_canceled",
            OpError::Context(DoneReason::DeadlineExceeded) => "op_deadline_exceeded",
            OpError::Timeout { .. } => "attempt_timeout",
            OpError::ParentCancelled { .. } => "parent_cancelled",
            OpError::Crash { .. } => "attempt_crashed",
            OpError::Interrupted { .. } => "attempt_interrupted",
            OpError::SignalSetup { .. } => "signal_setup_failed",
            OpError::BudgetExhausted { .. } => "retry_budget_exhausted",
            OpError::Aggregate(_) => "fan_out_aggregate",
            OpError::FailFast(_) => "fan_out_fail_fast",
        }
    }

    /// Follows retry and fail-fast wrappers down to the error that started the chain.
    ///
    /// Aggregates are not descended into: they hold many causes.
    pub fn root_cause(&self) -> &OpError {
        match self {
            OpError::BudgetExhausted { source, .. } => source.root_cause(),
            OpError::FailFast(ff) => ff.error().root_cause(),
            other => other,
        }
    }

    /// Returns the user error carried by the root [`OpError::Fail`], downcast to `E`.
    pub fn downcast_ref<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self.root_cause() {
            OpError::Fail { error } => error.downcast_ref::<E>(),
            _ => None,
        }
    }

    /// `true` if any layer of the chain is a deadline: an attempt timeout, an
    /// operation that reported `DeadlineExceeded`, or a parent that ended on its deadline.
    pub fn is_deadline_exceeded(&self) -> bool {
        self.any(&|e| {
            matches!(
                e,
                OpError::Timeout { .. }
                    | OpError::Context(DoneReason::DeadlineExceeded)
                    | OpError::ParentCancelled {
                        reason: DoneReason::DeadlineExceeded
                    }
            ) || matches!(e, OpError::Aggregate(agg) if agg.aborted_by() == Some(DoneReason::DeadlineExceeded))
        })
    }

    /// `true` if any layer reports an explicit cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.any(&|e| {
            matches!(
                e,
                OpError::Context(DoneReason::Cancelled)
                    | OpError::ParentCancelled {
                        reason: DoneReason::Cancelled
                    }
            ) || matches!(e, OpError::Aggregate(agg) if agg.aborted_by() == Some(DoneReason::Cancelled))
        })
    }

    /// `true` if the chain ends because an enclosing scope ended.
    pub fn is_parent_cancelled(&self) -> bool {
        self.any(&|e| {
            matches!(e, OpError::ParentCancelled { .. })
                || matches!(e, OpError::Aggregate(agg) if agg.aborted_by().is_some())
        })
    }

    /// `true` if any layer is a captured panic.
    pub fn is_crash(&self) -> bool {
        self.any(&|e| matches!(e, OpError::Crash { .. }))
    }

    /// `true` if the outermost layer is a spent retry budget.
    pub fn is_budget_exhausted(&self) -> bool {
        matches!(self, OpError::BudgetExhausted { .. })
    }

    /// Returns the signal that interrupted the chain, if any.
    pub fn interrupt_signal(&self) -> Option<InterruptSignal> {
        match self {
            OpError::Interrupted { signal } => Some(*signal),
            OpError::BudgetExhausted { source, .. } => source.interrupt_signal(),
            OpError::FailFast(ff) => ff.error().interrupt_signal(),
            OpError::Aggregate(agg) => agg.iter().find_map(|f| f.error().interrupt_signal()),
            _ => None,
        }
    }

    fn any(&self, pred: &dyn Fn(&OpError) -> bool) -> bool {
        if pred(self) {
            return true;
        }
        match self {
            OpError::BudgetExhausted { source, .. } => source.any(pred),
            OpError::FailFast(ff) => ff.error().any(pred),
            OpError::Aggregate(agg) => agg.iter().any(|f| f.error().any(pred)),
            _ => false,
        }
    }
}

/// Stable identity of an operation handle.
///
/// Two handles are the same operation only if they point at the same allocation;
/// structurally identical operations are distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpId(usize);

impl OpId {
    /// Returns the identity of `op`.
    pub fn of(op: &OpRef) -> Self {
        OpId(Arc::as_ptr(op) as *const () as usize)
    }
}

/// One failed slot of a collect-all fan-out.
pub struct Failure {
    index: usize,
    op: OpRef,
    error: OpError,
}

impl Failure {
    /// Position of the operation in the fan-out's launch order.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The operation that failed.
    pub fn op(&self) -> &OpRef {
        &self.op
    }

    /// Its terminal error.
    pub fn error(&self) -> &OpError {
        &self.error
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("index", &self.index)
            .field("op", &self.op.name())
            .field("error", &self.error)
            .finish()
    }
}

/// # Failures of a collect-all fan-out.
///
/// Holds an entry only for operations that actually failed, keyed by [`OpId`].
/// When the parent scope ended before every operation finished, the aggregate is
/// empty and [`aborted_by`](Self::aborted_by) carries the parent's reason instead.
#[derive(Debug, Default)]
pub struct AggregateError {
    failures: HashMap<OpId, Failure>,
    aborted_by: Option<DoneReason>,
}

impl AggregateError {
    pub(crate) fn aborted(reason: DoneReason) -> Self {
        Self {
            failures: HashMap::new(),
            aborted_by: Some(reason),
        }
    }

    /// Records a failure. Successful results never reach the aggregate.
    pub(crate) fn insert(&mut self, index: usize, op: OpRef, error: OpError) {
        self.failures
            .insert(OpId::of(&op), Failure { index, op, error });
    }

    /// Number of failed operations.
    pub fn len(&self) -> usize {
        self.failures.len()
    }

    /// `true` if no operation failed.
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Error recorded for `op`, if it failed.
    pub fn get(&self, op: &OpRef) -> Option<&OpError> {
        self.failures.get(&OpId::of(op)).map(Failure::error)
    }

    /// `true` if `op` has a recorded failure.
    pub fn contains(&self, op: &OpRef) -> bool {
        self.failures.contains_key(&OpId::of(op))
    }

    /// The parent's reason, if the parent ended before the fan-out finished.
    pub fn aborted_by(&self) -> Option<DoneReason> {
        self.aborted_by
    }

    /// Failures in launch order.
    pub fn iter(&self) -> impl Iterator<Item = &Failure> {
        let mut v: Vec<&Failure> = self.failures.values().collect();
        v.sort_unstable_by_key(|f| f.index);
        v.into_iter()
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("multiple errors: ")?;
        if let Some(reason) = self.aborted_by {
            return write!(f, "{reason}");
        }
        for (i, failure) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "[{}] {}", failure.op.name(), failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateError {}

/// # First failure of a fail-fast fan-out.
pub struct FailFastError {
    op: OpRef,
    error: Box<OpError>,
}

impl FailFastError {
    pub(crate) fn new(op: OpRef, error: OpError) -> Self {
        Self {
            op,
            error: Box::new(error),
        }
    }

    /// The operation that failed first.
    pub fn op(&self) -> &OpRef {
        &self.op
    }

    /// Its error.
    pub fn error(&self) -> &OpError {
        &self.error
    }
}

impl fmt::Debug for FailFastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailFastError")
            .field("op", &self.op.name())
            .field("error", &self.error)
            .finish()
    }
}

impl fmt::Display for FailFastError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.op.name(), self.error)
    }
}

impl std::error::Error for FailFastError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ops::OpFn;

    fn op(name: &'static str) -> OpRef {
        OpFn::arc(name, |_ctx| async { Ok(()) })
    }

    #[test]
    fn test_budget_exhausted_preserves_cause() {
        let err = OpError::BudgetExhausted {
            attempts: 3,
            source: Box::new(OpError::Timeout {
                timeout: Duration::from_millis(10),
            }),
        };
        assert!(err.is_budget_exhausted());
        assert!(err.is_deadline_exceeded());
        assert!(!err.is_parent_cancelled());
        assert!(matches!(err.root_cause(), OpError::Timeout { .. }));
    }

    #[test]
    fn test_parent_deadline_counts_as_deadline_and_parent() {
        let err = OpError::ParentCancelled {
            reason: DoneReason::DeadlineExceeded,
        };
        assert!(err.is_parent_cancelled());
        assert!(err.is_deadline_exceeded());
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_downcast_through_wrappers() {
        let inner = OpError::fail(std::io::Error::new(std::io::ErrorKind::NotFound, "gone"));
        let err = OpError::BudgetExhausted {
            attempts: 2,
            source: Box::new(inner),
        };
        let io = err.downcast_ref::<std::io::Error>().expect("io error");
        assert_eq!(io.kind(), std::io::ErrorKind::NotFound);
    }

    #[test]
    fn test_aggregate_identity_not_structure() {
        let a = op("same");
        let b = op("same");
        let mut agg = AggregateError::default();
        agg.insert(0, a.clone(), OpError::msg("a failed"));

        assert!(agg.contains(&a));
        assert!(!agg.contains(&b));
        assert_eq!(agg.len(), 1);
        assert_ne!(OpId::of(&a), OpId::of(&b));
    }

    #[test]
    fn test_aggregate_display_in_launch_order() {
        let a = op("a");
        let b = op("b");
        let mut agg = AggregateError::default();
        agg.insert(1, b, OpError::msg("second"));
        agg.insert(0, a, OpError::msg("first"));

        assert_eq!(
            agg.to_string(),
            "multiple errors: [a] execution failed: first, [b] execution failed: second"
        );
    }

    #[test]
    fn test_aborted_aggregate_classification() {
        let err = OpError::Aggregate(AggregateError::aborted(DoneReason::DeadlineExceeded));
        assert!(err.is_parent_cancelled());
        assert!(err.is_deadline_exceeded());
        assert_eq!(err.to_string(), "multiple errors: context deadline exceeded");
    }

    #[test]
    fn test_fail_fast_exposes_source() {
        let a = op("a");
        let err = OpError::FailFast(FailFastError::new(a.clone(), OpError::Crash {
            message: "boom".into(),
        }));
        assert!(err.is_crash());
        let OpError::FailFast(ff) = &err else {
            panic!("expected fail-fast");
        };
        assert!(Arc::ptr_eq(ff.op(), &a));
        assert!(std::error::Error::source(ff).is_some());
    }
}
