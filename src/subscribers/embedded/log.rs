//! # LogWriter: simple event printer
//!
//! A minimal subscriber that prints incoming [`Event`]s to stdout.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [attempt] op="fetch" attempt=1 timeout=Some(200ms)
//! [failed] op="fetch" err="execution failed: connection refused" attempt=1
//! [retry] op="fetch" delay=180ms after_attempt=1 err="execution failed: connection refused"
//! [timeout] op="fetch" attempt=2 timeout=200ms
//! [exhausted] op="fetch" attempts=3 err="attempt timed out after 200ms"
//! [fan-out] op="all" count=3
//! [fan-out-failed] op="all" failures=1 err="multiple errors: [fetch] ..."
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let op = e.op.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::AttemptStarting => {
                println!("[attempt] op={op:?} attempt={:?} timeout={:?}", e.attempt, e.timeout);
            }
            EventKind::AttemptSucceeded => {
                println!("[succeeded] op={op:?} attempt={:?}", e.attempt);
            }
            EventKind::AttemptFailed => {
                println!("[failed] op={op:?} err={:?} attempt={:?}", e.error, e.attempt);
            }
            EventKind::TimeoutHit => {
                println!("[timeout] op={op:?} attempt={:?} timeout={:?}", e.attempt, e.timeout);
            }
            EventKind::CrashCaptured => {
                println!("[crash] op={op:?} attempt={:?} info={:?}", e.attempt, e.error);
            }
            EventKind::InterruptReceived => {
                println!("[interrupted] op={op:?} signal={:?}", e.signal);
            }
            EventKind::ParentCancelled => {
                println!("[parent-done] op={op:?} attempt={:?} reason={:?}", e.attempt, e.error);
            }
            EventKind::RetryScheduled => {
                println!(
                    "[retry] op={op:?} delay={:?} after_attempt={:?} err={:?}",
                    e.delay, e.attempt, e.error
                );
            }
            EventKind::BudgetExhausted => {
                println!("[exhausted] op={op:?} attempts={:?} err={:?}", e.attempt, e.error);
            }
            EventKind::FanOutStarted => {
                println!("[fan-out] op={op:?} count={:?}", e.count);
            }
            EventKind::FanOutCompleted => {
                println!("[fan-out-completed] op={op:?} count={:?}", e.count);
            }
            EventKind::FanOutFailed => {
                println!("[fan-out-failed] op={op:?} failures={:?} err={:?}", e.count, e.error);
            }
            EventKind::FanOutAborted => {
                println!("[fan-out-aborted] op={op:?} reason={:?}", e.error);
            }
            EventKind::SubscriberOverflow => {
                println!("[subscriber-overflow] subscriber={op:?} reason={:?}", e.error);
            }
            EventKind::SubscriberPanicked => {
                println!(
                    "[subscriber-panicked] subscriber={op} info={}",
                    e.error.as_deref().unwrap_or("unknown"),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "LogWriter"
    }
}
