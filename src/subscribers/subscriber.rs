//! # Subscribe: observer hook for attempt and fan-out events.
//!
//! [`Subscribe`] is how callers watch wrapped operations and fan-outs from the side.
//! A subscriber only ever sees [`Event`]s after they happened; it cannot change the
//! outcome of a run.
//!
//! ## Delivery model
//! ```text
//! SubscriberSet ──► own mpsc queue ──► own worker ──► on_event(&Event)
//!                                                └─► panic → SubscriberPanicked report
//! ```
//!
//! ## Guarantees
//! - One subscriber being slow fills only its own queue.
//! - A full queue loses the event for that subscriber alone and emits a
//!   `SubscriberOverflow` report.
//! - `on_event` calls for one subscriber never overlap and keep publication order.
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use retryvisor::{Event, EventKind, Subscribe};
//!
//! struct Failures;
//!
//! #[async_trait]
//! impl Subscribe for Failures {
//!     async fn on_event(&self, ev: &Event) {
//!         if matches!(ev.kind, EventKind::AttemptFailed | EventKind::BudgetExhausted) {
//!             // export a metric, page someone, etc.
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str { "failures" }
//!     fn queue_capacity(&self) -> usize { 256 }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Receives events from a [`SubscriberSet`](crate::SubscriberSet).
///
/// Keep `on_event` non-blocking (async I/O only) and deal with failures inside it;
/// a panic is contained but the event is lost for this subscriber.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    /// Handles one event on this subscriber's worker task.
    async fn on_event(&self, event: &Event);

    /// Returns the subscriber name used in overflow/panic events.
    ///
    /// The default uses `type_name::<Self>()`, which can be verbose; override it when possible.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Returns the preferred queue capacity for this subscriber (clamped to at least 1).
    ///
    /// Default: 1024.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
