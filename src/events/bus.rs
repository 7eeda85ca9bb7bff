//! # Bus: broadcast channel for events.
//!
//! [`Bus`] wraps [`tokio::sync::broadcast`]. Supervised attempts, retry drivers and
//! fan-outs publish into it when a policy or combinator was given one.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                        Listener (one per SubscriberSet):
//!   run_once  ──┐
//!   Retry     ──┼──────► Bus ───────► SubscriberSet::forward_from ────► subscribers
//!   Multi     ──┘  (broadcast chan)
//! ```
//!
//! ## Semantics
//! - `publish()` is synchronous and never waits on receivers.
//! - All receivers share one ring buffer of `capacity` events.
//! - A receiver that falls behind observes `RecvError::Lagged(n)` and loses the `n` oldest events.
//! - Events published while nobody is subscribed are discarded.

use tokio::sync::broadcast;

use super::event::Event;

/// Event broadcast handle. Clones publish into the same channel.
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
}

impl Default for Bus {
    /// Bus with capacity 1024.
    fn default() -> Self {
        Self::new(1024)
    }
}

impl Bus {
    /// Creates a bus buffering up to `capacity` events (at least 1) for all receivers together.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publishes an event to all active receivers.
    ///
    /// If there are no receivers, the event is dropped.
    pub fn publish(&self, ev: Event) {
        let _ = self.tx.send(ev);
    }

    /// Returns a receiver for events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}
