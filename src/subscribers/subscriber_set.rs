//! # Non-blocking event fan-out to multiple subscribers.
//!
//! Provides [`SubscriberSet`]: distributes events to multiple subscribers
//! concurrently without blocking the publisher.
//!
//! ## Architecture
//! ```text
//! Bus ──► forward_from() ──► emit(event)
//!                                │
//!                                ├──► [queue 1] ──► worker 1 ──► subscriber1.on_event()
//!                                │    (bounded)         └──────► panic → SubscriberPanicked
//!                                ├──► [queue 2] ──► worker 2 ──► subscriber2.on_event()
//!                                └──► [queue N] ──► worker N ──► subscriberN.on_event()
//! ```
//!
//! ## Rules
//! - **No cross-subscriber ordering**: subscriber A may process event N while B processes N+5
//! - **Overflow**: event dropped for that subscriber only, `SubscriberOverflow` published
//! - **Non-blocking**: `emit()` returns immediately (uses `try_send`)
//! - **Per-subscriber FIFO**: each subscriber sees events in order
//!
//! ## Panic handling
//! Worker tasks use `catch_unwind`: the panic becomes a `SubscriberPanicked` event and the
//! worker moves on to the next event.
//!
//! ## Shutdown
//! [`shutdown`](SubscriberSet::shutdown) stops the forwarders after they drain what the bus
//! already holds, then closes every queue and waits for the workers.

use std::sync::{Arc, Mutex, PoisonError};

use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::runner::panic_message;
use crate::events::{Bus, Event, EventKind};
use crate::subscribers::Subscribe;

/// Per-subscriber channel metadata.
struct SubscriberChannel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Queues shared by the set and its forwarders; workers stop once every holder is gone.
struct Channels {
    list: Vec<SubscriberChannel>,
    bus: Bus,
}

impl Channels {
    fn deliver(&self, event: Arc<Event>) {
        let is_overflow_evt = matches!(event.kind, EventKind::SubscriberOverflow);

        for channel in &self.list {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if !is_overflow_evt {
                self.bus
                    .publish(Event::subscriber_overflow(channel.name, reason));
            }
        }
    }

    /// Delivers what is already buffered in `rx` without waiting for more.
    fn drain(&self, rx: &mut broadcast::Receiver<Event>) {
        loop {
            match rx.try_recv() {
                Ok(ev) => self.deliver(Arc::new(ev)),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }
}

/// Fan-out coordinator for multiple event subscribers.
///
/// - **Concurrent delivery**: events are queued for every subscriber at once
/// - **Isolation**: each subscriber has a dedicated queue and worker
/// - **Overflow handling**: dropped events are reported via `SubscriberOverflow`
pub struct SubscriberSet {
    channels: Arc<Channels>,
    workers: Vec<JoinHandle<()>>,
    forwarders: Mutex<Vec<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl SubscriberSet {
    /// Creates a new set and spawns one worker task per subscriber.
    ///
    /// `bus` receives `SubscriberOverflow` / `SubscriberPanicked` reports.
    #[must_use]
    pub fn new(subs: Vec<Arc<dyn Subscribe>>, bus: Bus) -> Self {
        let mut list = Vec::with_capacity(subs.len());
        let mut workers = Vec::with_capacity(subs.len());

        for sub in subs {
            let name = sub.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(sub.queue_capacity().max(1));
            let reports = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = sub.on_event(ev.as_ref());
                    if let Err(payload) = std::panic::AssertUnwindSafe(fut).catch_unwind().await {
                        reports.publish(Event::subscriber_panicked(name, panic_message(payload)));
                    }
                }
            });
            list.push(SubscriberChannel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels: Arc::new(Channels { list, bus }),
            workers,
            forwarders: Mutex::new(Vec::new()),
            stop: CancellationToken::new(),
        }
    }

    /// Number of subscribers.
    pub fn len(&self) -> usize {
        self.channels.list.len()
    }

    /// `true` if the set has no subscribers.
    pub fn is_empty(&self) -> bool {
        self.channels.list.is_empty()
    }

    /// Emits an event to all subscribers (clones the event).
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Emits a pre-allocated `Arc<Event>` to all subscribers.
    ///
    /// - Uses `try_send` (non-blocking)
    /// - On queue full or closed: drops the event for that subscriber, publishes `SubscriberOverflow`
    /// - Overflow reports are not re-published when they themselves overflow
    pub fn emit_arc(&self, event: Arc<Event>) {
        self.channels.deliver(event);
    }

    /// Forwards every event published on `bus` to this set until the bus closes or the
    /// set shuts down.
    ///
    /// A lagging forwarder reports `SubscriberOverflow` (subscriber `"forwarder"`, reason
    /// `"lagged"`) and keeps going.
    pub fn forward_from(&self, bus: &Bus) {
        let mut rx = bus.subscribe();
        let channels = Arc::clone(&self.channels);
        let stop = self.stop.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = stop.cancelled() => {
                        channels.drain(&mut rx);
                        break;
                    }
                    msg = rx.recv() => match msg {
                        Ok(ev) => channels.deliver(Arc::new(ev)),
                        Err(broadcast::error::RecvError::Lagged(_)) => {
                            channels
                                .bus
                                .publish(Event::subscriber_overflow("forwarder", "lagged"));
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });
        self.forwarders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle);
    }

    /// Gracefully shuts down forwarders and subscriber workers.
    ///
    /// 1. Stops forwarders (each drains events already buffered in its receiver).
    /// 2. Drops the queues (workers see channel closed).
    /// 3. Awaits all worker tasks.
    pub async fn shutdown(self) {
        self.stop.cancel();
        let forwarders = std::mem::take(
            &mut *self.forwarders.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for h in forwarders {
            let _ = h.await;
        }

        drop(self.channels);
        for h in self.workers {
            let _ = h.await;
        }
    }
}
