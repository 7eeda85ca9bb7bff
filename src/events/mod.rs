//! Runtime events: types and broadcast bus.
//!
//! This module groups the event **data model** and the **bus** used to
//! publish/subscribe to events emitted while operations are supervised.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `runner::run_once`, `Retry`, `Multi` (only when a bus is configured),
//!   `SubscriberSet` workers (overflow/panic).
//! - **Consumers**: `SubscriberSet::forward_from` fans events out to subscribers.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
