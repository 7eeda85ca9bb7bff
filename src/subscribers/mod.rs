//! # Event subscribers.
//!
//! This module provides the [`Subscribe`] trait, the [`SubscriberSet`] that drives
//! subscribers from a [`Bus`](crate::events::Bus), and built-in implementations.
//!
//! ## Architecture
//! ```text
//! Retry / Multi / run_once ── publish(Event) ──► Bus
//!                                                 │
//!                              SubscriberSet::forward_from(&bus)
//!                                                 │
//!                                   ┌─────────────┼─────────────┐
//!                                   ▼             ▼             ▼
//!                               LogWriter      Metrics       Custom ...
//! ```
//!
//! ## Wiring
//! ```rust
//! use std::sync::Arc;
//! use retryvisor::{Bus, Opt, Subscribe, SubscriberSet};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let bus = Bus::default();
//! let subs: Vec<Arc<dyn Subscribe>> = Vec::new();
//! let set = SubscriberSet::new(subs, bus.clone());
//! set.forward_from(&bus);
//!
//! let _opt = Opt::publish(bus);
//! // ... wrap operations with `_opt` and run them ...
//! set.shutdown().await;
//! # }
//! ```

#[cfg(feature = "logging")]
mod embedded;
mod subscriber;
mod subscriber_set;

#[cfg(feature = "logging")]
pub use embedded::LogWriter;
pub use subscriber::Subscribe;
pub use subscriber_set::SubscriberSet;
