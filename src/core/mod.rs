//! Runtime core: scopes, supervised attempts, retry driving and fan-out.
//!
//! Internal modules:
//! - [`context`]: cancellation scopes with deadlines and a recorded end reason;
//! - [`signals`]: process signal subscription for the lifetime of one attempt;
//! - [`runner`]: executes one attempt under a child scope and classifies the outcome;
//! - [`driver`]: the retry/repeat loop around [`runner`];
//! - [`fanout`]: concurrent combinators over several operations.

mod context;
mod driver;
mod fanout;
pub(crate) mod runner;
mod signals;

pub use context::{Context, ContextGuard};
pub use driver::{Retry, timeout, wrap, wrap_fn};
pub use fanout::{Aggregation, Multi, all, fail_fast};
pub use signals::InterruptSignal;
