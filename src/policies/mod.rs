//! Retry, repeat and timeout policies.
//!
//! This module groups the knobs that control **how many** attempts run, **how long**
//! each may take, and what counts as terminal.
//!
//! ## Contents
//! - [`Policy`] the immutable per-run configuration
//! - [`Opt`] options applied in order to build a policy
//! - [`Attempts`], [`DriveMode`], [`CrashRecovery`] policy fields
//!
//! ## Quick wiring
//! ```text
//! wrap(op, [Opt::retry(n, period), Opt::recover_panic(true)])
//!      └─► Policy::from_opts(..) ─► Retry { op, policy }
//!           - attempts/mode decide continue/exit
//!           - period bounds each attempt and spaces passes
//!           - crash/signals shape run_once's race
//! ```
//!
//! ## Defaults
//! - one attempt, no deadline, `DriveMode::Retry`
//! - `CrashRecovery::Disabled`, no signals, no bus

mod opt;
mod policy;

pub use opt::Opt;
pub use policy::{Attempts, CrashRecovery, DriveMode, Policy};
