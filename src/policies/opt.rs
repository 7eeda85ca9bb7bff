//! # Policy options.
//!
//! [`Opt`] values are applied in sequence on top of [`Policy::default`] by
//! [`Policy::from_opts`]. Later options win:
//!
//! ```text
//! Opt::retry / Opt::repeat / Opt::timeout   → mutually exclusive, each overwrites the drive
//! Opt::recover_panic / Opt::crash_recovery  → overwrite crash handling
//! Opt::handle_signals                       → replaces the watched signal set
//! Opt::publish                              → attaches an event bus
//! ```

use std::time::Duration;

use crate::core::InterruptSignal;
use crate::events::Bus;
use crate::policies::policy::{Attempts, CrashRecovery, DriveMode, Policy};

/// A single policy option.
#[derive(Clone, Debug)]
pub enum Opt {
    /// Retry up to `attempts` times, each attempt bounded by `period`.
    Retry {
        /// Attempt budget.
        attempts: Attempts,
        /// Per-attempt deadline and pass spacing (`0` = none).
        period: Duration,
    },
    /// Like `Retry`, but keeps going after successes too.
    Repeat {
        /// Attempt budget.
        attempts: Attempts,
        /// Per-attempt deadline and pass spacing (`0` = none).
        period: Duration,
    },
    /// Crash handling mode.
    CrashRecovery(CrashRecovery),
    /// Signals that end an attempt (and the run) when observed.
    HandleSignals(Vec<InterruptSignal>),
    /// Event bus to publish attempt and driver events to.
    Publish(Bus),
}

impl Opt {
    /// Retry until the first success, at most `attempts` times.
    ///
    /// Use [`Attempts::FOREVER`] for no limit and `Duration::ZERO` for no time limit.
    pub fn retry(attempts: impl Into<Attempts>, period: Duration) -> Self {
        Opt::Retry {
            attempts: attempts.into(),
            period,
        }
    }

    /// Run exactly `attempts` times whether each attempt fails or succeeds.
    pub fn repeat(attempts: impl Into<Attempts>, period: Duration) -> Self {
        Opt::Repeat {
            attempts: attempts.into(),
            period,
        }
    }

    /// A single attempt bounded by `timeout`. Same as `retry(1, timeout)`.
    pub fn timeout(timeout: Duration) -> Self {
        Opt::retry(1, timeout)
    }

    /// Capture panics of the operation's task as [`OpError::Crash`](crate::OpError::Crash).
    ///
    /// With `continue_retrying = false` a captured panic ends the run.
    ///
    /// ### Limitation
    /// Only the task spawned for the operation is guarded. A panic inside a task the
    /// operation spawns itself is not captured here; the operation must join such tasks
    /// and turn their failures into errors.
    pub fn recover_panic(continue_retrying: bool) -> Self {
        Opt::CrashRecovery(if continue_retrying {
            CrashRecovery::RecoverAndContinue
        } else {
            CrashRecovery::RecoverAndStop
        })
    }

    /// Sets crash handling explicitly (including [`CrashRecovery::Disabled`]).
    pub fn crash_recovery(mode: CrashRecovery) -> Self {
        Opt::CrashRecovery(mode)
    }

    /// Treats `signals` as terminal for the run.
    ///
    /// They are watched from the start of the run until it returns, including the sleeps
    /// between attempts. On unix the process-wide handler that tokio installs stays in
    /// place afterwards, so the default action of those signals is not restored.
    pub fn handle_signals(signals: impl IntoIterator<Item = InterruptSignal>) -> Self {
        Opt::HandleSignals(signals.into_iter().collect())
    }

    /// Publishes events to `bus`.
    pub fn publish(bus: Bus) -> Self {
        Opt::Publish(bus)
    }

    /// Applies this option to `policy`.
    pub fn apply(self, policy: Policy) -> Policy {
        match self {
            Opt::Retry { attempts, period } => {
                policy.with_drive(attempts, period, DriveMode::Retry)
            }
            Opt::Repeat { attempts, period } => {
                policy.with_drive(attempts, period, DriveMode::Repeat)
            }
            Opt::CrashRecovery(mode) => policy.with_crash_recovery(mode),
            Opt::HandleSignals(signals) => policy.with_signals(signals),
            Opt::Publish(bus) => policy.with_bus(bus),
        }
    }
}
