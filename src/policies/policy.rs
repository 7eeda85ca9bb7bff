//! # Policy governing one supervised run.
//!
//! [`Policy`] bundles:
//! - attempt budget ([`Attempts`])
//! - period: per-attempt deadline **and** pass spacing (`0` = neither)
//! - drive mode ([`DriveMode`])
//! - crash handling ([`CrashRecovery`])
//! - signals treated as terminal
//! - optional event [`Bus`]
//!
//! It is created with [`Policy::default`] / [`Policy::from_opts`] and only read while a run
//! is in flight. Each wrapped operation holds its own copy.
//!
//! ## Sentinel values
//! - `period = 0s` → no per-attempt deadline and no sleep between attempts
//! - `Attempts::Forever` → no attempt limit
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use retryvisor::{Attempts, DriveMode, Opt, Policy};
//!
//! let policy = Policy::from_opts([Opt::retry(3, Duration::from_millis(100))]);
//! assert_eq!(policy.attempts(), Attempts::Limited(3));
//! assert_eq!(policy.mode(), DriveMode::Retry);
//! assert_eq!(policy.deadline(), Some(Duration::from_millis(100)));
//!
//! // The default policy does effectively nothing: one attempt, no deadline.
//! let plain = Policy::default();
//! assert_eq!(plain.attempts(), Attempts::Limited(1));
//! assert_eq!(plain.deadline(), None);
//! ```

use std::time::Duration;

use crate::core::InterruptSignal;
use crate::events::{Bus, Event};
use crate::policies::opt::Opt;

/// Attempt budget of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Attempts {
    /// At most `n` attempts (`n >= 1`).
    Limited(u32),
    /// Keep going until a terminal outcome.
    Forever,
}

impl Attempts {
    /// Unbounded attempts.
    pub const FOREVER: Attempts = Attempts::Forever;

    /// Returns `true` if another attempt may start after `made` attempts.
    #[inline]
    pub fn allows(&self, made: u64) -> bool {
        match self {
            Attempts::Limited(n) => made < u64::from(*n),
            Attempts::Forever => true,
        }
    }

    /// Clamps a limited budget to at least one attempt.
    #[inline]
    pub(crate) fn clamped(self) -> Self {
        match self {
            Attempts::Limited(n) => Attempts::Limited(n.max(1)),
            Attempts::Forever => Attempts::Forever,
        }
    }
}

impl Default for Attempts {
    /// A single attempt.
    fn default() -> Self {
        Attempts::Limited(1)
    }
}

impl From<u32> for Attempts {
    fn from(n: u32) -> Self {
        Attempts::Limited(n)
    }
}

/// Whether a successful attempt ends the run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DriveMode {
    /// Stop on the first success (default).
    #[default]
    Retry,
    /// Run the whole attempt budget regardless of per-attempt outcome.
    Repeat,
}

/// What to do when an operation's task panics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CrashRecovery {
    /// Do not capture panics; they propagate to the caller (default).
    #[default]
    Disabled,
    /// Capture the panic as [`OpError::Crash`](crate::OpError::Crash) and keep retrying.
    RecoverAndContinue,
    /// Capture the panic and end the run with it.
    RecoverAndStop,
}

impl CrashRecovery {
    /// Returns `true` if panics are captured.
    #[inline]
    pub fn recovers(&self) -> bool {
        !matches!(self, CrashRecovery::Disabled)
    }
}

/// Policy for one supervised run.
#[derive(Clone, Debug, Default)]
pub struct Policy {
    attempts: Attempts,
    period: Duration,
    mode: DriveMode,
    crash: CrashRecovery,
    signals: Vec<InterruptSignal>,
    bus: Option<Bus>,
}

impl Policy {
    /// Applies `opts` in order on top of [`Policy::default`].
    pub fn from_opts(opts: impl IntoIterator<Item = Opt>) -> Self {
        opts.into_iter()
            .fold(Policy::default(), |policy, opt| opt.apply(policy))
    }

    /// Returns the attempt budget.
    pub fn attempts(&self) -> Attempts {
        self.attempts
    }

    /// Returns the raw period (`0` = none).
    pub fn period(&self) -> Duration {
        self.period
    }

    /// Returns the per-attempt deadline, `None` when the period is zero.
    #[inline]
    pub fn deadline(&self) -> Option<Duration> {
        (!self.period.is_zero()).then_some(self.period)
    }

    /// Returns the drive mode.
    pub fn mode(&self) -> DriveMode {
        self.mode
    }

    /// Returns the crash handling mode.
    pub fn crash_recovery(&self) -> CrashRecovery {
        self.crash
    }

    /// Returns the signals treated as terminal.
    pub fn signals(&self) -> &[InterruptSignal] {
        &self.signals
    }

    /// Returns the event bus, if any.
    pub fn bus(&self) -> Option<&Bus> {
        self.bus.as_ref()
    }

    /// Returns a new policy with the given budget, period and mode.
    pub fn with_drive(mut self, attempts: Attempts, period: Duration, mode: DriveMode) -> Self {
        self.attempts = attempts.clamped();
        self.period = period;
        self.mode = mode;
        self
    }

    /// Returns a new policy with updated crash handling.
    pub fn with_crash_recovery(mut self, crash: CrashRecovery) -> Self {
        self.crash = crash;
        self
    }

    /// Returns a new policy watching `signals` (replaces any previous set).
    pub fn with_signals(mut self, signals: Vec<InterruptSignal>) -> Self {
        self.signals = signals;
        self
    }

    /// Returns a new policy publishing events to `bus`.
    pub fn with_bus(mut self, bus: Bus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Publishes `ev` if a bus is configured.
    #[inline]
    pub(crate) fn publish(&self, ev: impl FnOnce() -> Event) {
        if let Some(bus) = &self.bus {
            bus.publish(ev());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_single_attempt_without_deadline() {
        let p = Policy::default();
        assert_eq!(p.attempts(), Attempts::Limited(1));
        assert_eq!(p.deadline(), None);
        assert_eq!(p.mode(), DriveMode::Retry);
        assert_eq!(p.crash_recovery(), CrashRecovery::Disabled);
        assert!(p.signals().is_empty());
        assert!(p.bus().is_none());
    }

    #[test]
    fn test_zero_attempts_clamped() {
        let p = Policy::default().with_drive(Attempts::Limited(0), Duration::ZERO, DriveMode::Retry);
        assert_eq!(p.attempts(), Attempts::Limited(1));
    }

    #[test]
    fn test_attempts_allows() {
        assert!(Attempts::Limited(2).allows(1));
        assert!(!Attempts::Limited(2).allows(2));
        assert!(Attempts::FOREVER.allows(u64::MAX));
    }

    #[test]
    fn test_default_is_copied_not_shared() {
        let base = Policy::default();
        let changed = base.clone().with_crash_recovery(CrashRecovery::RecoverAndStop);
        assert_eq!(base.crash_recovery(), CrashRecovery::Disabled);
        assert_eq!(changed.crash_recovery(), CrashRecovery::RecoverAndStop);
    }
}
