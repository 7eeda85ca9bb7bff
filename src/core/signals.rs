//! # Process signal watching for one driver run.
//!
//! [`InterruptSignal`] names the signals a [`Policy`](crate::Policy) may treat as terminal.
//! [`SignalWatch`] is subscribed when a run starts, consulted by every attempt and by the
//! sleeps between attempts, and dropped when the run ends.
//!
//! ## Limitation
//! tokio installs a process-wide handler the first time a signal kind is watched and
//! never removes it. Dropping the watch stops delivery to this crate, but the default
//! action (for example, terminating on `SIGINT`) is not restored. After a run that
//! watched `SIGINT`, Ctrl-C no longer kills the process on its own.
//!
//! ## Signals
//! **Unix platforms:** `SIGINT`, `SIGTERM`, `SIGQUIT`, `SIGHUP`, `SIGUSR1`, `SIGUSR2`.
//!
//! **Windows platforms:** only [`InterruptSignal::Interrupt`] (Ctrl-C via
//! [`tokio::signal::ctrl_c`]); the others fail with `ErrorKind::Unsupported`.

use std::fmt;
use std::io;

#[cfg(unix)]
use futures::future::select_all;

/// A process signal that ends an attempt when observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InterruptSignal {
    /// `SIGINT` (Ctrl-C).
    Interrupt,
    /// `SIGTERM`.
    Terminate,
    /// `SIGQUIT`.
    Quit,
    /// `SIGHUP`.
    Hangup,
    /// `SIGUSR1`.
    User1,
    /// `SIGUSR2`.
    User2,
}

impl InterruptSignal {
    /// Conventional signal name.
    pub fn as_str(&self) -> &'static str {
        match self {
            InterruptSignal::Interrupt => "SIGINT",
            InterruptSignal::Terminate => "SIGTERM",
            InterruptSignal::Quit => "SIGQUIT",
            InterruptSignal::Hangup => "SIGHUP",
            InterruptSignal::User1 => "SIGUSR1",
            InterruptSignal::User2 => "SIGUSR2",
        }
    }

    #[cfg(unix)]
    fn kind(&self) -> tokio::signal::unix::SignalKind {
        use tokio::signal::unix::SignalKind;

        match self {
            InterruptSignal::Interrupt => SignalKind::interrupt(),
            InterruptSignal::Terminate => SignalKind::terminate(),
            InterruptSignal::Quit => SignalKind::quit(),
            InterruptSignal::Hangup => SignalKind::hangup(),
            InterruptSignal::User1 => SignalKind::user_defined1(),
            InterruptSignal::User2 => SignalKind::user_defined2(),
        }
    }
}

impl fmt::Display for InterruptSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Active subscription to a set of signals.
///
/// Each watch owns independent listeners. Dropping it stops delivery to the watch; the
/// process-wide handler stays installed.
pub(crate) struct SignalWatch {
    #[cfg(unix)]
    streams: Vec<(InterruptSignal, tokio::signal::unix::Signal)>,
    #[cfg(not(unix))]
    ctrl_c: bool,
}

impl SignalWatch {
    /// Subscribes to every signal in `signals`.
    #[cfg(unix)]
    pub(crate) fn subscribe(signals: &[InterruptSignal]) -> io::Result<Self> {
        let mut streams = Vec::with_capacity(signals.len());
        for sig in signals {
            streams.push((*sig, tokio::signal::unix::signal(sig.kind())?));
        }
        Ok(Self { streams })
    }

    /// Subscribes to every signal in `signals`.
    #[cfg(not(unix))]
    pub(crate) fn subscribe(signals: &[InterruptSignal]) -> io::Result<Self> {
        if let Some(sig) = signals.iter().find(|s| **s != InterruptSignal::Interrupt) {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("{sig} is not supported on this platform"),
            ));
        }
        Ok(Self {
            ctrl_c: !signals.is_empty(),
        })
    }

    /// Completes with the first signal received. Never completes for an empty watch.
    #[cfg(unix)]
    pub(crate) async fn recv(&mut self) -> InterruptSignal {
        if self.streams.is_empty() {
            return std::future::pending().await;
        }
        let futs = self.streams.iter_mut().map(|(sig, stream)| {
            let sig = *sig;
            Box::pin(async move { stream.recv().await.map(|_| sig) })
        });
        match select_all(futs).await {
            (Some(sig), _, _) => sig,
            // Stream closed by the driver; nothing more can arrive on it.
            (None, _, _) => std::future::pending().await,
        }
    }

    /// Completes with the first signal received. Never completes for an empty watch.
    #[cfg(not(unix))]
    pub(crate) async fn recv(&mut self) -> InterruptSignal {
        if !self.ctrl_c {
            return std::future::pending().await;
        }
        match tokio::signal::ctrl_c().await {
            Ok(()) => InterruptSignal::Interrupt,
            Err(_) => std::future::pending().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signal_names() {
        assert_eq!(InterruptSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(InterruptSignal::User2.as_str(), "SIGUSR2");
    }

    #[tokio::test]
    async fn test_empty_watch_never_fires() {
        let mut watch = SignalWatch::subscribe(&[]).expect("empty subscription");
        let res =
            tokio::time::timeout(std::time::Duration::from_millis(20), watch.recv()).await;
        assert!(res.is_err());
    }
}
