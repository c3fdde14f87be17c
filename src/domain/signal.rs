//! Completion signals used to rendezvous with asynchronous collaborator callbacks.
//!
//! A [`CompletionSignal`] is a binary wait/notify slot guarded by a mutex and a
//! condition variable. The worker arms (resets) a signal right before invoking a
//! collaborator, then blocks on it with a deadline. Callback threads post
//! success or failure into the slot. Posting twice does not count twice, and a
//! post that arrives before the wait starts is not lost.

use parking_lot::{Condvar, Mutex};
use std::fmt;
use std::time::{Duration, Instant};

/// Identifies one of the four per-context completion signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// The app reported that a requested container state took effect.
    AppReady,
    /// The runtime reported the container started.
    AppRunning,
    /// The runtime reported the container exited.
    AppTerminating,
    /// The window manager reported the first rendered frame.
    FirstFrame,
}

impl SignalKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppReady => "app_ready",
            Self::AppRunning => "app_running",
            Self::AppTerminating => "app_terminating",
            Self::FirstFrame => "first_frame",
        }
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of waiting on a [`CompletionSignal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignalOutcome {
    /// The collaborator confirmed the action.
    Posted,
    /// The collaborator reported a failure while the action was pending.
    Failed(String),
    /// No confirmation arrived before the deadline.
    TimedOut,
}

/// Binary completion signal with timed waits.
pub struct CompletionSignal {
    kind: SignalKind,
    slot: Mutex<Option<Result<(), String>>>,
    cond: Condvar,
}

impl CompletionSignal {
    #[must_use]
    pub fn new(kind: SignalKind) -> Self {
        Self {
            kind,
            slot: Mutex::new(None),
            cond: Condvar::new(),
        }
    }

    #[must_use]
    pub const fn kind(&self) -> SignalKind {
        self.kind
    }

    /// Posts success. A pending failure is kept.
    pub fn post(&self) {
        let mut slot = self.slot.lock();
        if slot.is_none() {
            *slot = Some(Ok(()));
        }
        drop(slot);
        self.cond.notify_all();
    }

    /// Posts a failure, replacing any pending success.
    pub fn fail(&self, reason: impl Into<String>) {
        *self.slot.lock() = Some(Err(reason.into()));
        self.cond.notify_all();
    }

    /// Clears the slot. Returns `true` if a stale post was discarded.
    pub fn reset(&self) -> bool {
        self.slot.lock().take().is_some()
    }

    #[must_use]
    pub fn is_posted(&self) -> bool {
        self.slot.lock().is_some()
    }

    /// Blocks until the signal is posted or `timeout` elapses, consuming the post.
    pub fn wait(&self, timeout: Duration) -> SignalOutcome {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        while slot.is_none() {
            if self.cond.wait_until(&mut slot, deadline).timed_out() {
                break;
            }
        }
        match slot.take() {
            Some(Ok(())) => SignalOutcome::Posted,
            Some(Err(reason)) => SignalOutcome::Failed(reason),
            None => SignalOutcome::TimedOut,
        }
    }
}

impl fmt::Debug for CompletionSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionSignal")
            .field("kind", &self.kind)
            .field("posted", &self.is_posted())
            .finish()
    }
}

/// The four completion signals owned by one application context.
#[derive(Debug)]
pub struct CompletionSignals {
    app_ready: CompletionSignal,
    app_running: CompletionSignal,
    app_terminating: CompletionSignal,
    first_frame: CompletionSignal,
}

impl Default for CompletionSignals {
    fn default() -> Self {
        Self {
            app_ready: CompletionSignal::new(SignalKind::AppReady),
            app_running: CompletionSignal::new(SignalKind::AppRunning),
            app_terminating: CompletionSignal::new(SignalKind::AppTerminating),
            first_frame: CompletionSignal::new(SignalKind::FirstFrame),
        }
    }
}

impl CompletionSignals {
    #[must_use]
    pub const fn get(&self, kind: SignalKind) -> &CompletionSignal {
        match kind {
            SignalKind::AppReady => &self.app_ready,
            SignalKind::AppRunning => &self.app_running,
            SignalKind::AppTerminating => &self.app_terminating,
            SignalKind::FirstFrame => &self.first_frame,
        }
    }

    /// Discards every pending post. Returns how many were discarded.
    pub fn drain(&self) -> usize {
        [
            &self.app_ready,
            &self.app_running,
            &self.app_terminating,
            &self.first_frame,
        ]
        .into_iter()
        .filter(|signal| signal.reset())
        .count()
    }
}
