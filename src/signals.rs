//! Shared one-shot boolean latches.
//!
//! A [`Signal`] has three operations: `set` (idempotent, wakes every waiter),
//! `clear`, and `wait` (blocks until set, returns at once when already set).
//! Workers only ever call [`Signal::is_set`] inside their hot loop; the
//! blocking [`Signal::wait`] is reserved for start-up.
//!
//! [`SignalSet`] is the fixed vocabulary of the trial state machine. It is
//! passed by value (cheap `Arc` clones) into each worker's constructor, so a
//! worker can be unit-tested against a set the test controls.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct Latch {
    raised: bool,
    // Number of false -> true transitions.
    generation: u64,
}

/// A named boolean latch shared between the controller and the workers.
#[derive(Clone, Debug)]
pub struct Signal {
    name: &'static str,
    inner: Arc<(Mutex<Latch>, Condvar)>,
}

impl Signal {
    /// New cleared signal.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            inner: Arc::new((Mutex::new(Latch::default()), Condvar::new())),
        }
    }

    /// Signal name, for logging.
    pub fn name(&self) -> &'static str {
        self.name
    }

    fn latch(&self) -> MutexGuard<'_, Latch> {
        // A panicking holder cannot leave the latch half-updated.
        self.inner.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Raise the latch. Waking happens only on a real transition.
    pub fn set(&self) {
        let mut latch = self.latch();
        if !latch.raised {
            latch.raised = true;
            latch.generation += 1;
            self.inner.1.notify_all();
            tracing::trace!(signal = self.name, "set");
        }
    }

    /// Lower the latch.
    pub fn clear(&self) {
        let mut latch = self.latch();
        if latch.raised {
            latch.raised = false;
            tracing::trace!(signal = self.name, "cleared");
        }
    }

    /// Non-blocking poll.
    pub fn is_set(&self) -> bool {
        self.latch().raised
    }

    /// Block until the latch is raised.
    pub fn wait(&self) {
        let mut latch = self.latch();
        while !latch.raised {
            latch = self
                .inner
                .1
                .wait(latch)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Block until the latch is raised or `timeout` elapses. Returns the final state.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let latch = self.latch();
        let (latch, _) = self
            .inner
            .1
            .wait_timeout_while(latch, timeout, |l| !l.raised)
            .unwrap_or_else(PoisonError::into_inner);
        latch.raised
    }

    /// How many times the latch went from cleared to raised.
    pub fn generation(&self) -> u64 {
        self.latch().generation
    }
}

/// The fixed set of signals every worker observes.
#[derive(Clone, Debug)]
pub struct SignalSet {
    /// Setup parameters have been published on every setup channel.
    pub setup_done: Signal,
    /// A trial is being recorded.
    pub recording: Signal,
    /// The current trial must be flushed and closed.
    pub stop: Signal,
    /// The force/torque sensor should be re-biased when no trial is active.
    pub bias_request: Signal,
    /// The next trial file is a re-take of the current trial.
    pub repeat: Signal,
    /// Toggle the camera preview window.
    pub preview: Signal,
    /// Session-wide shutdown.
    pub shutdown: Signal,
}

impl SignalSet {
    /// All signals cleared.
    pub fn new() -> Self {
        Self {
            setup_done: Signal::new("setup-done"),
            recording: Signal::new("recording"),
            stop: Signal::new("stop"),
            bias_request: Signal::new("bias-request"),
            repeat: Signal::new("repeat"),
            preview: Signal::new("preview"),
            shutdown: Signal::new("shutdown"),
        }
    }

    /// `recording` asserted and `stop` not asserted.
    pub fn trial_active(&self) -> bool {
        self.recording.is_set() && !self.stop.is_set()
    }
}

impl Default for SignalSet {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn test_set_is_idempotent() {
        let signal = Signal::new("test");
        signal.set();
        signal.set();
        assert!(signal.is_set());
        assert_eq!(signal.generation(), 1);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let signal = Signal::new("test");
        signal.clear();
        assert!(!signal.is_set());
        signal.set();
        signal.clear();
        signal.clear();
        assert!(!signal.is_set());
        assert_eq!(signal.generation(), 1);
    }

    #[test]
    fn test_wait_returns_immediately_when_set() {
        let signal = Signal::new("test");
        signal.set();
        let start = Instant::now();
        signal.wait();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[test]
    fn test_wait_wakes_on_set_from_other_thread() {
        let signal = Signal::new("test");
        let setter = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            setter.set();
        });
        signal.wait();
        assert!(signal.is_set());
        handle.join().unwrap();
    }

    #[test]
    fn test_wait_timeout_expires() {
        let signal = Signal::new("test");
        assert!(!signal.wait_timeout(Duration::from_millis(10)));
        signal.set();
        assert!(signal.wait_timeout(Duration::from_millis(10)));
    }

    #[test]
    fn test_clones_share_state() {
        let signals = SignalSet::new();
        let worker_view = signals.clone();
        signals.recording.set();
        assert!(worker_view.trial_active());
        signals.stop.set();
        assert!(!worker_view.trial_active());
    }
}
