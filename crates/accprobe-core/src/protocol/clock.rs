//! Time source and session context
//!
//! Every wait in the protocol layer (settle delays, retry delays, bulk polls)
//! goes through a [`Clock`] so tests can run the full retry and poll loops
//! without sleeping.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::Span;

/// Source of time and blocking waits
pub trait Clock: Send + Sync {
    /// Block the calling thread for `duration`
    fn sleep(&self, duration: Duration);

    /// Current instant
    fn now(&self) -> Instant;
}

/// Wall clock backed by `std::thread::sleep`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }

    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that never blocks; it records each requested sleep and advances a
/// virtual instant by the same amount.
#[derive(Debug)]
pub struct ManualClock {
    start: Instant,
    inner: Mutex<ManualState>,
}

#[derive(Debug, Default)]
struct ManualState {
    elapsed: Duration,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    /// Create a clock at virtual time zero
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            inner: Mutex::new(ManualState::default()),
        }
    }

    /// All sleeps requested so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    /// Number of sleeps equal to `duration`
    pub fn count_sleeps(&self, duration: Duration) -> usize {
        self.lock().sleeps.iter().filter(|d| **d == duration).count()
    }

    /// Total virtual time slept
    pub fn elapsed(&self) -> Duration {
        self.lock().elapsed
    }

    /// Forget recorded sleeps (virtual time keeps running)
    pub fn reset(&self) {
        self.lock().sleeps.clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualState> {
        // a poisoned lock only means a test panicked mid-sleep; the data is still usable
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Clock for ManualClock {
    fn sleep(&self, duration: Duration) {
        let mut state = self.lock();
        state.elapsed += duration;
        state.sleeps.push(duration);
    }

    fn now(&self) -> Instant {
        self.start + self.lock().elapsed
    }
}

/// Per-session context handed to every protocol component.
///
/// Replaces process-wide logger/clock state: the facade creates one at
/// construction and each component keeps a clone.
#[derive(Clone)]
pub struct SessionContext {
    clock: Arc<dyn Clock>,
    span: Span,
}

impl SessionContext {
    /// Context using the wall clock
    pub fn new(port_name: &str) -> Self {
        Self::with_clock(port_name, Arc::new(SystemClock))
    }

    /// Context with an injected clock
    pub fn with_clock(port_name: &str, clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            span: tracing::info_span!("session", port = %port_name),
        }
    }

    /// The session clock
    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Tracing span all session log lines are recorded under
    pub fn span(&self) -> &Span {
        &self.span
    }

    /// Sleep on the session clock
    pub fn sleep(&self, duration: Duration) {
        self.clock.sleep(duration);
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionContext")
            .field("span", &self.span)
            .finish_non_exhaustive()
    }
}
