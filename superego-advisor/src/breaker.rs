//! Consecutive-failure circuit breaker.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Breaker state as exposed to health reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BreakerState {
    /// Calls flow through normally.
    Closed,
    /// Calls short-circuit until the cooldown elapses.
    Open,
    /// One probe call is in flight; others short-circuit.
    HalfOpen,
}

impl BreakerState {
    /// Returns the wire spelling of the state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

#[derive(Debug)]
enum Inner {
    Closed { consecutive_failures: u32 },
    Open { since: Instant },
    HalfOpen,
}

/// Point-in-time view of the breaker for health reporting.
#[derive(Clone, Copy, Debug)]
pub struct BreakerSnapshot {
    /// Current state.
    pub state: BreakerState,
    /// Total calls admitted through the breaker.
    pub total_calls: u64,
    /// Total admitted calls that failed.
    pub total_failures: u64,
}

impl BreakerSnapshot {
    /// Fraction of admitted calls that failed, in `[0, 1]`.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn error_rate(&self) -> f64 {
        if self.total_calls == 0 {
            0.0
        } else {
            self.total_failures as f64 / self.total_calls as f64
        }
    }
}

#[derive(Debug)]
struct Counters {
    state: Inner,
    total_calls: u64,
    total_failures: u64,
}

/// Mutex-guarded consecutive-failure breaker.
///
/// After `open_threshold` consecutive failures the breaker opens and
/// short-circuits every call for `cooldown`. The first call after the
/// cooldown is admitted as a half-open probe: success closes the breaker,
/// failure re-opens it.
#[derive(Debug)]
pub struct CircuitBreaker {
    counters: Mutex<Counters>,
    open_threshold: u32,
    cooldown: Duration,
}

impl CircuitBreaker {
    /// Creates a breaker with the supplied threshold and cooldown.
    #[must_use]
    pub fn new(open_threshold: u32, cooldown: Duration) -> Self {
        Self {
            counters: Mutex::new(Counters {
                state: Inner::Closed {
                    consecutive_failures: 0,
                },
                total_calls: 0,
                total_failures: 0,
            }),
            open_threshold: open_threshold.max(1),
            cooldown,
        }
    }

    /// Asks the breaker to admit a call. Returns `false` when the call must
    /// short-circuit. An admitted call must be followed by exactly one
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    #[must_use]
    pub fn try_acquire(&self) -> bool {
        let mut counters = self.counters.lock().expect("breaker poisoned");
        let admitted = match counters.state {
            Inner::Closed { .. } => true,
            Inner::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    counters.state = Inner::HalfOpen;
                    true
                } else {
                    false
                }
            }
            // A probe is already in flight.
            Inner::HalfOpen => false,
        };
        if admitted {
            counters.total_calls += 1;
        }
        admitted
    }

    /// Records a successful admitted call.
    pub fn record_success(&self) {
        let mut counters = self.counters.lock().expect("breaker poisoned");
        counters.state = Inner::Closed {
            consecutive_failures: 0,
        };
    }

    /// Records a failed admitted call.
    pub fn record_failure(&self) {
        let mut counters = self.counters.lock().expect("breaker poisoned");
        counters.total_failures += 1;
        counters.state = match counters.state {
            Inner::Closed {
                consecutive_failures,
            } => {
                let failures = consecutive_failures + 1;
                if failures >= self.open_threshold {
                    Inner::Open {
                        since: Instant::now(),
                    }
                } else {
                    Inner::Closed {
                        consecutive_failures: failures,
                    }
                }
            }
            Inner::HalfOpen | Inner::Open { .. } => Inner::Open {
                since: Instant::now(),
            },
        };
    }

    /// Returns a point-in-time view for health reporting.
    #[must_use]
    pub fn snapshot(&self) -> BreakerSnapshot {
        let counters = self.counters.lock().expect("breaker poisoned");
        let state = match counters.state {
            Inner::Closed { .. } => BreakerState::Closed,
            Inner::Open { since } if since.elapsed() < self.cooldown => BreakerState::Open,
            // Cooldown elapsed; the next call will probe.
            Inner::Open { .. } | Inner::HalfOpen => BreakerState::HalfOpen,
        };
        BreakerSnapshot {
            state,
            total_calls: counters.total_calls,
            total_failures: counters.total_failures,
        }
    }
}
