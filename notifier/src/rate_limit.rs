//! Sliding-window rate limiting for outbound notifications.
//!
//! The limiter remembers the instant of every admitted notification and
//! refuses a new one while `max` admissions are younger than `window`.
//! A refused notification is dropped by the caller; nothing is queued or
//! retried.
//!
//! # Algorithm
//!
//! - Timestamps whose age is at least `window` are pruned first
//! - If fewer than `max` remain, the current instant is recorded and the
//!   call is admitted
//! - Otherwise the call is denied and nothing is recorded
//!
//! # Example
//!
//! ```rust
//! use std::time::Duration;
//! use beads_notifier::rate_limit::RateLimiter;
//!
//! let mut limiter = RateLimiter::new(2, Duration::from_secs(60));
//! assert!(limiter.allow());
//! assert!(limiter.allow());
//! assert!(!limiter.allow());
//! assert_eq!(limiter.stats().count, 2);
//! ```

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default maximum number of notifications per window.
pub const DEFAULT_MAX: usize = 30;

/// Default window length (60 seconds).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Snapshot of the limiter's current usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStats {
    /// Admissions currently inside the window.
    pub count: usize,

    /// Maximum admissions allowed inside the window.
    pub max: usize,

    /// Window length in whole seconds.
    pub window_secs: u64,
}

/// Sliding-window admission control over a monotonic clock.
///
/// Not internally synchronized: one limiter belongs to one dispatcher, which
/// is driven by a single task.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    max: usize,
    window: Duration,
    /// Admission instants, oldest first.
    timestamps: VecDeque<Instant>,
}

impl RateLimiter {
    /// Creates a limiter admitting at most `max` calls per `window`.
    #[must_use]
    pub fn new(max: usize, window: Duration) -> Self {
        Self {
            max,
            window,
            timestamps: VecDeque::with_capacity(max),
        }
    }

    /// Attempts to admit one call at the current instant.
    pub fn allow(&mut self) -> bool {
        self.allow_at(Instant::now())
    }

    /// Attempts to admit one call at `now`.
    ///
    /// `now` must not go backwards between calls.
    pub fn allow_at(&mut self, now: Instant) -> bool {
        self.prune(now);

        if self.timestamps.len() < self.max {
            self.timestamps.push_back(now);
            true
        } else {
            false
        }
    }

    /// Returns current usage, pruning expired admissions first.
    pub fn stats(&mut self) -> RateLimitStats {
        self.stats_at(Instant::now())
    }

    /// Returns usage as of `now`.
    pub fn stats_at(&mut self, now: Instant) -> RateLimitStats {
        self.prune(now);
        RateLimitStats {
            count: self.timestamps.len(),
            max: self.max,
            window_secs: self.window.as_secs(),
        }
    }

    /// Returns the configured maximum.
    #[must_use]
    pub fn max(&self) -> usize {
        self.max
    }

    /// Returns the configured window.
    #[must_use]
    pub fn window(&self) -> Duration {
        self.window
    }

    fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.timestamps.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.timestamps.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX, DEFAULT_WINDOW)
    }
}
