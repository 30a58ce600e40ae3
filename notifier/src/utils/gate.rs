//! Leading-edge gate for coalescing bursts of file change triggers.
//!
//! Unlike a trailing debounce, the first trigger is admitted immediately and
//! later triggers are dropped until `debounce` has elapsed since the last
//! admitted one. A write that lands inside the window is picked up by the
//! next admitted scan because every scan reads the whole store.
//!
//! # Example
//!
//! ```
//! use std::time::{Duration, Instant};
//! use beads_notifier::utils::gate::ScanGate;
//!
//! let mut gate = ScanGate::new(Duration::from_secs(1));
//! let start = Instant::now();
//! assert!(gate.admit(start));
//! assert!(!gate.admit(start + Duration::from_millis(300)));
//! assert!(gate.admit(start + Duration::from_secs(1)));
//! ```

use std::time::{Duration, Instant};

/// Default minimum spacing between admitted scans.
pub const DEFAULT_SCAN_DEBOUNCE: Duration = Duration::from_secs(1);

/// Admits at most one scan per debounce interval.
#[derive(Debug, Clone)]
pub struct ScanGate {
    debounce: Duration,
    last_admitted: Option<Instant>,
}

impl ScanGate {
    /// Creates a gate with the given minimum spacing.
    #[must_use]
    pub fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_admitted: None,
        }
    }

    /// Returns `true` and records `now` if a scan may start.
    pub fn admit(&mut self, now: Instant) -> bool {
        let open = self
            .last_admitted
            .is_none_or(|last| now.saturating_duration_since(last) >= self.debounce);
        if open {
            self.last_admitted = Some(now);
        }
        open
    }

    /// The configured spacing.
    #[must_use]
    pub fn debounce(&self) -> Duration {
        self.debounce
    }
}

impl Default for ScanGate {
    fn default() -> Self {
        Self::new(DEFAULT_SCAN_DEBOUNCE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_trigger_is_admitted() {
        let mut gate = ScanGate::default();
        assert_eq!(gate.debounce(), DEFAULT_SCAN_DEBOUNCE);
        assert!(gate.admit(Instant::now()));
    }

    #[test]
    fn burst_within_window_is_dropped() {
        let mut gate = ScanGate::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(10)));
        assert!(!gate.admit(t0 + Duration::from_millis(999)));
        assert!(gate.admit(t0 + Duration::from_millis(1000)));
    }

    #[test]
    fn dropped_triggers_do_not_extend_window() {
        let mut gate = ScanGate::new(Duration::from_secs(1));
        let t0 = Instant::now();

        assert!(gate.admit(t0));
        assert!(!gate.admit(t0 + Duration::from_millis(900)));
        assert!(gate.admit(t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn zero_debounce_admits_everything() {
        let mut gate = ScanGate::new(Duration::ZERO);
        let t0 = Instant::now();
        assert!(gate.admit(t0));
        assert!(gate.admit(t0));
    }
}
