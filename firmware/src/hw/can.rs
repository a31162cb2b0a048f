//! Maps FDCAN error counters onto the controller states the monitor consumes.
//!
//! The CAN task polls the protocol status register between frames. Only
//! changes are forwarded, so a controller that stays error-passive is counted
//! once per entry rather than once per poll.

use status_core::monitor::ControllerState;

/// Error counter level at which the controller raises its warning flag.
pub const WARNING_LIMIT: u8 = 96;
/// Error counter level at which the controller goes error-passive.
pub const PASSIVE_LIMIT: u8 = 128;

/// Snapshot of the controller's error bookkeeping.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct ErrorCounters {
    pub tx: u8,
    pub rx: u8,
    /// Error-passive flag as reported by the peripheral.
    pub passive: bool,
    pub bus_off: bool,
}

impl ErrorCounters {
    #[must_use]
    pub const fn controller_state(&self) -> ControllerState {
        if self.bus_off {
            ControllerState::BusOff
        } else if self.passive || self.tx >= PASSIVE_LIMIT || self.rx >= PASSIVE_LIMIT {
            ControllerState::ErrorPassive
        } else if self.tx >= WARNING_LIMIT || self.rx >= WARNING_LIMIT {
            ControllerState::ErrorWarning
        } else {
            ControllerState::ErrorActive
        }
    }
}

/// Remembers the last reported state so polls only surface transitions.
#[derive(Debug, Default)]
pub struct ControllerTracker {
    last: Option<ControllerState>,
}

impl ControllerTracker {
    #[must_use]
    pub const fn new() -> Self {
        Self { last: None }
    }

    /// Returns the new state when it differs from the previous poll.
    pub fn update(&mut self, counters: ErrorCounters) -> Option<ControllerState> {
        let state = counters.controller_state();
        if self.last == Some(state) {
            return None;
        }
        self.last = Some(state);
        Some(state)
    }

    /// Marks the controller as stopped so the next session starts fresh.
    pub fn reset(&mut self) {
        self.last = None;
    }

    #[must_use]
    pub const fn last(&self) -> Option<ControllerState> {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counters(tx: u8, rx: u8) -> ErrorCounters {
        ErrorCounters {
            tx,
            rx,
            ..ErrorCounters::default()
        }
    }

    #[test]
    fn classifies_by_counter_levels() {
        assert_eq!(counters(0, 0).controller_state(), ControllerState::ErrorActive);
        assert_eq!(counters(96, 0).controller_state(), ControllerState::ErrorWarning);
        assert_eq!(counters(0, 130).controller_state(), ControllerState::ErrorPassive);

        let flagged = ErrorCounters {
            passive: true,
            ..counters(10, 10)
        };
        assert_eq!(flagged.controller_state(), ControllerState::ErrorPassive);

        let off = ErrorCounters {
            bus_off: true,
            ..counters(255, 0)
        };
        assert_eq!(off.controller_state(), ControllerState::BusOff);
    }

    #[test]
    fn tracker_reports_transitions_only() {
        let mut tracker = ControllerTracker::new();
        assert_eq!(tracker.update(counters(0, 0)), Some(ControllerState::ErrorActive));
        assert_eq!(tracker.update(counters(5, 3)), None);
        assert_eq!(tracker.update(counters(100, 0)), Some(ControllerState::ErrorWarning));
        assert_eq!(tracker.update(counters(140, 0)), Some(ControllerState::ErrorPassive));
        assert_eq!(tracker.update(counters(150, 0)), None);
        assert_eq!(tracker.update(counters(20, 0)), Some(ControllerState::ErrorActive));
        assert_eq!(tracker.update(counters(140, 0)), Some(ControllerState::ErrorPassive));
    }

    #[test]
    fn reset_forgets_last_state() {
        let mut tracker = ControllerTracker::new();
        tracker.update(counters(0, 0));
        tracker.reset();
        assert_eq!(tracker.last(), None);
        assert_eq!(tracker.update(counters(0, 0)), Some(ControllerState::ErrorActive));
    }
}
