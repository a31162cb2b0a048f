//! CAN bus error-rate monitor.
//!
//! Error notifications are counted in a hopping window of `window_ms`
//! milliseconds: when the window expires it resets wholesale instead of
//! sliding, so the monitor keeps a single counter regardless of traffic rate.
//! Classification only happens on [`CanErrorMonitor::tick`], which gives every
//! consumer one stable answer per tick period.

use core::fmt;

use crate::Millis;
use crate::config::MonitorConfig;

/// Bus health classification, ordered by severity.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum BusState {
    #[default]
    Active,
    Warning,
    Passive,
    /// The controller went bus-off or was stopped to contain an error flood.
    ErrorStop,
}

impl BusState {
    const ACTIVE_CODE: u8 = 0x0;
    const WARNING_CODE: u8 = 0x1;
    const PASSIVE_CODE: u8 = 0x2;
    const ERROR_STOP_CODE: u8 = 0x3;

    /// Compact code used by the diagnostics status byte and telemetry.
    #[must_use]
    pub const fn as_raw(self) -> u8 {
        match self {
            BusState::Active => Self::ACTIVE_CODE,
            BusState::Warning => Self::WARNING_CODE,
            BusState::Passive => Self::PASSIVE_CODE,
            BusState::ErrorStop => Self::ERROR_STOP_CODE,
        }
    }

    #[must_use]
    pub const fn from_raw(code: u8) -> Option<Self> {
        match code {
            Self::ACTIVE_CODE => Some(BusState::Active),
            Self::WARNING_CODE => Some(BusState::Warning),
            Self::PASSIVE_CODE => Some(BusState::Passive),
            Self::ERROR_STOP_CODE => Some(BusState::ErrorStop),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            BusState::Active => "active",
            BusState::Warning => "warning",
            BusState::Passive => "passive",
            BusState::ErrorStop => "error-stop",
        }
    }
}

impl fmt::Display for BusState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Fault-confinement state reported by the CAN controller itself.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControllerState {
    ErrorActive,
    ErrorWarning,
    ErrorPassive,
    BusOff,
    Stopped,
}

impl ControllerState {
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            ControllerState::ErrorActive => "error-active",
            ControllerState::ErrorWarning => "error-warning",
            ControllerState::ErrorPassive => "error-passive",
            ControllerState::BusOff => "bus-off",
            ControllerState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for ControllerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of one monitor tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MonitorReport {
    pub previous: BusState,
    pub state: BusState,
    pub error_count: u32,
    /// The caller must stop the CAN controller. Raised once per latch.
    pub force_bus_off: bool,
    pub window_rolled: bool,
}

impl MonitorReport {
    #[must_use]
    pub fn changed(&self) -> bool {
        self.previous != self.state
    }
}

/// Maps an in-window error count onto a bus state. Monotone in `count`.
#[must_use]
pub const fn classify(count: u32, config: &MonitorConfig) -> BusState {
    if count < config.frame_threshold {
        BusState::Active
    } else if count < config.passive_limit {
        BusState::Warning
    } else {
        BusState::Passive
    }
}

/// Hopping-window error counter with bus-off protection.
#[derive(Clone, Debug)]
pub struct CanErrorMonitor {
    config: MonitorConfig,
    window_start: Millis,
    error_count: u32,
    bus_state: BusState,
    passive_streak: u32,
    stop_latched: bool,
    force_pending: bool,
}

impl CanErrorMonitor {
    #[must_use]
    pub const fn new(config: MonitorConfig, now: Millis) -> Self {
        Self {
            config,
            window_start: now,
            error_count: 0,
            bus_state: BusState::Active,
            passive_streak: 0,
            stop_latched: false,
            force_pending: false,
        }
    }

    /// Resets the window, the classification and the bus-off latch.
    pub fn init(&mut self, now: Millis) {
        *self = Self::new(self.config, now);
    }

    /// The host (re)started the channel; previous faults no longer apply.
    pub fn restart(&mut self, now: Millis) {
        self.init(now);
    }

    /// Records one error occurrence at `timestamp`.
    pub fn on_error_event(&mut self, timestamp: Millis) {
        if self.window_expired(timestamp) {
            self.window_start = timestamp;
            self.error_count = 1;
        } else {
            self.error_count = self.error_count.saturating_add(1);
        }
    }

    /// Folds a controller fault-confinement report into the monitor.
    pub fn on_controller_state(&mut self, state: ControllerState, timestamp: Millis) {
        match state {
            ControllerState::ErrorActive => {
                self.passive_streak = 0;
                self.stop_latched = false;
                self.force_pending = false;
            }
            ControllerState::ErrorWarning => self.on_error_event(timestamp),
            ControllerState::ErrorPassive => {
                self.on_error_event(timestamp);
                self.passive_streak = self.passive_streak.saturating_add(1);
                if self.passive_streak > self.config.passive_streak_limit {
                    self.passive_streak = 0;
                    self.latch_stop(true);
                }
            }
            ControllerState::BusOff => {
                self.on_error_event(timestamp);
                self.latch_stop(false);
            }
            ControllerState::Stopped => {}
        }
    }

    /// Rolls an expired window and reclassifies the bus.
    pub fn tick(&mut self, now: Millis) -> MonitorReport {
        let previous = self.bus_state;
        let window_rolled = self.window_expired(now);
        if window_rolled {
            self.window_start = now;
            self.error_count = 0;
        }

        let classified = classify(self.error_count, &self.config);
        if classified == BusState::Passive && self.config.force_bus_off_on_flood {
            self.latch_stop(true);
        }

        self.bus_state = if self.stop_latched {
            BusState::ErrorStop
        } else {
            classified
        };

        let force_bus_off = core::mem::take(&mut self.force_pending);

        MonitorReport {
            previous,
            state: self.bus_state,
            error_count: self.error_count,
            force_bus_off,
            window_rolled,
        }
    }

    /// State computed by the most recent tick.
    #[must_use]
    pub const fn current_state(&self) -> BusState {
        self.bus_state
    }

    #[must_use]
    pub const fn error_count(&self) -> u32 {
        self.error_count
    }

    #[must_use]
    pub const fn window_start(&self) -> Millis {
        self.window_start
    }

    #[must_use]
    pub const fn stop_latched(&self) -> bool {
        self.stop_latched
    }

    #[must_use]
    pub const fn config(&self) -> &MonitorConfig {
        &self.config
    }

    fn window_expired(&self, now: Millis) -> bool {
        now.saturating_sub(self.window_start) >= Millis::from(self.config.window_ms)
    }

    fn latch_stop(&mut self, force: bool) {
        if self.stop_latched {
            return;
        }
        self.stop_latched = true;
        self.force_pending = force;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn scenario_config() -> MonitorConfig {
        MonitorConfig::with_thresholds(3, 10, 1_000)
    }

    #[test]
    fn warning_after_third_event_and_stays_through_fifth() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        let mut states = [BusState::Active; 5];

        for (index, slot) in states.iter_mut().enumerate() {
            let at = u64::try_from(index).unwrap() * 20;
            monitor.on_error_event(at);
            *slot = monitor.tick(at).state;
        }

        assert_eq!(
            states,
            [
                BusState::Active,
                BusState::Active,
                BusState::Warning,
                BusState::Warning,
                BusState::Warning,
            ]
        );
        assert_eq!(monitor.error_count(), 5);
    }

    #[test]
    fn quiet_window_returns_to_active() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        for at in [10, 20, 30, 40] {
            monitor.on_error_event(at);
        }
        assert_eq!(monitor.tick(50).state, BusState::Warning);

        let mut now = 50;
        while now < 1_000 {
            now += 50;
            monitor.tick(now);
        }

        assert_eq!(monitor.current_state(), BusState::Active);
        assert_eq!(monitor.error_count(), 0);
    }

    #[test]
    fn event_after_expiry_starts_new_window() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        monitor.on_error_event(100);
        monitor.on_error_event(200);
        monitor.on_error_event(1_000);

        assert_eq!(monitor.error_count(), 1);
        assert_eq!(monitor.window_start(), 1_000);
    }

    #[test]
    fn earlier_timestamp_does_not_roll_window() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 500);
        monitor.on_error_event(100);
        monitor.on_error_event(120);

        assert_eq!(monitor.error_count(), 2);
        assert_eq!(monitor.window_start(), 500);
    }

    #[test]
    fn flood_forces_bus_off_once() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        for at in 0..10 {
            monitor.on_error_event(at);
        }

        let first = monitor.tick(20);
        assert_eq!(first.state, BusState::ErrorStop);
        assert!(first.force_bus_off);
        assert!(first.changed());

        for at in 21..40 {
            monitor.on_error_event(at);
        }
        let second = monitor.tick(50);
        assert_eq!(second.state, BusState::ErrorStop);
        assert!(!second.force_bus_off);
        assert!(!second.changed());
    }

    #[test]
    fn flood_without_protection_reports_passive() {
        let mut config = scenario_config();
        config.force_bus_off_on_flood = false;
        let mut monitor = CanErrorMonitor::new(config, 0);
        for at in 0..12 {
            monitor.on_error_event(at);
        }

        let report = monitor.tick(20);
        assert_eq!(report.state, BusState::Passive);
        assert!(!report.force_bus_off);
    }

    #[test]
    fn passive_streak_over_limit_forces_bus_off() {
        let mut config = MonitorConfig::with_thresholds(100, 200, 1_000);
        config.passive_streak_limit = 3;
        let mut monitor = CanErrorMonitor::new(config, 0);

        for at in 0..3 {
            monitor.on_controller_state(ControllerState::ErrorPassive, at);
        }
        assert!(!monitor.tick(5).force_bus_off);

        monitor.on_controller_state(ControllerState::ErrorPassive, 6);
        let report = monitor.tick(10);
        assert!(report.force_bus_off);
        assert_eq!(report.state, BusState::ErrorStop);
    }

    #[test]
    fn bus_off_latches_without_force_and_error_active_clears() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        monitor.on_controller_state(ControllerState::BusOff, 5);

        let report = monitor.tick(10);
        assert_eq!(report.state, BusState::ErrorStop);
        assert!(!report.force_bus_off);

        monitor.on_controller_state(ControllerState::ErrorActive, 20);
        assert_eq!(monitor.tick(1_100).state, BusState::Active);
    }

    #[test]
    fn restart_clears_latch_and_window() {
        let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
        monitor.on_controller_state(ControllerState::BusOff, 5);
        monitor.tick(10);

        monitor.restart(40);
        assert!(!monitor.stop_latched());
        assert_eq!(monitor.error_count(), 0);
        assert_eq!(monitor.tick(50).state, BusState::Active);
    }

    #[test]
    fn bus_state_codes_round_trip() {
        for state in [
            BusState::Active,
            BusState::Warning,
            BusState::Passive,
            BusState::ErrorStop,
        ] {
            assert_eq!(BusState::from_raw(state.as_raw()), Some(state));
        }
        assert_eq!(BusState::from_raw(0x7), None);
    }

    proptest! {
        #[test]
        fn classification_is_monotone(a in 0u32..200, b in 0u32..200, threshold in 1u32..50, span in 1u32..100) {
            let config = MonitorConfig::with_thresholds(threshold, threshold + span, 1_000);
            let (low, high) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(classify(low, &config) <= classify(high, &config));
        }

        #[test]
        fn count_never_exceeds_events_since_rollover(gaps in proptest::collection::vec(0u64..400, 1..64)) {
            let mut config = scenario_config();
            config.frame_threshold = u32::MAX - 1;
            config.passive_limit = u32::MAX;
            let mut monitor = CanErrorMonitor::new(config, 0);
            let mut now = 0;
            let mut since_rollover = 0u32;
            let mut window_start = 0;

            for gap in gaps {
                now += gap;
                if now - window_start >= 1_000 {
                    window_start = now;
                    since_rollover = 0;
                }
                since_rollover += 1;
                monitor.on_error_event(now);
                prop_assert!(monitor.error_count() <= since_rollover);
                prop_assert!(monitor.error_count() >= 1);
            }
        }

        #[test]
        fn idle_ticks_roll_once_per_window(errors in 0u32..20, ticks in 1u64..200) {
            let mut monitor = CanErrorMonitor::new(scenario_config(), 0);
            for _ in 0..errors {
                monitor.on_error_event(0);
            }
            let mut rolls = 0u64;
            for step in 1..=ticks {
                let report = monitor.tick(step * 50);
                if report.window_rolled {
                    rolls += 1;
                    prop_assert_eq!(report.error_count, 0);
                }
            }
            prop_assert_eq!(rolls, ticks * 50 / 1_000);
        }
    }
}
