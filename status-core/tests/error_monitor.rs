use status_core::config::{MonitorConfig, LED_TICK_MS};
use status_core::monitor::{BusState, CanErrorMonitor, ControllerState};

fn monitor(frame_threshold: u32, passive_limit: u32) -> CanErrorMonitor {
    CanErrorMonitor::new(
        MonitorConfig::with_thresholds(frame_threshold, passive_limit, 1_000),
        0,
    )
}

#[test]
fn five_errors_in_100ms_reach_warning_on_the_third() {
    let mut monitor = monitor(3, 10);
    let mut observed = heapless::Vec::<BusState, 5>::new();

    for at in [0, 25, 50, 75, 100] {
        monitor.on_error_event(at);
        observed.push(monitor.tick(at).state).unwrap();
    }

    assert_eq!(
        observed.as_slice(),
        &[
            BusState::Active,
            BusState::Active,
            BusState::Warning,
            BusState::Warning,
            BusState::Warning,
        ]
    );
}

#[test]
fn warning_recovers_after_one_quiet_window_of_ticks() {
    let mut monitor = monitor(3, 10);
    for at in [0, 10, 20, 30] {
        monitor.on_error_event(at);
    }
    assert_eq!(monitor.tick(50).state, BusState::Warning);

    let ticks_per_window = 1_000 / u64::from(LED_TICK_MS);
    let mut recovered_at = None;
    for step in 1..=ticks_per_window {
        let now = 50 + step * u64::from(LED_TICK_MS);
        if monitor.tick(now).state == BusState::Active {
            recovered_at = Some(now);
            break;
        }
    }

    assert_eq!(
        recovered_at,
        Some(1_000),
        "window rolls exactly once the hopping window expires"
    );
}

#[test]
fn classification_waits_for_tick() {
    let mut monitor = monitor(3, 10);
    for at in 0..5 {
        monitor.on_error_event(at);
    }

    assert_eq!(
        monitor.current_state(),
        BusState::Active,
        "events alone never reclassify"
    );
    monitor.tick(10);
    assert_eq!(monitor.current_state(), BusState::Warning);
}

#[test]
fn controller_warning_reports_count_towards_window() {
    let mut monitor = monitor(3, 10);
    for at in [5, 6, 7] {
        monitor.on_controller_state(ControllerState::ErrorWarning, at);
    }
    monitor.on_controller_state(ControllerState::Stopped, 8);

    assert_eq!(monitor.error_count(), 3);
    assert_eq!(monitor.tick(10).state, BusState::Warning);
}

#[test]
fn forced_bus_off_is_requested_once_until_recovery() {
    let mut monitor = monitor(3, 10);
    for at in 0..10 {
        monitor.on_error_event(at);
    }
    assert!(monitor.tick(20).force_bus_off);
    assert!(!monitor.tick(70).force_bus_off);

    monitor.on_controller_state(ControllerState::ErrorActive, 80);
    for at in 1_100..1_110 {
        monitor.on_error_event(at);
    }
    let report = monitor.tick(1_120);
    assert!(report.force_bus_off, "a new flood after recovery latches again");
    assert_eq!(report.state, BusState::ErrorStop);
}

#[test]
fn recovery_before_tick_cancels_streak_forced_stop() {
    let mut config = MonitorConfig::with_thresholds(3, 10, 1_000);
    config.passive_streak_limit = 1;
    let mut monitor = CanErrorMonitor::new(config, 0);

    monitor.on_controller_state(ControllerState::ErrorPassive, 1);
    monitor.on_controller_state(ControllerState::ErrorPassive, 3);
    assert!(monitor.stop_latched());
    monitor.on_controller_state(ControllerState::ErrorActive, 4);

    let report = monitor.tick(10);
    assert_eq!(report.state, BusState::Active);
    assert!(
        !report.force_bus_off,
        "a controller that already recovered is not forced off"
    );
    assert!(!monitor.stop_latched());
    assert!(!monitor.tick(60).force_bus_off);
}
