use status_core::Millis;
use status_core::config::{Config, LED_TICK_MS};
use status_core::events::{
    EventQueue, GsUsbDecision, GsUsbEvent, GsUsbEventFilter, StatusEvent, StatusEventSink,
};
use status_core::led::{CanHealth, LedChannelId, LedOutput, UsbHealth};
use status_core::monitor::{BusState, ControllerState};
use status_core::status::{StatusContext, TickOutcome};
use status_core::telemetry::TelemetryEventKind;

/// Records the last level written per channel and counts writes.
#[derive(Default)]
struct MockLeds {
    can: bool,
    usb: bool,
    writes: usize,
}

impl LedOutput for MockLeds {
    fn set_level(&mut self, channel: LedChannelId, on: bool) {
        match channel {
            LedChannelId::Can => self.can = on,
            LedChannelId::Usb => self.usb = on,
        }
        self.writes += 1;
    }
}

struct Harness {
    status: StatusContext,
    queue: EventQueue<16>,
    filter: GsUsbEventFilter,
    leds: MockLeds,
    now: Millis,
}

impl Harness {
    fn new() -> Self {
        let config = Config::new().validate().expect("default config");
        Self {
            status: StatusContext::new(&config, 0),
            queue: EventQueue::new(),
            filter: GsUsbEventFilter::new(config.timing()),
            leds: MockLeds::default(),
            now: 0,
        }
    }

    fn post(&mut self, event: StatusEvent) {
        self.queue.try_post(event).expect("queue has room");
    }

    fn gs_usb(&mut self, event: GsUsbEvent) -> GsUsbDecision {
        let decision = self.filter.filter(event, self.now);
        if let GsUsbDecision::Forward(event) = decision {
            self.post(event);
        }
        decision
    }

    fn tick(&mut self) -> TickOutcome {
        self.now += Millis::from(LED_TICK_MS);
        self.status.drain(&mut self.queue);
        self.status.tick(self.now, &mut self.leds)
    }

    fn run(&mut self, ticks: u32) {
        for _ in 0..ticks {
            self.tick();
        }
    }
}

#[test]
fn enumeration_then_channel_start_lights_both_leds() {
    let mut harness = Harness::new();
    harness.post(StatusEvent::UsbState(UsbHealth::Ready));
    let outcome = harness.tick();

    assert_eq!(outcome.leds.usb_transition, Some(UsbHealth::Ready));
    assert!(harness.leds.usb);
    assert!(!harness.leds.can);
    assert_eq!(harness.leds.writes, 2);

    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(20);

    assert!(harness.status.channel_running());
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Active);
    assert!(harness.leds.can);
}

#[test]
fn can_health_flapping_within_dwell_shows_single_transition() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(1);
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Active);

    // Reach Warning, then let the window roll back to Active well inside the dwell.
    for _ in 0..12 {
        let at = harness.now;
        harness.post(StatusEvent::CanError { at });
    }
    harness.run(1);
    assert_eq!(harness.status.current_state(), BusState::Warning);

    let mut transitions = 0;
    for _ in 0..60 {
        if harness.tick().leds.can_transition.is_some() {
            transitions += 1;
        }
    }

    assert_eq!(transitions, 0, "warning was withdrawn before the dwell expired");
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Active);
}

#[test]
fn error_flood_forces_bus_off_and_flags_usb() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(25);

    for _ in 0..16 {
        for _ in 0..4 {
            let at = harness.now;
            harness.post(StatusEvent::CanError { at });
        }
        let outcome = harness.tick();
        if outcome.force_bus_off {
            break;
        }
    }

    assert_eq!(harness.status.current_state(), BusState::ErrorStop);
    assert_eq!(harness.status.can_health(), CanHealth::Off);
    assert_eq!(harness.status.usb_health(), UsbHealth::Error);

    let forced = harness
        .status
        .telemetry()
        .oldest_first()
        .filter(|record| record.event == TelemetryEventKind::ForcedBusOff)
        .count();
    assert_eq!(forced, 1);

    harness.run(25);
    assert_eq!(harness.status.leds().usb().displayed(), UsbHealth::Error);
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Off);
}

#[test]
fn restart_after_bus_off_recovers_indicators() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.post(StatusEvent::CanController {
        state: ControllerState::BusOff,
        at: 0,
    });
    harness.run(2);
    assert_eq!(harness.status.current_state(), BusState::ErrorStop);

    harness.gs_usb(GsUsbEvent::ChannelStopped);
    harness.run(1);
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(25);

    assert_eq!(harness.status.current_state(), BusState::Active);
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Active);
    assert_eq!(harness.status.leds().usb().displayed(), UsbHealth::Ready);
}

#[test]
fn spurious_stop_burst_is_dropped() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(1);

    assert!(matches!(
        harness.gs_usb(GsUsbEvent::ChannelStopped),
        GsUsbDecision::Forward(_)
    ));
    harness.run(1);
    assert_eq!(
        harness.gs_usb(GsUsbEvent::ChannelStopped),
        GsUsbDecision::SpuriousStop
    );
    assert!(!harness.status.channel_running());
}

#[test]
fn rx_burst_produces_one_activity_blink() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(1);

    let forwarded = (0..10)
        .filter(|_| matches!(harness.gs_usb(GsUsbEvent::ActivityRx), GsUsbDecision::Forward(_)))
        .count();
    assert_eq!(forwarded, 1);

    let levels: Vec<bool> = (0..4).map(|_| harness.tick().leds.can).collect();
    assert_eq!(levels, vec![false, false, true, true]);
}

#[test]
fn events_posted_after_drain_wait_for_next_tick() {
    let mut harness = Harness::new();
    harness.post(StatusEvent::UsbActivity);
    assert_eq!(harness.status.drain(&mut harness.queue), 1);

    harness.post(StatusEvent::UsbState(UsbHealth::Ready));
    let outcome = harness.status.tick(50, &mut harness.leds);
    assert_eq!(outcome.leds.usb_transition, None);
    assert!(outcome.leds.usb, "activity inverts the dark USB LED");
    assert_eq!(harness.queue.len(), 1);
}

#[test]
fn continuous_rx_traffic_does_not_hold_back_warning() {
    let mut harness = Harness::new();
    harness.gs_usb(GsUsbEvent::ChannelStarted);
    harness.run(1);
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Active);

    let mut warned_at = None;
    for _ in 0..60 {
        // A frame every millisecond between ticks.
        for ms in 0..Millis::from(LED_TICK_MS) {
            let at = harness.now + ms;
            if let GsUsbDecision::Forward(event) = harness.filter.filter(GsUsbEvent::ActivityRx, at)
            {
                harness.post(event);
            }
        }
        for _ in 0..2 {
            let at = harness.now;
            harness.post(StatusEvent::CanError { at });
        }

        let outcome = harness.tick();
        assert_ne!(outcome.monitor.state, BusState::ErrorStop);
        if outcome.leds.can_transition == Some(CanHealth::Warning) {
            warned_at = Some(harness.now);
            break;
        }
    }

    assert!(
        warned_at.is_some(),
        "steady traffic must not starve the warning transition"
    );
    assert_eq!(harness.status.leds().can().displayed(), CanHealth::Warning);
}
