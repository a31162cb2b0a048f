//! Owned status context tying the error monitor to the LED controller.
//!
//! One [`StatusContext`] exists per device. Event handlers and the tick take it
//! by `&mut`, so the firmware decides where it lives (a task-local in the
//! status task) and the host tools and tests construct as many as they need.

use crate::Millis;
use crate::config::ValidatedConfig;
use crate::events::{StatusEvent, StatusEventSource};
use crate::led::{CanHealth, LedChannelId, LedController, LedFrame, LedOutput, UsbHealth};
use crate::monitor::{BusState, CanErrorMonitor, ControllerState, MonitorReport};
use crate::telemetry::{TelemetryEventKind, TelemetryPayload, TelemetryRecorder};

/// Vendor IN request returning [`StatusContext::status_byte`].
pub const GET_STATUS_REQUEST: u8 = 0x40;

const STATUS_BUS_STATE_MASK: u8 = 0x0F;
const STATUS_RUNNING: u8 = 1 << 4;
const STATUS_LATCHED: u8 = 1 << 5;
const STATUS_USB_READY: u8 = 1 << 6;

/// Result of one [`StatusContext::tick`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TickOutcome {
    pub monitor: MonitorReport,
    pub leds: LedFrame,
    /// The glue must stop the CAN controller now.
    pub force_bus_off: bool,
}

/// Point-in-time view for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub bus_state: BusState,
    pub error_count: u32,
    pub channel_running: bool,
    pub stop_latched: bool,
    pub usb: UsbHealth,
    pub can_led: CanHealth,
    pub usb_led: UsbHealth,
    pub status_byte: u8,
}

pub struct StatusContext {
    monitor: CanErrorMonitor,
    leds: LedController,
    telemetry: TelemetryRecorder,
    usb_reported: UsbHealth,
    channel_running: bool,
}

impl StatusContext {
    #[must_use]
    pub fn new(config: &ValidatedConfig, now: Millis) -> Self {
        Self {
            monitor: CanErrorMonitor::new(*config.monitor(), now),
            leds: LedController::new(*config.patterns(), *config.timing()),
            telemetry: TelemetryRecorder::new(),
            usb_reported: UsbHealth::NotReady,
            channel_running: false,
        }
    }

    /// Applies one event. Classification and LED output follow on the next tick.
    pub fn handle(&mut self, event: StatusEvent) {
        match event {
            StatusEvent::CanError { at } => self.monitor.on_error_event(at),
            StatusEvent::CanController { state, at } => {
                self.monitor.on_controller_state(state, at);
                if state == ControllerState::Stopped {
                    self.channel_running = false;
                }
            }
            StatusEvent::CanActivity => self.leds.notify_activity(LedChannelId::Can),
            StatusEvent::UsbState(health) => self.usb_reported = health,
            StatusEvent::UsbActivity => self.leds.notify_activity(LedChannelId::Usb),
            StatusEvent::ChannelStarted { at } => {
                self.monitor.restart(at);
                self.channel_running = true;
                self.usb_reported = UsbHealth::Ready;
                self.telemetry
                    .record(TelemetryEventKind::ChannelStarted, TelemetryPayload::None, at);
            }
            StatusEvent::ChannelStopped { at } => {
                self.channel_running = false;
                self.usb_reported = UsbHealth::Ready;
                self.telemetry
                    .record(TelemetryEventKind::ChannelStopped, TelemetryPayload::None, at);
            }
        }
    }

    /// Applies the events that were pending when the call started.
    ///
    /// Events posted while draining stay queued for the next tick. Returns the
    /// number of events applied.
    pub fn drain<S: StatusEventSource>(&mut self, source: &mut S) -> usize {
        let budget = source.pending();
        let mut applied = 0;
        while applied < budget {
            let Some(event) = source.try_next() else {
                break;
            };
            self.handle(event);
            applied += 1;
        }
        applied
    }

    /// Advances the monitor and the LEDs by one period and writes the levels.
    pub fn tick<O: LedOutput>(&mut self, now: Millis, output: &mut O) -> TickOutcome {
        let monitor = self.monitor.tick(now);
        if monitor.changed() {
            self.telemetry
                .record_bus_state(monitor.previous, monitor.state, monitor.error_count, now);
        }
        if monitor.force_bus_off {
            self.telemetry
                .record(TelemetryEventKind::ForcedBusOff, TelemetryPayload::None, now);
        }

        self.leds.set_can_state(self.can_health());
        self.leds.set_usb_state(self.usb_health());
        let leds = self.leds.drive(output);

        if let Some(health) = leds.can_transition {
            self.telemetry
                .record_led_transition(TelemetryEventKind::CanLed(health), leds.tick, now);
        }
        if let Some(health) = leds.usb_transition {
            self.telemetry
                .record_led_transition(TelemetryEventKind::UsbLed(health), leds.tick, now);
        }

        TickOutcome {
            monitor,
            leds,
            force_bus_off: monitor.force_bus_off,
        }
    }

    /// CAN indicator health derived from the channel and bus state.
    #[must_use]
    pub fn can_health(&self) -> CanHealth {
        if !self.channel_running {
            return CanHealth::Off;
        }
        match self.monitor.current_state() {
            BusState::Active => CanHealth::Active,
            BusState::Warning => CanHealth::Warning,
            BusState::Passive => CanHealth::Error,
            BusState::ErrorStop => CanHealth::Off,
        }
    }

    /// USB indicator health; a stopped bus on a running channel shows as a USB error.
    #[must_use]
    pub fn usb_health(&self) -> UsbHealth {
        if self.channel_running
            && self.monitor.current_state() == BusState::ErrorStop
            && self.usb_reported == UsbHealth::Ready
        {
            return UsbHealth::Error;
        }
        self.usb_reported
    }

    #[must_use]
    pub fn current_state(&self) -> BusState {
        self.monitor.current_state()
    }

    #[must_use]
    pub fn channel_running(&self) -> bool {
        self.channel_running
    }

    /// One-byte diagnostics encoding served over the USB control endpoint.
    #[must_use]
    pub fn status_byte(&self) -> u8 {
        encode_status_byte(
            self.monitor.current_state(),
            self.channel_running,
            self.monitor.stop_latched(),
            self.usb_reported == UsbHealth::Ready,
        )
    }

    #[must_use]
    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            bus_state: self.monitor.current_state(),
            error_count: self.monitor.error_count(),
            channel_running: self.channel_running,
            stop_latched: self.monitor.stop_latched(),
            usb: self.usb_reported,
            can_led: self.leds.can().displayed(),
            usb_led: self.leds.usb().displayed(),
            status_byte: self.status_byte(),
        }
    }

    #[must_use]
    pub fn monitor(&self) -> &CanErrorMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn leds(&self) -> &LedController {
        &self.leds
    }

    #[must_use]
    pub fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }
}

/// Packs the diagnostics fields into the status byte layout.
#[must_use]
pub const fn encode_status_byte(
    bus_state: BusState,
    running: bool,
    latched: bool,
    usb_ready: bool,
) -> u8 {
    let mut byte = bus_state.as_raw() & STATUS_BUS_STATE_MASK;
    if running {
        byte |= STATUS_RUNNING;
    }
    if latched {
        byte |= STATUS_LATCHED;
    }
    if usb_ready {
        byte |= STATUS_USB_READY;
    }
    byte
}

/// Fields unpacked from a status byte.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct DecodedStatus {
    pub bus_state: Option<BusState>,
    pub running: bool,
    pub latched: bool,
    pub usb_ready: bool,
}

#[must_use]
pub const fn decode_status_byte(byte: u8) -> DecodedStatus {
    DecodedStatus {
        bus_state: BusState::from_raw(byte & STATUS_BUS_STATE_MASK),
        running: byte & STATUS_RUNNING != 0,
        latched: byte & STATUS_LATCHED != 0,
        usb_ready: byte & STATUS_USB_READY != 0,
    }
}
