#![cfg_attr(not(target_os = "none"), allow(dead_code))]

//! Shared status storage for the firmware target.
//!
//! The status task publishes a snapshot here after every tick. The USB control
//! handler reads the status byte from its own context, and the counters are
//! bumped from wherever an event gets dropped, so everything is a plain atomic.

use portable_atomic::{AtomicU8, AtomicU32, Ordering};
use status_core::monitor::BusState;
use status_core::status::StatusSnapshot;

const LED_CAN_BIT: u8 = 1 << 0;
const LED_USB_BIT: u8 = 1 << 1;

static STATUS_BYTE: AtomicU8 = AtomicU8::new(0);
static BUS_STATE: AtomicU8 = AtomicU8::new(0);
static ERROR_COUNT: AtomicU32 = AtomicU32::new(0);
/// Bitmask of the LED levels written on the last tick.
static LED_LEVELS: AtomicU8 = AtomicU8::new(0);
/// Events rejected because the status channel was full.
static DROPPED_EVENTS: AtomicU32 = AtomicU32::new(0);
/// Controller stops requested by the error monitor.
static FORCED_STOPS: AtomicU32 = AtomicU32::new(0);

/// Copies the tick's snapshot into the shared cells.
pub fn publish(snapshot: &StatusSnapshot) {
    STATUS_BYTE.store(snapshot.status_byte, Ordering::Relaxed);
    BUS_STATE.store(snapshot.bus_state.as_raw(), Ordering::Relaxed);
    ERROR_COUNT.store(snapshot.error_count, Ordering::Relaxed);
}

/// Byte served to the host for `GET_STATUS`.
pub fn status_byte() -> u8 {
    STATUS_BYTE.load(Ordering::Relaxed)
}

pub fn bus_state() -> BusState {
    BusState::from_raw(BUS_STATE.load(Ordering::Relaxed)).unwrap_or_default()
}

pub fn error_count() -> u32 {
    ERROR_COUNT.load(Ordering::Relaxed)
}

pub fn record_led_levels(can: bool, usb: bool) {
    let mut mask = 0;
    if can {
        mask |= LED_CAN_BIT;
    }
    if usb {
        mask |= LED_USB_BIT;
    }
    LED_LEVELS.store(mask, Ordering::Relaxed);
}

/// Returns `(can, usb)` as last written.
pub fn led_levels() -> (bool, bool) {
    let mask = LED_LEVELS.load(Ordering::Relaxed);
    (mask & LED_CAN_BIT != 0, mask & LED_USB_BIT != 0)
}

pub fn record_dropped_event() {
    DROPPED_EVENTS.fetch_add(1, Ordering::Relaxed);
}

pub fn dropped_events() -> u32 {
    DROPPED_EVENTS.load(Ordering::Relaxed)
}

pub fn record_forced_stop() {
    FORCED_STOPS.fetch_add(1, Ordering::Relaxed);
}

pub fn forced_stops() -> u32 {
    FORCED_STOPS.load(Ordering::Relaxed)
}
