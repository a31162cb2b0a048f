//! Telemetry event catalog and the in-memory history ring.
//!
//! The status context records one entry per observable change (bus state,
//! displayed LED pattern, channel start/stop). Event kinds encode to compact
//! numeric codes so the firmware can mirror them over defmt or the USB
//! diagnostics channel without carrying strings.

use core::fmt;

use heapless::{HistoryBuf, OldestOrdered};

use crate::Millis;
use crate::led::{CanHealth, UsbHealth};
use crate::monitor::BusState;

/// Identifier assigned to each telemetry record.
pub type EventId = u32;

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 64;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    BusState(BusState),
    ForcedBusOff,
    CanLed(CanHealth),
    UsbLed(UsbHealth),
    ChannelStarted,
    ChannelStopped,
    Custom(u16),
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::BusState(state) => write!(f, "bus-state {state}"),
            TelemetryEventKind::ForcedBusOff => f.write_str("forced-bus-off"),
            TelemetryEventKind::CanLed(health) => write!(f, "can-led {health}"),
            TelemetryEventKind::UsbLed(health) => write!(f, "usb-led {health}"),
            TelemetryEventKind::ChannelStarted => f.write_str("channel-started"),
            TelemetryEventKind::ChannelStopped => f.write_str("channel-stopped"),
            TelemetryEventKind::Custom(code) => write!(f, "custom({code})"),
        }
    }
}

impl TelemetryEventKind {
    const BUS_STATE_BASE: u16 = 0x0000;
    const FORCED_BUS_OFF_CODE: u16 = 0x0008;
    const CHANNEL_STARTED_CODE: u16 = 0x0009;
    const CHANNEL_STOPPED_CODE: u16 = 0x000A;
    const CAN_LED_BASE: u16 = 0x0010;
    const USB_LED_BASE: u16 = 0x0018;
    // One code per `UsbHealth` variant.
    const USB_LED_END: u16 = 0x001B;

    /// Encodes the event into a compact transport-friendly discriminant.
    #[must_use]
    pub fn to_raw(self) -> u16 {
        match self {
            TelemetryEventKind::BusState(state) => {
                Self::BUS_STATE_BASE + u16::from(state.as_raw())
            }
            TelemetryEventKind::ForcedBusOff => Self::FORCED_BUS_OFF_CODE,
            TelemetryEventKind::CanLed(health) => Self::CAN_LED_BASE + led_offset(health.index()),
            TelemetryEventKind::UsbLed(health) => Self::USB_LED_BASE + led_offset(health.index()),
            TelemetryEventKind::ChannelStarted => Self::CHANNEL_STARTED_CODE,
            TelemetryEventKind::ChannelStopped => Self::CHANNEL_STOPPED_CODE,
            TelemetryEventKind::Custom(code) => code,
        }
    }

    /// Decodes a raw discriminant, falling back to [`TelemetryEventKind::Custom`].
    #[must_use]
    pub fn from_raw(code: u16) -> Self {
        match code {
            Self::FORCED_BUS_OFF_CODE => TelemetryEventKind::ForcedBusOff,
            Self::CHANNEL_STARTED_CODE => TelemetryEventKind::ChannelStarted,
            Self::CHANNEL_STOPPED_CODE => TelemetryEventKind::ChannelStopped,
            value if (Self::BUS_STATE_BASE..Self::FORCED_BUS_OFF_CODE).contains(&value) => {
                u8::try_from(value - Self::BUS_STATE_BASE)
                    .ok()
                    .and_then(BusState::from_raw)
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::BusState)
            }
            value if (Self::CAN_LED_BASE..Self::USB_LED_BASE).contains(&value) => {
                CanHealth::from_index(usize::from(value - Self::CAN_LED_BASE))
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::CanLed)
            }
            value if (Self::USB_LED_BASE..Self::USB_LED_END).contains(&value) => {
                UsbHealth::from_index(usize::from(value - Self::USB_LED_BASE))
                    .map_or(TelemetryEventKind::Custom(value), TelemetryEventKind::UsbLed)
            }
            other => TelemetryEventKind::Custom(other),
        }
    }
}

fn led_offset(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    None,
    /// Monitor classification change.
    Monitor(MonitorTelemetry),
    /// Displayed LED pattern change.
    Led(LedTelemetry),
}

/// Bus state change details.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MonitorTelemetry {
    pub previous: BusState,
    pub error_count: u32,
}

/// LED transition details.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LedTelemetry {
    pub tick: u32,
    /// Milliseconds since the previous LED transition on any channel.
    pub elapsed_since_previous: Option<Millis>,
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord {
    pub id: EventId,
    pub timestamp: Millis,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<const CAPACITY: usize = TELEMETRY_RING_CAPACITY> {
    ring: TelemetryRing<CAPACITY>,
    last_led_transition_at: Option<Millis>,
    next_event_id: EventId,
}

impl<const CAPACITY: usize> TelemetryRecorder<CAPACITY> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            last_led_transition_at: None,
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord> {
        self.ring.oldest_ordered()
    }

    #[must_use]
    pub fn latest(&self) -> Option<&TelemetryRecord> {
        self.ring.recent()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Id that the next record will receive.
    #[must_use]
    pub const fn next_event_id(&self) -> EventId {
        self.next_event_id
    }

    pub fn record_bus_state(
        &mut self,
        previous: BusState,
        state: BusState,
        error_count: u32,
        timestamp: Millis,
    ) -> EventId {
        self.record(
            TelemetryEventKind::BusState(state),
            TelemetryPayload::Monitor(MonitorTelemetry {
                previous,
                error_count,
            }),
            timestamp,
        )
    }

    /// Records a displayed-pattern change and the time since the previous one.
    pub fn record_led_transition(
        &mut self,
        event: TelemetryEventKind,
        tick: u32,
        timestamp: Millis,
    ) -> EventId {
        let elapsed = self
            .last_led_transition_at
            .map(|previous| timestamp.saturating_sub(previous));
        self.last_led_transition_at = Some(timestamp);

        self.record(
            event,
            TelemetryPayload::Led(LedTelemetry {
                tick,
                elapsed_since_previous: elapsed,
            }),
            timestamp,
        )
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: Millis,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }
}

impl<const CAPACITY: usize> Default for TelemetryRecorder<CAPACITY> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_kind_codes_decode() {
        let fixtures = [
            (TelemetryEventKind::BusState(BusState::Active), 0x0000),
            (TelemetryEventKind::BusState(BusState::ErrorStop), 0x0003),
            (TelemetryEventKind::ForcedBusOff, 0x0008),
            (TelemetryEventKind::ChannelStopped, 0x000A),
            (TelemetryEventKind::CanLed(CanHealth::Warning), 0x0012),
            (TelemetryEventKind::UsbLed(UsbHealth::Error), 0x001A),
        ];

        for (event, code) in fixtures {
            assert_eq!(event.to_raw(), code);
            assert_eq!(TelemetryEventKind::from_raw(code), event);
        }
    }

    #[test]
    fn led_code_blocks_fit_their_health_enums() {
        let can_block = TelemetryEventKind::USB_LED_BASE - TelemetryEventKind::CAN_LED_BASE;
        let usb_block = TelemetryEventKind::USB_LED_END - TelemetryEventKind::USB_LED_BASE;
        assert!(CanHealth::COUNT <= usize::from(can_block));
        assert_eq!(UsbHealth::COUNT, usize::from(usb_block));
    }

    #[test]
    fn unknown_codes_fall_back_to_custom() {
        for code in [0x0005, 0x0015, 0x001B, 0xBEEF] {
            assert_eq!(
                TelemetryEventKind::from_raw(code),
                TelemetryEventKind::Custom(code)
            );
        }
    }

    #[test]
    fn recorder_wraps_and_tracks_led_spacing() {
        let mut recorder: TelemetryRecorder<2> = TelemetryRecorder::new();

        recorder.record_led_transition(TelemetryEventKind::CanLed(CanHealth::Active), 0, 100);
        recorder.record_bus_state(BusState::Active, BusState::Warning, 12, 150);
        let id =
            recorder.record_led_transition(TelemetryEventKind::CanLed(CanHealth::Warning), 20, 1_100);

        assert_eq!(id, 2);
        assert_eq!(recorder.len(), 2);
        let latest = recorder.latest().copied().unwrap();
        assert_eq!(
            latest.details,
            TelemetryPayload::Led(LedTelemetry {
                tick: 20,
                elapsed_since_previous: Some(1_000),
            })
        );

        let ids: [EventId; 2] = {
            let mut iter = recorder.oldest_first().map(|record| record.id);
            [iter.next().unwrap(), iter.next().unwrap()]
        };
        assert_eq!(ids, [1, 2]);
    }
}
