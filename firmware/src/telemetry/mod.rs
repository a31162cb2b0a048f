//! Mirrors the core telemetry ring to defmt (or stdout on the host).
//!
//! The status context keeps the authoritative history. After every tick the
//! status task hands it to [`TelemetryMirror::flush`], which logs only the
//! records that appeared since the previous call.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use status_core::telemetry::{EventId, TelemetryPayload, TelemetryRecord, TelemetryRecorder};

/// Tracks which telemetry records were already logged.
pub struct TelemetryMirror {
    next_id: EventId,
}

impl TelemetryMirror {
    pub const fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Logs records newer than the last flush and returns how many were emitted.
    pub fn flush<const CAPACITY: usize>(
        &mut self,
        recorder: &TelemetryRecorder<CAPACITY>,
    ) -> usize {
        let mut emitted = 0;
        for record in recorder.oldest_first() {
            if record.id.wrapping_sub(self.next_id) > EventId::MAX / 2 {
                continue;
            }
            emit_record(record);
            emitted += 1;
        }
        self.next_id = recorder.next_event_id();
        emitted
    }
}

impl Default for TelemetryMirror {
    fn default() -> Self {
        Self::new()
    }
}

fn emit_record(record: &TelemetryRecord) {
    let code = record.event.to_raw();
    match record.details {
        TelemetryPayload::Monitor(details) => emit_log(
            record.timestamp,
            code,
            Some(u64::from(details.error_count)),
            None,
        ),
        TelemetryPayload::Led(details) => emit_log(
            record.timestamp,
            code,
            None,
            details.elapsed_since_previous,
        ),
        TelemetryPayload::None => emit_log(record.timestamp, code, None, None),
    }
}

#[cfg(target_os = "none")]
fn emit_log(timestamp_ms: u64, code: u16, errors: Option<u64>, delta_ms: Option<u64>) {
    let event = status_core::telemetry::TelemetryEventKind::from_raw(code);
    match (errors, delta_ms) {
        (Some(count), _) => defmt::info!(
            "telemetry:{=str} t={}ms errors={}",
            event_label(event),
            timestamp_ms,
            count
        ),
        (None, Some(delta)) => defmt::info!(
            "telemetry:{=str} t={}ms Δ={}ms",
            event_label(event),
            timestamp_ms,
            delta
        ),
        (None, None) => {
            defmt::info!("telemetry:{=str} t={}ms", event_label(event), timestamp_ms);
        }
    }
}

#[cfg(not(target_os = "none"))]
fn emit_log(timestamp_ms: u64, code: u16, errors: Option<u64>, delta_ms: Option<u64>) {
    let event = status_core::telemetry::TelemetryEventKind::from_raw(code);
    match (errors, delta_ms) {
        (Some(count), _) => println!("telemetry:{event} t={timestamp_ms}ms errors={count}"),
        (None, Some(delta)) => println!("telemetry:{event} t={timestamp_ms}ms Δ={delta}ms"),
        (None, None) => println!("telemetry:{event} t={timestamp_ms}ms"),
    }
}

#[cfg(target_os = "none")]
const fn event_label(event: status_core::telemetry::TelemetryEventKind) -> &'static str {
    use status_core::led::{CanHealth, UsbHealth};
    use status_core::monitor::BusState;
    use status_core::telemetry::TelemetryEventKind;

    match event {
        TelemetryEventKind::BusState(BusState::Active) => "bus active",
        TelemetryEventKind::BusState(BusState::Warning) => "bus warning",
        TelemetryEventKind::BusState(BusState::Passive) => "bus passive",
        TelemetryEventKind::BusState(BusState::ErrorStop) => "bus error-stop",
        TelemetryEventKind::ForcedBusOff => "forced bus-off",
        TelemetryEventKind::CanLed(CanHealth::Off) => "can-led off",
        TelemetryEventKind::CanLed(CanHealth::Active) => "can-led active",
        TelemetryEventKind::CanLed(CanHealth::Warning) => "can-led warning",
        TelemetryEventKind::CanLed(CanHealth::Error) => "can-led error",
        TelemetryEventKind::UsbLed(UsbHealth::NotReady) => "usb-led not-ready",
        TelemetryEventKind::UsbLed(UsbHealth::Ready) => "usb-led ready",
        TelemetryEventKind::UsbLed(UsbHealth::Error) => "usb-led error",
        TelemetryEventKind::ChannelStarted => "channel started",
        TelemetryEventKind::ChannelStopped => "channel stopped",
        TelemetryEventKind::Custom(_) => "custom",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use status_core::monitor::BusState;
    use status_core::telemetry::TelemetryEventKind;

    #[test]
    fn flush_emits_each_record_once() {
        let mut recorder: TelemetryRecorder<8> = TelemetryRecorder::new();
        let mut mirror = TelemetryMirror::new();

        recorder.record(TelemetryEventKind::ChannelStarted, TelemetryPayload::None, 10);
        recorder.record_bus_state(BusState::Active, BusState::Warning, 12, 60);
        assert_eq!(mirror.flush(&recorder), 2);
        assert_eq!(mirror.flush(&recorder), 0);

        recorder.record(TelemetryEventKind::ForcedBusOff, TelemetryPayload::None, 110);
        assert_eq!(mirror.flush(&recorder), 1);
    }

    #[test]
    fn flush_skips_records_lost_to_wraparound() {
        let mut recorder: TelemetryRecorder<2> = TelemetryRecorder::new();
        let mut mirror = TelemetryMirror::new();

        for at in 0..5 {
            recorder.record(TelemetryEventKind::Custom(7), TelemetryPayload::None, at);
        }
        assert_eq!(mirror.flush(&recorder), 2);
    }
}
