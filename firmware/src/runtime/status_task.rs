use embassy_time::{Duration, Instant, Ticker};
use status_core::config::Config;
use status_core::status::StatusContext;

use super::{CAN_CONTROL, EVENTS};
use crate::events::{CanCommand, ChannelEventSource};
use crate::hw::GpioLeds;
use crate::status;
use crate::telemetry::TelemetryMirror;

/// Owns the status context: drains events, ticks the monitor and LEDs.
#[embassy_executor::task]
pub async fn run(mut leds: GpioLeds<'static>) -> ! {
    let config = Config::new()
        .validate()
        .expect("invalid status configuration");
    let mut context = StatusContext::new(&config, Instant::now().as_millis());
    let mut source = ChannelEventSource::new(EVENTS.receiver());
    let mut mirror = TelemetryMirror::new();
    let mut ticker = Ticker::every(Duration::from_millis(u64::from(config.timing().tick_ms)));

    defmt::info!(
        "status: tick={}ms window={}ms",
        config.timing().tick_ms,
        config.monitor().window_ms
    );

    loop {
        ticker.next().await;
        let now = Instant::now().as_millis();

        context.drain(&mut source);
        let outcome = context.tick(now, &mut leds);

        if outcome.monitor.changed() {
            defmt::info!(
                "status: bus {=str} -> {=str} errors={}",
                outcome.monitor.previous.label(),
                outcome.monitor.state.label(),
                outcome.monitor.error_count
            );
        }
        if outcome.force_bus_off {
            defmt::warn!("status: error flood, forcing controller off");
            status::record_forced_stop();
            CAN_CONTROL.signal(CanCommand::ForceBusOff);
        }

        status::publish(&context.snapshot());
        status::record_led_levels(outcome.leds.can, outcome.leds.usb);
        mirror.flush(context.telemetry());
    }
}
