use embassy_futures::select::{Either3, select3};
use embassy_stm32 as hal;
use embassy_stm32::Peri;
use embassy_stm32::can::{self, BusErrorMode, CanConfigurator, OperatingMode};
use embassy_time::{Instant, Timer};
use status_core::events::{GsUsbEvent, StatusEvent};

use super::{CAN_CONTROL, EVENTS, GS_USB_GATE};
use crate::events::{CanCommand, ChannelEventSink};
use crate::hw::can::{ControllerTracker, ErrorCounters};

embassy_stm32::bind_interrupts!(struct CanIrqs {
    TIM16_FDCAN_IT0 => can::IT0InterruptHandler<hal::peripherals::FDCAN1>;
    TIM17_FDCAN_IT1 => can::IT1InterruptHandler<hal::peripherals::FDCAN1>;
});

/// Nominal bitrate used until the host's bit timing request is honoured.
const NOMINAL_BITRATE: u32 = 500_000;
/// Interval between protocol status polls while the channel runs.
const STATE_POLL_MS: u64 = 10;

fn now_ms() -> u64 {
    Instant::now().as_millis()
}

fn read_counters(properties: &can::Properties) -> ErrorCounters {
    let mode = properties.bus_error_mode();
    ErrorCounters {
        tx: properties.tx_error_count(),
        rx: properties.rx_error_count(),
        passive: matches!(mode, BusErrorMode::ErrorPassive),
        bus_off: matches!(mode, BusErrorMode::BusOff),
    }
}

/// Observes FDCAN1 while the host has the channel started.
///
/// Received frames become activity, read errors become error events and
/// counter changes become controller states. A stop from the host or a forced
/// bus-off from the status task tears the controller down until the next start.
#[embassy_executor::task]
pub async fn run(
    mut fdcan: Peri<'static, hal::peripherals::FDCAN1>,
    mut rx: Peri<'static, hal::peripherals::PB8>,
    mut tx: Peri<'static, hal::peripherals::PB9>,
) -> ! {
    let sink = ChannelEventSink::new(EVENTS.sender());
    let mut tracker = ControllerTracker::new();

    loop {
        while CAN_CONTROL.wait().await != CanCommand::Start {}

        let mut configurator =
            CanConfigurator::new(fdcan.reborrow(), rx.reborrow(), tx.reborrow(), CanIrqs);
        configurator.set_bitrate(NOMINAL_BITRATE);
        let mut controller = configurator.start(OperatingMode::NormalOperationMode);
        tracker.reset();
        defmt::info!("can: controller started");

        let reason = loop {
            match select3(
                controller.read(),
                Timer::after_millis(STATE_POLL_MS),
                CAN_CONTROL.wait(),
            )
            .await
            {
                Either3::First(Ok(_)) => {
                    GS_USB_GATE.submit(GsUsbEvent::ActivityRx, now_ms(), &sink);
                }
                Either3::First(Err(_)) => sink.post(StatusEvent::CanError { at: now_ms() }),
                Either3::Second(()) => {
                    if let Some(state) = tracker.update(read_counters(controller.properties())) {
                        defmt::debug!("can: controller {=str}", state.label());
                        sink.post(StatusEvent::CanController {
                            state,
                            at: now_ms(),
                        });
                    }
                }
                Either3::Third(CanCommand::Start) => {}
                Either3::Third(command) => break command,
            }
        };

        drop(controller);
        match reason {
            CanCommand::ForceBusOff => defmt::warn!("can: controller forced off"),
            _ => defmt::info!("can: controller stopped"),
        }
    }
}
