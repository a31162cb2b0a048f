use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_sync::channel::Channel;
use embassy_sync::signal::Signal;
use static_cell::StaticCell;
use status_core::config::LedTiming;

use crate::events::{CanControlSignal, EventChannel, GsUsbGate};
use crate::hw::GpioLeds;
use crate::usb;

mod can_task;
mod status_task;
mod usb_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

pub(super) static EVENTS: EventChannel = Channel::new();
pub(super) static GS_USB_GATE: GsUsbGate = GsUsbGate::new(&LedTiming::new());
pub(super) static CAN_CONTROL: CanControlSignal = Signal::new();
pub(super) static USB_STORAGE: StaticCell<usb::UsbDeviceStorage> = StaticCell::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let mut config = hal::Config::default();
    config.rcc.mux.fdcansel = hal::rcc::mux::Fdcansel::PCLK1;
    let hal::Peripherals {
        PC6,
        PC7,
        FDCAN1,
        PB8,
        PB9,
        USB,
        PA11,
        PA12,
        ..
    } = hal::init(config);

    let leds = GpioLeds::new(PC6, PC7);

    spawner
        .spawn(status_task::run(leds))
        .expect("failed to spawn status task");

    spawner
        .spawn(can_task::run(FDCAN1, PB8, PB9))
        .expect("failed to spawn CAN task");

    spawner
        .spawn(usb_task::run(USB, PA12, PA11))
        .expect("failed to spawn USB task");

    core::future::pending::<()>().await;
}
