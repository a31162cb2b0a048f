use embassy_stm32 as hal;
use embassy_stm32::Peri;

use super::{CAN_CONTROL, EVENTS, GS_USB_GATE, USB_STORAGE};
use crate::events::ChannelEventSink;
use crate::usb::{self, StatusHandler, UsbDeviceStrings};

embassy_stm32::bind_interrupts!(struct UsbIrqs {
    USB_UCPD1_2 => embassy_stm32::usb::InterruptHandler<hal::peripherals::USB>;
});

#[embassy_executor::task]
pub async fn run(
    usb: Peri<'static, hal::peripherals::USB>,
    dp: Peri<'static, hal::peripherals::PA12>,
    dm: Peri<'static, hal::peripherals::PA11>,
) -> ! {
    let handler = StatusHandler::new(
        ChannelEventSink::new(EVENTS.sender()),
        &GS_USB_GATE,
        &CAN_CONTROL,
    );
    let storage = USB_STORAGE.init(usb::UsbDeviceStorage::new(handler));
    let driver = embassy_stm32::usb::Driver::new(usb, UsbIrqs, dp, dm);

    let mut device = usb::build_device(driver, storage, UsbDeviceStrings::default());
    device.run().await
}
