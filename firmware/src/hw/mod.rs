//! Board-level adapters: the two status LEDs and the FDCAN error counters.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

pub mod can;

#[cfg(target_os = "none")]
pub use leds::GpioLeds;

#[cfg(target_os = "none")]
mod leds {
    use embassy_stm32::gpio::{Level, Output, Speed};
    use embassy_stm32::{Peri, peripherals};
    use status_core::led::{LedChannelId, LedOutput};

    /// Push-pull outputs for the CAN (PC6) and USB (PC7) LEDs, active high.
    pub struct GpioLeds<'d> {
        can: Output<'d>,
        usb: Output<'d>,
    }

    impl<'d> GpioLeds<'d> {
        pub fn new(can: Peri<'d, peripherals::PC6>, usb: Peri<'d, peripherals::PC7>) -> Self {
            Self {
                can: Output::new(can, Level::Low, Speed::Low),
                usb: Output::new(usb, Level::Low, Speed::Low),
            }
        }
    }

    impl LedOutput for GpioLeds<'_> {
        fn set_level(&mut self, channel: LedChannelId, on: bool) {
            let pin = match channel {
                LedChannelId::Can => &mut self.can,
                LedChannelId::Usb => &mut self.usb,
            };
            pin.set_level(if on { Level::High } else { Level::Low });
        }
    }
}
