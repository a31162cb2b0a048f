//! USB device identity, WinUSB descriptors and the status control handler.
//!
//! The adapter enumerates as a single vendor-specific interface. Windows binds
//! WinUSB to it through the MS OS 2.0 descriptor set, Linux binds `gs_usb` by
//! VID/PID. Frame transport is owned by the host driver stack; this module only
//! watches the control pipe for the requests that change what the LEDs show.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use status_core::events::GsUsbEvent;
use status_core::status::GET_STATUS_REQUEST;

pub const USB_VID: u16 = 0x1D50;
pub const USB_PID: u16 = 0x606F;

/// Vendor request code the host uses to fetch the MS OS 2.0 descriptor set.
pub const MSOS_VENDOR_CODE: u8 = 0x01;
pub const DEVICE_INTERFACE_GUID: &str = "{c6e515a2-8dc6-4fc4-a03c-932555d68e6}";

/// gs_usb `MODE` request; the payload's first word selects reset or start.
pub const GS_USB_BREQ_MODE: u8 = 2;
const GS_USB_MODE_RESET: u32 = 0;
const GS_USB_MODE_START: u32 = 1;

#[cfg(target_os = "none")]
pub const MAX_PACKET_SIZE: u8 = 64;

#[cfg(target_os = "none")]
const CONTROL_BUFFER_LEN: usize = 64;
#[cfg(target_os = "none")]
const CONFIG_DESCRIPTOR_LEN: usize = 128;
#[cfg(target_os = "none")]
const BOS_DESCRIPTOR_LEN: usize = 64;
#[cfg(target_os = "none")]
const MSOS_DESCRIPTOR_LEN: usize = 256;

/// User-visible strings advertised in the USB descriptors.
#[derive(Clone, Copy, Debug)]
pub struct UsbDeviceStrings {
    pub manufacturer: &'static str,
    pub product: &'static str,
    pub serial_number: Option<&'static str>,
}

impl Default for UsbDeviceStrings {
    fn default() -> Self {
        Self {
            manufacturer: "wentywenty",
            product: "roboto_usb2can",
            serial_number: None,
        }
    }
}

/// Vendor control requests the status handler understands.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ControlRequest {
    /// gs_usb `MODE` with a start or reset payload.
    Mode(GsUsbEvent),
    GetStatus,
}

/// Decodes a vendor OUT request carrying `data`.
#[must_use]
pub fn decode_control_out(request: u8, data: &[u8]) -> Option<ControlRequest> {
    if request != GS_USB_BREQ_MODE {
        return None;
    }
    let word: [u8; 4] = data.get(..4)?.try_into().ok()?;
    match u32::from_le_bytes(word) {
        GS_USB_MODE_START => Some(ControlRequest::Mode(GsUsbEvent::ChannelStarted)),
        GS_USB_MODE_RESET => Some(ControlRequest::Mode(GsUsbEvent::ChannelStopped)),
        _ => None,
    }
}

/// Decodes a vendor IN request.
#[must_use]
pub const fn decode_control_in(request: u8) -> Option<ControlRequest> {
    if request == GET_STATUS_REQUEST {
        Some(ControlRequest::GetStatus)
    } else {
        None
    }
}

#[cfg(target_os = "none")]
pub use device::{StatusHandler, UsbDeviceStorage, build_device};

#[cfg(target_os = "none")]
mod device {
    use embassy_time::Instant;
    use embassy_usb::control::{InResponse, OutResponse, Recipient, Request, RequestType};
    use embassy_usb::msos::{self, windows_version};
    use embassy_usb::types::InterfaceNumber;
    use embassy_usb::{Builder, Handler, UsbDevice};
    use status_core::events::{GsUsbDecision, StatusEvent};
    use status_core::led::UsbHealth;

    use super::{
        BOS_DESCRIPTOR_LEN, CONFIG_DESCRIPTOR_LEN, CONTROL_BUFFER_LEN, ControlRequest,
        DEVICE_INTERFACE_GUID, MAX_PACKET_SIZE, MSOS_DESCRIPTOR_LEN, MSOS_VENDOR_CODE, USB_PID,
        USB_VID, UsbDeviceStrings, decode_control_in, decode_control_out,
    };
    use crate::events::{CanCommand, CanControlSignal, ChannelEventSink, GsUsbGate};
    use crate::status;

    /// Translates USB bus callbacks and vendor requests into status events.
    pub struct StatusHandler {
        sink: ChannelEventSink<'static>,
        gate: &'static GsUsbGate,
        can_control: &'static CanControlSignal,
        interface: Option<InterfaceNumber>,
        configured: bool,
    }

    impl StatusHandler {
        pub fn new(
            sink: ChannelEventSink<'static>,
            gate: &'static GsUsbGate,
            can_control: &'static CanControlSignal,
        ) -> Self {
            Self {
                sink,
                gate,
                can_control,
                interface: None,
                configured: false,
            }
        }

        fn report(&self, health: UsbHealth) {
            self.sink.post(StatusEvent::UsbState(health));
        }

        fn addressed_to_us(&self, req: &Request) -> bool {
            if req.request_type != RequestType::Vendor {
                return false;
            }
            match req.recipient {
                Recipient::Device => true,
                Recipient::Interface => self
                    .interface
                    .is_some_and(|iface| u16::from(iface.0) == req.index),
                _ => false,
            }
        }

        fn apply_mode(&self, event: status_core::events::GsUsbEvent) {
            let now = Instant::now().as_millis();
            match self.gate.submit(event, now, &self.sink) {
                GsUsbDecision::Forward(StatusEvent::ChannelStarted { .. }) => {
                    defmt::info!("usb: host started channel");
                    self.can_control.signal(CanCommand::Start);
                }
                GsUsbDecision::Forward(StatusEvent::ChannelStopped { .. }) => {
                    defmt::info!("usb: host stopped channel");
                    self.can_control.signal(CanCommand::Stop);
                }
                GsUsbDecision::SpuriousStop => {
                    defmt::debug!("usb: ignoring repeated stop at {}ms", now);
                }
                GsUsbDecision::Forward(_) | GsUsbDecision::Throttled => {}
            }
        }
    }

    impl Handler for StatusHandler {
        fn reset(&mut self) {
            self.configured = false;
            self.report(UsbHealth::NotReady);
        }

        fn configured(&mut self, configured: bool) {
            self.configured = configured;
            if configured {
                defmt::info!("usb: configured");
                self.report(UsbHealth::Ready);
            } else {
                self.report(UsbHealth::NotReady);
            }
        }

        fn suspended(&mut self, suspended: bool) {
            if suspended {
                self.report(UsbHealth::NotReady);
            } else if self.configured {
                self.report(UsbHealth::Ready);
            }
        }

        fn control_out(&mut self, req: Request, data: &[u8]) -> Option<OutResponse> {
            if !self.addressed_to_us(&req) {
                return None;
            }
            match decode_control_out(req.request, data)? {
                ControlRequest::Mode(event) => {
                    self.apply_mode(event);
                    self.sink.post(StatusEvent::UsbActivity);
                    Some(OutResponse::Accepted)
                }
                ControlRequest::GetStatus => None,
            }
        }

        fn control_in<'a>(&'a mut self, req: Request, buf: &'a mut [u8]) -> Option<InResponse<'a>> {
            if !self.addressed_to_us(&req) {
                return None;
            }
            match decode_control_in(req.request)? {
                ControlRequest::GetStatus => {
                    let slot = buf.first_mut()?;
                    *slot = status::status_byte();
                    self.sink.post(StatusEvent::UsbActivity);
                    Some(InResponse::Accepted(&buf[..1]))
                }
                ControlRequest::Mode(_) => None,
            }
        }
    }

    /// Backing storage for the Embassy USB builder and the control handler.
    pub struct UsbDeviceStorage {
        control_buf: [u8; CONTROL_BUFFER_LEN],
        config_descriptor: [u8; CONFIG_DESCRIPTOR_LEN],
        bos_descriptor: [u8; BOS_DESCRIPTOR_LEN],
        msos_descriptor: [u8; MSOS_DESCRIPTOR_LEN],
        handler: StatusHandler,
    }

    impl UsbDeviceStorage {
        pub fn new(handler: StatusHandler) -> Self {
            Self {
                control_buf: [0; CONTROL_BUFFER_LEN],
                config_descriptor: [0; CONFIG_DESCRIPTOR_LEN],
                bos_descriptor: [0; BOS_DESCRIPTOR_LEN],
                msos_descriptor: [0; MSOS_DESCRIPTOR_LEN],
                handler,
            }
        }
    }

    /// Builds the device: one vendor interface, WinUSB compatible ID, status handler.
    pub fn build_device<D>(
        driver: D,
        storage: &'static mut UsbDeviceStorage,
        strings: UsbDeviceStrings,
    ) -> UsbDevice<'static, D>
    where
        D: embassy_usb::driver::Driver<'static>,
    {
        let mut config = embassy_usb::Config::new(USB_VID, USB_PID);
        config.manufacturer = Some(strings.manufacturer);
        config.product = Some(strings.product);
        config.serial_number = strings.serial_number;
        config.max_packet_size_0 = MAX_PACKET_SIZE;
        config.max_power = 100;
        config.device_class = 0x00;
        config.device_sub_class = 0x00;
        config.device_protocol = 0x00;

        let UsbDeviceStorage {
            control_buf,
            config_descriptor,
            bos_descriptor,
            msos_descriptor,
            handler,
        } = storage;

        let mut builder = Builder::new(
            driver,
            config,
            config_descriptor,
            bos_descriptor,
            msos_descriptor,
            control_buf,
        );
        builder.msos_descriptor(windows_version::WIN8_1, MSOS_VENDOR_CODE);

        let interface_number = {
            let mut function = builder.function(0xFF, 0x00, 0x00);
            function.msos_feature(msos::CompatibleIdFeatureDescriptor::new("WINUSB", ""));
            function.msos_feature(msos::RegistryPropertyFeatureDescriptor::new(
                "DeviceInterfaceGUIDs",
                msos::PropertyData::RegMultiSz(&[DEVICE_INTERFACE_GUID]),
            ));
            let mut interface = function.interface();
            let number = interface.interface_number();
            let _alt = interface.alt_setting(0xFF, 0x00, 0x00, None);
            number
        };

        handler.interface = Some(interface_number);
        builder.handler(handler);
        builder.build()
    }
}
