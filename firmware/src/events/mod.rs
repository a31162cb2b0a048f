//! Status event channel shared by the CAN task, the USB handler and the tick.
//!
//! Producers only ever `try_send`: a full channel drops the event and bumps a
//! counter instead of blocking an interrupt-driven context. The status task is
//! the single consumer and drains what was queued when its tick started.

#![cfg_attr(not(target_os = "none"), allow(dead_code))]

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::channel::{Channel, Receiver, Sender, TryReceiveError, TrySendError};
use embassy_sync::signal::Signal;
use status_core::Millis;
use status_core::config::LedTiming;
use status_core::events::{
    EventPostError, GsUsbDecision, GsUsbEvent, GsUsbEventFilter, StatusEvent, StatusEventSink,
    StatusEventSource,
};

use crate::status;

#[cfg(not(target_os = "none"))]
use embassy_sync::blocking_mutex::raw::NoopRawMutex;
#[cfg(target_os = "none")]
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;

#[cfg(target_os = "none")]
pub type StatusMutex = CriticalSectionRawMutex;
#[cfg(not(target_os = "none"))]
pub type StatusMutex = NoopRawMutex;

/// Depth of the status event channel.
pub const EVENT_QUEUE_DEPTH: usize = 32;

pub type EventChannel = Channel<StatusMutex, StatusEvent, EVENT_QUEUE_DEPTH>;
pub type EventSender<'a> = Sender<'a, StatusMutex, StatusEvent, EVENT_QUEUE_DEPTH>;
pub type EventReceiver<'a> = Receiver<'a, StatusMutex, StatusEvent, EVENT_QUEUE_DEPTH>;

/// Requests for the task that owns the CAN controller.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CanCommand {
    Start,
    Stop,
    /// Stop requested by the error monitor rather than the host.
    ForceBusOff,
}

pub type CanControlSignal = Signal<StatusMutex, CanCommand>;

/// Adapter that lets an embassy sender satisfy the core sink trait.
#[derive(Clone, Copy)]
pub struct ChannelEventSink<'a> {
    sender: EventSender<'a>,
}

impl<'a> ChannelEventSink<'a> {
    pub fn new(sender: EventSender<'a>) -> Self {
        Self { sender }
    }

    /// Posts an event, counting it as dropped when the channel is full.
    pub fn post(&self, event: StatusEvent) {
        if self.sender.try_send(event).is_err() {
            status::record_dropped_event();
        }
    }
}

impl StatusEventSink for ChannelEventSink<'_> {
    fn try_post(&mut self, event: StatusEvent) -> Result<(), EventPostError> {
        match self.sender.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                status::record_dropped_event();
                Err(EventPostError::QueueFull)
            }
        }
    }
}

/// Adapter that lets an embassy receiver satisfy the core source trait.
pub struct ChannelEventSource<'a> {
    receiver: EventReceiver<'a>,
}

impl<'a> ChannelEventSource<'a> {
    pub fn new(receiver: EventReceiver<'a>) -> Self {
        Self { receiver }
    }
}

impl StatusEventSource for ChannelEventSource<'_> {
    fn pending(&self) -> usize {
        self.receiver.len()
    }

    fn try_next(&mut self) -> Option<StatusEvent> {
        match self.receiver.try_receive() {
            Ok(event) => Some(event),
            Err(TryReceiveError::Empty) => None,
        }
    }
}

/// gs_usb event filter shared between the USB control handler and the CAN task.
pub struct GsUsbGate {
    filter: Mutex<StatusMutex, RefCell<GsUsbEventFilter>>,
}

impl GsUsbGate {
    pub const fn new(timing: &LedTiming) -> Self {
        Self {
            filter: Mutex::new(RefCell::new(GsUsbEventFilter::new(timing))),
        }
    }

    /// Filters `event` and posts it when accepted.
    pub fn submit(
        &self,
        event: GsUsbEvent,
        now: Millis,
        sink: &ChannelEventSink<'_>,
    ) -> GsUsbDecision {
        let decision = self
            .filter
            .lock(|filter| filter.borrow_mut().filter(event, now));
        if let GsUsbDecision::Forward(accepted) = decision {
            sink.post(accepted);
        }
        decision
    }
}
