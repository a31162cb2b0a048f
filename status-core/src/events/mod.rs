//! Event plumbing between the interrupt-side producers and the tick consumer.
//!
//! Producers never touch the monitor or the LEDs directly. They post
//! [`StatusEvent`]s into a bounded queue that the tick drains once per period,
//! so every event posted before a tick starts is reflected in that tick.

use core::fmt;

use heapless::Deque;

use crate::Millis;
use crate::config::LedTiming;
use crate::led::UsbHealth;
use crate::monitor::ControllerState;

/// Default depth for host-side event queues.
pub const EVENT_QUEUE_DEPTH: usize = 32;

/// Health notification consumed by the status context.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StatusEvent {
    /// Error frame or error interrupt from the CAN controller.
    CanError { at: Millis },
    /// Fault-confinement state change reported by the CAN controller.
    CanController { state: ControllerState, at: Millis },
    /// Frame received or transmitted successfully.
    CanActivity,
    /// USB stack readiness changed.
    UsbState(UsbHealth),
    /// USB transfer completed.
    UsbActivity,
    /// Host opened the CAN channel.
    ChannelStarted { at: Millis },
    /// Host closed the CAN channel.
    ChannelStopped { at: Millis },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StatusEvent::CanError { at } => write!(f, "can-error @{at}ms"),
            StatusEvent::CanController { state, at } => write!(f, "controller {state} @{at}ms"),
            StatusEvent::CanActivity => f.write_str("can-activity"),
            StatusEvent::UsbState(health) => write!(f, "usb {health}"),
            StatusEvent::UsbActivity => f.write_str("usb-activity"),
            StatusEvent::ChannelStarted { at } => write!(f, "channel-started @{at}ms"),
            StatusEvent::ChannelStopped { at } => write!(f, "channel-stopped @{at}ms"),
        }
    }
}

/// Error surfaced when an event cannot be posted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EventPostError {
    /// Queue has reached its maximum capacity; the event was dropped.
    QueueFull,
}

impl fmt::Display for EventPostError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventPostError::QueueFull => f.write_str("status event queue full"),
        }
    }
}

/// Implemented by producers that hand events to the tick context.
pub trait StatusEventSink {
    /// Attempts to post an event without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`EventPostError::QueueFull`] when the event was dropped.
    fn try_post(&mut self, event: StatusEvent) -> Result<(), EventPostError>;
}

/// Implemented by the single consumer drained once per tick.
pub trait StatusEventSource {
    /// Number of events queued right now.
    fn pending(&self) -> usize;

    /// Pops the oldest event, if any.
    fn try_next(&mut self) -> Option<StatusEvent>;
}

/// Fixed-capacity FIFO used by host targets and tests.
#[derive(Debug)]
pub struct EventQueue<const N: usize = EVENT_QUEUE_DEPTH> {
    events: Deque<StatusEvent, N>,
    dropped: u32,
}

impl<const N: usize> EventQueue<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            events: Deque::new(),
            dropped: 0,
        }
    }

    /// Events rejected because the queue was full.
    #[must_use]
    pub const fn dropped(&self) -> u32 {
        self.dropped
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    #[must_use]
    pub fn is_full(&self) -> bool {
        self.events.is_full()
    }
}

impl<const N: usize> Default for EventQueue<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> StatusEventSink for EventQueue<N> {
    fn try_post(&mut self, event: StatusEvent) -> Result<(), EventPostError> {
        self.events.push_back(event).map_err(|_| {
            self.dropped = self.dropped.saturating_add(1);
            EventPostError::QueueFull
        })
    }
}

impl<const N: usize> StatusEventSource for EventQueue<N> {
    fn pending(&self) -> usize {
        self.events.len()
    }

    fn try_next(&mut self) -> Option<StatusEvent> {
        self.events.pop_front()
    }
}

/// Channel notifications raised by the gs_usb class layer.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GsUsbEvent {
    ActivityRx,
    ActivityTx,
    ChannelStarted,
    ChannelStopped,
}

/// Outcome of [`GsUsbEventFilter::filter`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum GsUsbDecision {
    Forward(StatusEvent),
    /// Activity arrived inside the low-pass holdoff.
    Throttled,
    /// STOP arrived too soon after the previous accepted STOP.
    SpuriousStop,
}

/// Rate limiter for gs_usb channel events.
///
/// Some Linux hosts send a burst of duplicate STOP requests when an interface
/// goes down; those are dropped until `min_stop_interval_ms` has passed since
/// the last accepted STOP, unless the channel was started in between.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct GsUsbEventFilter {
    activity_holdoff_ms: u32,
    min_stop_interval_ms: u32,
    activity_allowed_at: Millis,
    stop_allowed_at: Millis,
}

impl GsUsbEventFilter {
    #[must_use]
    pub const fn new(timing: &LedTiming) -> Self {
        Self {
            activity_holdoff_ms: timing.activity_holdoff_ms(),
            min_stop_interval_ms: timing.min_stop_interval_ms,
            activity_allowed_at: 0,
            stop_allowed_at: 0,
        }
    }

    pub fn filter(&mut self, event: GsUsbEvent, now: Millis) -> GsUsbDecision {
        match event {
            GsUsbEvent::ActivityRx | GsUsbEvent::ActivityTx => {
                if now < self.activity_allowed_at {
                    return GsUsbDecision::Throttled;
                }
                self.activity_allowed_at = now + Millis::from(self.activity_holdoff_ms);
                GsUsbDecision::Forward(StatusEvent::CanActivity)
            }
            GsUsbEvent::ChannelStarted => {
                self.stop_allowed_at = now;
                GsUsbDecision::Forward(StatusEvent::ChannelStarted { at: now })
            }
            GsUsbEvent::ChannelStopped => {
                if now < self.stop_allowed_at {
                    return GsUsbDecision::SpuriousStop;
                }
                self.stop_allowed_at = now + Millis::from(self.min_stop_interval_ms);
                GsUsbDecision::Forward(StatusEvent::ChannelStopped { at: now })
            }
        }
    }
}
