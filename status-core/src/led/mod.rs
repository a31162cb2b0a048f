//! Status LED controller.
//!
//! Each channel shows a steady blink pattern chosen from its health level and
//! can briefly invert it to signal traffic. Pattern changes are debounced: a
//! channel switches at most once per dwell interval no matter how quickly the
//! requested health flaps, and it always lands on whatever was requested last.
//! All work is driven by [`LedController::tick`]; nothing here blocks or
//! allocates.

pub mod pattern;

use core::fmt;

use crate::config::LedTiming;
use pattern::{Pattern, PatternTable, Segment};

/// Physical indicator selector.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum LedChannelId {
    Can,
    Usb,
}

impl fmt::Display for LedChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedChannelId::Can => f.write_str("can"),
            LedChannelId::Usb => f.write_str("usb"),
        }
    }
}

/// Health shown on the CAN indicator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum CanHealth {
    #[default]
    Off,
    Active,
    Warning,
    Error,
}

impl CanHealth {
    pub const COUNT: usize = 4;

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            CanHealth::Off => 0,
            CanHealth::Active => 1,
            CanHealth::Warning => 2,
            CanHealth::Error => 3,
        }
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(CanHealth::Off),
            1 => Some(CanHealth::Active),
            2 => Some(CanHealth::Warning),
            3 => Some(CanHealth::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CanHealth::Off => "off",
            CanHealth::Active => "active",
            CanHealth::Warning => "warning",
            CanHealth::Error => "error",
        }
    }
}

impl fmt::Display for CanHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Health shown on the USB indicator.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum UsbHealth {
    #[default]
    NotReady,
    Ready,
    Error,
}

impl UsbHealth {
    pub const COUNT: usize = 3;

    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            UsbHealth::NotReady => 0,
            UsbHealth::Ready => 1,
            UsbHealth::Error => 2,
        }
    }

    #[must_use]
    pub const fn from_index(index: usize) -> Option<Self> {
        match index {
            0 => Some(UsbHealth::NotReady),
            1 => Some(UsbHealth::Ready),
            2 => Some(UsbHealth::Error),
            _ => None,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            UsbHealth::NotReady => "not-ready",
            UsbHealth::Ready => "ready",
            UsbHealth::Error => "error",
        }
    }
}

impl fmt::Display for UsbHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Health enum that owns one LED channel.
pub trait HealthLevel: Copy + Eq {
    /// Level shown right after power-up.
    const INITIAL: Self;

    fn pattern(self, table: &PatternTable) -> Pattern;
}

impl HealthLevel for CanHealth {
    const INITIAL: Self = CanHealth::Off;

    fn pattern(self, table: &PatternTable) -> Pattern {
        table.can_pattern(self)
    }
}

impl HealthLevel for UsbHealth {
    const INITIAL: Self = UsbHealth::NotReady;

    fn pattern(self, table: &PatternTable) -> Pattern {
        table.usb_pattern(self)
    }
}

/// Sink for the per-tick LED levels.
pub trait LedOutput {
    fn set_level(&mut self, channel: LedChannelId, on: bool);
}

/// Position inside a pattern. Advancing is O(1) per tick.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
struct PatternCursor {
    segment: usize,
    segment_tick: u16,
    phase_tick: u16,
}

impl PatternCursor {
    const fn start() -> Self {
        Self {
            segment: 0,
            segment_tick: 0,
            phase_tick: 0,
        }
    }

    fn current(self, pattern: Pattern) -> Option<Segment> {
        pattern.segments().get(self.segment).copied()
    }

    fn level(self, pattern: Pattern) -> bool {
        self.current(pattern).is_some_and(|segment| segment.level)
    }

    fn advance(&mut self, pattern: Pattern) {
        let Some(segment) = self.current(pattern) else {
            *self = Self::start();
            return;
        };

        self.segment_tick = self.segment_tick.saturating_add(1);
        self.phase_tick = self.phase_tick.saturating_add(1);
        if self.segment_tick >= segment.ticks {
            self.segment_tick = 0;
            self.segment += 1;
            if self.segment >= pattern.segments().len() {
                self.segment = 0;
                self.phase_tick = 0;
            }
        }
    }
}

/// Debounced pattern state for one indicator.
#[derive(Copy, Clone, Debug)]
pub struct LedChannel<H> {
    requested: H,
    displayed: H,
    pattern: Pattern,
    cursor: PatternCursor,
    last_transition_tick: Option<u32>,
    activity_remaining: u8,
}

/// Level produced by one channel tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ChannelStep<H> {
    pub level: bool,
    /// New displayed health when the pattern switched on this tick.
    pub transition: Option<H>,
}

impl<H: HealthLevel> LedChannel<H> {
    fn new(table: &PatternTable) -> Self {
        Self {
            requested: H::INITIAL,
            displayed: H::INITIAL,
            pattern: H::INITIAL.pattern(table),
            cursor: PatternCursor::start(),
            last_transition_tick: None,
            activity_remaining: 0,
        }
    }

    fn request(&mut self, health: H) {
        self.requested = health;
    }

    fn arm_activity(&mut self, ticks: u8) {
        self.activity_remaining = ticks;
    }

    fn dwell_elapsed(&self, now: u32, dwell_ticks: u32) -> bool {
        self.last_transition_tick
            .is_none_or(|last| now.wrapping_sub(last) >= dwell_ticks)
    }

    fn tick(&mut self, now: u32, dwell_ticks: u32, table: &PatternTable) -> ChannelStep<H> {
        let mut transition = None;
        if self.requested != self.displayed && self.dwell_elapsed(now, dwell_ticks) {
            self.displayed = self.requested;
            self.pattern = self.displayed.pattern(table);
            self.cursor = PatternCursor::start();
            self.last_transition_tick = Some(now);
            transition = Some(self.displayed);
        }

        let steady = self.cursor.level(self.pattern);
        self.cursor.advance(self.pattern);

        let level = if self.activity_remaining > 0 {
            self.activity_remaining -= 1;
            !steady
        } else {
            steady
        };

        ChannelStep { level, transition }
    }

    #[must_use]
    pub fn requested(&self) -> H {
        self.requested
    }

    #[must_use]
    pub fn displayed(&self) -> H {
        self.displayed
    }

    #[must_use]
    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    #[must_use]
    pub fn phase_tick(&self) -> u16 {
        self.cursor.phase_tick
    }

    #[must_use]
    pub fn last_transition_tick(&self) -> Option<u32> {
        self.last_transition_tick
    }

    #[must_use]
    pub fn activity_remaining(&self) -> u8 {
        self.activity_remaining
    }
}

/// Levels and transitions produced by one controller tick.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LedFrame {
    pub tick: u32,
    pub can: bool,
    pub usb: bool,
    pub can_transition: Option<CanHealth>,
    pub usb_transition: Option<UsbHealth>,
}

impl LedFrame {
    #[must_use]
    pub const fn level(&self, channel: LedChannelId) -> bool {
        match channel {
            LedChannelId::Can => self.can,
            LedChannelId::Usb => self.usb,
        }
    }

    #[must_use]
    pub const fn transitioned(&self) -> bool {
        self.can_transition.is_some() || self.usb_transition.is_some()
    }
}

/// Drives the CAN and USB indicators.
#[derive(Clone, Debug)]
pub struct LedController {
    can: LedChannel<CanHealth>,
    usb: LedChannel<UsbHealth>,
    table: PatternTable,
    timing: LedTiming,
    dwell_ticks: u32,
    tick_count: u32,
}

impl LedController {
    #[must_use]
    pub fn new(table: PatternTable, timing: LedTiming) -> Self {
        Self {
            can: LedChannel::new(&table),
            usb: LedChannel::new(&table),
            table,
            timing,
            dwell_ticks: timing.dwell_ticks(),
            tick_count: 0,
        }
    }

    /// Returns both channels to their power-up patterns.
    pub fn init(&mut self) {
        *self = Self::new(self.table, self.timing);
    }

    pub fn set_can_state(&mut self, health: CanHealth) {
        self.can.request(health);
    }

    pub fn set_usb_state(&mut self, health: UsbHealth) {
        self.usb.request(health);
    }

    /// (Re)arms the activity override for `LED_TICKS_ACTIVITY` ticks.
    pub fn notify_activity(&mut self, channel: LedChannelId) {
        let ticks = self.timing.activity_ticks;
        match channel {
            LedChannelId::Can => self.can.arm_activity(ticks),
            LedChannelId::Usb => self.usb.arm_activity(ticks),
        }
    }

    /// Advances both channels by one tick.
    pub fn tick(&mut self) -> LedFrame {
        let now = self.tick_count;
        let can = self.can.tick(now, self.dwell_ticks, &self.table);
        let usb = self.usb.tick(now, self.dwell_ticks, &self.table);
        self.tick_count = self.tick_count.wrapping_add(1);

        LedFrame {
            tick: now,
            can: can.level,
            usb: usb.level,
            can_transition: can.transition,
            usb_transition: usb.transition,
        }
    }

    /// Ticks and writes both levels to `output`.
    pub fn drive<O: LedOutput>(&mut self, output: &mut O) -> LedFrame {
        let frame = self.tick();
        output.set_level(LedChannelId::Can, frame.can);
        output.set_level(LedChannelId::Usb, frame.usb);
        frame
    }

    #[must_use]
    pub fn can(&self) -> &LedChannel<CanHealth> {
        &self.can
    }

    #[must_use]
    pub fn usb(&self) -> &LedChannel<UsbHealth> {
        &self.usb
    }

    #[must_use]
    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    #[must_use]
    pub fn dwell_ticks(&self) -> u32 {
        self.dwell_ticks
    }

    #[must_use]
    pub fn timing(&self) -> &LedTiming {
        &self.timing
    }
}
