//! Blink pattern descriptors and the health-to-pattern mapping table.

use core::fmt;

use super::{CanHealth, LedChannelId, UsbHealth};
use crate::config::ConfigError;

/// One run of constant LED level, measured in ticks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Segment {
    pub level: bool,
    pub ticks: u16,
}

impl Segment {
    #[must_use]
    pub const fn on(ticks: u16) -> Self {
        Self { level: true, ticks }
    }

    #[must_use]
    pub const fn off(ticks: u16) -> Self {
        Self { level: false, ticks }
    }
}

const STEADY_OFF: [Segment; 1] = [Segment::off(1)];
const STEADY_ON: [Segment; 1] = [Segment::on(1)];
// 1 Hz at the default 50 ms tick.
const SLOW_BLINK: [Segment; 2] = [Segment::on(10), Segment::off(10)];
const FAST_BLINK: [Segment; 2] = [Segment::on(2), Segment::off(2)];
// 200 ms every 2 s.
const LONG_BLINK: [Segment; 2] = [Segment::on(4), Segment::off(36)];
// One 50 ms flash every 4 s. Starts dark so power-up stays quiet for a cycle.
const HEARTBEAT: [Segment; 2] = [Segment::off(79), Segment::on(1)];
const DOUBLE_PULSE: [Segment; 4] = [
    Segment::on(2),
    Segment::off(2),
    Segment::on(2),
    Segment::off(14),
];

/// Blink pattern shown on one LED channel.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Pattern {
    SteadyOff,
    SteadyOn,
    SlowBlink,
    FastBlink,
    LongBlink,
    Heartbeat,
    DoublePulse,
    /// Board-specific pattern; validated at startup like the canonical ones.
    Sequence(&'static [Segment]),
}

impl Pattern {
    #[must_use]
    pub const fn segments(self) -> &'static [Segment] {
        match self {
            Pattern::SteadyOff => &STEADY_OFF,
            Pattern::SteadyOn => &STEADY_ON,
            Pattern::SlowBlink => &SLOW_BLINK,
            Pattern::FastBlink => &FAST_BLINK,
            Pattern::LongBlink => &LONG_BLINK,
            Pattern::Heartbeat => &HEARTBEAT,
            Pattern::DoublePulse => &DOUBLE_PULSE,
            Pattern::Sequence(segments) => segments,
        }
    }

    /// Length of one full cycle in ticks.
    #[must_use]
    pub fn cycle_ticks(self) -> u32 {
        self.segments()
            .iter()
            .map(|segment| u32::from(segment.ticks))
            .sum()
    }

    /// Rejects empty patterns and zero-length segments.
    ///
    /// # Errors
    ///
    /// Returns the first structural problem found in the segment list.
    pub fn validate(self) -> Result<(), PatternError> {
        let segments = self.segments();
        if segments.is_empty() {
            return Err(PatternError::Empty);
        }
        match segments.iter().position(|segment| segment.ticks == 0) {
            Some(index) => Err(PatternError::ZeroLengthSegment { index }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Pattern::SteadyOff => "steady-off",
            Pattern::SteadyOn => "steady-on",
            Pattern::SlowBlink => "slow-blink",
            Pattern::FastBlink => "fast-blink",
            Pattern::LongBlink => "long-blink",
            Pattern::Heartbeat => "heartbeat",
            Pattern::DoublePulse => "double-pulse",
            Pattern::Sequence(_) => "sequence",
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PatternError {
    Empty,
    ZeroLengthSegment { index: usize },
}

/// Health-to-pattern mapping, indexed by the health enum discriminants.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PatternTable {
    pub can: [Pattern; CanHealth::COUNT],
    pub usb: [Pattern; UsbHealth::COUNT],
}

impl PatternTable {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            // Off, Active, Warning, Error
            can: [
                Pattern::Heartbeat,
                Pattern::SteadyOn,
                Pattern::LongBlink,
                Pattern::FastBlink,
            ],
            // NotReady, Ready, Error
            usb: [
                Pattern::SteadyOff,
                Pattern::SlowBlink,
                Pattern::FastBlink,
            ],
        }
    }

    #[must_use]
    pub const fn can_pattern(&self, health: CanHealth) -> Pattern {
        self.can[health.index()]
    }

    #[must_use]
    pub const fn usb_pattern(&self, health: UsbHealth) -> Pattern {
        self.usb[health.index()]
    }

    /// # Errors
    ///
    /// Returns [`ConfigError::EmptyPattern`] or [`ConfigError::ZeroLengthSegment`]
    /// naming the channel whose pattern is malformed.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for pattern in self.can {
            pattern
                .validate()
                .map_err(|error| ConfigError::from_pattern(LedChannelId::Can, error))?;
        }
        for pattern in self.usb {
            pattern
                .validate()
                .map_err(|error| ConfigError::from_pattern(LedChannelId::Usb, error))?;
        }
        Ok(())
    }
}

impl Default for PatternTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_cycle_lengths() {
        assert_eq!(Pattern::SlowBlink.cycle_ticks(), 20);
        assert_eq!(Pattern::FastBlink.cycle_ticks(), 4);
        assert_eq!(Pattern::DoublePulse.cycle_ticks(), 20);
        assert_eq!(Pattern::LongBlink.cycle_ticks(), 40);
        assert_eq!(Pattern::Heartbeat.cycle_ticks(), 80);
        assert_eq!(Pattern::SteadyOn.cycle_ticks(), 1);
    }

    #[test]
    fn default_table_maps_health() {
        let table = PatternTable::new();
        assert_eq!(table.can_pattern(CanHealth::Off), Pattern::Heartbeat);
        assert_eq!(table.can_pattern(CanHealth::Active), Pattern::SteadyOn);
        assert_eq!(table.can_pattern(CanHealth::Warning), Pattern::LongBlink);
        assert_eq!(table.can_pattern(CanHealth::Error), Pattern::FastBlink);
        assert_eq!(table.usb_pattern(UsbHealth::NotReady), Pattern::SteadyOff);
        assert_eq!(table.usb_pattern(UsbHealth::Ready), Pattern::SlowBlink);
        assert_eq!(table.usb_pattern(UsbHealth::Error), Pattern::FastBlink);
        assert!(table.validate().is_ok());
    }

    #[test]
    fn empty_sequence_is_rejected() {
        assert_eq!(Pattern::Sequence(&[]).validate(), Err(PatternError::Empty));
    }

    #[test]
    fn zero_length_segment_reports_index() {
        const SEGMENTS: [Segment; 3] = [Segment::on(1), Segment::off(3), Segment::on(0)];
        assert_eq!(
            Pattern::Sequence(&SEGMENTS).validate(),
            Err(PatternError::ZeroLengthSegment { index: 2 })
        );
    }
}
