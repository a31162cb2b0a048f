//! Tunables for the error monitor and the status LEDs.
//!
//! Every constant below is a compile-time default. Targets assemble them into a
//! [`Config`], optionally override individual values at load time, and must run
//! [`Config::validate`] once before constructing a
//! [`StatusContext`](crate::status::StatusContext). There is no runtime
//! mutation path after that point.

use core::fmt;

use crate::led::LedChannelId;
use crate::led::pattern::{PatternError, PatternTable};

/// Error events per window at which the bus is classified as `Warning`.
pub const CAN_ERR_FRAME_THRESHOLD: u32 = 10;
/// Error events per window at which the bus is classified as `Passive`.
pub const CAN_ERR_PASSIVE_LIMIT: u32 = 50;
/// Length of the hopping error-count window.
pub const CAN_ERR_WINDOW_MS: u32 = 1_000;
/// Consecutive ERROR_PASSIVE reports tolerated before forcing bus-off.
pub const CAN_ERR_PASSIVE_STREAK_LIMIT: u32 = 10;
/// Period of the LED / monitor tick.
pub const LED_TICK_MS: u32 = 50;
/// Length of an activity override, in ticks.
pub const LED_TICKS_ACTIVITY: u8 = 2;
/// Minimum dwell between displayed pattern changes; also the spurious STOP window.
pub const MIN_STOP_INTERVAL_MS: u32 = 1_000;

/// Error monitor thresholds.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct MonitorConfig {
    pub frame_threshold: u32,
    pub passive_limit: u32,
    pub window_ms: u32,
    pub passive_streak_limit: u32,
    /// Request a controller stop when the error rate reaches `passive_limit`.
    pub force_bus_off_on_flood: bool,
}

impl MonitorConfig {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            frame_threshold: CAN_ERR_FRAME_THRESHOLD,
            passive_limit: CAN_ERR_PASSIVE_LIMIT,
            window_ms: CAN_ERR_WINDOW_MS,
            passive_streak_limit: CAN_ERR_PASSIVE_STREAK_LIMIT,
            force_bus_off_on_flood: true,
        }
    }

    /// Builds a config with explicit thresholds and default protection settings.
    #[must_use]
    pub const fn with_thresholds(frame_threshold: u32, passive_limit: u32, window_ms: u32) -> Self {
        Self {
            frame_threshold,
            passive_limit,
            window_ms,
            passive_streak_limit: CAN_ERR_PASSIVE_STREAK_LIMIT,
            force_bus_off_on_flood: true,
        }
    }

    /// Checks the threshold ordering and window length.
    ///
    /// # Errors
    ///
    /// Returns the first threshold or window check that fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.frame_threshold == 0 {
            return Err(ConfigError::ZeroFrameThreshold);
        }
        if self.passive_limit <= self.frame_threshold {
            return Err(ConfigError::PassiveLimitNotAboveThreshold {
                frame_threshold: self.frame_threshold,
                passive_limit: self.passive_limit,
            });
        }
        if self.window_ms == 0 {
            return Err(ConfigError::ZeroWindow);
        }
        Ok(())
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Tick period and the tick-derived LED timings.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct LedTiming {
    pub tick_ms: u32,
    pub activity_ticks: u8,
    pub min_stop_interval_ms: u32,
}

impl LedTiming {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            tick_ms: LED_TICK_MS,
            activity_ticks: LED_TICKS_ACTIVITY,
            min_stop_interval_ms: MIN_STOP_INTERVAL_MS,
        }
    }

    /// Number of ticks a displayed pattern must persist before it may change.
    ///
    /// Rounded up so the dwell never undershoots `min_stop_interval_ms`.
    #[must_use]
    pub const fn dwell_ticks(&self) -> u32 {
        if self.tick_ms == 0 {
            return 0;
        }
        self.min_stop_interval_ms.div_ceil(self.tick_ms)
    }

    /// Window during which repeated activity notifications are coalesced.
    #[must_use]
    #[allow(clippy::cast_lossless)] // `u32::from` is not callable in const fn
    pub const fn activity_holdoff_ms(&self) -> u32 {
        self.tick_ms.saturating_mul(self.activity_ticks as u32)
    }

    /// # Errors
    ///
    /// Rejects a zero tick period or a zero activity blink length.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.tick_ms == 0 {
            return Err(ConfigError::ZeroTickPeriod);
        }
        if self.activity_ticks == 0 {
            return Err(ConfigError::ZeroActivityTicks);
        }
        Ok(())
    }
}

impl Default for LedTiming {
    fn default() -> Self {
        Self::new()
    }
}

/// Complete, not yet validated configuration.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Config {
    pub monitor: MonitorConfig,
    pub timing: LedTiming,
    pub patterns: PatternTable,
}

impl Config {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            monitor: MonitorConfig::new(),
            timing: LedTiming::new(),
            patterns: PatternTable::new(),
        }
    }

    /// Applies a named override, e.g. `CAN_ERR_WINDOW_MS=500`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownSetting`] for an unrecognized name and
    /// [`ConfigError::ValueOutOfRange`] when the value does not fit the field.
    pub fn set(&mut self, name: &str, value: u32) -> Result<(), ConfigError> {
        match name {
            "CAN_ERR_FRAME_THRESHOLD" => self.monitor.frame_threshold = value,
            "CAN_ERR_PASSIVE_LIMIT" => self.monitor.passive_limit = value,
            "CAN_ERR_WINDOW_MS" => self.monitor.window_ms = value,
            "CAN_ERR_PASSIVE_STREAK_LIMIT" => self.monitor.passive_streak_limit = value,
            "LED_TICK_MS" => self.timing.tick_ms = value,
            "LED_TICKS_ACTIVITY" => {
                self.timing.activity_ticks =
                    u8::try_from(value).map_err(|_| ConfigError::ValueOutOfRange { value })?;
            }
            "MIN_STOP_INTERVAL_MS" => self.timing.min_stop_interval_ms = value,
            _ => return Err(ConfigError::UnknownSetting),
        }
        Ok(())
    }

    /// Runs every startup check and seals the configuration.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] from the monitor, timing or pattern checks.
    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        self.monitor.validate()?;
        self.timing.validate()?;
        self.patterns.validate()?;
        Ok(ValidatedConfig(self))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration that passed [`Config::validate`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct ValidatedConfig(Config);

impl ValidatedConfig {
    #[must_use]
    pub const fn monitor(&self) -> &MonitorConfig {
        &self.0.monitor
    }

    #[must_use]
    pub const fn timing(&self) -> &LedTiming {
        &self.0.timing
    }

    #[must_use]
    pub const fn patterns(&self) -> &PatternTable {
        &self.0.patterns
    }

    #[must_use]
    pub const fn get(&self) -> &Config {
        &self.0
    }
}

/// Configuration invariant violations detected at startup.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    ZeroFrameThreshold,
    PassiveLimitNotAboveThreshold {
        frame_threshold: u32,
        passive_limit: u32,
    },
    ZeroWindow,
    ZeroTickPeriod,
    ZeroActivityTicks,
    EmptyPattern(LedChannelId),
    ZeroLengthSegment {
        channel: LedChannelId,
        index: usize,
    },
    UnknownSetting,
    ValueOutOfRange {
        value: u32,
    },
}

impl ConfigError {
    pub(crate) fn from_pattern(channel: LedChannelId, error: PatternError) -> Self {
        match error {
            PatternError::Empty => ConfigError::EmptyPattern(channel),
            PatternError::ZeroLengthSegment { index } => {
                ConfigError::ZeroLengthSegment { channel, index }
            }
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ZeroFrameThreshold => f.write_str("CAN_ERR_FRAME_THRESHOLD must be > 0"),
            ConfigError::PassiveLimitNotAboveThreshold {
                frame_threshold,
                passive_limit,
            } => write!(
                f,
                "CAN_ERR_PASSIVE_LIMIT ({passive_limit}) must exceed CAN_ERR_FRAME_THRESHOLD ({frame_threshold})"
            ),
            ConfigError::ZeroWindow => f.write_str("CAN_ERR_WINDOW_MS must be > 0"),
            ConfigError::ZeroTickPeriod => f.write_str("LED_TICK_MS must be > 0"),
            ConfigError::ZeroActivityTicks => f.write_str("LED_TICKS_ACTIVITY must be > 0"),
            ConfigError::EmptyPattern(channel) => {
                write!(f, "{channel} pattern table contains an empty pattern")
            }
            ConfigError::ZeroLengthSegment { channel, index } => {
                write!(f, "{channel} pattern segment {index} has zero length")
            }
            ConfigError::UnknownSetting => f.write_str("unknown setting"),
            ConfigError::ValueOutOfRange { value } => write!(f, "value {value} out of range"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::led::pattern::{Pattern, Segment};

    #[test]
    fn defaults_validate() {
        let validated = Config::new().validate().expect("defaults must validate");
        assert_eq!(validated.timing().dwell_ticks(), 20);
        assert_eq!(validated.timing().activity_holdoff_ms(), 100);
    }

    #[test]
    fn passive_limit_must_exceed_frame_threshold() {
        let mut config = Config::new();
        config.monitor.frame_threshold = 10;
        config.monitor.passive_limit = 10;

        assert_eq!(
            config.validate(),
            Err(ConfigError::PassiveLimitNotAboveThreshold {
                frame_threshold: 10,
                passive_limit: 10,
            })
        );
    }

    #[test]
    fn zero_length_segment_is_rejected() {
        const BROKEN: [Segment; 2] = [Segment::on(2), Segment::off(0)];
        let mut config = Config::new();
        config.patterns.usb[1] = Pattern::Sequence(&BROKEN);

        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroLengthSegment {
                channel: LedChannelId::Usb,
                index: 1,
            })
        );
    }

    #[test]
    fn dwell_rounds_up() {
        let timing = LedTiming {
            tick_ms: 30,
            activity_ticks: 2,
            min_stop_interval_ms: 100,
        };
        assert_eq!(timing.dwell_ticks(), 4);
    }

    #[test]
    fn named_overrides_apply() {
        let mut config = Config::new();
        config.set("CAN_ERR_WINDOW_MS", 250).unwrap();
        config.set("LED_TICKS_ACTIVITY", 4).unwrap();

        assert_eq!(config.monitor.window_ms, 250);
        assert_eq!(config.timing.activity_ticks, 4);
        assert_eq!(config.set("BOGUS", 1), Err(ConfigError::UnknownSetting));
        assert_eq!(
            config.set("LED_TICKS_ACTIVITY", 300),
            Err(ConfigError::ValueOutOfRange { value: 300 })
        );
    }
}
