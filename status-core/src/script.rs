//! Line-oriented diagnostics commands.
//!
//! The emulator replays scripts written in this grammar and the same parser
//! backs interactive sessions. Keywords are case-insensitive, `#` starts a
//! comment, and blank lines parse to `None`.
//!
//! ```text
//! error [COUNT]                 inject CAN error events
//! controller STATE              active | warning | passive | bus-off | stopped
//! activity CHANNEL              can | usb
//! rx | tx                       gs_usb activity (low-pass filtered)
//! start | stop                  gs_usb channel start/stop (STOP filtered)
//! usb STATE                     ready | error | not-ready
//! tick [COUNT]                  advance COUNT ticks
//! wait DURATION                 advance by e.g. 250ms or 2s
//! status | help
//! ```

use core::fmt;

use winnow::ModalResult;
use winnow::ascii::{digit1, space0};
use winnow::combinator::{alt, opt, preceded};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::Millis;
use crate::events::GsUsbEvent;
use crate::led::{LedChannelId, UsbHealth};
use crate::monitor::ControllerState;

/// Parsed diagnostics command.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScriptCommand {
    CanErrors(u32),
    Controller(ControllerState),
    Activity(LedChannelId),
    GsUsb(GsUsbEvent),
    Usb(UsbHealth),
    Tick(u32),
    Wait(Millis),
    Status,
    Help,
}

/// Parse failures, borrowing the offending text from the input line.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ScriptError<'a> {
    UnknownCommand(&'a str),
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },
    InvalidArgument {
        command: &'static str,
        found: &'a str,
    },
    TrailingInput(&'a str),
}

impl fmt::Display for ScriptError<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::UnknownCommand(word) => write!(f, "unknown command `{word}`"),
            ScriptError::MissingArgument { command, expected } => {
                write!(f, "`{command}` expects {expected}")
            }
            ScriptError::InvalidArgument { command, found } => {
                write!(f, "`{command}` does not accept `{found}`")
            }
            ScriptError::TrailingInput(rest) => write!(f, "unexpected input `{rest}`"),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum Keyword {
    Error,
    Controller,
    Activity,
    Rx,
    Tx,
    Start,
    Stop,
    Usb,
    Tick,
    Wait,
    Status,
    Help,
}

const KEYWORDS: &[(&str, Keyword)] = &[
    ("error", Keyword::Error),
    ("controller", Keyword::Controller),
    ("activity", Keyword::Activity),
    ("rx", Keyword::Rx),
    ("tx", Keyword::Tx),
    ("start", Keyword::Start),
    ("stop", Keyword::Stop),
    ("usb", Keyword::Usb),
    ("tick", Keyword::Tick),
    ("wait", Keyword::Wait),
    ("status", Keyword::Status),
    ("help", Keyword::Help),
];

const CONTROLLER_STATES: &[(&str, ControllerState)] = &[
    ("active", ControllerState::ErrorActive),
    ("warning", ControllerState::ErrorWarning),
    ("passive", ControllerState::ErrorPassive),
    ("bus-off", ControllerState::BusOff),
    ("stopped", ControllerState::Stopped),
];

const CHANNELS: &[(&str, LedChannelId)] = &[("can", LedChannelId::Can), ("usb", LedChannelId::Usb)];

const USB_STATES: &[(&str, UsbHealth)] = &[
    ("ready", UsbHealth::Ready),
    ("error", UsbHealth::Error),
    ("not-ready", UsbHealth::NotReady),
];

/// Keyword names, for help output and completion.
#[must_use]
pub fn keywords() -> impl Iterator<Item = &'static str> {
    KEYWORDS.iter().map(|(name, _)| *name)
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    preceded(
        space0,
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
    )
    .parse_next(input)
}

fn count(input: &mut &str) -> ModalResult<u32> {
    preceded(space0, digit1.parse_to()).parse_next(input)
}

fn count_or_one(input: &mut &str) -> u32 {
    opt(count).parse_next(input).ok().flatten().unwrap_or(1)
}

fn duration(input: &mut &str) -> ModalResult<Millis> {
    preceded(
        space0,
        (
            digit1.parse_to::<u64>(),
            alt(("ms".value(1u64), "s".value(1_000u64))),
        ),
    )
    .map(|(value, scale)| value.saturating_mul(scale))
    .parse_next(input)
}

fn lookup<T: Copy>(table: &[(&str, T)], name: &str) -> Option<T> {
    table
        .iter()
        .find(|(candidate, _)| candidate.eq_ignore_ascii_case(name))
        .map(|(_, value)| *value)
}

fn choice<'a, T: Copy>(
    input: &mut &'a str,
    table: &[(&str, T)],
    command: &'static str,
    expected: &'static str,
) -> Result<T, ScriptError<'a>> {
    let found = word(input).map_err(|_| ScriptError::MissingArgument { command, expected })?;
    lookup(table, found).ok_or(ScriptError::InvalidArgument { command, found })
}

fn strip_comment(line: &str) -> &str {
    line.split_once('#').map_or(line, |(code, _)| code)
}

/// Parses one script line. Blank and comment-only lines yield `Ok(None)`.
///
/// # Errors
///
/// Returns a [`ScriptError`] naming the unknown command or the bad argument.
pub fn parse(line: &str) -> Result<Option<ScriptCommand>, ScriptError<'_>> {
    let mut input = strip_comment(line);
    let Ok(name) = word(&mut input) else {
        let rest = input.trim();
        return if rest.is_empty() {
            Ok(None)
        } else {
            Err(ScriptError::UnknownCommand(rest))
        };
    };
    let keyword = lookup(KEYWORDS, name).ok_or(ScriptError::UnknownCommand(name))?;

    let command = match keyword {
        Keyword::Error => ScriptCommand::CanErrors(count_or_one(&mut input)),
        Keyword::Controller => ScriptCommand::Controller(choice(
            &mut input,
            CONTROLLER_STATES,
            "controller",
            "active|warning|passive|bus-off|stopped",
        )?),
        Keyword::Activity => {
            ScriptCommand::Activity(choice(&mut input, CHANNELS, "activity", "can|usb")?)
        }
        Keyword::Rx => ScriptCommand::GsUsb(GsUsbEvent::ActivityRx),
        Keyword::Tx => ScriptCommand::GsUsb(GsUsbEvent::ActivityTx),
        Keyword::Start => ScriptCommand::GsUsb(GsUsbEvent::ChannelStarted),
        Keyword::Stop => ScriptCommand::GsUsb(GsUsbEvent::ChannelStopped),
        Keyword::Usb => {
            ScriptCommand::Usb(choice(&mut input, USB_STATES, "usb", "ready|error|not-ready")?)
        }
        Keyword::Tick => ScriptCommand::Tick(count_or_one(&mut input)),
        Keyword::Wait => {
            let before = input.trim();
            let millis = duration(&mut input).map_err(|_| {
                if before.is_empty() {
                    ScriptError::MissingArgument {
                        command: "wait",
                        expected: "a duration such as 250ms or 2s",
                    }
                } else {
                    ScriptError::InvalidArgument {
                        command: "wait",
                        found: before,
                    }
                }
            })?;
            ScriptCommand::Wait(millis)
        }
        Keyword::Status => ScriptCommand::Status,
        Keyword::Help => ScriptCommand::Help,
    };

    let rest = input.trim();
    if rest.is_empty() {
        Ok(Some(command))
    } else {
        Err(ScriptError::TrailingInput(rest))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_case_insensitively() {
        assert_eq!(parse("ERROR 5"), Ok(Some(ScriptCommand::CanErrors(5))));
        assert_eq!(parse("error"), Ok(Some(ScriptCommand::CanErrors(1))));
        assert_eq!(
            parse("controller Bus-Off"),
            Ok(Some(ScriptCommand::Controller(ControllerState::BusOff)))
        );
        assert_eq!(
            parse("  activity usb  "),
            Ok(Some(ScriptCommand::Activity(LedChannelId::Usb)))
        );
        assert_eq!(
            parse("stop"),
            Ok(Some(ScriptCommand::GsUsb(GsUsbEvent::ChannelStopped)))
        );
        assert_eq!(parse("tick 20"), Ok(Some(ScriptCommand::Tick(20))));
    }

    #[test]
    fn parses_durations() {
        assert_eq!(parse("wait 250ms"), Ok(Some(ScriptCommand::Wait(250))));
        assert_eq!(parse("wait 2s"), Ok(Some(ScriptCommand::Wait(2_000))));
        assert_eq!(
            parse("wait 3m"),
            Err(ScriptError::InvalidArgument {
                command: "wait",
                found: "3m",
            })
        );
        assert!(matches!(
            parse("wait"),
            Err(ScriptError::MissingArgument { command: "wait", .. })
        ));
    }

    #[test]
    fn blank_and_comment_lines_are_skipped() {
        assert_eq!(parse(""), Ok(None));
        assert_eq!(parse("   # just a note"), Ok(None));
        assert_eq!(parse("tick 2 # advance"), Ok(Some(ScriptCommand::Tick(2))));
    }

    #[test]
    fn rejects_bad_input() {
        assert_eq!(parse("reboot"), Err(ScriptError::UnknownCommand("reboot")));
        assert_eq!(
            parse("usb sleepy"),
            Err(ScriptError::InvalidArgument {
                command: "usb",
                found: "sleepy",
            })
        );
        assert_eq!(parse("error many"), Err(ScriptError::TrailingInput("many")));
        assert_eq!(parse("status now"), Err(ScriptError::TrailingInput("now")));
        assert_eq!(parse("!!"), Err(ScriptError::UnknownCommand("!!")));
    }
}
