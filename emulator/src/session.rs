use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use crossterm::style::Stylize;
use status_core::Millis;
use status_core::config::ValidatedConfig;
use status_core::events::{
    EventQueue, GsUsbDecision, GsUsbEventFilter, StatusEvent, StatusEventSink,
};
use status_core::led::{LedChannelId, LedFrame, LedOutput};
use status_core::script::{self, ScriptCommand};
use status_core::status::{StatusContext, TickOutcome, decode_status_byte};
use status_core::telemetry::TelemetryPayload;

/// Longest `tick`/`wait` run accepted in one command.
const MAX_TICKS_PER_COMMAND: u32 = 10_000;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("error", "error [count]                 - inject CAN error events"),
    (
        "controller",
        "controller <active|warning|passive|bus-off|stopped> - report a controller state",
    ),
    ("activity", "activity <can|usb>            - raw activity blink"),
    ("rx", "rx | tx                       - gs_usb frame activity (rate limited)"),
    ("tx", "rx | tx                       - gs_usb frame activity (rate limited)"),
    ("start", "start                         - host starts the CAN channel"),
    ("stop", "stop                          - host stops the CAN channel"),
    ("usb", "usb <ready|error|not-ready>   - USB stack readiness"),
    ("tick", "tick [count]                  - advance the LED tick"),
    ("wait", "wait <250ms|2s>               - advance virtual time"),
    ("status", "status                        - show monitor and LED state"),
    ("help", "help [topic]                  - show help for a command"),
];

/// Canned scenarios recorded by `capture-scenarios`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Scenario {
    Flood,
    Flapping,
    Activity,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [Scenario::Flood, Scenario::Flapping, Scenario::Activity];

    pub fn log_path(self) -> &'static str {
        match self {
            Scenario::Flood => "transcripts/error-flood.log",
            Scenario::Flapping => "transcripts/flapping.log",
            Scenario::Activity => "transcripts/activity.log",
        }
    }

    pub fn header(self) -> &'static str {
        match self {
            Scenario::Flood => "roboto_usb2can error flood transcript",
            Scenario::Flapping => "roboto_usb2can flapping bus transcript",
            Scenario::Activity => "roboto_usb2can activity blink transcript",
        }
    }

    pub fn script(self) -> &'static [&'static str] {
        match self {
            Scenario::Flood => &[
                "usb ready",
                "start",
                "tick",
                "error 12",
                "tick",
                "error 60",
                "tick",
                "status",
                "wait 1s",
                "controller active",
                "tick 25",
                "status",
            ],
            Scenario::Flapping => &[
                "usb ready",
                "start",
                "tick",
                "error 10",
                "tick",
                "wait 1s",
                "error 10",
                "tick",
                "wait 1s",
                "status",
            ],
            Scenario::Activity => &["usb ready", "start", "tick", "rx", "rx", "tick 4", "tx", "tick 4"],
        }
    }
}

/// Records the levels written on the most recent tick.
#[derive(Debug, Default)]
struct TraceLeds {
    can: bool,
    usb: bool,
}

impl LedOutput for TraceLeds {
    fn set_level(&mut self, channel: LedChannelId, on: bool) {
        match channel {
            LedChannelId::Can => self.can = on,
            LedChannelId::Usb => self.usb = on,
        }
    }
}

pub struct Session {
    context: StatusContext,
    queue: EventQueue,
    filter: GsUsbEventFilter,
    leds: TraceLeds,
    now: Millis,
    tick_ms: u32,
    transcript: Option<TranscriptLogger>,
}

impl Session {
    pub fn new(config: &ValidatedConfig) -> Self {
        Self {
            context: StatusContext::new(config, 0),
            queue: EventQueue::new(),
            filter: GsUsbEventFilter::new(config.timing()),
            leds: TraceLeds::default(),
            now: 0,
            tick_ms: config.timing().tick_ms,
            transcript: None,
        }
    }

    /// Like [`Session::new`] but mirrors every exchange to `path`.
    pub fn with_transcript(
        config: &ValidatedConfig,
        path: &Path,
        header: &str,
    ) -> io::Result<Self> {
        let mut session = Self::new(config);
        session.transcript = Some(TranscriptLogger::new(path, header)?);
        Ok(session)
    }

    pub fn now(&self) -> Millis {
        self.now
    }

    pub fn context(&self) -> &StatusContext {
        &self.context
    }

    pub fn handle_command(&mut self, line: &str) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        let now = self.now;
        if let Some(transcript) = self.transcript.as_mut() {
            transcript.append_line(now, TranscriptRole::Host, trimmed)?;
        }

        if let Some(rest) = trimmed.strip_prefix("help ") {
            let lines = handle_help(Some(rest.trim()));
            self.record_output(&lines)?;
            return Ok(lines);
        }

        let lines = match script::parse(trimmed) {
            Ok(None) => Vec::new(),
            Ok(Some(command)) => self.execute(command),
            Err(err) => vec![format!("ERR syntax {err}")],
        };
        self.record_output(&lines)?;
        Ok(lines)
    }

    fn execute(&mut self, command: ScriptCommand) -> Vec<String> {
        match command {
            ScriptCommand::CanErrors(count) => self.inject_errors(count),
            ScriptCommand::Controller(state) => {
                self.post_ack(StatusEvent::CanController { state, at: self.now })
            }
            ScriptCommand::Activity(LedChannelId::Can) => self.post_ack(StatusEvent::CanActivity),
            ScriptCommand::Activity(LedChannelId::Usb) => self.post_ack(StatusEvent::UsbActivity),
            ScriptCommand::GsUsb(event) => match self.filter.filter(event, self.now) {
                GsUsbDecision::Forward(accepted) => self.post_ack(accepted),
                GsUsbDecision::Throttled => vec!["OK throttled".to_string()],
                GsUsbDecision::SpuriousStop => vec!["OK ignored spurious stop".to_string()],
            },
            ScriptCommand::Usb(health) => self.post_ack(StatusEvent::UsbState(health)),
            ScriptCommand::Tick(count) => self.run_ticks(count),
            ScriptCommand::Wait(duration) => {
                let ticks = duration.div_ceil(u64::from(self.tick_ms));
                self.run_ticks(u32::try_from(ticks).unwrap_or(u32::MAX))
            }
            ScriptCommand::Status => self.describe_status(),
            ScriptCommand::Help => handle_help(None),
        }
    }

    /// Bursts larger than the queue are drained into the monitor as they
    /// arrive. Draining only counts; the bus is still classified on the next tick.
    fn inject_errors(&mut self, count: u32) -> Vec<String> {
        let dropped_before = self.queue.dropped();
        let mut accepted = 0u32;
        for _ in 0..count {
            if self.queue.is_full() {
                self.context.drain(&mut self.queue);
            }
            if self.post(StatusEvent::CanError { at: self.now }) {
                accepted += 1;
            }
        }

        let dropped = self.queue.dropped() - dropped_before;
        if dropped == 0 {
            vec![format!("OK error x{accepted}")]
        } else {
            vec![format!("ERR error x{accepted} dropped={dropped}")]
        }
    }

    fn post(&mut self, event: StatusEvent) -> bool {
        self.queue.try_post(event).is_ok()
    }

    fn post_ack(&mut self, event: StatusEvent) -> Vec<String> {
        if self.post(event) {
            vec![format!("OK {event}")]
        } else {
            vec![format!("ERR queue-full dropped={}", self.queue.dropped())]
        }
    }

    fn run_ticks(&mut self, count: u32) -> Vec<String> {
        if count > MAX_TICKS_PER_COMMAND {
            return vec![format!("ERR too many ticks (max {MAX_TICKS_PER_COMMAND})")];
        }

        let mut lines = Vec::new();
        let mut previous = (self.leds.can, self.leds.usb);
        for _ in 0..count {
            let outcome = self.tick_once();
            let levels = (outcome.leds.can, outcome.leds.usb);
            if levels != previous || outcome.leds.transitioned() || outcome.monitor.changed() {
                lines.push(self.describe_tick(&outcome));
            }
            if outcome.force_bus_off {
                lines.push(format!("[{:>6} ms] controller forced bus-off", self.now));
            }
            previous = levels;
        }
        lines.push(format!("OK now={}ms", self.now));
        lines
    }

    fn tick_once(&mut self) -> TickOutcome {
        self.now += Millis::from(self.tick_ms);
        self.context.drain(&mut self.queue);
        self.context.tick(self.now, &mut self.leds)
    }

    fn describe_tick(&self, outcome: &TickOutcome) -> String {
        let mut line = format!(
            "[{:>6} ms] CAN {} USB {} bus={} errors={}",
            self.now,
            glyph(LedChannelId::Can, &outcome.leds),
            glyph(LedChannelId::Usb, &outcome.leds),
            outcome.monitor.state,
            outcome.monitor.error_count
        );
        if let Some(health) = outcome.leds.can_transition {
            line.push_str(&format!(" can-led={health}"));
        }
        if let Some(health) = outcome.leds.usb_transition {
            line.push_str(&format!(" usb-led={health}"));
        }
        line
    }

    fn describe_status(&self) -> Vec<String> {
        let snapshot = self.context.snapshot();
        let decoded = decode_status_byte(snapshot.status_byte);
        let mut lines = vec![
            format!(
                "bus={} errors={} running={} latched={}",
                snapshot.bus_state,
                snapshot.error_count,
                snapshot.channel_running,
                snapshot.stop_latched
            ),
            format!(
                "can-led={} ({}) usb-led={} ({}) usb={}",
                snapshot.can_led,
                self.context.leds().can().pattern(),
                snapshot.usb_led,
                self.context.leds().usb().pattern(),
                snapshot.usb
            ),
            format!(
                "status-byte=0x{:02X} usb-ready={}",
                snapshot.status_byte, decoded.usb_ready
            ),
        ];
        if let Some(record) = self.context.telemetry().latest() {
            let detail = match record.details {
                TelemetryPayload::Monitor(monitor) => format!(" errors={}", monitor.error_count),
                TelemetryPayload::Led(led) => format!(" tick={}", led.tick),
                TelemetryPayload::None => String::new(),
            };
            lines.push(format!(
                "last-event=#{} {} at {}ms{detail}",
                record.id, record.event, record.timestamp
            ));
        }
        lines
    }

    fn record_output(&mut self, lines: &[String]) -> io::Result<()> {
        let now = self.now;
        if let Some(transcript) = self.transcript.as_mut() {
            for line in lines {
                transcript.append_line(now, TranscriptRole::Emulator, line)?;
            }
        }
        Ok(())
    }
}

const LIT: &str = "●";
const DARK: &str = "○";

fn glyph(channel: LedChannelId, frame: &LedFrame) -> &'static str {
    if frame.level(channel) { LIT } else { DARK }
}

/// Colors the LED glyphs of a response line for a terminal.
///
/// Session output is plain text so scripts and transcripts stay free of
/// escape sequences; only the interactive prompt paints it.
#[must_use]
pub fn style_glyphs(line: &str) -> String {
    if !line.contains(LIT) && !line.contains(DARK) {
        return line.to_string();
    }
    line.replace(&format!("CAN {LIT}"), &format!("CAN {}", LIT.green()))
        .replace(&format!("USB {LIT}"), &format!("USB {}", LIT.blue()))
        .replace(DARK, &DARK.dark_grey().to_string())
}

fn handle_help(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) if !target.is_empty() => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        _ => {
            lines.push("Available commands:".to_string());
            for (name, detail) in HELP_TOPICS {
                if *name != "tx" {
                    lines.push(format!("  {detail}"));
                }
            }
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    script::keywords().collect::<Vec<_>>().join(", ")
}

struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    fn new(path: &Path, header: &str) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        writeln!(logger.writer, "# {header}")?;
        writeln!(logger.writer, "# Timestamps are virtual milliseconds")?;
        writeln!(logger.writer)?;
        logger.writer.flush()?;
        Ok(logger)
    }

    fn append_line(&mut self, now: Millis, role: TranscriptRole, line: &str) -> io::Result<()> {
        writeln!(self.writer, "[+{now:>6} ms] {} {line}", role.prefix())?;
        self.writer.flush()
    }
}

enum TranscriptRole {
    Host,
    Emulator,
}

impl TranscriptRole {
    fn prefix(&self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Emulator => "EMU <",
        }
    }
}
