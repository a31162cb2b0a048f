#[allow(dead_code)]
mod session;

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process;

use session::Session;
use status_core::config::{Config, ValidatedConfig};

const USAGE: &str =
    "Usage: status-emulator [--set NAME=VALUE]... [--transcript <path>] [--script <path>]";

#[derive(Debug, Default)]
struct Options {
    overrides: Vec<(String, u32)>,
    transcript: Option<PathBuf>,
    script: Option<PathBuf>,
}

fn main() -> io::Result<()> {
    let (config, options) = parse_args().unwrap_or_else(|err| {
        eprintln!("{err}");
        eprintln!("{USAGE}");
        process::exit(2);
    });

    let mut session = match &options.transcript {
        Some(path) => Session::with_transcript(&config, path, "roboto_usb2can emulator session")?,
        None => Session::new(&config),
    };

    let stdout = io::stdout();
    let mut writer = stdout.lock();

    if let Some(path) = &options.script {
        let script = fs::read_to_string(path)?;
        for line in script.lines() {
            for response in session.handle_command(line)? {
                writeln!(writer, "{response}")?;
            }
        }
        return Ok(());
    }

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut line = String::new();

    writeln!(
        writer,
        "roboto_usb2can status emulator ready. Type `help` for commands or `exit` to quit."
    )?;

    loop {
        line.clear();
        write!(writer, "> ")?;
        writer.flush()?;

        let bytes_read = reader.read_line(&mut line)?;
        if bytes_read == 0 {
            writeln!(writer)?;
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if should_terminate(trimmed) {
            writeln!(writer, "Session closed.")?;
            break;
        }

        let responses = session.handle_command(trimmed)?;
        for response in responses {
            writeln!(writer, "{}", session::style_glyphs(&response))?;
        }
    }

    Ok(())
}

fn should_terminate(input: &str) -> bool {
    input.eq_ignore_ascii_case("exit") || input.eq_ignore_ascii_case("quit")
}

fn parse_args() -> Result<(ValidatedConfig, Options), String> {
    let mut options = Options::default();
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if let Some(value) = arg.strip_prefix("--set=") {
            options.overrides.push(parse_override(value)?);
        } else if arg == "--set" {
            let value = args.next().ok_or("Expected NAME=VALUE after --set")?;
            options.overrides.push(parse_override(&value)?);
        } else if arg == "--transcript" {
            let value = args.next().ok_or("Expected path after --transcript")?;
            options.transcript = Some(PathBuf::from(value));
        } else if arg == "--script" {
            let value = args.next().ok_or("Expected path after --script")?;
            options.script = Some(PathBuf::from(value));
        } else {
            return Err(format!("Unknown argument `{arg}`"));
        }
    }

    let mut config = Config::new();
    for (name, value) in &options.overrides {
        config
            .set(name, *value)
            .map_err(|err| format!("--set {name}={value}: {err}"))?;
    }
    let config = config
        .validate()
        .map_err(|err| format!("invalid configuration: {err}"))?;
    Ok((config, options))
}

fn parse_override(text: &str) -> Result<(String, u32), String> {
    let (name, value) = text
        .split_once('=')
        .ok_or_else(|| format!("Expected NAME=VALUE, got `{text}`"))?;
    let value = value
        .trim()
        .parse::<u32>()
        .map_err(|err| format!("Invalid value for {name}: {err}"))?;
    Ok((name.trim().to_ascii_uppercase(), value))
}
