use std::io;
use std::path::Path;

#[allow(dead_code)]
#[path = "../session.rs"]
mod session;

use session::{Scenario, Session};
use status_core::config::Config;

fn main() -> io::Result<()> {
    let config = Config::new()
        .validate()
        .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err.to_string()))?;

    for scenario in Scenario::ALL {
        let mut session =
            Session::with_transcript(&config, Path::new(scenario.log_path()), scenario.header())?;
        for line in scenario.script() {
            session.handle_command(line)?;
        }
        println!("recorded {}", scenario.log_path());
    }
    Ok(())
}
