//! # sap
//!
//! Plays one audio file on the default output device and exits when it ends.
//!
//! ```text
//! sap <file_path> [volume 0-100] [--log|-l]
//! ```

mod cli;
mod logging;

use std::process::ExitCode;

use cli::Parsed;
use colored::Colorize;
use logging::LogConfig;
use sap_audio::{CpalBackend, Player, PlayerConfig};
use sap_core::Result;
use tracing::{debug, error};

/// Exit status for any fatal error, `-1` as a signed byte.
const EXIT_FAILURE: u8 = 255;

fn main() -> ExitCode {
    let args = match cli::parse(std::env::args_os()) {
        Ok(Parsed::Run(args)) => args,
        Ok(Parsed::Exit(info)) => {
            let _ = info.print();
            return ExitCode::SUCCESS;
        }
        Err(e) => {
            LogConfig::default().init();
            error!("{e}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    LogConfig::new(args.log).init();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn run(args: &cli::Args) -> Result<()> {
    let volume = args.volume();
    let mut player = Player::new(CpalBackend::new(), PlayerConfig::with_volume(volume));

    let track = player.prepare(&args.path)?;
    println!("{}", format!("Playing: {:?}", args.path.display().to_string()).green());

    let report = player.play(track)?;
    debug!(
        "Played {} of {} frames at {} ({} underruns)",
        report.frames_played, report.frames_written, volume, report.underruns
    );

    Ok(())
}
