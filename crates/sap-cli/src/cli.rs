//! Command-line interface definitions.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::error::{ContextKind, ErrorKind};
use clap::Parser;
use sap_core::{Error, Result, Volume};

/// Play an audio file on the default output device.
#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "sap", version)]
pub struct Args {
    /// Path to the audio file
    pub path: PathBuf,

    /// Playback volume in percent (0 - 100)
    #[arg(value_parser = parse_volume, allow_negative_numbers = true)]
    pub volume: Option<Volume>,

    /// Show decoder and pipeline diagnostics
    #[arg(short, long)]
    pub log: bool,
}

impl Args {
    /// Get the requested volume, full volume if none was given.
    pub fn volume(&self) -> Volume {
        self.volume.unwrap_or_default()
    }
}

/// Result of parsing the command line.
#[derive(Debug)]
pub enum Parsed {
    /// Play a file.
    Run(Args),
    /// Help or version was requested. Print it and exit successfully.
    Exit(clap::Error),
}

/// Parse command-line arguments. Nothing is read from disk.
pub fn parse<I, T>(args: I) -> Result<Parsed>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Args::try_parse_from(args) {
        Ok(args) => Ok(Parsed::Run(args)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp
            | ErrorKind::DisplayVersion
            | ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand => Ok(Parsed::Exit(err)),
            ErrorKind::MissingRequiredArgument => Err(Error::MissingPath),
            ErrorKind::ValueValidation | ErrorKind::InvalidValue => {
                let value = err
                    .get(ContextKind::InvalidValue)
                    .map(ToString::to_string)
                    .unwrap_or_default();
                Err(Error::InvalidVolume(value))
            }
            _ => {
                let rendered = err.render().to_string();
                let message = rendered.strip_prefix("error: ").unwrap_or(&rendered);
                Err(Error::Usage(message.trim_end().to_string()))
            }
        },
    }
}

fn parse_volume(input: &str) -> std::result::Result<Volume, String> {
    Volume::parse(input).map_err(|e| e.to_string())
}
