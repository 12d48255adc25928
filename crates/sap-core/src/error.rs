//! Error types for sap.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using sap's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for sap.
///
/// Every variant is fatal for the current run. Transient codec rejections are
/// logged and counted by the decoder, never returned.
#[derive(Error, Debug)]
pub enum Error {
    // Usage errors
    #[error("Please specify a file path")]
    MissingPath,

    #[error("Please enter a valid volume number (0 - 100)")]
    InvalidVolume(String),

    #[error("{0}")]
    Usage(String),

    // Open failures
    #[error("Could not open \"{}\": {reason}", path.display())]
    Open { path: PathBuf, reason: String },

    #[error("Could not find stream info: {0}")]
    StreamInfo(String),

    #[error("Could not find an audio stream inside \"{}\"", .0.display())]
    NoAudioStream(PathBuf),

    #[error("Could not find a valid audio codec for \"{}\"", .0.display())]
    NoDecoder(PathBuf),

    #[error("Could not open codec: {0}")]
    CodecOpen(String),

    // Pipeline errors
    #[error("Fatal decoder error: {0}")]
    FatalDiagnostic(String),

    #[error("Resample error: {0}")]
    Resample(String),

    // Device errors
    #[error("Could not initialize playback device: {0}")]
    DeviceInit(String),

    #[error("Could not start playback device: {0}")]
    DeviceStart(String),

    #[error("Playback device error: {0}")]
    DeviceStream(String),
}

impl Error {
    /// Returns true if this error was raised while validating arguments,
    /// before any file or device was touched.
    pub const fn is_usage(&self) -> bool {
        matches!(
            self,
            Self::MissingPath | Self::InvalidVolume(_) | Self::Usage(_)
        )
    }

    /// Returns true if this error came from the playback device.
    pub const fn is_device(&self) -> bool {
        matches!(
            self,
            Self::DeviceInit(_) | Self::DeviceStart(_) | Self::DeviceStream(_)
        )
    }
}
