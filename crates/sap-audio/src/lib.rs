//! # sap-audio
//!
//! Decode and playback pipeline for sap.
//!
//! Features:
//! - Symphonia decoding of any supported container and codec
//! - Format normalisation to interleaved `f32`, with rubato rate conversion
//!   when the device needs it
//! - Lock-free FIFO between the decode pass and the device callback
//! - cpal output behind a backend trait

pub mod buffer;
pub mod decode;
pub mod output;
pub mod player;
pub mod resample;

pub use buffer::{PlaybackFifo, SharedFifo};
pub use decode::{DecodeStats, FrameDecoder, MediaSource, RawFrame};
pub use output::{
    choose_format, ConfigCandidate, CpalBackend, CpalStream, DeviceFormat, DeviceSample,
    OutputBackend, OutputStream, PlaybackCallback, PlaybackStats,
};
pub use player::{PipelineState, PlaybackReport, Player, PlayerConfig, PreparedTrack};
pub use resample::Resampler;
