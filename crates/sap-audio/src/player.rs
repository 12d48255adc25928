//! Playback pipeline: decode everything, then play the buffered samples.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use sap_core::{Result, StreamDescriptor, Volume};
use tracing::{debug, info};

use crate::buffer::PlaybackFifo;
use crate::decode::{DecodeStats, FrameDecoder, MediaSource};
use crate::output::{DeviceFormat, OutputBackend, OutputStream, PlaybackCallback};
use crate::resample::Resampler;

/// Upper bound on the FIFO pre-allocation, in seconds of output.
///
/// The frame count comes from the container header and may be bogus (piped
/// WAV files declare a 4 GiB data chunk). The FIFO grows past this on demand.
const PRESIZE_LIMIT_SECS: u64 = 300;

/// Stage of the playback pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineState {
    #[default]
    Idle,
    Opening,
    StreamSelected,
    Decoding,
    DeviceConfigured,
    Playing,
    Draining,
    Stopped,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::Opening => "opening",
            Self::StreamSelected => "stream selected",
            Self::Decoding => "decoding",
            Self::DeviceConfigured => "device configured",
            Self::Playing => "playing",
            Self::Draining => "draining",
            Self::Stopped => "stopped",
        })
    }
}

/// Playback settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerConfig {
    /// Master gain in `[0.0, 1.0]`.
    pub gain: f32,
    /// Sleep between FIFO checks while draining.
    pub poll_interval: Duration,
    /// Wait after the FIFO is empty, so the device can play its last period.
    pub tail_flush: Duration,
}

impl PlayerConfig {
    /// Default settings at `volume`.
    pub fn with_volume(volume: Volume) -> Self {
        Self {
            gain: volume.gain(),
            ..Self::default()
        }
    }
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            gain: Volume::MAX.gain(),
            poll_interval: Duration::from_millis(1),
            tail_flush: Duration::from_millis(100),
        }
    }
}

/// A source with its stream selected and codec open.
pub struct PreparedTrack {
    path: PathBuf,
    stream: StreamDescriptor,
    decoder: FrameDecoder,
}

impl PreparedTrack {
    /// Get the path of the source.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the selected stream.
    pub const fn stream(&self) -> &StreamDescriptor {
        &self.stream
    }
}

/// Outcome of a completed playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackReport {
    pub stream: StreamDescriptor,
    pub device: DeviceFormat,
    pub decode: DecodeStats,
    /// Canonical frames written to the FIFO.
    pub frames_written: u64,
    /// Frames the device callback took from the FIFO.
    pub frames_played: u64,
    /// Device callbacks that could not be filled completely.
    pub underruns: u64,
}

/// Plays one file at a time on an output backend.
pub struct Player<B: OutputBackend> {
    backend: B,
    config: PlayerConfig,
    state: PipelineState,
}

impl<B: OutputBackend> Player<B> {
    /// Create a player.
    pub const fn new(backend: B, config: PlayerConfig) -> Self {
        Self {
            backend,
            config,
            state: PipelineState::Idle,
        }
    }

    /// Get the current pipeline state.
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Open `path`, select its best audio stream and open the codec.
    pub fn prepare(&mut self, path: &Path) -> Result<PreparedTrack> {
        self.set_state(PipelineState::Opening);

        let result = Self::open_track(path);
        match &result {
            Ok(track) => {
                let stream = &track.stream;
                match &stream.codec_long_name {
                    Some(name) => info!("Stream #{}: {} ({name})", stream.track_id, stream),
                    None => info!("Stream #{}: {}", stream.track_id, stream),
                }
                self.set_state(PipelineState::StreamSelected);
            }
            Err(_) => self.set_state(PipelineState::Stopped),
        }

        result
    }

    /// Decode `track` completely, then play it to the end.
    pub fn play(&mut self, track: PreparedTrack) -> Result<PlaybackReport> {
        let result = self.run(track);
        self.set_state(PipelineState::Stopped);
        result
    }

    fn open_track(path: &Path) -> Result<PreparedTrack> {
        let source = MediaSource::open(path)?;
        let stream = source.select_best_audio_stream()?;
        let decoder = source.decode(&stream)?;

        Ok(PreparedTrack {
            path: path.to_path_buf(),
            stream,
            decoder,
        })
    }

    fn run(&mut self, track: PreparedTrack) -> Result<PlaybackReport> {
        let PreparedTrack {
            stream, decoder, ..
        } = track;

        let device = self.backend.negotiate(stream.channels(), stream.sample_rate)?;
        info!("Output format: {device}");
        let resampler = Resampler::configure(&stream, device.sample_rate)?;

        self.set_state(PipelineState::Decoding);
        let (fifo, decode) = decode_all(decoder, resampler, &stream)?;
        let frames_written = fifo.size() as u64;
        debug!(
            "Decoded {} packets into {} frames ({} rejected)",
            decode.packets, frames_written, decode.rejected_packets
        );

        let fifo = fifo.into_shared();
        let callback = PlaybackCallback::new(Arc::clone(&fifo), device.channels, self.config.gain);
        let stats = callback.stats();

        let mut output = self.backend.open(&device, callback)?;
        self.set_state(PipelineState::DeviceConfigured);

        output.start()?;
        self.set_state(PipelineState::Playing);

        self.set_state(PipelineState::Draining);
        self.drain(&fifo, &output)?;
        drop(output);

        debug!(
            "Playback finished: {} frames played, {} underruns",
            stats.frames_played(),
            stats.underruns()
        );

        Ok(PlaybackReport {
            stream,
            device,
            decode,
            frames_written,
            frames_played: stats.frames_played(),
            underruns: stats.underruns(),
        })
    }

    /// Wait until the device has consumed the FIFO.
    fn drain(&self, fifo: &PlaybackFifo, output: &B::Stream) -> Result<()> {
        while !fifo.is_empty() {
            if let Some(err) = output.poll_error() {
                return Err(err);
            }
            thread::sleep(self.config.poll_interval);
        }

        thread::sleep(self.config.tail_flush);
        output.poll_error().map_or(Ok(()), Err)
    }

    fn set_state(&mut self, state: PipelineState) {
        if self.state != state {
            debug!("Pipeline: {} -> {}", self.state, state);
            self.state = state;
        }
    }
}

/// Run the decode pass to completion and collect canonical frames.
///
/// Consumes the decoder and resampler, so both are released before the
/// device is opened.
fn decode_all(
    mut decoder: FrameDecoder,
    mut resampler: Resampler,
    stream: &StreamDescriptor,
) -> Result<(PlaybackFifo, DecodeStats)> {
    let channels = resampler.channels();
    let presize = presize_frames(stream, resampler.output_rate());
    let mut fifo = PlaybackFifo::with_capacity(channels, presize);

    while let Some(frame) = decoder.next_frame()? {
        let samples = resampler.convert(frame)?;
        fifo.write(samples, samples.len() / channels);
    }

    let tail = resampler.finish()?;
    fifo.write(tail, tail.len() / channels);

    Ok((fifo, decoder.stats()))
}

/// Frames to reserve in the FIFO for `stream` played at `output_rate`.
fn presize_frames(stream: &StreamDescriptor, output_rate: u32) -> usize {
    let limit = u64::from(output_rate) * PRESIZE_LIMIT_SECS;
    stream.n_frames.map_or(0, |n| {
        let scaled = n as f64 * f64::from(output_rate) / f64::from(stream.sample_rate.max(1));
        (scaled as u64).min(limit) as usize
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sap_core::ChannelLayout;

    fn stream(sample_rate: u32, n_frames: Option<u64>) -> StreamDescriptor {
        StreamDescriptor {
            track_id: 0,
            codec: "pcm_s16le".to_string(),
            codec_long_name: None,
            sample_rate,
            layout: ChannelLayout::STEREO,
            sample_format: None,
            n_frames,
            duration_secs: None,
        }
    }

    #[test]
    fn test_presize_follows_declared_length() {
        assert_eq!(presize_frames(&stream(44100, Some(44100)), 44100), 44100);
        assert_eq!(presize_frames(&stream(44100, Some(44100)), 48000), 48000);
        assert_eq!(presize_frames(&stream(44100, None), 44100), 0);
    }

    #[test]
    fn test_presize_caps_bogus_length() {
        // Streamed WAV header with a 0xFFFF_FFFF byte data chunk
        let piped = stream(44100, Some(u64::from(u32::MAX) / 4));
        assert_eq!(presize_frames(&piped, 44100), 44100 * 300);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_config_default() {
        let config = PlayerConfig::default();
        assert_eq!(config.gain, 1.0);
        assert_eq!(config.poll_interval, Duration::from_millis(1));
    }

    #[test]
    #[allow(clippy::float_cmp, clippy::unwrap_used)]
    fn test_config_with_volume() {
        let config = PlayerConfig::with_volume(Volume::parse("25").unwrap());
        assert_eq!(config.gain, 0.25);
        assert_eq!(config.tail_flush, PlayerConfig::default().tail_flush);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(PipelineState::default(), PipelineState::Idle);
        assert_eq!(PipelineState::DeviceConfigured.to_string(), "device configured");
    }
}
