//! Audio output using cpal.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use cpal::{
    traits::{DeviceTrait, HostTrait, StreamTrait},
    BufferSize, Device, Host, SampleRate, Stream, StreamConfig,
};
use crossbeam_channel::{unbounded, Receiver};
use sap_core::{Error, Result};
use tracing::{debug, info};

use crate::buffer::SharedFifo;

/// Scratch space of the data callback in frames.
const SCRATCH_FRAMES: usize = 4096;

/// Sample types the data callback can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceSample {
    F32,
    I16,
    U16,
}

impl DeviceSample {
    /// Map a cpal sample format, if the callback supports it.
    pub const fn from_cpal(format: cpal::SampleFormat) -> Option<Self> {
        match format {
            cpal::SampleFormat::F32 => Some(Self::F32),
            cpal::SampleFormat::I16 => Some(Self::I16),
            cpal::SampleFormat::U16 => Some(Self::U16),
            _ => None,
        }
    }

    /// Preference order, lower is better.
    const fn rank(self) -> u8 {
        match self {
            Self::F32 => 0,
            Self::I16 => 1,
            Self::U16 => 2,
        }
    }
}

impl fmt::Display for DeviceSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::F32 => "f32",
            Self::I16 => "i16",
            Self::U16 => "u16",
        })
    }
}

/// Negotiated device stream format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceFormat {
    pub channels: u16,
    pub sample_rate: u32,
    pub sample: DeviceSample,
}

impl fmt::Display for DeviceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz, {} channels, {}",
            self.sample_rate, self.channels, self.sample
        )
    }
}

/// One supported device configuration range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigCandidate {
    pub channels: u16,
    pub min_rate: u32,
    pub max_rate: u32,
    pub sample: DeviceSample,
}

impl ConfigCandidate {
    const fn supports_rate(&self, rate: u32) -> bool {
        self.min_rate <= rate && rate <= self.max_rate
    }
}

/// Pick the device format for a source stream.
///
/// Prefers the source channel count and rate, then any channel count at the
/// source rate, then the device default. Within each tier `f32` beats `i16`
/// beats `u16`.
pub fn choose_format(
    candidates: &[ConfigCandidate],
    default: Option<DeviceFormat>,
    channels: u16,
    sample_rate: u32,
) -> Option<DeviceFormat> {
    let at_rate = |c: &&ConfigCandidate| c.supports_rate(sample_rate);

    let exact = candidates
        .iter()
        .filter(at_rate)
        .filter(|c| c.channels == channels)
        .min_by_key(|c| c.sample.rank());

    // Closest channel count wins; the callback maps the rest.
    let any_layout = || {
        candidates
            .iter()
            .filter(at_rate)
            .filter(|c| c.channels > 0)
            .min_by_key(|c| (c.channels.abs_diff(channels), c.sample.rank()))
    };

    exact
        .or_else(any_layout)
        .map(|c| DeviceFormat {
            channels: c.channels,
            sample_rate,
            sample: c.sample,
        })
        .or(default)
}

/// Lifetime counters of the data callback.
#[derive(Debug, Default)]
pub struct PlaybackStats {
    frames_played: AtomicU64,
    underruns: AtomicU64,
}

impl PlaybackStats {
    /// Get the number of frames taken from the FIFO.
    pub fn frames_played(&self) -> u64 {
        self.frames_played.load(Ordering::Relaxed)
    }

    /// Get the number of callbacks that could not be filled completely.
    pub fn underruns(&self) -> u64 {
        self.underruns.load(Ordering::Relaxed)
    }
}

/// The device data callback.
///
/// Runs on the device thread. Never blocks, allocates or logs.
pub struct PlaybackCallback {
    fifo: SharedFifo,
    device_channels: usize,
    gain: f32,
    /// Canonical samples read from the FIFO.
    scratch: Vec<f32>,
    scratch_frames: usize,
    stats: Arc<PlaybackStats>,
}

impl PlaybackCallback {
    /// Create a callback reading `fifo` into a device with `device_channels`.
    pub fn new(fifo: SharedFifo, device_channels: u16, gain: f32) -> Self {
        Self::with_scratch_frames(fifo, device_channels, gain, SCRATCH_FRAMES)
    }

    fn with_scratch_frames(
        fifo: SharedFifo,
        device_channels: u16,
        gain: f32,
        scratch_frames: usize,
    ) -> Self {
        let scratch_frames = scratch_frames.max(1);
        Self {
            scratch: vec![0.0; scratch_frames * fifo.channels()],
            fifo,
            device_channels: usize::from(device_channels).max(1),
            gain: gain.clamp(0.0, 1.0),
            scratch_frames,
            stats: Arc::new(PlaybackStats::default()),
        }
    }

    /// Get a handle to the counters.
    pub fn stats(&self) -> Arc<PlaybackStats> {
        Arc::clone(&self.stats)
    }

    /// Fill a device buffer. Frames the FIFO cannot supply are silence.
    pub fn fill<T>(&mut self, out: &mut [T])
    where
        T: cpal::Sample + cpal::FromSample<f32>,
    {
        let source_channels = self.fifo.channels();
        let whole = out.len() - out.len() % self.device_channels;
        let (frames_out, tail) = out.split_at_mut(whole);
        tail.fill(T::EQUILIBRIUM);

        let mut played = 0;
        let mut short = false;
        for chunk in frames_out.chunks_mut(self.scratch_frames * self.device_channels) {
            let frames = chunk.len() / self.device_channels;
            let scratch = &mut self.scratch[..frames * source_channels];

            let read = self.fifo.read(scratch, frames);
            played += read;
            short |= read < frames;

            for (dst, src) in chunk
                .chunks_exact_mut(self.device_channels)
                .zip(scratch.chunks_exact(source_channels))
            {
                map_frame(src, dst, self.gain);
            }
        }

        self.stats
            .frames_played
            .fetch_add(played as u64, Ordering::Relaxed);
        if short {
            self.stats.underruns.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Map one canonical frame onto the device channels and apply the gain.
fn map_frame<T>(src: &[f32], dst: &mut [T], gain: f32)
where
    T: cpal::Sample + cpal::FromSample<f32>,
{
    if let ([left, right], [mono]) = (src, &mut *dst) {
        *mono = T::from_sample((left + right) * 0.5 * gain);
        return;
    }

    // Identity, mono duplication, or clamping to the last source channel.
    let last = src.len() - 1;
    for (i, sample) in dst.iter_mut().enumerate() {
        *sample = T::from_sample(src[i.min(last)] * gain);
    }
}

/// A device that can run a [`PlaybackCallback`].
pub trait OutputBackend {
    type Stream: OutputStream;

    /// Choose a device format for the source. Nothing is opened.
    fn negotiate(&self, channels: u16, sample_rate: u32) -> Result<DeviceFormat>;

    /// Open the device with `format`. The stream is stopped until started.
    fn open(&self, format: &DeviceFormat, callback: PlaybackCallback) -> Result<Self::Stream>;
}

/// An opened device stream. Dropping it stops the device.
pub trait OutputStream {
    /// Start running the data callback.
    fn start(&mut self) -> Result<()>;

    /// Get an asynchronous error reported by the device, if any.
    fn poll_error(&self) -> Option<Error>;
}

/// Playback on the default output device of the default host.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Create a backend for the default host.
    pub fn new() -> Self {
        Self {
            host: cpal::default_host(),
        }
    }

    fn device(&self) -> Result<Device> {
        self.host
            .default_output_device()
            .ok_or_else(|| Error::DeviceInit("No output device found".to_string()))
    }

    fn build_stream<T>(
        device: &Device,
        config: &StreamConfig,
        mut callback: PlaybackCallback,
    ) -> Result<CpalStream>
    where
        T: cpal::SizedSample + cpal::FromSample<f32>,
    {
        let (error_tx, error_rx) = unbounded();

        let err_fn = move |err: cpal::StreamError| {
            let _ = error_tx.send(err.to_string());
        };

        let stream = device
            .build_output_stream(
                config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| callback.fill(data),
                err_fn,
                None,
            )
            .map_err(|e| Error::DeviceInit(format!("Failed to build stream: {e}")))?;

        Ok(CpalStream {
            stream,
            errors: error_rx,
        })
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBackend for CpalBackend {
    type Stream = CpalStream;

    fn negotiate(&self, channels: u16, sample_rate: u32) -> Result<DeviceFormat> {
        let device = self.device()?;
        let device_name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Using audio output device: {device_name}");

        let candidates: Vec<ConfigCandidate> = device
            .supported_output_configs()
            .map_err(|e| Error::DeviceInit(format!("Failed to query output configs: {e}")))?
            .filter_map(|range| {
                Some(ConfigCandidate {
                    channels: range.channels(),
                    min_rate: range.min_sample_rate().0,
                    max_rate: range.max_sample_rate().0,
                    sample: DeviceSample::from_cpal(range.sample_format())?,
                })
            })
            .collect();
        debug!("Supported output configs: {:?}", candidates);

        let default = device.default_output_config().ok().and_then(|config| {
            Some(DeviceFormat {
                channels: config.channels(),
                sample_rate: config.sample_rate().0,
                sample: DeviceSample::from_cpal(config.sample_format())?,
            })
        });

        choose_format(&candidates, default, channels, sample_rate)
            .ok_or_else(|| Error::DeviceInit("No usable output config".to_string()))
    }

    fn open(&self, format: &DeviceFormat, callback: PlaybackCallback) -> Result<CpalStream> {
        let device = self.device()?;
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: BufferSize::Default,
        };

        let stream = match format.sample {
            DeviceSample::F32 => Self::build_stream::<f32>(&device, &config, callback)?,
            DeviceSample::I16 => Self::build_stream::<i16>(&device, &config, callback)?,
            DeviceSample::U16 => Self::build_stream::<u16>(&device, &config, callback)?,
        };

        debug!("Output stream opened: {format}");
        Ok(stream)
    }
}

/// A cpal output stream.
pub struct CpalStream {
    stream: Stream,
    errors: Receiver<String>,
}

impl OutputStream for CpalStream {
    fn start(&mut self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| Error::DeviceStart(format!("Failed to start stream: {e}")))
    }

    fn poll_error(&self) -> Option<Error> {
        self.errors.try_recv().ok().map(Error::DeviceStream)
    }
}
