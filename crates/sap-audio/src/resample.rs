//! Conversion of decoded frames to the canonical playback format.
//!
//! The canonical format is interleaved `f32` with the source channel layout.
//! Sample format conversion goes through symphonia's `SampleBuffer`; rate
//! conversion uses rubato and only runs when the output device cannot play
//! the source rate.

use rubato::{FftFixedIn, Resampler as RubatoResampler};
use sap_core::{Error, Result, StreamDescriptor};
use symphonia::core::audio::SampleBuffer;
use tracing::debug;

use crate::decode::RawFrame;

/// Input chunk size of the rate converter in frames.
const RATE_CHUNK_FRAMES: usize = 1024;

/// Converts raw frames into canonical frames.
pub struct Resampler {
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Interleaving buffer, sized to the largest frame seen.
    sample_buf: Option<SampleBuffer<f32>>,
    /// Capacity of `sample_buf` in frames.
    capacity: usize,
    rate: Option<RateConverter>,
    /// Output of the rate converter.
    converted: Vec<f32>,
}

impl Resampler {
    /// Configure a resampler for `stream`, producing `output_rate`.
    pub fn configure(stream: &StreamDescriptor, output_rate: u32) -> Result<Self> {
        let channels = usize::from(stream.channels());
        if channels == 0 {
            return Err(Error::Resample("stream has no channels".to_string()));
        }

        let rate = if stream.sample_rate == output_rate {
            None
        } else {
            Some(RateConverter::new(stream.sample_rate, output_rate, channels)?)
        };

        debug!(
            "Resampler configured: {} {}Hz -> f32 {}Hz, {} channels",
            stream
                .sample_format
                .map_or_else(|| "native".to_string(), |f| f.to_string()),
            stream.sample_rate,
            output_rate,
            channels
        );

        Ok(Self {
            input_rate: stream.sample_rate,
            output_rate,
            channels,
            sample_buf: None,
            capacity: 0,
            rate,
            converted: Vec::new(),
        })
    }

    /// Check if rate conversion is needed.
    pub const fn needs_rate_conversion(&self) -> bool {
        self.rate.is_some()
    }

    /// Get the output sample rate.
    pub const fn output_rate(&self) -> u32 {
        self.output_rate
    }

    /// Get the number of channels.
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Convert one raw frame to interleaved `f32`.
    ///
    /// The number of output frames may differ from the input when the rate
    /// is converted. A frame whose channel count or rate differs from the
    /// configured stream is an error.
    pub fn convert(&mut self, frame: RawFrame<'_>) -> Result<&[f32]> {
        let spec = *frame.spec();
        if spec.channels.count() != self.channels || spec.rate != self.input_rate {
            return Err(Error::Resample(format!(
                "frame format changed to {} channels at {}Hz",
                spec.channels.count(),
                spec.rate
            )));
        }

        let capacity = frame.capacity();
        if capacity == 0 {
            return Ok(&[]);
        }

        if self.sample_buf.is_none() || self.capacity < capacity {
            self.sample_buf = Some(SampleBuffer::new(capacity as u64, spec));
            self.capacity = capacity;
        }
        let Some(buf) = self.sample_buf.as_mut() else {
            return Ok(&[]);
        };
        buf.copy_interleaved_ref(frame);

        match &mut self.rate {
            None => Ok(buf.samples()),
            Some(rate) => {
                self.converted = rate.process(buf.samples())?;
                Ok(&self.converted)
            }
        }
    }

    /// Flush samples held back by the rate converter at end of stream.
    pub fn finish(&mut self) -> Result<&[f32]> {
        match &mut self.rate {
            None => Ok(&[]),
            Some(rate) => {
                self.converted = rate.flush()?;
                Ok(&self.converted)
            }
        }
    }
}

/// Fixed-input FFT rate converter over interleaved samples.
///
/// The converter's output delay is trimmed, so output frame `n` lines up
/// with input time `n / output_rate`.
struct RateConverter {
    resampler: FftFixedIn<f32>,
    input_rate: u32,
    output_rate: u32,
    channels: usize,
    /// Deinterleaved input waiting for a full chunk.
    input_buffer: Vec<Vec<f32>>,
    /// Leading output frames still to drop.
    delay: usize,
    frames_in: u64,
    frames_out: u64,
}

impl RateConverter {
    fn new(input_rate: u32, output_rate: u32, channels: usize) -> Result<Self> {
        let resampler = FftFixedIn::new(
            input_rate as usize,
            output_rate as usize,
            RATE_CHUNK_FRAMES,
            2,
            channels,
        )
        .map_err(|e| Error::Resample(format!("Failed to create rate converter: {e}")))?;
        let delay = resampler.output_delay();

        debug!(
            "Rate converter created: {}Hz -> {}Hz, {} channels, {} frames delay",
            input_rate, output_rate, channels, delay
        );

        Ok(Self {
            resampler,
            input_rate,
            output_rate,
            channels,
            input_buffer: vec![Vec::new(); channels],
            delay,
            frames_in: 0,
            frames_out: 0,
        })
    }

    /// Convert as many full chunks as are buffered.
    fn process(&mut self, input: &[f32]) -> Result<Vec<f32>> {
        self.deinterleave(input);

        let mut output = Vec::new();
        while self.input_buffer[0].len() >= RATE_CHUNK_FRAMES {
            let chunk: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| ch.drain(..RATE_CHUNK_FRAMES).collect())
                .collect();

            let resampled = self.convert_chunk(&chunk)?;
            self.emit(&resampled, usize::MAX, &mut output);
        }

        Ok(output)
    }

    /// Convert the buffered remainder and the delayed tail.
    ///
    /// Zero-padded chunks are pushed through until every input frame has a
    /// matching output frame.
    fn flush(&mut self) -> Result<Vec<f32>> {
        let target = (self.frames_in as f64 * f64::from(self.output_rate)
            / f64::from(self.input_rate))
        .round() as u64;

        let mut output = Vec::new();
        while self.frames_out < target {
            let chunk: Vec<Vec<f32>> = self
                .input_buffer
                .iter_mut()
                .map(|ch| {
                    let mut data = std::mem::take(ch);
                    data.resize(RATE_CHUNK_FRAMES, 0.0);
                    data
                })
                .collect();

            let resampled = self.convert_chunk(&chunk)?;
            if resampled.first().is_none_or(Vec::is_empty) {
                break;
            }
            self.emit(&resampled, (target - self.frames_out) as usize, &mut output);
        }

        Ok(output)
    }

    fn convert_chunk(&mut self, chunk: &[Vec<f32>]) -> Result<Vec<Vec<f32>>> {
        self.resampler
            .process(chunk, None)
            .map_err(|e| Error::Resample(format!("Rate conversion failed: {e}")))
    }

    fn deinterleave(&mut self, input: &[f32]) {
        for frame in input.chunks_exact(self.channels) {
            for (buffer, sample) in self.input_buffer.iter_mut().zip(frame) {
                buffer.push(*sample);
            }
        }
        self.frames_in += (input.len() / self.channels) as u64;
    }

    /// Interleave up to `max_frames` converted frames, dropping the delay first.
    fn emit(&mut self, planes: &[Vec<f32>], max_frames: usize, output: &mut Vec<f32>) {
        let Some(first) = planes.first() else {
            return;
        };

        let skip = self.delay.min(first.len());
        self.delay -= skip;

        let frames = (first.len() - skip).min(max_frames);
        output.reserve(frames * self.channels);
        for frame in skip..skip + frames {
            for plane in planes {
                output.push(plane[frame]);
            }
        }
        self.frames_out += frames as u64;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests use unwrap for brevity

    use super::*;
    use sap_core::{ChannelLayout, SampleFormat};
    use symphonia::core::audio::{AsAudioBufferRef, AudioBuffer, Channels, Signal, SignalSpec};

    fn stream(sample_rate: u32, layout: ChannelLayout) -> StreamDescriptor {
        StreamDescriptor {
            track_id: 0,
            codec: "pcm_s16le".to_string(),
            codec_long_name: None,
            sample_rate,
            layout,
            sample_format: Some(SampleFormat::S16),
            n_frames: None,
            duration_secs: None,
        }
    }

    fn stereo_buffer(rate: u32, left: &[f32], right: &[f32]) -> AudioBuffer<f32> {
        let spec = SignalSpec::new(rate, Channels::FRONT_LEFT | Channels::FRONT_RIGHT);
        let mut buf = AudioBuffer::<f32>::new(left.len() as u64, spec);
        buf.render_reserved(Some(left.len()));
        buf.chan_mut(0).copy_from_slice(left);
        buf.chan_mut(1).copy_from_slice(right);
        buf
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_converts_s16_to_f32() {
        let mut resampler = Resampler::configure(&stream(44100, ChannelLayout::MONO), 44100).unwrap();
        assert!(!resampler.needs_rate_conversion());

        let spec = SignalSpec::new(44100, Channels::FRONT_CENTRE);
        let mut buf = AudioBuffer::<i16>::new(4, spec);
        buf.render_reserved(Some(4));
        buf.chan_mut(0).copy_from_slice(&[0, 16384, -16384, i16::MIN]);

        let out = resampler.convert(buf.as_audio_buffer_ref()).unwrap();
        assert_eq!(out, &[0.0, 0.5, -0.5, -1.0]);
    }

    #[test]
    #[allow(clippy::float_cmp)]
    fn test_interleaves_planes() {
        let mut resampler =
            Resampler::configure(&stream(48000, ChannelLayout::STEREO), 48000).unwrap();

        let buf = stereo_buffer(48000, &[0.1, 0.2, 0.3], &[-0.1, -0.2, -0.3]);
        let out = resampler.convert(buf.as_audio_buffer_ref()).unwrap();
        assert_eq!(out, &[0.1, -0.1, 0.2, -0.2, 0.3, -0.3]);

        // A larger frame grows the interleaving buffer.
        let buf = stereo_buffer(48000, &[0.5; 8], &[0.25; 8]);
        assert_eq!(resampler.convert(buf.as_audio_buffer_ref()).unwrap().len(), 16);

        assert!(resampler.finish().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_format_change() {
        let mut resampler = Resampler::configure(&stream(44100, ChannelLayout::MONO), 44100).unwrap();

        let buf = stereo_buffer(44100, &[0.0; 4], &[0.0; 4]);
        let err = resampler.convert(buf.as_audio_buffer_ref()).unwrap_err();
        assert!(matches!(err, Error::Resample(_)));
    }

    #[test]
    fn test_rate_conversion_frame_count() {
        let mut resampler =
            Resampler::configure(&stream(48000, ChannelLayout::STEREO), 44100).unwrap();
        assert!(resampler.needs_rate_conversion());
        assert_eq!(resampler.output_rate(), 44100);
        assert_eq!(resampler.channels(), 2);

        let mut out_samples = 0;
        for _ in 0..48 {
            let buf = stereo_buffer(48000, &[0.25; 1000], &[-0.25; 1000]);
            out_samples += resampler.convert(buf.as_audio_buffer_ref()).unwrap().len();
        }
        out_samples += resampler.finish().unwrap().len();

        assert_eq!(out_samples % 2, 0);
        assert_eq!(out_samples / 2, 44100);
    }

    #[test]
    fn test_rate_conversion_trims_delay() {
        let mut resampler =
            Resampler::configure(&stream(44100, ChannelLayout::STEREO), 48000).unwrap();

        let mut out = Vec::new();
        for _ in 0..10 {
            let buf = stereo_buffer(44100, &[0.5; 441], &[0.5; 441]);
            out.extend_from_slice(resampler.convert(buf.as_audio_buffer_ref()).unwrap());
        }
        out.extend_from_slice(resampler.finish().unwrap());

        assert_eq!(out.len() / 2, 4800);
        // Signal starts right away instead of after a block of silence
        assert!(out[..64].iter().any(|s| *s > 0.4), "{:?}", &out[..64]);
        // and the end of the input is not cut off
        let tail = &out[out.len() - 600..out.len() - 300];
        assert!(tail.iter().all(|s| (*s - 0.5).abs() < 0.1), "{tail:?}");
    }
}
