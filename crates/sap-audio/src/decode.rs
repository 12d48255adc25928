//! Audio decoding using symphonia.

use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use sap_core::{ChannelLayout, Error, Result, SampleFormat, StreamDescriptor};
use symphonia::core::{
    audio::AudioBufferRef,
    codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader, Track},
    io::{MediaSourceStream, MediaSourceStreamOptions},
    meta::MetadataOptions,
    probe::Hint,
    sample::SampleFormat as NativeFormat,
};
use tracing::{debug, trace, warn};

/// A decoded block of samples in the stream's native format.
///
/// Borrowed from the codec; valid until the next call to
/// [`FrameDecoder::next_frame`].
pub type RawFrame<'a> = AudioBufferRef<'a>;

/// An opened media container.
pub struct MediaSource {
    path: PathBuf,
    format: Box<dyn FormatReader>,
}

impl MediaSource {
    /// Open a file and probe its container format.
    pub fn open(path: &Path) -> Result<Self> {
        let open_failed = |reason: String| Error::Open {
            path: path.to_path_buf(),
            reason,
        };

        let file = File::open(path).map_err(|e| open_failed(e.to_string()))?;
        let mss = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let format_opts = FormatOptions {
            enable_gapless: true,
            ..Default::default()
        };
        let metadata_opts = MetadataOptions::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &format_opts, &metadata_opts)
            .map_err(|e| open_failed(e.to_string()))?;

        debug!(
            "Opened {:?}: {} track(s)",
            path,
            probed.format.tracks().len()
        );

        Ok(Self {
            path: path.to_path_buf(),
            format: probed.format,
        })
    }

    /// Select the best audio stream.
    ///
    /// The container's default track wins if it has a known codec, otherwise
    /// the first track with a known codec.
    pub fn select_best_audio_stream(&self) -> Result<StreamDescriptor> {
        let tracks = self.format.tracks();
        let is_audio = |t: &&Track| t.codec_params.codec != CODEC_TYPE_NULL;

        let track = self
            .format
            .default_track()
            .filter(is_audio)
            .or_else(|| tracks.iter().find(is_audio))
            .ok_or_else(|| Error::NoAudioStream(self.path.clone()))?;

        let stream = describe_track(track)?;
        debug!("Selected track {} of {}", stream.track_id, tracks.len());
        Ok(stream)
    }

    /// Open the codec for `stream` and start decoding.
    ///
    /// Consumes the source: a decode pass cannot be restarted.
    pub fn decode(self, stream: &StreamDescriptor) -> Result<FrameDecoder> {
        let track = self
            .format
            .tracks()
            .iter()
            .find(|t| t.id == stream.track_id)
            .ok_or_else(|| Error::NoAudioStream(self.path.clone()))?;

        let decoder_opts = DecoderOptions::default();
        let decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &decoder_opts)
            .map_err(|e| match e {
                SymphoniaError::Unsupported(_) => Error::NoDecoder(self.path.clone()),
                e => Error::CodecOpen(e.to_string()),
            })?;

        debug!("Codec opened for track {}", stream.track_id);

        Ok(FrameDecoder {
            format: self.format,
            decoder,
            track_id: stream.track_id,
            stats: DecodeStats::default(),
        })
    }
}

/// Counters from a decode pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Packets read from the container.
    pub packets: u64,
    /// Packets belonging to other tracks.
    pub skipped_packets: u64,
    /// Packets the codec rejected.
    pub rejected_packets: u64,
    /// Raw frames produced.
    pub buffers: u64,
    /// Sample frames produced.
    pub frames: u64,
}

/// Lazy, finite sequence of raw frames for one stream.
pub struct FrameDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    stats: DecodeStats,
}

impl FrameDecoder {
    /// Decode the next raw frame.
    ///
    /// Returns `Ok(None)` at end of stream. Every packet the codec fails on
    /// is logged, counted and skipped; only container read errors are fatal.
    pub fn next_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => {
                    return Ok(None); // End of stream
                }
                Err(SymphoniaError::ResetRequired) => {
                    warn!("Track list changed, ending stream");
                    return Ok(None);
                }
                Err(e) => {
                    return Err(Error::FatalDiagnostic(format!("Failed to read packet: {e}")));
                }
            };
            self.stats.packets += 1;

            // Skip packets for other tracks
            if packet.track_id() != self.track_id {
                self.stats.skipped_packets += 1;
                continue;
            }

            let outcome = self.decoder.decode(&packet).map(|_| ());
            match outcome {
                Ok(()) => break,
                Err(SymphoniaError::ResetRequired) => {
                    debug!("Codec reset requested");
                    self.decoder.reset();
                }
                Err(e) => {
                    self.stats.rejected_packets += 1;
                    warn!("Packet rejected by codec (skipping): {e}");
                }
            }
        }

        let frame = self.decoder.last_decoded();
        self.stats.buffers += 1;
        self.stats.frames += frame.frames() as u64;
        trace!("Decoded {} frames", frame.frames());

        Ok(Some(frame))
    }

    /// Get the counters so far.
    pub const fn stats(&self) -> DecodeStats {
        self.stats
    }
}

/// Build a stream descriptor from a container track.
fn describe_track(track: &Track) -> Result<StreamDescriptor> {
    let params = &track.codec_params;

    let sample_rate = params
        .sample_rate
        .ok_or_else(|| Error::StreamInfo(format!("track {} has no sample rate", track.id)))?;

    let channels = params
        .channels
        .or_else(|| params.channel_layout.map(|l| l.into_channels()))
        .filter(|c| c.count() > 0)
        .ok_or_else(|| Error::StreamInfo(format!("track {} has no channel layout", track.id)))?;

    let codec = symphonia::default::get_codecs().get_codec(params.codec);

    let duration_secs = params
        .time_base
        .zip(params.n_frames)
        .map(|(base, n_frames)| {
            let time = base.calc_time(n_frames);
            time.seconds as f64 + time.frac
        });

    Ok(StreamDescriptor {
        track_id: track.id,
        codec: codec.map_or_else(|| format!("{:?}", params.codec), |c| c.short_name.to_string()),
        codec_long_name: codec.map(|c| c.long_name.to_string()),
        sample_rate,
        layout: ChannelLayout::from_mask(channels.bits()),
        sample_format: params.sample_format.map(native_format),
        n_frames: params.n_frames,
        duration_secs,
    })
}

const fn native_format(format: NativeFormat) -> SampleFormat {
    match format {
        NativeFormat::U8 => SampleFormat::U8,
        NativeFormat::U16 => SampleFormat::U16,
        NativeFormat::U24 => SampleFormat::U24,
        NativeFormat::U32 => SampleFormat::U32,
        NativeFormat::S8 => SampleFormat::S8,
        NativeFormat::S16 => SampleFormat::S16,
        NativeFormat::S24 => SampleFormat::S24,
        NativeFormat::S32 => SampleFormat::S32,
        NativeFormat::F32 => SampleFormat::F32,
        NativeFormat::F64 => SampleFormat::F64,
    }
}
