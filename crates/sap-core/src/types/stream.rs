//! Stream and audio format types.

use std::fmt;

/// Native sample format of a decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    U8,
    U16,
    U24,
    U32,
    S8,
    S16,
    S24,
    S32,
    F32,
    F64,
}

impl SampleFormat {
    /// Get the short name (`s16`, `f32`, ...).
    pub const fn name(self) -> &'static str {
        match self {
            Self::U8 => "u8",
            Self::U16 => "u16",
            Self::U24 => "u24",
            Self::U32 => "u32",
            Self::S8 => "s8",
            Self::S16 => "s16",
            Self::S24 => "s24",
            Self::S32 => "s32",
            Self::F32 => "f32",
            Self::F64 => "f64",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Channel layout as a speaker position bit mask.
///
/// Bit 0 is front left, bit 1 front right, bit 2 front centre, and so on.
/// The channel count is the number of set bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelLayout {
    mask: u32,
}

impl ChannelLayout {
    pub const MONO: Self = Self { mask: 0b0100 };
    pub const STEREO: Self = Self { mask: 0b0011 };

    pub const fn from_mask(mask: u32) -> Self {
        Self { mask }
    }

    pub const fn count(self) -> u16 {
        self.mask.count_ones() as u16
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.count() {
            1 => f.write_str("mono"),
            2 => f.write_str("stereo"),
            n => write!(f, "{n} channels"),
        }
    }
}

/// Metadata of the selected audio stream.
///
/// Read once after stream selection; configures both the codec and the
/// resampler.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamDescriptor {
    /// Container track id.
    pub track_id: u32,
    /// Short codec name (`mp3`, `flac`, `pcm_s16le`, ...).
    pub codec: String,
    /// Human readable codec name.
    pub codec_long_name: Option<String>,
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Channel layout.
    pub layout: ChannelLayout,
    /// Native sample format (if the container reports it).
    pub sample_format: Option<SampleFormat>,
    /// Total number of frames (if known).
    pub n_frames: Option<u64>,
    /// Total duration in seconds (if known).
    pub duration_secs: Option<f64>,
}

impl StreamDescriptor {
    /// Get the number of channels.
    pub const fn channels(&self) -> u16 {
        self.layout.count()
    }
}

impl fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, {} Hz, {}", self.codec, self.sample_rate, self.layout)?;
        if let Some(format) = self.sample_format {
            write!(f, ", {format}")?;
        }
        if let Some(duration) = self.duration_secs {
            write!(f, ", {duration:.2}s")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor() -> StreamDescriptor {
        StreamDescriptor {
            track_id: 0,
            codec: "pcm_s16le".to_string(),
            codec_long_name: None,
            sample_rate: 44100,
            layout: ChannelLayout::MONO,
            sample_format: Some(SampleFormat::S16),
            n_frames: Some(44100),
            duration_secs: Some(1.0),
        }
    }

    #[test]
    fn test_channel_layout_count() {
        assert_eq!(ChannelLayout::MONO.count(), 1);
        assert_eq!(ChannelLayout::STEREO.count(), 2);
        assert_eq!(ChannelLayout::from_mask(0b11_1111).count(), 6);
        assert_eq!(ChannelLayout::from_mask(0b11_1111).to_string(), "6 channels");
    }

    #[test]
    fn test_sample_format_name() {
        assert_eq!(SampleFormat::F32.to_string(), "f32");
        assert_eq!(SampleFormat::S24.name(), "s24");
    }

    #[test]
    fn test_descriptor_display() {
        let stream = descriptor();
        assert_eq!(stream.channels(), 1);
        assert_eq!(stream.to_string(), "pcm_s16le, 44100 Hz, mono, s16, 1.00s");

        let bare = StreamDescriptor {
            sample_format: None,
            duration_secs: None,
            layout: ChannelLayout::STEREO,
            ..descriptor()
        };
        assert_eq!(bare.to_string(), "pcm_s16le, 44100 Hz, stereo");
    }
}
