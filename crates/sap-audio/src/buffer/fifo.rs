//! Sample FIFO between the decode pass and the device callback.
//!
//! Writes take `&mut self`, so they can only happen while the FIFO has a
//! single owner (the decode phase). Once it is shared with the device
//! callback through an `Arc`, the contents are immutable and readers only
//! advance an atomic cursor.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Growable FIFO of interleaved `f32` frames.
pub struct PlaybackFifo {
    /// Interleaved samples. Everything before `read_pos` is consumed.
    samples: Vec<f32>,
    /// Read cursor in samples, always a multiple of `channels`.
    read_pos: AtomicUsize,
    /// Samples per frame.
    channels: usize,
}

impl PlaybackFifo {
    /// Create an empty FIFO for frames of `channels` samples.
    pub fn new(channels: usize) -> Self {
        Self::with_capacity(channels, 0)
    }

    /// Create an empty FIFO with room for `frames` frames.
    pub fn with_capacity(channels: usize, frames: usize) -> Self {
        let channels = channels.max(1);
        Self {
            samples: Vec::with_capacity(frames.saturating_mul(channels)),
            read_pos: AtomicUsize::new(0),
            channels,
        }
    }

    /// Get the number of samples per frame.
    pub const fn channels(&self) -> usize {
        self.channels
    }

    /// Get the number of frames available for reading.
    pub fn size(&self) -> usize {
        let read_pos = self.read_pos.load(Ordering::Acquire);
        self.samples.len().saturating_sub(read_pos) / self.channels
    }

    /// Check if the FIFO is empty.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Append up to `frames` frames from interleaved `samples`.
    ///
    /// Only whole frames are taken. Returns the number of frames written.
    pub fn write(&mut self, samples: &[f32], frames: usize) -> usize {
        let frames = frames.min(samples.len() / self.channels);
        if frames == 0 {
            return 0;
        }

        self.compact();
        self.samples
            .extend_from_slice(&samples[..frames * self.channels]);

        frames
    }

    /// Destructively read up to `frames` frames into `output`.
    ///
    /// The first `frames * channels` samples of `output` are always written:
    /// frames that are not available are filled with silence. Samples past
    /// that region are left untouched. Returns the number of frames actually
    /// taken from the FIFO.
    ///
    /// Never blocks or allocates.
    pub fn read(&self, output: &mut [f32], frames: usize) -> usize {
        let wanted = frames.min(output.len() / self.channels) * self.channels;

        // Reserve the range first so concurrent readers never see the same frame.
        let mut read_pos = self.read_pos.load(Ordering::Acquire);
        let to_read = loop {
            let to_read = wanted.min(self.samples.len().saturating_sub(read_pos));
            match self.read_pos.compare_exchange_weak(
                read_pos,
                read_pos + to_read,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break to_read,
                Err(actual) => read_pos = actual,
            }
        };

        output[..to_read].copy_from_slice(&self.samples[read_pos..read_pos + to_read]);
        output[to_read..wanted].fill(0.0);

        to_read / self.channels
    }

    /// Move the FIFO behind an `Arc` for the device callback.
    pub fn into_shared(self) -> SharedFifo {
        Arc::new(self)
    }

    /// Reclaim consumed space once it makes up at least half the storage.
    fn compact(&mut self) {
        let read_pos = (*self.read_pos.get_mut()).min(self.samples.len());
        if read_pos == 0 || read_pos < self.samples.len() / 2 {
            return;
        }

        self.samples.drain(..read_pos);
        *self.read_pos.get_mut() = 0;
    }
}

/// Thread-safe reference to a FIFO.
pub type SharedFifo = Arc<PlaybackFifo>;
