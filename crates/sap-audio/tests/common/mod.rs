//! Test helpers: WAV fixtures and an in-process output backend.

#![allow(dead_code, clippy::unwrap_used)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use sap_audio::{DeviceFormat, DeviceSample, OutputBackend, OutputStream, PlaybackCallback};
use sap_core::{Error, Result};
use tempfile::TempDir;

/// Write a 16-bit PCM WAV file with interleaved `samples`.
pub fn write_wav(path: &Path, channels: u16, sample_rate: u32, samples: &[i16]) {
    let data_len = (samples.len() * 2) as u32;
    write_wav_header(path, channels, sample_rate, samples, 36 + data_len, data_len);
}

/// Write a WAV whose header declares the given RIFF and data chunk sizes.
pub fn write_wav_header(
    path: &Path,
    channels: u16,
    sample_rate: u32,
    samples: &[i16],
    riff_len: u32,
    data_len: u32,
) {
    let block_align = channels * 2;

    let mut bytes = Vec::with_capacity(44 + samples.len() * 2);
    bytes.extend_from_slice(b"RIFF");
    bytes.extend_from_slice(&riff_len.to_le_bytes());
    bytes.extend_from_slice(b"WAVE");

    bytes.extend_from_slice(b"fmt ");
    bytes.extend_from_slice(&16u32.to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes()); // PCM
    bytes.extend_from_slice(&channels.to_le_bytes());
    bytes.extend_from_slice(&sample_rate.to_le_bytes());
    bytes.extend_from_slice(&(sample_rate * u32::from(block_align)).to_le_bytes());
    bytes.extend_from_slice(&block_align.to_le_bytes());
    bytes.extend_from_slice(&16u16.to_le_bytes());

    bytes.extend_from_slice(b"data");
    bytes.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }

    File::create(path).unwrap().write_all(&bytes).unwrap();
}

/// A WAV file in a temporary directory.
pub struct Fixture {
    _dir: TempDir,
    pub path: PathBuf,
}

impl Fixture {
    pub fn wav(channels: u16, sample_rate: u32, samples: &[i16]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fixture.wav");
        write_wav(&path, channels, sample_rate, samples);
        Self { _dir: dir, path }
    }

    /// A WAV as written to a pipe: both chunk sizes are `0xFFFF_FFFF`.
    pub fn piped_wav(channels: u16, sample_rate: u32, samples: &[i16]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("piped.wav");
        write_wav_header(&path, channels, sample_rate, samples, u32::MAX, u32::MAX);
        Self { _dir: dir, path }
    }

    pub fn bytes(name: &str, contents: &[u8]) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        File::create(&path).unwrap().write_all(contents).unwrap();
        Self { _dir: dir, path }
    }
}

/// A ramp of `frames` frames, identical on every channel.
pub fn ramp(channels: u16, frames: usize) -> Vec<i16> {
    (0..frames)
        .flat_map(|i| std::iter::repeat_n((i % 2000) as i16 * 8, usize::from(channels)))
        .collect()
}

/// Output backend that runs the callback on a plain thread.
#[derive(Clone, Default)]
pub struct FakeBackend {
    /// Format to negotiate. Defaults to the source format as `f32`.
    pub format: Option<DeviceFormat>,
    pub fail_start: bool,
    pub stream_error: Option<String>,
    pub opened: Arc<AtomicBool>,
    /// Every sample the callback produced.
    pub captured: Arc<Mutex<Vec<f32>>>,
}

impl FakeBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format(channels: u16, sample_rate: u32) -> Self {
        Self {
            format: Some(DeviceFormat {
                channels,
                sample_rate,
                sample: DeviceSample::F32,
            }),
            ..Self::default()
        }
    }

    pub fn was_opened(&self) -> bool {
        self.opened.load(Ordering::SeqCst)
    }
}

impl OutputBackend for FakeBackend {
    type Stream = FakeStream;

    fn negotiate(&self, channels: u16, sample_rate: u32) -> Result<DeviceFormat> {
        Ok(self.format.unwrap_or(DeviceFormat {
            channels,
            sample_rate,
            sample: DeviceSample::F32,
        }))
    }

    fn open(&self, format: &DeviceFormat, callback: PlaybackCallback) -> Result<FakeStream> {
        self.opened.store(true, Ordering::SeqCst);
        Ok(FakeStream {
            callback: Some(callback),
            channels: usize::from(format.channels),
            fail_start: self.fail_start,
            stream_error: self.stream_error.clone(),
            captured: Arc::clone(&self.captured),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        })
    }
}

pub struct FakeStream {
    callback: Option<PlaybackCallback>,
    channels: usize,
    fail_start: bool,
    stream_error: Option<String>,
    captured: Arc<Mutex<Vec<f32>>>,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

/// Frames per fake device period.
const PERIOD_FRAMES: usize = 512;

impl OutputStream for FakeStream {
    fn start(&mut self) -> Result<()> {
        if self.fail_start {
            return Err(Error::DeviceStart("device refused to start".to_string()));
        }
        let mut callback = self
            .callback
            .take()
            .ok_or_else(|| Error::DeviceStart("already started".to_string()))?;

        let captured = Arc::clone(&self.captured);
        let stop = Arc::clone(&self.stop);
        let period = PERIOD_FRAMES * self.channels;

        self.worker = Some(thread::spawn(move || {
            let mut buffer = vec![0.0f32; period];
            while !stop.load(Ordering::SeqCst) {
                callback.fill(&mut buffer);
                captured.lock().extend_from_slice(&buffer);
                thread::sleep(Duration::from_millis(1));
            }
        }));
        Ok(())
    }

    fn poll_error(&self) -> Option<Error> {
        self.stream_error.clone().map(Error::DeviceStream)
    }
}

impl Drop for FakeStream {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            worker.join().unwrap();
        }
    }
}
