//! WAV file sink implementation.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hound::{WavSpec, WavWriter};
use tokio::sync::Mutex;

use crate::config::SampleFormat;
use crate::format::{f32_to_i16, raw_to_i16, raw_to_i8, PlanarBuffer};
use crate::sink::PlaybackSink;
use crate::SinkError;

/// How incoming samples are turned into integer PCM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    /// Floating samples in [-1.0, 1.0], scaled to 16-bit.
    Scaled16,
    /// Raw PCM values written at the given width without scaling.
    Raw(SampleFormat),
}

impl Encoding {
    fn bits_per_sample(self) -> u16 {
        match self {
            Self::Scaled16 => 16,
            Self::Raw(format) => format.bits_per_sample(),
        }
    }
}

/// A sink that writes audio to a WAV file.
///
/// The file is created on first write, once the channel count and sample
/// rate are known, and finalized on `on_stop()`. Each `on_start()` begins a
/// new take that overwrites the file. All file I/O runs on the blocking
/// thread pool.
///
/// As a [`PlaybackSink`] it writes each rendered buffer and reports the
/// buffer's natural duration, which paces the scheduler in real time.
///
/// # Example
///
/// ```no_run
/// use pcm_relay::FileSink;
///
/// let sink = FileSink::wav("playback.wav");
/// // Connect to an AudioInput...
/// ```
pub struct FileSink {
    name: String,
    path: Arc<PathBuf>,
    encoding: Encoding,
    state: Arc<Mutex<FileState>>,
}

#[derive(Default)]
struct FileState {
    writer: Option<WavWriter<BufWriter<File>>>,
    spec: Option<WavSpec>,
    samples_written: u64,
    finalized: bool,
}

impl FileSink {
    /// Creates a sink that writes normalized float audio as 16-bit WAV.
    pub fn wav(path: impl AsRef<Path>) -> Self {
        Self::with_encoding(path, Encoding::Scaled16)
    }

    /// Creates a recorder that writes raw PCM values at the given width.
    pub(crate) fn pcm(path: impl AsRef<Path>, format: SampleFormat) -> Self {
        Self::with_encoding(path, Encoding::Raw(format))
    }

    fn with_encoding(path: impl AsRef<Path>, encoding: Encoding) -> Self {
        Self {
            name: format!("file:{}", path.as_ref().display()),
            path: Arc::new(path.as_ref().to_path_buf()),
            encoding,
            state: Arc::new(Mutex::new(FileState::default())),
        }
    }

    /// Path of the WAV file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of samples written so far, across all channels.
    pub async fn samples_written(&self) -> u64 {
        self.state.lock().await.samples_written
    }

    /// Appends interleaved samples.
    ///
    /// All writes to one file must use the same channel count and sample
    /// rate as the first.
    pub async fn append_interleaved(
        &self,
        samples: Arc<Vec<f32>>,
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), SinkError> {
        tracing::trace!(
            "FileSink {}: writing {} samples",
            self.name,
            samples.len()
        );

        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);
        let encoding = self.encoding;

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::write_samples_blocking(&mut state, &path, encoding, &samples, channels, sample_rate)
        })
        .await
        .map_err(|e| SinkError::custom(format!("write task panicked: {e}")))?
    }

    /// Finalizes the WAV header and closes the file.
    ///
    /// Returns the path if any audio was written, or `None` if the file was
    /// never created. Calling it again after finalizing returns the same
    /// result without touching the file.
    pub async fn finalize(&self) -> Result<Option<PathBuf>, SinkError> {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            Self::finalize_blocking(&mut state, &path)
        })
        .await
        .map_err(|e| SinkError::custom(format!("finalize task panicked: {e}")))?
    }

    /// Starts a new take: any open writer is finalized, and the next write
    /// recreates the file.
    pub async fn reopen(&self) -> Result<(), SinkError> {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            let finished = Self::finalize_blocking(&mut state, &path);
            *state = FileState::default();
            finished.map(|_| ())
        })
        .await
        .map_err(|e| SinkError::custom(format!("reopen task panicked: {e}")))?
    }

    fn write_samples_blocking(
        state: &mut FileState,
        path: &Path,
        encoding: Encoding,
        samples: &[f32],
        channels: u16,
        sample_rate: u32,
    ) -> Result<(), SinkError> {
        if state.finalized {
            return Err(SinkError::unavailable(format!(
                "{} is already finalized",
                path.display()
            )));
        }

        let spec = WavSpec {
            channels,
            sample_rate,
            bits_per_sample: encoding.bits_per_sample(),
            sample_format: hound::SampleFormat::Int,
        };

        match state.spec {
            Some(existing) if existing != spec => {
                return Err(SinkError::write_failed(format!(
                    "format changed mid-file: {}ch/{}Hz -> {}ch/{}Hz",
                    existing.channels, existing.sample_rate, channels, sample_rate
                )));
            }
            Some(_) => {}
            None => {
                let writer = WavWriter::create(path, spec).map_err(|e| wav_error(path, e))?;
                state.writer = Some(writer);
                state.spec = Some(spec);
            }
        }

        if let Some(ref mut writer) = state.writer {
            for &sample in samples {
                let written = match encoding {
                    Encoding::Scaled16 => writer.write_sample(f32_to_i16(sample)),
                    Encoding::Raw(SampleFormat::Pcm16Bit) => writer.write_sample(raw_to_i16(sample)),
                    Encoding::Raw(SampleFormat::Pcm8Bit) => writer.write_sample(raw_to_i8(sample)),
                };
                written.map_err(|e| wav_error(path, e))?;
            }
            state.samples_written += samples.len() as u64;
        }

        Ok(())
    }

    fn finalize_blocking(state: &mut FileState, path: &Path) -> Result<Option<PathBuf>, SinkError> {
        if let Some(writer) = state.writer.take() {
            writer.finalize().map_err(|e| wav_error(path, e))?;
        }
        state.finalized = true;

        Ok(state.spec.map(|_| path.to_path_buf()))
    }
}

fn wav_error(path: &Path, error: hound::Error) -> SinkError {
    match error {
        hound::Error::IoError(e) => SinkError::file_error(path, e),
        other => SinkError::encoding(path, other),
    }
}

#[async_trait]
impl PlaybackSink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError> {
        self.append_interleaved(
            Arc::new(buffer.interleave()),
            buffer.channel_count(),
            buffer.sample_rate(),
        )
        .await?;
        Ok(buffer.duration())
    }

    async fn on_start(&self) -> Result<(), SinkError> {
        tracing::debug!("FileSink {}: starting new take", self.name);
        self.reopen().await
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        self.finalize().await.map(|_| ())
    }
}
