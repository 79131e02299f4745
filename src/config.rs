//! Configuration types for capture sessions.
//!
//! Callers describe what they want with [`CaptureOptions`], where every field
//! is optional. [`AudioFormatConfig::from_options`] substitutes defaults for
//! omitted fields and validates the result as a whole: either every option is
//! accepted or the first problem is reported and nothing is applied.

use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::format::Normalization;

/// Default sample rate in Hz.
pub const DEFAULT_SAMPLE_RATE: u32 = rates::CD_AUDIO_44100_HZ;
/// Default capture buffer (chunk) size in samples.
pub const DEFAULT_BUFFER_SIZE: usize = 16384;
/// Default channel count (mono).
pub const DEFAULT_CHANNELS: u16 = 1;
/// Default sample format.
pub const DEFAULT_FORMAT: SampleFormat = SampleFormat::Pcm16Bit;
/// Whether normalization is enabled by default.
pub const DEFAULT_NORMALIZE: bool = true;
/// Default normalization divisor.
pub const DEFAULT_NORMALIZATION_FACTOR: f32 = 32767.0;
/// Default maximum number of chunks merged into one render.
pub const DEFAULT_BATCH_SIZE_LIMIT: usize = 10;

/// Named sample rates commonly supported by capture hardware.
pub mod rates {
    /// 8 kHz telephone quality.
    pub const TELEPHONE_8000_HZ: u32 = 8000;
    /// Quarter CD rate.
    pub const CD_QUARTER_11025_HZ: u32 = 11025;
    /// 16 kHz wideband voice.
    pub const VOIP_16000_HZ: u32 = 16000;
    /// Half CD rate.
    pub const CD_HALF_22050_HZ: u32 = 22050;
    /// Mini DV rate.
    pub const MINI_DV_32000_HZ: u32 = 32000;
    /// CD-XA rate.
    pub const CD_XA_37800_HZ: u32 = 37800;
    /// NTSC-derived rate.
    pub const NTSC_44056_HZ: u32 = 44056;
    /// CD audio rate.
    pub const CD_AUDIO_44100_HZ: u32 = 44100;
}

/// PCM sample width delivered by the capture backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit samples (`PCM_16BIT`).
    #[default]
    Pcm16Bit,
    /// 8-bit samples (`PCM_8BIT`).
    Pcm8Bit,
}

impl SampleFormat {
    /// The tag used in serialized options.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16Bit => "PCM_16BIT",
            Self::Pcm8Bit => "PCM_8BIT",
        }
    }

    /// Bits per sample.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::Pcm16Bit => 16,
            Self::Pcm8Bit => 8,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SampleFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PCM_16BIT" => Ok(Self::Pcm16Bit),
            "PCM_8BIT" => Ok(Self::Pcm8Bit),
            other => Err(ConfigError::InvalidFormat(other.to_string())),
        }
    }
}

/// The kind of input the capture backend should open, where the platform
/// distinguishes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioSourceType {
    /// Platform default input.
    #[default]
    Default,
    /// Raw microphone.
    Mic,
    /// Microphone oriented like the camera.
    Camcorder,
    /// Tuned for speech recognition.
    VoiceRecognition,
    /// Tuned for VoIP (echo cancellation, gain control where available).
    VoiceCommunication,
    /// Unprocessed input, if available.
    Unprocessed,
}

impl AudioSourceType {
    /// Numeric code used in serialized options.
    pub fn code(&self) -> i64 {
        match self {
            Self::Default => 0,
            Self::Mic => 1,
            Self::Camcorder => 5,
            Self::VoiceRecognition => 6,
            Self::VoiceCommunication => 7,
            Self::Unprocessed => 9,
        }
    }

    /// Looks up a source type by its numeric code.
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Default),
            1 => Some(Self::Mic),
            5 => Some(Self::Camcorder),
            6 => Some(Self::VoiceRecognition),
            7 => Some(Self::VoiceCommunication),
            9 => Some(Self::Unprocessed),
            _ => None,
        }
    }
}

/// Where captured chunks go during a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Every normalized chunk is emitted as [`CaptureEvent::Audio`](crate::CaptureEvent::Audio).
    Events,
    /// Chunks are queued and rendered to the output by the playback scheduler.
    Playback,
    /// Raw chunks are encoded to a WAV file; no audio events are raised.
    Record,
}

/// Caller-supplied capture options.
///
/// Every field is optional; omitted fields take the crate defaults. Numeric
/// fields are intentionally wide so that out-of-range values are reported by
/// validation rather than being unrepresentable.
///
/// # Example
///
/// ```
/// use pcm_relay::CaptureOptions;
///
/// let options = CaptureOptions {
///     sample_rate: Some(16000.0),
///     channels: Some(2),
///     stream_to_output: Some(true),
///     ..Default::default()
/// };
/// ```
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureOptions {
    /// Sample rate in Hz. Default: 44100
    pub sample_rate: Option<f64>,
    /// Samples per delivered chunk. Default: 16384
    pub buffer_size: Option<i64>,
    /// 1 (mono) or 2 (stereo). Default: 1
    pub channels: Option<i64>,
    /// `"PCM_16BIT"` or `"PCM_8BIT"`. Default: `"PCM_16BIT"`
    pub format: Option<String>,
    /// Divide samples by `normalization_factor`. Default: true
    pub normalize: Option<bool>,
    /// Normalization divisor. Default: 32767.0
    pub normalization_factor: Option<f64>,
    /// Play captured audio through the output instead of emitting events. Default: false
    #[serde(alias = "streamToWebAudio")]
    pub stream_to_output: Option<bool>,
    /// Maximum chunks merged per render; low means lower latency but more
    /// render calls. Default: 10
    #[serde(alias = "concatenateMaxChunks")]
    pub batch_size_limit: Option<i64>,
    /// Numeric [`AudioSourceType`] code. Default: 0
    pub audio_source_type: Option<i64>,
    /// Record to this WAV file instead of emitting events.
    #[serde(alias = "fileUrl")]
    pub file: Option<PathBuf>,
}

impl CaptureOptions {
    /// Decodes options from a JSON object with camelCase keys.
    ///
    /// Unknown keys are ignored. A value of the wrong JSON type (for example a
    /// string sample rate) is a [`ConfigError::Malformed`].
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|e| ConfigError::Malformed(e.to_string()))
    }
}

/// Validated, immutable configuration for one capture session.
///
/// Created by [`AudioFormatConfig::from_options`]; replaced wholesale on the
/// next start.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFormatConfig {
    sample_rate: u32,
    buffer_size: NonZeroUsize,
    channels: u16,
    format: SampleFormat,
    normalization: Normalization,
    batch_size_limit: NonZeroUsize,
    stream_to_output: bool,
    source_type: AudioSourceType,
    file: Option<PathBuf>,
}

impl Default for AudioFormatConfig {
    fn default() -> Self {
        Self {
            sample_rate: DEFAULT_SAMPLE_RATE,
            buffer_size: NonZeroUsize::new(DEFAULT_BUFFER_SIZE).unwrap_or(NonZeroUsize::MIN),
            channels: DEFAULT_CHANNELS,
            format: DEFAULT_FORMAT,
            normalization: Normalization::default(),
            batch_size_limit: NonZeroUsize::new(DEFAULT_BATCH_SIZE_LIMIT)
                .unwrap_or(NonZeroUsize::MIN),
            stream_to_output: false,
            source_type: AudioSourceType::Default,
            file: None,
        }
    }
}

impl AudioFormatConfig {
    /// Builds a configuration from caller options, substituting defaults.
    ///
    /// Fields are checked in order: channels, format, buffer size, batch size
    /// limit, sample rate, normalization factor, source type, then the
    /// delivery combination. The first failure is returned.
    pub fn from_options(options: &CaptureOptions) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let channels = match options.channels {
            None => defaults.channels,
            Some(n @ (1 | 2)) => n as u16,
            Some(n) => return Err(ConfigError::InvalidChannels(n)),
        };

        let format = match options.format.as_deref() {
            None => defaults.format,
            Some(tag) => tag.parse()?,
        };

        let buffer_size = match options.buffer_size {
            None => defaults.buffer_size,
            Some(n) => positive(n).ok_or(ConfigError::InvalidBufferSize(n))?,
        };

        let batch_size_limit = match options.batch_size_limit {
            None => defaults.batch_size_limit,
            Some(n) => positive(n).ok_or(ConfigError::InvalidBatchSizeLimit(n))?,
        };

        let sample_rate = match options.sample_rate {
            None => defaults.sample_rate,
            Some(rate) => whole_hz(rate).ok_or(ConfigError::InvalidSampleRate(rate))?,
        };

        // Checked after narrowing: tiny or huge f64 values collapse to 0 or inf in f32
        let factor = match options.normalization_factor {
            None => defaults.normalization.factor,
            Some(f) => match f as f32 {
                narrowed if narrowed.is_normal() && narrowed > 0.0 => narrowed,
                _ => return Err(ConfigError::InvalidNormalizationFactor(f)),
            },
        };

        let source_type = match options.audio_source_type {
            None => defaults.source_type,
            Some(code) => {
                AudioSourceType::from_code(code).ok_or(ConfigError::InvalidSourceType(code))?
            }
        };

        let stream_to_output = options.stream_to_output.unwrap_or(defaults.stream_to_output);
        if stream_to_output && options.file.is_some() {
            return Err(ConfigError::ConflictingDelivery);
        }

        Ok(Self {
            sample_rate,
            buffer_size,
            channels,
            format,
            normalization: Normalization {
                enabled: options.normalize.unwrap_or(defaults.normalization.enabled),
                factor,
            },
            batch_size_limit,
            stream_to_output,
            source_type,
            file: options.file.clone(),
        })
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Samples per delivered chunk.
    pub fn buffer_size(&self) -> usize {
        self.buffer_size.get()
    }

    /// Channel count (1 or 2).
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// PCM sample format.
    pub fn format(&self) -> SampleFormat {
        self.format
    }

    /// Normalization settings.
    pub fn normalization(&self) -> Normalization {
        self.normalization
    }

    /// Maximum number of chunks merged per render.
    pub fn batch_size_limit(&self) -> usize {
        self.batch_size_limit.get()
    }

    /// Whether captured audio is streamed to the output.
    pub fn stream_to_output(&self) -> bool {
        self.stream_to_output
    }

    /// Requested input source type.
    pub fn source_type(&self) -> AudioSourceType {
        self.source_type
    }

    /// WAV file that record mode writes to.
    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    /// Where captured chunks are delivered.
    pub fn delivery(&self) -> DeliveryMode {
        if self.file.is_some() {
            DeliveryMode::Record
        } else if self.stream_to_output {
            DeliveryMode::Playback
        } else {
            DeliveryMode::Events
        }
    }
}

fn positive(n: i64) -> Option<NonZeroUsize> {
    usize::try_from(n).ok().and_then(NonZeroUsize::new)
}

fn whole_hz(rate: f64) -> Option<u32> {
    if rate.is_finite() && rate >= 1.0 && rate.fract() == 0.0 && rate <= f64::from(u32::MAX) {
        Some(rate as u32)
    } else {
        None
    }
}

/// Timing of the playback scheduler.
///
/// Use [`PlaybackTiming::default()`] for sensible defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaybackTiming {
    /// Delay before the first tick after start.
    ///
    /// Default: 0 (the loop starts immediately)
    pub start_delay: Duration,

    /// Delay used when a tick had nothing to render or the render failed.
    ///
    /// Short enough to pick up newly arrived chunks promptly, long enough to
    /// avoid spinning. Default: 100ms
    pub idle_delay: Duration,
}

impl Default for PlaybackTiming {
    fn default() -> Self {
        Self {
            start_delay: Duration::ZERO,
            idle_delay: Duration::from_millis(100),
        }
    }
}
