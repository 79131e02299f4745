//! Error types for pcm-relay.
//!
//! Errors are split into two categories:
//! - **Fatal errors** ([`CaptureError`], [`ConfigError`]): returned synchronously from
//!   `initialize()`/`start()` before any capture or output resource changes state
//! - **Recoverable events**: runtime issues surfaced via [`EventCallback`](crate::EventCallback)

use std::path::PathBuf;

/// A capture configuration was rejected.
///
/// Validation is atomic: when any field is invalid, none of the supplied
/// options are applied.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// Only mono (1) and stereo (2) are supported.
    #[error("invalid number of channels ({0}); only mono (1) and stereo (2) are supported")]
    InvalidChannels(i64),

    /// The format tag is not one of `PCM_16BIT` or `PCM_8BIT`.
    #[error("invalid format ({0}); only 'PCM_8BIT' and 'PCM_16BIT' are supported")]
    InvalidFormat(String),

    /// The capture buffer size must be greater than zero.
    #[error("invalid buffer size ({0}); must be greater than zero")]
    InvalidBufferSize(i64),

    /// The batch size limit must be greater than zero.
    #[error("invalid batch size limit ({0}); must be greater than zero")]
    InvalidBatchSizeLimit(i64),

    /// The sample rate must be a positive whole number of Hz.
    #[error("invalid sample rate ({0}); must be a positive whole number of Hz")]
    InvalidSampleRate(f64),

    /// The normalization factor must be a positive, finite divisor.
    #[error("invalid normalization factor ({0}); must be a positive finite number")]
    InvalidNormalizationFactor(f64),

    /// The audio source type is not a known source type.
    #[error("invalid audio source type ({0})")]
    InvalidSourceType(i64),

    /// A file destination and output streaming were both requested.
    #[error("file capture and output streaming cannot be enabled together")]
    ConflictingDelivery,

    /// The options could not be decoded at all (e.g. a non-numeric sample rate).
    #[error("malformed capture options: {0}")]
    Malformed(String),
}

/// Fatal errors returned by [`AudioInput`](crate::AudioInput) operations.
///
/// Runtime issues (render failures, producer errors) are handled via the
/// event callback instead.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The supplied options failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// `start()` was called while a session is already capturing.
    #[error("already capturing")]
    AlreadyCapturing,

    /// No capture backend was configured on the builder.
    #[error("no capture backend configured - call backend() before build()")]
    NoBackendConfigured,

    /// Permission to capture audio was denied.
    #[error("permission denied for audio capture (check OS settings)")]
    PermissionDenied,

    /// No default input device is configured on this system.
    #[error("no default input device configured")]
    NoDefaultDevice,

    /// The requested audio device was not found.
    #[error("device not found: {name}")]
    DeviceNotFound {
        /// Name of the device that wasn't found.
        name: String,
    },

    /// The output sink failed to start.
    #[error("output '{sink_name}' failed to start: {reason}")]
    OutputStartFailed {
        /// Name of the sink that failed.
        sink_name: String,
        /// Why the sink failed to start.
        reason: String,
    },

    /// An error from the capture backend.
    #[error("capture backend error: {0}")]
    BackendError(String),
}

impl CaptureError {
    /// Creates a backend error with the given message.
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::BackendError(msg.into())
    }
}

/// Errors that can occur within a [`PlaybackSink`](crate::PlaybackSink) implementation.
///
/// Most sink errors are recoverable: the scheduler emits a
/// [`CaptureEvent::RenderFailed`] and retries with the next batch. Errors for which
/// [`is_fatal`](SinkError::is_fatal) returns `true` stop the capture session.
///
/// [`CaptureEvent::RenderFailed`]: crate::CaptureEvent::RenderFailed
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A render or write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The WAV encoder rejected the data or the file.
    #[error("wav encoding failed: {path}: {source}")]
    Encoding {
        /// Path to the file.
        path: PathBuf,
        /// The underlying encoder error.
        #[source]
        source: hound::Error,
    },

    /// The receiving channel was closed.
    #[error("channel closed")]
    ChannelClosed,

    /// The output is permanently gone (device removed, context closed).
    #[error("output unavailable: {reason}")]
    Unavailable {
        /// Why the output is gone.
        reason: String,
    },

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates an unavailable error with the given reason.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }

    /// Creates an encoding error for the given path.
    pub fn encoding(path: impl Into<PathBuf>, source: hound::Error) -> Self {
        Self::Encoding {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if the sink can never accept audio again.
    ///
    /// A fatal render error stops the capture session instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ChannelClosed | Self::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidChannels(3);
        assert_eq!(
            err.to_string(),
            "invalid number of channels (3); only mono (1) and stereo (2) are supported"
        );
    }

    #[test]
    fn test_capture_error_from_config_error() {
        let err: CaptureError = ConfigError::InvalidFormat("FLOAT".to_string()).into();
        assert!(matches!(
            err,
            CaptureError::InvalidConfig(ConfigError::InvalidFormat(ref tag)) if tag == "FLOAT"
        ));
        assert!(err.to_string().contains("FLOAT"));
    }

    #[test]
    fn test_sink_error_custom() {
        let err = SinkError::custom("something went wrong");
        assert_eq!(err.to_string(), "something went wrong");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_sink_error_write_failed() {
        let err = SinkError::write_failed("buffer full");
        assert_eq!(err.to_string(), "write failed: buffer full");
    }

    #[test]
    fn test_sink_error_fatality() {
        assert!(SinkError::ChannelClosed.is_fatal());
        assert!(SinkError::unavailable("device removed").is_fatal());
        assert!(!SinkError::write_failed("glitch").is_fatal());
    }

    #[test]
    fn test_sink_error_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SinkError::file_error("/tmp/test.wav", io_err);
        assert!(err.to_string().contains("/tmp/test.wav"));
    }
}
