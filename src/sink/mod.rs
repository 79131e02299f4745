//! Playback sinks: where the scheduler renders audio.
//!
//! A [`PlaybackSink`] accepts one planar buffer per render and reports how
//! long that buffer will take to play. The scheduler times its next tick to
//! that duration, so the value must be exact for playback to be gapless.
//!
//! The crate provides:
//!
//! - [`OutputBus`]: the session's output node, with a replaceable downstream
//!   sink and a gain stage
//! - [`ChannelSink`]: sends rendered buffers to a tokio mpsc channel
//! - [`FileSink`]: writes rendered buffers to a WAV file
//!
//! Implement [`PlaybackSink`] for a real output device or any other
//! destination.

mod channel;
mod file;
mod output;

pub use channel::ChannelSink;
pub use file::FileSink;
pub use output::OutputBus;

use std::time::Duration;

use async_trait::async_trait;

use crate::format::PlanarBuffer;
use crate::SinkError;

/// A destination that plays (or otherwise consumes) rendered audio.
///
/// # Implementation Notes
///
/// - Methods take `&self`; use interior mutability if needed
/// - `on_start` is called when a playback session starts, before any render
/// - `render` is never called concurrently for the same session; calls
///   arrive in playback order
/// - `render` returns the play duration of the buffer; a sink that plays in
///   real time usually returns [`PlanarBuffer::duration`]
/// - Return a fatal error ([`SinkError::is_fatal`]) only when the sink can
///   never accept audio again; the session is then stopped
///
/// # Example
///
/// ```
/// use pcm_relay::{PlaybackSink, SinkError};
/// use pcm_relay::format::PlanarBuffer;
/// use async_trait::async_trait;
/// use std::time::Duration;
///
/// struct PrintSink;
///
/// #[async_trait]
/// impl PlaybackSink for PrintSink {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError> {
///         println!("{} frames", buffer.frames());
///         Ok(buffer.duration())
///     }
/// }
/// ```
#[async_trait]
pub trait PlaybackSink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once when a playback session starts.
    ///
    /// Errors here are fatal and prevent the session from starting.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self) -> Result<(), SinkError> {
        Ok(())
    }

    /// Renders one buffer and returns how long it takes to play.
    ///
    /// The next render is scheduled that long after this one started, so
    /// the duration should be the buffer's real play time. A zero duration
    /// is treated as [`PlanarBuffer::duration`].
    ///
    /// Errors for which [`SinkError::is_fatal`] is true end the session.
    async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError>;

    /// Called when a playback session ends.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        name: String,
        count: AtomicUsize,
    }

    impl CountingSink {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                count: AtomicUsize::new(0),
            }
        }

        fn count(&self) -> usize {
            self.count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl PlaybackSink for CountingSink {
        fn name(&self) -> &str {
            &self.name
        }

        async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError> {
            self.count.fetch_add(1, Ordering::SeqCst);
            Ok(buffer.duration())
        }
    }

    #[tokio::test]
    async fn test_sink_lifecycle() {
        let sink = CountingSink::new("test");

        sink.on_start().await.unwrap();

        let buffer = PlanarBuffer::deinterleave(&[0.0; 1600], 1, 16000);
        assert_eq!(sink.render(&buffer).await.unwrap(), Duration::from_millis(100));
        sink.render(&buffer).await.unwrap();

        assert_eq!(sink.count(), 2);

        sink.on_stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_sink_name() {
        let sink = CountingSink::new("my-sink");
        assert_eq!(sink.name(), "my-sink");
    }

    #[test]
    fn test_sink_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn PlaybackSink>>();
    }
}
