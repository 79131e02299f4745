//! Tokio mpsc channel sink implementation.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::format::PlanarBuffer;
use crate::sink::PlaybackSink;
use crate::SinkError;

/// A sink that forwards every rendered buffer to a tokio mpsc channel.
///
/// It reports the buffer's natural play duration, so the scheduler paces
/// the channel in real time. A dropped receiver is a fatal error.
///
/// # Example
///
/// ```
/// use pcm_relay::ChannelSink;
/// use pcm_relay::format::PlanarBuffer;
/// use tokio::sync::mpsc;
///
/// let (tx, mut rx) = mpsc::channel::<PlanarBuffer>(32);
/// let sink = ChannelSink::new(tx);
///
/// // Connect the sink to an AudioInput...
/// // Then receive buffers:
/// // while let Some(buffer) = rx.recv().await { ... }
/// ```
pub struct ChannelSink {
    name: String,
    sender: mpsc::Sender<PlanarBuffer>,
}

impl ChannelSink {
    /// Creates a new channel sink with the given sender.
    pub fn new(sender: mpsc::Sender<PlanarBuffer>) -> Self {
        Self {
            name: "channel".to_string(),
            sender,
        }
    }

    /// Creates a new channel sink with a custom name.
    pub fn with_name(name: impl Into<String>, sender: mpsc::Sender<PlanarBuffer>) -> Self {
        Self {
            name: name.into(),
            sender,
        }
    }
}

#[async_trait]
impl PlaybackSink for ChannelSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError> {
        let duration = buffer.duration();
        self.sender
            .send(buffer.clone())
            .await
            .map_err(|_| SinkError::ChannelClosed)?;
        Ok(duration)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_sink_sends_buffers() {
        let (tx, mut rx) = mpsc::channel::<PlanarBuffer>(10);
        let sink = ChannelSink::new(tx);

        let buffer = PlanarBuffer::deinterleave(&[0.1, 0.2, 0.3, 0.4], 2, 16000);
        let duration = sink.render(&buffer).await.unwrap();
        assert_eq!(duration, buffer.duration());

        let received = rx.recv().await.unwrap();
        assert_eq!(received, buffer);
    }

    #[tokio::test]
    async fn test_channel_sink_closed_is_fatal() {
        let (tx, rx) = mpsc::channel::<PlanarBuffer>(10);
        let sink = ChannelSink::new(tx);

        drop(rx);

        let buffer = PlanarBuffer::deinterleave(&[0.1], 1, 16000);
        let result = sink.render(&buffer).await;

        assert!(matches!(result, Err(SinkError::ChannelClosed)));
        assert!(result.unwrap_err().is_fatal());
    }

    #[tokio::test]
    async fn test_channel_sink_custom_name() {
        let (tx, _rx) = mpsc::channel::<PlanarBuffer>(10);
        let sink = ChannelSink::with_name("monitor", tx);
        assert_eq!(sink.name(), "monitor");
    }
}
