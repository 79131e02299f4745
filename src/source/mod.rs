//! Capture backends: where raw audio comes from.
//!
//! A [`CaptureBackend`] opens some input (a microphone, a file, a test
//! signal) when a session starts and delivers raw PCM through the
//! [`ChunkProducer`] it is handed. Deliveries can arrive at any cadence;
//! the session normalizes, queues and paces them.
//!
//! Provided backends:
//!
//! - [`MockBackend`]: plays synthetic audio from a [`MockSource`]
//! - `DeviceBackend`: a cpal input device (feature `device`)
//!
//! Backends fed by real-time callbacks can use [`spawn_ring_bridge`] to turn
//! a lock-free ring buffer into fixed-size chunks.

mod bridge;
#[cfg(feature = "device")]
mod device;
mod mock;
mod producer;

pub use bridge::{spawn_ring_bridge, RingBridge};
#[cfg(feature = "device")]
pub use device::{default_input_device_name, list_input_devices, DeviceBackend};
pub use mock::{MockBackend, MockSource};
pub use producer::{ChunkProducer, ProducerEvent};

use async_trait::async_trait;

use crate::config::AudioFormatConfig;
use crate::error::CaptureError;

/// A source of raw PCM audio.
///
/// # Implementation Notes
///
/// - `start` must return once capture is running; deliver audio from a
///   spawned task, thread or callback through the given producer
/// - `stop` must stop delivery and release the input; it may be called
///   when nothing is running
/// - Runtime failures go through [`ChunkProducer::send_error`]; only
///   failures that prevent capture from starting are returned
///
/// # Example
///
/// ```
/// use pcm_relay::{AudioFormatConfig, CaptureBackend, CaptureError};
/// use pcm_relay::source::ChunkProducer;
/// use async_trait::async_trait;
///
/// struct OneShot;
///
/// #[async_trait]
/// impl CaptureBackend for OneShot {
///     fn name(&self) -> &str {
///         "one-shot"
///     }
///
///     async fn start(
///         &self,
///         config: &AudioFormatConfig,
///         producer: ChunkProducer,
///     ) -> Result<(), CaptureError> {
///         producer.send_pcm16(&vec![0; config.buffer_size()]);
///         Ok(())
///     }
///
///     async fn stop(&self) -> Result<(), CaptureError> {
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Reports whether capture is currently permitted, without prompting.
    ///
    /// Default implementation reports granted.
    async fn check_permission(&self) -> Result<bool, CaptureError> {
        Ok(true)
    }

    /// Asks for permission to capture, prompting the user if the platform
    /// does that.
    ///
    /// Default implementation reports granted.
    async fn request_permission(&self) -> Result<bool, CaptureError> {
        Ok(true)
    }

    /// Prepares for capture with a validated configuration without starting.
    ///
    /// Default implementation does nothing.
    async fn initialize(&self, _config: &AudioFormatConfig) -> Result<(), CaptureError> {
        Ok(())
    }

    /// Starts delivering audio to `producer`.
    async fn start(
        &self,
        config: &AudioFormatConfig,
        producer: ChunkProducer,
    ) -> Result<(), CaptureError>;

    /// Stops delivering audio.
    async fn stop(&self) -> Result<(), CaptureError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct Silent;

    #[async_trait]
    impl CaptureBackend for Silent {
        fn name(&self) -> &str {
            "silent"
        }

        async fn start(
            &self,
            _config: &AudioFormatConfig,
            _producer: ChunkProducer,
        ) -> Result<(), CaptureError> {
            Ok(())
        }

        async fn stop(&self) -> Result<(), CaptureError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_default_permissions_granted() {
        let backend = Silent;
        assert!(backend.check_permission().await.unwrap());
        assert!(backend.request_permission().await.unwrap());
        assert!(backend.initialize(&AudioFormatConfig::default()).await.is_ok());
    }

    #[test]
    fn test_backend_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Arc<dyn CaptureBackend>>();
    }
}
