//! Builder and service handle for audio input.

use std::sync::Arc;

use tokio::sync::{mpsc, MutexGuard};

use crate::config::{AudioFormatConfig, CaptureOptions, DeliveryMode, PlaybackTiming};
use crate::pipeline::SessionDriver;
use crate::session::{ActiveSession, SessionState, SessionStats};
use crate::sink::{OutputBus, PlaybackSink};
use crate::source::{CaptureBackend, ChunkProducer};
use crate::{event_callback, CaptureError, CaptureEvent, EventCallback};

/// Channel capacity for driver commands.
/// Only need 1 since commands are rare (just Stop).
const COMMAND_CHANNEL_CAPACITY: usize = 1;

/// Builder for an [`AudioInput`] service.
///
/// Use [`AudioInput::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use pcm_relay::AudioInput;
/// use pcm_relay::source::{MockBackend, MockSource};
///
/// let mut source = MockSource::new(44100, 1);
/// source.generate_sine(440.0, 1000);
///
/// let input = AudioInput::builder()
///     .backend(MockBackend::new(source))
///     .on_event(|e| tracing::debug!(?e, "capture event"))
///     .build()
///     .unwrap();
/// assert!(!input.is_capturing());
/// ```
#[must_use]
pub struct AudioInputBuilder {
    backend: Option<Arc<dyn CaptureBackend>>,
    output: Option<Arc<OutputBus>>,
    event_callback: Option<EventCallback>,
    timing: PlaybackTiming,
    gain: Option<f32>,
}

impl Default for AudioInputBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioInputBuilder {
    /// Creates a new builder with default settings.
    pub fn new() -> Self {
        Self {
            backend: None,
            output: None,
            event_callback: None,
            timing: PlaybackTiming::default(),
            gain: None,
        }
    }

    /// Sets the capture backend.
    pub fn backend<B: CaptureBackend + 'static>(mut self, backend: B) -> Self {
        self.backend = Some(Arc::new(backend));
        self
    }

    /// Sets a shared capture backend.
    ///
    /// Useful when the caller keeps a handle to inspect the backend.
    pub fn shared_backend(mut self, backend: Arc<dyn CaptureBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Uses an existing output bus instead of creating one.
    pub fn output(mut self, output: Arc<OutputBus>) -> Self {
        self.output = Some(output);
        self
    }

    /// Set a callback to receive audio and runtime events.
    ///
    /// The callback runs on the session's driver task and should return
    /// quickly.
    pub fn on_event<F>(mut self, callback: F) -> Self
    where
        F: Fn(CaptureEvent) + Send + Sync + 'static,
    {
        self.event_callback = Some(event_callback(callback));
        self
    }

    /// Sets the playback scheduler's delays.
    ///
    /// Default: start immediately, 100 ms between idle ticks.
    pub fn timing(mut self, timing: PlaybackTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Sets the initial output gain.
    pub fn gain(mut self, gain: f32) -> Self {
        self.gain = Some(gain);
        self
    }

    /// Builds the service.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::NoBackendConfigured`] if no backend was set.
    /// With the `device` feature the default input device is used instead.
    pub fn build(self) -> Result<AudioInput, CaptureError> {
        let backend = match self.backend {
            Some(backend) => backend,
            #[cfg(feature = "device")]
            None => Arc::new(crate::source::DeviceBackend::default_device()),
            #[cfg(not(feature = "device"))]
            None => return Err(CaptureError::NoBackendConfigured),
        };

        let output = self.output.unwrap_or_default();
        if let Some(gain) = self.gain {
            output.set_gain(gain);
        }

        tracing::debug!(backend = backend.name(), "audio input created");

        Ok(AudioInput {
            backend,
            output,
            event_callback: self.event_callback,
            timing: self.timing,
            config: parking_lot::Mutex::new(None),
            current: parking_lot::Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
        })
    }
}

/// Audio input service.
///
/// Owns a capture backend and a long-lived output bus. At most one capture
/// session runs at a time; each [`start`](AudioInput::start) validates a
/// fresh configuration and spawns a driver task that delivers, plays or
/// records the backend's audio according to the configuration's
/// [`DeliveryMode`].
pub struct AudioInput {
    backend: Arc<dyn CaptureBackend>,
    output: Arc<OutputBus>,
    event_callback: Option<EventCallback>,
    timing: PlaybackTiming,
    config: parking_lot::Mutex<Option<AudioFormatConfig>>,
    current: parking_lot::Mutex<Option<Arc<SessionState>>>,
    session: tokio::sync::Mutex<Option<ActiveSession>>,
}

impl AudioInput {
    /// Creates a new builder for configuring audio input.
    pub fn builder() -> AudioInputBuilder {
        AudioInputBuilder::new()
    }

    /// Validates `options` and lets the backend prepare, without capturing.
    ///
    /// The accepted configuration is returned and retained; see
    /// [`config`](Self::config) and [`start_initialized`](Self::start_initialized).
    pub async fn initialize(
        &self,
        options: &CaptureOptions,
    ) -> Result<AudioFormatConfig, CaptureError> {
        if self.is_capturing() {
            return Err(CaptureError::AlreadyCapturing);
        }

        let config = AudioFormatConfig::from_options(options)?;
        self.backend.initialize(&config).await?;

        tracing::debug!(
            backend = self.backend.name(),
            sample_rate = config.sample_rate(),
            channels = config.channels(),
            "audio input initialized"
        );
        *self.config.lock() = Some(config.clone());
        Ok(config)
    }

    /// Reports whether capture is permitted, without prompting.
    pub async fn check_permission(&self) -> Result<bool, CaptureError> {
        self.backend.check_permission().await
    }

    /// Asks the backend for permission to capture.
    pub async fn request_permission(&self) -> Result<bool, CaptureError> {
        self.backend.request_permission().await
    }

    /// Starts a capture session with a configuration built from `options`.
    ///
    /// The configuration is validated before the backend or output is
    /// touched; an invalid one leaves everything as it was.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::AlreadyCapturing`] if a session is running
    /// - [`CaptureError::InvalidConfig`] if `options` are invalid
    /// - [`CaptureError::OutputStartFailed`] if the output cannot start
    /// - any error returned by the backend's `start()`
    pub async fn start(&self, options: &CaptureOptions) -> Result<(), CaptureError> {
        let mut slot = self.claim_session_slot().await?;
        let config = AudioFormatConfig::from_options(options)?;
        self.start_session(&mut slot, config).await
    }

    /// Starts capture with the configuration accepted by the last
    /// [`initialize`](Self::initialize), or the defaults if there was none.
    pub async fn start_initialized(&self) -> Result<(), CaptureError> {
        let mut slot = self.claim_session_slot().await?;
        let config = self.config.lock().clone().unwrap_or_default();
        self.start_session(&mut slot, config).await
    }

    /// Locks the session slot for a new session.
    async fn claim_session_slot(
        &self,
    ) -> Result<MutexGuard<'_, Option<ActiveSession>>, CaptureError> {
        let mut slot = self.session.lock().await;
        if slot
            .as_ref()
            .is_some_and(|session| session.state().is_capturing())
        {
            return Err(CaptureError::AlreadyCapturing);
        }

        // A session that ended on its own (output lost) is reaped here
        if let Some(stale) = slot.take() {
            stale.shutdown().await;
        }
        Ok(slot)
    }

    async fn start_session(
        &self,
        slot: &mut Option<ActiveSession>,
        config: AudioFormatConfig,
    ) -> Result<(), CaptureError> {
        if config.delivery() == DeliveryMode::Playback {
            self.output
                .on_start()
                .await
                .map_err(|e| CaptureError::OutputStartFailed {
                    sink_name: self.output.name().to_string(),
                    reason: e.to_string(),
                })?;
        }

        let (producer, producer_rx) = ChunkProducer::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let state = Arc::new(SessionState::new());

        let output: Arc<dyn PlaybackSink> = Arc::clone(&self.output) as Arc<dyn PlaybackSink>;
        let driver = SessionDriver::new(
            config.clone(),
            self.timing,
            output,
            Arc::clone(&self.backend),
            Arc::clone(&state),
        )
        .with_event_callback(self.event_callback.clone());

        let handle = tokio::spawn(async move {
            driver.run(producer_rx, cmd_rx).await;
        });
        let session = ActiveSession::new(Arc::clone(&state), cmd_tx, handle);

        if let Err(e) = self.backend.start(&config, producer).await {
            tracing::warn!(backend = self.backend.name(), "failed to start capture: {}", e);
            state.stop_capturing();
            session.shutdown().await;
            return Err(e);
        }

        tracing::debug!(
            backend = self.backend.name(),
            delivery = ?config.delivery(),
            sample_rate = config.sample_rate(),
            channels = config.channels(),
            buffer_size = config.buffer_size(),
            "capture started"
        );

        *slot = Some(session);
        *self.current.lock() = Some(state);
        *self.config.lock() = Some(config);
        Ok(())
    }

    /// Stops the current capture session.
    ///
    /// The backend is stopped, the playback queue is cleared and the driver
    /// task exits. In [`DeliveryMode::Events`] and [`DeliveryMode::Record`]
    /// deliveries already sent by the backend are still processed. Calling
    /// `stop` with no running session does nothing.
    ///
    /// # Errors
    ///
    /// Returns the backend's error if it failed to stop. The session is shut
    /// down regardless.
    pub async fn stop(&self) -> Result<(), CaptureError> {
        let Some(session) = self.session.lock().await.take() else {
            return Ok(());
        };

        let mut result = Ok(());
        if session.state().stop_capturing() {
            result = self.backend.stop().await;
            if let Err(ref e) = result {
                tracing::warn!(backend = self.backend.name(), "failed to stop backend: {}", e);
            }
        }

        session.shutdown().await;
        tracing::debug!(backend = self.backend.name(), "capture stopped");
        result
    }

    /// Returns `true` while a session is capturing.
    pub fn is_capturing(&self) -> bool {
        self.current
            .lock()
            .as_ref()
            .is_some_and(|state| state.is_capturing())
    }

    /// The configuration accepted by the last `initialize` or `start`.
    pub fn config(&self) -> Option<AudioFormatConfig> {
        self.config.lock().clone()
    }

    /// Connects `sink` downstream of the output bus, replacing any previous one.
    pub fn connect(&self, sink: Arc<dyn PlaybackSink>) -> Option<Arc<dyn PlaybackSink>> {
        self.output.connect(sink)
    }

    /// Disconnects the output bus's downstream sink.
    pub fn disconnect(&self) -> Option<Arc<dyn PlaybackSink>> {
        self.output.disconnect()
    }

    /// Sets the output gain.
    pub fn set_gain(&self, gain: f32) {
        self.output.set_gain(gain);
    }

    /// The output bus played sessions render into.
    pub fn output(&self) -> &Arc<OutputBus> {
        &self.output
    }

    /// Statistics of the current or most recent session.
    pub fn stats(&self) -> SessionStats {
        self.current
            .lock()
            .as_ref()
            .map(|state| state.stats())
            .unwrap_or_default()
    }

    /// Stops any session, disconnects the output and consumes the service.
    pub async fn destroy(self) -> Result<(), CaptureError> {
        let result = self.stop().await;
        self.output.disconnect();
        tracing::debug!(backend = self.backend.name(), "audio input destroyed");
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureOptions;
    use crate::source::{MockBackend, MockSource};
    use crate::ConfigError;

    fn mock() -> Arc<MockBackend> {
        let mut source = MockSource::new(44100, 1);
        source.generate_sine(440.0, 500);
        Arc::new(MockBackend::new(source).looping(true))
    }

    fn input(backend: &Arc<MockBackend>) -> AudioInput {
        AudioInput::builder()
            .shared_backend(Arc::clone(backend) as Arc<dyn CaptureBackend>)
            .build()
            .unwrap()
    }

    #[cfg(not(feature = "device"))]
    #[test]
    fn test_builder_requires_backend() {
        let result = AudioInput::builder().build();
        assert!(matches!(result, Err(CaptureError::NoBackendConfigured)));
    }

    #[test]
    fn test_builder_sets_gain() {
        let input = AudioInput::builder()
            .backend(MockBackend::new(MockSource::new(8000, 1)))
            .gain(0.5)
            .build()
            .unwrap();
        assert!((input.output().gain() - 0.5).abs() < f32::EPSILON);
    }

    #[tokio::test]
    async fn test_initialize_retains_config() {
        let backend = mock();
        let input = input(&backend);
        let options = CaptureOptions {
            sample_rate: Some(16000.0),
            channels: Some(2),
            ..Default::default()
        };

        let config = input.initialize(&options).await.unwrap();
        assert_eq!(config.sample_rate(), 16000);
        assert_eq!(input.config(), Some(config));
        assert_eq!(backend.start_count(), 0);
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid() {
        let backend = mock();
        let input = input(&backend);
        let options = CaptureOptions {
            batch_size_limit: Some(0),
            ..Default::default()
        };

        let result = input.initialize(&options).await;
        assert!(matches!(
            result,
            Err(CaptureError::InvalidConfig(ConfigError::InvalidBatchSizeLimit(0)))
        ));
        assert!(input.config().is_none());
    }

    #[tokio::test]
    async fn test_start_stop_lifecycle() {
        let backend = mock();
        let input = input(&backend);

        input.start(&CaptureOptions::default()).await.unwrap();
        assert!(input.is_capturing());
        assert!(backend.is_running());

        input.stop().await.unwrap();
        assert!(!input.is_capturing());
        assert_eq!(backend.stop_count(), 1);
        assert_eq!(input.stats().chunks_queued, 0);

        // Stopping again is a no-op
        input.stop().await.unwrap();
        assert_eq!(backend.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_initialize_rejected_while_capturing() {
        let backend = mock();
        let input = input(&backend);
        input.start(&CaptureOptions::default()).await.unwrap();

        let result = input.initialize(&CaptureOptions::default()).await;
        assert!(matches!(result, Err(CaptureError::AlreadyCapturing)));

        input.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_initialized_uses_retained_config() {
        let backend = mock();
        let input = input(&backend);
        let options = CaptureOptions {
            sample_rate: Some(8000.0),
            ..Default::default()
        };
        input.initialize(&options).await.unwrap();

        input.start_initialized().await.unwrap();
        assert_eq!(input.config().map(|c| c.sample_rate()), Some(8000));
        input.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_start_failure_leaves_idle() {
        let backend = Arc::new(MockBackend::new(MockSource::new(8000, 1)).fail_start("no mic"));
        let input = input(&backend);

        let result = input.start(&CaptureOptions::default()).await;
        assert!(matches!(result, Err(CaptureError::BackendError(_))));
        assert!(!input.is_capturing());

        // A failed start does not block the next attempt
        let result = input.start(&CaptureOptions::default()).await;
        assert!(matches!(result, Err(CaptureError::BackendError(_))));
        assert_eq!(backend.start_count(), 2);
    }

    #[tokio::test]
    async fn test_destroy_stops_session() {
        let backend = mock();
        let input = input(&backend);
        input.start(&CaptureOptions::default()).await.unwrap();

        input.destroy().await.unwrap();
        assert_eq!(backend.stop_count(), 1);
        assert!(!backend.is_running());
    }
}
