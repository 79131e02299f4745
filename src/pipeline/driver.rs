//! Session driver task.
//!
//! One driver runs per capture session. It owns the chunk queue and the
//! playback scheduler and multiplexes three inputs on a single task:
//! control commands, scheduler ticks and producer deliveries. Because
//! everything that touches the queue runs here, the queue needs no locking.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{AudioFormatConfig, DeliveryMode, PlaybackTiming};
use crate::format::{normalize, parse_sample_list};
use crate::pipeline::{ChunkQueue, PlaybackScheduler, TickOutcome};
use crate::session::SessionState;
use crate::sink::{FileSink, PlaybackSink};
use crate::source::{CaptureBackend, ProducerEvent};
use crate::{CaptureEvent, EventCallback, SampleChunk};

/// Command sent to the driver task.
#[derive(Debug)]
pub(crate) enum DriverCommand {
    /// Exit after flushing. With `stop_backend`, the driver also stops the
    /// backend because nobody else will.
    Stop {
        /// Whether the driver must stop the backend.
        stop_backend: bool,
    },
}

/// Processes one session's deliveries and playback.
pub(crate) struct SessionDriver {
    config: AudioFormatConfig,
    queue: ChunkQueue,
    scheduler: PlaybackScheduler,
    output: Arc<dyn PlaybackSink>,
    recorder: Option<FileSink>,
    backend: Arc<dyn CaptureBackend>,
    state: Arc<SessionState>,
    event_callback: Option<EventCallback>,
}

impl SessionDriver {
    pub fn new(
        config: AudioFormatConfig,
        timing: PlaybackTiming,
        output: Arc<dyn PlaybackSink>,
        backend: Arc<dyn CaptureBackend>,
        state: Arc<SessionState>,
    ) -> Self {
        let recorder = match (config.delivery(), config.file()) {
            (DeliveryMode::Record, Some(path)) => Some(FileSink::pcm(path, config.format())),
            _ => None,
        };

        Self {
            scheduler: PlaybackScheduler::new(&config, timing),
            config,
            queue: ChunkQueue::new(),
            output,
            recorder,
            backend,
            state,
            event_callback: None,
        }
    }

    pub fn with_event_callback(mut self, callback: Option<EventCallback>) -> Self {
        self.event_callback = callback;
        self
    }

    fn emit_event(&self, event: CaptureEvent) {
        if let Some(ref callback) = self.event_callback {
            callback(event);
        }
    }

    /// Runs until a stop command arrives, the command channel closes, or the
    /// output is lost.
    pub async fn run(
        mut self,
        mut producer_rx: mpsc::UnboundedReceiver<ProducerEvent>,
        mut cmd_rx: mpsc::Receiver<DriverCommand>,
    ) {
        tracing::debug!(
            delivery = ?self.config.delivery(),
            sample_rate = self.config.sample_rate(),
            channels = self.config.channels(),
            batch_size_limit = self.config.batch_size_limit(),
            "session driver started"
        );

        if self.config.delivery() == DeliveryMode::Playback {
            self.scheduler.start();
        }

        let mut producer_open = true;
        let mut stop_backend = false;

        loop {
            tokio::select! {
                biased;

                cmd = cmd_rx.recv() => {
                    if let Some(DriverCommand::Stop { stop_backend: requested }) = cmd {
                        stop_backend = requested;
                    }
                    break;
                }
                () = self.scheduler.fired() => {
                    if !self.on_tick().await {
                        break;
                    }
                }
                event = producer_rx.recv(), if producer_open => {
                    match event {
                        Some(event) => self.on_producer_event(event).await,
                        None => {
                            tracing::debug!("producer closed");
                            producer_open = false;
                        }
                    }
                }
            }
        }

        if stop_backend {
            if let Err(e) = self.backend.stop().await {
                tracing::warn!(backend = self.backend.name(), "failed to stop backend: {}", e);
            }
        }

        self.shutdown(&mut producer_rx).await;
    }

    /// Runs one scheduler tick. Returns `false` once the session must end.
    async fn on_tick(&mut self) -> bool {
        let capturing = self.state.is_capturing();
        let outcome = self
            .scheduler
            .tick(capturing, &mut self.queue, self.output.as_ref())
            .await;
        self.update_queued();

        match outcome {
            TickOutcome::Stopped => {
                tracing::debug!("playback loop observed stop");
                true
            }
            TickOutcome::Idle => true,
            TickOutcome::Rendered { chunks, frames, .. } => {
                self.state
                    .chunks_played
                    .fetch_add(chunks as u64, Ordering::SeqCst);
                self.state.buffers_rendered.fetch_add(1, Ordering::SeqCst);
                self.state.samples_rendered.fetch_add(
                    (frames * usize::from(self.config.channels())) as u64,
                    Ordering::SeqCst,
                );
                true
            }
            TickOutcome::RenderFailed { chunks, error } => {
                tracing::warn!(sink = self.output.name(), "render failed: {}", error);
                self.state
                    .chunks_played
                    .fetch_add(chunks as u64, Ordering::SeqCst);
                self.state.render_errors.fetch_add(1, Ordering::SeqCst);
                self.emit_event(CaptureEvent::RenderFailed {
                    sink_name: self.output.name().to_string(),
                    error: error.to_string(),
                });
                true
            }
            TickOutcome::OutputLost { error } => {
                tracing::error!(sink = self.output.name(), "output lost, stopping capture: {}", error);
                self.state.render_errors.fetch_add(1, Ordering::SeqCst);
                if self.state.stop_capturing() {
                    if let Err(e) = self.backend.stop().await {
                        tracing::warn!(backend = self.backend.name(), "failed to stop backend: {}", e);
                    }
                }
                self.emit_event(CaptureEvent::OutputLost {
                    sink_name: self.output.name().to_string(),
                    error: error.to_string(),
                });
                false
            }
        }
    }

    async fn on_producer_event(&mut self, event: ProducerEvent) {
        match event {
            ProducerEvent::Samples(raw) => self.on_samples(raw).await,
            ProducerEvent::Serialized(payload) => match parse_sample_list(&payload) {
                Ok(raw) => self.on_samples(raw).await,
                Err(e) => self.on_capture_error(format!("malformed sample payload: {e}")),
            },
            ProducerEvent::Error(reason) => self.on_capture_error(reason),
            ProducerEvent::Finished(file) => {
                tracing::debug!(?file, "backend finished");
                self.emit_event(CaptureEvent::Finished { file });
            }
        }
    }

    async fn on_samples(&mut self, raw: Vec<f32>) {
        let received = self.state.chunks_received.fetch_add(1, Ordering::SeqCst) + 1;
        if received % 50 == 0 {
            tracing::debug!(chunk = received, samples = raw.len(), "received chunk");
        }

        match self.config.delivery() {
            DeliveryMode::Events => {
                let samples = normalize(raw, self.config.normalization());
                self.emit_event(CaptureEvent::Audio(self.chunk(samples)));
            }
            DeliveryMode::Playback => {
                // A delivery racing stop() must not repopulate the queue.
                if self.state.is_capturing() {
                    let chunk = self.chunk(normalize(raw, self.config.normalization()));
                    self.queue.enqueue(chunk);
                    self.update_queued();
                }
            }
            DeliveryMode::Record => {
                let Some(ref recorder) = self.recorder else {
                    return;
                };
                let result = recorder
                    .append_interleaved(
                        Arc::new(raw),
                        self.config.channels(),
                        self.config.sample_rate(),
                    )
                    .await;
                if let Err(e) = result {
                    tracing::warn!(sink = recorder.name(), "recording write failed: {}", e);
                    self.state.render_errors.fetch_add(1, Ordering::SeqCst);
                    self.emit_event(CaptureEvent::RenderFailed {
                        sink_name: recorder.name().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
    }

    fn on_capture_error(&self, reason: String) {
        tracing::warn!(backend = self.backend.name(), "capture error: {}", reason);
        self.state.capture_errors.fetch_add(1, Ordering::SeqCst);
        self.emit_event(CaptureEvent::CaptureFailed { reason });
    }

    fn chunk(&self, samples: Vec<f32>) -> SampleChunk {
        SampleChunk::new(samples, self.config.sample_rate(), self.config.channels())
    }

    fn update_queued(&self) {
        self.state
            .chunks_queued
            .store(self.queue.len() as u64, Ordering::SeqCst);
    }

    async fn shutdown(&mut self, producer_rx: &mut mpsc::UnboundedReceiver<ProducerEvent>) {
        self.scheduler.cancel();
        let dropped = self.queue.clear();
        self.update_queued();
        if dropped > 0 {
            tracing::debug!(dropped, "discarded queued chunks");
        }

        match self.config.delivery() {
            DeliveryMode::Playback => {
                if let Err(e) = self.output.on_stop().await {
                    tracing::warn!(sink = self.output.name(), "error during shutdown: {}", e);
                    self.emit_event(CaptureEvent::RenderFailed {
                        sink_name: self.output.name().to_string(),
                        error: format!("error during shutdown: {e}"),
                    });
                }
            }
            DeliveryMode::Events | DeliveryMode::Record => {
                // Deliver whatever the backend sent before it stopped
                while let Ok(event) = producer_rx.try_recv() {
                    self.on_producer_event(event).await;
                }
            }
        }

        if let Some(recorder) = self.recorder.take() {
            match recorder.finalize().await {
                Ok(file) => self.emit_event(CaptureEvent::Finished { file }),
                Err(e) => {
                    tracing::warn!(sink = recorder.name(), "failed to finalize recording: {}", e);
                    self.emit_event(CaptureEvent::RenderFailed {
                        sink_name: recorder.name().to_string(),
                        error: e.to_string(),
                    });
                    self.emit_event(CaptureEvent::Finished { file: None });
                }
            }
        }

        tracing::debug!(stats = ?self.state.stats(), "session driver stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CaptureOptions;
    use crate::source::{ChunkProducer, MockBackend, MockSource};
    use crate::OutputBus;
    use parking_lot::Mutex;

    fn backend() -> Arc<MockBackend> {
        Arc::new(MockBackend::new(MockSource::new(44100, 1)))
    }

    fn recorder() -> (EventCallback, Arc<Mutex<Vec<CaptureEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        let callback: EventCallback = Arc::new(move |event| sink.lock().push(event));
        (callback, events)
    }

    fn driver(options: CaptureOptions, backend: Arc<MockBackend>) -> (SessionDriver, Arc<SessionState>) {
        let config = AudioFormatConfig::from_options(&options).unwrap();
        let state = Arc::new(SessionState::new());
        let driver = SessionDriver::new(
            config,
            PlaybackTiming::default(),
            Arc::new(OutputBus::new()),
            backend,
            Arc::clone(&state),
        );
        (driver, state)
    }

    #[tokio::test]
    async fn test_events_mode_emits_normalized_chunks_and_drains_on_stop() {
        let (callback, events) = recorder();
        let (driver, state) = driver(CaptureOptions::default(), backend());
        let driver = driver.with_event_callback(Some(callback));

        let (producer, producer_rx) = ChunkProducer::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(1);

        producer.send_pcm16(&[32767, -32767]);
        producer.send_serialized("[100, \"x\"]");
        producer.send_error("glitch");
        cmd_tx
            .send(DriverCommand::Stop {
                stop_backend: false,
            })
            .await
            .unwrap();

        // The stop command wins the biased select; deliveries are flushed afterwards.
        driver.run(producer_rx, cmd_rx).await;

        let events = events.lock();
        assert_eq!(events.len(), 3);
        match &events[0] {
            CaptureEvent::Audio(chunk) => assert_eq!(chunk.as_slice(), &[1.0, -1.0]),
            other => panic!("unexpected event {other:?}"),
        }
        match &events[1] {
            // The trailing non-numeric element is trimmed after normalization.
            CaptureEvent::Audio(chunk) => assert_eq!(chunk.len(), 1),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(events[2], CaptureEvent::CaptureFailed { .. }));
        assert_eq!(state.stats().chunks_received, 2);
        assert_eq!(state.stats().capture_errors, 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_capture_error() {
        let (callback, events) = recorder();
        let (driver, state) = driver(CaptureOptions::default(), backend());
        let driver = driver.with_event_callback(Some(callback));

        let (producer, producer_rx) = ChunkProducer::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        producer.send_serialized("{\"not\": \"a list\"}");
        drop(cmd_tx);

        driver.run(producer_rx, cmd_rx).await;

        assert!(matches!(
            events.lock().as_slice(),
            [CaptureEvent::CaptureFailed { reason }] if reason.contains("malformed")
        ));
        assert_eq!(state.stats().chunks_received, 0);
    }

    #[tokio::test]
    async fn test_stop_with_backend_flag_stops_backend() {
        let backend = backend();
        let (driver, _state) = driver(CaptureOptions::default(), Arc::clone(&backend));
        let (_producer, producer_rx) = ChunkProducer::channel();
        let (cmd_tx, cmd_rx) = mpsc::channel(1);
        cmd_tx
            .send(DriverCommand::Stop { stop_backend: true })
            .await
            .unwrap();

        driver.run(producer_rx, cmd_rx).await;
        assert_eq!(backend.stop_count(), 1);
    }

    #[tokio::test]
    async fn test_playback_mode_ignores_deliveries_after_flag_cleared() {
        let options = CaptureOptions {
            stream_to_output: Some(true),
            ..Default::default()
        };
        let (mut driver, state) = driver(options, backend());

        driver.on_producer_event(ProducerEvent::Samples(vec![1.0; 4])).await;
        assert_eq!(driver.queue.len(), 1);
        assert_eq!(state.stats().chunks_queued, 1);

        state.stop_capturing();
        driver.on_producer_event(ProducerEvent::Samples(vec![1.0; 4])).await;
        assert_eq!(driver.queue.len(), 1);
    }
}
