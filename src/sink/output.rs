//! The session output node.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::format::PlanarBuffer;
use crate::sink::PlaybackSink;
use crate::SinkError;

/// The output node every playback render goes through.
///
/// An `OutputBus` applies a gain and forwards the buffer to its downstream
/// sink, if one is connected. With nothing connected the buffer is
/// discarded, but the bus still reports the buffer's natural play duration
/// so the scheduler keeps real-time pacing.
///
/// The bus outlives capture sessions: a connection made before `start()`
/// stays in place across stop/start until [`disconnect`](Self::disconnect).
///
/// # Example
///
/// ```
/// use pcm_relay::{ChannelSink, OutputBus};
/// use std::sync::Arc;
/// use tokio::sync::mpsc;
///
/// let bus = OutputBus::new();
/// let (tx, _rx) = mpsc::channel(8);
/// bus.connect(Arc::new(ChannelSink::new(tx)));
/// bus.set_gain(0.5);
/// assert!(bus.is_connected());
/// ```
pub struct OutputBus {
    state: Mutex<BusState>,
}

struct BusState {
    downstream: Option<Arc<dyn PlaybackSink>>,
    gain: f32,
}

impl Default for OutputBus {
    fn default() -> Self {
        Self::new()
    }
}

impl OutputBus {
    /// Creates a bus with unity gain and nothing connected.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BusState {
                downstream: None,
                gain: 1.0,
            }),
        }
    }

    /// Routes rendered audio to `sink`, replacing any previous downstream.
    ///
    /// Returns the previously connected sink.
    pub fn connect(&self, sink: Arc<dyn PlaybackSink>) -> Option<Arc<dyn PlaybackSink>> {
        tracing::debug!(sink = sink.name(), "output connected");
        self.state.lock().downstream.replace(sink)
    }

    /// Removes the downstream sink and returns it.
    pub fn disconnect(&self) -> Option<Arc<dyn PlaybackSink>> {
        let previous = self.state.lock().downstream.take();
        if let Some(ref sink) = previous {
            tracing::debug!(sink = sink.name(), "output disconnected");
        }
        previous
    }

    /// Returns `true` if a downstream sink is connected.
    pub fn is_connected(&self) -> bool {
        self.state.lock().downstream.is_some()
    }

    /// Current gain.
    pub fn gain(&self) -> f32 {
        self.state.lock().gain
    }

    /// Sets the gain applied to every rendered sample.
    ///
    /// Negative values are clamped to 0.0; NaN and infinities are ignored.
    pub fn set_gain(&self, gain: f32) {
        if !gain.is_finite() {
            tracing::warn!(gain, "ignoring non-finite output gain");
            return;
        }
        self.state.lock().gain = gain.max(0.0);
    }

    fn snapshot(&self) -> (Option<Arc<dyn PlaybackSink>>, f32) {
        let state = self.state.lock();
        (state.downstream.clone(), state.gain)
    }
}

#[async_trait]
impl PlaybackSink for OutputBus {
    fn name(&self) -> &str {
        "output"
    }

    async fn on_start(&self) -> Result<(), SinkError> {
        let (downstream, _) = self.snapshot();
        match downstream {
            Some(sink) => sink.on_start().await,
            None => Ok(()),
        }
    }

    async fn render(&self, buffer: &PlanarBuffer) -> Result<Duration, SinkError> {
        let (downstream, gain) = self.snapshot();
        let Some(sink) = downstream else {
            return Ok(buffer.duration());
        };

        if (gain - 1.0).abs() < f32::EPSILON {
            sink.render(buffer).await
        } else {
            let mut scaled = buffer.clone();
            scaled.apply_gain(gain);
            sink.render(&scaled).await
        }
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        let (downstream, _) = self.snapshot();
        match downstream {
            Some(sink) => sink.on_stop().await,
            None => Ok(()),
        }
    }
}
