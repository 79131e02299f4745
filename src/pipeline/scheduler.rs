//! Self-rescheduling playback loop.
//!
//! The scheduler owns a single cancellable timer. Each tick drains a batch
//! from the [`ChunkQueue`], renders it, and re-arms the timer for exactly
//! the rendered duration measured from the start of the tick, so the next
//! render begins when the previous buffer finishes playing.
//!
//! Only whole frames are rendered. Samples left over after the last whole
//! frame of a batch are held back and prepended to the next batch, so a
//! chunk with an odd sample count never shifts the channel layout.

use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

use crate::config::{AudioFormatConfig, PlaybackTiming};
use crate::format::PlanarBuffer;
use crate::pipeline::ChunkQueue;
use crate::sink::PlaybackSink;
use crate::SinkError;

/// Whether a tick is pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No tick is pending.
    Idle,
    /// A tick fires at `deadline`.
    Scheduled {
        /// When the pending tick fires.
        deadline: Instant,
    },
}

/// What one tick did.
#[derive(Debug)]
pub enum TickOutcome {
    /// Capture is no longer active; nothing was drained and nothing is
    /// scheduled.
    Stopped,
    /// Nothing renderable was queued; the next tick waits the idle delay.
    Idle,
    /// A batch was rendered; the next tick fires after `duration`.
    Rendered {
        /// Chunks merged into the batch.
        chunks: usize,
        /// Frames rendered per channel.
        frames: usize,
        /// Play duration reported by the sink, or the buffer's own duration
        /// if the sink reported zero.
        duration: Duration,
    },
    /// The sink failed to render; the batch is dropped and the next tick
    /// waits the idle delay.
    RenderFailed {
        /// Chunks in the dropped batch.
        chunks: usize,
        /// The sink's error.
        error: SinkError,
    },
    /// The sink is permanently unavailable; nothing is scheduled.
    OutputLost {
        /// The sink's error.
        error: SinkError,
    },
}

/// The playback loop as an explicit state machine.
///
/// The owner drives it by awaiting [`fired`](Self::fired) and then calling
/// [`tick`](Self::tick). At most one tick is pending at any time.
///
/// # Example
///
/// ```
/// use pcm_relay::{AudioFormatConfig, ChunkQueue, OutputBus, PlaybackScheduler,
///     PlaybackTiming, SampleChunk, TickOutcome};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let config = AudioFormatConfig::default();
/// let mut scheduler = PlaybackScheduler::new(&config, PlaybackTiming::default());
/// let mut queue = ChunkQueue::new();
/// let output = OutputBus::new();
///
/// queue.enqueue(SampleChunk::new(vec![0.0; 4410], 44100, 1));
/// scheduler.start();
/// scheduler.fired().await;
///
/// let outcome = scheduler.tick(true, &mut queue, &output).await;
/// assert!(matches!(outcome, TickOutcome::Rendered { chunks: 1, .. }));
/// assert!(scheduler.is_scheduled());
/// # }
/// ```
pub struct PlaybackScheduler {
    state: SchedulerState,
    timer: Option<Pin<Box<Sleep>>>,
    batch_size_limit: usize,
    channels: u16,
    sample_rate: u32,
    timing: PlaybackTiming,
    carry: Vec<f32>,
}

impl PlaybackScheduler {
    /// Creates an idle scheduler for one session.
    pub fn new(config: &AudioFormatConfig, timing: PlaybackTiming) -> Self {
        Self {
            state: SchedulerState::Idle,
            timer: None,
            batch_size_limit: config.batch_size_limit(),
            channels: config.channels(),
            sample_rate: config.sample_rate(),
            timing,
            carry: Vec::new(),
        }
    }

    /// Current state.
    pub fn state(&self) -> SchedulerState {
        self.state
    }

    /// Returns `true` if a tick is pending.
    pub fn is_scheduled(&self) -> bool {
        matches!(self.state, SchedulerState::Scheduled { .. })
    }

    /// Schedules the first tick after the start delay.
    pub fn start(&mut self) {
        self.schedule(Instant::now() + self.timing.start_delay);
    }

    /// Samples held back because they did not complete a frame.
    pub fn pending_samples(&self) -> usize {
        self.carry.len()
    }

    /// Cancels the pending tick, if any, and discards held-back samples.
    pub fn cancel(&mut self) {
        self.state = SchedulerState::Idle;
        self.carry.clear();
    }

    fn schedule(&mut self, deadline: Instant) {
        match self.timer {
            Some(ref mut timer) => timer.as_mut().reset(deadline),
            None => self.timer = Some(Box::pin(tokio::time::sleep_until(deadline))),
        }
        self.state = SchedulerState::Scheduled { deadline };
    }

    /// Waits for the pending tick to fire.
    ///
    /// Never completes while idle. Cancel safe: dropping the future keeps
    /// the tick pending. On completion the scheduler is idle until
    /// [`tick`](Self::tick) re-arms it.
    pub async fn fired(&mut self) {
        match (self.state, self.timer.as_mut()) {
            (SchedulerState::Scheduled { .. }, Some(timer)) => {
                timer.as_mut().await;
                self.state = SchedulerState::Idle;
            }
            _ => std::future::pending().await,
        }
    }

    /// Runs one tick.
    ///
    /// `capturing` is re-checked here rather than only when scheduling, so a
    /// timer that was already in flight when capture stopped drains nothing.
    pub async fn tick(
        &mut self,
        capturing: bool,
        queue: &mut ChunkQueue,
        sink: &dyn PlaybackSink,
    ) -> TickOutcome {
        let started = Instant::now();

        if !capturing {
            self.cancel();
            return TickOutcome::Stopped;
        }

        let batch = queue.drain_up_to(self.batch_size_limit);
        if batch.is_empty() {
            self.schedule(started + self.timing.idle_delay);
            return TickOutcome::Idle;
        }

        let mut samples = std::mem::take(&mut self.carry);
        samples.extend_from_slice(&batch.samples);
        let channels = usize::from(self.channels.max(1));
        let whole = samples.len() / channels * channels;
        self.carry = samples.split_off(whole);

        if samples.is_empty() {
            tracing::trace!(
                pending = self.carry.len(),
                channels = self.channels,
                "batch holds no whole frame, holding samples back"
            );
            self.schedule(started + self.timing.idle_delay);
            return TickOutcome::Idle;
        }

        let buffer = PlanarBuffer::deinterleave(&samples, self.channels, self.sample_rate);

        match sink.render(&buffer).await {
            Ok(reported) => {
                let duration = if reported.is_zero() {
                    buffer.duration()
                } else {
                    reported
                };
                tracing::trace!(
                    chunks = batch.chunks,
                    frames = buffer.frames(),
                    pending = self.carry.len(),
                    ?duration,
                    "rendered batch"
                );
                self.schedule(started + duration);
                TickOutcome::Rendered {
                    chunks: batch.chunks,
                    frames: buffer.frames(),
                    duration,
                }
            }
            Err(error) if error.is_fatal() => {
                self.cancel();
                TickOutcome::OutputLost { error }
            }
            Err(error) => {
                self.schedule(started + self.timing.idle_delay);
                TickOutcome::RenderFailed {
                    chunks: batch.chunks,
                    error,
                }
            }
        }
    }
}
