//! Synthetic audio for running sessions without hardware.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use ringbuf::traits::{Producer, Split};
use ringbuf::HeapRb;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::{AudioFormatConfig, SampleFormat};
use crate::error::CaptureError;
use crate::source::{CaptureBackend, ChunkProducer};

/// Generates synthetic 16-bit PCM for tests and demos.
///
/// # Example
///
/// ```
/// use pcm_relay::source::MockSource;
///
/// let mut mock = MockSource::new(16000, 1);
///
/// // 100ms of silence, then 100ms of a 440Hz tone
/// mock.generate_silence(100);
/// mock.generate_sine(440.0, 100);
///
/// assert_eq!(mock.samples().len(), 3200);
/// ```
#[derive(Debug, Clone)]
pub struct MockSource {
    sample_rate: u32,
    channels: u16,
    samples: Vec<i16>,
}

impl MockSource {
    /// Creates an empty mock source with the given format.
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels: channels.max(1),
            samples: Vec::new(),
        }
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Channel count.
    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Appends silence.
    pub fn generate_silence(&mut self, duration_ms: u64) {
        let num_samples = self.samples_for_duration(duration_ms);
        self.samples.resize(self.samples.len() + num_samples, 0);
    }

    /// Appends a full-scale sine tone, identical on every channel.
    pub fn generate_sine(&mut self, frequency: f64, duration_ms: u64) {
        let num_frames = self.samples_for_duration(duration_ms) / self.channels as usize;
        let sample_rate = f64::from(self.sample_rate);

        for i in 0..num_frames {
            let t = i as f64 / sample_rate;
            let sample = ((2.0 * std::f64::consts::PI * frequency * t).sin() * 32767.0) as i16;
            for _ in 0..self.channels {
                self.samples.push(sample);
            }
        }
    }

    /// Appends deterministic noise scaled by `amplitude` (0.0 to 1.0).
    pub fn generate_noise(&mut self, duration_ms: u64, amplitude: f64) {
        let num_samples = self.samples_for_duration(duration_ms);
        let amplitude = (amplitude.clamp(0.0, 1.0) * 32767.0) as i32;

        let mut lcg = Lcg::new(12345);
        for _ in 0..num_samples {
            let random = (lcg.next_u32() >> 16) as i32 - 32768;
            self.samples.push((random * amplitude / 32767) as i16);
        }
    }

    /// Appends raw samples.
    pub fn add_samples(&mut self, samples: &[i16]) {
        self.samples.extend_from_slice(samples);
    }

    /// The generated samples.
    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Takes the generated samples, leaving the source empty.
    pub fn take_samples(&mut self) -> Vec<i16> {
        std::mem::take(&mut self.samples)
    }

    /// Duration of the generated audio.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        let frames = self.samples.len() / self.channels as usize;
        Duration::from_secs_f64(frames as f64 / f64::from(self.sample_rate))
    }

    /// Returns a ring buffer consumer pre-filled with the generated samples.
    pub fn into_ring_buffer(self) -> ringbuf::HeapCons<i16> {
        let ring = HeapRb::<i16>::new(self.samples.len().max(1024));
        let (mut producer, consumer) = ring.split();
        producer.push_slice(&self.samples);
        consumer
    }

    fn samples_for_duration(&self, duration_ms: u64) -> usize {
        let frames = (u64::from(self.sample_rate) * duration_ms / 1000) as usize;
        frames * self.channels as usize
    }
}

/// Linear congruential generator for reproducible noise and jitter.
struct Lcg(u32);

impl Lcg {
    fn new(seed: u32) -> Self {
        Self(seed)
    }

    fn next_u32(&mut self) -> u32 {
        self.0 = self.0.wrapping_mul(1_103_515_245).wrapping_add(12345);
        self.0
    }
}

/// A capture backend that plays a [`MockSource`] as if it were a microphone.
///
/// On start it delivers the source's samples in chunks of the session's
/// buffer size, one chunk per interval. Intervals default to the chunk's
/// natural duration and can be made irregular with deterministic jitter.
/// When the source runs out, delivery stops, or starts over with
/// [`looping`](Self::looping).
///
/// Start and stop calls are counted so tests can assert on them.
///
/// # Example
///
/// ```
/// use pcm_relay::source::{MockBackend, MockSource};
/// use std::time::Duration;
///
/// let mut source = MockSource::new(44100, 1);
/// source.generate_sine(440.0, 1000);
///
/// let backend = MockBackend::new(source)
///     .interval(Duration::from_millis(20))
///     .jitter(Duration::from_millis(15))
///     .looping(true);
/// ```
pub struct MockBackend {
    samples: Arc<Vec<i16>>,
    interval: Option<Duration>,
    jitter: Duration,
    looping: bool,
    serialized: bool,
    permission: bool,
    start_error: Option<String>,
    start_calls: AtomicUsize,
    stop_calls: AtomicUsize,
    running: Mutex<Option<MockRun>>,
}

struct MockRun {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    /// Creates a backend that plays `source`.
    pub fn new(source: MockSource) -> Self {
        Self {
            samples: Arc::new(source.samples),
            interval: None,
            jitter: Duration::ZERO,
            looping: false,
            serialized: false,
            permission: true,
            start_error: None,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            running: Mutex::new(None),
        }
    }

    /// Fixed delay between chunks instead of the chunk's natural duration.
    #[must_use]
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    /// Adds a deterministic pseudo-random offset of up to `jitter` to every
    /// interval.
    #[must_use]
    pub fn jitter(mut self, jitter: Duration) -> Self {
        self.jitter = jitter;
        self
    }

    /// Restarts from the beginning when the source is exhausted.
    #[must_use]
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Delivers chunks in textual list form instead of numeric samples.
    #[must_use]
    pub fn serialized(mut self, serialized: bool) -> Self {
        self.serialized = serialized;
        self
    }

    /// Reports permission as denied.
    #[must_use]
    pub fn deny_permission(mut self) -> Self {
        self.permission = false;
        self
    }

    /// Makes every `start()` fail with a backend error.
    #[must_use]
    pub fn fail_start(mut self, reason: impl Into<String>) -> Self {
        self.start_error = Some(reason.into());
        self
    }

    /// How many times `start()` was called.
    pub fn start_count(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// How many times `stop()` was called.
    pub fn stop_count(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Returns `true` while chunks are being delivered.
    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|run| !run.handle.is_finished())
    }
}

fn serialize(samples: &[i16]) -> String {
    let values: Vec<String> = samples.iter().map(ToString::to_string).collect();
    format!("[{}]", values.join(", "))
}

#[async_trait]
impl CaptureBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn check_permission(&self) -> Result<bool, CaptureError> {
        Ok(self.permission)
    }

    async fn request_permission(&self) -> Result<bool, CaptureError> {
        Ok(self.permission)
    }

    async fn start(
        &self,
        config: &AudioFormatConfig,
        producer: ChunkProducer,
    ) -> Result<(), CaptureError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(ref reason) = self.start_error {
            return Err(CaptureError::backend(reason.clone()));
        }
        if !self.permission {
            return Err(CaptureError::PermissionDenied);
        }

        let chunk_size = config.buffer_size();
        let base_interval = self.interval.unwrap_or_else(|| {
            let frames = chunk_size / usize::from(config.channels());
            Duration::from_secs_f64(frames as f64 / f64::from(config.sample_rate()))
        });
        let jitter_ms = self.jitter.as_millis() as u32;
        let samples = Arc::clone(&self.samples);
        let looping = self.looping;
        let serialized = self.serialized;
        let format = config.format();

        let (stop_tx, mut stop_rx) = oneshot::channel();
        let handle = tokio::spawn(async move {
            let mut lcg = Lcg::new(0x5eed);
            let mut position = 0;

            loop {
                if position >= samples.len() {
                    if looping && !samples.is_empty() {
                        position = 0;
                    } else {
                        tracing::debug!("mock backend: source exhausted");
                        return;
                    }
                }

                let end = (position + chunk_size).min(samples.len());
                let chunk = &samples[position..end];
                position = end;

                let delivered = if serialized {
                    producer.send_serialized(serialize(chunk))
                } else {
                    match format {
                        SampleFormat::Pcm16Bit => producer.send_pcm16(chunk),
                        SampleFormat::Pcm8Bit => {
                            let narrowed: Vec<i8> = chunk.iter().map(|&s| (s >> 8) as i8).collect();
                            producer.send_pcm8(&narrowed)
                        }
                    }
                };
                if !delivered {
                    return;
                }

                let mut delay = base_interval;
                if jitter_ms > 0 {
                    delay += Duration::from_millis(u64::from(lcg.next_u32() % (jitter_ms + 1)));
                }

                tokio::select! {
                    _ = &mut stop_rx => return,
                    () = tokio::time::sleep(delay) => {}
                }
            }
        });

        let previous = self.running.lock().replace(MockRun { stop_tx, handle });
        if let Some(run) = previous {
            run.handle.abort();
        }

        tracing::debug!(
            chunk_size,
            ?base_interval,
            "mock backend started"
        );
        Ok(())
    }

    async fn stop(&self) -> Result<(), CaptureError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);

        let run = self.running.lock().take();
        if let Some(run) = run {
            let _ = run.stop_tx.send(());
            if let Err(e) = run.handle.await {
                if !e.is_cancelled() {
                    return Err(CaptureError::backend(format!("mock task failed: {e}")));
                }
            }
        }
        Ok(())
    }
}
