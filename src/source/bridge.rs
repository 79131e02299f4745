//! Bridge task from a real-time ring buffer to a [`ChunkProducer`].
//!
//! Real-time capture callbacks push samples into a lock-free SPSC ring and
//! return immediately. The bridge polls the ring on the tokio runtime and
//! forwards whole `chunk_size`-sample chunks. On stop, whatever is left is
//! flushed, including a final partial chunk.

use std::time::Duration;

use ringbuf::traits::{Consumer, Observer};
use ringbuf::HeapCons;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::config::SampleFormat;
use crate::source::ChunkProducer;

/// Slices a ring buffer into fixed-size chunks.
struct RingReader {
    consumer: HeapCons<i16>,
    chunk_size: usize,
}

impl RingReader {
    fn has_chunk(&self) -> bool {
        self.consumer.occupied_len() >= self.chunk_size
    }

    /// Reads one complete chunk, or `None` if not enough samples are buffered.
    fn try_read_chunk(&mut self) -> Option<Vec<i16>> {
        if !self.has_chunk() {
            return None;
        }
        let mut samples = vec![0i16; self.chunk_size];
        let read = self.consumer.pop_slice(&mut samples);
        samples.truncate(read);
        Some(samples)
    }

    /// Reads everything left; the last chunk may be short.
    fn drain(&mut self) -> Vec<Vec<i16>> {
        let mut chunks = Vec::new();
        while let Some(chunk) = self.try_read_chunk() {
            chunks.push(chunk);
        }

        let remaining = self.consumer.occupied_len();
        if remaining > 0 {
            let mut samples = vec![0i16; remaining];
            let read = self.consumer.pop_slice(&mut samples);
            samples.truncate(read);
            if !samples.is_empty() {
                chunks.push(samples);
            }
        }
        chunks
    }
}

fn forward(producer: &ChunkProducer, format: SampleFormat, samples: &[i16]) -> bool {
    match format {
        SampleFormat::Pcm16Bit => producer.send_pcm16(samples),
        SampleFormat::Pcm8Bit => {
            let narrowed: Vec<i8> = samples.iter().map(|&s| (s >> 8) as i8).collect();
            producer.send_pcm8(&narrowed)
        }
    }
}

/// Handle to a running ring bridge.
pub struct RingBridge {
    stop_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl RingBridge {
    /// Stops polling, flushes the remaining samples and waits for the task.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = (&mut self.handle).await {
            tracing::warn!("ring bridge task failed: {}", e);
        }
    }

    /// Returns `true` if the bridge task has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Spawns a bridge that forwards `chunk_size`-sample chunks from `consumer`
/// to `producer`, polling every `poll_interval`.
///
/// Samples are 16-bit; with [`SampleFormat::Pcm8Bit`] they are narrowed to
/// their high byte before delivery. The task exits on its own once the
/// session stops listening.
///
/// # Example
///
/// ```
/// use pcm_relay::source::{spawn_ring_bridge, ChunkProducer, MockSource, ProducerEvent};
/// use pcm_relay::SampleFormat;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let mut mock = MockSource::new(16000, 1);
/// mock.add_samples(&[1, 2, 3, 4, 5]);
///
/// let (producer, mut rx) = ChunkProducer::channel();
/// let bridge = spawn_ring_bridge(
///     mock.into_ring_buffer(),
///     2,
///     SampleFormat::Pcm16Bit,
///     producer,
///     Duration::from_millis(10),
/// );
/// bridge.stop().await;
///
/// assert_eq!(rx.recv().await, Some(ProducerEvent::Samples(vec![1.0, 2.0])));
/// # }
/// ```
pub fn spawn_ring_bridge(
    consumer: HeapCons<i16>,
    chunk_size: usize,
    format: SampleFormat,
    producer: ChunkProducer,
    poll_interval: Duration,
) -> RingBridge {
    let (stop_tx, mut stop_rx) = oneshot::channel();
    let mut reader = RingReader {
        consumer,
        chunk_size: chunk_size.max(1),
    };

    let handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
        let mut chunks_forwarded: u64 = 0;

        loop {
            tokio::select! {
                _ = &mut stop_rx => break,
                _ = interval.tick() => {
                    while let Some(chunk) = reader.try_read_chunk() {
                        if !forward(&producer, format, &chunk) {
                            tracing::debug!("ring bridge: session closed, exiting");
                            return;
                        }
                        chunks_forwarded += 1;
                        if chunks_forwarded % 50 == 0 {
                            tracing::debug!(
                                "ring bridge: forwarded chunk #{}, {} samples",
                                chunks_forwarded,
                                chunk.len()
                            );
                        }
                    }
                }
            }
        }

        for chunk in reader.drain() {
            if !forward(&producer, format, &chunk) {
                break;
            }
        }
    });

    RingBridge {
        stop_tx: Some(stop_tx),
        handle,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MockSource, ProducerEvent};
    use ringbuf::traits::{Producer, Split};
    use ringbuf::HeapRb;

    #[tokio::test(start_paused = true)]
    async fn test_bridge_forwards_whole_chunks_while_running() {
        let ring = HeapRb::<i16>::new(64);
        let (mut ring_tx, ring_rx) = ring.split();
        let (producer, mut rx) = ChunkProducer::channel();

        let bridge = spawn_ring_bridge(
            ring_rx,
            4,
            SampleFormat::Pcm16Bit,
            producer,
            Duration::from_millis(10),
        );

        ring_tx.push_slice(&[1, 2, 3, 4, 5, 6]);
        tokio::time::sleep(Duration::from_millis(25)).await;

        assert_eq!(
            rx.recv().await,
            Some(ProducerEvent::Samples(vec![1.0, 2.0, 3.0, 4.0]))
        );
        assert!(rx.try_recv().is_err());

        bridge.stop().await;
        assert_eq!(rx.recv().await, Some(ProducerEvent::Samples(vec![5.0, 6.0])));
    }

    #[tokio::test]
    async fn test_bridge_narrows_to_8_bit() {
        let mut mock = MockSource::new(8000, 1);
        mock.add_samples(&[0x7F00, -0x8000]);
        let (producer, mut rx) = ChunkProducer::channel();

        let bridge = spawn_ring_bridge(
            mock.into_ring_buffer(),
            16,
            SampleFormat::Pcm8Bit,
            producer,
            Duration::from_millis(10),
        );
        bridge.stop().await;

        assert_eq!(
            rx.recv().await,
            Some(ProducerEvent::Samples(vec![127.0, -128.0]))
        );
    }

    #[tokio::test]
    async fn test_bridge_exits_when_session_closes() {
        let mut mock = MockSource::new(8000, 1);
        mock.generate_silence(100);
        let (producer, rx) = ChunkProducer::channel();
        drop(rx);

        let bridge = spawn_ring_bridge(
            mock.into_ring_buffer(),
            100,
            SampleFormat::Pcm16Bit,
            producer,
            Duration::from_millis(1),
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(bridge.is_finished());
        bridge.stop().await;
    }
}
