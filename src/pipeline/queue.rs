//! FIFO of normalized chunks awaiting playback.

use std::collections::VecDeque;

use crate::SampleChunk;

/// Samples merged from up to `max` queued chunks for a single render.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConcatenatedBuffer {
    /// The merged samples, in arrival order.
    pub samples: Vec<f32>,
    /// How many chunks were merged.
    pub chunks: usize,
}

impl ConcatenatedBuffer {
    /// Returns `true` if no samples were drained.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// An ordered queue of chunks awaiting playback.
///
/// Chunks leave the queue strictly in arrival order. The queue is unbounded
/// and is only ever emptied by draining or by [`clear`](ChunkQueue::clear).
/// It has no internal locking: a session's producer and scheduler both run
/// on the same driver task.
///
/// # Example
///
/// ```
/// use pcm_relay::{ChunkQueue, SampleChunk};
///
/// let mut queue = ChunkQueue::new();
/// queue.enqueue(SampleChunk::new(vec![1.0, 2.0], 8000, 1));
/// queue.enqueue(SampleChunk::new(vec![3.0], 8000, 1));
///
/// let batch = queue.drain_up_to(10);
/// assert_eq!(batch.samples, vec![1.0, 2.0, 3.0]);
/// assert_eq!(batch.chunks, 2);
/// assert!(queue.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct ChunkQueue {
    chunks: VecDeque<SampleChunk>,
    queued_samples: usize,
}

impl ChunkQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk to the tail.
    pub fn enqueue(&mut self, chunk: SampleChunk) {
        self.queued_samples += chunk.len();
        self.chunks.push_back(chunk);
    }

    /// Removes up to `max_chunks` chunks from the head and concatenates them.
    ///
    /// Returns immediately with an empty buffer when the queue is empty or
    /// `max_chunks` is zero.
    pub fn drain_up_to(&mut self, max_chunks: usize) -> ConcatenatedBuffer {
        let take = max_chunks.min(self.chunks.len());
        if take == 0 {
            return ConcatenatedBuffer::default();
        }

        let total: usize = self.chunks.iter().take(take).map(SampleChunk::len).sum();
        let mut samples = Vec::with_capacity(total);
        for chunk in self.chunks.drain(..take) {
            samples.extend_from_slice(chunk.as_slice());
        }
        self.queued_samples -= total;

        ConcatenatedBuffer {
            samples,
            chunks: take,
        }
    }

    /// Discards every queued chunk and returns how many were dropped.
    pub fn clear(&mut self) -> usize {
        let dropped = self.chunks.len();
        self.chunks.clear();
        self.queued_samples = 0;
        dropped
    }

    /// Number of queued chunks.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Returns `true` if no chunks are queued.
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total samples across all queued chunks.
    pub fn queued_samples(&self) -> usize {
        self.queued_samples
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(samples: &[f32]) -> SampleChunk {
        SampleChunk::new(samples.to_vec(), 8000, 1)
    }

    fn numbered_chunks(lengths: &[usize]) -> (Vec<SampleChunk>, Vec<f32>) {
        let mut next = 0.0;
        let mut expected = Vec::new();
        let chunks = lengths
            .iter()
            .map(|&len| {
                let samples: Vec<f32> = (0..len)
                    .map(|_| {
                        next += 1.0;
                        next
                    })
                    .collect();
                expected.extend_from_slice(&samples);
                SampleChunk::new(samples, 8000, 1)
            })
            .collect();
        (chunks, expected)
    }

    #[test]
    fn test_drain_empty_queue_returns_immediately() {
        let mut queue = ChunkQueue::new();
        let batch = queue.drain_up_to(5);
        assert!(batch.is_empty());
        assert_eq!(batch.chunks, 0);
    }

    #[test]
    fn test_drain_zero_takes_nothing() {
        let mut queue = ChunkQueue::new();
        queue.enqueue(chunk(&[1.0]));
        let batch = queue.drain_up_to(0);
        assert!(batch.is_empty());
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_respects_limit() {
        let mut queue = ChunkQueue::new();
        for i in 0..5 {
            queue.enqueue(chunk(&[i as f32]));
        }

        let batch = queue.drain_up_to(2);
        assert_eq!(batch.chunks, 2);
        assert_eq!(batch.samples, vec![0.0, 1.0]);
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_drain_stops_when_exhausted() {
        let mut queue = ChunkQueue::new();
        queue.enqueue(chunk(&[1.0, 2.0]));
        let batch = queue.drain_up_to(10);
        assert_eq!(batch.chunks, 1);
        assert!(queue.is_empty());
        assert_eq!(queue.queued_samples(), 0);
    }

    #[test]
    fn test_repeated_drains_reproduce_concatenation_for_any_limit() {
        let lengths = [3, 0, 7, 1, 16, 2, 5];
        for k in 1..=lengths.len() + 1 {
            let (chunks, expected) = numbered_chunks(&lengths);
            let mut queue = ChunkQueue::new();
            for c in chunks {
                queue.enqueue(c);
            }

            let mut out = Vec::new();
            loop {
                let batch = queue.drain_up_to(k);
                if batch.chunks == 0 {
                    break;
                }
                assert!(batch.chunks <= k);
                out.extend(batch.samples);
            }
            assert_eq!(out, expected, "limit {k}");
        }
    }

    #[test]
    fn test_clear_discards_everything() {
        let mut queue = ChunkQueue::new();
        queue.enqueue(chunk(&[1.0]));
        queue.enqueue(chunk(&[2.0, 3.0]));
        assert_eq!(queue.queued_samples(), 3);

        assert_eq!(queue.clear(), 2);
        assert!(queue.is_empty());
        assert_eq!(queue.queued_samples(), 0);
        assert!(queue.drain_up_to(1).is_empty());
    }
}
