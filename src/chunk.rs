//! Normalized audio chunk with metadata.

use std::sync::Arc;
use std::time::Duration;

/// One capture delivery after normalization.
///
/// `SampleChunk` is the unit passed to the event callback and held by the
/// playback queue. Samples are interleaved (`L R L R ...` for stereo) and
/// stored in an `Arc<Vec<f32>>` so the event path and the queue can share
/// the same data.
///
/// # Example
///
/// ```
/// use pcm_relay::SampleChunk;
/// use std::time::Duration;
///
/// let chunk = SampleChunk::new(vec![0.0; 1600], 16000, 1);
/// assert_eq!(chunk.duration(), Duration::from_millis(100));
///
/// let shared = chunk.clone(); // shares sample data
/// assert_eq!(shared.len(), 1600);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct SampleChunk {
    /// Interleaved samples, normalized to roughly [-1.0, 1.0] when
    /// normalization is enabled.
    pub samples: Arc<Vec<f32>>,

    /// Sample rate in Hz.
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo).
    pub channels: u16,
}

impl SampleChunk {
    /// Creates a new `SampleChunk`.
    pub fn new(samples: Vec<f32>, sample_rate: u32, channels: u16) -> Self {
        Self {
            samples: Arc::new(samples),
            sample_rate,
            channels,
        }
    }

    /// Number of samples across all channels.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns `true` if this chunk contains no samples.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The samples as a slice.
    pub fn as_slice(&self) -> &[f32] {
        &self.samples
    }

    /// Number of whole frames; a frame holds one sample per channel.
    pub fn frame_count(&self) -> usize {
        if self.channels == 0 {
            return 0;
        }
        self.samples.len() / self.channels as usize
    }

    /// Playback duration of this chunk.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frame_count() as f64 / self.sample_rate as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_stereo_48khz() {
        let chunk = SampleChunk::new(vec![0.0; 9600], 48000, 2);
        // 9600 samples / 2 channels = 4800 frames / 48000 Hz = 100ms
        assert_eq!(chunk.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_frame_count_ignores_partial_frame() {
        let chunk = SampleChunk::new(vec![0.0; 201], 16000, 2);
        assert_eq!(chunk.frame_count(), 100);
    }

    #[test]
    fn test_empty_chunk() {
        let chunk = SampleChunk::new(vec![], 16000, 1);
        assert!(chunk.is_empty());
        assert_eq!(chunk.len(), 0);
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_zero_channels() {
        let chunk = SampleChunk::new(vec![0.0; 100], 16000, 0);
        assert_eq!(chunk.frame_count(), 0);
        assert_eq!(chunk.duration(), Duration::ZERO);
    }

    #[test]
    fn test_clone_shares_samples() {
        let chunk = SampleChunk::new(vec![0.5; 4], 8000, 1);
        let other = chunk.clone();
        assert!(Arc::ptr_eq(&chunk.samples, &other.samples));
        assert_eq!(other.as_slice(), &[0.5; 4]);
    }
}
