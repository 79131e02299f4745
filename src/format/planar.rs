//! Planar (one slice per channel) audio buffers handed to playback sinks.

use std::time::Duration;

/// A block of audio with one sample vector per channel.
///
/// This is what a [`PlaybackSink`](crate::PlaybackSink) receives for each
/// render: the scheduler deinterleaves the concatenated queue batch into
/// channels before rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanarBuffer {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl PlanarBuffer {
    /// Splits interleaved samples (`L R L R ...`) into per-channel vectors.
    ///
    /// The frame count is `samples.len() / channels` (integer division); an
    /// incomplete trailing frame is dropped. With one channel the input is
    /// copied as-is. A channel count of zero yields an empty buffer.
    pub fn deinterleave(samples: &[f32], channels: u16, sample_rate: u32) -> Self {
        let channel_count = usize::from(channels);
        if channel_count == 0 {
            return Self {
                channels: Vec::new(),
                sample_rate,
            };
        }

        let frames = samples.len() / channel_count;
        let mut planes = vec![Vec::with_capacity(frames); channel_count];

        for frame in samples.chunks_exact(channel_count) {
            for (plane, &sample) in planes.iter_mut().zip(frame) {
                plane.push(sample);
            }
        }

        Self {
            channels: planes,
            sample_rate,
        }
    }

    /// Builds a buffer from already separated channels.
    ///
    /// Channels are truncated to the shortest one so every channel has the
    /// same number of frames.
    pub fn from_channels(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        for channel in &mut channels {
            channel.truncate(frames);
        }
        Self {
            channels,
            sample_rate,
        }
    }

    /// Number of channels.
    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Sample rate in Hz.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Number of frames (samples per channel).
    pub fn frames(&self) -> usize {
        self.channels.first().map_or(0, Vec::len)
    }

    /// Returns `true` if the buffer holds no frames.
    pub fn is_empty(&self) -> bool {
        self.frames() == 0
    }

    /// Samples of one channel, or `None` if the index is out of range.
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(Vec::as_slice)
    }

    /// All channels.
    pub fn channels(&self) -> &[Vec<f32>] {
        &self.channels
    }

    /// How long this buffer takes to play at its sample rate.
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / f64::from(self.sample_rate))
    }

    /// Multiplies every sample by `gain`.
    pub fn apply_gain(&mut self, gain: f32) {
        for sample in self.channels.iter_mut().flatten() {
            *sample *= gain;
        }
    }

    /// Re-interleaves the channels into `L R L R ...` order.
    pub fn interleave(&self) -> Vec<f32> {
        let frames = self.frames();
        let mut out = Vec::with_capacity(frames * self.channels.len());
        for frame in 0..frames {
            for channel in &self.channels {
                out.push(channel[frame]);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deinterleave_mono_is_copy() {
        let buffer = PlanarBuffer::deinterleave(&[0.1, 0.2, 0.3], 1, 44100);
        assert_eq!(buffer.channel_count(), 1);
        assert_eq!(buffer.channel(0), Some(&[0.1, 0.2, 0.3][..]));
    }

    #[test]
    fn test_deinterleave_stereo() {
        let buffer = PlanarBuffer::deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2, 48000);
        assert_eq!(buffer.frames(), 3);
        assert_eq!(buffer.channel(0), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(buffer.channel(1), Some(&[-1.0, -2.0, -3.0][..]));
    }

    #[test]
    fn test_deinterleave_drops_partial_frame() {
        // 5 samples in stereo: two whole frames plus a dangling left sample
        let buffer = PlanarBuffer::deinterleave(&[1.0, -1.0, 2.0, -2.0, 3.0], 2, 48000);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0), Some(&[1.0, 2.0][..]));
        assert_eq!(buffer.channel(1), Some(&[-1.0, -2.0][..]));
    }

    #[test]
    fn test_deinterleave_single_stereo_sample_is_empty() {
        let buffer = PlanarBuffer::deinterleave(&[1.0], 2, 48000);
        assert!(buffer.is_empty());
        assert_eq!(buffer.channel_count(), 2);
    }

    #[test]
    fn test_deinterleave_zero_channels() {
        let buffer = PlanarBuffer::deinterleave(&[1.0, 2.0], 0, 48000);
        assert_eq!(buffer.channel_count(), 0);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_interleave_restores_order() {
        let samples = [1.0, -1.0, 2.0, -2.0];
        let buffer = PlanarBuffer::deinterleave(&samples, 2, 16000);
        assert_eq!(buffer.interleave(), samples.to_vec());
    }

    #[test]
    fn test_duration() {
        let buffer = PlanarBuffer::deinterleave(&vec![0.0; 8820], 2, 44100);
        assert_eq!(buffer.duration(), Duration::from_millis(100));
    }

    #[test]
    fn test_duration_zero_sample_rate() {
        let buffer = PlanarBuffer::deinterleave(&[0.0; 10], 1, 0);
        assert_eq!(buffer.duration(), Duration::ZERO);
    }

    #[test]
    fn test_apply_gain() {
        let mut buffer = PlanarBuffer::deinterleave(&[0.5, -0.5], 2, 16000);
        buffer.apply_gain(0.5);
        assert_eq!(buffer.interleave(), vec![0.25, -0.25]);
    }

    #[test]
    fn test_from_channels_truncates_to_shortest() {
        let buffer = PlanarBuffer::from_channels(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0]], 8000);
        assert_eq!(buffer.frames(), 2);
        assert_eq!(buffer.channel(0), Some(&[1.0, 2.0][..]));
    }
}
