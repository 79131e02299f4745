//! Mapping raw PCM values onto the floating range.

use crate::config::{DEFAULT_NORMALIZATION_FACTOR, DEFAULT_NORMALIZE};

/// Normalization settings taken from the session configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normalization {
    /// Whether samples are divided by `factor`.
    pub enabled: bool,
    /// Positive divisor mapping integer PCM to roughly [-1.0, 1.0].
    pub factor: f32,
}

impl Default for Normalization {
    fn default() -> Self {
        Self {
            enabled: DEFAULT_NORMALIZE,
            factor: DEFAULT_NORMALIZATION_FACTOR,
        }
    }
}

impl Normalization {
    /// Settings that pass samples through unchanged.
    pub const DISABLED: Self = Self {
        enabled: false,
        factor: DEFAULT_NORMALIZATION_FACTOR,
    };
}

/// Normalizes one chunk of raw samples.
///
/// When enabled, every sample is divided by the factor. Afterwards, if the
/// *last* value is NaN (malformed trailing data from the producer) it is
/// dropped, so the result is one element shorter than the input. Only the
/// final element is inspected. When disabled, samples pass through untouched.
///
/// # Example
///
/// ```
/// use pcm_relay::format::{normalize, Normalization};
///
/// let out = normalize(vec![100.0, f32::NAN], Normalization::default());
/// assert_eq!(out.len(), 1);
/// ```
pub fn normalize(mut samples: Vec<f32>, normalization: Normalization) -> Vec<f32> {
    if !normalization.enabled {
        return samples;
    }

    for sample in &mut samples {
        *sample /= normalization.factor;
    }

    if samples.last().is_some_and(|last| last.is_nan()) {
        samples.pop();
    }

    samples
}
