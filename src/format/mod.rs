//! Sample representation utilities.
//!
//! This module provides utilities shared by the queue and the scheduler:
//! - Normalization of raw PCM values to the floating range
//! - Deinterleaving into planar buffers for rendering
//! - Sample width conversion and serialized payload parsing

mod convert;
mod normalize;
mod planar;

pub use convert::{f32_to_i16, parse_sample_list, raw_to_i16, raw_to_i8, widen_i16, widen_i8};
pub use normalize::{normalize, Normalization};
pub use planar::PlanarBuffer;
