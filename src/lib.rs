//! # pcm-relay
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Audio input with paced playback of irregular PCM deliveries.
//!
//! A capture backend delivers raw PCM chunks at whatever cadence it likes.
//! `pcm-relay` normalizes them and, depending on the session's
//! [`DeliveryMode`], hands each chunk to an event callback, records it to a
//! WAV file, or queues it for gap-free playback: a scheduler drains up to
//! `batch_size_limit` chunks per tick, renders them as one planar buffer and
//! waits for exactly the rendered audio's duration before the next tick.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use pcm_relay::{AudioInput, CaptureOptions, ChannelSink};
//! use std::sync::Arc;
//! use tokio::sync::mpsc;
//!
//! let (tx, mut rx) = mpsc::channel(32);
//!
//! let input = AudioInput::builder()
//!     .on_event(|e| tracing::warn!(?e, "capture event"))
//!     .build()?;
//! input.connect(Arc::new(ChannelSink::new(tx)));
//!
//! input
//!     .start(&CaptureOptions {
//!         sample_rate: Some(16000.0),
//!         stream_to_output: Some(true),
//!         ..Default::default()
//!     })
//!     .await?;
//!
//! // Rendered buffers arrive paced at real-time speed
//! while let Some(buffer) = rx.recv().await {
//!     // Play, analyse, forward...
//! }
//!
//! input.stop().await?;
//! ```
//!
//! ## Architecture
//!
//! - **Backend**: a device callback, file reader or test signal; pushes
//!   into a [`source::ChunkProducer`] and never blocks
//! - **Driver task**: one per session; owns the chunk queue and the playback
//!   scheduler, so neither needs locking
//! - **Output bus**: long-lived gain node that forwards rendered buffers to
//!   whatever sink is connected, and keeps time when nothing is

// unsafe_code lint is configured in Cargo.toml as "deny"
#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
// unwrap/expect allowed in tests only
#![allow(clippy::unwrap_used)]
// These doc lints are too strict for internal implementation details
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod builder;
mod chunk;
mod config;
mod error;
mod event;
pub mod format;
mod pipeline;
mod session;
mod sink;
pub mod source;

pub use builder::{AudioInput, AudioInputBuilder};
pub use chunk::SampleChunk;
pub use config::{
    rates, AudioFormatConfig, AudioSourceType, CaptureOptions, DeliveryMode, PlaybackTiming,
    SampleFormat, DEFAULT_BATCH_SIZE_LIMIT, DEFAULT_BUFFER_SIZE, DEFAULT_CHANNELS,
    DEFAULT_FORMAT, DEFAULT_NORMALIZATION_FACTOR, DEFAULT_NORMALIZE, DEFAULT_SAMPLE_RATE,
};
pub use error::{CaptureError, ConfigError, SinkError};
pub use event::{event_callback, CaptureEvent, EventCallback};
pub use pipeline::{ChunkQueue, ConcatenatedBuffer, PlaybackScheduler, SchedulerState, TickOutcome};
pub use session::SessionStats;
pub use sink::{ChannelSink, FileSink, OutputBus, PlaybackSink};
pub use source::CaptureBackend;
