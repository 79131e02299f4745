//! The handle capture backends use to deliver audio to a session.

use std::path::PathBuf;

use tokio::sync::mpsc;

use crate::format::{widen_i16, widen_i8};

/// One delivery from a capture backend.
#[derive(Debug, Clone, PartialEq)]
pub enum ProducerEvent {
    /// Raw PCM values, interleaved, not yet normalized.
    Samples(Vec<f32>),
    /// Raw PCM values in textual list form, e.g. `"[12, -40, 7]"`.
    Serialized(String),
    /// The backend hit an error; capture may or may not continue.
    Error(String),
    /// The backend finished writing audio itself.
    Finished(Option<PathBuf>),
}

/// Cloneable sender a [`CaptureBackend`](crate::CaptureBackend) uses to
/// deliver chunks and errors.
///
/// Sending never blocks, so it is safe from real-time callbacks. Every send
/// returns `false` once the session has ended and the delivery was dropped.
#[derive(Debug, Clone)]
pub struct ChunkProducer {
    tx: mpsc::UnboundedSender<ProducerEvent>,
}

impl ChunkProducer {
    /// Creates a producer and the receiving end a session driver reads.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProducerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Delivers raw PCM values already widened to `f32`.
    pub fn send_samples(&self, samples: Vec<f32>) -> bool {
        self.send(ProducerEvent::Samples(samples))
    }

    /// Delivers 16-bit PCM.
    pub fn send_pcm16(&self, samples: &[i16]) -> bool {
        self.send_samples(widen_i16(samples))
    }

    /// Delivers 8-bit PCM.
    pub fn send_pcm8(&self, samples: &[i8]) -> bool {
        self.send_samples(widen_i8(samples))
    }

    /// Delivers a chunk in textual list form.
    pub fn send_serialized(&self, payload: impl Into<String>) -> bool {
        self.send(ProducerEvent::Serialized(payload.into()))
    }

    /// Reports a capture error.
    pub fn send_error(&self, reason: impl Into<String>) -> bool {
        self.send(ProducerEvent::Error(reason.into()))
    }

    /// Reports that the backend finished, optionally with the file it wrote.
    pub fn send_finished(&self, file: Option<PathBuf>) -> bool {
        self.send(ProducerEvent::Finished(file))
    }

    /// Returns `true` once the session stopped listening.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    fn send(&self, event: ProducerEvent) -> bool {
        self.tx.send(event).is_ok()
    }
}
