//! Runtime events emitted by a capture session.
//!
//! Audio deliveries, producer errors, and output failures all arrive through
//! a single callback registered on the builder. Apart from
//! [`CaptureEvent::OutputLost`], events do not stop the session.

use std::path::PathBuf;
use std::sync::Arc;

use crate::chunk::SampleChunk;

/// Events emitted during audio capture.
///
/// # Example
///
/// ```
/// use pcm_relay::CaptureEvent;
///
/// fn handle_event(event: CaptureEvent) {
///     match event {
///         CaptureEvent::Audio(chunk) => {
///             println!("{} samples", chunk.len());
///         }
///         CaptureEvent::CaptureFailed { reason } => {
///             eprintln!("capture error: {}", reason);
///         }
///         CaptureEvent::RenderFailed { sink_name, error } => {
///             eprintln!("output '{}' failed to render: {}", sink_name, error);
///         }
///         CaptureEvent::OutputLost { sink_name, error } => {
///             eprintln!("output '{}' lost, capture stopped: {}", sink_name, error);
///         }
///         CaptureEvent::Finished { file } => {
///             println!("recording finished: {:?}", file);
///         }
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum CaptureEvent {
    /// A normalized chunk of captured audio (events delivery only).
    Audio(SampleChunk),

    /// The capture backend reported an error, or a serialized payload could
    /// not be decoded.
    ///
    /// Capture continues; the backend decides whether it can keep producing.
    CaptureFailed {
        /// Description of the error.
        reason: String,
    },

    /// Rendering a batch to the output failed.
    ///
    /// The batch is discarded and the scheduler retries after the idle delay.
    RenderFailed {
        /// Name of the output.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// The output reported a permanent failure; capture has been stopped.
    OutputLost {
        /// Name of the output.
        sink_name: String,
        /// Description of the error.
        error: String,
    },

    /// Capture finished. In record mode `file` is the finalized WAV file.
    Finished {
        /// The recording, if this session recorded to a file.
        file: Option<PathBuf>,
    },
}

/// Callback type for receiving capture events.
///
/// Register one via [`AudioInputBuilder::on_event()`]. The callback runs on
/// the session's driver task, so it should return quickly.
///
/// [`AudioInputBuilder::on_event()`]: crate::AudioInputBuilder::on_event
pub type EventCallback = Arc<dyn Fn(CaptureEvent) + Send + Sync>;

/// Creates an [`EventCallback`] from a closure.
///
/// # Example
///
/// ```
/// use pcm_relay::{event_callback, CaptureEvent};
///
/// let callback = event_callback(|event: CaptureEvent| {
///     println!("Got event: {:?}", event);
/// });
/// ```
pub fn event_callback<F>(f: F) -> EventCallback
where
    F: Fn(CaptureEvent) + Send + Sync + 'static,
{
    Arc::new(f)
}
