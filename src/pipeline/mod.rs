//! Session pipeline.
//!
//! ```text
//! Backend → ChunkProducer → Driver Task ─┬─ Events:   normalize → callback
//!                                        ├─ Playback: normalize → ChunkQueue → Scheduler → OutputBus
//!                                        └─ Record:   raw PCM → FileSink
//! ```
//!
//! - **Driver**: one task per session; the only owner of the queue
//! - **ChunkQueue**: FIFO of normalized chunks awaiting playback
//! - **Scheduler**: drains up to `batch_size_limit` chunks per tick and
//!   waits for the rendered audio's duration before the next tick

mod driver;
mod queue;
mod scheduler;

pub(crate) use driver::{DriverCommand, SessionDriver};
pub use queue::{ChunkQueue, ConcatenatedBuffer};
pub use scheduler::{PlaybackScheduler, SchedulerState, TickOutcome};
