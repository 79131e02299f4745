//! Capture session state and handle.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::pipeline::DriverCommand;

/// Statistics about the current or most recent capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Deliveries received from the backend.
    pub chunks_received: u64,
    /// Chunks waiting in the playback queue.
    pub chunks_queued: u64,
    /// Chunks drained from the playback queue.
    pub chunks_played: u64,
    /// Buffers handed to the output.
    pub buffers_rendered: u64,
    /// Samples (all channels) handed to the output.
    pub samples_rendered: u64,
    /// Failed renders, including a fatal one.
    pub render_errors: u64,
    /// Errors reported by the backend or undecodable payloads.
    pub capture_errors: u64,
}

/// State shared between the service and the session's driver task.
pub(crate) struct SessionState {
    capturing: AtomicBool,
    pub chunks_received: AtomicU64,
    pub chunks_queued: AtomicU64,
    pub chunks_played: AtomicU64,
    pub buffers_rendered: AtomicU64,
    pub samples_rendered: AtomicU64,
    pub render_errors: AtomicU64,
    pub capture_errors: AtomicU64,
}

impl SessionState {
    /// New state with the capturing flag set.
    pub fn new() -> Self {
        Self {
            capturing: AtomicBool::new(true),
            chunks_received: AtomicU64::new(0),
            chunks_queued: AtomicU64::new(0),
            chunks_played: AtomicU64::new(0),
            buffers_rendered: AtomicU64::new(0),
            samples_rendered: AtomicU64::new(0),
            render_errors: AtomicU64::new(0),
            capture_errors: AtomicU64::new(0),
        }
    }

    pub fn is_capturing(&self) -> bool {
        self.capturing.load(Ordering::SeqCst)
    }

    /// Clears the capturing flag. Returns `true` if this call cleared it;
    /// that caller is responsible for stopping the backend.
    pub fn stop_capturing(&self) -> bool {
        self.capturing.swap(false, Ordering::SeqCst)
    }

    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_received: self.chunks_received.load(Ordering::SeqCst),
            chunks_queued: self.chunks_queued.load(Ordering::SeqCst),
            chunks_played: self.chunks_played.load(Ordering::SeqCst),
            buffers_rendered: self.buffers_rendered.load(Ordering::SeqCst),
            samples_rendered: self.samples_rendered.load(Ordering::SeqCst),
            render_errors: self.render_errors.load(Ordering::SeqCst),
            capture_errors: self.capture_errors.load(Ordering::SeqCst),
        }
    }
}

/// Handle to a running session driver.
///
/// Dropping the handle without [`shutdown`](ActiveSession::shutdown) flags
/// the session stopped and asks the driver to exit and stop the backend.
pub(crate) struct ActiveSession {
    state: Arc<SessionState>,
    cmd_tx: mpsc::Sender<DriverCommand>,
    driver: Option<JoinHandle<()>>,
}

impl ActiveSession {
    pub fn new(
        state: Arc<SessionState>,
        cmd_tx: mpsc::Sender<DriverCommand>,
        driver: JoinHandle<()>,
    ) -> Self {
        Self {
            state,
            cmd_tx,
            driver: Some(driver),
        }
    }

    pub fn state(&self) -> &Arc<SessionState> {
        &self.state
    }

    /// Asks the driver to exit and waits for it.
    ///
    /// The backend must already be stopped by whoever cleared the flag.
    pub async fn shutdown(mut self) {
        let _ = self
            .cmd_tx
            .send(DriverCommand::Stop {
                stop_backend: false,
            })
            .await;

        if let Some(handle) = self.driver.take() {
            if let Err(e) = handle.await {
                tracing::warn!("session driver failed: {}", e);
            }
        }
    }
}

impl Drop for ActiveSession {
    fn drop(&mut self) {
        if self.driver.is_some() {
            // Dropped without shutdown() - let the driver clean up in the background
            let stop_backend = self.state.stop_capturing();
            let _ = self.cmd_tx.try_send(DriverCommand::Stop { stop_backend });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_state_new() {
        let state = SessionState::new();
        assert!(state.is_capturing());
        assert_eq!(state.stats(), SessionStats::default());
    }

    #[test]
    fn test_stop_capturing_only_once() {
        let state = SessionState::new();
        assert!(state.stop_capturing());
        assert!(!state.stop_capturing());
        assert!(!state.is_capturing());
    }

    #[test]
    fn test_stats_snapshot() {
        let state = SessionState::new();
        state.chunks_received.fetch_add(3, Ordering::SeqCst);
        state.render_errors.fetch_add(1, Ordering::SeqCst);
        let stats = state.stats();
        assert_eq!(stats.chunks_received, 3);
        assert_eq!(stats.render_errors, 1);
        assert_eq!(stats.chunks_played, 0);
    }

    #[tokio::test]
    async fn test_drop_flags_stopped_and_signals_driver() {
        let state = Arc::new(SessionState::new());
        let (cmd_tx, mut cmd_rx) = mpsc::channel(1);
        let driver = tokio::spawn(async {});

        let session = ActiveSession::new(Arc::clone(&state), cmd_tx, driver);
        drop(session);

        assert!(!state.is_capturing());
        assert!(matches!(
            cmd_rx.recv().await,
            Some(DriverCommand::Stop { stop_backend: true })
        ));
    }
}
