// rtspgrab-client/src/lib.rs
// ============================================================
// Background latest-frame acquisition client
// A dedicated thread keeps pulling frames from a stream source
// and overwrites a single shared slot; readers poll that slot
// whenever they like and never wait on the producer.
// ------------------------------------------------------------
// Public API:
//   * RtspClient::start()/stop()/restart() – lifecycle
//   * RtspClient::get_frame()/get_fps()    – latest values
//   * RtspClient::reader()                 – handle for reader threads
//   * frame_stream()                       – async stream of new frames
// ------------------------------------------------------------
// Build notes
//   * Falls back to a synthetic source whenever the address is
//     empty, unreachable or not producing data.
// ============================================================

//! rtspgrab – acquisition client
//!
//! [`RtspClient`] owns a small state machine
//! (`Idle → Starting → Running → Stopping → Idle`).  `start()` spawns the
//! acquisition thread and blocks until that thread has an open source and
//! has raised its `running` flag; `stop()` raises the cancel flag and joins.
//!
//! The frame slot is an [`arc_swap::ArcSwapOption`]: every publish swaps in a
//! whole `Arc<VideoFrame>`, so a reader sees either the previous frame or the
//! new one, never a mix, and no history is kept.
//!
//! ```no_run
//! use rtspgrab_client::{ClientConfig, RtspClient};
//!
//! let client = RtspClient::new(ClientConfig::new("rtsp://localhost:8554/video_stream", true));
//! client.start().unwrap();
//! if let Some(frame) = client.get_frame() {
//!     println!("{}x{} #{}", frame.width, frame.height, frame.sequence);
//! }
//! client.stop().unwrap();
//! ```

use std::any::Any;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use log::error;
use thiserror::Error;

pub use rtspgrab_source::{SourceFactory, SourceKind, StreamSource, VideoFrame, SYNTHETIC_FPS};

/// Lifecycle logging gated on the `verbose` flag.
macro_rules! lifecycle {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            log::info!(target: "rtspgrab::client", $($arg)+)
        } else {
            log::debug!(target: "rtspgrab::client", $($arg)+)
        }
    };
}

mod acquisition;
mod config;
mod stream;

pub use acquisition::{FrameReader, Session};
pub use config::{ClientConfig, StalePolicy, SyntheticConfig};
pub use stream::frame_stream;

use acquisition::Shared;

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("start() called while the client is {state:?}")]
    AlreadyStarted { state: ClientState },
    #[error("stop() called while the client is {state:?}")]
    NotRunning { state: ClientState },
    #[error("Failed to spawn acquisition thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("Acquisition thread exited before reporting a source")]
    Handshake,
    #[error("Invalid configuration: {0}")]
    Config(#[source] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ClientError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ClientState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
}

impl ClientState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            _ => Self::Idle,
        }
    }
}

/// Latest-frame client.  See the crate docs for the lifecycle.
pub struct RtspClient {
    config: Arc<ClientConfig>,
    factory: Arc<dyn SourceFactory>,
    shared: Arc<Shared>,
    // serializes start/stop/restart; holds the thread while one is alive
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RtspClient {
    /// Client backed by GStreamer with the synthetic pattern as fallback.
    pub fn new(config: ClientConfig) -> Self {
        let factory = Arc::new(config.source_factory());
        Self::with_factory(config, factory)
    }

    /// Client that opens its sources through `factory`.
    pub fn with_factory(config: ClientConfig, factory: Arc<dyn SourceFactory>) -> Self {
        Self {
            config: Arc::new(config),
            factory,
            shared: Arc::new(Shared::new()),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Spawn the acquisition thread and wait until it is producing.
    ///
    /// Never fails because the stream is unreachable; that case ends with a
    /// synthetic session.  Fails only on misuse or if the thread cannot run.
    pub fn start(&self) -> Result<()> {
        let mut task = self.lock_task();
        self.start_locked(&mut task)
    }

    /// Cancel the acquisition thread and join it.
    ///
    /// When this returns the source has been released.  A panic inside the
    /// thread is logged and swallowed; the client still ends `Idle`.
    pub fn stop(&self) -> Result<()> {
        let mut task = self.lock_task();
        self.stop_locked(&mut task)
    }

    /// `stop()` then `start()` under one lock, re-evaluating the source.
    /// From `Idle` this is a plain `start()`.
    pub fn restart(&self) -> Result<()> {
        let mut task = self.lock_task();
        if self.shared.state() == ClientState::Running {
            self.stop_locked(&mut task)?;
        }
        self.start_locked(&mut task)
    }

    /// Latest published frame; never blocks.
    pub fn get_frame(&self) -> Option<Arc<VideoFrame>> {
        self.shared.latest.load_full()
    }

    /// Rate reported by the current (or last) session's source.
    pub fn get_fps(&self) -> Option<f64> {
        self.shared.session.load_full().map(|s| s.fps)
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.shared.session.load_full().map(|s| s.kind)
    }

    pub fn state(&self) -> ClientState {
        self.shared.state()
    }

    /// True while the acquisition loop is iterating.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }

    pub fn reader(&self) -> FrameReader {
        FrameReader { shared: Arc::clone(&self.shared) }
    }

    fn lock_task(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.task.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn start_locked(&self, task: &mut Option<JoinHandle<()>>) -> Result<()> {
        let state = self.shared.state();
        if state != ClientState::Idle {
            return Err(ClientError::AlreadyStarted { state });
        }
        self.shared.set_state(ClientState::Starting);
        self.shared.reset();

        let spawned = acquisition::spawn(
            Arc::clone(&self.config),
            Arc::clone(&self.factory),
            Arc::clone(&self.shared),
        );
        let (handle, ready) = match spawned {
            Ok(v) => v,
            Err(e) => {
                self.shared.set_state(ClientState::Idle);
                return Err(ClientError::Spawn(e));
            }
        };

        match ready.recv() {
            Ok(session) => {
                *task = Some(handle);
                self.shared.set_state(ClientState::Running);
                lifecycle!(self.config.verbose, "Running on {} source at {} fps", session.kind, session.fps);
                Ok(())
            }
            Err(_) => {
                if let Err(panic) = handle.join() {
                    error!(target: "rtspgrab::client", "Acquisition thread panicked: {}", panic_message(&*panic));
                }
                self.shared.set_state(ClientState::Idle);
                Err(ClientError::Handshake)
            }
        }
    }

    fn stop_locked(&self, task: &mut Option<JoinHandle<()>>) -> Result<()> {
        let state = self.shared.state();
        if state != ClientState::Running {
            return Err(ClientError::NotRunning { state });
        }
        self.shared.set_state(ClientState::Stopping);
        lifecycle!(self.config.verbose, "Disconnecting from {}", self.describe_address());

        self.shared.cancel.store(true, Ordering::Release);
        if let Some(handle) = task.take() {
            if let Err(panic) = handle.join() {
                error!(target: "rtspgrab::client", "Acquisition thread panicked: {}", panic_message(&*panic));
            }
        }

        self.shared.set_state(ClientState::Idle);
        lifecycle!(self.config.verbose, "Disconnected");
        Ok(())
    }

    fn describe_address(&self) -> &str {
        self.config.address().unwrap_or("<synthetic>")
    }
}

impl Drop for RtspClient {
    fn drop(&mut self) {
        if self.shared.state() == ClientState::Running {
            let _ = self.stop();
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_round_trips_through_u8() {
        for state in [ClientState::Idle, ClientState::Starting, ClientState::Running, ClientState::Stopping] {
            assert_eq!(ClientState::from_u8(state as u8), state);
        }
    }

    #[test]
    fn fresh_client_is_idle_and_empty() {
        let client = RtspClient::new(ClientConfig::new("", false));
        assert_eq!(client.state(), ClientState::Idle);
        assert!(!client.is_running());
        assert!(client.get_frame().is_none());
        assert!(client.get_fps().is_none());
        assert!(client.source_kind().is_none());
    }

    #[test]
    fn stop_before_start_is_misuse() {
        let client = RtspClient::new(ClientConfig::new("", false));
        assert!(matches!(
            client.stop(),
            Err(ClientError::NotRunning { state: ClientState::Idle })
        ));
    }

    #[test]
    fn synthetic_session_round_trip() {
        let client = RtspClient::new(ClientConfig::new("", false));
        client.start().expect("start");
        assert_eq!(client.state(), ClientState::Running);
        assert_eq!(client.source_kind(), Some(SourceKind::Dummy));
        assert_eq!(client.get_fps(), Some(SYNTHETIC_FPS));
        client.stop().expect("stop");
        assert_eq!(client.state(), ClientState::Idle);
        assert!(!client.is_running());
    }
}
