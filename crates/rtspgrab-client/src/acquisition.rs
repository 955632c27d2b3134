// rtspgrab-client/src/acquisition.rs
//
// The producer side: one thread per session that opens a source (falling back
// to the synthetic one), reports the session over a one-shot channel, then
// grabs until the cancel flag is raised.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use arc_swap::ArcSwapOption;
use log::warn;
use rtspgrab_source::{SourceFactory, SourceKind, StreamSource, VideoFrame};
use tokio::sync::watch;

use crate::{ClientConfig, ClientState, StalePolicy};

// pause after an empty grab so an exhausted source does not spin a core
const IDLE_BACKOFF: Duration = Duration::from_millis(5);

/// What the acquisition thread settled on for this session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Session {
    pub kind: SourceKind,
    pub fps: f64,
}

/// State shared between the controller, its thread and every reader.
pub(crate) struct Shared {
    pub(crate) latest: ArcSwapOption<VideoFrame>,
    // mirrors `latest` for async consumers; holds one value, never a queue
    frames: watch::Sender<Option<Arc<VideoFrame>>>,
    pub(crate) session: ArcSwapOption<Session>,
    pub(crate) cancel: AtomicBool,
    pub(crate) running: AtomicBool,
    state: AtomicU8,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            latest: ArcSwapOption::empty(),
            frames: watch::channel(None).0,
            session: ArcSwapOption::empty(),
            cancel: AtomicBool::new(false),
            running: AtomicBool::new(false),
            state: AtomicU8::new(ClientState::Idle as u8),
        }
    }

    pub(crate) fn state(&self) -> ClientState {
        ClientState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: ClientState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Replace the slot content and wake async subscribers.
    pub(crate) fn publish(&self, frame: Option<Arc<VideoFrame>>) {
        self.latest.store(frame.clone());
        self.frames.send_replace(frame);
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Option<Arc<VideoFrame>>> {
        self.frames.subscribe()
    }

    /// Clear per-session values before a new thread is spawned.
    pub(crate) fn reset(&self) {
        self.cancel.store(false, Ordering::Release);
        self.publish(None);
        self.session.store(None);
    }
}

/// Cheap, cloneable read handle onto a client's latest frame.
///
/// Every method is a single atomic load; none of them wait on the producer.
#[derive(Clone)]
pub struct FrameReader {
    pub(crate) shared: Arc<Shared>,
}

impl FrameReader {
    pub fn get_frame(&self) -> Option<Arc<VideoFrame>> {
        self.shared.latest.load_full()
    }

    pub fn get_fps(&self) -> Option<f64> {
        self.session().map(|s| s.fps)
    }

    pub fn source_kind(&self) -> Option<SourceKind> {
        self.session().map(|s| s.kind)
    }

    pub fn session(&self) -> Option<Session> {
        self.shared.session.load_full().map(|s| *s)
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Acquire)
    }
}

/// Lowers `running` however the thread exits, panics included.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Spawn the acquisition thread.  The receiver yields exactly one
/// [`Session`] once the source is open and `running` is set.
pub(crate) fn spawn(
    config: Arc<ClientConfig>,
    factory: Arc<dyn SourceFactory>,
    shared: Arc<Shared>,
) -> std::io::Result<(JoinHandle<()>, Receiver<Session>)> {
    let (ready_tx, ready_rx) = mpsc::sync_channel(1);
    let handle = thread::Builder::new()
        .name("rtspgrab-acquire".into())
        .spawn(move || run(&config, factory.as_ref(), &shared, ready_tx))?;
    Ok((handle, ready_rx))
}

fn run(config: &ClientConfig, factory: &dyn SourceFactory, shared: &Shared, ready: SyncSender<Session>) {
    let mut source = open_source(config, factory);

    let session = Session { kind: source.kind(), fps: source.fps() };
    shared.session.store(Some(Arc::new(session)));
    let _running = RunningGuard(&shared.running);
    shared.running.store(true, Ordering::Release);
    // start() may have given up on us already; keep going regardless
    let _ = ready.send(session);

    let mut sequence = 0u64;
    while !shared.cancel.load(Ordering::Acquire) {
        if source.grab() {
            match source.retrieve() {
                Some(mut frame) => {
                    sequence += 1;
                    frame.sequence = sequence;
                    shared.publish(Some(Arc::new(frame)));
                }
                None => shared.publish(None),
            }
        } else {
            if config.stale_policy == StalePolicy::Clear && shared.latest.load().is_some() {
                shared.publish(None);
            }
            thread::sleep(IDLE_BACKOFF);
        }
    }

    source.release();
    lifecycle!(config.verbose, "Released {} source after {} frames", session.kind, sequence);
}

/// Connect to the configured address, or hand back the synthetic source.
fn open_source(config: &ClientConfig, factory: &dyn SourceFactory) -> Box<dyn StreamSource> {
    if let Some(address) = config.address() {
        lifecycle!(config.verbose, "Connecting to {}", address);
        match panic::catch_unwind(AssertUnwindSafe(|| factory.connect(address))) {
            Ok(Ok(mut source)) => {
                thread::sleep(config.settle());
                if source.is_ready() {
                    lifecycle!(config.verbose, "Connected to {} ({} fps)", address, source.fps());
                    return source;
                }
                lifecycle!(config.verbose, "Can not connect to {}", address);
                source.release();
            }
            Ok(Err(e)) => warn!(target: "rtspgrab::client", "Connecting to {} failed: {}", address, e),
            Err(_) => warn!(target: "rtspgrab::client", "Connecting to {} panicked", address),
        }
    }
    lifecycle!(config.verbose, "Using synthetic source");
    factory.synthetic()
}
