// rtspgrab-source/src/lib.rs
// ============================================================
// Stream sources for the rtspgrab acquisition client
// A source is an opened handle that can be polled one frame at
// a time: grab() advances, retrieve() decodes, release() tears
// it down.  Two backends ship with the crate:
//   * GstSource       – GStreamer decoder (rtsp/http/file)
//   * SyntheticSource – deterministic test pattern, never fails
// ------------------------------------------------------------
// Public API:
//   * StreamSource   – per-handle capability trait
//   * SourceFactory  – connect(address) / synthetic() seam
//   * VideoFrame     – packed BGR pixels + metadata
// ------------------------------------------------------------
// Build notes
//   * `gstreamer` feature (default) needs GStreamer ≥ 1.22.
// ============================================================

//! rtspgrab – source layer
//!
//! The acquisition loop in `rtspgrab-client` never talks to a decoder
//! directly.  It asks a [`SourceFactory`] for a boxed [`StreamSource`]
//! and drives it with the two-phase grab/retrieve protocol.  Tests swap
//! the factory for fakes; production uses [`DefaultSourceFactory`].

use std::time::{Duration, Instant};
use thiserror::Error;

#[cfg(feature = "gstreamer")]
mod gstreamer;
mod synthetic;

#[cfg(feature = "gstreamer")]
pub use gstreamer::{pipeline_description, GstSource};
pub use synthetic::{SyntheticSource, SYNTHETIC_FPS};

#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Stream address is empty")]
    EmptyAddress,
    #[error("No decoding backend compiled in (enable the `gstreamer` feature)")]
    BackendUnavailable,
    #[cfg(feature = "gstreamer")]
    #[error("GStreamer init failed: {0}")]
    GstInit(#[source] gst::glib::Error),
    #[cfg(feature = "gstreamer")]
    #[error("Failed to parse pipeline: {0}")]
    ParsePipeline(#[source] gst::glib::Error),
    #[error("Pipeline is not a gst::Pipeline")]
    NotPipeline,
    #[error("AppSink element not found")]
    AppSinkNotFound,
    #[error("AppSink element downcast failed")]
    AppSinkDowncastFailed,
    #[cfg(feature = "gstreamer")]
    #[error("Failed to set pipeline to Playing: {0}")]
    StateChange(#[source] gst::StateChangeError),
    #[error("Sample has no buffer")]
    MissingBuffer,
    #[error("Sample has no caps")]
    MissingCaps,
    #[error("Caps missing struct")]
    MissingStructure,
    #[error("Failed to get field value: {0}")]
    FieldError(String),
    #[error("Buffer map failed: {0}")]
    BufferMap(String),
}

pub type Result<T> = std::result::Result<T, SourceError>;

/// Which backend produced the frames of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Real,
    Dummy,
}

impl std::fmt::Display for SourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Real => write!(f, "real"),
            Self::Dummy => write!(f, "dummy"),
        }
    }
}

/// A decoded frame: packed BGR, `stride` bytes per row.
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    /// Presentation timestamp reported by the source.
    pub pts: Duration,
    /// Position in the publishing session, stamped by the acquisition loop.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, stride: u32, pts: Duration) -> Self {
        Self { data, width, height, stride, pts, sequence: 0, captured_at: Instant::now() }
    }

    /// Row `y` without stride padding, or `None` past the last row.
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = (y as usize).checked_mul(self.stride as usize)?;
        let len = (self.width as usize).checked_mul(3)?;
        self.data.get(start..start.checked_add(len)?)
    }
}

/// An opened stream handle.
///
/// Implementations are owned by exactly one acquisition thread, so methods
/// take `&mut self` and nothing here needs interior locking.
pub trait StreamSource: Send {
    fn kind(&self) -> SourceKind;

    /// Whether the handle is actually producing data (a successful connect
    /// may still be waiting on the remote end).
    fn is_ready(&mut self) -> bool;

    /// Advance to the next unit of data without decoding it.
    fn grab(&mut self) -> bool;

    /// Decode the unit advanced by the last successful [`grab`](Self::grab).
    fn retrieve(&mut self) -> Option<VideoFrame>;

    /// Nominal production rate, `0.0` when the source does not know it.
    fn fps(&self) -> f64;

    /// Tear the handle down.  Calling it twice is harmless.
    fn release(&mut self);
}

/// Creates sources for the acquisition loop.
pub trait SourceFactory: Send + Sync {
    /// Open the stream at `address`.  May block for the backend's timeout.
    fn connect(&self, address: &str) -> Result<Box<dyn StreamSource>>;

    /// The fallback source.  Must not fail.
    fn synthetic(&self) -> Box<dyn StreamSource>;
}

/// GStreamer for real addresses, [`SyntheticSource`] for the fallback.
#[derive(Debug, Clone)]
pub struct DefaultSourceFactory {
    pub grab_timeout: Duration,
    pub synthetic_width: u32,
    pub synthetic_height: u32,
}

impl Default for DefaultSourceFactory {
    fn default() -> Self {
        Self { grab_timeout: Duration::from_millis(100), synthetic_width: 640, synthetic_height: 480 }
    }
}

impl SourceFactory for DefaultSourceFactory {
    #[cfg(feature = "gstreamer")]
    fn connect(&self, address: &str) -> Result<Box<dyn StreamSource>> {
        let src = GstSource::connect(address, self.grab_timeout)?;
        Ok(Box::new(src))
    }

    #[cfg(not(feature = "gstreamer"))]
    fn connect(&self, address: &str) -> Result<Box<dyn StreamSource>> {
        if address.trim().is_empty() {
            return Err(SourceError::EmptyAddress);
        }
        Err(SourceError::BackendUnavailable)
    }

    fn synthetic(&self) -> Box<dyn StreamSource> {
        Box::new(SyntheticSource::new(self.synthetic_width, self.synthetic_height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_skips_stride_padding() {
        // 2x2 BGR with 8-byte rows (2 bytes padding)
        let data = vec![
            1, 1, 1, 2, 2, 2, 0, 0,
            3, 3, 3, 4, 4, 4, 0, 0,
        ];
        let frame = VideoFrame::new(data, 2, 2, 8, Duration::ZERO);
        assert_eq!(frame.row(1), Some(&[3u8, 3, 3, 4, 4, 4][..]));
        assert_eq!(frame.row(2), None);
    }

    #[test]
    fn row_with_oversized_geometry_is_none() {
        let frame = VideoFrame::new(vec![0; 16], u32::MAX, 3, u32::MAX, Duration::ZERO);
        assert_eq!(frame.row(2), None);
        assert_eq!(frame.row(0), None);
    }

    #[test]
    fn default_factory_synthetic_never_fails() {
        let factory = DefaultSourceFactory::default();
        let mut src = factory.synthetic();
        assert_eq!(src.kind(), SourceKind::Dummy);
        assert!(src.is_ready());
        assert_eq!(src.fps(), SYNTHETIC_FPS);
    }

    #[test]
    fn default_factory_rejects_empty_address() {
        let factory = DefaultSourceFactory::default();
        assert!(matches!(factory.connect("  "), Err(SourceError::EmptyAddress)));
    }
}
