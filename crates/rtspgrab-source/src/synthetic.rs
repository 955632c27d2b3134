// rtspgrab-source/src/synthetic.rs
use crate::{SourceKind, StreamSource, VideoFrame};
use std::time::Duration;

/// Rate reported by the synthetic source: "as fast as the loop spins".
pub const SYNTHETIC_FPS: f64 = 999.0;

/// Deterministic test pattern: diagonal colour bands that scroll one pixel
/// per grabbed frame.  Never needs a network and never fails.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u64,
    grabbed: bool,
    released: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1), tick: 0, grabbed: false, released: false }
    }

    /// Pixel value of frame `tick` at (`x`, `y`), in BGR order.
    pub fn pixel(tick: u64, x: u32, y: u32) -> [u8; 3] {
        let t = tick as u32;
        [
            (x.wrapping_add(t) & 0xff) as u8,
            (y.wrapping_add(t) & 0xff) as u8,
            ((x + y).wrapping_add(t.wrapping_mul(2)) & 0xff) as u8,
        ]
    }

    fn render(&self) -> VideoFrame {
        let stride = self.width * 3;
        let mut data = Vec::with_capacity((stride * self.height) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                data.extend_from_slice(&Self::pixel(self.tick, x, y));
            }
        }
        let pts = Duration::from_secs_f64(self.tick as f64 / SYNTHETIC_FPS);
        VideoFrame::new(data, self.width, self.height, stride, pts)
    }
}

impl StreamSource for SyntheticSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Dummy
    }

    fn is_ready(&mut self) -> bool {
        !self.released
    }

    fn grab(&mut self) -> bool {
        if self.released {
            return false;
        }
        self.tick += 1;
        self.grabbed = true;
        true
    }

    fn retrieve(&mut self) -> Option<VideoFrame> {
        if !std::mem::take(&mut self.grabbed) {
            return None;
        }
        Some(self.render())
    }

    fn fps(&self) -> f64 {
        SYNTHETIC_FPS
    }

    fn release(&mut self) {
        self.released = true;
        self.grabbed = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retrieve_without_grab_is_none() {
        let mut src = SyntheticSource::new(4, 4);
        assert!(src.retrieve().is_none());
        assert!(src.grab());
        assert!(src.retrieve().is_some());
        // a grab is consumed by one retrieve
        assert!(src.retrieve().is_none());
    }

    #[test]
    fn pattern_scrolls_per_frame() {
        let mut src = SyntheticSource::new(8, 2);
        src.grab();
        let first = src.retrieve().unwrap();
        src.grab();
        let second = src.retrieve().unwrap();
        assert_eq!(first.data.len(), 8 * 2 * 3);
        assert_eq!(&first.data[..3], &SyntheticSource::pixel(1, 0, 0));
        assert_eq!(&second.data[..3], &SyntheticSource::pixel(2, 0, 0));
        assert_ne!(first.data, second.data);
    }

    #[test]
    fn release_stops_production() {
        let mut src = SyntheticSource::new(2, 2);
        src.release();
        src.release();
        assert!(!src.is_ready());
        assert!(!src.grab());
    }
}
