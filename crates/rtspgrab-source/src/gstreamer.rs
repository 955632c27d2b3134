// rtspgrab-source/src/gstreamer.rs
use crate::{Result, SourceError, SourceKind, StreamSource, VideoFrame};
use gst::prelude::*;
use log::{debug, warn};
use std::time::Duration;

/// Build the launch line for `address`.
///
/// Anything with a scheme goes through `uridecodebin` (rtsp, http, file…);
/// a bare path is read with `filesrc`.  Either way the sink hands out packed
/// BGR and keeps only the newest sample.
pub fn pipeline_description(address: &str) -> String {
    let quoted = address.replace('\\', "\\\\").replace('"', "\\\"");
    let src = if address.contains("://") {
        format!("uridecodebin uri=\"{quoted}\"")
    } else {
        format!("filesrc location=\"{quoted}\" ! decodebin")
    };
    format!(
        "{src} ! videoconvert ! video/x-raw,format=BGR \
        ! appsink name=sink max-buffers=1 drop=true sync=false"
    )
}

/// Stream handle backed by a GStreamer pipeline.
pub struct GstSource {
    pipeline: Option<gst::Pipeline>,
    appsink: gst_app::AppSink,
    pending: Option<gst::Sample>,
    grab_timeout: gst::ClockTime,
}

impl GstSource {
    /// Build the pipeline for `address` and set it *Playing*.
    ///
    /// Success only means the pipeline was accepted; a live source may still
    /// fail to deliver, which [`StreamSource::is_ready`] reports.
    pub fn connect(address: &str, grab_timeout: Duration) -> Result<Self> {
        if address.trim().is_empty() {
            return Err(SourceError::EmptyAddress);
        }
        gst::init().map_err(SourceError::GstInit)?;

        let desc = pipeline_description(address);
        debug!("GStreamer pipeline: {}", desc);

        let pipeline = gst::parse::launch(&desc)
            .map_err(SourceError::ParsePipeline)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| SourceError::NotPipeline)?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or(SourceError::AppSinkNotFound)?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| SourceError::AppSinkDowncastFailed)?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(SourceError::StateChange(e));
        }

        Ok(Self {
            pipeline: Some(pipeline),
            appsink,
            pending: None,
            grab_timeout: gst::ClockTime::from_nseconds(grab_timeout.as_nanos() as u64),
        })
    }

    /// Convert a `gst::Sample` into our [`VideoFrame`] wrapper.
    fn sample_to_frame(sample: &gst::Sample) -> Result<VideoFrame> {
        let buffer = sample.buffer().ok_or(SourceError::MissingBuffer)?;
        let caps   = sample.caps().ok_or(SourceError::MissingCaps)?;
        let s      = caps.structure(0).ok_or(SourceError::MissingStructure)?;
        let width  = s.get::<i32>("width").map_err(|e| SourceError::FieldError(e.to_string()))? as u32;
        let height = s.get::<i32>("height").map_err(|e| SourceError::FieldError(e.to_string()))? as u32;

        let pts = buffer
            .pts()
            .map(|t| Duration::from_nanos(t.nseconds()))
            .unwrap_or(Duration::ZERO);

        let map = buffer.map_readable().map_err(|e| SourceError::BufferMap(e.to_string()))?;
        // rows are padded to 4 bytes, so derive the stride from the mapped size
        let stride = if height > 0 { (map.size() / height as usize) as u32 } else { width * 3 };
        let data = map.as_slice().to_vec();
        drop(map);

        Ok(VideoFrame::new(data, width, height, stride, pts))
    }

    /// First fatal message waiting on the bus, if any.
    fn pending_error(pipeline: &gst::Pipeline) -> Option<String> {
        let bus = pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
            _ => None,
        }
    }
}

impl StreamSource for GstSource {
    fn kind(&self) -> SourceKind {
        SourceKind::Real
    }

    fn is_ready(&mut self) -> bool {
        let Some(pipeline) = &self.pipeline else { return false };
        if let Some(err) = Self::pending_error(pipeline) {
            warn!("GStreamer error: {}", err);
            return false;
        }
        let (res, current, _pending) = pipeline.state(gst::ClockTime::ZERO);
        res.is_ok() && current == gst::State::Playing
    }

    fn grab(&mut self) -> bool {
        if self.pipeline.is_none() || self.appsink.is_eos() {
            self.pending = None;
            return false;
        }
        self.pending = self.appsink.try_pull_sample(self.grab_timeout);
        self.pending.is_some()
    }

    fn retrieve(&mut self) -> Option<VideoFrame> {
        let sample = self.pending.take()?;
        match Self::sample_to_frame(&sample) {
            Ok(frame) => Some(frame),
            Err(e) => {
                debug!("Dropping undecodable sample: {}", e);
                None
            }
        }
    }

    fn fps(&self) -> f64 {
        let framerate = self
            .appsink
            .static_pad("sink")
            .and_then(|pad| pad.current_caps())
            .and_then(|caps| caps.structure(0).and_then(|s| s.get::<gst::Fraction>("framerate").ok()));
        match framerate {
            Some(f) if f.denom() != 0 => f.numer() as f64 / f.denom() as f64,
            _ => 0.0,
        }
    }

    fn release(&mut self) {
        self.pending = None;
        if let Some(pipeline) = self.pipeline.take() {
            let _ = pipeline.set_state(gst::State::Null);
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uri_goes_through_uridecodebin() {
        let desc = pipeline_description("rtsp://localhost:8554/video_stream");
        assert!(desc.starts_with("uridecodebin uri=\"rtsp://localhost:8554/video_stream\""));
        assert!(desc.contains("format=BGR"));
        assert!(desc.ends_with("sync=false"));
    }

    #[test]
    fn bare_path_uses_filesrc() {
        let desc = pipeline_description("/tmp/clip.mp4");
        assert!(desc.starts_with("filesrc location=\"/tmp/clip.mp4\" ! decodebin"));
    }

    #[test]
    fn quotes_are_escaped() {
        let desc = pipeline_description("/tmp/a\"b.mp4");
        assert!(desc.contains("location=\"/tmp/a\\\"b.mp4\""));
    }
}
