// rtspgrab-client/src/stream.rs
use crate::FrameReader;
use futures_core::Stream;
use rtspgrab_source::VideoFrame;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

/// Async view of a client's slot: yields the newest frame each time the
/// consumer polls after a publish.
///
/// Publishes that happen while the consumer is busy collapse into the most
/// recent one, so a slow consumer skips frames instead of falling behind.
/// Empty slots are not yielded.  The stream stays open across `stop()` and
/// `start()` and ends once the client is dropped.
pub fn frame_stream(reader: FrameReader) -> impl Stream<Item = Arc<VideoFrame>> {
    WatchStream::new(reader.shared.subscribe()).filter_map(|frame| frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClientConfig, RtspClient};
    use std::time::Duration;

    #[tokio::test]
    async fn yields_distinct_frames() {
        let client = RtspClient::new(ClientConfig::new("", false));
        client.start().expect("start");

        let mut frames = frame_stream(client.reader());
        let first = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("first frame in time")
            .expect("stream open");
        let second = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("second frame in time")
            .expect("stream open");

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(second.sequence > first.sequence);
        drop(frames);
        client.stop().expect("stop");
    }

    #[tokio::test]
    async fn subscribing_before_start_sees_first_frame() {
        let client = RtspClient::new(ClientConfig::new("", false));
        let mut frames = frame_stream(client.reader());
        client.start().expect("start");

        let frame = tokio::time::timeout(Duration::from_secs(5), frames.next())
            .await
            .expect("frame in time")
            .expect("stream open");
        assert!(frame.sequence >= 1);
        client.stop().expect("stop");
    }
}
