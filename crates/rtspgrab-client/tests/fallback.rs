use std::time::{Duration, Instant};

use rtspgrab_client::{ClientConfig, RtspClient, SourceKind, SYNTHETIC_FPS};
use serial_test::serial;

fn first_frame(client: &RtspClient) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if client.get_frame().is_some() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}

#[test]
fn empty_address_serves_test_pattern() {
    let mut config = ClientConfig::new("", false);
    config.synthetic.width = 64;
    config.synthetic.height = 48;
    let client = RtspClient::new(config);
    client.start().expect("start");

    assert_eq!(client.source_kind(), Some(SourceKind::Dummy));
    assert_eq!(client.get_fps(), Some(SYNTHETIC_FPS));
    assert!(first_frame(&client));
    let frame = client.get_frame().expect("frame");
    assert_eq!((frame.width, frame.height), (64, 48));

    client.stop().expect("stop");
}

#[test]
#[serial]
fn unreachable_url_falls_back_to_dummy() {
    let config = ClientConfig::new("rtsp://127.0.0.1:9/video_stream", true)
        .with_settle(Duration::from_millis(500));
    let client = RtspClient::new(config);
    client.start().expect("start");

    assert_eq!(client.source_kind(), Some(SourceKind::Dummy));
    assert_eq!(client.get_fps(), Some(SYNTHETIC_FPS));
    assert!(first_frame(&client));

    client.stop().expect("stop");
}

#[test]
#[serial]
fn restart_after_fallback_still_runs() {
    let config = ClientConfig::new("/nonexistent/rtspgrab.mp4", false)
        .with_settle(Duration::from_millis(100));
    let client = RtspClient::new(config);
    client.start().expect("start");
    client.restart().expect("restart");
    assert!(client.is_running());
    assert_eq!(client.source_kind(), Some(SourceKind::Dummy));
    client.stop().expect("stop");
}

// cargo test -- --ignored   (needs RTSPGRAB_TEST_URL pointing at a live stream)
#[test]
#[ignore]
#[serial]
fn live_stream_is_real() {
    let url = std::env::var("RTSPGRAB_TEST_URL").expect("RTSPGRAB_TEST_URL");
    let client = RtspClient::new(ClientConfig::new(url, true));
    client.start().expect("start");
    assert_eq!(client.source_kind(), Some(SourceKind::Real));
    assert!(first_frame(&client));
    client.stop().expect("stop");
}
