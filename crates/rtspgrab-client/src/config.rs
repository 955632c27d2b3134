// rtspgrab-client/src/config.rs

use std::path::Path;
use std::time::Duration;

use rtspgrab_source::DefaultSourceFactory;
use serde::{Deserialize, Serialize};

use crate::{ClientError, Result};

/// What the acquisition loop publishes when a grab comes back empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StalePolicy {
    /// Keep the last good frame in the slot.
    #[default]
    RetainLast,
    /// Publish "no frame" until the source delivers again.
    Clear,
}

/// Size of the fallback test pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticConfig {
    pub width: u32,
    pub height: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self { width: 640, height: 480 }
    }
}

/// Client configuration, fixed once handed to [`RtspClient`](crate::RtspClient).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Stream address; empty forces the synthetic source.
    pub address: String,
    /// Log lifecycle events at `info` instead of `debug`.
    pub verbose: bool,
    /// Time a fresh connection gets to buffer before `is_ready` is checked.
    pub settle_ms: u64,
    /// Upper bound on one real grab, and with it on `stop()` latency.
    pub grab_timeout_ms: u64,
    pub stale_policy: StalePolicy,
    pub synthetic: SyntheticConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            verbose: false,
            settle_ms: 1000,
            grab_timeout_ms: 100,
            stale_policy: StalePolicy::default(),
            synthetic: SyntheticConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn new(address: impl Into<String>, verbose: bool) -> Self {
        Self { address: address.into(), verbose, ..Self::default() }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(ClientError::Config)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = u64::try_from(settle.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_grab_timeout(mut self, timeout: Duration) -> Self {
        self.grab_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_stale_policy(mut self, policy: StalePolicy) -> Self {
        self.stale_policy = policy;
        self
    }

    /// The address to connect to, or `None` when synthetic mode is forced.
    pub fn address(&self) -> Option<&str> {
        let address = self.address.trim();
        (!address.is_empty()).then_some(address)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    pub fn grab_timeout(&self) -> Duration {
        Duration::from_millis(self.grab_timeout_ms)
    }

    pub fn source_factory(&self) -> DefaultSourceFactory {
        DefaultSourceFactory {
            grab_timeout: self.grab_timeout(),
            synthetic_width: self.synthetic.width,
            synthetic_height: self.synthetic.height,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_address_means_synthetic() {
        assert_eq!(ClientConfig::new("", false).address(), None);
        assert_eq!(ClientConfig::new("   ", true).address(), None);
        assert_eq!(
            ClientConfig::new(" rtsp://cam/stream ", false).address(),
            Some("rtsp://cam/stream")
        );
    }

    #[test]
    fn deserializes_partial_json() {
        let json = r#"{
            "address": "rtsp://localhost:8554/video_stream",
            "verbose": true,
            "stale_policy": "clear",
            "synthetic": {"width": 320}
        }"#;

        let cfg = ClientConfig::from_json_str(json).expect("valid config");
        assert!(cfg.verbose);
        assert_eq!(cfg.settle_ms, 1000);
        assert_eq!(cfg.stale_policy, StalePolicy::Clear);
        assert_eq!(cfg.synthetic, SyntheticConfig { width: 320, height: 480 });
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = ClientConfig::from_json_str(r#"{"stale_policy": "sometimes"}"#).unwrap_err();
        assert!(matches!(err, ClientError::Config(_)));
    }

    #[test]
    fn factory_follows_config() {
        let cfg = ClientConfig::new("x", false).with_grab_timeout(Duration::from_millis(250));
        let factory = cfg.source_factory();
        assert_eq!(factory.grab_timeout, Duration::from_millis(250));
        assert_eq!((factory.synthetic_width, factory.synthetic_height), (640, 480));
    }

    #[test]
    fn huge_durations_saturate() {
        let cfg = ClientConfig::new("x", false)
            .with_settle(Duration::MAX)
            .with_grab_timeout(Duration::from_secs(u64::MAX));
        assert_eq!(cfg.settle_ms, u64::MAX);
        assert_eq!(cfg.grab_timeout_ms, u64::MAX);
        assert_eq!(cfg.settle(), Duration::from_millis(u64::MAX));
    }
}
