//! Frame handling on the technician side.
//!
//! The console polls slower than the agent captures, so a drain can
//! contain several frames; only the newest matters and the rest are
//! discarded. Rendering goes through the `FrameSink` trait; the
//! default sink overwrites a JPEG on disk that any image viewer can
//! follow.

use std::path::{Path, PathBuf};

use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use desklink_core::protocol::{FramePayload, Payload, RelayedMessage};

/// Where decoded frames go.
pub trait FrameSink: Send {
    fn write_frame(&mut self, jpeg: &[u8]) -> anyhow::Result<()>;
}

/// Overwrites `<dir>/screen.jpg` with every frame.
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(dir: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating frame directory {}", dir.display()))?;
        Ok(Self {
            path: dir.join("screen.jpg"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSink for FileSink {
    fn write_frame(&mut self, jpeg: &[u8]) -> anyhow::Result<()> {
        std::fs::write(&self.path, jpeg)
            .with_context(|| format!("writing frame to {}", self.path.display()))
    }
}

/// The newest screen frame in a drained batch, if any. Older frames
/// are stale the moment a newer one exists.
pub fn newest_frame(messages: &[RelayedMessage]) -> Option<String> {
    messages
        .iter()
        .rev()
        .find_map(|m| match Payload::from_value(&m.message) {
            Some(Payload::Frame(FramePayload::Screen { data })) => Some(data),
            _ => None,
        })
}

/// Decode a base64 frame into JPEG bytes.
pub fn decode_frame(data: &str) -> anyhow::Result<Vec<u8>> {
    BASE64.decode(data).context("frame is not valid base64")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use desklink_core::protocol::Side;
    use serde_json::json;

    fn msg(message: serde_json::Value) -> RelayedMessage {
        RelayedMessage {
            sender: Side::Client,
            message,
            timestamp: Utc::now(),
        }
    }

    // ========================================================================
    // TEST 1: only the newest frame in a batch survives
    // ========================================================================
    #[test]
    fn test_newest_frame_discards_stale() {
        let batch = vec![
            msg(json!({"type": "screen", "data": "old"})),
            msg(json!({"action": "mouse_move", "x": 1.0, "y": 2.0})),
            msg(json!({"type": "screen", "data": "new"})),
        ];
        assert_eq!(newest_frame(&batch).as_deref(), Some("new"));
    }

    // ========================================================================
    // TEST 2: a batch with no frames yields nothing
    // ========================================================================
    #[test]
    fn test_newest_frame_none_without_frames() {
        let batch = vec![msg(json!({"action": "keyboard_input", "text": "hi"}))];
        assert!(newest_frame(&batch).is_none());
        assert!(newest_frame(&[]).is_none());
    }

    // ========================================================================
    // TEST 3: decode rejects garbage, accepts real base64
    // ========================================================================
    #[test]
    fn test_decode_frame() {
        assert_eq!(decode_frame("aGk=").unwrap(), b"hi");
        assert!(decode_frame("!!not base64!!").is_err());
    }

    // ========================================================================
    // TEST 4: file sink writes and overwrites screen.jpg
    // ========================================================================
    #[test]
    fn test_file_sink_overwrites() {
        let dir = std::env::temp_dir().join(format!(
            "desklink-sink-test-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let mut sink = FileSink::new(&dir).unwrap();

        sink.write_frame(b"first").unwrap();
        sink.write_frame(b"second").unwrap();
        assert_eq!(std::fs::read(sink.path()).unwrap(), b"second");

        std::fs::remove_dir_all(&dir).ok();
    }
}
