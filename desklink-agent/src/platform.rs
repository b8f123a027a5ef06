//! Real capture and injection backends (the `platform` feature).
//!
//! Capture goes through xcap's primary monitor; injection through
//! enigo. Both are kept behind the traits in `capture` / `input` so
//! the session loops never see platform types.

use anyhow::anyhow;
use async_trait::async_trait;
use enigo::{Button, Coordinate, Direction, Enigo, Keyboard, Mouse, Settings};
use xcap::Monitor;

use desklink_core::protocol::{MouseButton, CANONICAL_HEIGHT, CANONICAL_WIDTH};

use crate::capture::{FrameSource, RawFrame};
use crate::input::InputBackend;

/// Captures the primary monitor.
pub struct ScreenSource {
    monitor: Monitor,
}

impl ScreenSource {
    pub fn new() -> anyhow::Result<Self> {
        let monitors = Monitor::all().map_err(|e| anyhow!("monitor enumeration failed: {}", e))?;
        let monitor = monitors
            .into_iter()
            .find(|m| m.is_primary())
            .ok_or_else(|| anyhow!("no primary monitor found"))?;
        tracing::info!(
            "capturing {} ({}x{})",
            monitor.name(),
            monitor.width(),
            monitor.height()
        );
        Ok(Self { monitor })
    }
}

#[async_trait]
impl FrameSource for ScreenSource {
    async fn grab(&mut self) -> anyhow::Result<RawFrame> {
        let img = self
            .monitor
            .capture_image()
            .map_err(|e| anyhow!("screen capture failed: {}", e))?;
        Ok(RawFrame {
            width: img.width(),
            height: img.height(),
            rgba: img.into_raw(),
        })
    }
}

/// Injects input events through enigo.
pub struct EnigoInput {
    enigo: Enigo,
    size: (u32, u32),
}

impl EnigoInput {
    pub fn new() -> anyhow::Result<Self> {
        let enigo = Enigo::new(&Settings::default())
            .map_err(|e| anyhow!("input backend init failed: {}", e))?;
        let size = match enigo.main_display() {
            Ok((w, h)) if w > 0 && h > 0 => (w as u32, h as u32),
            _ => {
                tracing::warn!("could not read display size, assuming canonical");
                (CANONICAL_WIDTH, CANONICAL_HEIGHT)
            }
        };
        Ok(Self { enigo, size })
    }
}

impl InputBackend for EnigoInput {
    fn screen_size(&self) -> (u32, u32) {
        self.size
    }

    fn mouse_move(&mut self, x: i32, y: i32) -> anyhow::Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow!("mouse move failed: {}", e))
    }

    fn mouse_click(&mut self, x: i32, y: i32, button: MouseButton) -> anyhow::Result<()> {
        self.enigo
            .move_mouse(x, y, Coordinate::Abs)
            .map_err(|e| anyhow!("mouse move failed: {}", e))?;
        let button = match button {
            MouseButton::Left => Button::Left,
            MouseButton::Right => Button::Right,
        };
        self.enigo
            .button(button, Direction::Click)
            .map_err(|e| anyhow!("mouse click failed: {}", e))
    }

    fn keyboard_input(&mut self, text: &str) -> anyhow::Result<()> {
        self.enigo
            .text(text)
            .map_err(|e| anyhow!("text injection failed: {}", e))
    }
}
