//! Screen capture and frame encoding.
//!
//! Capture is behind the `FrameSource` trait so the session loop works
//! the same against a real monitor (the `platform` feature) or the
//! synthetic source used headless and in tests. Frames travel as
//! base64 JPEG, downscaled to the configured bound, so a ~2 fps
//! cadence stays within polling-relay bandwidth.

use std::io::Cursor;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, RgbaImage};

/// One captured frame, raw RGBA.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// Something the agent can grab frames from.
#[async_trait]
pub trait FrameSource: Send {
    async fn grab(&mut self) -> anyhow::Result<RawFrame>;
}

/// Moving-gradient frames for headless operation. Successive grabs
/// differ so the console visibly receives fresh frames.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    tick: u8,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            tick: 0,
        }
    }
}

#[async_trait]
impl FrameSource for SyntheticSource {
    async fn grab(&mut self) -> anyhow::Result<RawFrame> {
        self.tick = self.tick.wrapping_add(7);
        let mut rgba = Vec::with_capacity((self.width * self.height * 4) as usize);
        for y in 0..self.height {
            for x in 0..self.width {
                rgba.push((x as u8).wrapping_add(self.tick));
                rgba.push(y as u8);
                rgba.push(self.tick);
                rgba.push(255);
            }
        }
        Ok(RawFrame {
            width: self.width,
            height: self.height,
            rgba,
        })
    }
}

/// Downscale (if needed) and encode a frame to base64 JPEG.
pub fn encode_frame(
    frame: &RawFrame,
    max_width: u32,
    max_height: u32,
    jpeg_quality: u8,
) -> anyhow::Result<String> {
    let buffer = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| anyhow!("frame buffer does not match {}x{}", frame.width, frame.height))?;

    let mut img = DynamicImage::ImageRgba8(buffer);
    if frame.width > max_width || frame.height > max_height {
        // Triangle is a good speed/quality tradeoff at 2 fps
        img = img.resize(max_width, max_height, FilterType::Triangle);
    }

    let rgb = img.to_rgb8();
    let mut jpeg = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut jpeg, jpeg_quality)
        .encode_image(&rgb)
        .context("jpeg encode failed")?;

    Ok(BASE64.encode(jpeg.into_inner()))
}

// ============================================================================
// TESTS
// ============================================================================
