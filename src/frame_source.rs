use crate::error::{RecordError, Result};
use image::RgbImage;
use log::warn;
use screenshots::Screen;

/// One captured raster, RGB8, display resolution.
pub type Frame = RgbImage;

pub trait FrameSource {
    /// Resolution sampled when the source was opened. Fixed for its lifetime.
    fn resolution(&self) -> (u32, u32);

    /// Blocking grab of the current display contents.
    fn capture(&mut self) -> Result<Frame>;
}

/// Captures one display through the `screenshots` crate.
pub struct ScreenFrameSource {
    screen: Screen,
    width: u32,
    height: u32,
}

impl ScreenFrameSource {
    /// Opens `display_index` (clamped to the last display) and samples its
    /// resolution with a probe capture.
    pub fn open(display_index: usize) -> Result<Self> {
        let mut displays = Screen::all().map_err(|e| RecordError::Capture(e.to_string()))?;
        if displays.is_empty() {
            return Err(RecordError::NoDisplay);
        }
        let idx = display_index.min(displays.len() - 1);
        if idx != display_index {
            warn!("requested display_index={display_index} out of range, using {idx}");
        }
        let screen = displays.swap_remove(idx);
        let probe = screen
            .capture()
            .map_err(|e| RecordError::Capture(e.to_string()))?;
        Ok(Self {
            screen,
            width: probe.width(),
            height: probe.height(),
        })
    }
}

impl FrameSource for ScreenFrameSource {
    fn resolution(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn capture(&mut self) -> Result<Frame> {
        let image = self
            .screen
            .capture()
            .map_err(|e| RecordError::Capture(e.to_string()))?;
        let (width, height) = (image.width(), image.height());
        rgba_to_frame(&image.into_raw(), width, height)
    }
}

/// Drops the alpha channel of a packed RGBA buffer.
pub fn rgba_to_frame(rgba: &[u8], width: u32, height: u32) -> Result<Frame> {
    let mut rgb = Vec::with_capacity(width as usize * height as usize * 3);
    rgb.extend(rgba.chunks_exact(4).flat_map(|p| [p[0], p[1], p[2]]));
    RgbImage::from_raw(width, height, rgb).ok_or_else(|| {
        RecordError::Capture(format!(
            "capture buffer of {} bytes does not hold {width}x{height} pixels",
            rgba.len()
        ))
    })
}
