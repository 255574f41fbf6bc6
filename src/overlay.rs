//! Watermark compositing: a translucent backing box plus the identity and
//! clock lines, blended onto the frame in place.
//!
//! Blend law per channel: `α·overlay + (1−α)·base`. The box is blended first
//! against the captured frame, then each text line against the result.
//! Coordinates are fixed screen-space values and do not follow resolution.

use crate::frame_source::Frame;
use ab_glyph::{FontArc, PxScale};
use chrono::{DateTime, Local};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::draw_text_mut;
use log::{info, warn};
use std::path::{Path, PathBuf};

/// Font files probed when none is configured.
pub const SYSTEM_FONT_PATHS: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
    "C:\\Windows\\Fonts\\segoeui.ttf",
];

pub const CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Inclusive pixel bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayBox {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl OverlayBox {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Part of the box inside a `width`x`height` frame, as `(x, y, w, h)`.
    pub fn clip(&self, width: u32, height: u32) -> Option<(u32, u32, u32, u32)> {
        if self.left >= width
            || self.top >= height
            || self.right < self.left
            || self.bottom < self.top
        {
            return None;
        }
        let right = self.right.min(width - 1);
        let bottom = self.bottom.min(height - 1);
        Some((self.left, self.top, right - self.left + 1, bottom - self.top + 1))
    }

    fn on_border(&self, x: u32, y: u32, thickness: u32) -> bool {
        x < self.left + thickness
            || y < self.top + thickness
            || x + thickness > self.right
            || y + thickness > self.bottom
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayStyle {
    pub bounds: OverlayBox,
    pub fill: [u8; 3],
    pub border: Option<[u8; 3]>,
    pub border_thickness: u32,
    pub text_color: [u8; 3],
    pub font_px: f32,
    /// Top-left of the identity line.
    pub identity_anchor: (i32, i32),
    /// Top-left of the clock line.
    pub clock_anchor: (i32, i32),
    pub bg_opacity: f32,
    pub text_opacity: f32,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            bounds: OverlayBox::new(10, 10, 400, 100),
            fill: [0, 0, 0],
            border: Some([255, 255, 255]),
            border_thickness: 2,
            text_color: [255, 255, 255],
            font_px: 22.0,
            identity_anchor: (20, 24),
            clock_anchor: (20, 64),
            bg_opacity: 0.3,
            text_opacity: 0.7,
        }
    }
}

/// One text line of the watermark for a single tick.
#[derive(Debug, Clone, PartialEq)]
pub struct OverlayItem {
    pub text: String,
    pub anchor: (i32, i32),
    pub bounds: OverlayBox,
    pub opacity: f32,
}

pub fn build_overlay(
    style: &OverlayStyle,
    identity: &str,
    timestamp: &DateTime<Local>,
) -> Vec<OverlayItem> {
    vec![
        OverlayItem {
            text: format!("User: {identity}"),
            anchor: style.identity_anchor,
            bounds: style.bounds,
            opacity: style.text_opacity,
        },
        OverlayItem {
            text: format!("Time: {}", timestamp.format(CLOCK_FORMAT)),
            anchor: style.clock_anchor,
            bounds: style.bounds,
            opacity: style.text_opacity,
        },
    ]
}

pub fn blend_channel(overlay: u8, base: u8, alpha: f32) -> u8 {
    let a = alpha.clamp(0.0, 1.0);
    (a * overlay as f32 + (1.0 - a) * base as f32)
        .round()
        .clamp(0.0, 255.0) as u8
}

/// Loads the configured font, or the first readable system font.
pub fn load_font(explicit: Option<&Path>) -> Option<FontArc> {
    let candidates: Vec<PathBuf> = match explicit {
        Some(path) => vec![path.to_path_buf()],
        None => SYSTEM_FONT_PATHS.iter().map(PathBuf::from).collect(),
    };
    for path in &candidates {
        let Ok(bytes) = std::fs::read(path) else {
            continue;
        };
        match FontArc::try_from_vec(bytes) {
            Ok(font) => {
                info!("overlay font: {}", path.display());
                return Some(font);
            }
            Err(err) => warn!("unusable font {}: {err}", path.display()),
        }
    }
    warn!("no overlay font found, watermark text disabled");
    None
}

pub struct Compositor {
    style: OverlayStyle,
    font: Option<FontArc>,
}

impl Compositor {
    pub fn new(style: OverlayStyle, font: Option<FontArc>) -> Self {
        Self { style, font }
    }

    pub fn style(&self) -> &OverlayStyle {
        &self.style
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Stamps the watermark onto `frame`. Only pixels inside the overlay box
    /// change; dimensions never do.
    pub fn composite(&self, frame: &mut Frame, identity: &str, timestamp: &DateTime<Local>) {
        let Some(region) = self.style.bounds.clip(frame.width(), frame.height()) else {
            return;
        };
        self.blend_background(frame, region);

        let Some(font) = &self.font else {
            return;
        };
        let scale = PxScale::from(self.style.font_px);
        let color = Rgb(self.style.text_color);
        for item in build_overlay(&self.style, identity, timestamp) {
            let (x, y, w, h) = region;
            let mut layer = imageops::crop_imm(&*frame, x, y, w, h).to_image();
            draw_text_mut(
                &mut layer,
                color,
                item.anchor.0 - x as i32,
                item.anchor.1 - y as i32,
                scale,
                font,
                &item.text,
            );
            blend_layer(frame, region, &layer, item.opacity);
        }
    }

    fn blend_background(&self, frame: &mut Frame, (x0, y0, w, h): (u32, u32, u32, u32)) {
        let style = &self.style;
        for y in y0..y0 + h {
            for x in x0..x0 + w {
                let overlay = match style.border {
                    Some(border) if style.bounds.on_border(x, y, style.border_thickness) => border,
                    _ => style.fill,
                };
                let px = frame.get_pixel_mut(x, y);
                for c in 0..3 {
                    px.0[c] = blend_channel(overlay[c], px.0[c], style.bg_opacity);
                }
            }
        }
    }
}

fn blend_layer(
    frame: &mut Frame,
    (x0, y0, w, h): (u32, u32, u32, u32),
    layer: &RgbImage,
    alpha: f32,
) {
    for y in 0..h {
        for x in 0..w {
            let over = layer.get_pixel(x, y);
            let px = frame.get_pixel_mut(x0 + x, y0 + y);
            for c in 0..3 {
                px.0[c] = blend_channel(over.0[c], px.0[c], alpha);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn gradient(width: u32, height: u32) -> Frame {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        })
    }

    fn plain_style(bg_opacity: f32) -> OverlayStyle {
        OverlayStyle {
            border: None,
            fill: [10, 20, 30],
            bg_opacity,
            ..OverlayStyle::default()
        }
    }

    fn ts() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 3, 5, 7, 8, 9).unwrap()
    }

    fn inside(b: &OverlayBox, x: u32, y: u32) -> bool {
        x >= b.left && x <= b.right && y >= b.top && y <= b.bottom
    }

    #[test]
    fn blend_endpoints_are_exact() {
        assert_eq!(blend_channel(200, 17, 0.0), 17);
        assert_eq!(blend_channel(200, 17, 1.0), 200);
        assert_eq!(blend_channel(200, 17, 1.7), 200);
    }

    #[test]
    fn zero_background_opacity_is_invisible() {
        let original = gradient(500, 200);
        let mut frame = original.clone();
        Compositor::new(plain_style(0.0), None).composite(&mut frame, "alice", &ts());
        assert_eq!(frame, original);
    }

    #[test]
    fn full_background_opacity_is_fill_color() {
        let mut frame = gradient(500, 200);
        let style = plain_style(1.0);
        let bounds = style.bounds;
        Compositor::new(style, None).composite(&mut frame, "alice", &ts());
        for y in bounds.top..=bounds.bottom {
            for x in bounds.left..=bounds.right {
                assert_eq!(frame.get_pixel(x, y).0, [10, 20, 30]);
            }
        }
    }

    #[test]
    fn pixels_outside_box_untouched() {
        let original = gradient(640, 360);
        let mut frame = original.clone();
        let compositor = Compositor::new(OverlayStyle::default(), None);
        compositor.composite(&mut frame, "alice", &ts());
        assert_eq!(frame.dimensions(), original.dimensions());
        let bounds = compositor.style().bounds;
        for (x, y, px) in frame.enumerate_pixels() {
            if !inside(&bounds, x, y) {
                assert_eq!(px, original.get_pixel(x, y), "pixel {x},{y} changed");
            }
        }
    }

    #[test]
    fn system_font_draws_text_inside_box_only() {
        let Some(font) = load_font(None) else {
            eprintln!("skipping: no system font available");
            return;
        };
        let original = gradient(640, 360);
        let mut boxed = original.clone();
        Compositor::new(OverlayStyle::default(), None).composite(&mut boxed, "alice", &ts());

        let compositor = Compositor::new(OverlayStyle::default(), Some(font));
        assert!(compositor.has_font());
        let mut frame = original.clone();
        compositor.composite(&mut frame, "alice", &ts());

        let bounds = compositor.style().bounds;
        let mut text_pixels = 0;
        for (x, y, px) in frame.enumerate_pixels() {
            if inside(&bounds, x, y) {
                if px != boxed.get_pixel(x, y) {
                    text_pixels += 1;
                }
            } else {
                assert_eq!(px, original.get_pixel(x, y), "pixel {x},{y} changed");
            }
        }
        assert!(text_pixels > 100, "only {text_pixels} pixels carry text");
    }

    #[test]
    fn small_frame_is_clipped_not_resized() {
        let original = gradient(50, 40);
        let mut frame = original.clone();
        Compositor::new(plain_style(1.0), None).composite(&mut frame, "alice", &ts());
        assert_eq!(frame.dimensions(), (50, 40));
        assert_eq!(frame.get_pixel(49, 39).0, [10, 20, 30]);
        assert_eq!(frame.get_pixel(5, 5), original.get_pixel(5, 5));

        let mut tiny = gradient(8, 8);
        let before = tiny.clone();
        Compositor::new(plain_style(1.0), None).composite(&mut tiny, "alice", &ts());
        assert_eq!(tiny, before);
    }

    #[test]
    fn border_drawn_on_box_edge() {
        let mut frame = RgbImage::from_pixel(500, 200, Rgb([50, 50, 50]));
        let style = OverlayStyle {
            bg_opacity: 1.0,
            ..OverlayStyle::default()
        };
        Compositor::new(style, None).composite(&mut frame, "alice", &ts());
        assert_eq!(frame.get_pixel(10, 10).0, [255, 255, 255]);
        assert_eq!(frame.get_pixel(400, 100).0, [255, 255, 255]);
        assert_eq!(frame.get_pixel(200, 50).0, [0, 0, 0]);
    }

    #[test]
    fn text_blends_over_backed_frame() {
        let mut frame = RgbImage::from_pixel(500, 200, Rgb([100, 100, 100]));
        let compositor = Compositor::new(plain_style(0.3), None);
        let style = compositor.style().clone();
        let region = style.bounds.clip(500, 200).unwrap();
        compositor.blend_background(&mut frame, region);

        let (x, y, w, h) = region;
        let mut layer = imageops::crop_imm(&frame, x, y, w, h).to_image();
        layer.put_pixel(5, 5, Rgb([250, 250, 250]));
        blend_layer(&mut frame, region, &layer, 0.7);

        // background: 0.3*fill + 0.7*100, then text: 0.7*250 + 0.3*that
        assert_eq!(frame.get_pixel(15, 15).0, [197, 198, 199]);
        assert_eq!(frame.get_pixel(16, 15).0, [73, 76, 79]);
        assert_eq!(frame.get_pixel(450, 150).0, [100, 100, 100]);
    }

    #[test]
    fn overlay_lines_carry_identity_and_clock() {
        let items = build_overlay(&OverlayStyle::default(), "alice", &ts());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].text, "User: alice");
        assert_eq!(items[1].text, "Time: 2024-03-05 07:08:09");
        assert!(items.iter().all(|i| i.opacity == 0.7));
    }
}
