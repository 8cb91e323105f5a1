use crate::config::OverlayConfig;
use crate::detect::{CycleSummary, Detection, Label};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use rusttype::{Font, Scale};
use std::fs;
use tracing::{debug, warn};

const RED: Rgb<u8> = Rgb([255, 0, 0]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Height of the filled tab above each box
const TAB_HEIGHT: i32 = 20;

pub(crate) const PLACEHOLDER_SIZE: (u32, u32) = (640, 480);

/// DejaVu Sans Mono, bundled so status frames always carry their text
const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/DejaVuSansMono.ttf");

/// Draws detection boxes, labels and status text onto frames.
///
/// The configured TrueType font overrides the bundled one.
pub struct OverlayRenderer {
    font: Option<Font<'static>>,
    font_size: f32,
}

impl OverlayRenderer {
    pub fn from_config(config: &OverlayConfig) -> Self {
        let configured = match fs::read(&config.font_path) {
            Ok(data) => {
                let font = Font::try_from_vec(data);
                if font.is_none() {
                    warn!("Failed to parse font file '{}', using bundled font", config.font_path);
                }
                font
            }
            Err(e) => {
                debug!(
                    "Font file '{}' unavailable ({}), using bundled font",
                    config.font_path, e
                );
                None
            }
        };

        match configured {
            Some(font) => Self {
                font: Some(font),
                font_size: config.font_size,
            },
            None => Self {
                font_size: config.font_size,
                ..Self::embedded()
            },
        }
    }

    /// Renderer using the bundled font
    pub fn embedded() -> Self {
        Self {
            font: embedded_font(),
            font_size: 16.0,
        }
    }

    /// Renderer that never draws text
    #[cfg(test)]
    pub(crate) fn without_font() -> Self {
        Self {
            font: None,
            font_size: 16.0,
        }
    }

    pub fn draw_detections(&self, image: &mut RgbImage, detections: &[Detection]) {
        for detection in detections {
            self.draw_detection(image, detection);
        }
    }

    fn draw_detection(&self, image: &mut RgbImage, detection: &Detection) {
        let color = match detection.label {
            Label::Phone => RED,
            Label::Person => GREEN,
        };

        let Some(rect) = clamp_box(image, detection) else {
            debug!("Skipping degenerate box {:?}", detection);
            return;
        };

        // 2px border
        draw_hollow_rect_mut(image, rect, color);
        if rect.width() > 2 && rect.height() > 2 {
            draw_hollow_rect_mut(
                image,
                Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2),
                color,
            );
        }

        let caption = detection.caption();
        let scale = Scale::uniform(self.font_size);
        let tab_width = match &self.font {
            Some(font) => text_size(scale, font, &caption).0.max(1),
            None => (caption.len() as f32 * self.font_size * 0.5) as i32,
        };
        let tab_top = rect.top() - TAB_HEIGHT;
        if tab_width > 0 {
            draw_filled_rect_mut(
                image,
                Rect::at(rect.left(), tab_top).of_size(tab_width as u32, TAB_HEIGHT as u32),
                color,
            );
        }

        if let Some(font) = &self.font {
            let text_top = tab_top + (TAB_HEIGHT - self.font_size as i32).max(0) / 2;
            draw_text_mut(image, WHITE, rect.left(), text_top, scale, font, &caption);
        }
    }

    /// "Cam: <id> | Persons: P | Phones: Q" in the top-left corner
    pub fn draw_info(&self, image: &mut RgbImage, camera_id: &str, summary: &CycleSummary) {
        let Some(font) = &self.font else {
            return;
        };
        let text = info_line(camera_id, summary);
        let scale = Scale::uniform(self.font_size * 1.25);
        draw_text_mut(image, GREEN, 10, 10, scale, font, &text);
    }

    /// 640x480 black frame with `message` in red
    pub fn placeholder(&self, message: &str) -> RgbImage {
        let (width, height) = PLACEHOLDER_SIZE;
        let mut image = RgbImage::new(width, height);
        if let Some(font) = &self.font {
            let scale = Scale::uniform(self.font_size * 1.5);
            let (_, text_height) = text_size(scale, font, message);
            let y = (height as i32 / 2) - text_height;
            draw_text_mut(&mut image, RED, 30, y, scale, font, message);
        }
        image
    }
}

fn embedded_font() -> Option<Font<'static>> {
    let font = Font::try_from_bytes(EMBEDDED_FONT);
    if font.is_none() {
        warn!("Bundled font failed to parse, overlay text disabled");
    }
    font
}

pub(crate) fn info_line(camera_id: &str, summary: &CycleSummary) -> String {
    format!(
        "Cam: {} | Persons: {} | Phones: {}",
        camera_id, summary.persons, summary.phones
    )
}

/// Box clipped to the image, or `None` if nothing of it is visible
fn clamp_box(image: &RgbImage, detection: &Detection) -> Option<Rect> {
    let max_x = image.width() as i32 - 1;
    let max_y = image.height() as i32 - 1;

    let x1 = detection.x1.min(detection.x2).clamp(0, max_x);
    let x2 = detection.x1.max(detection.x2).clamp(0, max_x);
    let y1 = detection.y1.min(detection.y2).clamp(0, max_y);
    let y2 = detection.y1.max(detection.y2).clamp(0, max_y);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(Rect::at(x1, y1).of_size((x2 - x1 + 1) as u32, (y2 - y1 + 1) as u32))
}
