//! Draws face boxes and name labels onto full-resolution photos.

use crate::types::FaceLocation;
use ab_glyph::{FontVec, PxScale};
use image::codecs::jpeg::JpegEncoder;
use image::{ImageError, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use std::path::Path;

const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_THICKNESS: i32 = 2;
const LABEL_SCALE: f32 = 24.0;
/// Gap between the label baseline and the top edge of the box.
const LABEL_OFFSET: i32 = 10;
const JPEG_QUALITY: u8 = 90;

pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    /// Load the label font. Without a usable font only boxes are drawn.
    pub fn new(font_path: Option<&Path>) -> Self {
        let Some(path) = font_path else {
            return Self::without_labels();
        };

        let font = std::fs::read(path)
            .map_err(|e| e.to_string())
            .and_then(|bytes| FontVec::try_from_vec(bytes).map_err(|e| e.to_string()));

        match font {
            Ok(font) => {
                tracing::info!(path = %path.display(), "label font loaded");
                Self { font: Some(font) }
            }
            Err(err) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "label font unavailable; drawing boxes only"
                );
                Self::without_labels()
            }
        }
    }

    pub fn without_labels() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw every face box with its label.
    pub fn annotate(&self, image: &mut RgbImage, faces: &[(FaceLocation, &str)]) {
        for (location, label) in faces {
            draw_box(image, location);
            if let Some(font) = &self.font {
                let scale = PxScale::from(LABEL_SCALE);
                let (_, text_h) = text_size(scale, font, label);
                let baseline = location.top as i32 - LABEL_OFFSET;
                let y = (baseline - text_h as i32).max(0);
                let x = location.left as i32;
                draw_text_mut(image, BOX_COLOR, x, y, scale, font, label);
            }
        }
    }
}

fn draw_box(image: &mut RgbImage, location: &FaceLocation) {
    let width = location.width() as i32;
    let height = location.height() as i32;

    for inset in 0..BOX_THICKNESS {
        let w = width - 2 * inset;
        let h = height - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(location.left as i32 + inset, location.top as i32 + inset)
            .of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, BOX_COLOR);
    }
}

/// Encode an image as JPEG bytes.
pub fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, ImageError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf)
}
