use image::{RgbImage, imageops};

use crate::config::PortraitBias;

/// Width/height ratio of the frame's panels.
pub const DEFAULT_TARGET_RATIO: f64 = 4.0 / 3.0;
/// Ratios this close to the target are left alone.
pub const RATIO_TOLERANCE: f64 = 0.01;
/// Below this width/height ratio an image counts as portrait.
pub const PORTRAIT_RATIO: f64 = 0.8;

/// Crop rectangle in source pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Where to cut a `width`x`height` image to reach `target_ratio`, or `None`
/// when the ratio is already within [`RATIO_TOLERANCE`].
///
/// Wider images lose equal strips left and right. Taller images lose rows:
/// portraits with a `Top` bias keep the top band, everything else is centred.
pub fn crop_rect(
    width: u32,
    height: u32,
    target_ratio: f64,
    bias: PortraitBias,
) -> Option<CropRect> {
    if width == 0 || height == 0 {
        return None;
    }
    let ratio = f64::from(width) / f64::from(height);
    if (ratio - target_ratio).abs() < RATIO_TOLERANCE {
        return None;
    }

    if ratio > target_ratio {
        let new_width = ((f64::from(height) * target_ratio) as u32).clamp(1, width);
        Some(CropRect {
            x: (width - new_width) / 2,
            y: 0,
            width: new_width,
            height,
        })
    } else {
        let new_height = ((f64::from(width) / target_ratio) as u32).clamp(1, height);
        let y = if bias == PortraitBias::Top && ratio < PORTRAIT_RATIO {
            0
        } else {
            (height - new_height) / 2
        };
        Some(CropRect {
            x: 0,
            y,
            width,
            height: new_height,
        })
    }
}

pub fn smart_crop(image: &RgbImage, target_ratio: f64, bias: PortraitBias) -> RgbImage {
    match crop_rect(image.width(), image.height(), target_ratio, bias) {
        Some(rect) => {
            imageops::crop_imm(image, rect.x, rect.y, rect.width, rect.height).to_image()
        }
        None => image.clone(),
    }
}
