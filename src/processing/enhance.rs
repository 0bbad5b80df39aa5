//! Tone adjustments for e-paper, which renders with less contrast and
//! saturation than an LCD. Each adjustment blends the image with a
//! "degenerate" version of itself: `out = degenerate + factor * (img - degenerate)`.

use image::{Rgb, RgbImage};

/// Fixed sharpening boost compensating for resampling blur.
pub const SHARPNESS_BOOST: f32 = 1.2;

/// Applies saturation and contrast (skipped when exactly 1.0), then the
/// fixed sharpening boost.
pub fn enhance_for_epaper(image: RgbImage, saturation: f32, contrast: f32) -> RgbImage {
    let mut image = image;
    if saturation != 1.0 {
        image = adjust_saturation(&image, saturation);
    }
    if contrast != 1.0 {
        image = adjust_contrast(&image, contrast);
    }
    sharpen(&image, SHARPNESS_BOOST)
}

/// Blends towards the per-pixel grey value.
pub fn adjust_saturation(image: &RgbImage, factor: f32) -> RgbImage {
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let px = image.get_pixel(x, y);
        let grey = f32::from(luma(px));
        blend_pixel(px, [grey; 3], factor)
    })
}

/// Blends towards a flat image at the mean grey level.
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let count = u64::from(image.width()) * u64::from(image.height());
    if count == 0 {
        return image.clone();
    }
    let total: u64 = image.pixels().map(|px| u64::from(luma(px))).sum();
    let mean = (total as f64 / count as f64 + 0.5).floor() as f32;
    RgbImage::from_fn(image.width(), image.height(), |x, y| {
        blend_pixel(image.get_pixel(x, y), [mean; 3], factor)
    })
}

/// Blends away from a 3x3 smoothed copy; border pixels are left untouched.
pub fn sharpen(image: &RgbImage, factor: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    if width < 3 || height < 3 || factor == 1.0 {
        return image.clone();
    }
    let mut out = image.clone();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let mut smoothed = [0f32; 3];
            for dy in 0..3 {
                for dx in 0..3 {
                    let weight = if dx == 1 && dy == 1 { 5.0 } else { 1.0 };
                    let px = image.get_pixel(x + dx - 1, y + dy - 1);
                    for (acc, channel) in smoothed.iter_mut().zip(px.0) {
                        *acc += weight * f32::from(channel);
                    }
                }
            }
            let smoothed = smoothed.map(|sum| (sum / 13.0).round());
            out.put_pixel(x, y, blend_pixel(image.get_pixel(x, y), smoothed, factor));
        }
    }
    out
}

// ITU-R 601-2 luma, as used for greyscale conversion.
fn luma(px: &Rgb<u8>) -> u8 {
    let [r, g, b] = px.0;
    ((u32::from(r) * 299 + u32::from(g) * 587 + u32::from(b) * 114 + 500) / 1000) as u8
}

fn blend_pixel(px: &Rgb<u8>, degenerate: [f32; 3], factor: f32) -> Rgb<u8> {
    let mut out = [0u8; 3];
    for ((dst, src), base) in out.iter_mut().zip(px.0).zip(degenerate) {
        let value = base + factor * (f32::from(src) - base);
        *dst = value.round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}
