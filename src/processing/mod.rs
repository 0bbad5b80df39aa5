//! Turns arbitrary photos into panel-ready RGB frames:
//! crop to the panel ratio, normalize colour to sRGB, resize, enhance.

pub mod color;
pub mod crop;
pub mod enhance;
pub mod loader;

use std::path::Path;

use anyhow::{Context, Result};
use fast_image_resize as fir;
use image::{RgbImage, imageops};
use tracing::{debug, info, warn};

use crate::capabilities::Capabilities;
use crate::config::{PortraitBias, ProcessingOptions};
use crate::error::LoadError;

pub use loader::SourceImage;

/// Everything the pipeline needs to know about its target.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProcessingSettings {
    pub width: u32,
    pub height: u32,
    pub saturation: f32,
    pub contrast: f32,
    pub portrait_bias: PortraitBias,
}

impl ProcessingSettings {
    pub fn new(width: u32, height: u32, options: &ProcessingOptions) -> Self {
        Self {
            width,
            height,
            saturation: options.saturation,
            contrast: options.contrast,
            portrait_bias: options.portrait_bias,
        }
    }

    /// Width/height ratio of the target resolution.
    pub fn target_ratio(&self) -> f64 {
        if self.height == 0 {
            return crop::DEFAULT_TARGET_RATIO;
        }
        f64::from(self.width) / f64::from(self.height)
    }
}

pub struct PhotoProcessor {
    settings: ProcessingSettings,
    caps: Capabilities,
}

impl PhotoProcessor {
    pub fn new(settings: ProcessingSettings, caps: Capabilities) -> Self {
        Self { settings, caps }
    }

    pub fn load(&self, path: &Path) -> Result<SourceImage, LoadError> {
        loader::load_file(path, self.caps)
    }

    /// Runs the pipeline on an already decoded image. Never fails.
    pub fn process(&self, source: SourceImage) -> RgbImage {
        let s = &self.settings;
        let (src_w, src_h) = source.dimensions();
        let cropped = crop::smart_crop(&source.pixels, s.target_ratio(), s.portrait_bias);
        let srgb = color::normalize_to_srgb(cropped, source.icc_profile.as_deref());
        let resized = resize_rgb(&srgb, s.width, s.height);
        let out = enhance::enhance_for_epaper(resized, s.saturation, s.contrast);
        debug!(
            src_w,
            src_h,
            width = out.width(),
            height = out.height(),
            "processed photo"
        );
        out
    }

    pub fn process_file(&self, path: &Path) -> Result<RgbImage, LoadError> {
        let source = self.load(path)?;
        Ok(self.process(source))
    }

    /// Processes `input` and writes the result as PNG, for previewing
    /// without a panel.
    pub fn process_and_save(&self, input: &Path, output: &Path) -> Result<()> {
        let image = self
            .process_file(input)
            .with_context(|| format!("failed to load {}", input.display()))?;
        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        image
            .save_with_format(output, image::ImageFormat::Png)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!(input = %input.display(), output = %output.display(), "saved processed photo");
        Ok(())
    }
}

/// Lanczos3 resize to exactly `width`x`height`.
pub fn resize_rgb(source: &RgbImage, width: u32, height: u32) -> RgbImage {
    if source.dimensions() == (width, height) || width == 0 || height == 0 {
        return source.clone();
    }
    match fir_resize(source, width, height) {
        Ok(out) => out,
        Err(err) => {
            warn!("fast resize failed: {err:#}; using image crate fallback");
            imageops::resize(source, width, height, imageops::FilterType::Lanczos3)
        }
    }
}

fn fir_resize(source: &RgbImage, width: u32, height: u32) -> Result<RgbImage> {
    let src_view = fir::images::ImageRef::new(
        source.width(),
        source.height(),
        source.as_raw(),
        fir::PixelType::U8x3,
    )
    .context("failed to create source view for resize")?;
    let mut dst_image = fir::images::Image::new(width, height, fir::PixelType::U8x3);
    let options =
        fir::ResizeOptions::new().resize_alg(fir::ResizeAlg::Convolution(fir::FilterType::Lanczos3));
    let mut resizer = fir::Resizer::new();
    resizer
        .resize(&src_view, &mut dst_image, Some(&options))
        .context("resize failed")?;
    RgbImage::from_raw(width, height, dst_image.into_vec())
        .ok_or_else(|| anyhow::anyhow!("failed to construct resized RGB image"))
}
