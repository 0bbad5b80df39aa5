use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use image::RgbImage;
use tracing::{debug, info};

use super::display::{EpaperPanel, RefreshMode};
use crate::config::SimulatorOptions;

/// Panel stand-in for development machines: keeps the last frame in memory
/// and optionally writes it out as PNG on every refresh.
pub struct SimulatorPanel {
    width: u32,
    height: u32,
    output: Option<PathBuf>,
    refresh_delay: Duration,
    pending: Option<RgbImage>,
    shown: Option<RgbImage>,
    refreshes: u64,
}

impl SimulatorPanel {
    pub fn new(options: &SimulatorOptions) -> Self {
        info!(
            width = options.width,
            height = options.height,
            output = ?options.output,
            "using simulated e-paper panel"
        );
        Self {
            width: options.width,
            height: options.height,
            output: options.output.clone(),
            refresh_delay: options.refresh_delay,
            pending: None,
            shown: None,
            refreshes: 0,
        }
    }

    /// Frame currently "on screen".
    pub fn shown(&self) -> Option<&RgbImage> {
        self.shown.as_ref()
    }

    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }
}

impl EpaperPanel for SimulatorPanel {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn set_image(&mut self, image: &RgbImage, saturation: f32) -> Result<()> {
        debug!(saturation, "simulator: frame buffer loaded");
        self.pending = Some(image.clone());
        Ok(())
    }

    fn show(&mut self, mode: RefreshMode) -> Result<()> {
        if !self.refresh_delay.is_zero() {
            thread::sleep(self.refresh_delay);
        }
        if let Some(frame) = self.pending.take() {
            self.shown = Some(frame);
        }
        self.refreshes += 1;
        if let (Some(path), Some(frame)) = (&self.output, &self.shown) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            frame
                .save_with_format(path, image::ImageFormat::Png)
                .with_context(|| format!("failed to write snapshot {}", path.display()))?;
        }
        debug!(?mode, refreshes = self.refreshes, "simulator: refreshed");
        Ok(())
    }
}
