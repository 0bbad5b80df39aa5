//! Owner of the physical e-paper panel.
//!
//! Panel detection is retried with exponential back-off; so is every
//! physical refresh. Refreshes take tens of seconds, so all frame-buffer
//! and refresh operations go through one session lock and never overlap.
//! Detection uses its own lock.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};
use tracing::{debug, error, info, warn};

use super::placeholder::{self, PlaceholderFonts};
use crate::error::DisplayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshMode {
    /// Slow full waveform; clears ghosting.
    Full,
    /// Fast update that accumulates ghosting.
    Partial,
}

/// Panel driver. Quantization and dithering to the panel palette happen
/// behind `set_image`.
pub trait EpaperPanel: Send {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    /// Loads the frame buffer; `saturation` blends between the muted and
    /// saturated palettes.
    fn set_image(&mut self, image: &RgbImage, saturation: f32) -> Result<()>;
    /// Blocks for the duration of the physical refresh.
    fn show(&mut self, mode: RefreshMode) -> Result<()>;
}

/// Auto-detects the attached panel.
pub type PanelProbe = Arc<dyn Fn() -> Result<Box<dyn EpaperPanel>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Sleep after failed attempt `attempt` (0-based): base, 2*base, 4*base...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(1u32 << attempt.min(16))
    }

    fn run<T>(&self, what: &str, mut op: impl FnMut() -> Result<T>) -> Result<T, anyhow::Error> {
        let attempts = self.attempts.max(1);
        let mut attempt = 0;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt + 1 >= attempts => return Err(err),
                Err(err) => {
                    let delay = self.delay_after(attempt);
                    warn!(attempt = attempt + 1, attempts, ?delay, "{what} failed: {err:#}; retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Uninitialized,
    Initializing,
    Ready,
}

struct Session {
    panel: Box<dyn EpaperPanel>,
    width: u32,
    height: u32,
    update_count: u64,
    saturation: f32,
}

pub struct DisplayController {
    probe: PanelProbe,
    retry: RetryPolicy,
    full_refresh_every: u64,
    init: Mutex<InitState>,
    session: Mutex<Option<Session>>,
    default_saturation: f32,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DisplayController {
    pub fn new(probe: PanelProbe, full_refresh_every: u64, saturation: f32) -> Self {
        Self {
            probe,
            retry: RetryPolicy::default(),
            full_refresh_every: full_refresh_every.max(1),
            init: Mutex::new(InitState::Uninitialized),
            session: Mutex::new(None),
            default_saturation: saturation.clamp(0.0, 1.0),
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn state(&self) -> InitState {
        *lock(&self.init)
    }

    /// Detects the panel, retrying per the [`RetryPolicy`]. Returns the
    /// panel resolution; calling again once ready is a no-op.
    pub fn initialize(&self) -> Result<(u32, u32), DisplayError> {
        let mut state = lock(&self.init);
        if *state == InitState::Ready
            && let Some(resolution) = self.resolution()
        {
            return Ok(resolution);
        }
        *state = InitState::Initializing;
        info!("detecting e-paper panel");
        let probe = Arc::clone(&self.probe);
        match self.retry.run("panel detection", || probe()) {
            Ok(panel) => {
                let (width, height) = (panel.width(), panel.height());
                *lock(&self.session) = Some(Session {
                    panel,
                    width,
                    height,
                    update_count: 0,
                    saturation: self.default_saturation,
                });
                *state = InitState::Ready;
                info!(width, height, "display initialized");
                Ok((width, height))
            }
            Err(source) => {
                *state = InitState::Uninitialized;
                error!("failed to initialize display: {source:#}");
                Err(DisplayError::InitExhausted {
                    attempts: self.retry.attempts.max(1),
                    source,
                })
            }
        }
    }

    pub fn resolution(&self) -> Option<(u32, u32)> {
        lock(&self.session).as_ref().map(|s| (s.width, s.height))
    }

    pub fn update_count(&self) -> u64 {
        lock(&self.session).as_ref().map_or(0, |s| s.update_count)
    }

    /// Default palette blend for subsequent images, clamped to 0.0..=1.0.
    pub fn set_saturation(&self, saturation: f32) -> Result<(), DisplayError> {
        let mut guard = lock(&self.session);
        let session = guard.as_mut().ok_or(DisplayError::NotInitialized)?;
        session.saturation = saturation.clamp(0.0, 1.0);
        debug!(saturation = session.saturation, "display saturation set");
        Ok(())
    }

    /// Restarts the full-refresh cadence; the next show is a full refresh.
    pub fn reset_update_count(&self) {
        if let Some(session) = lock(&self.session).as_mut() {
            session.update_count = 0;
            debug!("update count reset");
        }
    }

    /// Loads `image` into the panel. `saturation` overrides the default
    /// blend for this image only.
    pub fn set_image(&self, image: &RgbImage, saturation: Option<f32>) -> Result<(), DisplayError> {
        let mut guard = lock(&self.session);
        let session = guard.as_mut().ok_or(DisplayError::NotInitialized)?;
        load_image(session, image, saturation)
    }

    /// Refreshes the panel with whatever was last loaded.
    pub fn show(&self, force_full_refresh: bool) -> Result<RefreshMode, DisplayError> {
        let mut guard = lock(&self.session);
        let session = guard.as_mut().ok_or(DisplayError::NotInitialized)?;
        self.refresh(session, force_full_refresh)
    }

    /// `set_image` followed by `show` without releasing the session.
    pub fn update(&self, image: &RgbImage, force_full_refresh: bool) -> Result<RefreshMode, DisplayError> {
        let mut guard = lock(&self.session);
        let session = guard.as_mut().ok_or(DisplayError::NotInitialized)?;
        load_image(session, image, None)?;
        self.refresh(session, force_full_refresh)
    }

    /// Paints the panel white with a full refresh.
    pub fn clear(&self) -> Result<(), DisplayError> {
        let (width, height) = self.resolution().ok_or(DisplayError::NotInitialized)?;
        info!("clearing display");
        self.update(&RgbImage::from_pixel(width, height, Rgb([255, 255, 255])), true)?;
        Ok(())
    }

    /// Draws the "no photos" screen with a full refresh.
    pub fn show_placeholder(
        &self,
        fonts: Option<&PlaceholderFonts>,
        local_path: &Path,
    ) -> Result<RefreshMode, DisplayError> {
        let (width, height) = self.resolution().ok_or(DisplayError::NotInitialized)?;
        info!("showing no-photos placeholder");
        let image = placeholder::render_placeholder(width, height, fonts, local_path);
        self.update(&image, true)
    }

    fn refresh(&self, session: &mut Session, force: bool) -> Result<RefreshMode, DisplayError> {
        let mode = if force || session.update_count % self.full_refresh_every == 0 {
            RefreshMode::Full
        } else {
            RefreshMode::Partial
        };
        debug!(?mode, update_count = session.update_count, "refreshing display");
        let panel = &mut session.panel;
        match self.retry.run("display refresh", || panel.show(mode)) {
            Ok(()) => {
                session.update_count += 1;
                info!(?mode, update_count = session.update_count, "display updated");
                Ok(mode)
            }
            Err(source) => {
                error!("display refresh failed: {source:#}");
                Err(DisplayError::RefreshExhausted {
                    attempts: self.retry.attempts.max(1),
                    source,
                })
            }
        }
    }
}

fn load_image(session: &mut Session, image: &RgbImage, saturation: Option<f32>) -> Result<(), DisplayError> {
    let expected = (session.width, session.height);
    if image.dimensions() != expected {
        return Err(DisplayError::ResolutionMismatch {
            expected,
            actual: image.dimensions(),
        });
    }
    let saturation = saturation.map_or(session.saturation, |s| s.clamp(0.0, 1.0));
    session
        .panel
        .set_image(image, saturation)
        .map_err(DisplayError::Device)
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Default)]
    struct Log {
        shows: Vec<RefreshMode>,
        saturations: Vec<f32>,
    }

    struct StubPanel {
        log: Arc<Mutex<Log>>,
        fail_shows: Arc<AtomicU32>,
    }

    impl EpaperPanel for StubPanel {
        fn width(&self) -> u32 {
            4
        }
        fn height(&self) -> u32 {
            3
        }
        fn set_image(&mut self, _image: &RgbImage, saturation: f32) -> Result<()> {
            self.log.lock().unwrap().saturations.push(saturation);
            Ok(())
        }
        fn show(&mut self, mode: RefreshMode) -> Result<()> {
            if self.fail_shows.load(Ordering::SeqCst) > 0 {
                self.fail_shows.fetch_sub(1, Ordering::SeqCst);
                bail!("busy pin stuck");
            }
            self.log.lock().unwrap().shows.push(mode);
            Ok(())
        }
    }

    const NO_WAIT: RetryPolicy = RetryPolicy {
        attempts: 3,
        base_delay: Duration::ZERO,
    };

    fn controller(every: u64) -> (DisplayController, Arc<Mutex<Log>>, Arc<AtomicU32>) {
        let log = Arc::new(Mutex::new(Log::default()));
        let fail = Arc::new(AtomicU32::new(0));
        let (l, f) = (Arc::clone(&log), Arc::clone(&fail));
        let probe: PanelProbe = Arc::new(move || -> Result<Box<dyn EpaperPanel>> {
            Ok(Box::new(StubPanel {
                log: Arc::clone(&l),
                fail_shows: Arc::clone(&f),
            }) as Box<dyn EpaperPanel>)
        });
        let ctl = DisplayController::new(probe, every, 0.5).with_retry(NO_WAIT);
        (ctl, log, fail)
    }

    #[test]
    fn backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_after(0), Duration::from_secs(1));
        assert_eq!(policy.delay_after(2), Duration::from_secs(4));
    }

    #[test]
    fn operations_require_initialization() {
        let (ctl, _, _) = controller(10);
        assert_eq!(ctl.state(), InitState::Uninitialized);
        assert!(matches!(ctl.show(false), Err(DisplayError::NotInitialized)));
        assert!(matches!(ctl.clear(), Err(DisplayError::NotInitialized)));
        assert_eq!(ctl.initialize().unwrap(), (4, 3));
        assert_eq!(ctl.state(), InitState::Ready);
    }

    #[test]
    fn detection_retries_then_gives_up() {
        let attempts = Arc::new(AtomicU32::new(0));
        let seen = Arc::clone(&attempts);
        let probe: PanelProbe = Arc::new(move || -> Result<Box<dyn EpaperPanel>> {
            seen.fetch_add(1, Ordering::SeqCst);
            bail!("no panel on SPI bus")
        });
        let ctl = DisplayController::new(probe, 10, 0.5).with_retry(NO_WAIT);
        let err = ctl.initialize().unwrap_err();
        assert!(matches!(err, DisplayError::InitExhausted { attempts: 3, .. }));
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
        assert_eq!(ctl.state(), InitState::Uninitialized);
    }

    #[test]
    fn saturation_is_clamped_and_resolution_checked() {
        let (ctl, log, _) = controller(10);
        ctl.initialize().unwrap();
        ctl.set_image(&RgbImage::new(4, 3), Some(1.7)).unwrap();
        ctl.set_saturation(-2.0).unwrap();
        ctl.set_image(&RgbImage::new(4, 3), None).unwrap();
        assert_eq!(log.lock().unwrap().saturations, vec![1.0, 0.0]);

        let err = ctl.set_image(&RgbImage::new(8, 3), None).unwrap_err();
        assert!(matches!(err, DisplayError::ResolutionMismatch { expected: (4, 3), .. }));
    }

    #[test]
    fn transient_refresh_failure_is_retried() {
        let (ctl, log, fail) = controller(10);
        ctl.initialize().unwrap();
        fail.store(2, Ordering::SeqCst);
        assert_eq!(ctl.update(&RgbImage::new(4, 3), false).unwrap(), RefreshMode::Full);
        assert_eq!(ctl.update_count(), 1);
        assert_eq!(log.lock().unwrap().shows.len(), 1);
    }

    #[test]
    fn reset_restarts_cadence() {
        let (ctl, _, _) = controller(3);
        ctl.initialize().unwrap();
        let img = RgbImage::new(4, 3);
        ctl.update(&img, false).unwrap();
        assert_eq!(ctl.update(&img, false).unwrap(), RefreshMode::Partial);
        ctl.reset_update_count();
        assert_eq!(ctl.update(&img, false).unwrap(), RefreshMode::Full);
    }
}
