//! The frame's main loop: refresh, select, process, display, wait.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::capabilities::Capabilities;
use crate::catalog::gateway::HttpLibrary;
use crate::catalog::remote::TerminalPrompt;
use crate::catalog::{Catalog, CompositeCatalog, LocalCatalog, RemoteCatalog, Selector};
use crate::config::{Configuration, RemoteOptions};
use crate::events::CatalogChange;
use crate::platform::display::DisplayController;
use crate::platform::placeholder::PlaceholderFonts;
use crate::processing::{PhotoProcessor, ProcessingSettings};

/// Pending filesystem notifications kept before the loop drains them.
pub const CHANGE_QUEUE: usize = 16;

/// Shortest wait between cancellation checks.
const MIN_TICK: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
pub struct FrameSettings {
    pub refresh_interval: Duration,
    /// Granularity of cancellation checks while waiting.
    pub tick: Duration,
    /// Folder named on the placeholder screen.
    pub local_path: PathBuf,
}

impl FrameSettings {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            refresh_interval: cfg.display.refresh_interval,
            tick: Duration::from_secs(1),
            local_path: cfg.photo.local_path.clone(),
        }
    }
}

/// What a single cycle ended up doing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    Displayed(PathBuf),
    /// The catalog was empty and the placeholder was drawn.
    Placeholder,
    /// The catalog is still empty; the placeholder is already on screen.
    Idle,
    /// This cycle's photo could not be shown.
    Skipped,
}

pub struct Frame {
    catalog: Catalog,
    processor: PhotoProcessor,
    display: Arc<DisplayController>,
    changes: Option<Receiver<CatalogChange>>,
    fonts: Option<PlaceholderFonts>,
    settings: FrameSettings,
    placeholder_shown: bool,
}

impl Frame {
    pub fn new(
        catalog: Catalog,
        processor: PhotoProcessor,
        display: Arc<DisplayController>,
        settings: FrameSettings,
    ) -> Self {
        Self {
            catalog,
            processor,
            display,
            changes: None,
            fonts: None,
            settings,
            placeholder_shown: false,
        }
    }

    /// Filesystem notifications to drain between cycles.
    pub fn with_changes(mut self, changes: Receiver<CatalogChange>) -> Self {
        self.changes = Some(changes);
        self
    }

    pub fn with_fonts(mut self, fonts: Option<PlaceholderFonts>) -> Self {
        self.fonts = fonts;
        self
    }

    pub fn placeholder_shown(&self) -> bool {
        self.placeholder_shown
    }

    /// One refresh → select → process → display pass. Per-photo failures
    /// are logged and reported as [`CycleOutcome::Skipped`].
    pub fn run_cycle(&mut self) -> CycleOutcome {
        self.drain_changes();
        let count = self.catalog.refresh();
        if count == 0 {
            return self.show_placeholder_once();
        }

        let Some(index) = self.catalog.select() else {
            return CycleOutcome::Skipped;
        };
        let Some(path) = self.catalog.get_path(index) else {
            warn!(index, "selected photo is unavailable");
            return CycleOutcome::Skipped;
        };
        info!(index, count, path = %path.display(), "displaying photo");

        let image = match self.processor.process_file(&path) {
            Ok(image) => image,
            Err(err) => {
                warn!(path = %path.display(), "failed to process photo: {err}");
                return CycleOutcome::Skipped;
            }
        };
        match self.display.update(&image, false) {
            Ok(mode) => {
                debug!(?mode, "photo shown");
                self.placeholder_shown = false;
                CycleOutcome::Displayed(path)
            }
            Err(err) => {
                error!(path = %path.display(), "failed to display photo: {err:#}");
                CycleOutcome::Skipped
            }
        }
    }

    fn show_placeholder_once(&mut self) -> CycleOutcome {
        if self.placeholder_shown {
            debug!("no photos; placeholder already on screen");
            return CycleOutcome::Idle;
        }
        warn!("no photos available from any source");
        match self
            .display
            .show_placeholder(self.fonts.as_ref(), &self.settings.local_path)
        {
            Ok(_) => {
                self.placeholder_shown = true;
                CycleOutcome::Placeholder
            }
            Err(err) => {
                error!("failed to show placeholder: {err:#}");
                CycleOutcome::Skipped
            }
        }
    }

    /// Empties the change queue; `true` when anything was pending.
    fn drain_changes(&mut self) -> bool {
        let Some(rx) = &self.changes else {
            return false;
        };
        let mut pending = false;
        for change in rx.try_iter() {
            debug!(kind = ?change.kind, paths = ?change.paths, "catalog change");
            pending = true;
        }
        pending
    }

    /// Cycles until `cancel` fires. Cancellation is checked every tick;
    /// a refresh in progress always completes first.
    #[instrument(name = "frame", skip_all)]
    pub fn run(mut self, cancel: CancellationToken) -> Result<()> {
        info!(
            interval = %humantime::format_duration(self.settings.refresh_interval),
            "frame loop started"
        );
        'outer: while !cancel.is_cancelled() {
            match self.run_cycle() {
                CycleOutcome::Displayed(_) | CycleOutcome::Placeholder => {}
                outcome => debug!(?outcome, "cycle finished"),
            }

            let tick = self.settings.tick.max(MIN_TICK);
            let mut waited = Duration::ZERO;
            while waited < self.settings.refresh_interval {
                if cancel.is_cancelled() {
                    break 'outer;
                }
                thread::sleep(tick);
                waited += tick;
                if self.drain_changes() {
                    let count = self.catalog.refresh();
                    if self.placeholder_shown && count > 0 {
                        info!(count, "photos appeared; leaving placeholder early");
                        break;
                    }
                }
            }
        }
        self.catalog.stop_watching();
        info!("frame loop stopped");
        Ok(())
    }
}

/// Builds the catalog and processor for `cfg` and runs the loop until
/// `cancel` fires. Must run on a blocking thread: the remote gateway's
/// HTTP client cannot be created or dropped inside the async runtime.
pub fn run_configured(
    cfg: &Configuration,
    caps: Capabilities,
    display: Arc<DisplayController>,
    fonts: Option<PlaceholderFonts>,
    cancel: CancellationToken,
) -> Result<()> {
    let (width, height) = display
        .resolution()
        .context("display must be initialized before the frame loop starts")?;
    let (change_tx, change_rx) = crossbeam_channel::bounded(CHANGE_QUEUE);
    let catalog = build_catalog(cfg, caps, Some(change_tx))?;
    let processor =
        PhotoProcessor::new(ProcessingSettings::new(width, height, &cfg.processing), caps);
    Frame::new(catalog, processor, display, FrameSettings::from_config(cfg))
        .with_changes(change_rx)
        .with_fonts(fonts)
        .run(cancel)
}

/// Builds the composite catalog from configuration. When `changes` is set
/// and watching is enabled, the local folder reports changes through it.
pub fn build_catalog(
    cfg: &Configuration,
    caps: Capabilities,
    changes: Option<Sender<CatalogChange>>,
) -> Result<Catalog> {
    let selector = || match cfg.photo.selection_seed {
        Some(seed) => Selector::with_seed(cfg.photo.selection_mode, seed),
        None => Selector::new(cfg.photo.selection_mode),
    };

    let mut local = LocalCatalog::new(&cfg.photo.local_path, cfg.photo.recursive, caps, selector());
    if cfg.photo.watch
        && let Some(tx) = changes
        && let Err(err) = local.start_watching(tx)
    {
        warn!("failed to start file watcher: {err:#}");
    }
    let mut members = vec![Catalog::Local(local)];

    if cfg.remote.enabled {
        members.push(Catalog::Remote(build_remote(&cfg.remote, caps, selector())?));
    }
    Ok(Catalog::Composite(CompositeCatalog::new(members, selector())))
}

pub fn build_remote(
    remote: &RemoteOptions,
    caps: Capabilities,
    selector: Selector,
) -> Result<RemoteCatalog> {
    let account = remote.account.clone().unwrap_or_default();
    let endpoint = remote
        .endpoint
        .as_deref()
        .context("remote.endpoint is not configured")?;
    let library = HttpLibrary::new(endpoint)?;
    Ok(RemoteCatalog::new(
        account,
        &remote.session_path,
        &remote.cache_path,
        caps,
        Box::new(library),
        Box::new(TerminalPrompt),
        selector,
    ))
}
