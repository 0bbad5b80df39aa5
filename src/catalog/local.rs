use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use crossbeam_channel::Sender;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

use super::selection::{SelectionMode, Selector};
use super::watch::DirectoryWatcher;
use crate::capabilities::Capabilities;
use crate::events::CatalogChange;

/// Photos in a folder on disk, sorted by path.
pub struct LocalCatalog {
    root: PathBuf,
    recursive: bool,
    caps: Capabilities,
    photos: Vec<PathBuf>,
    selector: Selector,
    watcher: Option<DirectoryWatcher>,
}

impl LocalCatalog {
    /// Creates `root` if needed and performs the initial scan.
    pub fn new(root: impl Into<PathBuf>, recursive: bool, caps: Capabilities, selector: Selector) -> Self {
        let root = root.into();
        if let Err(err) = fs::create_dir_all(&root) {
            warn!(root = %root.display(), "could not create photo folder: {err}");
        }
        let mut catalog = Self {
            root,
            recursive,
            caps,
            photos: Vec::new(),
            selector,
            watcher: None,
        };
        catalog.refresh();
        catalog
    }

    /// Rescans the folder, replacing the previous list. A failed scan
    /// leaves the catalog empty.
    pub fn refresh(&mut self) -> usize {
        match scan(&self.root, self.recursive, self.caps) {
            Ok(photos) => {
                self.photos = photos;
                info!(root = %self.root.display(), count = self.photos.len(), "local photos scanned");
            }
            Err(err) => {
                self.photos.clear();
                error!(root = %self.root.display(), "error scanning photo folder: {err}");
            }
        }
        self.photos.len()
    }

    pub fn count(&self) -> usize {
        self.photos.len()
    }

    pub fn get_path(&self, index: usize) -> Option<PathBuf> {
        self.photos.get(index).cloned()
    }

    pub fn load(&self, index: usize) -> Option<Vec<u8>> {
        let path = self.photos.get(index)?;
        match fs::read(path) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                error!(path = %path.display(), "failed to read photo: {err}");
                None
            }
        }
    }

    pub fn select(&mut self) -> Option<usize> {
        self.selector.select(self.photos.len())
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selector.mode()
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selector.set_mode(mode);
    }

    /// Starts forwarding filesystem changes to `tx`. No-op when already
    /// watching.
    pub fn start_watching(&mut self, tx: Sender<CatalogChange>) -> Result<()> {
        if self.watcher.is_some() {
            return Ok(());
        }
        self.watcher = Some(DirectoryWatcher::start(&self.root, self.recursive, tx)?);
        Ok(())
    }

    /// Safe to call repeatedly.
    pub fn stop_watching(&mut self) {
        if self.watcher.take().is_some() {
            info!(root = %self.root.display(), "stopped file watcher");
        }
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.is_some()
    }
}

fn scan(root: &Path, recursive: bool, caps: Capabilities) -> Result<Vec<PathBuf>> {
    let mut walker = WalkDir::new(root).follow_links(true);
    if !recursive {
        walker = walker.max_depth(1);
    }
    let mut photos = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // an unreadable root fails the whole scan
            Err(err) if err.depth() == 0 => return Err(err.into()),
            Err(err) => {
                debug!("skipping unreadable entry: {err}");
                continue;
            }
        };
        if entry.file_type().is_file() && is_photo(entry.path(), caps) {
            photos.push(entry.into_path());
        }
    }
    photos.sort();
    Ok(photos)
}

fn is_photo(path: &Path, caps: Capabilities) -> bool {
    path.extension()
        .and_then(OsStr::to_str)
        .is_some_and(|ext| caps.supports_extension(ext))
}
