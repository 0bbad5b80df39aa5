//! Photo sources behind a single indexable interface.
//!
//! Indices are only valid until the next `refresh()` of the catalog that
//! produced them.

pub mod composite;
pub mod gateway;
pub mod local;
pub mod remote;
pub mod selection;
pub mod watch;

use std::path::PathBuf;

pub use composite::CompositeCatalog;
pub use local::LocalCatalog;
pub use remote::RemoteCatalog;
pub use selection::{SelectionMode, Selector};

pub enum Catalog {
    Local(LocalCatalog),
    Remote(RemoteCatalog),
    Composite(CompositeCatalog),
}

impl Catalog {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Local(_) => "local",
            Self::Remote(_) => "remote",
            Self::Composite(_) => "composite",
        }
    }

    /// Re-enumerates the source and returns the new count.
    pub fn refresh(&mut self) -> usize {
        match self {
            Self::Local(c) => c.refresh(),
            Self::Remote(c) => c.refresh(),
            Self::Composite(c) => c.refresh(),
        }
    }

    pub fn count(&self) -> usize {
        match self {
            Self::Local(c) => c.count(),
            Self::Remote(c) => c.count(),
            Self::Composite(c) => c.count(),
        }
    }

    /// Local file for `index`; `None` when out of range or unavailable.
    pub fn get_path(&mut self, index: usize) -> Option<PathBuf> {
        match self {
            Self::Local(c) => c.get_path(index),
            Self::Remote(c) => c.get_path(index),
            Self::Composite(c) => c.get_path(index),
        }
    }

    pub fn load(&mut self, index: usize) -> Option<Vec<u8>> {
        match self {
            Self::Local(c) => c.load(index),
            Self::Remote(c) => c.load(index),
            Self::Composite(c) => c.load(index),
        }
    }

    pub fn select(&mut self) -> Option<usize> {
        match self {
            Self::Local(c) => c.select(),
            Self::Remote(c) => c.select(),
            Self::Composite(c) => c.select(),
        }
    }

    pub fn selection_mode(&self) -> SelectionMode {
        match self {
            Self::Local(c) => c.selection_mode(),
            Self::Remote(c) => c.selection_mode(),
            Self::Composite(c) => c.selection_mode(),
        }
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        match self {
            Self::Local(c) => c.set_selection_mode(mode),
            Self::Remote(c) => c.set_selection_mode(mode),
            Self::Composite(c) => c.set_selection_mode(mode),
        }
    }

    /// Stops every filesystem watcher in this catalog tree.
    pub fn stop_watching(&mut self) {
        match self {
            Self::Local(c) => c.stop_watching(),
            Self::Remote(_) => {}
            Self::Composite(c) => c.members_mut().iter_mut().for_each(Catalog::stop_watching),
        }
    }
}
