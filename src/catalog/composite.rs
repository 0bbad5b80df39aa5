use std::path::PathBuf;

use tracing::{debug, info};

use super::Catalog;
use super::selection::{SelectionMode, Selector};

/// Several catalogs presented as one index space.
///
/// Member `k` owns the global indices `[offsets[k], offsets[k] + sizes[k])`.
/// The table is rebuilt on refresh and before any lookup that finds a
/// member whose size no longer matches.
pub struct CompositeCatalog {
    members: Vec<Catalog>,
    offsets: Vec<usize>,
    sizes: Vec<usize>,
    selector: Selector,
}

impl CompositeCatalog {
    pub fn new(members: Vec<Catalog>, selector: Selector) -> Self {
        let mut composite = Self {
            members,
            offsets: Vec::new(),
            sizes: Vec::new(),
            selector,
        };
        let mode = composite.selector.mode();
        composite.set_selection_mode(mode);
        composite.rebuild_offsets();
        composite
    }

    pub fn members(&self) -> &[Catalog] {
        &self.members
    }

    pub fn members_mut(&mut self) -> &mut [Catalog] {
        &mut self.members
    }

    /// Refreshes every member, then rebuilds the offsets from their new
    /// counts.
    pub fn refresh(&mut self) -> usize {
        for member in &mut self.members {
            let count = member.refresh();
            debug!(source = member.name(), count, "source refreshed");
        }
        self.rebuild_offsets();
        let total = self.count();
        info!(total, sources = self.members.len(), "catalog refreshed");
        total
    }

    fn rebuild_offsets(&mut self) {
        self.offsets.clear();
        self.sizes.clear();
        let mut offset = 0;
        for member in &self.members {
            let size = member.count();
            self.offsets.push(offset);
            self.sizes.push(size);
            offset += size;
        }
    }

    fn sync_offsets(&mut self) {
        let stale = self.sizes.len() != self.members.len()
            || self.members.iter().zip(&self.sizes).any(|(m, &size)| m.count() != size);
        if stale {
            debug!("member size changed; rebuilding offsets");
            self.rebuild_offsets();
        }
    }

    pub fn count(&self) -> usize {
        self.members.iter().map(Catalog::count).sum()
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// Member position and local index owning global `index`.
    pub fn resolve(&self, index: usize) -> Option<(usize, usize)> {
        self.offsets
            .iter()
            .zip(&self.sizes)
            .enumerate()
            .find_map(|(k, (&offset, &size))| {
                (offset..offset + size)
                    .contains(&index)
                    .then(|| (k, index - offset))
            })
    }

    pub fn get_path(&mut self, index: usize) -> Option<PathBuf> {
        self.sync_offsets();
        let (member, local) = self.resolve(index)?;
        debug!(index, member, local, "resolved composite index");
        self.members[member].get_path(local)
    }

    pub fn load(&mut self, index: usize) -> Option<Vec<u8>> {
        self.sync_offsets();
        let (member, local) = self.resolve(index)?;
        self.members[member].load(local)
    }

    /// One pick over the combined index space.
    pub fn select(&mut self) -> Option<usize> {
        self.selector.select(self.count())
    }

    pub fn selection_mode(&self) -> SelectionMode {
        self.selector.mode()
    }

    pub fn set_selection_mode(&mut self, mode: SelectionMode) {
        self.selector.set_mode(mode);
        for member in &mut self.members {
            member.set_selection_mode(mode);
        }
    }
}
