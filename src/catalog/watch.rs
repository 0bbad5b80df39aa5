use std::path::Path;

use anyhow::{Context, Result};
use crossbeam_channel::{Sender, TrySendError};
use notify::event::{CreateKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher, recommended_watcher};
use tracing::{debug, error, info};

use crate::events::{CatalogChange, ChangeKind};

/// Keeps a notify watcher alive; dropping it stops the notifications.
pub struct DirectoryWatcher {
    _watcher: RecommendedWatcher,
}

impl DirectoryWatcher {
    /// Watches `root` and forwards photo-relevant events to `tx`. Events are
    /// dropped when the queue is full since a refresh is already pending.
    pub fn start(root: &Path, recursive: bool, tx: Sender<CatalogChange>) -> Result<Self> {
        let mut watcher = recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                let Some(change) = classify(&event) else {
                    debug!(kind = ?event.kind, "fs: ignored");
                    return;
                };
                match tx.try_send(change) {
                    Ok(()) | Err(TrySendError::Full(_)) => {}
                    Err(TrySendError::Disconnected(_)) => debug!("change queue closed"),
                }
            }
            Err(err) => error!("watch error: {err}"),
        })
        .context("failed to create filesystem watcher")?;

        let mode = if recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .watch(root, mode)
            .with_context(|| format!("failed to watch {}", root.display()))?;
        info!(watching = %root.display(), recursive, "notify watcher initialized");
        Ok(Self { _watcher: watcher })
    }
}

/// Maps a notify event to a catalog change, ignoring directories and
/// content-only modifications.
pub fn classify(event: &Event) -> Option<CatalogChange> {
    let kind = match &event.kind {
        EventKind::Create(CreateKind::Folder) | EventKind::Remove(RemoveKind::Folder) => {
            return None;
        }
        EventKind::Create(_) => ChangeKind::Created,
        EventKind::Remove(_) => ChangeKind::Removed,
        EventKind::Modify(ModifyKind::Name(_)) => ChangeKind::Moved,
        _ => return None,
    };
    let paths: Vec<_> = event
        .paths
        .iter()
        .filter(|p| !p.is_dir())
        .cloned()
        .collect();
    if paths.is_empty() {
        return None;
    }
    Some(CatalogChange { kind, paths })
}
