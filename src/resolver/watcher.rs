use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver, RecvTimeoutError};
use std::time::Duration;

use notify::RecursiveMode;
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};

use crate::error::{BitbakeError, Result};

/// Extensions whose changes invalidate the inventory.
const METADATA_EXTENSIONS: &[&str] = &["bb", "bbappend", "bbclass", "inc", "conf"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    Modified(PathBuf),
    Deleted(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Modified(path) | FileEvent::Deleted(path) => path,
        }
    }
}

/// Watches layer roots for metadata changes.
pub struct InventoryWatcher {
    _debouncer: Debouncer<notify::RecommendedWatcher>,
    receiver: Receiver<std::result::Result<Vec<DebouncedEvent>, notify::Error>>,
}

impl InventoryWatcher {
    pub fn new(roots: &[PathBuf], debounce: Duration) -> Result<Self> {
        let (tx, rx) = channel();

        let mut debouncer = new_debouncer(debounce, tx).map_err(|e| BitbakeError::Watcher(e.to_string()))?;

        for root in roots {
            debouncer
                .watcher()
                .watch(root, RecursiveMode::Recursive)
                .map_err(|e| BitbakeError::Watcher(format!("{}: {}", root.display(), e)))?;
        }

        Ok(Self {
            _debouncer: debouncer,
            receiver: rx,
        })
    }

    /// Blocks until metadata changes. `None` once the watcher is gone or
    /// the batch held no metadata files.
    pub fn recv(&self) -> Option<Vec<FileEvent>> {
        match self.receiver.recv() {
            Ok(Ok(events)) => metadata_events(events),
            Ok(Err(e)) => {
                tracing::warn!("watch error: {}", e);
                None
            }
            Err(_) => None,
        }
    }

    pub fn recv_timeout(&self, timeout: Duration) -> std::result::Result<Option<Vec<FileEvent>>, RecvTimeoutError> {
        match self.receiver.recv_timeout(timeout) {
            Ok(Ok(events)) => Ok(metadata_events(events)),
            Ok(Err(e)) => {
                tracing::warn!("watch error: {}", e);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn try_recv(&self) -> Option<Vec<FileEvent>> {
        match self.receiver.try_recv() {
            Ok(Ok(events)) => metadata_events(events),
            _ => None,
        }
    }
}

pub fn is_metadata(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| METADATA_EXTENSIONS.contains(&e))
}

fn metadata_events(events: Vec<DebouncedEvent>) -> Option<Vec<FileEvent>> {
    let file_events: Vec<FileEvent> = events
        .into_iter()
        .map(|e| e.path)
        .filter(|path| is_metadata(path))
        .filter_map(|path| {
            if path.is_file() {
                Some(FileEvent::Modified(path))
            } else if !path.exists() {
                Some(FileEvent::Deleted(path))
            } else {
                None
            }
        })
        .collect();

    if file_events.is_empty() {
        None
    } else {
        Some(file_events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify_debouncer_mini::DebouncedEventKind;
    use tempfile::TempDir;

    #[test]
    fn test_metadata_extensions() {
        assert!(is_metadata(Path::new("/l/recipes/foo_1.0.bb")));
        assert!(is_metadata(Path::new("/l/classes/image.bbclass")));
        assert!(is_metadata(Path::new("/l/conf/layer.conf")));
        assert!(!is_metadata(Path::new("/l/files/patch.diff")));
        assert!(!is_metadata(Path::new("/l/README")));
    }

    #[test]
    fn test_events_are_filtered() {
        let dir = TempDir::new().unwrap();
        let recipe = dir.path().join("a.bb");
        std::fs::write(&recipe, "").unwrap();
        let gone = dir.path().join("gone.inc");
        let event = |path: PathBuf| DebouncedEvent {
            path,
            kind: DebouncedEventKind::Any,
        };
        let events = vec![event(recipe.clone()), event(gone.clone()), event(dir.path().join("x.txt"))];
        assert_eq!(
            metadata_events(events),
            Some(vec![FileEvent::Modified(recipe), FileEvent::Deleted(gone)])
        );
    }

    #[test]
    fn test_watcher_starts_on_existing_root() {
        let dir = TempDir::new().unwrap();
        let watcher = InventoryWatcher::new(&[dir.path().to_path_buf()], Duration::from_millis(50)).unwrap();
        assert!(watcher.try_recv().is_none());
    }
}
