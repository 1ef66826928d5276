//! Per-directory change watchers.

use super::ReloadCoordinator;
use indexmap::IndexMap;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

/// One directory and the dump file names inside it that trigger a reload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryWatcher {
    dir: PathBuf,
    files: HashSet<OsString>,
}

/// Group dump paths by parent directory, in first-seen order.
pub fn group_by_directory(paths: &[PathBuf]) -> Vec<DirectoryWatcher> {
    let mut groups: IndexMap<PathBuf, HashSet<OsString>> = IndexMap::new();
    for path in paths {
        let Some(file_name) = path.file_name() else {
            continue;
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        groups
            .entry(dir)
            .or_default()
            .insert(file_name.to_os_string());
    }
    groups
        .into_iter()
        .map(|(dir, files)| DirectoryWatcher { dir, files })
        .collect()
}

impl DirectoryWatcher {
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn files(&self) -> &HashSet<OsString> {
        &self.files
    }

    /// Whether an event concerns one of this directory's dump files.
    pub fn is_relevant(&self, event: &Event) -> bool {
        let kind_matches = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
        );
        kind_matches
            && event.paths.iter().any(|path| {
                path.file_name()
                    .is_some_and(|name| self.files.contains(name))
            })
    }

    /// Watch the directory until the process exits. Every relevant event
    /// (bursts are coalesced) triggers a full reload. A watch error stops this
    /// watcher only.
    pub fn spawn(
        self,
        coordinator: Arc<ReloadCoordinator>,
    ) -> Result<JoinHandle<()>, notify::Error> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut watcher = notify::recommended_watcher(
            move |res: Result<Event, notify::Error>| {
                let _ = tx.send(res);
            },
        )?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        info!(dir = %self.dir.display(), files = self.files.len(), "Watching dump directory");

        Ok(tokio::spawn(async move {
            // The watcher stops emitting once dropped
            let _watcher = watcher;

            while let Some(res) = rx.recv().await {
                let mut triggered = match res {
                    Ok(event) => self.is_relevant(&event),
                    Err(e) => {
                        error!(dir = %self.dir.display(), error = %e, "Watch failed, stopping watcher");
                        return;
                    }
                };

                while let Ok(pending) = rx.try_recv() {
                    match pending {
                        Ok(event) => triggered |= self.is_relevant(&event),
                        Err(e) => {
                            error!(dir = %self.dir.display(), error = %e, "Watch failed, stopping watcher");
                            return;
                        }
                    }
                }

                if triggered {
                    debug!(dir = %self.dir.display(), "Dump change detected");
                    coordinator.reload().await;
                }
            }

            debug!(dir = %self.dir.display(), "Watcher channel closed");
        }))
    }
}
