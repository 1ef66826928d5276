//! Rule reloading.
//!
//! The active `RuleSet` lives behind an `Arc` that is swapped in one step.
//! A request takes a snapshot when it starts and keeps using it even if a
//! reload installs a new set meanwhile. Reloads are serialized: a new set is
//! always built from every configured dump, never from a single file.

mod watcher;

pub use watcher::{group_by_directory, DirectoryWatcher};

use crate::dump::{self, DumpSource};
use crate::rule::RuleSet;
use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("failed to watch {}: {source}", dir.display())]
    Watch {
        dir: PathBuf,
        #[source]
        source: notify::Error,
    },
}

/// Holder of the active rule set.
#[derive(Debug, Default)]
pub struct RuleStore {
    current: RwLock<Arc<RuleSet>>,
}

impl RuleStore {
    pub fn new(rules: RuleSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(rules)),
        }
    }

    /// The set in effect right now. Unaffected by later installs.
    pub fn snapshot(&self) -> Arc<RuleSet> {
        Arc::clone(&self.current.read())
    }

    pub fn install(&self, rules: Arc<RuleSet>) {
        *self.current.write() = rules;
    }
}

/// Rebuilds the rule set from the configured dump files.
#[derive(Debug)]
pub struct ReloadCoordinator {
    sources: Vec<PathBuf>,
    store: Arc<RuleStore>,
    lock: Mutex<()>,
}

impl ReloadCoordinator {
    pub fn new(sources: Vec<PathBuf>, store: Arc<RuleStore>) -> Self {
        Self {
            sources,
            store,
            lock: Mutex::new(()),
        }
    }

    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    pub fn store(&self) -> &Arc<RuleStore> {
        &self.store
    }

    /// Re-read every dump in configured order and install the result.
    /// An unreadable or malformed dump contributes no rules.
    pub async fn reload(&self) -> Arc<RuleSet> {
        let _guard = self.lock.lock().await;

        let mut rules = Vec::new();
        for path in &self.sources {
            match DumpSource::read(path).await {
                Ok(source) => rules.extend(dump::load(&source.name(), &source.text)),
                Err(e) => warn!(error = %e, "Skipping dump"),
            }
        }

        let set = Arc::new(RuleSet::new(rules));
        self.store.install(Arc::clone(&set));
        info!(
            dumps = self.sources.len(),
            rules = set.len(),
            fallback = set.fallback().is_some(),
            "Rules loaded"
        );
        set
    }

    /// Start one watcher per directory holding a dump file.
    pub fn watch(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, ReloadError> {
        group_by_directory(&self.sources)
            .into_iter()
            .map(|watcher| {
                let dir = watcher.dir().to_path_buf();
                watcher
                    .spawn(Arc::clone(self))
                    .map_err(|source| ReloadError::Watch { dir, source })
            })
            .collect()
    }
}
