//! Watch mode
//!
//! Polls modification times of every non-excluded file under the root. Polling keeps the tool free of
//! platform-specific notification APIs and sees changes made through editors that replace files atomically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use globset::GlobSet;
use walkdir::WalkDir;

use crate::cli::test_interfaces::DiscoveryError;
use crate::discover::{build_set, relative};
use crate::shutdown::Shutdown;

pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// File state keyed by root-relative path.
type Snapshot = BTreeMap<String, (Option<SystemTime>, u64)>;

pub struct ChangeWatcher {
    root: PathBuf,
    excludes: GlobSet,
    interval: Duration,
    last: Snapshot,
}

impl ChangeWatcher {
    /// Start watching `root`, recording its current state as the baseline.
    pub async fn new(root: &Path, exclude: &[String]) -> Result<Self, DiscoveryError> {
        let mut watcher = Self {
            root: root.to_path_buf(),
            excludes: build_set(exclude)?,
            interval: POLL_INTERVAL,
            last: Snapshot::new(),
        };
        watcher.last = watcher.scan().await?;
        Ok(watcher)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until something under the root is added, modified or removed.
    ///
    /// ## Returns
    /// - (`Vec<String>`): the changed paths, or an empty list if shutdown fired first.
    pub async fn changed(&mut self, shutdown: &Shutdown) -> Result<Vec<String>, DiscoveryError> {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => return Ok(Vec::new()),
                _ = tokio::time::sleep(self.interval) => {}
            }
            let current = self.scan().await?;
            let changes = diff(&self.last, &current);
            self.last = current;
            if !changes.is_empty() {
                tracing::debug!(count = changes.len(), first = %changes[0], "files changed");
                return Ok(changes);
            }
        }
    }

    async fn scan(&self) -> Result<Snapshot, DiscoveryError> {
        let root = self.root.clone();
        let excludes = self.excludes.clone();
        tokio::task::spawn_blocking(move || scan(&root, &excludes)).await?
    }
}

fn scan(root: &Path, excludes: &GlobSet) -> Result<Snapshot, DiscoveryError> {
    let mut snapshot = Snapshot::new();
    let walker = WalkDir::new(root)
        .into_iter()
        .filter_entry(|entry| match relative(root, entry.path()) {
            Some(rel) => rel.is_empty() || !excludes.is_match(&rel),
            None => true,
        });
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            // Files can vanish between listing and stat while the user is editing.
            Err(e) if e.io_error().is_some_and(|io| io.kind() == std::io::ErrorKind::NotFound) => continue,
            Err(e) => return Err(e.into()),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(rel) = relative(root, entry.path()) else {
            continue;
        };
        let meta = entry.metadata().ok();
        let modified = meta.as_ref().and_then(|m| m.modified().ok());
        let len = meta.map_or(0, |m| m.len());
        snapshot.insert(rel, (modified, len));
    }
    Ok(snapshot)
}

fn diff(before: &Snapshot, after: &Snapshot) -> Vec<String> {
    let mut changes: Vec<String> = after
        .iter()
        .filter(|(path, state)| before.get(*path) != Some(state))
        .map(|(path, _)| path.clone())
        .collect();
    changes.extend(before.keys().filter(|path| !after.contains_key(*path)).cloned());
    changes.sort();
    changes
}
