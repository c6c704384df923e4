//! Leaf directory discovery.
//!
//! A leaf is a directory with no subdirectories and at least one file. Each
//! root is walked on its own blocking task; a failing root is reported and
//! does not affect its siblings.

use crate::catalog::{from_system_time, DirStat};
use crate::config::RunSettings;
use crate::{Result, XaggError};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// A root that could not be scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootFailure {
    pub root: PathBuf,
    pub message: String,
}

/// Result of scanning a set of roots.
#[derive(Debug, Clone, Default)]
pub struct ScanInventory {
    /// Leaf path to filesystem timestamps.
    pub entries: HashMap<String, DirStat>,
    /// Roots that were scanned but held no leaves.
    pub empty_roots: Vec<PathBuf>,
    pub failures: Vec<RootFailure>,
}

impl ScanInventory {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

fn is_excluded(path: &Path, excluded: &[PathBuf]) -> bool {
    excluded.iter().any(|x| path.starts_with(x))
}

/// Build the list of scan roots: every data directory, plus the immediate
/// child directories of each split directory, minus anything excluded.
pub fn expand_roots(
    data_directories: &[PathBuf],
    split_directories: &[PathBuf],
    excluded: &[PathBuf],
) -> Vec<PathBuf> {
    let mut roots: Vec<PathBuf> = data_directories.to_vec();
    for parent in split_directories {
        match fs::read_dir(parent) {
            Ok(children) => {
                let mut dirs: Vec<PathBuf> = children
                    .filter_map(|e| e.ok())
                    .map(|e| e.path())
                    .filter(|p| p.is_dir())
                    .collect();
                dirs.sort();
                roots.extend(dirs);
            }
            Err(e) => warn!("Cannot split {}: {}", parent.display(), e),
        }
    }

    let mut seen = HashSet::new();
    roots.retain(|r| !is_excluded(r, excluded) && seen.insert(r.clone()));
    roots
}

#[cfg(unix)]
fn change_time(meta: &fs::Metadata, fallback: DateTime<Utc>) -> DateTime<Utc> {
    use std::os::unix::fs::MetadataExt;
    DateTime::<Utc>::from_timestamp(meta.ctime(), 0).unwrap_or(fallback)
}

#[cfg(not(unix))]
fn change_time(meta: &fs::Metadata, fallback: DateTime<Utc>) -> DateTime<Utc> {
    meta.created().map(from_system_time).unwrap_or(fallback)
}

fn dir_stat(path: &Path) -> Result<DirStat> {
    let meta = fs::metadata(path).map_err(|e| XaggError::io_with_path(e, path))?;
    let modified = meta
        .modified()
        .map(from_system_time)
        .map_err(|e| XaggError::io_with_path(e, path))?;
    let accessed = meta.accessed().map(from_system_time).unwrap_or(modified);
    Ok(DirStat {
        created: change_time(&meta, modified),
        modified,
        accessed,
    })
}

#[derive(Default)]
struct DirFlags {
    has_subdir: bool,
    has_file: bool,
}

/// Walk one root and collect its leaf directories. Blocking.
pub fn scan_root(root: &Path, excluded: &[PathBuf]) -> Result<HashMap<String, DirStat>> {
    if !root.is_dir() {
        return Err(XaggError::NotADirectory(root.to_path_buf()));
    }

    let mut flags: HashMap<PathBuf, DirFlags> = HashMap::new();
    let mut walker = WalkDir::new(root).into_iter();
    while let Some(entry) = walker.next() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", root.display(), e);
                continue;
            }
        };
        let path = entry.path();
        // symlinked directories count as subdirectories but are not followed
        let is_dir = entry.file_type().is_dir() || (entry.path_is_symlink() && path.is_dir());

        if entry.depth() > 0 {
            if let Some(parent) = path.parent() {
                let parent_flags = flags.entry(parent.to_path_buf()).or_default();
                if is_dir {
                    parent_flags.has_subdir = true;
                } else {
                    parent_flags.has_file = true;
                }
            }
        }

        if entry.file_type().is_dir() {
            if entry.depth() > 0 && is_excluded(path, excluded) {
                walker.skip_current_dir();
                continue;
            }
            flags.entry(path.to_path_buf()).or_default();
        }
    }

    let mut leaves = HashMap::new();
    for (dir, f) in flags {
        if f.has_subdir || !f.has_file {
            continue;
        }
        match dir_stat(&dir) {
            Ok(stat) => {
                leaves.insert(dir.to_string_lossy().into_owned(), stat);
            }
            Err(e) => warn!("Cannot stat {}: {}", dir.display(), e),
        }
    }
    Ok(leaves)
}

/// Scans roots in parallel on a bounded pool of blocking tasks.
pub struct DirectoryScanner {
    workers: usize,
    excluded: Arc<Vec<PathBuf>>,
}

impl DirectoryScanner {
    pub fn new(workers: usize, excluded: Vec<PathBuf>) -> Self {
        Self {
            workers: workers.max(1),
            excluded: Arc::new(excluded),
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Self {
        Self::new(settings.workers, settings.excluded_directories.clone())
    }

    /// Scan every root and merge the results.
    pub async fn scan(&self, roots: &[PathBuf]) -> ScanInventory {
        let nworkers = self.workers.min(roots.len().max(1));
        info!(
            "Using {} workers to scan {} directories",
            nworkers,
            roots.len()
        );
        let semaphore = Arc::new(Semaphore::new(nworkers));

        let tasks = roots.iter().cloned().map(|root| {
            let semaphore = Arc::clone(&semaphore);
            let excluded = Arc::clone(&self.excluded);
            async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        return (root, Err(XaggError::Other(format!("Scan pool closed: {}", e))))
                    }
                };
                let task_root = root.clone();
                let result = tokio::task::spawn_blocking(move || {
                    let start = Instant::now();
                    let leaves = scan_root(&task_root, &excluded);
                    debug!(
                        root = %task_root.display(),
                        elapsed_ms = start.elapsed().as_millis() as u64,
                        "Scanned root"
                    );
                    leaves
                })
                .await
                .map_err(|e| XaggError::Other(format!("Scan task failed: {}", e)))
                .and_then(|r| r);
                (root, result)
            }
        });

        let mut inventory = ScanInventory::default();
        for (root, result) in join_all(tasks).await {
            match result {
                Ok(leaves) if leaves.is_empty() => {
                    warn!(root = %root.display(), "Root produced no leaf directories");
                    inventory.empty_roots.push(root);
                }
                Ok(leaves) => inventory.entries.extend(leaves),
                Err(e) => {
                    warn!(root = %root.display(), "Root scan failed: {}", e);
                    inventory.failures.push(RootFailure {
                        root,
                        message: e.to_string(),
                    });
                }
            }
        }
        info!("Found {} leaf directories", inventory.len());
        inventory
    }
}
