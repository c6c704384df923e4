//! Per-run context and the advisory run lock.
//!
//! A [`RunContext`] is built once from [`RunSettings`] plus command-line
//! overrides and handed to each component, which takes what it needs from
//! it. Only one process may mutate the catalog at a time; [`RunLock`] holds
//! that right for as long as it is alive.

use crate::artifact::ArtifactGenerator;
use crate::catalog::CatalogStore;
use crate::config::{LockConfig, RunSettings};
use crate::identity::{CmipPathResolver, TableLookup};
use crate::scan::{expand_roots, DirectoryScanner};
use crate::schedule::ScanFilters;
use crate::{Result, XaggError};
use chrono::Utc;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Command-line overrides applied on top of [`RunSettings`].
#[derive(Debug, Clone, Default)]
pub struct RunOverrides {
    pub database: Option<PathBuf>,
    pub output_directory: Option<PathBuf>,
    pub workers: Option<usize>,
    pub variables: Option<Vec<String>>,
    pub experiments: Option<Vec<String>>,
    pub frequencies: Option<Vec<String>>,
}

/// Everything a run needs, resolved up front.
#[derive(Debug, Clone)]
pub struct RunContext {
    settings: RunSettings,
}

impl RunContext {
    pub fn new(mut settings: RunSettings, overrides: RunOverrides) -> Result<Self> {
        if let Some(database) = overrides.database {
            settings.database = database;
        }
        if let Some(output_directory) = overrides.output_directory {
            settings.output_directory = output_directory;
        }
        if let Some(workers) = overrides.workers {
            settings.workers = workers;
        }
        if let Some(variables) = overrides.variables {
            settings.variables = variables;
        }
        if let Some(experiments) = overrides.experiments {
            settings.experiments = experiments;
        }
        if let Some(frequencies) = overrides.frequencies {
            settings.frequencies = frequencies;
        }
        settings.validate()?;
        Ok(Self { settings })
    }

    pub fn settings(&self) -> &RunSettings {
        &self.settings
    }

    pub fn open_store(&self) -> Result<CatalogStore> {
        CatalogStore::new(&self.settings.database)
    }

    /// Path resolver backed by the table cache, if one has been saved.
    pub fn open_resolver(&self) -> Result<CmipPathResolver> {
        let tables =
            TableLookup::with_cache(&self.settings.tables_directory, &self.settings.metadata_cache)?;
        Ok(CmipPathResolver::new(tables))
    }

    /// Persist the resolver's table cache.
    pub fn save_resolver(&self, resolver: &CmipPathResolver) -> Result<()> {
        resolver.tables().save(&self.settings.metadata_cache)
    }

    pub fn scan_roots(&self) -> Vec<PathBuf> {
        expand_roots(
            &self.settings.data_directories,
            &self.settings.split_directories,
            &self.settings.excluded_directories,
        )
    }

    pub fn scanner(&self) -> DirectoryScanner {
        DirectoryScanner::from_settings(&self.settings)
    }

    pub fn scan_filters(&self) -> ScanFilters {
        ScanFilters::from_settings(&self.settings)
    }

    pub fn generator(&self) -> Result<ArtifactGenerator> {
        ArtifactGenerator::from_settings(&self.settings)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.settings.lock_directory.join(LockConfig::LOCK_FILENAME)
    }

    pub fn acquire_lock(&self) -> Result<RunLock> {
        RunLock::acquire(self.lock_path())
    }
}

/// Exclusive right to mutate the catalog. The lock file is unlocked and
/// removed when the guard drops.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock. A lock file left behind by a crashed run also blocks
    /// acquisition until an operator removes it.
    pub fn acquire(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| XaggError::io_with_path(e, parent))?;
            }
        }

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(XaggError::LockHeld { path });
            }
            Err(e) => return Err(XaggError::io_with_path(e, &path)),
        };

        if file.try_lock_exclusive().is_err() {
            return Err(XaggError::LockHeld { path });
        }
        let stamp = format!("{} {}\n", std::process::id(), Utc::now().to_rfc3339());
        if let Err(e) = file.write_all(stamp.as_bytes()) {
            warn!("Failed to write lock file {}: {}", path.display(), e);
        }

        info!("Acquired run lock {}", path.display());
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!("Failed to unlock {}: {}", self.path.display(), e);
        }
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to remove lock file {}: {}", self.path.display(), e);
        }
        debug!("Released run lock {}", self.path.display());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_and_released() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LockConfig::LOCK_FILENAME);

        let lock = RunLock::acquire(&path).unwrap();
        assert!(path.exists());
        assert!(fs::read_to_string(&path)
            .unwrap()
            .starts_with(&std::process::id().to_string()));
        assert!(matches!(
            RunLock::acquire(&path),
            Err(XaggError::LockHeld { .. })
        ));

        drop(lock);
        assert!(!path.exists());
        assert!(RunLock::acquire(&path).is_ok());
    }

    #[test]
    fn test_stale_lock_file_blocks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(LockConfig::LOCK_FILENAME);
        fs::write(&path, "12345").unwrap();
        assert!(matches!(
            RunLock::acquire(&path),
            Err(XaggError::LockHeld { .. })
        ));
        assert!(path.exists());
    }

    #[test]
    fn test_overrides_apply() {
        let context = RunContext::new(
            RunSettings::default(),
            RunOverrides {
                workers: Some(3),
                variables: Some(vec!["pr".into()]),
                output_directory: Some(PathBuf::from("/tmp/xml")),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(context.settings().workers, 3);
        assert_eq!(context.settings().output_directory, PathBuf::from("/tmp/xml"));
        assert!(context.scan_filters().variables.contains("pr"));
        assert!(!context.scan_filters().variables.contains("tas"));
    }

    #[test]
    fn test_invalid_override_rejected() {
        let result = RunContext::new(
            RunSettings::default(),
            RunOverrides {
                workers: Some(0),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(XaggError::Config { .. })));
    }
}
