//! Retraction reconciliation.
//!
//! Datasets withdrawn by their publishers are ignored in the catalog and
//! their artifacts moved to an archive. Entries whose dataset has since been
//! taken off the retraction list are returned to the schedulable state.

use crate::artifact::archive_artifact;
use crate::catalog::{truncate_to_seconds, CatalogStore};
use crate::identity::{CmipPathResolver, DatasetId};
use crate::{Result, XaggError};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

/// Counts from one retraction pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetractionReport {
    /// Entries newly marked as retracted.
    pub retracted: usize,
    /// Artifact files moved to the archive.
    pub archived: usize,
    /// Previously retracted entries returned to service.
    pub restored: usize,
}

/// Read a retraction list: one dataset id per line. Blank lines and `#`
/// comments are skipped; lines that are not dataset ids are logged and
/// dropped.
pub fn read_retraction_list(path: &Path) -> Result<Vec<DatasetId>> {
    let text = fs::read_to_string(path).map_err(|e| XaggError::io_with_path(e, path))?;
    let mut ids = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match DatasetId::parse(line) {
            Some(id) => ids.push(id),
            None => warn!("{}:{}: not a dataset id: {}", path.display(), lineno + 1, line),
        }
    }
    Ok(ids)
}

/// Identity keys of retracted datasets.
pub fn retracted_keys(resolver: &CmipPathResolver, ids: &[DatasetId]) -> HashSet<String> {
    ids.iter()
        .map(|id| resolver.identity_for_dataset(id).key())
        .collect()
}

/// Bring the catalog in line with the set of retracted identity keys.
pub fn reconcile_retractions(
    store: &CatalogStore,
    retracted: &HashSet<String>,
    output_dir: &Path,
    archive_dir: &Path,
    now: DateTime<Utc>,
) -> Result<RetractionReport> {
    let now = truncate_to_seconds(now);
    let entries = store.entries()?;

    let mut report = RetractionReport::default();
    let mut newly_retracted = Vec::new();
    let mut restored = Vec::new();
    for entry in &entries {
        if entry.retired {
            continue;
        }
        let listed = retracted.contains(&entry.identity_key());
        if listed && !entry.ignored {
            if let Some(artifact) = &entry.artifact_path {
                match archive_artifact(artifact, output_dir, archive_dir) {
                    Ok(Some(_)) => report.archived += 1,
                    Ok(None) => {}
                    Err(e) => {
                        // left unmarked; the next pass retries
                        warn!(path = %entry.path, "Failed to archive artifact: {}", e);
                        continue;
                    }
                }
            }
            newly_retracted.push(entry.path.clone());
        } else if !listed && entry.is_retracted() {
            restored.push(entry.path.clone());
        }
    }

    report.retracted = store.mark_retracted(&newly_retracted, now)?;
    report.restored = store.clear_retracted(&restored)?;
    info!(
        retracted = report.retracted,
        archived = report.archived,
        restored = report.restored,
        "Retraction reconciliation complete"
    );
    Ok(report)
}
