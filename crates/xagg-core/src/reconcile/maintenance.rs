//! Query-tied maintenance: reset, ignore and purge catalog entries along
//! with their artifact files.

use crate::artifact::remove_artifacts;
use crate::catalog::{CatalogEntry, CatalogStore, EntryFilter};
use crate::Result;
use chrono::{DateTime, Utc};
use tracing::info;

/// What a maintenance operation touched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    pub matched: usize,
    pub deleted_artifacts: usize,
}

impl MaintenanceReport {
    fn from_entries(entries: &[CatalogEntry]) -> Self {
        let deleted_artifacts =
            remove_artifacts(entries.iter().filter_map(|e| e.artifact_path.as_deref()));
        Self {
            matched: entries.len(),
            deleted_artifacts,
        }
    }
}

/// Clear artifacts of matching entries so they are generated again.
pub fn reset(store: &CatalogStore, filter: &EntryFilter) -> Result<MaintenanceReport> {
    let report = MaintenanceReport::from_entries(&store.reset_artifacts(filter)?);
    info!(matched = report.matched, deleted = report.deleted_artifacts, "Reset entries");
    Ok(report)
}

/// Clear artifacts of matching entries and stop scheduling them.
pub fn ignore(
    store: &CatalogStore,
    filter: &EntryFilter,
    now: DateTime<Utc>,
) -> Result<MaintenanceReport> {
    let report = MaintenanceReport::from_entries(&store.ignore_entries(filter, now)?);
    info!(matched = report.matched, deleted = report.deleted_artifacts, "Ignored entries");
    Ok(report)
}

/// Delete matching entries and their artifacts.
pub fn purge(store: &CatalogStore, filter: &EntryFilter) -> Result<MaintenanceReport> {
    let report = MaintenanceReport::from_entries(&store.purge_entries(filter)?);
    info!(matched = report.matched, deleted = report.deleted_artifacts, "Purged entries");
    Ok(report)
}
