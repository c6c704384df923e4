//! Selection of catalog entries due for artifact generation.

use crate::catalog::{CatalogEntry, CatalogStore};
use crate::config::{RunSettings, ScheduleConfig};
use crate::identity::DatasetIdentity;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::info;

/// Variable, experiment and frequency filters. An empty list matches
/// nothing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilters {
    pub variables: HashSet<String>,
    pub experiments: HashSet<String>,
    pub frequencies: HashSet<String>,
}

impl ScanFilters {
    pub fn new<I, S>(variables: I, experiments: I, frequencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
            experiments: experiments.into_iter().map(Into::into).collect(),
            frequencies: frequencies.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_settings(settings: &RunSettings) -> Self {
        Self::new(
            settings.variables.iter().cloned(),
            settings.experiments.iter().cloned(),
            settings.frequencies.iter().cloned(),
        )
    }

    pub fn matches(&self, identity: &DatasetIdentity) -> bool {
        self.variables.contains(&identity.variable)
            && self.experiments.contains(&identity.experiment)
            && self.frequencies.contains(&identity.frequency)
    }
}

/// A directory selected for artifact generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub path: String,
    pub identity: DatasetIdentity,
}

impl From<&CatalogEntry> for ScanTarget {
    fn from(entry: &CatalogEntry) -> Self {
        Self {
            path: entry.path.clone(),
            identity: entry.identity.clone(),
        }
    }
}

fn is_eligible(entry: &CatalogEntry, filters: &ScanFilters, cutoff: DateTime<Utc>) -> bool {
    entry.artifact_path.is_none()
        && entry.error.is_none()
        && !entry.retired
        && !entry.ignored
        && entry.modified < cutoff
        && filters.matches(&entry.identity)
}

/// Pick one directory per identity key that still needs an artifact.
///
/// `entries` must be in catalog iteration order; the first eligible entry of
/// each key is its representative and keys come out in first-seen order. A
/// key is skipped entirely if any entry carrying it, eligible or not, already
/// has an artifact.
pub fn select_for_scan(
    entries: &[CatalogEntry],
    filters: &ScanFilters,
    now: DateTime<Utc>,
) -> Vec<ScanTarget> {
    let window = Duration::from_std(ScheduleConfig::STALENESS_WINDOW)
        .unwrap_or_else(|_| Duration::hours(24));
    let cutoff = now - window;

    let covered: HashSet<String> = entries
        .iter()
        .filter(|e| e.artifact_path.is_some())
        .map(CatalogEntry::identity_key)
        .collect();

    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|e| is_eligible(e, filters, cutoff))
        .filter_map(|e| {
            let key = e.identity_key();
            if covered.contains(&key) || !seen.insert(key) {
                None
            } else {
                Some(ScanTarget::from(e))
            }
        })
        .collect()
}

impl CatalogStore {
    /// Select scan targets from the current catalog contents.
    pub fn select_for_scan(&self, filters: &ScanFilters, now: DateTime<Utc>) -> Result<Vec<ScanTarget>> {
        let targets = select_for_scan(&self.entries()?, filters, now);
        info!("Found {} paths to scan", targets.len());
        Ok(targets)
    }
}
