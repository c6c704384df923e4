//! Catalog record types.

use crate::config::CatalogConfig;
use crate::identity::DatasetIdentity;
use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::SystemTime;

/// Format a timestamp the way the catalog stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.format(CatalogConfig::TIMESTAMP_FORMAT).to_string()
}

/// Parse a stored catalog timestamp.
pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    NaiveDateTime::parse_from_str(value, CatalogConfig::TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Drop sub-second precision. The catalog stores whole seconds, so scan
/// timestamps are truncated before they are compared against stored ones.
pub fn truncate_to_seconds(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.with_nanosecond(0).unwrap_or(ts)
}

/// Convert a filesystem time to a whole-second UTC timestamp.
pub fn from_system_time(time: SystemTime) -> DateTime<Utc> {
    truncate_to_seconds(DateTime::<Utc>::from(time))
}

/// Filesystem timestamps of a leaf directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirStat {
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
}

impl DirStat {
    /// A stat with every timestamp set to `ts`.
    pub fn uniform(ts: DateTime<Utc>) -> Self {
        let ts = truncate_to_seconds(ts);
        Self {
            created: ts,
            modified: ts,
            accessed: ts,
        }
    }
}

/// One catalog record per leaf directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub path: String,
    pub identity: DatasetIdentity,
    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
    pub accessed: DateTime<Utc>,
    pub artifact_path: Option<PathBuf>,
    pub artifact_write_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retired: bool,
    pub retire_time: Option<DateTime<Utc>>,
    pub ignored: bool,
    pub ignore_time: Option<DateTime<Utc>>,
}

impl CatalogEntry {
    /// A fresh record for a newly sighted directory.
    pub fn new(path: impl Into<String>, identity: DatasetIdentity, stat: DirStat) -> Self {
        Self {
            path: path.into(),
            identity,
            created: stat.created,
            modified: stat.modified,
            accessed: stat.accessed,
            artifact_path: None,
            artifact_write_time: None,
            error: None,
            retired: false,
            retire_time: None,
            ignored: false,
            ignore_time: None,
        }
    }

    pub fn identity_key(&self) -> String {
        self.identity.key()
    }

    pub fn stat(&self) -> DirStat {
        DirStat {
            created: self.created,
            modified: self.modified,
            accessed: self.accessed,
        }
    }

    pub fn has_artifact(&self) -> bool {
        self.artifact_path.is_some()
    }

    /// Ignored because a retraction list named its dataset.
    pub fn is_retracted(&self) -> bool {
        self.ignored && self.error.as_deref() == Some(CatalogConfig::RETRACTED_ERROR)
    }
}

/// A path known to fail identity resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidPath {
    pub path: String,
    pub recorded: DateTime<Utc>,
}

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRecord {
    pub time: DateTime<Utc>,
    pub total: usize,
    pub new: usize,
    pub invalid: usize,
    pub modified: usize,
    pub missing: usize,
    pub returned: usize,
    pub deleted: usize,
}

/// Outcome of generating one artifact, written back to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRecord {
    pub path: String,
    pub artifact_path: Option<PathBuf>,
    pub write_time: DateTime<Utc>,
    pub error: Option<String>,
}

/// Read-only view of the catalog taken before a reconciliation pass mutates
/// anything.
#[derive(Debug, Clone, Default)]
pub struct CatalogSnapshot {
    /// Entries in catalog iteration order.
    pub entries: Vec<CatalogEntry>,
    pub invalid_paths: HashSet<String>,
}

impl CatalogSnapshot {
    pub fn by_path(&self) -> HashMap<&str, &CatalogEntry> {
        self.entries.iter().map(|e| (e.path.as_str(), e)).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Typed selection used by maintenance operations. Unset fields match
/// everything; an all-default filter matches the whole catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub path_prefix: Option<String>,
    pub mip_era: Option<String>,
    pub model: Option<String>,
    pub experiment: Option<String>,
    pub variable: Option<String>,
    pub frequency: Option<String>,
    pub has_error: Option<bool>,
    pub has_artifact: Option<bool>,
}

impl EntryFilter {
    pub fn is_unrestricted(&self) -> bool {
        *self == EntryFilter::default()
    }
}
