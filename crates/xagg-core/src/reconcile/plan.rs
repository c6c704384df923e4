//! Classification of a scan inventory against a catalog snapshot.
//!
//! Building a plan is pure: it reads the snapshot and inventory and decides
//! every transition up front, so the safety check runs before anything is
//! written.

use crate::catalog::{CatalogSnapshot, DirStat};
use crate::config::CatalogConfig;
use crate::scan::ScanInventory;
use crate::{Result, XaggError};
use std::path::PathBuf;

/// Transitions decided for one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    /// Number of leaf directories in the inventory.
    pub scanned: usize,
    /// Paths not yet in the catalog, sorted.
    pub new_paths: Vec<(String, DirStat)>,
    /// Live catalog paths whose directory changed since the last scan.
    pub modified: Vec<(String, DirStat)>,
    /// Retired catalog paths seen on disk again.
    pub returned: Vec<(String, DirStat)>,
    /// Live catalog paths absent from the inventory.
    pub missing: Vec<String>,
    /// Inventory paths already known to be unparseable.
    pub skipped_invalid: usize,
    /// Artifact files of modified and missing entries.
    pub stale_artifacts: Vec<PathBuf>,
}

impl ReconcilePlan {
    /// Classify every path. Fails with [`XaggError::SafetyThreshold`] when
    /// the inventory is implausibly small compared to the live catalog.
    pub fn build(snapshot: &CatalogSnapshot, inventory: &ScanInventory) -> Result<Self> {
        let live = snapshot.entries.iter().filter(|e| !e.retired).count();
        check_safety(inventory.len(), live)?;

        let catalog = snapshot.by_path();
        let mut plan = ReconcilePlan {
            scanned: inventory.len(),
            ..Default::default()
        };

        for (path, stat) in &inventory.entries {
            match catalog.get(path.as_str()) {
                Some(entry) if entry.retired => plan.returned.push((path.clone(), *stat)),
                Some(entry) => {
                    if stat.modified > entry.modified {
                        plan.modified.push((path.clone(), *stat));
                        plan.stale_artifacts.extend(entry.artifact_path.clone());
                    }
                }
                None if snapshot.invalid_paths.contains(path) => plan.skipped_invalid += 1,
                None => plan.new_paths.push((path.clone(), *stat)),
            }
        }

        for entry in &snapshot.entries {
            if !entry.retired && !inventory.contains(&entry.path) {
                plan.missing.push(entry.path.clone());
                plan.stale_artifacts.extend(entry.artifact_path.clone());
            }
        }

        plan.new_paths.sort_by(|a, b| a.0.cmp(&b.0));
        plan.modified.sort_by(|a, b| a.0.cmp(&b.0));
        plan.returned.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(plan)
    }

    /// True when applying the plan would change nothing.
    pub fn is_empty(&self) -> bool {
        self.new_paths.is_empty()
            && self.modified.is_empty()
            && self.returned.is_empty()
            && self.missing.is_empty()
    }
}

/// Refuse to reconcile when fewer than [`CatalogConfig::SAFETY_RATIO`] of
/// the live catalog paths were found on disk.
pub fn check_safety(scanned: usize, live: usize) -> Result<()> {
    let threshold = CatalogConfig::SAFETY_RATIO * live as f64;
    if (scanned as f64) < threshold {
        return Err(XaggError::SafetyThreshold {
            scanned,
            expected_min: threshold.ceil() as usize,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogEntry;
    use crate::identity::sample_identity;
    use chrono::{Duration, TimeZone, Utc};

    fn stat(hour: u32) -> DirStat {
        DirStat::uniform(Utc.with_ymd_and_hms(2024, 1, 1, hour, 0, 0).unwrap())
    }

    fn entry(path: &str, hour: u32) -> CatalogEntry {
        CatalogEntry::new(path, sample_identity(), stat(hour))
    }

    fn inventory(paths: &[(&str, u32)]) -> ScanInventory {
        ScanInventory {
            entries: paths.iter().map(|(p, h)| (p.to_string(), stat(*h))).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_safety_threshold() {
        assert!(check_safety(9, 10).is_ok());
        assert!(check_safety(0, 0).is_ok());
        match check_safety(8, 10) {
            Err(XaggError::SafetyThreshold {
                scanned,
                expected_min,
            }) => {
                assert_eq!(scanned, 8);
                assert_eq!(expected_min, 9);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_retired_entries_do_not_count_toward_threshold() {
        let mut retired = entry("/r", 1);
        retired.retired = true;
        let snapshot = CatalogSnapshot {
            entries: vec![entry("/a", 1), retired],
            invalid_paths: Default::default(),
        };
        assert!(ReconcilePlan::build(&snapshot, &inventory(&[("/a", 1)])).is_ok());
        assert!(ReconcilePlan::build(&snapshot, &inventory(&[])).is_err());
    }

    #[test]
    fn test_classification() {
        let mut retired = entry("/back", 1);
        retired.retired = true;
        let mut changed = entry("/changed", 1);
        changed.artifact_path = Some(PathBuf::from("/out/changed.xml"));
        let mut gone = entry("/gone", 1);
        gone.artifact_path = Some(PathBuf::from("/out/gone.xml"));
        let snapshot = CatalogSnapshot {
            entries: vec![entry("/same", 1), changed, gone, retired],
            invalid_paths: ["/bad".to_string()].into_iter().collect(),
        };
        let scan = inventory(&[
            ("/same", 1),
            ("/changed", 5),
            ("/back", 1),
            ("/bad", 1),
            ("/fresh", 1),
        ]);

        // 5 scanned against 3 live entries
        let plan = ReconcilePlan::build(&snapshot, &scan).unwrap();
        assert_eq!(plan.scanned, 5);
        assert_eq!(plan.new_paths, vec![("/fresh".to_string(), stat(1))]);
        assert_eq!(plan.modified, vec![("/changed".to_string(), stat(5))]);
        assert_eq!(plan.returned, vec![("/back".to_string(), stat(1))]);
        assert_eq!(plan.missing, vec!["/gone".to_string()]);
        assert_eq!(plan.skipped_invalid, 1);
        assert_eq!(
            plan.stale_artifacts,
            vec![PathBuf::from("/out/changed.xml"), PathBuf::from("/out/gone.xml")]
        );
    }

    #[test]
    fn test_older_scan_time_is_not_modified() {
        let mut newer = entry("/a", 5);
        newer.modified = newer.modified + Duration::hours(1);
        let snapshot = CatalogSnapshot {
            entries: vec![newer],
            invalid_paths: Default::default(),
        };
        let plan = ReconcilePlan::build(&snapshot, &inventory(&[("/a", 5)])).unwrap();
        assert!(plan.is_empty());
    }
}
