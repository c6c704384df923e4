//! Applies a [`ReconcilePlan`] to the catalog.

use super::plan::ReconcilePlan;
use crate::artifact::remove_artifacts;
use crate::catalog::{truncate_to_seconds, CatalogEntry, CatalogStore, InvalidPath, RunRecord};
use crate::identity::{IdentityResolver, Resolution, KEY_DELIMITER};
use crate::scan::ScanInventory;
use crate::Result;
use chrono::{DateTime, Utc};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Brings the catalog in line with what is on disk.
pub struct Reconciler<'a> {
    store: &'a CatalogStore,
    resolver: &'a dyn IdentityResolver,
}

impl<'a> Reconciler<'a> {
    pub fn new(store: &'a CatalogStore, resolver: &'a dyn IdentityResolver) -> Self {
        Self { store, resolver }
    }

    /// Snapshot the catalog, classify `inventory` against it and apply the
    /// result. Nothing is written if the safety check fails.
    pub fn reconcile(&self, inventory: &ScanInventory, now: DateTime<Utc>) -> Result<RunRecord> {
        let snapshot = self.store.snapshot()?;
        info!(
            "Catalog holds {} entries ({} retired, {} invalid paths)",
            snapshot.len(),
            snapshot.entries.iter().filter(|e| e.retired).count(),
            snapshot.invalid_paths.len()
        );
        let plan = ReconcilePlan::build(&snapshot, inventory)?;
        self.apply(&plan, now)
    }

    /// Write a plan's transitions and append the run record.
    pub fn apply(&self, plan: &ReconcilePlan, now: DateTime<Utc>) -> Result<RunRecord> {
        let now = truncate_to_seconds(now);
        let start = Instant::now();

        let mut entries = Vec::with_capacity(plan.new_paths.len());
        let mut invalid = Vec::new();
        for (path, stat) in &plan.new_paths {
            let resolution = match self.resolve(path) {
                Resolution::Resolved(identity) if identity.has_delimiter_collision() => {
                    Resolution::Unparseable(format!("identity field contains '{KEY_DELIMITER}'"))
                }
                resolution => resolution,
            };
            match resolution {
                Resolution::Resolved(identity) => {
                    entries.push(CatalogEntry::new(path.clone(), identity, *stat));
                }
                Resolution::Unparseable(reason) => {
                    debug!(path = %path, "Unparseable path: {}", reason);
                    invalid.push(InvalidPath {
                        path: path.clone(),
                        recorded: now,
                    });
                }
            }
        }
        self.store.insert_entries(&entries)?;
        self.store.insert_invalid_paths(&invalid)?;

        let refreshed: Vec<_> = plan
            .modified
            .iter()
            .chain(plan.returned.iter())
            .cloned()
            .collect();
        self.store.refresh_entries(&refreshed)?;
        self.store.retire_entries(&plan.missing, now)?;

        let deleted = remove_artifacts(plan.stale_artifacts.iter().map(|p| p.as_path()));

        let run = RunRecord {
            time: now,
            total: plan.scanned,
            new: entries.len(),
            invalid: invalid.len(),
            modified: plan.modified.len(),
            missing: plan.missing.len(),
            returned: plan.returned.len(),
            deleted,
        };
        self.store.append_run(&run)?;

        info!(
            scanned = run.total,
            new = run.new,
            invalid = run.invalid,
            modified = run.modified,
            missing = run.missing,
            returned = run.returned,
            deleted = run.deleted,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Reconciliation complete"
        );
        Ok(run)
    }

    /// Resolve one path. A resolver panic is treated as an unparseable path
    /// so one bad directory cannot abort the batch.
    fn resolve(&self, path: &str) -> Resolution {
        match catch_unwind(AssertUnwindSafe(|| self.resolver.resolve(path))) {
            Ok(resolution) => resolution,
            Err(_) => {
                warn!(path = %path, "Identity resolution panicked");
                Resolution::Unparseable("resolver panicked".to_string())
            }
        }
    }
}
