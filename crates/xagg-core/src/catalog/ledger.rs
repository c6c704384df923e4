//! Run history and catalog statistics.

use super::store::CatalogStore;
use super::types::{format_timestamp, parse_timestamp, RunRecord};
use crate::Result;
use chrono::{DateTime, Utc};
use rusqlite::params;
use rusqlite::types::Type;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One statistics indicator sampled at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatRecord {
    pub indicator: String,
    pub value: i64,
    pub time: DateTime<Utc>,
}

/// Indicator names paired with the predicate counted over live entries.
const INDICATORS: &[(&str, &str)] = &[
    ("cmip5 directories", "mip_era = 'CMIP5'"),
    ("cmip6 directories", "mip_era = 'CMIP6'"),
    ("cmip5 xml files", "mip_era = 'CMIP5' AND artifact_path IS NOT NULL"),
    ("cmip6 xml files", "mip_era = 'CMIP6' AND artifact_path IS NOT NULL"),
    (
        "undefined vertical grid (cmip5)",
        "mip_era = 'CMIP5' AND grid_label LIKE '%-x-%'",
    ),
    (
        "undefined vertical grid (cmip6)",
        "mip_era = 'CMIP6' AND grid_label LIKE '%-x-%'",
    ),
];

impl CatalogStore {
    /// Append a reconciliation summary to the run history.
    pub fn append_run(&self, run: &RunRecord) -> Result<()> {
        let conn = self.lock_conn()?;
        conn.execute(
            "INSERT INTO runs (time, total, new, invalid, modified, missing, returned, deleted)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                format_timestamp(&run.time),
                run.total as i64,
                run.new as i64,
                run.invalid as i64,
                run.modified as i64,
                run.missing as i64,
                run.returned as i64,
                run.deleted as i64,
            ],
        )?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: usize) -> Result<Vec<RunRecord>> {
        let conn = self.lock_conn()?;
        let mut stmt = conn.prepare(
            "SELECT time, total, new, invalid, modified, missing, returned, deleted
             FROM runs ORDER BY id DESC LIMIT ?1",
        )?;
        let runs = stmt
            .query_map(params![limit as i64], |row| {
                let time: String = row.get(0)?;
                let time = parse_timestamp(&time).map_err(|e| {
                    rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
                })?;
                Ok(RunRecord {
                    time,
                    total: row.get::<_, i64>(1)? as usize,
                    new: row.get::<_, i64>(2)? as usize,
                    invalid: row.get::<_, i64>(3)? as usize,
                    modified: row.get::<_, i64>(4)? as usize,
                    missing: row.get::<_, i64>(5)? as usize,
                    returned: row.get::<_, i64>(6)? as usize,
                    deleted: row.get::<_, i64>(7)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Sample every indicator over non-retired entries and append the values
    /// to the stats table.
    pub fn write_stats(&self, now: DateTime<Utc>) -> Result<Vec<StatRecord>> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;
        let time = format_timestamp(&now);
        let mut records = Vec::with_capacity(INDICATORS.len());
        for (indicator, predicate) in INDICATORS {
            let value: i64 = tx.query_row(
                &format!("SELECT COUNT(*) FROM entries WHERE retired = 0 AND {predicate}"),
                [],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO stats (indicator, value, time) VALUES (?1, ?2, ?3)",
                params![indicator, value, time],
            )?;
            records.push(StatRecord {
                indicator: indicator.to_string(),
                value,
                time: now,
            });
        }
        tx.commit()?;
        info!("Wrote {} catalog statistics", records.len());
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogEntry, DirStat};
    use crate::identity::sample_identity;
    use chrono::TimeZone;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 2, 1, hour, 0, 0).unwrap()
    }

    fn run(hour: u32, new: usize) -> RunRecord {
        RunRecord {
            time: ts(hour),
            total: 10,
            new,
            invalid: 1,
            modified: 0,
            missing: 0,
            returned: 0,
            deleted: 0,
        }
    }

    #[test]
    fn test_runs_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("c.db")).unwrap();
        store.append_run(&run(1, 3)).unwrap();
        store.append_run(&run(2, 0)).unwrap();

        let runs = store.list_runs(10).unwrap();
        assert_eq!(runs, vec![run(2, 0), run(1, 3)]);
        assert_eq!(store.list_runs(1).unwrap().len(), 1);
    }

    #[test]
    fn test_stats_skip_retired_entries() {
        let temp_dir = TempDir::new().unwrap();
        let store = CatalogStore::new(temp_dir.path().join("c.db")).unwrap();

        let mut with_xml = CatalogEntry::new("/a", sample_identity(), DirStat::uniform(ts(0)));
        with_xml.artifact_path = Some(PathBuf::from("/out/a.xml"));
        let mut undefined = CatalogEntry::new("/b", sample_identity(), DirStat::uniform(ts(0)));
        undefined.identity.grid_label = "glb-x-m".into();
        let mut retired = CatalogEntry::new("/c", sample_identity(), DirStat::uniform(ts(0)));
        retired.retired = true;
        let mut cmip5 = CatalogEntry::new("/d", sample_identity(), DirStat::uniform(ts(0)));
        cmip5.identity.mip_era = "CMIP5".into();
        store
            .insert_entries(&[with_xml, undefined, retired, cmip5])
            .unwrap();

        let stats = store.write_stats(ts(3)).unwrap();
        let value = |name: &str| stats.iter().find(|s| s.indicator == name).unwrap().value;
        assert_eq!(value("cmip6 directories"), 2);
        assert_eq!(value("cmip5 directories"), 1);
        assert_eq!(value("cmip6 xml files"), 1);
        assert_eq!(value("undefined vertical grid (cmip6)"), 1);
        assert_eq!(value("undefined vertical grid (cmip5)"), 0);
    }
}
