//! Path to dataset identity resolution.

use super::activity::cmip5_activity;
use super::dataset::{DatasetId, DatasetIdentity};
use super::grid_label::grid_label;
use super::tables::TableLookup;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::LazyLock;
use tracing::{debug, info};

static BAD_DIRECTORY: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^bad[0-9]").unwrap());

/// Fields filled in when table metadata for a CMIP6 dataset is unavailable.
const UNKNOWN: &str = "unk";

/// Outcome of resolving a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(DatasetIdentity),
    /// The path does not follow a known layout; carries the reason.
    Unparseable(String),
}

impl Resolution {
    pub fn into_identity(self) -> Option<DatasetIdentity> {
        match self {
            Resolution::Resolved(identity) => Some(identity),
            Resolution::Unparseable(_) => None,
        }
    }
}

/// Maps a leaf directory path to the dataset it holds.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, path: &str) -> Resolution;
}

/// Which positional layout a path follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// `.../CMIP6/activity/institute/model/experiment/member/table/variable/grid/version`
    Cmip6,
    /// `.../institute/model/experiment/frequency/realm/table/member/version/variable`
    Cmip5,
    /// As [`Layout::Cmip5`] with the last two segments swapped; the version is `1` or `2`.
    Cmip5Versioned,
}

/// Path segments after normalization, with the layout they follow.
struct Segments {
    meta: Vec<String>,
    layout: Layout,
}

impl Segments {
    fn parse(path: &str) -> std::result::Result<Self, String> {
        let mut meta: Vec<String> = Path::new(path)
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if let Some(last) = meta.last() {
            if BAD_DIRECTORY.is_match(last) {
                return Err(format!("bad directory {last}"));
            }
        }
        // duplicated version directories (.../v20110601/v20110601/ta)
        let n = meta.len();
        if n >= 3 && meta[n - 2] == meta[n - 3] {
            meta.remove(n - 2);
        }
        if meta.len() <= 10 {
            return Err(format!("too few path segments ({})", meta.len()));
        }

        let n = meta.len();
        let layout = if meta[n - 10].to_uppercase() == "CMIP6" {
            Layout::Cmip6
        } else if meta[n - 1] != "1" && meta[n - 1] != "2" {
            Layout::Cmip5
        } else {
            Layout::Cmip5Versioned
        };
        Ok(Self { meta, layout })
    }

    /// Segment counted from the end, 1-based.
    fn back(&self, i: usize) -> &str {
        &self.meta[self.meta.len() - i]
    }

    fn variable(&self) -> &str {
        match self.layout {
            Layout::Cmip6 => self.back(3),
            Layout::Cmip5 => self.back(1),
            Layout::Cmip5Versioned => self.back(2),
        }
    }

    fn version(&self) -> &str {
        match self.layout {
            Layout::Cmip6 => self.back(1),
            Layout::Cmip5 => self.back(2),
            Layout::Cmip5Versioned => self.back(1),
        }
    }

    fn table(&self) -> &str {
        self.back(4)
    }

    fn mip_era(&self) -> String {
        match self.layout {
            Layout::Cmip6 => self.back(10).to_uppercase(),
            Layout::Cmip5 | Layout::Cmip5Versioned => "CMIP5".to_string(),
        }
    }
}

/// Resolver for CMIP5 and CMIP6 publication trees.
pub struct CmipPathResolver {
    tables: TableLookup,
}

impl CmipPathResolver {
    pub fn new(tables: TableLookup) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &TableLookup {
        &self.tables
    }

    /// `(era, table, variable)` a path needs table metadata for, if the path
    /// follows a known layout.
    pub fn table_key(path: &str) -> Option<(String, String, String)> {
        let segments = Segments::parse(path).ok()?;
        Some((
            segments.mip_era(),
            segments.table().to_string(),
            segments.variable().to_string(),
        ))
    }

    /// Warm the table lookup with every distinct table entry the given paths
    /// need. Entries that fail to load are skipped. Returns the number of
    /// entries loaded.
    pub fn prime<'a>(&self, paths: impl IntoIterator<Item = &'a str>) -> usize {
        let mut seen = HashSet::new();
        let mut loaded = 0;
        for path in paths {
            let Some(key) = Self::table_key(path) else {
                continue;
            };
            if !seen.insert(key.clone()) {
                continue;
            }
            if self.tables.lookup(&key.0, &key.1, &key.2).is_ok() {
                loaded += 1;
            }
        }
        info!("Primed {} table entries", loaded);
        loaded
    }

    fn resolve_cmip6(&self, s: &Segments) -> DatasetIdentity {
        let mip_era = s.mip_era();
        let table = s.table();
        let variable = s.variable();
        let grid = s.back(2);
        let (realm, frequency, label) = match self.tables.lookup(&mip_era, table, variable) {
            Ok(entry) => {
                let label = grid_label(&mip_era, table, grid, &entry.dimensions);
                (entry.realm, entry.frequency, label)
            }
            Err(e) => {
                debug!("No table metadata for {}.{}.{}: {}", mip_era, table, variable, e);
                (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string())
            }
        };
        DatasetIdentity {
            activity: s.back(9).to_string(),
            institute: s.back(8).to_string(),
            model: s.back(7).to_string(),
            experiment: s.back(6).to_string(),
            member: s.back(5).to_string(),
            table: table.to_string(),
            realm,
            frequency,
            variable: variable.to_string(),
            grid: grid.to_string(),
            grid_label: label,
            version: s.version().to_string(),
            mip_era,
        }
    }

    fn resolve_cmip5(&self, s: &Segments) -> std::result::Result<DatasetIdentity, String> {
        let mip_era = s.mip_era();
        let table = s.table();
        let variable = s.variable();
        let experiment = s.back(7);
        let grid = "gu";

        let entry = self
            .tables
            .lookup(&mip_era, table, variable)
            .map_err(|e| e.to_string())?;

        let mut frequency = s.back(6).to_string();
        if frequency == "monClim" {
            frequency = "monC".to_string();
        }
        if entry.dimensions.iter().any(|d| d == "time1") {
            frequency.push_str("Pt");
        }

        Ok(DatasetIdentity {
            activity: cmip5_activity(experiment).to_string(),
            institute: s.back(9).to_string(),
            model: s.back(8).to_string(),
            experiment: experiment.to_string(),
            member: s.back(3).to_string(),
            table: table.to_string(),
            realm: s.back(5).to_string(),
            frequency,
            variable: variable.to_string(),
            grid: grid.to_string(),
            grid_label: grid_label(&mip_era, table, grid, &entry.dimensions),
            version: s.version().to_string(),
            mip_era,
        })
    }

    /// Full identity of a published dataset id, used to match retraction
    /// lists against catalog identity keys. Missing table metadata yields
    /// `unk` fields, the same way CMIP6 path resolution does.
    pub fn identity_for_dataset(&self, id: &DatasetId) -> DatasetIdentity {
        let (realm, frequency, label) = match self.tables.lookup(&id.mip_era, &id.table, &id.variable) {
            Ok(entry) => {
                let label = grid_label(&id.mip_era, &id.table, &id.grid, &entry.dimensions);
                (entry.realm, entry.frequency, label)
            }
            Err(_) => (UNKNOWN.to_string(), UNKNOWN.to_string(), UNKNOWN.to_string()),
        };
        DatasetIdentity {
            mip_era: id.mip_era.clone(),
            activity: id.activity.clone(),
            institute: id.institute.clone(),
            model: id.model.clone(),
            experiment: id.experiment.clone(),
            member: id.member.clone(),
            table: id.table.clone(),
            realm,
            frequency,
            variable: id.variable.clone(),
            grid: id.grid.clone(),
            grid_label: label,
            version: id.version.clone(),
        }
    }
}

impl IdentityResolver for CmipPathResolver {
    fn resolve(&self, path: &str) -> Resolution {
        let segments = match Segments::parse(path) {
            Ok(segments) => segments,
            Err(reason) => return Resolution::Unparseable(reason),
        };
        match segments.layout {
            Layout::Cmip6 => Resolution::Resolved(self.resolve_cmip6(&segments)),
            Layout::Cmip5 | Layout::Cmip5Versioned => match self.resolve_cmip5(&segments) {
                Ok(identity) => Resolution::Resolved(identity),
                Err(reason) => Resolution::Unparseable(reason),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tables::write_sample_tables;
    use tempfile::TempDir;

    fn resolver() -> (CmipPathResolver, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        write_sample_tables(temp_dir.path());
        (
            CmipPathResolver::new(TableLookup::new(temp_dir.path())),
            temp_dir,
        )
    }

    const CMIP6_PATH: &str =
        "/p/css03/esgf_publish/CMIP6/CMIP/NOAA-GFDL/GFDL-CM4/historical/r1i1p1f1/Amon/tas/gr1/v20180701";

    #[test]
    fn test_cmip6_path() {
        let (resolver, _temp) = resolver();
        let identity = resolver.resolve(CMIP6_PATH).into_identity().unwrap();
        assert_eq!(
            identity.key(),
            "CMIP6.CMIP.NOAA-GFDL.GFDL-CM4.historical.r1i1p1f1.Amon.atmos.mon.tas.gr1.glb-z1-gr1.v20180701"
        );
    }

    #[test]
    fn test_trailing_slash_and_duplicate_version() {
        let (resolver, _temp) = resolver();
        let plain = "/p/css03/cmip5/output1/NOAA-GFDL/GFDL-CM3/historical/mon/atmos/Amon/r1i1p1/v20110601/ta";
        let doubled =
            "/p/css03/cmip5/output1/NOAA-GFDL/GFDL-CM3/historical/mon/atmos/Amon/r1i1p1/v20110601/v20110601/ta/";
        let a = resolver.resolve(plain).into_identity().unwrap();
        let b = resolver.resolve(doubled).into_identity().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_cmip6_unknown_table() {
        let (resolver, _temp) = resolver();
        let path = "/data/a/CMIP6/CMIP/NCAR/CESM2/piControl/r1i1p1f1/Omon/tos/gn/v1";
        let identity = resolver.resolve(path).into_identity().unwrap();
        assert_eq!(identity.realm, "unk");
        assert_eq!(identity.frequency, "unk");
        assert_eq!(identity.grid_label, "unk");
        assert_eq!(identity.model, "CESM2");
    }

    #[test]
    fn test_cmip5_path() {
        let (resolver, _temp) = resolver();
        let path = "/p/css03/cmip5/output1/NOAA-GFDL/GFDL-CM3/historical/mon/atmos/Amon/r1i1p1/v20110601/ta";
        let identity = resolver.resolve(path).into_identity().unwrap();
        assert_eq!(
            identity.key(),
            "CMIP5.CMIP.NOAA-GFDL.GFDL-CM3.historical.r1i1p1.Amon.atmos.mon.ta.gu.glb-p17-gu.v20110601"
        );
    }

    #[test]
    fn test_cmip5_versioned_layout() {
        let (resolver, _temp) = resolver();
        let path = "/p/css03/cmip5/output1/NOAA-GFDL/GFDL-CM3/decadal1990/monClim/ocean/Oclim/r1i1p1/zfull/1";
        let identity = resolver.resolve(path).into_identity().unwrap();
        assert_eq!(identity.variable, "zfull");
        assert_eq!(identity.version, "1");
        assert_eq!(identity.activity, "DCPP");
        assert_eq!(identity.frequency, "monCPt");
        assert_eq!(identity.grid_label, "glb-l-gu");
    }

    #[test]
    fn test_cmip5_missing_table_is_unparseable() {
        let (resolver, _temp) = resolver();
        let path = "/p/css03/cmip5/output1/NOAA-GFDL/GFDL-CM3/historical/mon/ocean/Omon/r1i1p1/v1/tos";
        assert!(matches!(resolver.resolve(path), Resolution::Unparseable(_)));
    }

    #[test]
    fn test_short_and_bad_paths() {
        let (resolver, _temp) = resolver();
        assert!(matches!(resolver.resolve("/a/b/c"), Resolution::Unparseable(_)));
        let bad = "/p/css03/esgf_publish/CMIP6/CMIP/NOAA-GFDL/GFDL-CM4/historical/r1i1p1f1/Amon/tas/gr1/bad1";
        assert!(matches!(resolver.resolve(bad), Resolution::Unparseable(_)));
    }

    #[test]
    fn test_prime_loads_distinct_entries() {
        let (resolver, _temp) = resolver();
        let loaded = resolver.prime([CMIP6_PATH, CMIP6_PATH, "/too/short"]);
        assert_eq!(loaded, 1);
        assert_eq!(resolver.tables().len(), 1);
    }

    #[test]
    fn test_identity_for_dataset_matches_path_key() {
        let (resolver, _temp) = resolver();
        let id = DatasetId::parse("CMIP6.CMIP.NOAA-GFDL.GFDL-CM4.historical.r1i1p1f1.Amon.tas.gr1.v20180701")
            .unwrap();
        let from_id = resolver.identity_for_dataset(&id);
        let from_path = resolver.resolve(CMIP6_PATH).into_identity().unwrap();
        assert_eq!(from_id.key(), from_path.key());
    }
}
