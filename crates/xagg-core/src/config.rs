//! Centralized configuration for xagg.
//!
//! Compile-time constants live in unit structs grouped by component.
//! Operator-editable settings (data roots, scheduling filters, output
//! locations) live in [`RunSettings`], which has built-in defaults and can be
//! overridden from a JSON file.

use crate::error::{Result, XaggError};
use crate::metadata::atomic_read_json;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Catalog store and reconciliation constants.
pub struct CatalogConfig;

impl CatalogConfig {
    /// Rows written per transaction in batched updates.
    pub const BATCH_SIZE: usize = 1000;
    /// A scan must find at least this fraction of live catalog paths.
    pub const SAFETY_RATIO: f64 = 0.9;
    pub const BUSY_TIMEOUT_MS: u64 = 30_000;
    /// Timestamp text format stored in the catalog.
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
    /// Error value stored on entries ignored because of a retraction.
    pub const RETRACTED_ERROR: &'static str = "retracted";
}

/// Scheduling constants.
pub struct ScheduleConfig;

impl ScheduleConfig {
    /// Directories modified more recently than this are still being written.
    pub const STALENESS_WINDOW: Duration = Duration::from_secs(24 * 3600);
}

/// Artifact generation constants.
pub struct ArtifactConfig;

impl ArtifactConfig {
    /// Directories handed to the worker pool per chunk.
    pub const CHUNK_SIZE: usize = 1000;
    /// Placeholder overwritten with the 7-bit warning code.
    pub const WARNING_PLACEHOLDER: &'static str = "0000000";
    /// Reserved trailing token.
    pub const RESERVED_TOKEN: &'static str = "0";
    pub const EXTENSION: &'static str = "xml";
    pub const INPUT_EXTENSION: &'static str = "nc";
    pub const DEFAULT_TOOL: &'static str = "cdscan";
    /// Warning text longer than this is stored, truncated, as the entry error.
    pub const MAX_WARNING_LEN: usize = 255;
}

/// Advisory run lock constants.
pub struct LockConfig;

impl LockConfig {
    pub const LOCK_FILENAME: &'static str = "xagg.lock";
}

/// Operator-editable run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunSettings {
    /// SQLite catalog database.
    pub database: PathBuf,
    /// JSON cache of CMOR table lookups.
    pub metadata_cache: PathBuf,
    /// Directory holding `cmip6/CMIP6_<table>.json` and `cmip5/CMIP5_<table>` tables.
    pub tables_directory: PathBuf,
    /// Directory where the run lock file is created.
    pub lock_directory: PathBuf,
    /// Parent directories scanned as a whole.
    pub data_directories: Vec<PathBuf>,
    /// Parent directories whose immediate children are scanned as separate roots.
    pub split_directories: Vec<PathBuf>,
    /// Directories never scanned.
    pub excluded_directories: Vec<PathBuf>,
    pub variables: Vec<String>,
    pub frequencies: Vec<String>,
    pub experiments: Vec<String>,
    /// Base directory of the XML artifact tree.
    pub output_directory: PathBuf,
    /// Where artifacts of retracted datasets are moved.
    pub archive_directory: PathBuf,
    /// Worker pool size for scanning and artifact generation.
    pub workers: usize,
    /// Indexing tool executable.
    pub tool: String,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            database: PathBuf::from("xml.db"),
            metadata_cache: PathBuf::from("data/cmipMeta.json"),
            tables_directory: PathBuf::from("data"),
            lock_directory: PathBuf::from("."),
            data_directories: DEFAULT_DATA_DIRECTORIES.iter().map(PathBuf::from).collect(),
            split_directories: DEFAULT_SPLIT_DIRECTORIES.iter().map(PathBuf::from).collect(),
            excluded_directories: DEFAULT_EXCLUDED_DIRECTORIES
                .iter()
                .map(PathBuf::from)
                .collect(),
            variables: to_strings(DEFAULT_VARIABLES),
            frequencies: to_strings(DEFAULT_FREQUENCIES),
            experiments: to_strings(DEFAULT_EXPERIMENTS),
            output_directory: PathBuf::from("/p/user_pub/xclim/"),
            archive_directory: PathBuf::from("/p/user_pub/xclim-retracted/"),
            workers: 20,
            tool: ArtifactConfig::DEFAULT_TOOL.to_string(),
        }
    }
}

impl RunSettings {
    /// Load settings from a JSON file. Missing keys fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        atomic_read_json(path)?.ok_or_else(|| XaggError::Config {
            message: format!("Settings file not found: {}", path.display()),
        })
    }

    /// Reject settings no run can work with.
    pub fn validate(&self) -> Result<()> {
        if self.workers == 0 {
            return Err(XaggError::Config {
                message: "workers must be at least 1".to_string(),
            });
        }
        if self.tool.trim().is_empty() {
            return Err(XaggError::Config {
                message: "tool must name an executable".to_string(),
            });
        }
        Ok(())
    }
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

const DEFAULT_DATA_DIRECTORIES: &[&str] = &[
    "/p/css03/cmip5_css01/data/cmip5/output1/",
    "/p/css03/cmip5_css01/data/cmip5/output2/",
    "/p/css03/cmip5_css02/data/cmip5/output1/",
    "/p/css03/cmip5_css02/data/cmip5/output2/",
    "/p/css03/scratch/cmip5/",
    "/p/css03/scratch/published-latest/cmip5/",
    "/p/css03/scratch/published-latest/cmip5/cmip5_css01/scratch/cmip5/",
    "/p/css03/scratch/published-older/cmip5/",
    "/p/css03/scratch/should-publish/cmip5/",
    "/p/css03/scratch/unknown-dset/cmip5/",
    "/p/css03/scratch/unknown-status/cmip5/",
    "/p/css03/scratch/obsolete/cmip5/",
    "/p/css03/esgf_publish/cmip5/",
    "/p/user_pub/xclim/extension/",
];

const DEFAULT_SPLIT_DIRECTORIES: &[&str] =
    &["/p/css03/esgf_publish/CMIP6/", "/p/css03/scratch/cmip6/"];

const DEFAULT_EXCLUDED_DIRECTORIES: &[&str] = &["/p/css03/esgf_publish/CMIP6/input4MIPs/"];

const DEFAULT_VARIABLES: &[&str] = &[
    // land ice / snow
    "snc", "snd", "snw", "tpf", "pflw", "sic", "sim", "sit",
    // ocean
    "agessc", "cfc11", "dissic", "evs", "ficeberg", "friver", "hfds", "mfo", "mlotst", "omlmax",
    "ph", "rhopoto", "sfriver", "so", "soga", "sos", "tauuo", "tauvo", "thetao", "thetaoga", "tos",
    "uo", "vo", "vsf", "vsfcorr", "vsfevap", "vsfpr", "vsfriver", "wfo", "wfonocorr", "zos",
    "zostoga",
    // land
    "cropfrac", "evspsblsoi", "evspsblveg", "gpp", "lai", "mrfso", "mrro", "mrros", "mrso", "mrsos",
    "tran", "tsl",
    // fixed fields
    "areacella", "areacello", "basin", "deptho", "mrsofc", "orog", "sftgif", "sftlf", "sftof",
    "volcello",
    // atmosphere
    "cl", "clcalipso", "cli", "clisccp", "clivi", "clt", "clw", "clwvi", "evspsbl", "hfls", "hfss",
    "hur", "hurs", "hus", "huss", "mc", "pr", "prc", "prsn", "prw", "ps", "psl", "rlds", "rldscs",
    "rlus", "rluscs", "rlut", "rlutcs", "rsds", "rsdscs", "rsdt", "rsus", "rsuscs", "rsut", "rsutcs",
    "sbl", "sci", "sfcWind", "ta", "tas", "tasmax", "tasmin", "tauu", "tauv", "ts", "ua", "uas", "va",
    "vas", "wap", "zg", "clhcalipso", "clmcalipso", "cllcalipso", "cltcalipso", "pfull",
];

const DEFAULT_FREQUENCIES: &[&str] = &["fx", "mon"];

const DEFAULT_EXPERIMENTS: &[&str] = &[
    "1pctCO2", "abrupt4xCO2", "amip", "amip4K", "amip4xCO2", "amipFuture", "historical",
    "historicalExt", "historicalGHG", "historicalMisc", "historicalNat", "past1000", "piControl",
    "rcp26", "rcp45", "rcp60", "rcp85", "sstClim", "sstClim4xCO2", "abrupt-4xCO2", "amip-4xCO2",
    "amip-p4K", "amip-m4K", "hist-aer", "hist-GHG", "hist-nat", "ssp119", "ssp126", "ssp245",
    "ssp370", "ssp434", "ssp460", "ssp585", "amip-future4K", "abrupt-solp4p", "abrupt-solm4p",
    "abrupt-2xCO2", "abrupt-0p5xCO2", "piClim-control", "piClim-anthro", "piClim-ghg",
    "piClim-aerO3", "piClim-lu", "piClim-4xCO2", "piClim-histall", "piClim-histnat",
    "piClim-histghg", "piClim-histaerO3", "amip-piForcing",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::atomic_write_json;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = RunSettings::default();
        assert_eq!(settings.workers, 20);
        assert_eq!(settings.frequencies, vec!["fx", "mon"]);
        assert!(settings.experiments.iter().any(|e| e == "ssp585"));
        assert!(settings.experiments.iter().any(|e| e == "amip-future4K"));
        assert!(settings.variables.iter().any(|v| v == "tas"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_partial_settings_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("settings.json");
        atomic_write_json(
            &path,
            &serde_json::json!({"workers": 4, "variables": ["tas"]}),
            false,
        )
        .unwrap();

        let settings = RunSettings::load(&path).unwrap();
        assert_eq!(settings.workers, 4);
        assert_eq!(settings.variables, vec!["tas"]);
        assert_eq!(settings.database, PathBuf::from("xml.db"));
    }

    #[test]
    fn test_missing_settings_file() {
        let temp_dir = TempDir::new().unwrap();
        let err = RunSettings::load(&temp_dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, XaggError::Config { .. }));
    }

    #[test]
    fn test_zero_workers_rejected() {
        let settings = RunSettings {
            workers: 0,
            ..RunSettings::default()
        };
        assert!(settings.validate().is_err());
    }
}
