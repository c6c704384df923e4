//! CMOR table lookups.
//!
//! Frequency, realm and dimensions are not part of a CMIP6 directory path, and
//! CMIP5 paths lack the dimensions needed for grid labels. They come from the
//! CMOR tables: `cmip6/CMIP6_<table>.json` and `cmip5/CMIP5_<table>` under a
//! tables directory. Answers are memoized and can be persisted as a JSON
//! cache so a run does not reparse tables for every path.

use crate::metadata::{atomic_read_json, atomic_write_json};
use crate::{Result, XaggError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Table metadata for one variable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntry {
    pub frequency: String,
    pub realm: String,
    pub dimensions: Vec<String>,
}

/// Memoizing CMOR table reader.
pub struct TableLookup {
    tables_dir: PathBuf,
    entries: RwLock<HashMap<String, TableEntry>>,
}

impl TableLookup {
    pub fn new(tables_dir: impl Into<PathBuf>) -> Self {
        Self {
            tables_dir: tables_dir.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Create a lookup seeded from a JSON cache file, if one exists.
    pub fn with_cache(tables_dir: impl Into<PathBuf>, cache_path: &Path) -> Result<Self> {
        let lookup = Self::new(tables_dir);
        if let Some(cached) = atomic_read_json::<HashMap<String, TableEntry>>(cache_path)? {
            info!("Loaded {} table entries from {}", cached.len(), cache_path.display());
            *lookup.write_entries()? = cached;
        }
        Ok(lookup)
    }

    fn cache_key(mip_era: &str, table: &str, variable: &str) -> String {
        format!("{mip_era}.{table}.{variable}")
    }

    fn write_entries(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<String, TableEntry>>> {
        self.entries.write().map_err(|_| XaggError::Other(
            "Table lookup cache lock poisoned".to_string(),
        ))
    }

    /// Number of memoized entries.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a variable, reading the table on a cache miss.
    pub fn lookup(&self, mip_era: &str, table: &str, variable: &str) -> Result<TableEntry> {
        let key = Self::cache_key(mip_era, table, variable);
        if let Ok(entries) = self.entries.read() {
            if let Some(entry) = entries.get(&key) {
                return Ok(entry.clone());
            }
        }

        let entry = match mip_era {
            "CMIP6" => self.read_cmip6(table, variable)?,
            "CMIP5" => self.read_cmip5(table, variable)?,
            other => {
                return Err(XaggError::Lookup {
                    era: other.to_string(),
                    table: table.to_string(),
                    variable: variable.to_string(),
                    message: "unsupported MIP era".to_string(),
                })
            }
        };

        debug!("Read table entry {}", key);
        self.write_entries()?.insert(key, entry.clone());
        Ok(entry)
    }

    /// Persist memoized entries.
    pub fn save(&self, cache_path: &Path) -> Result<()> {
        let entries = self
            .entries
            .read()
            .map_err(|_| XaggError::Other("Table lookup cache lock poisoned".to_string()))?;
        atomic_write_json(cache_path, &*entries, false)
    }

    fn read_table(&self, path: &Path, mip_era: &str, table: &str, variable: &str) -> Result<String> {
        fs::read_to_string(path).map_err(|e| XaggError::Lookup {
            era: mip_era.to_string(),
            table: table.to_string(),
            variable: variable.to_string(),
            message: format!("cannot read {}: {}", path.display(), e),
        })
    }

    fn read_cmip6(&self, table: &str, variable: &str) -> Result<TableEntry> {
        let path = self
            .tables_dir
            .join("cmip6")
            .join(format!("CMIP6_{table}.json"));
        let text = self.read_table(&path, "CMIP6", table, variable)?;
        let doc: serde_json::Value = serde_json::from_str(&text)?;
        let missing = |field: &str| XaggError::Lookup {
            era: "CMIP6".to_string(),
            table: table.to_string(),
            variable: variable.to_string(),
            message: format!("missing {field}"),
        };

        let var = doc
            .get("variable_entry")
            .and_then(|v| v.get(variable))
            .ok_or_else(|| missing("variable_entry"))?;
        let field = |name: &str| {
            var.get(name)
                .and_then(|v| v.as_str())
                .ok_or_else(|| missing(name))
        };

        Ok(TableEntry {
            frequency: field("frequency")?.to_string(),
            realm: field("modeling_realm")?
                .split(' ')
                .next()
                .unwrap_or_default()
                .to_string(),
            dimensions: field("dimensions")?
                .split(' ')
                .map(str::to_string)
                .collect(),
        })
    }

    /// CMIP5 tables are line-oriented text. The table-wide `frequency:` line
    /// precedes the variable entries; within a variable entry the
    /// `modeling_realm:` and `dimensions:` lines follow. A variable the table
    /// does not list yields empty realm and dimensions.
    fn read_cmip5(&self, table: &str, variable: &str) -> Result<TableEntry> {
        let path = self.tables_dir.join("cmip5").join(format!("CMIP5_{table}"));
        let text = self.read_table(&path, "CMIP5", table, variable)?;

        let mut entry = TableEntry::default();
        let mut in_variable = false;
        for line in text.lines() {
            if line.contains("frequency:") {
                entry.frequency = line.split(' ').nth(1).unwrap_or_default().to_string();
            }
            if line.contains("variable_entry:") && line.ends_with(variable) {
                in_variable = true;
            }
            if in_variable && line.contains("modeling_realm:") {
                entry.realm = line.split(' ').last().unwrap_or_default().to_string();
            }
            if in_variable && line.contains("dimensions:") {
                entry.dimensions = line
                    .split("  ")
                    .last()
                    .unwrap_or_default()
                    .split(' ')
                    .map(str::to_string)
                    .collect();
                break;
            }
        }
        Ok(entry)
    }
}

#[cfg(test)]
pub(crate) fn write_sample_tables(dir: &Path) {
    fs::create_dir_all(dir.join("cmip6")).unwrap();
    fs::create_dir_all(dir.join("cmip5")).unwrap();
    fs::write(
        dir.join("cmip6").join("CMIP6_Amon.json"),
        serde_json::json!({
            "variable_entry": {
                "tas": {
                    "frequency": "mon",
                    "modeling_realm": "atmos",
                    "dimensions": "longitude latitude time height2m"
                },
                "ta": {
                    "frequency": "mon",
                    "modeling_realm": "atmos aerosol",
                    "dimensions": "longitude latitude plev19 time"
                }
            }
        })
        .to_string(),
    )
    .unwrap();
    fs::write(
        dir.join("cmip5").join("CMIP5_Amon"),
        "table_id: Table Amon\n\
         frequency: mon\n\
         \n\
         variable_entry:    tas\n\
         modeling_realm:    atmos\n\
         dimensions:        longitude latitude time height2m\n\
         \n\
         variable_entry:    ta\n\
         modeling_realm:    atmos\n\
         dimensions:        longitude latitude plevs time\n",
    )
    .unwrap();
    fs::write(
        dir.join("cmip5").join("CMIP5_Oclim"),
        "frequency: monClim\n\
         variable_entry:    difmxylo\n\
         modeling_realm:    ocean\n\
         dimensions:        longitude latitude olevel time2\n\
         variable_entry:    zfull\n\
         modeling_realm:    ocean\n\
         dimensions:        longitude latitude olevel time1\n",
    )
    .unwrap();
}
