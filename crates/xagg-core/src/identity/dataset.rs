//! Structured dataset identity.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Delimiter used when the identity is serialized into an identity key.
pub const KEY_DELIMITER: &str = ".";

/// The logical dataset a leaf directory holds, independent of where on disk
/// it was published.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetIdentity {
    pub mip_era: String,
    pub activity: String,
    pub institute: String,
    pub model: String,
    pub experiment: String,
    pub member: String,
    pub table: String,
    pub realm: String,
    pub frequency: String,
    pub variable: String,
    pub grid: String,
    pub grid_label: String,
    pub version: String,
}

impl DatasetIdentity {
    /// Field values in identity-key order.
    pub fn fields(&self) -> [&str; 13] {
        [
            &self.mip_era,
            &self.activity,
            &self.institute,
            &self.model,
            &self.experiment,
            &self.member,
            &self.table,
            &self.realm,
            &self.frequency,
            &self.variable,
            &self.grid,
            &self.grid_label,
            &self.version,
        ]
    }

    /// Serialized identity key, the value stored in the catalog and used for
    /// deduplication and retraction matching.
    pub fn key(&self) -> String {
        self.fields().join(KEY_DELIMITER)
    }

    /// ESGF-style dataset id (`era.activity.institute.model.experiment.member.table.variable.grid.version`),
    /// the naming scheme retraction lists use.
    pub fn dataset_id(&self) -> String {
        [
            self.mip_era.as_str(),
            &self.activity,
            &self.institute,
            &self.model,
            &self.experiment,
            &self.member,
            &self.table,
            &self.variable,
            &self.grid,
            &self.version,
        ]
        .join(".")
    }

    /// True when any field contains the key delimiter, which would make the
    /// serialized key ambiguous.
    pub fn has_delimiter_collision(&self) -> bool {
        self.fields().iter().any(|f| f.contains(KEY_DELIMITER))
    }
}

impl fmt::Display for DatasetIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Components of a dataset id as published in retraction lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetId {
    pub mip_era: String,
    pub activity: String,
    pub institute: String,
    pub model: String,
    pub experiment: String,
    pub member: String,
    pub table: String,
    pub variable: String,
    pub grid: String,
    pub version: String,
}

impl DatasetId {
    /// Parse a ten-part dotted dataset id. Anything after the tenth part
    /// (such as an `|data_node` suffix) is ignored.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let value = value.split('|').next().unwrap_or(value);
        let parts: Vec<&str> = value.split('.').collect();
        if parts.len() < 10 || parts[..10].iter().any(|p| p.is_empty()) {
            return None;
        }
        Some(Self {
            mip_era: parts[0].to_string(),
            activity: parts[1].to_string(),
            institute: parts[2].to_string(),
            model: parts[3].to_string(),
            experiment: parts[4].to_string(),
            member: parts[5].to_string(),
            table: parts[6].to_string(),
            variable: parts[7].to_string(),
            grid: parts[8].to_string(),
            version: parts[9].to_string(),
        })
    }
}

#[cfg(test)]
pub(crate) fn sample_identity() -> DatasetIdentity {
    DatasetIdentity {
        mip_era: "CMIP6".into(),
        activity: "CMIP".into(),
        institute: "NOAA".into(),
        model: "modelX".into(),
        experiment: "historical".into(),
        member: "r1i1p1f1".into(),
        table: "Amon".into(),
        realm: "atmos".into(),
        frequency: "mon".into(),
        variable: "tas".into(),
        grid: "gn".into(),
        grid_label: "glb-z1-gn".into(),
        version: "v1".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order() {
        assert_eq!(
            sample_identity().key(),
            "CMIP6.CMIP.NOAA.modelX.historical.r1i1p1f1.Amon.atmos.mon.tas.gn.glb-z1-gn.v1"
        );
    }

    #[test]
    fn test_dataset_id() {
        assert_eq!(
            sample_identity().dataset_id(),
            "CMIP6.CMIP.NOAA.modelX.historical.r1i1p1f1.Amon.tas.gn.v1"
        );
    }

    #[test]
    fn test_parse_dataset_id() {
        let id = DatasetId::parse("CMIP6.CMIP.NOAA.modelX.historical.r1i1p1f1.Amon.tas.gn.v1|esgf.node")
            .unwrap();
        assert_eq!(id.variable, "tas");
        assert_eq!(id.version, "v1");
        assert!(DatasetId::parse("CMIP6.CMIP.NOAA").is_none());
        assert!(DatasetId::parse("CMIP6..NOAA.m.e.r.t.v.g.v1").is_none());
    }

    #[test]
    fn test_delimiter_collision() {
        let mut identity = sample_identity();
        assert!(!identity.has_delimiter_collision());
        identity.version = "v1.1".into();
        assert!(identity.has_delimiter_collision());
    }
}
