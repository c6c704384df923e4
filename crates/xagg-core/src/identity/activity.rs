//! CMIP5 experiment to activity mapping.
//!
//! CMIP5 directory trees carry no activity segment, so the activity is
//! inferred from the experiment name.

use regex::Regex;
use std::sync::LazyLock;

static DECADAL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"decadal[0-9]{4}").unwrap());

const ACTIVITY_TABLE: &[(&str, &str)] = &[
    ("sst2030", "CFMIP"),
    ("amip4xCO2", "CFMIP"),
    ("amipFuture", "CFMIP"),
    ("aquaControl", "CFMIP"),
    ("aqua4xCO2", "CFMIP"),
    ("aqua4K", "CFMIP"),
    ("amip4K", "CFMIP"),
    ("sstClim", "RFMIP"),
    ("sstClim4xCO2", "RFMIP"),
    ("sstClimAerosol", "RFMIP"),
    ("sstClimSulfate", "RFMIP"),
    ("piControl", "CMIP"),
    ("historical", "CMIP"),
    ("esmControl", "CMIP"),
    ("esmHistorical", "CMIP"),
    ("1pctCO2", "CMIP"),
    ("abrupt4xCO2", "CMIP"),
    ("amip", "CMIP"),
    ("historicalExt", "CMIP"),
    ("esmrcp85", "C4MIP"),
    ("esmFixClim1", "C4MIP"),
    ("esmFixClim2", "C4MIP"),
    ("esmFdbk1", "C4MIP"),
    ("esmFdbk2", "C4MIP"),
    ("historicalNat", "DAMIP"),
    ("historicalGHG", "DAMIP"),
    ("historicalMisc", "DAMIP"),
    ("midHolocene", "PMIP"),
    ("lgm", "PMIP"),
    ("past1000", "PMIP"),
    ("rcp45", "ScenarioMIP"),
    ("rcp85", "ScenarioMIP"),
    ("rcp26", "ScenarioMIP"),
    ("rcp60", "ScenarioMIP"),
];

/// True for decadal hindcast experiments (`decadal1960`, ...).
pub fn is_decadal(experiment: &str) -> bool {
    DECADAL.is_match(experiment)
}

/// Activity a CMIP5 experiment belongs to. Unknown experiments map to `CMIP5`.
pub fn cmip5_activity(experiment: &str) -> &'static str {
    if is_decadal(experiment) {
        return "DCPP";
    }
    ACTIVITY_TABLE
        .iter()
        .find(|(name, _)| *name == experiment)
        .map(|(_, activity)| *activity)
        .unwrap_or("CMIP5")
}

/// Directory name used for an experiment in the artifact tree. All decadal
/// experiments share one directory.
pub fn experiment_directory(experiment: &str) -> &str {
    if is_decadal(experiment) {
        "decadal"
    } else {
        experiment
    }
}
