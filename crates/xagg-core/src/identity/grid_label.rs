//! Grid label derivation.
//!
//! A grid label is `region-vertical-horizontal` followed by a short form of
//! the native grid code, e.g. `glb-p8-gn`. Labels become part of identity
//! keys, so the decision tables below must not drift.

use regex::Regex;
use std::sync::LazyLock;

static P_LEVEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"p[0-9]").unwrap());
static PL_LEVEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"pl[0-9]").unwrap());
static PLEV_LEVEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"plev[0-9]").unwrap());

/// Single-level vertical coordinates.
const SINGLE_LEVEL: &[&str] = &[
    "height2m",
    "height10m",
    "depth0m",
    "depth100m",
    "olayer100m",
    "sdepth1",
    "sdepth10",
    "height100m",
    "depth300m",
    "depth700m",
    "depth2000m",
];

/// Model-level vertical coordinates.
const MODEL_LEVEL: &[&str] = &["olevel", "olevhalf", "alevel", "alevhalf"];

/// Station, transect and basin dimensions.
const LOCATION: &[&str] = &["site", "oline", "basin", "siline", "location"];

/// Horizontal lat/lon style dimensions.
const HORIZONTAL: &[&str] = &["latitude", "yant", "ygre", "longitude", "xant"];

const ZONAL_TABLES: &[&str] = &["AERmonZ", "E6hrZ", "EdayZ", "EmonZ"];

fn has_any(dimensions: &[String], names: &[&str]) -> bool {
    dimensions.iter().any(|d| names.contains(&d.as_str()))
}

fn has(dimensions: &[String], name: &str) -> bool {
    dimensions.iter().any(|d| d == name)
}

/// Vertical class of a dimension list.
pub fn vertical_class(dimensions: &[String]) -> String {
    if dimensions.is_empty() {
        return "x".to_string();
    }
    if has_any(dimensions, SINGLE_LEVEL) {
        return "z1".to_string();
    }
    if dimensions
        .iter()
        .any(|d| P_LEVEL.is_match(d) || PL_LEVEL.is_match(d))
    {
        return "p1".to_string();
    }
    if has_any(dimensions, MODEL_LEVEL) {
        return "l".to_string();
    }
    let fixed = [
        ("alev1", "l1"),
        ("sdepth", "z"),
        ("alt16", "z16"),
        ("alt40", "z40"),
        ("rho", "d"),
        ("plevs", "p17"),
    ];
    if let Some((_, class)) = fixed.iter().find(|(dim, _)| has(dimensions, dim)) {
        return class.to_string();
    }
    if let Some(dim) = dimensions.iter().find(|d| PLEV_LEVEL.is_match(d)) {
        let levels = dim.split("plev").nth(1).unwrap_or_default();
        return format!("p{levels}");
    }
    "2d".to_string()
}

/// Region class. Only CMIP6 has ice-sheet tables.
pub fn region_class(mip_era: &str, table: &str) -> &'static str {
    if mip_era != "CMIP6" {
        return "glb";
    }
    match table {
        "IfxAnt" | "IyrAnt" | "ImonAnt" => "ant",
        "IfxGre" | "IyrGre" | "ImonGre" => "gre",
        _ => "glb",
    }
}

/// Horizontal discretization class.
pub fn horizontal_class(table: &str, dimensions: &[String]) -> &'static str {
    if has_any(dimensions, LOCATION) {
        "s"
    } else if ZONAL_TABLES.contains(&table) {
        "z"
    } else if !has_any(dimensions, HORIZONTAL) {
        "m"
    } else {
        "g"
    }
}

/// Short form of the native grid code appended to the label.
pub fn grid_suffix(grid: &str) -> String {
    if grid == "gm" {
        "n".to_string()
    } else {
        grid.chars().filter(|c| !matches!(c, 'g' | 'a' | 'z')).collect()
    }
}

/// Build the grid label for a dataset.
pub fn grid_label(mip_era: &str, table: &str, grid: &str, dimensions: &[String]) -> String {
    format!(
        "{}-{}-{}{}",
        region_class(mip_era, table),
        vertical_class(dimensions),
        horizontal_class(table, dimensions),
        grid_suffix(grid)
    )
}
