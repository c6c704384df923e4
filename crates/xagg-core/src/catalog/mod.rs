//! Persistent catalog of leaf data directories.

mod ledger;
mod store;
mod types;

pub use ledger::StatRecord;
pub use store::CatalogStore;
pub use types::{
    format_timestamp, from_system_time, parse_timestamp, truncate_to_seconds, ArtifactRecord,
    CatalogEntry, CatalogSnapshot, DirStat, EntryFilter, InvalidPath, RunRecord,
};
