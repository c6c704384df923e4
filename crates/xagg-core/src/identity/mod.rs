//! Dataset identity: the structured tuple a leaf directory resolves to, and
//! the resolver that derives it from CMIP directory layouts.

mod activity;
mod dataset;
mod grid_label;
mod resolver;
mod tables;

pub use activity::{cmip5_activity, experiment_directory, is_decadal};
pub use dataset::{DatasetId, DatasetIdentity, KEY_DELIMITER};
pub use grid_label::grid_label;
pub use resolver::{CmipPathResolver, IdentityResolver, Resolution};
pub use tables::{TableEntry, TableLookup};

#[cfg(test)]
pub(crate) use dataset::sample_identity;
#[cfg(test)]
pub(crate) use tables::write_sample_tables;
