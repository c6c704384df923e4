//! xagg core - incremental catalog of climate-model data directories.
//!
//! This crate keeps a SQLite catalog of leaf data directories in sync with
//! the filesystem, resolves each directory to the dataset it holds, and
//! drives an external indexing tool that writes one XML artifact per dataset.
//! The command-line front end lives in the `xagg-cli` crate.
//!
//! # Example
//!
//! ```rust,ignore
//! use xagg_core::{Reconciler, RunContext, RunOverrides, RunSettings};
//!
//! #[tokio::main]
//! async fn main() -> xagg_core::Result<()> {
//!     let context = RunContext::new(RunSettings::default(), RunOverrides::default())?;
//!     let _lock = context.acquire_lock()?;
//!     let store = context.open_store()?;
//!     let resolver = context.open_resolver()?;
//!
//!     let inventory = context.scanner().scan(&context.scan_roots()).await;
//!     let run = Reconciler::new(&store, &resolver).reconcile(&inventory, chrono::Utc::now())?;
//!     println!("{} new directories", run.new);
//!     Ok(())
//! }
//! ```

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod context;
pub mod error;
pub mod identity;
pub mod metadata;
pub mod reconcile;
pub mod scan;
pub mod schedule;

pub use artifact::{ArtifactFailure, ArtifactGenerator};
pub use catalog::{
    ArtifactRecord, CatalogEntry, CatalogSnapshot, CatalogStore, DirStat, EntryFilter, RunRecord,
    StatRecord,
};
pub use config::RunSettings;
pub use context::{RunContext, RunLock, RunOverrides};
pub use error::{Result, XaggError};
pub use identity::{CmipPathResolver, DatasetIdentity, IdentityResolver, Resolution};
pub use reconcile::{ReconcilePlan, Reconciler, RetractionReport};
pub use scan::{DirectoryScanner, ScanInventory};
pub use schedule::{select_for_scan, ScanFilters, ScanTarget};
