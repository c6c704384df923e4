//! Reconciliation of the catalog against the filesystem and against
//! retraction lists.

mod maintenance;
mod plan;
mod reconciler;
mod retraction;

pub use maintenance::{ignore, purge, reset, MaintenanceReport};
pub use plan::{check_safety, ReconcilePlan};
pub use reconciler::Reconciler;
pub use retraction::{read_retraction_list, reconcile_retractions, retracted_keys, RetractionReport};
