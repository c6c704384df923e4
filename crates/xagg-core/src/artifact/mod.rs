//! XML index artifacts: file naming, tool invocation, diagnostics and
//! on-disk cleanup.

mod diagnostics;
mod files;
mod generator;
mod naming;

pub use diagnostics::{extract_warnings, warning_code, ArtifactFailure};
pub use files::{archive_artifact, archive_destination, remove_artifact, remove_artifacts};
pub use generator::ArtifactGenerator;
pub use naming::{artifact_filename, artifact_path, with_warning_code};
