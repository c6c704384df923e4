//! Best-effort artifact file cleanup.

use crate::{Result, XaggError};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Delete an artifact file. Returns true if a file was removed; a file that
/// is already gone is not an error.
pub fn remove_artifact(path: &Path) -> bool {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!("Deleted artifact {}", path.display());
            true
        }
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!("Failed to delete artifact {}: {}", path.display(), e);
            false
        }
    }
}

/// Delete every artifact in `paths`, returning how many were removed.
pub fn remove_artifacts<'a>(paths: impl IntoIterator<Item = &'a Path>) -> usize {
    paths.into_iter().filter(|p| remove_artifact(p)).count()
}

/// Where an artifact lands in the archive: its path relative to
/// `output_dir`, or just its file name when it lives elsewhere.
pub fn archive_destination(artifact: &Path, output_dir: &Path, archive_dir: &Path) -> PathBuf {
    match artifact.strip_prefix(output_dir) {
        Ok(relative) if !relative.as_os_str().is_empty() => archive_dir.join(relative),
        _ => archive_dir.join(artifact.file_name().unwrap_or(artifact.as_os_str())),
    }
}

/// Move an artifact into the archive. Returns the new location, or `None`
/// when the source no longer exists.
pub fn archive_artifact(
    artifact: &Path,
    output_dir: &Path,
    archive_dir: &Path,
) -> Result<Option<PathBuf>> {
    if !artifact.exists() {
        return Ok(None);
    }
    let dest = archive_destination(artifact, output_dir, archive_dir);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| XaggError::io_with_path(e, parent))?;
    }

    match fs::rename(artifact, &dest) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(_) => {
            // rename fails across filesystems
            fs::copy(artifact, &dest).map_err(|e| XaggError::io_with_path(e, &dest))?;
            fs::remove_file(artifact).map_err(|e| XaggError::io_with_path(e, artifact))?;
        }
    }
    debug!("Archived {} to {}", artifact.display(), dest.display());
    Ok(Some(dest))
}
