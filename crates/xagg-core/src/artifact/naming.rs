//! Artifact file layout.

use crate::config::ArtifactConfig;
use crate::identity::{experiment_directory, DatasetIdentity};
use std::path::{Path, PathBuf};

/// File name of the artifact for a dataset, with the warning placeholder
/// still in place.
pub fn artifact_filename(identity: &DatasetIdentity) -> String {
    [
        identity.mip_era.as_str(),
        &identity.activity,
        &identity.experiment,
        &identity.institute,
        &identity.model,
        &identity.member,
        &identity.frequency,
        &identity.variable,
        &identity.realm,
        &identity.grid_label,
        &identity.version,
        ArtifactConfig::WARNING_PLACEHOLDER,
        ArtifactConfig::RESERVED_TOKEN,
        ArtifactConfig::EXTENSION,
    ]
    .join(".")
}

/// Full artifact path under `output_dir`. Fixed fields live under
/// `<era>/fx/<variable>`; everything else under
/// `<era>/<activity>/<experiment>/<realm>/<frequency>/<variable>`.
pub fn artifact_path(output_dir: &Path, identity: &DatasetIdentity) -> PathBuf {
    let mut path = output_dir.join(&identity.mip_era);
    if identity.frequency == "fx" {
        path.push("fx");
    } else {
        path.push(&identity.activity);
        path.push(experiment_directory(&identity.experiment));
        path.push(&identity.realm);
        path.push(&identity.frequency);
    }
    path.push(&identity.variable);
    path.push(artifact_filename(identity));
    path
}

/// Replace the warning placeholder in the file name with `code`.
pub fn with_warning_code(path: &Path, code: &str) -> PathBuf {
    match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => path.with_file_name(name.replacen(ArtifactConfig::WARNING_PLACEHOLDER, code, 1)),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::sample_identity;

    #[test]
    fn test_filename() {
        assert_eq!(
            artifact_filename(&sample_identity()),
            "CMIP6.CMIP.historical.NOAA.modelX.r1i1p1f1.mon.tas.atmos.glb-z1-gn.v1.0000000.0.xml"
        );
    }

    #[test]
    fn test_monthly_layout() {
        let path = artifact_path(Path::new("/out"), &sample_identity());
        assert_eq!(
            path.parent().unwrap(),
            Path::new("/out/CMIP6/CMIP/historical/atmos/mon/tas")
        );
    }

    #[test]
    fn test_fixed_field_layout() {
        let mut identity = sample_identity();
        identity.frequency = "fx".into();
        identity.variable = "orog".into();
        let path = artifact_path(Path::new("/out"), &identity);
        assert_eq!(path.parent().unwrap(), Path::new("/out/CMIP6/fx/orog"));
    }

    #[test]
    fn test_decadal_directory() {
        let mut identity = sample_identity();
        identity.experiment = "decadal1961".into();
        let path = artifact_path(Path::new("/out"), &identity);
        assert!(path.starts_with("/out/CMIP6/CMIP/decadal/atmos"));
        assert!(path
            .file_name()
            .unwrap()
            .to_string_lossy()
            .contains(".decadal1961."));
    }

    #[test]
    fn test_warning_code_only_touches_file_name() {
        let path = Path::new("/out/0000000/CMIP6.x.0000000.0.xml");
        assert_eq!(
            with_warning_code(path, "0010000"),
            PathBuf::from("/out/0000000/CMIP6.x.0010000.0.xml")
        );
    }
}
