//! Integration tests for the scan, reconcile, schedule and write-back
//! pipeline.
//!
//! These run against a temporary directory tree and catalog with a stub
//! identity resolver, so no CMOR tables are needed.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use xagg_core::catalog::ArtifactRecord;
use xagg_core::{
    CatalogStore, DatasetIdentity, DirStat, DirectoryScanner, IdentityResolver, Reconciler,
    Resolution, ScanFilters, ScanInventory, XaggError,
};

/// Resolves every path to the same dataset, with the version taken from the
/// leaf directory name.
struct StubResolver;

impl IdentityResolver for StubResolver {
    fn resolve(&self, path: &str) -> Resolution {
        let leaf = Path::new(path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        if leaf.starts_with("bad") {
            return Resolution::Unparseable(format!("unexpected leaf {leaf}"));
        }
        Resolution::Resolved(identity(&leaf))
    }
}

fn identity(version: &str) -> DatasetIdentity {
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
        version: version.into(),
    }
}

fn filters() -> ScanFilters {
    ScanFilters::new(["tas"], ["historical"], ["mon"])
}

fn open_store(temp: &TempDir) -> CatalogStore {
    CatalogStore::new(temp.path().join("db").join("xml.db")).unwrap()
}

fn inventory(paths: &[&str], stat: DirStat) -> ScanInventory {
    ScanInventory {
        entries: paths
            .iter()
            .map(|p| (p.to_string(), stat))
            .collect::<HashMap<_, _>>(),
        ..Default::default()
    }
}

fn old_stat() -> DirStat {
    DirStat::uniform(Utc::now() - Duration::days(10))
}

fn write_leaf(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("tas_Amon_modelX_historical_r1i1p1f1_gn_185001-201412.nc"), b"cdf").unwrap();
}

#[tokio::test]
async fn test_end_to_end_new_leaf_is_scheduled() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    let leaf = root.join("CMIP6/CMIP/NOAA/modelX/historical/r1i1p1f1/Amon/tas/gn/v1");
    write_leaf(&leaf);
    let store = open_store(&temp);

    let scan = DirectoryScanner::new(2, vec![]).scan(&[root]).await;
    assert_eq!(scan.len(), 1);

    let run = Reconciler::new(&store, &StubResolver)
        .reconcile(&scan, Utc::now())
        .unwrap();
    assert_eq!(run.new, 1);
    assert_eq!(run.invalid, 0);

    let entries = store.entries().unwrap();
    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.path, leaf.to_string_lossy());
    assert!(!entry.retired);
    assert!(entry.artifact_path.is_none());
    assert_eq!(
        entry.identity.dataset_id(),
        "CMIP6.CMIP.NOAA.modelX.historical.r1i1p1f1.Amon.tas.gn.v1"
    );

    // the directory was just written, so it only becomes due a day later
    assert!(store.select_for_scan(&filters(), Utc::now()).unwrap().is_empty());
    let later: DateTime<Utc> = Utc::now() + Duration::days(2);
    let targets = store.select_for_scan(&filters(), later).unwrap();
    assert_eq!(targets.len(), 1);
    assert_eq!(targets[0].path, entry.path);
}

#[test]
fn test_reconcile_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let reconciler = Reconciler::new(&store, &StubResolver);
    let scan = inventory(&["/d/a/v1", "/d/b/v2", "/d/c/bad1"], old_stat());

    let first = reconciler.reconcile(&scan, Utc::now()).unwrap();
    assert_eq!((first.new, first.invalid), (2, 1));
    let entries = store.entries().unwrap();

    let second = reconciler.reconcile(&scan, Utc::now()).unwrap();
    assert_eq!(
        (second.new, second.invalid, second.modified, second.missing, second.returned),
        (0, 0, 0, 0, 0)
    );
    assert_eq!(store.entries().unwrap(), entries);
    assert_eq!(store.invalid_paths().unwrap().len(), 1);
}

#[test]
fn test_safety_abort_applies_nothing() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let reconciler = Reconciler::new(&store, &StubResolver);
    let paths: Vec<String> = (0..20).map(|i| format!("/d/{i}/v1")).collect();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    reconciler.reconcile(&inventory(&refs, old_stat()), Utc::now()).unwrap();
    let before = store.entries().unwrap();

    // half the tree vanished, plus one new directory
    let mut partial: Vec<&str> = refs[..10].to_vec();
    partial.push("/d/new/v9");
    let err = reconciler
        .reconcile(&inventory(&partial, old_stat()), Utc::now())
        .unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(
        err,
        XaggError::SafetyThreshold {
            scanned: 11,
            expected_min: 18
        }
    ));
    assert_eq!(store.entries().unwrap(), before);
    assert_eq!(store.list_runs(10).unwrap().len(), 1);
}

#[test]
fn test_retired_path_returns_clean() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let reconciler = Reconciler::new(&store, &StubResolver);
    let paths: Vec<String> = (0..10).map(|i| format!("/d/{i}/v1")).collect();
    let refs: Vec<&str> = paths.iter().map(String::as_str).collect();
    reconciler.reconcile(&inventory(&refs, old_stat()), Utc::now()).unwrap();

    reconciler
        .reconcile(&inventory(&refs[1..], old_stat()), Utc::now())
        .unwrap();
    assert!(store.get("/d/0/v1").unwrap().unwrap().retired);

    let run = reconciler
        .reconcile(&inventory(&refs, old_stat()), Utc::now())
        .unwrap();
    assert_eq!(run.returned, 1);
    let entry = store.get("/d/0/v1").unwrap().unwrap();
    assert!(!entry.retired);
    assert!(entry.retire_time.is_none());
    assert!(entry.artifact_path.is_none());
    assert!(entry.artifact_write_time.is_none());
}

#[test]
fn test_modified_path_clears_artifact_and_error() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let reconciler = Reconciler::new(&store, &StubResolver);
    reconciler
        .reconcile(&inventory(&["/d/a/v1", "/d/b/v2"], old_stat()), Utc::now())
        .unwrap();

    let artifact = temp.path().join("a.xml");
    fs::write(&artifact, b"<dataset/>").unwrap();
    store
        .record_artifacts(&[
            ArtifactRecord {
                path: "/d/a/v1".into(),
                artifact_path: Some(artifact.clone()),
                write_time: Utc::now(),
                error: Some("Warning: resetting latitude values".into()),
            },
            ArtifactRecord {
                path: "/d/b/v2".into(),
                artifact_path: None,
                write_time: Utc::now(),
                error: Some("No write".into()),
            },
        ])
        .unwrap();

    let newer = DirStat::uniform(Utc::now() - Duration::days(1));
    let run = reconciler
        .reconcile(&inventory(&["/d/a/v1", "/d/b/v2"], newer), Utc::now())
        .unwrap();
    assert_eq!(run.modified, 2);
    assert_eq!(run.deleted, 1);
    assert!(!artifact.exists());
    for entry in store.entries().unwrap() {
        assert!(entry.error.is_none());
        assert!(entry.artifact_path.is_none());
        assert_eq!(entry.modified, newer.modified);
    }
}

#[test]
fn test_group_with_artifact_is_not_scheduled() {
    let temp = TempDir::new().unwrap();
    let store = open_store(&temp);
    let reconciler = Reconciler::new(&store, &StubResolver);
    // two copies of the v1 dataset and one of v2
    reconciler
        .reconcile(
            &inventory(&["/scratch/v1", "/publish/v1", "/scratch/v2"], old_stat()),
            Utc::now(),
        )
        .unwrap();
    store
        .record_artifacts(&[ArtifactRecord {
            path: "/publish/v1".into(),
            artifact_path: Some(PathBuf::from("/out/v1.xml")),
            write_time: Utc::now(),
            error: None,
        }])
        .unwrap();

    let targets = store.select_for_scan(&filters(), Utc::now()).unwrap();
    let paths: Vec<&str> = targets.iter().map(|t| t.path.as_str()).collect();
    assert_eq!(paths, vec!["/scratch/v2"]);
}

#[cfg(unix)]
#[tokio::test]
async fn test_generation_writes_back_warning_code() {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Arc;
    use xagg_core::ArtifactGenerator;

    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    let leaf = root.join("modelX/v1");
    write_leaf(&leaf);
    let tool = temp.path().join("cdscan");
    fs::write(
        &tool,
        "#!/bin/sh\necho 'Warning: resetting latitude values:  [-90.0]' >&2\necho '<dataset/>' > \"$2\"\n",
    )
    .unwrap();
    fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();

    let store = open_store(&temp);
    let scan = DirectoryScanner::new(1, vec![]).scan(&[root]).await;
    Reconciler::new(&store, &StubResolver)
        .reconcile(&scan, Utc::now())
        .unwrap();
    let targets = store
        .select_for_scan(&filters(), Utc::now() + Duration::days(2))
        .unwrap();
    assert_eq!(targets.len(), 1);

    let generator = Arc::new(
        ArtifactGenerator::new(tool.to_str().unwrap(), temp.path().join("xml"), 1).unwrap(),
    );
    let records = generator.generate_all(&targets).await;
    store.record_artifacts(&records).unwrap();

    let entry = store.get(&leaf.to_string_lossy()).unwrap().unwrap();
    assert!(entry.error.is_none());
    let artifact = entry.artifact_path.unwrap();
    assert!(artifact.exists());
    assert_eq!(
        artifact.file_name().unwrap().to_string_lossy(),
        "CMIP6.CMIP.historical.NOAA.modelX.r1i1p1f1.mon.tas.atmos.glb-z1-gn.v1.0010000.0.xml"
    );
    assert!(store
        .select_for_scan(&filters(), Utc::now() + Duration::days(2))
        .unwrap()
        .is_empty());
}
