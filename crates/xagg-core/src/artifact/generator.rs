//! Runs the external indexing tool over scan targets.

use super::diagnostics::{extract_warnings, warning_code, ArtifactFailure};
use super::naming::{artifact_path, with_warning_code};
use crate::catalog::{truncate_to_seconds, ArtifactRecord};
use crate::config::{ArtifactConfig, RunSettings};
use crate::schedule::ScanTarget;
use crate::{Result, XaggError};
use chrono::Utc;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Generates one artifact per target on a bounded pool of tool processes.
pub struct ArtifactGenerator {
    tool: Vec<String>,
    output_dir: PathBuf,
    workers: usize,
}

impl ArtifactGenerator {
    /// `tool` is split on whitespace; the first word is the executable.
    pub fn new(tool: &str, output_dir: impl Into<PathBuf>, workers: usize) -> Result<Self> {
        let tool: Vec<String> = tool.split_whitespace().map(str::to_string).collect();
        if tool.is_empty() {
            return Err(XaggError::Config {
                message: "artifact tool command is empty".to_string(),
            });
        }
        Ok(Self {
            tool,
            output_dir: output_dir.into(),
            workers: workers.max(1),
        })
    }

    pub fn from_settings(settings: &RunSettings) -> Result<Self> {
        Self::new(&settings.tool, &settings.output_directory, settings.workers)
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Generate artifacts for every target. Results come back in target
    /// order; failures are recorded on the result rather than returned.
    pub async fn generate_all(self: &Arc<Self>, targets: &[ScanTarget]) -> Vec<ArtifactRecord> {
        let semaphore = Arc::new(Semaphore::new(self.workers.min(targets.len().max(1))));
        let tasks = targets.iter().cloned().map(|target| {
            let semaphore = Arc::clone(&semaphore);
            let generator = Arc::clone(self);
            async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("artifact semaphore is never closed");
                generator.generate(&target).await
            }
        });
        let records = join_all(tasks).await;
        let failed = records.iter().filter(|r| r.error.is_some()).count();
        info!(
            "Processed {} directories ({} with errors)",
            records.len(),
            failed
        );
        records
    }

    /// Generate the artifact for one directory.
    pub async fn generate(&self, target: &ScanTarget) -> ArtifactRecord {
        let outfile = artifact_path(&self.output_dir, &target.identity);
        let stderr = match self.invoke(Path::new(&target.path), &outfile).await {
            Ok(stderr) => stderr,
            Err(e) => {
                warn!(path = %target.path, "Indexing tool did not run: {}", e);
                e.to_string()
            }
        };
        let write_time = truncate_to_seconds(Utc::now());

        if !tokio::fs::try_exists(&outfile).await.unwrap_or(false) {
            let zero_size = has_zero_size_input(Path::new(&target.path)).await;
            let failure = ArtifactFailure::classify(&stderr, zero_size);
            debug!(path = %target.path, "No artifact written: {}", failure);
            return ArtifactRecord {
                path: target.path.clone(),
                artifact_path: None,
                write_time,
                error: Some(failure.as_str().to_string()),
            };
        }

        let warnings = extract_warnings(&stderr);
        if warnings.is_empty() {
            return ArtifactRecord {
                path: target.path.clone(),
                artifact_path: Some(outfile),
                write_time,
                error: None,
            };
        }

        let renamed = with_warning_code(&outfile, &warning_code(&warnings));
        let artifact_path = match tokio::fs::rename(&outfile, &renamed).await {
            Ok(()) => renamed,
            Err(e) => {
                warn!("Failed to rename {}: {}", outfile.display(), e);
                outfile
            }
        };
        let error = (warnings.len() > ArtifactConfig::MAX_WARNING_LEN)
            .then(|| warnings.chars().take(ArtifactConfig::MAX_WARNING_LEN).collect());
        ArtifactRecord {
            path: target.path.clone(),
            artifact_path: Some(artifact_path),
            write_time,
            error,
        }
    }

    /// Run the tool and return its diagnostic output.
    async fn invoke(&self, input_dir: &Path, outfile: &Path) -> Result<String> {
        if let Some(parent) = outfile.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| XaggError::io_with_path(e, parent))?;
        }

        let inputs = input_files(input_dir).await?;
        if inputs.is_empty() {
            return Ok(String::new());
        }

        let output = Command::new(&self.tool[0])
            .args(&self.tool[1..])
            .arg("-x")
            .arg(outfile)
            .args(&inputs)
            .output()
            .await
            .map_err(|e| XaggError::Tool {
                tool: self.tool[0].clone(),
                message: e.to_string(),
            })?;

        if !output.status.success() {
            debug!(path = %input_dir.display(), status = %output.status, "Indexing tool exited with failure");
        }
        let mut diagnostics = String::from_utf8_lossy(&output.stderr).into_owned();
        diagnostics.push_str(&String::from_utf8_lossy(&output.stdout));
        Ok(diagnostics)
    }
}

/// Input data files of a directory, sorted by name.
async fn input_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .map_err(|e| XaggError::io_with_path(e, dir))?;
    let mut files = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| XaggError::io_with_path(e, dir))?
    {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some(ArtifactConfig::INPUT_EXTENSION) {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

async fn has_zero_size_input(dir: &Path) -> bool {
    let Ok(files) = input_files(dir).await else {
        return false;
    };
    for file in files {
        if let Ok(meta) = tokio::fs::metadata(&file).await {
            if meta.len() == 0 {
                return true;
            }
        }
    }
    false
}
