//! Classification of indexing tool output.

use std::fmt;

/// Why an artifact was not written. Checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactFailure {
    ZeroSizeInput,
    IoError,
    DimensionTime,
    DeterminingFileType,
    OutOfMemory,
    InvalidTimeUnits,
    NoWrite,
}

impl ArtifactFailure {
    /// Text stored in the catalog `error` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactFailure::ZeroSizeInput => "No write: filesize of zero",
            ArtifactFailure::IoError => "No write: CDMS I/O Error",
            ArtifactFailure::DimensionTime => "RuntimeError: Dimension time in files",
            ArtifactFailure::DeterminingFileType => "CDMS I/O error: Determining type of file",
            ArtifactFailure::OutOfMemory => "Cannot allocate memory",
            ArtifactFailure::InvalidTimeUnits => "Invalid relative time units",
            ArtifactFailure::NoWrite => "No write",
        }
    }

    /// Classify a run that produced no artifact.
    pub fn classify(stderr: &str, zero_size_input: bool) -> Self {
        if zero_size_input {
            return ArtifactFailure::ZeroSizeInput;
        }
        const MARKERS: &[(&str, ArtifactFailure)] = &[
            ("CDMS I/O error: End of file", ArtifactFailure::IoError),
            ("RuntimeError: Dimension time in files", ArtifactFailure::DimensionTime),
            (
                "CDMS I/O error: Determining type of file",
                ArtifactFailure::DeterminingFileType,
            ),
            ("Cannot allocate memory", ArtifactFailure::OutOfMemory),
            ("Invalid relative time units", ArtifactFailure::InvalidTimeUnits),
        ];
        MARKERS
            .iter()
            .find(|(marker, _)| stderr.contains(marker))
            .map(|(_, failure)| *failure)
            .unwrap_or(ArtifactFailure::NoWrite)
    }
}

impl fmt::Display for ArtifactFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TRACEBACK: &str = "Traceback (most recent call last)";
const PYTHON_ERROR: &str = "Python Error";

/// Text that ends the first warning message.
const WARNING_TERMINATORS: &[&str] = &[" to: [", ": [", ":  [", ") ", ", value="];

/// Pull the first warning out of tool diagnostics. Returns an empty string
/// when there is nothing to report.
pub fn extract_warnings(stderr: &str) -> String {
    let mut warning = match stderr.find("Warning") {
        Some(start) => {
            let rest = &stderr[start..];
            let end = WARNING_TERMINATORS
                .iter()
                .filter_map(|t| rest.find(t))
                .min()
                .unwrap_or(rest.trim_end().len());
            rest[..end].to_string()
        }
        None => String::new(),
    };
    if matches!(stderr.find(TRACEBACK), Some(i) if i > 0) {
        warning.push_str(PYTHON_ERROR);
    }
    warning
}

/// Seven-character flag string for extracted warnings. Each position is set
/// independently:
///
/// | idx | condition |
/// | --- | --- |
/// | 0 | time values repeated mid-file |
/// | 1 | non-monotonic time axis |
/// | 2 | latitude values reset |
/// | 3 | zero-size input |
/// | 4 | time overlap between files |
/// | 5 | bounds warning |
/// | 6 | tool crashed |
pub fn warning_code(warnings: &str) -> String {
    let time_values = warnings.contains("dimension time contains values in file");
    let flags = [
        time_values,
        warnings.contains("Warning: Axis values for axis time are not monotonic"),
        warnings.contains("Warning: resetting latitude values"),
        warnings.contains("zero infile size"),
        warnings.contains("dimension time overlaps file") || time_values,
        warnings.contains("Your first bounds"),
        warnings.contains(PYTHON_ERROR),
    ];
    flags.iter().map(|&f| if f { '1' } else { '0' }).collect()
}
