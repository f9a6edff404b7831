//! Fatal error kinds surfaced by the pipeline.
//!
//! Row-level data problems are not errors; the loader drops and counts them.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required input directory does not exist.
    #[error("Configuration error: input directory not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// The raw directory exists but holds no grade files.
    #[error("Configuration error: no raw grade files (*.csv) found in {}", .0.display())]
    NoRawFiles(PathBuf),

    /// A processed table needed for visualization is missing.
    #[error(
        "Configuration error: processed table not found: {} (run without --visualize-only first)",
        .0.display()
    )]
    MissingTable(PathBuf),

    /// Missing or invalid settings (credentials, bucket, empty tables).
    #[error("Configuration error: {0}")]
    Config(String),

    /// An aggregation step was handed an empty table.
    #[error("Cannot build {0}: the grade table has no valid rows")]
    EmptyTable(&'static str),

    /// Normalization left nothing to aggregate.
    #[error("No valid grade rows survived normalization ({dropped} dropped across {files} file(s))")]
    NoValidRows { files: usize, dropped: usize },
}

impl PipelineError {
    /// Returns `true` for the configuration class of errors.
    pub fn is_config(&self) -> bool {
        !matches!(
            self,
            PipelineError::NoValidRows { .. } | PipelineError::EmptyTable(_)
        )
    }
}
