use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy for the report pipeline.
///
/// Per-item variants (`MalformedIdentityText`, `FilesystemConflict`,
/// `PageRangeOutOfBounds`) are recorded and skipped by the stage that raised
/// them; `StagingEmpty` and `RosterMissing` abort the run.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no eligible PDF files staged in {}", inbox.display())]
    StagingEmpty { inbox: PathBuf },

    #[error("malformed identity text in {segment}: {reason}")]
    MalformedIdentityText { segment: String, reason: String },

    #[error("destination already exists: {}", path.display())]
    FilesystemConflict { path: PathBuf },

    #[error("roster file not found: {}", path.display())]
    RosterMissing { path: PathBuf },

    #[error("page range {start}..={end} exceeds {page_count} pages in {source_name}")]
    PageRangeOutOfBounds {
        source_name: String,
        start: u32,
        end: u32,
        page_count: u32,
    },
}

impl PipelineError {
    pub fn malformed(segment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedIdentityText {
            segment: segment.into(),
            reason: reason.into(),
        }
    }

    pub fn conflict(path: impl Into<PathBuf>) -> Self {
        Self::FilesystemConflict { path: path.into() }
    }
}
