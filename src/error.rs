//! Error types for the conversion pipeline.
//!
//! Request-fatal problems are [`PipelineError`]s. A failure of one document is a
//! [`ConversionError`] that stays on its job and never aborts the batch.
//! Removal problems during workspace teardown are [`CleanupError`]s, which are
//! only ever logged.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::contract::JobStatus;

/// Errors that end a request.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The submission was unusable: nothing uploaded, no eligible documents,
    /// or an invalid mix of entries. Surfaced to the client as-is.
    #[error("{0}")]
    Validation(String),

    /// The output archive could not be written or finalized.
    #[error("archive error: {0}")]
    Archive(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking task panicked or was cancelled by the runtime.
    #[error("background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PipelineError::Validation(msg.into())
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }
}

impl From<zip::result::ZipError> for PipelineError {
    fn from(e: zip::result::ZipError) -> Self {
        PipelineError::Archive(e.to_string())
    }
}

/// Why a single job failed. Recorded on the job, reported in the manifest.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("converter failed: {0}")]
    Converter(String),

    #[error("converter reported success but produced no output at {}", .0.display())]
    MissingOutput(PathBuf),

    #[error("conversion timed out after {}s", .0.as_secs())]
    TimedOut(Duration),

    #[error("could not prepare job output directory: {0}")]
    Workspace(String),
}

/// Best-effort removal failure. Logged, never returned to a caller.
#[derive(Debug, Error)]
#[error("failed to remove {}: {source}", path.display())]
pub struct CleanupError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// A job was asked to move to a state its lifecycle does not allow.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("job {job_id}: illegal transition {from:?} -> {to:?}")]
pub struct JobStateError {
    pub job_id: usize,
    pub from: JobStatus,
    pub to: JobStatus,
}
