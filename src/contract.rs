//! # contract: shared data model and the converter seam
//!
//! Plain data types passed between pipeline stages, plus the
//! [`DocumentConverter`] trait that every conversion backend implements.
//!
//! ## Mocking & Testing
//! - The trait is annotated for `mockall`, so tests can build a
//!   `MockDocumentConverter` with deterministic behaviour per input.
//! - Mocks are exported under the default `test-export-mocks` feature so the
//!   integration tests in `tests/` can use them too.
//!
//! ## Adding a converter
//! - Implement [`DocumentConverter`] for your backend.
//! - Write the artifact to exactly the `output` path you are given. The worker
//!   checks for it after you return `Ok(())`.
//! - Return a boxed error for anything that went wrong; the worker turns it
//!   into a failed job without touching sibling jobs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
#[cfg(any(test, feature = "test-export-mocks"))]
use mockall::automock;

use crate::error::{ConversionError, JobStateError};

/// One entry as staged by the upload receiver (multipart field or CLI input).
#[derive(Debug, Clone)]
pub struct UploadedEntry {
    /// Where the bytes live inside the request workspace.
    pub path: PathBuf,
    /// Name the client gave the file.
    pub original_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
}

/// What an uploaded or extracted file is, as far as the pipeline cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Document,
    Container,
    Unsupported,
}

/// A file owned by one request, ready to become a job (or a bundle to open).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    pub original_name: String,
    pub size_bytes: u64,
    pub kind: FileKind,
}

impl SourceFile {
    pub fn from_entry(entry: UploadedEntry, kind: FileKind) -> Self {
        Self {
            path: entry.path,
            original_name: entry.original_name,
            size_bytes: entry.size_bytes,
            kind,
        }
    }
}

/// Lifecycle of a job: `Pending -> Running -> Succeeded | Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// The unit of work: convert one source file into one named output.
#[derive(Debug, Clone)]
pub struct ConversionJob {
    /// Position in the job set. Names and manifest order follow it.
    pub id: usize,
    pub source: SourceFile,
    /// Entry name inside the output archive. Unique within the batch.
    pub output_name: String,
    status: JobStatus,
    output_path: Option<PathBuf>,
    error: Option<ConversionError>,
}

impl ConversionJob {
    pub fn new(id: usize, source: SourceFile, output_name: String) -> Self {
        Self {
            id,
            source,
            output_name,
            status: JobStatus::Pending,
            output_path: None,
            error: None,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Converted artifact on disk; only set once the job has succeeded.
    pub fn output_path(&self) -> Option<&Path> {
        self.output_path.as_deref()
    }

    pub fn error(&self) -> Option<&ConversionError> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn start(&mut self) -> Result<(), JobStateError> {
        self.advance(JobStatus::Running)
    }

    pub fn succeed(&mut self, output_path: PathBuf) -> Result<(), JobStateError> {
        self.advance(JobStatus::Succeeded)?;
        self.output_path = Some(output_path);
        Ok(())
    }

    pub fn fail(&mut self, error: ConversionError) -> Result<(), JobStateError> {
        self.advance(JobStatus::Failed)?;
        self.error = Some(error);
        Ok(())
    }

    fn advance(&mut self, next: JobStatus) -> Result<(), JobStateError> {
        if !self.status.can_advance_to(next) {
            return Err(JobStateError {
                job_id: self.id,
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }
}

/// Boxed error returned by converter backends.
pub type ConverterError = Box<dyn std::error::Error + Send + Sync>;

/// The external converter: `(source, output) -> success | failure`.
///
/// The trait is `Send + Sync` so a single instance can be shared by every
/// concurrently running job of every request.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait DocumentConverter: Send + Sync {
    /// Convert the document at `source` and write the result to `output`.
    async fn convert(&self, source: &Path, output: &Path) -> Result<(), ConverterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> ConversionJob {
        let source = SourceFile {
            path: PathBuf::from("/tmp/report.docx"),
            original_name: "report.docx".into(),
            size_bytes: 10,
            kind: FileKind::Document,
        };
        ConversionJob::new(0, source, "report.pdf".into())
    }

    #[test]
    fn job_follows_pending_running_succeeded() {
        let mut job = job();
        assert_eq!(job.status(), JobStatus::Pending);
        job.start().unwrap();
        assert_eq!(job.status(), JobStatus::Running);
        job.succeed(PathBuf::from("/tmp/out/report.pdf")).unwrap();
        assert_eq!(job.status(), JobStatus::Succeeded);
        assert_eq!(job.output_path(), Some(Path::new("/tmp/out/report.pdf")));
        assert!(job.error().is_none());
    }

    #[test]
    fn terminal_jobs_refuse_further_transitions() {
        let mut job = job();
        job.start().unwrap();
        job.fail(ConversionError::Converter("boom".into())).unwrap();

        let err = job.succeed(PathBuf::from("/tmp/x.pdf")).unwrap_err();
        assert_eq!(err.from, JobStatus::Failed);
        assert_eq!(err.to, JobStatus::Succeeded);
        assert!(job.start().is_err());
        assert_eq!(job.status(), JobStatus::Failed);
        assert!(job.output_path().is_none());
    }

    #[test]
    fn pending_job_cannot_skip_running() {
        let mut job = job();
        assert!(job.succeed(PathBuf::from("/tmp/x.pdf")).is_err());
        assert!(job.fail(ConversionError::Converter("x".into())).is_err());
        assert_eq!(job.status(), JobStatus::Pending);
    }
}
