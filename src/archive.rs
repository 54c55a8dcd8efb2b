//! Packs the settled job set into the result archive.
//!
//! Succeeded jobs are appended under their output names in job order. When
//! any job failed and the manifest is enabled, a JSON entry lists the failed
//! inputs and reasons. [`ArchiveBuilder::finish`] consumes the builder, so an
//! archive can be finalized only once.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, error, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PipelineError;
use crate::scheduler::SettledJobs;
use crate::workspace::WorkspaceGuard;

/// One line of the failure manifest.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FailureRecord {
    pub source: String,
    pub output_name: String,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ArchiveSummary {
    pub path: PathBuf,
    /// Converted documents in the archive (the manifest is not counted).
    pub documents: usize,
    pub has_manifest: bool,
}

pub struct ArchiveBuilder {
    path: PathBuf,
    writer: ZipWriter<BufWriter<File>>,
    options: SimpleFileOptions,
    documents: usize,
    has_manifest: bool,
}

fn archive_error(context: &str, e: impl std::fmt::Display) -> PipelineError {
    error!(error = %e, "{context}");
    PipelineError::Archive(format!("{context}: {e}"))
}

impl ArchiveBuilder {
    pub fn create(path: &Path) -> Result<Self, PipelineError> {
        let file = File::create(path).map_err(|e| archive_error("Failed to create archive", e))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: ZipWriter::new(BufWriter::new(file)),
            options: SimpleFileOptions::default().compression_method(CompressionMethod::Deflated),
            documents: 0,
            has_manifest: false,
        })
    }

    /// Streams the file at `source` into the archive as `name`.
    pub fn append_file(&mut self, name: &str, source: &Path) -> Result<(), PipelineError> {
        let mut input =
            File::open(source).map_err(|e| archive_error("Failed to open converted output", e))?;
        self.writer
            .start_file(name, self.options)
            .map_err(|e| archive_error("Failed to start archive entry", e))?;
        io::copy(&mut input, &mut self.writer)
            .map_err(|e| archive_error("Failed to write archive entry", e))?;
        self.documents += 1;
        debug!(name, "Appended converted document");
        Ok(())
    }

    pub fn append_manifest(
        &mut self,
        name: &str,
        failures: &[FailureRecord],
    ) -> Result<(), PipelineError> {
        let body = serde_json::to_vec_pretty(failures)
            .map_err(|e| archive_error("Failed to serialise failure manifest", e))?;
        self.writer
            .start_file(name, self.options)
            .map_err(|e| archive_error("Failed to start manifest entry", e))?;
        self.writer
            .write_all(&body)
            .map_err(|e| archive_error("Failed to write manifest entry", e))?;
        self.has_manifest = true;
        debug!(name, failures = failures.len(), "Appended failure manifest");
        Ok(())
    }

    pub fn finish(self) -> Result<ArchiveSummary, PipelineError> {
        let mut inner = self
            .writer
            .finish()
            .map_err(|e| archive_error("Failed to finalize archive", e))?;
        inner
            .flush()
            .map_err(|e| archive_error("Failed to flush archive", e))?;
        Ok(ArchiveSummary {
            path: self.path,
            documents: self.documents,
            has_manifest: self.has_manifest,
        })
    }
}

/// Failure records for every job that did not succeed, in job order.
pub fn failure_records(settled: &SettledJobs) -> Vec<FailureRecord> {
    settled
        .failed()
        .map(|job| FailureRecord {
            source: job.source.original_name.clone(),
            output_name: job.output_name.clone(),
            reason: job
                .error()
                .map(|e| e.to_string())
                .unwrap_or_else(|| "conversion did not complete".to_string()),
        })
        .collect()
}

/// Writes the whole archive for a settled batch. Blocking; run it off the
/// async workers.
pub fn write_archive(
    path: &Path,
    settled: &SettledJobs,
    manifest_name: Option<&str>,
) -> Result<ArchiveSummary, PipelineError> {
    let mut builder = ArchiveBuilder::create(path)?;
    for job in settled.succeeded() {
        let Some(output) = job.output_path() else {
            continue;
        };
        builder.append_file(&job.output_name, output)?;
    }

    let failures = failure_records(settled);
    if let Some(name) = manifest_name {
        if !failures.is_empty() {
            builder.append_manifest(name, &failures)?;
        }
    }

    let summary = builder.finish()?;
    info!(
        path = %summary.path.display(),
        documents = summary.documents,
        failures = failures.len(),
        "Archive finalized"
    );
    Ok(summary)
}

/// Async wrapper around [`write_archive`]; gives the settled jobs back.
/// `guard` keeps the workspace alive until the blocking writer is done.
pub async fn package(
    path: PathBuf,
    settled: SettledJobs,
    manifest_name: Option<String>,
    guard: WorkspaceGuard,
) -> Result<(SettledJobs, ArchiveSummary), PipelineError> {
    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let summary = write_archive(&path, &settled, manifest_name.as_deref())?;
        Ok((settled, summary))
    })
    .await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn builder_writes_documents_then_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let converted = dir.path().join("0-report.pdf");
        std::fs::write(&converted, b"%PDF-1.7").unwrap();
        let archive_path = dir.path().join("converted_files.zip");

        let mut builder = ArchiveBuilder::create(&archive_path).unwrap();
        builder.append_file("report.pdf", &converted).unwrap();
        let failures = vec![FailureRecord {
            source: "broken.docx".to_string(),
            output_name: "broken.pdf".to_string(),
            reason: "converter failed: exit status 1".to_string(),
        }];
        builder
            .append_manifest("conversion_failures.json", &failures)
            .unwrap();
        let summary = builder.finish().unwrap();

        assert_eq!(summary.documents, 1);
        assert!(summary.has_manifest);

        let mut archive = zip::ZipArchive::new(File::open(&archive_path).unwrap()).unwrap();
        assert_eq!(archive.len(), 2);
        let mut body = String::new();
        archive
            .by_name("conversion_failures.json")
            .unwrap()
            .read_to_string(&mut body)
            .unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[0]["source"], "broken.docx");
        assert_eq!(parsed[0]["reason"], "converter failed: exit status 1");
    }

    #[test]
    fn missing_converted_file_is_an_archive_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut builder = ArchiveBuilder::create(&dir.path().join("out.zip")).unwrap();

        let err = builder
            .append_file("gone.pdf", &dir.path().join("gone.pdf"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::Archive(_)));
    }
}
