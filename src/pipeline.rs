//! High-level pipeline: staged uploads in, one archive out.
//!
//! This module wires the stages together for a single request:
//!   - classify the staged entries into loose documents or one bundle
//!   - unpack the bundle, if any, and discover its documents
//!   - build the ordered job set with unique output names
//!   - run the conversions under the concurrency ceiling and join on all of them
//!   - pack the succeeded outputs (and the failure manifest) into the archive
//!
//! # Major Types
//! - [`BatchResult`]: the settled jobs plus the finalized archive on disk
//! - [`BatchReport`]: counts, output names and failure reasons for callers
//!
//! # Error Handling
//! Validation problems stop the request before any conversion starts.
//! Individual conversion failures never do; they end up in the report and the
//! manifest. Archive problems are fatal.
//!
//! # Cleanup
//! [`convert_batch`] borrows the workspace and leaves it alone.
//! [`run_request`] owns it and removes it on every path, after the archive
//! bytes have been read out for the transport. If the request future is
//! dropped mid-flight, blocking stages still hold a workspace guard and the
//! directory goes away when the last of them finishes.

use tracing::{info, info_span, Instrument};
use uuid::Uuid;

use crate::archive::{failure_records, package, ArchiveSummary, FailureRecord};
use crate::batch::UploadBatch;
use crate::bundle::resolve_bundle;
use crate::config::ConvertConfig;
use crate::contract::{ConversionJob, DocumentConverter, UploadedEntry};
use crate::error::PipelineError;
use crate::jobs::JobSet;
use crate::scheduler::{ConcurrencyScheduler, SettledJobs};
use crate::worker::ConversionWorker;
use crate::workspace::Workspace;

#[derive(Debug, Clone)]
pub struct BatchReport {
    pub request_id: Uuid,
    pub succeeded: usize,
    pub failed: usize,
    /// Archive entry names of converted documents, in job order.
    pub outputs: Vec<String>,
    pub failures: Vec<FailureRecord>,
}

impl BatchReport {
    fn from_settled(request_id: Uuid, settled: &SettledJobs) -> Self {
        Self {
            request_id,
            succeeded: settled.succeeded_count(),
            failed: settled.failed_count(),
            outputs: settled.succeeded().map(|j| j.output_name.clone()).collect(),
            failures: failure_records(settled),
        }
    }

    pub fn summary(&self) -> String {
        format!("{} succeeded, {} failed", self.succeeded, self.failed)
    }
}

#[derive(Debug)]
pub struct BatchResult {
    pub report: BatchReport,
    pub jobs: Vec<ConversionJob>,
    pub archive: ArchiveSummary,
}

impl BatchResult {
    pub async fn read_archive(&self) -> Result<Vec<u8>, PipelineError> {
        Ok(tokio::fs::read(&self.archive.path).await?)
    }
}

/// Runs the whole pipeline for one request inside `workspace`.
pub async fn convert_batch(
    config: &ConvertConfig,
    converter: &dyn DocumentConverter,
    workspace: &Workspace,
    entries: Vec<UploadedEntry>,
) -> Result<BatchResult, PipelineError> {
    let span = info_span!("convert_batch", request_id = %workspace.request_id());
    async move {
        info!(entries = entries.len(), "Starting conversion batch");

        let sources = match UploadBatch::classify(entries, config)? {
            UploadBatch::Loose(files) => files,
            UploadBatch::Bundle(bundle) => resolve_bundle(&bundle, workspace, config).await?,
        };
        let jobs = JobSet::build(sources, config)?;

        let worker = ConversionWorker::new(converter, workspace, config);
        let scheduler = ConcurrencyScheduler::new(config.max_concurrency);
        let settled = scheduler.run_all(&worker, jobs).await;

        let manifest = config
            .include_failure_manifest
            .then(|| config.manifest_name.clone());
        let archive_path = workspace.path().join(&config.archive_name);
        let (settled, archive) =
            package(archive_path, settled, manifest, workspace.guard()).await?;

        let report = BatchReport::from_settled(workspace.request_id(), &settled);
        info!(summary = %report.summary(), "Conversion batch complete");
        Ok(BatchResult {
            report,
            jobs: settled.into_jobs(),
            archive,
        })
    }
    .instrument(span)
    .await
}

/// [`convert_batch`] plus transport hand-off and cleanup: returns the archive
/// bytes and removes the workspace whatever the outcome.
pub async fn run_request(
    config: &ConvertConfig,
    converter: &dyn DocumentConverter,
    workspace: Workspace,
    entries: Vec<UploadedEntry>,
) -> Result<(BatchReport, Vec<u8>), PipelineError> {
    let outcome = async {
        let result = convert_batch(config, converter, &workspace, entries).await?;
        let bytes = result.read_archive().await?;
        Ok::<_, PipelineError>((result.report, bytes))
    }
    .await;
    workspace.cleanup().await;
    outcome
}
