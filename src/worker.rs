//! Runs a single conversion job.
//!
//! A worker only ever touches its own job record and its own output directory.
//! Every outcome, including converter errors, missing artifacts and timeouts,
//! comes back as the job's terminal state rather than an `Err`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ConvertConfig;
use crate::contract::{ConversionJob, DocumentConverter};
use crate::error::ConversionError;
use crate::workspace::Workspace;

pub struct ConversionWorker<'a> {
    converter: &'a dyn DocumentConverter,
    workspace: &'a Workspace,
    target_extension: String,
    timeout: Option<Duration>,
}

impl<'a> ConversionWorker<'a> {
    pub fn new(
        converter: &'a dyn DocumentConverter,
        workspace: &'a Workspace,
        config: &ConvertConfig,
    ) -> Self {
        Self {
            converter,
            workspace,
            target_extension: config.target_extension.trim_start_matches('.').to_string(),
            timeout: config.conversion_timeout(),
        }
    }

    /// Drives `job` to a terminal state and hands it back.
    pub async fn run(&self, mut job: ConversionJob) -> ConversionJob {
        let span = info_span!("conversion_job", job_id = job.id, source = %job.source.original_name);
        async move {
            if let Err(e) = job.start() {
                error!(error = %e, "Job was not pending; leaving it untouched");
                return job;
            }

            let transition = match self.convert(&job).await {
                Ok(output) => {
                    info!(output = %output.display(), "Conversion succeeded");
                    job.succeed(output)
                }
                Err(err) => {
                    warn!(error = %err, "Conversion failed");
                    job.fail(err)
                }
            };
            if let Err(e) = transition {
                error!(error = %e, "Job state transition rejected");
            }
            job
        }
        .instrument(span)
        .await
    }

    async fn convert(&self, job: &ConversionJob) -> Result<PathBuf, ConversionError> {
        let dir = self.workspace.job_dir(job.id);
        // Not create_dir_all: a removed workspace must not come back.
        tokio::fs::create_dir(&dir)
            .await
            .map_err(|e| ConversionError::Workspace(e.to_string()))?;
        let output = dir.join(output_file_name(&job.source.path, &self.target_extension));
        debug!(source = %job.source.path.display(), output = %output.display(), "Invoking converter");

        let call = self.converter.convert(&job.source.path, &output);
        let result = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, call)
                .await
                .map_err(|_| ConversionError::TimedOut(limit))?,
            None => call.await,
        };
        result.map_err(|e| ConversionError::Converter(e.to_string()))?;

        match tokio::fs::try_exists(&output).await {
            Ok(true) => Ok(output),
            _ => Err(ConversionError::MissingOutput(output)),
        }
    }
}

/// File name the converter is asked to produce: the staged input's stem with
/// the target extension. This is what LibreOffice writes into `--outdir`.
pub fn output_file_name(source: &Path, target_extension: &str) -> String {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    format!("{stem}.{target_extension}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{FileKind, JobStatus, MockDocumentConverter, SourceFile};

    fn job(name: &str) -> ConversionJob {
        let source = SourceFile {
            path: PathBuf::from(format!("/staged/0-{name}")),
            original_name: name.to_string(),
            size_bytes: 1,
            kind: FileKind::Document,
        };
        ConversionJob::new(0, source, "report.pdf".to_string())
    }

    #[test]
    fn output_file_name_swaps_the_extension() {
        assert_eq!(output_file_name(Path::new("/a/0-report.docx"), "pdf"), "0-report.pdf");
        assert_eq!(output_file_name(Path::new("/a/README"), "pdf"), "README.pdf");
    }

    #[tokio::test]
    async fn converter_error_fails_only_this_job() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let mut converter = MockDocumentConverter::new();
        converter
            .expect_convert()
            .times(1)
            .returning(|_source: &Path, _output: &Path| Err("bad input".into()));
        let worker = ConversionWorker::new(&converter, &ws, &ConvertConfig::default());

        let settled = worker.run(job("report.docx")).await;

        assert_eq!(settled.status(), JobStatus::Failed);
        assert_eq!(
            settled.error(),
            Some(&ConversionError::Converter("bad input".to_string()))
        );
        assert!(settled.output_path().is_none());
        ws.cleanup().await;
    }

    #[tokio::test]
    async fn output_lands_in_the_job_directory() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let mut converter = MockDocumentConverter::new();
        converter
            .expect_convert()
            .times(1)
            .returning(|_source: &Path, output: &Path| {
                std::fs::write(output, b"%PDF")?;
                Ok(())
            });
        let worker = ConversionWorker::new(&converter, &ws, &ConvertConfig::default());

        let settled = worker.run(job("report.docx")).await;

        assert_eq!(settled.status(), JobStatus::Succeeded);
        assert_eq!(
            settled.output_path(),
            Some(ws.job_dir(0).join("0-report.pdf").as_path())
        );
        ws.cleanup().await;
    }

    #[tokio::test]
    async fn non_pending_job_is_left_alone() {
        let root = tempfile::tempdir().unwrap();
        let ws = Workspace::create(root.path()).unwrap();
        let mut converter = MockDocumentConverter::new();
        converter.expect_convert().never();
        let worker = ConversionWorker::new(&converter, &ws, &ConvertConfig::default());

        let mut running = job("report.docx");
        running.start().unwrap();
        let settled = worker.run(running).await;

        assert_eq!(settled.status(), JobStatus::Running);
        ws.cleanup().await;
    }
}
