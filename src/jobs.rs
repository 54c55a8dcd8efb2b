//! The job set: a flat, ordered list of [`ConversionJob`]s built from either
//! loose uploads or the documents discovered in a bundle.
//!
//! Output names are the source base name with the target extension. When two
//! sources would produce the same name (ignoring case), later ones get a
//! ` (2)`, ` (3)`, ... suffix in job order, so naming never depends on which
//! conversion finishes first.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::bundle::NO_ELIGIBLE_DOCUMENTS;
use crate::config::ConvertConfig;
use crate::contract::{ConversionJob, FileKind, SourceFile};
use crate::error::PipelineError;

#[derive(Debug, Clone)]
pub struct JobSet {
    jobs: Vec<ConversionJob>,
}

impl JobSet {
    /// Builds one job per distinct document. Non-documents are dropped, and a
    /// path seen twice yields a single job.
    pub fn build(sources: Vec<SourceFile>, config: &ConvertConfig) -> Result<JobSet, PipelineError> {
        let mut seen_paths: HashSet<PathBuf> = HashSet::new();
        let mut names = OutputNames::new(&config.target_extension);
        if config.include_failure_manifest {
            names.reserve(&config.manifest_name);
        }

        let mut jobs = Vec::new();
        for source in sources {
            if source.kind != FileKind::Document {
                debug!(name = %source.original_name, "Skipping unsupported upload");
                continue;
            }
            if !seen_paths.insert(source.path.clone()) {
                debug!(path = %source.path.display(), "Skipping duplicate source");
                continue;
            }
            let output_name = names.next_for(&source.original_name);
            debug!(
                job_id = jobs.len(),
                source = %source.original_name,
                output_name = %output_name,
                "Planned conversion job"
            );
            jobs.push(ConversionJob::new(jobs.len(), source, output_name));
        }

        if jobs.is_empty() {
            return Err(PipelineError::validation(NO_ELIGIBLE_DOCUMENTS));
        }
        info!(jobs = jobs.len(), "Job set built");
        Ok(JobSet { jobs })
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<ConversionJob> {
        self.jobs
    }
}

/// Hands out unique archive entry names.
struct OutputNames {
    extension: String,
    taken: HashSet<String>,
}

impl OutputNames {
    fn new(extension: &str) -> Self {
        Self {
            extension: extension.trim_start_matches('.').to_string(),
            taken: HashSet::new(),
        }
    }

    fn reserve(&mut self, name: &str) {
        self.taken.insert(name.to_lowercase());
    }

    fn next_for(&mut self, original_name: &str) -> String {
        let stem = base_stem(original_name);
        let mut candidate = format!("{stem}.{}", self.extension);
        let mut n = 2;
        while !self.taken.insert(candidate.to_lowercase()) {
            candidate = format!("{stem} ({n}).{}", self.extension);
            n += 1;
        }
        candidate
    }
}

fn base_stem(original_name: &str) -> String {
    Path::new(original_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "document".to_string())
}
