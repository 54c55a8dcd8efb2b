//! Bounded fan-out over a job set.
//!
//! At most `limit` conversions run at once. The batch is complete when the
//! joined stream of job futures is exhausted; that join is the only
//! completion signal, and [`SettledJobs`] can only be obtained from it.

use futures::stream::{self, StreamExt};
use tracing::info;

use crate::contract::{ConversionJob, JobStatus};
use crate::jobs::JobSet;
use crate::worker::ConversionWorker;

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyScheduler {
    limit: usize,
}

impl ConcurrencyScheduler {
    /// `limit` is clamped to at least one.
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Runs every job through `worker` and waits for all of them to settle.
    /// The result is in job order, whatever order the conversions finished in.
    pub async fn run_all(&self, worker: &ConversionWorker<'_>, jobs: JobSet) -> SettledJobs {
        let total = jobs.len();
        info!(total, limit = self.limit, "Scheduling conversion jobs");

        let mut settled: Vec<ConversionJob> = stream::iter(jobs.into_jobs())
            .map(|job| worker.run(job))
            .buffer_unordered(self.limit)
            .collect()
            .await;
        settled.sort_by_key(|job| job.id);

        let settled = SettledJobs { jobs: settled };
        info!(
            total,
            succeeded = settled.succeeded_count(),
            failed = settled.failed_count(),
            "All conversion jobs settled"
        );
        settled
    }
}

/// The terminal job set of one batch, in job order.
#[derive(Debug, Clone)]
pub struct SettledJobs {
    jobs: Vec<ConversionJob>,
}

impl SettledJobs {
    pub fn jobs(&self) -> &[ConversionJob] {
        &self.jobs
    }

    pub fn into_jobs(self) -> Vec<ConversionJob> {
        self.jobs
    }

    pub fn succeeded(&self) -> impl Iterator<Item = &ConversionJob> {
        self.jobs
            .iter()
            .filter(|j| j.status() == JobStatus::Succeeded)
    }

    pub fn failed(&self) -> impl Iterator<Item = &ConversionJob> {
        self.jobs.iter().filter(|j| j.status() != JobStatus::Succeeded)
    }

    pub fn succeeded_count(&self) -> usize {
        self.succeeded().count()
    }

    pub fn failed_count(&self) -> usize {
        self.failed().count()
    }
}
