//! Dispatch of canonical records to matching jobs
//!
//! Every pass reads the job table again, compiles each job's filter once,
//! and launches every job whose filter accepts a record. Jobs are evaluated
//! in declaration order and launched independently: a failed launch is
//! logged and the pass continues.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::Instrument;

use crate::error::Result;
use crate::watcher::event::CanonicalEventRecord;
use crate::watcher::filter::CompiledFilter;
use crate::watcher::jobs::{JobSpec, JobTable};
use crate::watcher::logging::ComponentLog;
use crate::watcher::runner::JobLauncher;

/// Outcome counters for one dispatch pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchSummary {
    /// (record, job) pairs whose filter matched
    pub matched: usize,
    /// Jobs started
    pub launched: usize,
    /// Jobs that could not be started
    pub failed: usize,
}

/// Matches records against the job table and launches jobs.
#[derive(Clone)]
pub struct Dispatcher {
    job_file_path: PathBuf,
    launcher: Arc<dyn JobLauncher>,
    log: ComponentLog,
}

impl Dispatcher {
    /// Create a dispatcher reading jobs from `job_file_path`.
    pub fn new(job_file_path: PathBuf, launcher: Arc<dyn JobLauncher>, log: ComponentLog) -> Self {
        Self {
            job_file_path,
            launcher,
            log,
        }
    }

    /// Path of the job table this dispatcher reads.
    pub fn job_file_path(&self) -> &std::path::Path {
        &self.job_file_path
    }

    /// Run one dispatch pass over the records of a single message.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Malformed` if the job table cannot be loaded;
    /// in that case no job is launched for any of the records. The error is
    /// left to the caller to report.
    pub async fn dispatch(&self, records: &[CanonicalEventRecord]) -> Result<DispatchSummary> {
        let span = self.log.span("dispatch");

        async move {
            let table = JobTable::load(&self.job_file_path)?;

            let compiled: Vec<(&JobSpec, CompiledFilter)> = table
                .jobs
                .iter()
                .map(|job| (job, job.filter.compile()))
                .collect();

            let mut summary = DispatchSummary::default();

            for record in records {
                for (job, filter) in &compiled {
                    if !filter.matches(record) {
                        tracing::trace!(
                            command = %job.command,
                            filter = %job.filter.summary(),
                            "record filtered out"
                        );
                        continue;
                    }

                    summary.matched += 1;

                    match self.launcher.launch(job, record).await {
                        Ok(()) => summary.launched += 1,
                        Err(e) => {
                            summary.failed += 1;
                            tracing::error!(
                                command = %job.command,
                                event_name = %record.event_name(),
                                bucket = %record.bucket(),
                                key = %record.object_key(),
                                error = %e,
                                "job invocation abandoned"
                            );
                        }
                    }
                }
            }

            tracing::debug!(
                records = records.len(),
                jobs = compiled.len(),
                matched = summary.matched,
                launched = summary.launched,
                failed = summary.failed,
                "dispatch pass complete"
            );

            Ok(summary)
        }
        .instrument(span)
        .await
    }
}
