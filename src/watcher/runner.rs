//! Job invocation
//!
//! A matched job is run by spawning its command, writing the matched record
//! as JSON to the child's stdin and closing the pipe. The child is never
//! waited on: its output and exit status are not observed. The record is
//! written by a separate task that owns the pipe, so a job that reads slowly
//! or never reads cannot hold up delivery of the next message. That write
//! is abandoned after [`STDIN_WRITE_TIMEOUT`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{ChildStdin, Command};
use tracing::Instrument;

use crate::error::{Result, WatcherError};
use crate::watcher::event::CanonicalEventRecord;
use crate::watcher::jobs::{expand_home_dir, JobSpec};
use crate::watcher::logging::ComponentLog;

/// Longest time spent delivering one record to a job's stdin.
pub const STDIN_WRITE_TIMEOUT: Duration = Duration::from_secs(30);

/// Starts a job for one matched record.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobLauncher: Send + Sync {
    /// Launch `job` with `record` as its input.
    ///
    /// Returns once the job has been started, not when it has consumed its
    /// input or finished.
    async fn launch(&self, job: &JobSpec, record: &CanonicalEventRecord) -> Result<()>;
}

/// Launches jobs as local child processes.
#[derive(Debug, Clone)]
pub struct ProcessJobRunner {
    log: ComponentLog,
    write_timeout: Duration,
}

impl ProcessJobRunner {
    /// Create a runner logging under `log`.
    pub fn new(log: ComponentLog) -> Self {
        Self {
            log,
            write_timeout: STDIN_WRITE_TIMEOUT,
        }
    }

    /// Override how long a record may take to reach a job's stdin.
    pub fn with_write_timeout(mut self, write_timeout: Duration) -> Self {
        self.write_timeout = write_timeout;
        self
    }
}

#[async_trait]
impl JobLauncher for ProcessJobRunner {
    async fn launch(&self, job: &JobSpec, record: &CanonicalEventRecord) -> Result<()> {
        let span = self.log.span("launch");

        async move {
            let command = expand_home_dir(Path::new(&job.command));
            tracing::info!(command = %command.display(), "running a job");

            let payload = record.to_json()?;

            let mut child = Command::new(&command)
                .stdin(Stdio::piped())
                .spawn()
                .map_err(|e| {
                    WatcherError::Spawn(format!(
                        "failed to start a job `{}`: {}",
                        command.display(),
                        e
                    ))
                })?;

            let stdin = child.stdin.take().ok_or_else(|| {
                WatcherError::Spawn(format!(
                    "failed to get STDIN of job `{}`",
                    command.display()
                ))
            })?;

            tracing::debug!(pid = ?child.id(), "job started, not waiting for completion");

            tokio::spawn(
                feed_stdin(stdin, payload, command, self.write_timeout)
                    .instrument(self.log.span("feed_stdin")),
            );

            Ok(())
        }
        .instrument(span)
        .await
    }
}

/// Write `payload` to a job's stdin and close it, giving up after `limit`.
///
/// Dropping the pipe on timeout closes it, so the job sees end of input.
async fn feed_stdin(mut stdin: ChildStdin, payload: Vec<u8>, command: PathBuf, limit: Duration) {
    let write = async {
        stdin.write_all(&payload).await?;
        stdin.shutdown().await
    };

    match tokio::time::timeout(limit, write).await {
        Ok(Ok(())) => {
            tracing::debug!(command = %command.display(), bytes = payload.len(), "event sent to job");
        }
        Ok(Err(e)) => {
            tracing::error!(
                command = %command.display(),
                error = %e,
                "failed to send event to job via STDIN"
            );
        }
        Err(_) => {
            tracing::error!(
                command = %command.display(),
                timeout_secs = limit.as_secs_f64(),
                "job did not read its STDIN in time, closing it"
            );
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use serde_json::json;
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::TempDir;

    fn record() -> CanonicalEventRecord {
        CanonicalEventRecord::from_raw(json!({
            "eventName": "s3:ObjectCreated:Put",
            "s3": {"bucket": {"name": "data-prod"}, "object": {"key": "x/y.txt"}}
        }))
        .unwrap()
    }

    fn write_script(dir: &TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    async fn wait_for_file(path: &Path) -> String {
        for _ in 0..100 {
            if let Ok(contents) = std::fs::read_to_string(path) {
                if !contents.is_empty() {
                    return contents;
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job never wrote {}", path.display());
    }

    #[tokio::test]
    async fn test_launch_delivers_record_on_stdin() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.json");
        let tmp = dir.path().join("out.tmp");
        let script = write_script(
            &dir,
            "capture.sh",
            &format!("cat > {} && mv {} {}", tmp.display(), tmp.display(), out.display()),
        );

        let runner = ProcessJobRunner::new(ComponentLog::new("runner"));
        let job = JobSpec {
            command: script.display().to_string(),
            filter: Default::default(),
        };

        runner.launch(&job, &record()).await.unwrap();

        let written: serde_json::Value = serde_json::from_str(&wait_for_file(&out).await).unwrap();
        assert_eq!(&written, record().raw());
    }

    #[tokio::test]
    async fn test_launch_does_not_wait_for_completion() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "slow.sh", "cat > /dev/null; sleep 30");

        let runner = ProcessJobRunner::new(ComponentLog::new("runner"));
        let job = JobSpec {
            command: script.display().to_string(),
            filter: Default::default(),
        };

        let result = tokio::time::timeout(Duration::from_secs(5), runner.launch(&job, &record())).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    fn large_record() -> CanonicalEventRecord {
        CanonicalEventRecord::from_raw(json!({
            "eventName": "s3:ObjectCreated:Put",
            "s3": {
                "bucket": {"name": "data-prod"},
                "object": {
                    "key": "x/big.bin",
                    "userMetadata": {"X-Amz-Meta-Notes": "n".repeat(200 * 1024)}
                }
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_job_that_never_reads_does_not_block_launch() {
        let dir = TempDir::new().unwrap();
        let script = write_script(&dir, "deaf.sh", "sleep 30");

        let runner = ProcessJobRunner::new(ComponentLog::new("runner"));
        let job = JobSpec {
            command: script.display().to_string(),
            filter: Default::default(),
        };

        let result =
            tokio::time::timeout(Duration::from_secs(5), runner.launch(&job, &large_record())).await;
        assert!(matches!(result, Ok(Ok(()))));
    }

    #[tokio::test]
    async fn test_large_record_is_delivered_whole() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.json");
        let tmp = dir.path().join("out.tmp");
        let script = write_script(
            &dir,
            "capture.sh",
            &format!("cat > {} && mv {} {}", tmp.display(), tmp.display(), out.display()),
        );

        let runner = ProcessJobRunner::new(ComponentLog::new("runner"));
        let job = JobSpec {
            command: script.display().to_string(),
            filter: Default::default(),
        };

        let record = large_record();
        runner.launch(&job, &record).await.unwrap();

        let written: serde_json::Value = serde_json::from_str(&wait_for_file(&out).await).unwrap();
        assert_eq!(&written, record.raw());
    }

    #[tokio::test]
    async fn test_stdin_is_closed_after_write_timeout() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("out.json");
        let tmp = dir.path().join("out.tmp");
        // Starts reading only after the write has been abandoned.
        let script = write_script(
            &dir,
            "late.sh",
            &format!(
                "sleep 1; cat > {} && mv {} {}",
                tmp.display(),
                tmp.display(),
                out.display()
            ),
        );

        let runner = ProcessJobRunner::new(ComponentLog::new("runner"))
            .with_write_timeout(Duration::from_millis(200));
        let job = JobSpec {
            command: script.display().to_string(),
            filter: Default::default(),
        };

        let record = large_record();
        runner.launch(&job, &record).await.unwrap();

        let written = wait_for_file(&out).await;
        assert!(written.len() < record.to_json().unwrap().len());
    }

    #[tokio::test]
    async fn test_launch_missing_command_is_spawn_error() {
        let runner = ProcessJobRunner::new(ComponentLog::new("runner"));
        let job = JobSpec {
            command: "/nonexistent/s3_data_watcher/job".to_string(),
            filter: Default::default(),
        };

        let err = runner.launch(&job, &record()).await.unwrap_err();
        assert!(matches!(err, WatcherError::Spawn(ref m) if m.contains("/nonexistent")));
    }
}
