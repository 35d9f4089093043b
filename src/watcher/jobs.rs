//! Job table loading
//!
//! The job table is a YAML file listing commands and the filters that select
//! them. It is read again on every dispatch pass, so edits take effect on
//! the next message without restarting the watcher.

use std::path::{Path, PathBuf};

use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, WatcherError};
use crate::watcher::filter::JobFilter;

/// One job: a command and the filter selecting the events it receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Path to the executable
    pub command: String,

    /// Event filter; an absent filter matches everything
    #[serde(default)]
    pub filter: JobFilter,
}

/// Ordered set of jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobTable {
    /// Jobs in declaration order
    #[serde(default)]
    pub jobs: Vec<JobSpec>,
}

impl JobTable {
    /// Parse a job table from YAML.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Malformed` if the YAML does not describe a job
    /// table.
    ///
    /// # Examples
    ///
    /// ```
    /// use s3_data_watcher::watcher::jobs::JobTable;
    ///
    /// let table = JobTable::from_yaml(r#"
    /// jobs:
    ///   - command: /usr/local/bin/ingest
    ///     filter:
    ///       events: ["s3:ObjectCreated:*"]
    /// "#).unwrap();
    /// assert_eq!(table.jobs.len(), 1);
    /// assert!(table.jobs[0].filter.buckets.is_empty());
    /// ```
    pub fn from_yaml(contents: &str) -> Result<Self> {
        // An empty document deserializes as unit, not as an empty table.
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(contents)?)
    }

    /// Read and parse the job table at `path`.
    ///
    /// # Errors
    ///
    /// Returns `WatcherError::Malformed` if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            WatcherError::Malformed(format!(
                "failed to read job file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&contents).map_err(|e| {
            WatcherError::Malformed(format!("invalid job file {}: {}", path.display(), e))
        })
    }
}

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading `~`, and paths when no home directory can be
/// determined, are returned unchanged.
pub fn expand_home_dir(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };

    match BaseDirs::new() {
        Some(dirs) => dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}
