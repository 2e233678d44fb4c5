//! Run directory resolution
//!
//! A run is one training attempt, stored as `run_<timestamp>` under a results
//! root. The timestamp has second granularity and sorts lexicographically in
//! chronological order, which is the entire mechanism behind latest-run
//! discovery: no index file, no mtime queries, just the directory name.
//!
//! The resolver never deletes run directories and never caches listings
//! across invocations; the filesystem is the only durable source of truth.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::info;

use crate::model::ModelKind;
use crate::{Error, Result};

/// Prefix shared by every run directory name.
pub const RUN_PREFIX: &str = "run_";

/// Name of the checkpoint subdirectory nested inside each run.
pub const CHECKPOINT_DIR: &str = "checkpoints";

/// Format string for the second-granularity run timestamp.
const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// A single run directory under a results root.
///
/// Identity is the timestamp-derived directory name; two `RunDirectory`
/// values compare equal iff they name the same directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunDirectory {
    name: String,
    path: PathBuf,
}

impl RunDirectory {
    fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Get the directory name (`run_<timestamp>`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the full filesystem path of the run directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Get the path of the nested checkpoint directory.
    #[must_use]
    pub fn checkpoint_dir(&self) -> PathBuf {
        self.path.join(CHECKPOINT_DIR)
    }

    /// Consume the value and return the run path.
    #[must_use]
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}

/// List existing run directories under a results root, oldest first.
///
/// Only directories whose name starts with [`RUN_PREFIX`] are considered.
/// Ordering is by name, not by filesystem enumeration order, so the result
/// is chronological regardless of the underlying directory listing.
///
/// # Errors
///
/// Returns [`Error::Io`] if the results root cannot be read.
pub fn list_runs(results_root: &Path) -> Result<Vec<RunDirectory>> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(results_root)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if name.starts_with(RUN_PREFIX) {
            runs.push(RunDirectory::new(name, entry.path()));
        }
    }
    runs.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(runs)
}

/// Find the most recently created run under a results root.
///
/// # Errors
///
/// Returns [`Error::NoRunsFound`] if the root contains no run directories,
/// or [`Error::Io`] if it cannot be read.
pub fn latest_run(results_root: &Path) -> Result<RunDirectory> {
    list_runs(results_root)?
        .pop()
        .ok_or_else(|| Error::NoRunsFound(results_root.to_path_buf()))
}

/// Create a fresh run directory named from the current clock second.
///
/// The nested checkpoint subdirectory is created as well. Callers must not
/// race this against another invocation on the same root: two calls within
/// the same second resolve to the same directory.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directories cannot be created.
pub fn create_run(results_root: &Path) -> Result<RunDirectory> {
    let timestamp = Local::now().format(RUN_TIMESTAMP_FORMAT);
    let name = format!("{RUN_PREFIX}{timestamp}");
    let path = results_root.join(&name);
    fs::create_dir_all(path.join(CHECKPOINT_DIR))?;
    info!(run = %name, "created run directory");
    Ok(RunDirectory::new(name, path))
}

/// Build (and create if absent) the results root for one model under a log
/// directory: `<log_dir>/<model>/<prefix>`.
///
/// The prefix is typically a process-start timestamp or a user-chosen
/// work-dir name, so repeated invocations can share one root.
///
/// # Errors
///
/// Returns [`Error::Io`] if the directories cannot be created.
pub fn results_root(log_dir: &Path, model: ModelKind, prefix: &str) -> Result<PathBuf> {
    let root = log_dir.join(model.to_string()).join(prefix);
    fs::create_dir_all(&root)?;
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fabricate_run(root: &Path, timestamp: &str) {
        fs::create_dir_all(
            root.join(format!("{RUN_PREFIX}{timestamp}"))
                .join(CHECKPOINT_DIR),
        )
        .unwrap();
    }

    #[test]
    fn test_list_runs_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        // Created out of chronological order on purpose
        fabricate_run(dir.path(), "20240301120000");
        fabricate_run(dir.path(), "20240101120000");
        fabricate_run(dir.path(), "20240201120000");

        let runs = list_runs(dir.path()).unwrap();
        let names: Vec<_> = runs.iter().map(RunDirectory::name).collect();
        assert_eq!(
            names,
            vec![
                "run_20240101120000",
                "run_20240201120000",
                "run_20240301120000"
            ]
        );
    }

    #[test]
    fn test_list_runs_ignores_foreign_entries() {
        let dir = tempfile::tempdir().unwrap();
        fabricate_run(dir.path(), "20240101120000");
        fs::create_dir(dir.path().join("tensorboard")).unwrap();
        fs::write(dir.path().join("run_not_a_dir"), b"file").unwrap();

        let runs = list_runs(dir.path()).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].name(), "run_20240101120000");
    }

    #[test]
    fn test_latest_run_empty_root() {
        let dir = tempfile::tempdir().unwrap();
        let err = latest_run(dir.path()).unwrap_err();
        assert!(matches!(err, Error::NoRunsFound(_)));
    }

    #[test]
    fn test_latest_run_picks_greatest_name() {
        let dir = tempfile::tempdir().unwrap();
        fabricate_run(dir.path(), "20231231235959");
        fabricate_run(dir.path(), "20240101000000");

        let latest = latest_run(dir.path()).unwrap();
        assert_eq!(latest.name(), "run_20240101000000");
    }

    #[test]
    fn test_create_run_creates_checkpoint_dir() {
        let dir = tempfile::tempdir().unwrap();
        let run = create_run(dir.path()).unwrap();

        assert!(run.path().is_dir());
        assert!(run.checkpoint_dir().is_dir());
        assert!(run.name().starts_with(RUN_PREFIX));
    }

    #[test]
    fn test_results_root_layout() {
        let dir = tempfile::tempdir().unwrap();
        let root = results_root(dir.path(), ModelKind::Unet, "20240101120000").unwrap();
        assert!(root.ends_with("unet/20240101120000"));
        assert!(root.is_dir());
    }
}
