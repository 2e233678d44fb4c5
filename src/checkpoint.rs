//! Checkpoint store scanning and epoch extraction
//!
//! Checkpoints are written by the training engine at epoch boundaries under
//! names such as `epoch=4-step=1280.ckpt`. This module only reads that
//! convention. The epoch token is the integer immediately
//! following the `epoch=` marker in the file stem, up to the next separator;
//! [`parse_epoch`] is the one implementation of that rule and every caller
//! goes through it.
//!
//! Scanning is a pure function over the directory contents. Results are never
//! cached across invocations.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::run::CHECKPOINT_DIR;
use crate::{Error, Result};

/// Extract the epoch number embedded in a checkpoint file name.
///
/// Returns `None` when the stem has no `epoch=` marker or the marker is not
/// followed by at least one digit. `epoch=4-step=1280.ckpt` parses to `4`,
/// not `1280`.
#[must_use]
pub fn parse_epoch(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let start = stem.find("epoch=")? + "epoch=".len();
    let digits: &str = &stem[start..];
    let end = digits
        .char_indices()
        .find(|(_, c)| !c.is_ascii_digit())
        .map_or(digits.len(), |(i, _)| i);
    digits[..end].parse().ok()
}

/// Resolve an explicitly supplied checkpoint reference to its epoch.
///
/// Unlike [`CheckpointStore::scan`], the epoch comes from the given path's
/// own name, not from a directory listing, so the caller can point at any
/// checkpoint regardless of what else the run contains.
///
/// # Errors
///
/// Returns [`Error::UnparsableCheckpointName`] if the name carries no epoch
/// token. An explicit reference the user typed is a hard contract; silently
/// skipping it is only acceptable during passive scanning.
pub fn resolve_named(checkpoint: &Path) -> Result<(u32, PathBuf)> {
    let epoch = parse_epoch(checkpoint).ok_or_else(|| {
        Error::UnparsableCheckpointName(
            checkpoint
                .file_name()
                .map_or_else(|| checkpoint.display().to_string(), |n| n.to_string_lossy().into_owned()),
        )
    })?;
    Ok((epoch, checkpoint.to_path_buf()))
}

/// The set of known checkpoints of one run, keyed by epoch.
///
/// At most one handle exists per epoch number. Two files parsing to the same
/// epoch collide; the one enumerated last wins and the collision is logged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointStore {
    dir: PathBuf,
    by_epoch: BTreeMap<u32, PathBuf>,
}

impl CheckpointStore {
    /// Scan a run's checkpoint directory.
    ///
    /// Entries whose name carries no epoch token are skipped, not errors:
    /// runs legitimately contain sidecar files next to checkpoints. A
    /// missing checkpoint directory scans as empty.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the directory exists but cannot be read.
    pub fn scan(run_path: &Path) -> Result<Self> {
        let dir = run_path.join(CHECKPOINT_DIR);
        let mut by_epoch = BTreeMap::new();

        if dir.is_dir() {
            for entry in fs::read_dir(&dir)? {
                let path = entry?.path();
                match parse_epoch(&path) {
                    Some(epoch) => {
                        if let Some(previous) = by_epoch.insert(epoch, path.clone()) {
                            warn!(
                                epoch,
                                kept = %path.display(),
                                dropped = %previous.display(),
                                "two checkpoints parse to the same epoch"
                            );
                        }
                    }
                    None => debug!(entry = %path.display(), "skipping unparsable checkpoint name"),
                }
            }
        }

        Ok(Self { dir, by_epoch })
    }

    /// Directory this store was scanned from.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether the store holds no checkpoints.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_epoch.is_empty()
    }

    /// Number of distinct epochs with a checkpoint.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_epoch.len()
    }

    /// Known epochs in ascending order.
    #[must_use]
    pub fn epochs(&self) -> Vec<u32> {
        self.by_epoch.keys().copied().collect()
    }

    /// Handle for a specific epoch, if present.
    #[must_use]
    pub fn get(&self, epoch: u32) -> Option<&Path> {
        self.by_epoch.get(&epoch).map(PathBuf::as_path)
    }

    /// The greatest known epoch and its handle.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCheckpointStore`] if the store is empty.
    pub fn latest(&self) -> Result<(u32, &Path)> {
        self.by_epoch
            .iter()
            .next_back()
            .map(|(epoch, path)| (*epoch, path.as_path()))
            .ok_or_else(|| Error::EmptyCheckpointStore(self.dir.clone()))
    }
}
