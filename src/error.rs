//! Error types for parcel-lab
//!
//! Every failure in the resumption core is unrecoverable locally: it means a
//! missing experiment artifact or a caller misconfiguration, so errors carry
//! enough context to act on and are never retried.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// parcel-lab error types
#[derive(Error, Debug)]
pub enum Error {
    /// Resume-last was requested but the results root has no run directories
    #[error("no run directories found under {0}\nStart a fresh training run before resuming with 'last'")]
    NoRunsFound(PathBuf),

    /// Resume-last was requested but the run has no readable checkpoints
    #[error("no checkpoints found in {0}\nThe run has not completed any epoch yet")]
    EmptyCheckpointStore(PathBuf),

    /// The learning-rate ledger has no entry for the resumed epoch
    #[error("no learning-rate entry for epoch {epoch} in {ledger}\nResuming without the recorded rate would corrupt the schedule")]
    LearningRateNotFound {
        /// Ledger file that was searched
        ledger: PathBuf,
        /// Epoch the resume resolved to
        epoch: u32,
    },

    /// An explicitly supplied checkpoint name carries no recognizable epoch token
    #[error("cannot parse an epoch number from checkpoint name: {0:?}\nExpected an 'epoch=<N>' token in the file stem")]
    UnparsableCheckpointName(String),

    /// A checkpoint path is too shallow to derive its run directory from
    #[error("checkpoint path {0} has no enclosing run directory\nCheckpoints live at <run>/checkpoints/<file>")]
    OrphanCheckpoint(PathBuf),

    /// Invocation-level misconfiguration
    #[error("invalid configuration: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error (checkpoint payloads, config files)
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
