//! # Parcel-Lab: Experiment Orchestration for Parcel Classification
//!
//! Parcel-lab manages the lifecycle of training runs for a set of
//! interchangeable sequence/image models on a remote-sensing parcel
//! classification task. The heart of the crate is the resumption core: for
//! any invocation it decides whether a fresh run begins, an existing run
//! resumes from a specific or latest checkpoint, or a checkpoint is loaded
//! purely for evaluation, and it keeps the bookkeeping (run directories,
//! epoch counters, per-epoch learning-rate ledger) that makes resumption
//! correct across process restarts.
//!
//! ## Design Principles
//!
//! - **Filesystem as database**: runs, checkpoints, and the ledger are
//!   recovered from directory contents on every invocation; nothing is
//!   cached across processes
//! - **Fail loud**: a missing run, checkpoint, or ledger entry aborts
//!   resolution instead of silently starting over or guessing a rate
//! - **One parsing rule**: every epoch extraction goes through
//!   [`checkpoint::parse_epoch`]
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use parcel_lab::resume::{ResumeRequest, ResumeSpec};
//!
//! // Resume the latest run for another 10 epochs
//! let plan = ResumeRequest::new("logs/unet/experiment-a", 10)
//!     .resume(Some(ResumeSpec::Last))
//!     .resolve()?;
//!
//! println!(
//!     "resuming {} at epoch {}",
//!     plan.run_path().display(),
//!     plan.start_epoch()
//! );
//! # Ok::<(), parcel_lab::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod ledger;
pub mod model;
pub mod resume;
pub mod run;
pub mod train;

pub use error::{Error, Result};
