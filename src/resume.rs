//! Resume decision engine
//!
//! Invoked once per process, before the training or evaluation engine takes
//! over. Four mutually exclusive modes, evaluated in priority order:
//!
//! 1. evaluate-only (`train == false`): load the named checkpoint, run one
//!    evaluation pass
//! 2. resume-last: latest run under the results root, latest checkpoint in it
//! 3. resume-named: the exact checkpoint the caller pointed at
//! 4. fresh start: a newly created run directory, epoch 0
//!
//! Mid-run resumes (modes 2 and 3) also restore the optimizer's learning
//! rate from the ledger; a missing entry aborts the whole resolution.
//!
//! The run directory of an explicitly supplied checkpoint is derived from
//! path ancestry (`<run>/checkpoints/<file>`), never from a filesystem
//! search.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::info;

use crate::checkpoint::{resolve_named, CheckpointStore};
use crate::ledger::LearningRateLedger;
use crate::run;
use crate::{Error, Result};

/// How the caller asked training to resume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumeSpec {
    /// Resume from the latest checkpoint of the latest run.
    Last,
    /// Resume from this exact checkpoint.
    Checkpoint(PathBuf),
}

impl ResumeSpec {
    /// Interpret a command-line resume argument: the literal `last` selects
    /// the latest checkpoint, anything else names one.
    #[must_use]
    pub fn from_arg(s: &str) -> Self {
        if s == "last" {
            Self::Last
        } else {
            Self::Checkpoint(PathBuf::from(s))
        }
    }
}

impl FromStr for ResumeSpec {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from_arg(s))
    }
}

/// One invocation's resumption intent, as normalized by the command surface.
#[derive(Debug, Clone)]
pub struct ResumeRequest {
    results_root: PathBuf,
    num_epochs: u32,
    train: bool,
    resume: Option<ResumeSpec>,
    load_checkpoint: Option<PathBuf>,
}

impl ResumeRequest {
    /// Create a training request with no resumption.
    #[must_use]
    pub fn new(results_root: impl Into<PathBuf>, num_epochs: u32) -> Self {
        Self {
            results_root: results_root.into(),
            num_epochs,
            train: true,
            resume: None,
            load_checkpoint: None,
        }
    }

    /// Set train mode (`false` selects evaluate-only).
    #[must_use]
    pub fn train(mut self, train: bool) -> Self {
        self.train = train;
        self
    }

    /// Set the resume specification.
    #[must_use]
    pub fn resume(mut self, resume: Option<ResumeSpec>) -> Self {
        self.resume = resume;
        self
    }

    /// Set the checkpoint to load for evaluate-only mode.
    #[must_use]
    pub fn load_checkpoint(mut self, checkpoint: impl Into<PathBuf>) -> Self {
        self.load_checkpoint = Some(checkpoint.into());
        self
    }

    /// Resolve this request into an execution plan.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an evaluate-only request without a
    /// checkpoint, [`Error::NoRunsFound`] / [`Error::EmptyCheckpointStore`]
    /// when resume-last finds nothing to resume,
    /// [`Error::UnparsableCheckpointName`] / [`Error::OrphanCheckpoint`] for
    /// a malformed explicit reference, and
    /// [`Error::LearningRateNotFound`] when a mid-run resume has no ledger
    /// entry for the resolved epoch.
    pub fn resolve(&self) -> Result<ExecutionPlan> {
        if !self.train {
            return self.resolve_evaluate_only();
        }
        match &self.resume {
            Some(ResumeSpec::Last) => self.resolve_resume_last(),
            Some(ResumeSpec::Checkpoint(path)) => self.resolve_resume_named(path),
            None => self.resolve_fresh_start(),
        }
    }

    fn resolve_evaluate_only(&self) -> Result<ExecutionPlan> {
        let checkpoint = self.load_checkpoint.as_ref().ok_or_else(|| {
            Error::Config("evaluate mode requires a checkpoint to load".to_string())
        })?;
        let (epoch, handle) = resolve_named(checkpoint)?;
        let run_path = run_dir_of(checkpoint)?;
        info!(checkpoint = %handle.display(), epoch, "evaluate-only");
        Ok(ExecutionPlan {
            run_path,
            checkpoint: Some(handle),
            start_epoch: epoch,
            end_epoch: epoch + 1,
            restored_lr: None,
        })
    }

    fn resolve_resume_last(&self) -> Result<ExecutionPlan> {
        let latest = run::latest_run(&self.results_root)?;
        let store = CheckpointStore::scan(latest.path())?;
        let (epoch, handle) = store.latest()?;
        let handle = handle.to_path_buf();
        let lr = LearningRateLedger::for_run(latest.path()).read(epoch)?;
        info!(run = latest.name(), epoch, "resuming from last checkpoint");
        Ok(ExecutionPlan {
            run_path: latest.into_path(),
            checkpoint: Some(handle),
            start_epoch: epoch,
            end_epoch: epoch + self.num_epochs,
            restored_lr: Some(lr),
        })
    }

    fn resolve_resume_named(&self, checkpoint: &Path) -> Result<ExecutionPlan> {
        let (epoch, handle) = resolve_named(checkpoint)?;
        let run_path = run_dir_of(checkpoint)?;
        let lr = LearningRateLedger::for_run(&run_path).read(epoch)?;
        info!(checkpoint = %handle.display(), epoch, "resuming from named checkpoint");
        Ok(ExecutionPlan {
            run_path,
            checkpoint: Some(handle),
            start_epoch: epoch,
            end_epoch: epoch + self.num_epochs,
            restored_lr: Some(lr),
        })
    }

    fn resolve_fresh_start(&self) -> Result<ExecutionPlan> {
        let created = run::create_run(&self.results_root)?;
        info!(run = created.name(), "fresh start");
        Ok(ExecutionPlan {
            run_path: created.into_path(),
            checkpoint: None,
            start_epoch: 0,
            end_epoch: self.num_epochs,
            restored_lr: None,
        })
    }
}

/// Run directory of a checkpoint, by path ancestry alone.
fn run_dir_of(checkpoint: &Path) -> Result<PathBuf> {
    checkpoint
        .parent()
        .and_then(Path::parent)
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .ok_or_else(|| Error::OrphanCheckpoint(checkpoint.to_path_buf()))
}

/// The fully resolved plan consumed by the model dispatcher and the
/// training/evaluation engine.
///
/// `start_epoch <= end_epoch` always holds. The checkpoint is present for
/// every mode except fresh start; the restored learning rate is present
/// exactly for mid-run resumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionPlan {
    run_path: PathBuf,
    checkpoint: Option<PathBuf>,
    start_epoch: u32,
    end_epoch: u32,
    restored_lr: Option<f64>,
}

impl ExecutionPlan {
    /// Run directory all artifacts of this invocation belong to.
    #[must_use]
    pub fn run_path(&self) -> &Path {
        &self.run_path
    }

    /// Checkpoint to load, absent on fresh start.
    #[must_use]
    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    /// First epoch the engine will execute.
    #[must_use]
    pub const fn start_epoch(&self) -> u32 {
        self.start_epoch
    }

    /// Exclusive upper bound of the epoch range.
    #[must_use]
    pub const fn end_epoch(&self) -> u32 {
        self.end_epoch
    }

    /// Learning rate restored from the ledger, present iff this is a
    /// mid-run resume.
    #[must_use]
    pub const fn restored_lr(&self) -> Option<f64> {
        self.restored_lr
    }

    /// Number of epochs the engine will execute.
    #[must_use]
    pub const fn epoch_count(&self) -> u32 {
        self.end_epoch - self.start_epoch
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seeded_run(root: &Path, timestamp: &str, epochs: &[u32]) -> PathBuf {
        let run_path = root.join(format!("run_{timestamp}"));
        let ckpt_dir = run_path.join(run::CHECKPOINT_DIR);
        fs::create_dir_all(&ckpt_dir).unwrap();
        let ledger = LearningRateLedger::for_run(&run_path);
        for &epoch in epochs {
            fs::write(
                ckpt_dir.join(format!("epoch={epoch}-step={}.ckpt", (epoch + 1) * 100)),
                b"",
            )
            .unwrap();
            ledger.append(epoch, 0.1 / f64::from(epoch + 1)).unwrap();
        }
        run_path
    }

    #[test]
    fn test_resume_spec_from_str() {
        assert_eq!("last".parse::<ResumeSpec>().unwrap(), ResumeSpec::Last);
        assert_eq!(
            "runs/epoch=3.ckpt".parse::<ResumeSpec>().unwrap(),
            ResumeSpec::Checkpoint(PathBuf::from("runs/epoch=3.ckpt"))
        );
    }

    #[test]
    fn test_fresh_start_plan() {
        let root = tempfile::tempdir().unwrap();
        let plan = ResumeRequest::new(root.path(), 10).resolve().unwrap();

        assert_eq!(plan.start_epoch(), 0);
        assert_eq!(plan.end_epoch(), 10);
        assert!(plan.checkpoint().is_none());
        assert!(plan.restored_lr().is_none());
        assert!(plan.run_path().is_dir());
    }

    #[test]
    fn test_resume_last_uses_latest_run_and_epoch() {
        let root = tempfile::tempdir().unwrap();
        seeded_run(root.path(), "20240101000000", &[0, 1]);
        seeded_run(root.path(), "20240201000000", &[0, 1, 2, 3, 4]);

        let plan = ResumeRequest::new(root.path(), 10)
            .resume(Some(ResumeSpec::Last))
            .resolve()
            .unwrap();

        assert_eq!(plan.start_epoch(), 4);
        assert_eq!(plan.end_epoch(), 14);
        assert!(plan.run_path().ends_with("run_20240201000000"));
        assert!((plan.restored_lr().unwrap() - 0.1 / 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_resume_last_without_runs() {
        let root = tempfile::tempdir().unwrap();
        let err = ResumeRequest::new(root.path(), 10)
            .resume(Some(ResumeSpec::Last))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::NoRunsFound(_)));
    }

    #[test]
    fn test_resume_last_without_checkpoints() {
        let root = tempfile::tempdir().unwrap();
        seeded_run(root.path(), "20240101000000", &[]);
        let err = ResumeRequest::new(root.path(), 10)
            .resume(Some(ResumeSpec::Last))
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::EmptyCheckpointStore(_)));
    }

    #[test]
    fn test_resume_named_ignores_later_checkpoints() {
        let root = tempfile::tempdir().unwrap();
        let run_path = seeded_run(root.path(), "20240101000000", &[0, 1, 2, 3, 4, 5, 6, 7, 8]);
        let target = run_path
            .join(run::CHECKPOINT_DIR)
            .join("epoch=7-step=800.ckpt");

        let plan = ResumeRequest::new(root.path(), 5)
            .resume(Some(ResumeSpec::Checkpoint(target.clone())))
            .resolve()
            .unwrap();

        assert_eq!(plan.start_epoch(), 7);
        assert_eq!(plan.end_epoch(), 12);
        assert_eq!(plan.checkpoint(), Some(target.as_path()));
        assert_eq!(plan.run_path(), run_path);
    }

    #[test]
    fn test_resume_named_missing_ledger_entry() {
        let root = tempfile::tempdir().unwrap();
        let run_path = root.path().join("run_20240101000000");
        let ckpt_dir = run_path.join(run::CHECKPOINT_DIR);
        fs::create_dir_all(&ckpt_dir).unwrap();
        let target = ckpt_dir.join("epoch=4.ckpt");
        fs::write(&target, b"").unwrap();

        let err = ResumeRequest::new(root.path(), 5)
            .resume(Some(ResumeSpec::Checkpoint(target)))
            .resolve()
            .unwrap_err();
        assert!(matches!(
            err,
            Error::LearningRateNotFound { epoch: 4, .. }
        ));
    }

    #[test]
    fn test_evaluate_only_plan() {
        let root = tempfile::tempdir().unwrap();
        let run_path = seeded_run(root.path(), "20240101000000", &[0, 1, 2, 3]);
        let target = run_path
            .join(run::CHECKPOINT_DIR)
            .join("epoch=3-step=400.ckpt");

        let plan = ResumeRequest::new(root.path(), 10)
            .train(false)
            .load_checkpoint(&target)
            .resolve()
            .unwrap();

        assert_eq!(plan.start_epoch(), 3);
        assert_eq!(plan.end_epoch(), 4);
        assert_eq!(plan.epoch_count(), 1);
        assert!(plan.restored_lr().is_none());
        assert_eq!(plan.run_path(), run_path);
    }

    #[test]
    fn test_evaluate_only_requires_checkpoint() {
        let root = tempfile::tempdir().unwrap();
        let err = ResumeRequest::new(root.path(), 10)
            .train(false)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_evaluate_only_run_path_is_structural() {
        // The run directory comes from path ancestry, not from a search,
        // so it resolves even if nothing exists on disk.
        let root = tempfile::tempdir().unwrap();
        let plan = ResumeRequest::new(root.path(), 10)
            .train(false)
            .load_checkpoint("logs/unet/run_x/checkpoints/epoch=2.ckpt")
            .resolve()
            .unwrap();
        assert_eq!(plan.run_path(), Path::new("logs/unet/run_x"));
    }

    #[test]
    fn test_orphan_checkpoint_path() {
        let root = tempfile::tempdir().unwrap();
        let err = ResumeRequest::new(root.path(), 10)
            .train(false)
            .load_checkpoint("epoch=2.ckpt")
            .resolve()
            .unwrap_err();
        assert!(matches!(err, Error::OrphanCheckpoint(_)));
    }

    #[test]
    fn test_plan_epoch_invariant() {
        let root = tempfile::tempdir().unwrap();
        let plan = ResumeRequest::new(root.path(), 0).resolve().unwrap();
        assert!(plan.start_epoch() <= plan.end_epoch());
        assert_eq!(plan.epoch_count(), 0);
    }
}
