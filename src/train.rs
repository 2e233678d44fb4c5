//! Training and evaluation engine
//!
//! A deliberately small stand-in for a distributed trainer: it iterates the
//! plan's epoch range once per process and produces exactly the artifacts
//! the resumption core reads back later. At every epoch boundary it appends
//! the current learning rate to the ledger and writes one
//! `epoch=<N>-step=<S>.ckpt` checkpoint, then applies a multiplicative
//! learning-rate decay.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::ClassNames;
use crate::data::{DataModule, Stage};
use crate::ledger::LearningRateLedger;
use crate::model::{predict, ParcelModel};
use crate::resume::ExecutionPlan;
use crate::run::CHECKPOINT_DIR;
use crate::Result;

/// Engine knobs that do not belong to any single model.
#[derive(Debug, Clone)]
pub struct TrainOptions {
    /// Multiplier applied to the learning rate after each epoch.
    pub lr_decay: f64,
    /// Truncate every epoch to this many batches (dev-test smoke mode).
    pub batch_limit: Option<usize>,
}

impl Default for TrainOptions {
    fn default() -> Self {
        Self {
            lr_decay: 0.9,
            batch_limit: None,
        }
    }
}

/// Summary of one `fit` invocation.
#[derive(Debug, Clone)]
pub struct FitReport {
    /// Epochs actually executed.
    pub epochs_run: u32,
    /// Mean loss of the final epoch.
    pub final_loss: f64,
    /// Learning rate in effect after the final decay.
    pub final_lr: f64,
    /// Checkpoints written, one per epoch.
    pub checkpoints: Vec<PathBuf>,
}

/// Per-class evaluation counts plus overall accuracy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalReport {
    /// Samples evaluated.
    pub total: usize,
    /// Samples predicted correctly.
    pub correct: usize,
    /// Per-class (support, correct) counts keyed by display name.
    pub per_class: BTreeMap<String, (usize, usize)>,
}

impl EvalReport {
    /// Overall accuracy in `[0, 1]`; zero on an empty evaluation.
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.correct as f64 / self.total as f64
    }
}

/// Drives a model through the epoch range of a resolved plan.
#[derive(Debug, Default, Clone)]
pub struct Trainer {
    options: TrainOptions,
}

impl Trainer {
    /// Trainer with the given options.
    #[must_use]
    pub const fn new(options: TrainOptions) -> Self {
        Self { options }
    }

    /// Train over `plan.start_epoch()..plan.end_epoch()`.
    ///
    /// A resumed plan re-runs its starting epoch, so the ledger may receive
    /// a second line for that epoch; readers take the last one.
    ///
    /// # Errors
    ///
    /// Returns an error if the data module, a checkpoint write, or a ledger
    /// append fails.
    pub fn fit(
        &self,
        model: &mut dyn ParcelModel,
        data: &mut dyn DataModule,
        plan: &ExecutionPlan,
    ) -> Result<FitReport> {
        data.setup(Stage::Fit)?;
        let batches = data.batches();
        let per_epoch = self
            .options
            .batch_limit
            .map_or(batches.len(), |limit| batches.len().min(limit));

        let ledger = LearningRateLedger::for_run(plan.run_path());
        let checkpoint_dir = plan.run_path().join(CHECKPOINT_DIR);
        fs::create_dir_all(&checkpoint_dir)?;

        let mut step = u64::from(plan.start_epoch()) * per_epoch as u64;
        let mut final_loss = 0.0;
        let mut checkpoints = Vec::new();

        for epoch in plan.start_epoch()..plan.end_epoch() {
            let mut epoch_loss = 0.0;
            for batch in batches.iter().take(per_epoch) {
                epoch_loss += model.train_step(&batch.windows, &batch.labels);
                step += 1;
            }
            final_loss = if per_epoch == 0 {
                0.0
            } else {
                epoch_loss / per_epoch as f64
            };

            ledger.append(epoch, model.learning_rate())?;
            let checkpoint = checkpoint_dir.join(format!("epoch={epoch}-step={step}.ckpt"));
            model.save(&checkpoint)?;
            debug!(epoch, checkpoint = %checkpoint.display(), "wrote checkpoint");
            info!(
                epoch,
                loss = final_loss,
                lr = model.learning_rate(),
                "epoch complete"
            );
            checkpoints.push(checkpoint);

            model.set_learning_rate(model.learning_rate() * self.options.lr_decay);
        }

        Ok(FitReport {
            epochs_run: plan.epoch_count(),
            final_loss,
            final_lr: model.learning_rate(),
            checkpoints,
        })
    }

    /// One evaluation pass over the test split.
    ///
    /// # Errors
    ///
    /// Returns an error if the data module fails to prepare the split.
    pub fn evaluate(
        &self,
        model: &dyn ParcelModel,
        data: &mut dyn DataModule,
        class_names: &ClassNames,
    ) -> Result<EvalReport> {
        data.setup(Stage::Test)?;

        let mut total = 0;
        let mut correct = 0;
        let mut per_class: BTreeMap<String, (usize, usize)> = BTreeMap::new();

        for batch in data.batches() {
            for (window, label) in batch.windows.iter().zip(&batch.labels) {
                let predicted = predict(model, window);
                let entry = per_class
                    .entry(class_names.name(*label).to_string())
                    .or_default();
                entry.0 += 1;
                total += 1;
                if predicted == *label {
                    entry.1 += 1;
                    correct += 1;
                }
            }
        }

        let report = EvalReport {
            total,
            correct,
            per_class,
        };
        info!(
            total,
            correct,
            accuracy = report.accuracy(),
            "evaluation complete"
        );
        Ok(report)
    }
}
