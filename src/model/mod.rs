//! Model construction dispatch
//!
//! Six interchangeable architectures sit behind one entry point. Selection
//! happens through the closed [`ModelKind`] tag; every variant satisfies the
//! uniform [`ParcelModel`] contract (construct, load, save, forward), so the
//! training and evaluation engines never branch on the architecture.
//!
//! Checkpoints persist weights and the optimizer's learning rate only.
//! Architecture-specific hyperparameters are fixed per variant and
//! re-supplied at load time through the [`ModelContext`].
//!
//! Construction has no side effects beyond the in-memory object; nothing
//! here writes to the filesystem except an explicit [`ParcelModel::save`].

mod variants;

pub use variants::{ConvLstm, ConvStar, SimVp, TempCnn, Unet, Utae};

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::config::{ClassNames, LabelEncoding};
use crate::{Error, Result};

/// Closed set of supported architectures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Convolutional LSTM over the month sequence.
    ConvLstm,
    /// Temporal CNN over per-pixel band series.
    TempCnn,
    /// Convolutional STAR recurrent network.
    ConvStar,
    /// U-Net over stacked timesteps.
    Unet,
    /// U-TAE temporal-attention encoder.
    Utae,
    /// SimVP video-prediction backbone.
    SimVp,
}

impl ModelKind {
    /// Every supported kind, in declaration order.
    #[must_use]
    pub const fn all() -> [Self; 6] {
        [
            Self::ConvLstm,
            Self::TempCnn,
            Self::ConvStar,
            Self::Unet,
            Self::Utae,
            Self::SimVp,
        ]
    }

    /// Identifier used on the command line and in log paths.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ConvLstm => "convlstm",
            Self::TempCnn => "tempcnn",
            Self::ConvStar => "convstar",
            Self::Unet => "unet",
            Self::Utae => "utae",
            Self::SimVp => "simvp",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                Error::Config(format!(
                    "unknown model {s:?}; expected one of convlstm, tempcnn, convstar, unet, utae, simvp"
                ))
            })
    }
}

/// Inputs every model construction receives.
///
/// The label-encoding table and class weights are opaque pass-throughs; the
/// channel/timestep dimensions derive the input feature size; the seed keeps
/// fresh initialization reproducible.
#[derive(Debug, Clone)]
pub struct ModelContext {
    /// Crop-id to contiguous-index table.
    pub encoding: LabelEncoding,
    /// Optional per-encoded-class weights.
    pub class_weights: Option<BTreeMap<u32, f64>>,
    /// Input channels per timestep.
    pub channels: u32,
    /// Timesteps in one input window.
    pub timesteps: u32,
    /// Starting learning rate.
    pub learning_rate: f64,
    /// Seed for weight initialization.
    pub seed: u64,
}

/// Uniform capability set of every architecture.
pub trait ParcelModel: fmt::Debug {
    /// Which architecture this is.
    fn kind(&self) -> ModelKind;

    /// Number of output classes, background included.
    fn num_classes(&self) -> u32;

    /// Current learning rate.
    fn learning_rate(&self) -> f64;

    /// Replace the learning rate (schedule restore, per-epoch decay).
    fn set_learning_rate(&mut self, learning_rate: f64);

    /// Per-class scores for one flattened input window.
    fn forward(&self, window: &[f32]) -> Vec<f32>;

    /// One optimization step over a batch; returns the batch loss.
    fn train_step(&mut self, windows: &[Vec<f32>], labels: &[u32]) -> f64;

    /// Persist weights and learning rate to a checkpoint file.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be written.
    fn save(&self, path: &Path) -> Result<()>;
}

/// What a checkpoint file actually stores.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct CheckpointPayload {
    pub kind: ModelKind,
    pub learning_rate: f64,
    pub weights: Vec<f32>,
}

impl CheckpointPayload {
    pub(crate) fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub(crate) fn read(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

/// Construct a fresh model of the requested kind.
#[must_use]
pub fn build(kind: ModelKind, ctx: &ModelContext) -> Box<dyn ParcelModel> {
    match kind {
        ModelKind::ConvLstm => Box::new(ConvLstm::new(ctx)),
        ModelKind::TempCnn => Box::new(TempCnn::new(ctx)),
        ModelKind::ConvStar => Box::new(ConvStar::new(ctx)),
        ModelKind::Unet => Box::new(Unet::new(ctx)),
        ModelKind::Utae => Box::new(Utae::new(ctx)),
        ModelKind::SimVp => Box::new(SimVp::new(ctx)),
    }
}

/// Restore a model of the requested kind from a checkpoint.
///
/// Weights and the persisted learning rate come from the checkpoint; the
/// architecture's fixed hyperparameters come from `ctx`, since they are not
/// stored in the payload.
///
/// # Errors
///
/// Returns [`Error::Config`] if the checkpoint was produced by a different
/// architecture than requested, or an error if the payload cannot be read.
pub fn load(kind: ModelKind, checkpoint: &Path, ctx: &ModelContext) -> Result<Box<dyn ParcelModel>> {
    let payload = CheckpointPayload::read(checkpoint)?;
    if payload.kind != kind {
        return Err(Error::Config(format!(
            "checkpoint {} was produced by model '{}', not '{}'",
            checkpoint.display(),
            payload.kind,
            kind
        )));
    }
    Ok(match kind {
        ModelKind::ConvLstm => Box::new(ConvLstm::restore(ctx, payload)?),
        ModelKind::TempCnn => Box::new(TempCnn::restore(ctx, payload)?),
        ModelKind::ConvStar => Box::new(ConvStar::restore(ctx, payload)?),
        ModelKind::Unet => Box::new(Unet::restore(ctx, payload)?),
        ModelKind::Utae => Box::new(Utae::restore(ctx, payload)?),
        ModelKind::SimVp => Box::new(SimVp::restore(ctx, payload)?),
    })
}

/// Predicted class for one window: the argmax of [`ParcelModel::forward`].
#[must_use]
pub fn predict(model: &dyn ParcelModel, window: &[f32]) -> u32 {
    let scores = model.forward(window);
    let mut best = 0usize;
    for (index, score) in scores.iter().enumerate() {
        if *score > scores[best] {
            best = index;
        }
    }
    u32::try_from(best).unwrap_or(0)
}

/// Format a short human-readable summary of a model for evaluation logs.
#[must_use]
pub fn describe(model: &dyn ParcelModel, class_names: &ClassNames) -> String {
    format!(
        "{} ({} classes, {} named)",
        model.kind(),
        model.num_classes(),
        class_names.len()
    )
}
