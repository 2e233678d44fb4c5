//! The six supported architectures
//!
//! Each variant owns its fixed hyperparameters and a shared prototype core:
//! one weight row per class, trained by pulling the predicted class row
//! toward observed windows. Scores are negated mean squared distances, so
//! the closest prototype wins.

use std::collections::BTreeMap;
use std::path::Path;

use rand::Rng;

use crate::config::seeded_rng;
use crate::{Error, Result};

use super::{CheckpointPayload, ModelContext, ModelKind, ParcelModel};

/// Shared weight storage and update rule behind every variant.
#[derive(Debug, Clone)]
pub(crate) struct ModelCore {
    num_classes: u32,
    feature_dim: usize,
    weights: Vec<f32>,
    learning_rate: f64,
    class_weights: Option<BTreeMap<u32, f64>>,
}

impl ModelCore {
    fn new(ctx: &ModelContext, feature_dim: usize, salt: u64) -> Self {
        let num_classes = ctx.encoding.num_classes();
        let mut rng = seeded_rng(ctx.seed.wrapping_add(salt));
        let weights = (0..num_classes as usize * feature_dim)
            .map(|_| rng.gen_range(-0.05f32..0.05f32))
            .collect();
        Self {
            num_classes,
            feature_dim,
            weights,
            learning_rate: ctx.learning_rate,
            class_weights: ctx.class_weights.clone(),
        }
    }

    fn with_weights(
        ctx: &ModelContext,
        feature_dim: usize,
        payload: CheckpointPayload,
    ) -> Result<Self> {
        let num_classes = ctx.encoding.num_classes();
        let expected = num_classes as usize * feature_dim;
        if payload.weights.len() != expected {
            return Err(Error::Config(format!(
                "checkpoint holds {} weights but '{}' with {} classes expects {}",
                payload.weights.len(),
                payload.kind,
                num_classes,
                expected
            )));
        }
        Ok(Self {
            num_classes,
            feature_dim,
            weights: payload.weights,
            learning_rate: payload.learning_rate,
            class_weights: ctx.class_weights.clone(),
        })
    }

    const fn num_classes(&self) -> u32 {
        self.num_classes
    }

    const fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    fn set_learning_rate(&mut self, learning_rate: f64) {
        self.learning_rate = learning_rate;
    }

    fn feature(&self, window: &[f32], index: usize) -> f32 {
        window.get(index).copied().unwrap_or(0.0)
    }

    fn forward(&self, window: &[f32]) -> Vec<f32> {
        (0..self.num_classes as usize)
            .map(|class| {
                let base = class * self.feature_dim;
                let mut sq = 0.0f32;
                for i in 0..self.feature_dim {
                    let delta = self.feature(window, i) - self.weights[base + i];
                    sq += delta * delta;
                }
                -(sq / self.feature_dim.max(1) as f32)
            })
            .collect()
    }

    fn class_weight(&self, class: u32) -> f64 {
        self.class_weights
            .as_ref()
            .and_then(|w| w.get(&class).copied())
            .unwrap_or(1.0)
    }

    fn train_step(&mut self, windows: &[Vec<f32>], labels: &[u32]) -> f64 {
        if windows.is_empty() {
            return 0.0;
        }
        let mut total = 0.0f64;
        for (window, label) in windows.iter().zip(labels) {
            let class = (*label).min(self.num_classes.saturating_sub(1));
            let weight = self.class_weight(class);
            let base = class as usize * self.feature_dim;
            #[allow(clippy::cast_possible_truncation)]
            let step = (self.learning_rate * weight) as f32;
            let mut sq = 0.0f64;
            for i in 0..self.feature_dim {
                let x = self.feature(window, i);
                let delta = x - self.weights[base + i];
                sq += f64::from(delta * delta);
                self.weights[base + i] += step * delta;
            }
            total += weight * sq / self.feature_dim.max(1) as f64;
        }
        total / windows.len() as f64
    }

    fn save(&self, kind: ModelKind, path: &Path) -> Result<()> {
        CheckpointPayload {
            kind,
            learning_rate: self.learning_rate,
            weights: self.weights.clone(),
        }
        .write(path)
    }
}

fn sequence_features(ctx: &ModelContext, channels: u32) -> usize {
    (channels * ctx.timesteps) as usize
}

macro_rules! impl_parcel_model {
    ($ty:ident, $kind:expr) => {
        impl ParcelModel for $ty {
            fn kind(&self) -> ModelKind {
                $kind
            }

            fn num_classes(&self) -> u32 {
                self.core.num_classes()
            }

            fn learning_rate(&self) -> f64 {
                self.core.learning_rate()
            }

            fn set_learning_rate(&mut self, learning_rate: f64) {
                self.core.set_learning_rate(learning_rate);
            }

            fn forward(&self, window: &[f32]) -> Vec<f32> {
                self.core.forward(window)
            }

            fn train_step(&mut self, windows: &[Vec<f32>], labels: &[u32]) -> f64 {
                self.core.train_step(windows, labels)
            }

            fn save(&self, path: &Path) -> Result<()> {
                self.core.save($kind, path)
            }
        }
    };
}

/// Convolutional LSTM over the month sequence.
#[derive(Debug, Clone)]
pub struct ConvLstm {
    core: ModelCore,
}

impl ConvLstm {
    /// Hidden state width of each recurrent cell.
    pub const HIDDEN_DIM: u32 = 64;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, ctx.channels), 1),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, ctx.channels), payload)?,
        })
    }
}

impl_parcel_model!(ConvLstm, ModelKind::ConvLstm);

/// Temporal CNN over per-pixel band series.
///
/// Works on a fixed three-band subset regardless of the configured band
/// mode, so its input width is independent of `ctx.channels`.
#[derive(Debug, Clone)]
pub struct TempCnn {
    core: ModelCore,
}

impl TempCnn {
    /// Bands consumed per timestep.
    pub const INPUT_DIM: u32 = 3;
    /// Temporal convolution kernel size.
    pub const KERNEL_SIZE: u32 = 3;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, Self::INPUT_DIM), 2),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, Self::INPUT_DIM), payload)?,
        })
    }
}

impl_parcel_model!(TempCnn, ModelKind::TempCnn);

/// Convolutional STAR recurrent network.
#[derive(Debug, Clone)]
pub struct ConvStar {
    core: ModelCore,
}

impl ConvStar {
    /// Hidden state width of each STAR cell.
    pub const HIDDEN_DIM: u32 = 64;
    /// Stacked recurrent layers.
    pub const NUM_LAYERS: u32 = 3;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, ctx.channels), 3),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, ctx.channels), payload)?,
        })
    }
}

impl_parcel_model!(ConvStar, ModelKind::ConvStar);

/// U-Net over stacked timesteps.
#[derive(Debug, Clone)]
pub struct Unet {
    core: ModelCore,
}

impl Unet {
    /// Encoder/decoder depth.
    pub const NUM_LAYERS: u32 = 3;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, ctx.channels), 4),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, ctx.channels), payload)?,
        })
    }
}

impl_parcel_model!(Unet, ModelKind::Unet);

/// U-TAE temporal-attention encoder.
#[derive(Debug, Clone)]
pub struct Utae {
    core: ModelCore,
}

impl Utae {
    /// Spectral input size expected by the attention encoder.
    pub const INPUT_SIZE: u32 = 4;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, Self::INPUT_SIZE), 5),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, Self::INPUT_SIZE), payload)?,
        })
    }
}

impl_parcel_model!(Utae, ModelKind::Utae);

/// SimVP video-prediction backbone.
#[derive(Debug, Clone)]
pub struct SimVp {
    core: ModelCore,
}

impl SimVp {
    /// Spatial hidden width.
    pub const HID_S: u32 = 64;
    /// Temporal hidden width.
    pub const HID_T: u32 = 512;
    /// Spatial blocks.
    pub const N_S: u32 = 4;
    /// Temporal blocks.
    pub const N_T: u32 = 8;
    /// Inception kernel sizes.
    pub const INCEP_KER: [u32; 4] = [3, 5, 7, 11];
    /// Group count for grouped convolutions.
    pub const GROUPS: u32 = 8;

    /// Fresh model with seeded initialization.
    #[must_use]
    pub fn new(ctx: &ModelContext) -> Self {
        Self {
            core: ModelCore::new(ctx, sequence_features(ctx, ctx.channels), 6),
        }
    }

    pub(crate) fn restore(ctx: &ModelContext, payload: CheckpointPayload) -> Result<Self> {
        Ok(Self {
            core: ModelCore::with_weights(ctx, sequence_features(ctx, ctx.channels), payload)?,
        })
    }
}

impl_parcel_model!(SimVp, ModelKind::SimVp);
