//! Data access seam
//!
//! The raster/windowing pipeline that turns raw scenes into fixed-size
//! training sequences lives outside this crate. The engine only needs
//! batches of flattened windows with encoded labels, so that is the whole
//! contract here, plus a seeded synthetic source for smoke runs and tests.

use rand::Rng;

use crate::config::{seeded_rng, ExperimentConfig, LabelEncoding};
use crate::Result;

/// Which split a data module should serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Training and validation data.
    Fit,
    /// Held-out test data.
    Test,
}

/// One batch of flattened windows and their encoded labels.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Flattened input windows, one per sample.
    pub windows: Vec<Vec<f32>>,
    /// Encoded class label per sample.
    pub labels: Vec<u32>,
}

impl Batch {
    /// Number of samples in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// Whether the batch holds no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Source of batches for one stage of a run.
pub trait DataModule {
    /// Prepare the requested split.
    ///
    /// # Errors
    ///
    /// Returns an error if the split cannot be prepared.
    fn setup(&mut self, stage: Stage) -> Result<()>;

    /// Batches for the prepared stage, in iteration order.
    fn batches(&self) -> Vec<Batch>;
}

/// Seeded in-memory data source.
///
/// Draws windows from per-class bands of the unit interval so that classes
/// are separable and a short smoke run shows a falling loss. The same seed
/// produces the same batches.
#[derive(Debug)]
pub struct SyntheticDataModule {
    seed: u64,
    num_classes: u32,
    window_len: usize,
    batch_size: usize,
    num_batches: usize,
    batches: Vec<Batch>,
}

impl SyntheticDataModule {
    /// Build a source matching the experiment's window shape.
    #[must_use]
    pub fn from_config(config: &ExperimentConfig, encoding: &LabelEncoding, batch_size: usize) -> Self {
        let channels = config.band_mode.channels() as usize;
        Self {
            seed: config.seed,
            num_classes: encoding.num_classes(),
            window_len: channels * config.timesteps() as usize,
            batch_size: batch_size.max(1),
            num_batches: 8,
            batches: Vec::new(),
        }
    }

    fn generate(&self, stage: Stage) -> Vec<Batch> {
        let stage_salt = match stage {
            Stage::Fit => 0,
            Stage::Test => 1,
        };
        let mut rng = seeded_rng(self.seed.wrapping_add(stage_salt));
        (0..self.num_batches)
            .map(|_| {
                let mut windows = Vec::with_capacity(self.batch_size);
                let mut labels = Vec::with_capacity(self.batch_size);
                for _ in 0..self.batch_size {
                    let label = rng.gen_range(0..self.num_classes);
                    let center = f64::from(label) / f64::from(self.num_classes.max(1));
                    let window = (0..self.window_len)
                        .map(|_| {
                            #[allow(clippy::cast_possible_truncation)]
                            let value = (center + rng.gen_range(-0.05..0.05)) as f32;
                            value
                        })
                        .collect();
                    windows.push(window);
                    labels.push(label);
                }
                Batch { windows, labels }
            })
            .collect()
    }
}

impl DataModule for SyntheticDataModule {
    fn setup(&mut self, stage: Stage) -> Result<()> {
        self.batches = self.generate(stage);
        Ok(())
    }

    fn batches(&self) -> Vec<Batch> {
        self.batches.clone()
    }
}
