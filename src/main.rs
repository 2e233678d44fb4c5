//! Command-line entry point
//!
//! Parses the invocation, resolves the execution plan once, constructs or
//! restores the requested model, then hands control to the training or
//! evaluation engine. All resumption failures surface here as a non-zero
//! exit with the underlying message.

use std::fs;
use std::path::PathBuf;

use anyhow::{bail, Context};
use chrono::Local;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parcel_lab::config::{BandMode, ExperimentConfig};
use parcel_lab::data::SyntheticDataModule;
use parcel_lab::model::{self, ModelContext, ModelKind};
use parcel_lab::resume::{ResumeRequest, ResumeSpec};
use parcel_lab::run;
use parcel_lab::train::{TrainOptions, Trainer};

#[derive(Debug, Parser)]
#[command(name = "parcel-lab", version, about = "Train and evaluate parcel classification models")]
struct Args {
    /// Run in train mode.
    #[arg(long)]
    train: bool,

    /// Resume training from the given checkpoint, or from the last
    /// checkpoint available ("last").
    #[arg(long)]
    resume: Option<String>,

    /// The checkpoint path to load for model testing.
    #[arg(long)]
    load_checkpoint: Option<PathBuf>,

    /// Model to use.
    #[arg(long)]
    model: String,

    /// Number of epochs.
    #[arg(long, default_value_t = 10)]
    num_epochs: u32,

    /// The batch size.
    #[arg(long, default_value_t = 4)]
    batch_size: usize,

    /// Starting learning rate.
    #[arg(long, default_value_t = 1e-1)]
    lr: f64,

    /// The directory to save logs and models under.
    #[arg(long, default_value = "logs")]
    log_dir: PathBuf,

    /// Results prefix; defaults to a process-start timestamp.
    #[arg(long)]
    work_dir: Option<String>,

    /// Optional JSON experiment configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Seed override for every random component.
    #[arg(long)]
    seed: Option<u64>,

    /// The image bands to use.
    #[arg(long, value_enum)]
    band_mode: Option<BandModeArg>,

    /// Map categories to 0 background, 1 parcel.
    #[arg(long)]
    binary_labels: bool,

    /// Use precalculated per-class weights from the configuration.
    #[arg(long)]
    weighted_loss: bool,

    /// First month of the observation window.
    #[arg(long)]
    start_month: Option<u32>,

    /// Last month of the observation window.
    #[arg(long)]
    end_month: Option<u32>,

    /// Dataset split scenario.
    #[arg(long)]
    scenario: Option<u32>,

    /// Perform a dev test run: one batch per epoch.
    #[arg(long)]
    devtest: bool,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum BandModeArg {
    Nrgb,
    Rdeg,
}

impl From<BandModeArg> for BandMode {
    fn from(arg: BandModeArg) -> Self {
        match arg {
            BandModeArg::Nrgb => Self::Nrgb,
            BandModeArg::Rdeg => Self::Rdeg,
        }
    }
}

fn load_config(args: &Args) -> anyhow::Result<ExperimentConfig> {
    let mut config = match &args.config {
        Some(path) => ExperimentConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => ExperimentConfig::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(band_mode) = args.band_mode {
        config.band_mode = band_mode.into();
    }
    if let Some(start_month) = args.start_month {
        config.start_month = start_month;
    }
    if let Some(end_month) = args.end_month {
        config.end_month = end_month;
    }
    if let Some(scenario) = args.scenario {
        config.scenario = scenario;
    }
    config.binary_labels = config.binary_labels || args.binary_labels;
    if config.end_month <= config.start_month {
        bail!("end month must come after start month");
    }
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    if !args.train && args.load_checkpoint.is_none() {
        bail!("you should provide the checkpoint to load for model testing");
    }

    let kind: ModelKind = args.model.parse()?;
    let config = load_config(&args)?;

    let prefix = args
        .work_dir
        .clone()
        .unwrap_or_else(|| Local::now().format("%Y%m%d%H%M%S").to_string());
    let results_root = run::results_root(&args.log_dir, kind, &prefix)?;

    let mut request = ResumeRequest::new(&results_root, args.num_epochs)
        .train(args.train)
        .resume(args.resume.as_deref().map(ResumeSpec::from_arg));
    if let Some(checkpoint) = &args.load_checkpoint {
        request = request.load_checkpoint(checkpoint);
    }
    let plan = request.resolve()?;
    info!(
        run = %plan.run_path().display(),
        start_epoch = plan.start_epoch(),
        end_epoch = plan.end_epoch(),
        "resolved execution plan"
    );

    let encoding = config.label_encoding();
    let class_names = config.class_names();
    let ctx = ModelContext {
        encoding: encoding.clone(),
        class_weights: if args.weighted_loss {
            config.encoded_class_weights()
        } else {
            None
        },
        channels: config.band_mode.channels(),
        timesteps: config.timesteps(),
        learning_rate: args.lr,
        seed: config.seed,
    };

    let mut model = match plan.checkpoint() {
        Some(checkpoint) => model::load(kind, checkpoint, &ctx)
            .with_context(|| format!("loading checkpoint {}", checkpoint.display()))?,
        None => model::build(kind, &ctx),
    };
    if let Some(lr) = plan.restored_lr() {
        model.set_learning_rate(lr);
    }
    info!(summary = %model::describe(model.as_ref(), &class_names), "model ready");

    let mut data = SyntheticDataModule::from_config(&config, &encoding, args.batch_size);
    let trainer = Trainer::new(TrainOptions {
        batch_limit: args.devtest.then_some(1),
        ..TrainOptions::default()
    });

    if args.train {
        let report = trainer.fit(model.as_mut(), &mut data, &plan)?;
        info!(
            epochs = report.epochs_run,
            final_loss = report.final_loss,
            final_lr = report.final_lr,
            "training finished"
        );
    }

    let report = trainer.evaluate(model.as_ref(), &mut data, &class_names)?;
    let report_path = plan.run_path().join("evaluation.json");
    fs::write(&report_path, serde_json::to_string_pretty(&report)?)?;
    info!(
        accuracy = report.accuracy(),
        report = %report_path.display(),
        "evaluation written"
    );

    Ok(())
}
