mod backend;
mod config;
mod convert;
mod eval;
mod pipeline;
mod results;
mod scorer;
mod trainer;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use conversion_model::ModelVariant;

use config::TrainOverrides;
use pipeline::{ConvertArgs, EvalArgs, ScoreArgs, TrainArgs};

/// story-conv: train and evaluate state-conversion models over paired
/// process narratives.
#[derive(Parser)]
#[command(name = "story-conv", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fine-tune a conversion model and track the best dev checkpoint.
    Train {
        /// Path to the training config TOML file.
        #[arg(long, default_value = "configs/train.toml")]
        config: PathBuf,
        /// Base directory for run output; the run gets a subdirectory named
        /// after its hyperparameters.
        #[arg(long, default_value = "runs")]
        output_dir: PathBuf,
        /// Override the model variant (baseline-mixed or top-down).
        #[arg(long)]
        variant: Option<ModelVariant>,
        /// Override the number of training epochs.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the batch size.
        #[arg(long)]
        batch_size: Option<usize>,
        /// Override the gradient accumulation window.
        #[arg(long)]
        accumulation_steps: Option<usize>,
        /// Override the base learning rate.
        #[arg(long)]
        lr: Option<f64>,
        /// Override the gradient-norm clip threshold.
        #[arg(long)]
        max_grad_norm: Option<f64>,
        /// Override the random seed.
        #[arg(long)]
        seed: Option<u64>,
        /// Truncate the training records (smoke runs).
        #[arg(long)]
        max_records: Option<usize>,
    },
    /// Evaluate a run's best checkpoint on the test split.
    Eval {
        /// Run directory produced by `train`.
        #[arg(long)]
        run_dir: PathBuf,
    },
    /// Argmax a raw probability file into discrete predictions.
    Convert {
        /// Raw predictions JSON (from an evaluation pass).
        #[arg(long)]
        input: PathBuf,
        /// Output path for the converted predictions.
        #[arg(long)]
        output: PathBuf,
    },
    /// Score converted predictions against reference records.
    Score {
        /// Converted predictions JSON.
        #[arg(long)]
        predictions: PathBuf,
        /// Reference records JSON.
        #[arg(long)]
        reference: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Train {
            config,
            output_dir,
            variant,
            epochs,
            batch_size,
            accumulation_steps,
            lr,
            max_grad_norm,
            seed,
            max_records,
        } => pipeline::run_train(TrainArgs {
            config,
            output_dir,
            overrides: TrainOverrides {
                variant,
                epochs,
                batch_size,
                accumulation_steps,
                lr,
                max_grad_norm,
                seed,
                max_records,
            },
        }),
        Command::Eval { run_dir } => pipeline::run_eval(EvalArgs { run_dir }),
        Command::Convert { input, output } => {
            pipeline::run_convert(ConvertArgs { input, output })
        }
        Command::Score {
            predictions,
            reference,
        } => pipeline::run_score(ScoreArgs {
            predictions,
            reference,
        }),
    }
}
