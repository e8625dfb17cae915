//! Subcommand entry points wiring config, data, model and trainer together.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use burn::module::Module;
use burn::prelude::Backend;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

use conversion_model::{ConversionModelConfig, ModelVariant, StoryEncoderConfig};
use story_data::mocks::HashingEncoder;
use story_data::{read_conversion_file, StoryTokenizer, SubwordEncoder};

use crate::backend::{InferenceBackend, TrainingBackend};
use crate::config::{load_train_toml, ModelSection, TokenizerSection, TrainOverrides, TrainToml};
use crate::convert;
use crate::eval::evaluate_split;
use crate::results::{append_jsonl, FinalTestResult};
use crate::scorer::{score, SplitMetrics};
use crate::trainer;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    pub config: PathBuf,
    pub output_dir: PathBuf,
    pub overrides: TrainOverrides,
}

/// Arguments for the `eval` subcommand.
#[derive(Debug)]
pub struct EvalArgs {
    /// Run directory produced by `train` (holds `training_args.json` and
    /// `best_model`).
    pub run_dir: PathBuf,
}

/// Arguments for the `convert` subcommand.
#[derive(Debug)]
pub struct ConvertArgs {
    pub input: PathBuf,
    pub output: PathBuf,
}

/// Arguments for the `score` subcommand.
#[derive(Debug)]
pub struct ScoreArgs {
    pub predictions: PathBuf,
    pub reference: PathBuf,
}

fn build_encoder(section: &TokenizerSection) -> anyhow::Result<Arc<dyn SubwordEncoder>> {
    match &section.path {
        Some(path) => Ok(Arc::new(StoryTokenizer::from_file(
            path,
            section.markers.clone(),
        )?)),
        None => {
            tracing::warn!(
                vocab_size = section.vocab_size,
                "no tokenizer file configured, using the deterministic hashing encoder"
            );
            Ok(Arc::new(HashingEncoder::new(section.vocab_size)))
        }
    }
}

fn model_config(model: &ModelSection, vocab_size: usize, pad_id: usize) -> ConversionModelConfig {
    let encoder = StoryEncoderConfig::new(vocab_size, pad_id)
        .with_max_seq_len(model.max_seq_len)
        .with_d_model(model.d_model)
        .with_n_heads(model.n_heads)
        .with_n_layers(model.n_layers)
        .with_d_ff(model.d_ff)
        .with_dropout(model.dropout);
    ConversionModelConfig::new(encoder)
        .with_n_state_classes(model.n_state_classes)
        .with_n_location_classes(model.n_location_classes)
        .with_d_step_hidden(model.d_step_hidden)
}

/// Fine-tune a model and keep the checkpoint with the best dev verifiability.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let mut cfg = load_train_toml(&args.config)?;
    cfg.apply(&args.overrides);

    let run_dir = cfg.run_dir(&args.output_dir);
    if run_dir.is_dir() && run_dir.read_dir()?.next().is_some() {
        tracing::warn!(
            dir = %run_dir.display(),
            "output directory is not empty, existing files may be overwritten"
        );
    }
    std::fs::create_dir_all(&run_dir)
        .with_context(|| format!("failed to create {}", run_dir.display()))?;

    // Provenance: the resolved config and the TOML file that produced it.
    serde_json::to_writer_pretty(
        std::io::BufWriter::new(File::create(run_dir.join("training_args.json"))?),
        &cfg,
    )?;
    std::fs::copy(&args.config, run_dir.join("train.toml"))?;

    TrainingBackend::seed(cfg.training.seed);
    let device = Default::default();

    let encoder = build_encoder(&cfg.tokenizer)?;
    let train_records = read_conversion_file(&cfg.data.train_path())?;
    let dev_records = read_conversion_file(&cfg.data.dev_path())?;

    let pad_id = encoder.marker_ids().pad as usize;
    let model_cfg = model_config(&cfg.model, encoder.vocab_size(), pad_id);

    match cfg.model.variant {
        ModelVariant::BaselineMixed => {
            let mut model = model_cfg.init_mixed::<TrainingBackend>(&device);
            if let Some(path) = &cfg.model.pretrained {
                model = model.with_pretrained_encoder(path, &device)?;
            }
            trainer::fit(
                &cfg.training,
                model,
                encoder,
                &train_records,
                &dev_records,
                cfg.data.max_records,
                &run_dir,
                &device,
            )?;
        }
        ModelVariant::TopDown => {
            let mut model = model_cfg.init_top_down::<TrainingBackend>(&device);
            if let Some(path) = &cfg.model.pretrained {
                model = model.with_pretrained_encoder(path, &device)?;
            }
            trainer::fit(
                &cfg.training,
                model,
                encoder,
                &train_records,
                &dev_records,
                cfg.data.max_records,
                &run_dir,
                &device,
            )?;
        }
    }

    tracing::info!(run_dir = %run_dir.display(), "training run complete");
    Ok(())
}

/// Evaluate the best checkpoint of a run on the test split.
pub fn run_eval(args: EvalArgs) -> anyhow::Result<()> {
    let cfg = read_resolved_config(&args.run_dir)?;
    let encoder = build_encoder(&cfg.tokenizer)?;
    let test_records = read_conversion_file(&cfg.data.test_path())?;

    let device = Default::default();
    let pad_id = encoder.marker_ids().pad as usize;
    let model_cfg = model_config(&cfg.model, encoder.vocab_size(), pad_id);
    let checkpoint = args.run_dir.join("best_model");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();

    let metrics: SplitMetrics = match cfg.model.variant {
        ModelVariant::BaselineMixed => {
            let model = model_cfg
                .init_mixed::<InferenceBackend>(&device)
                .load_file(checkpoint.clone(), &recorder, &device)
                .map_err(|e| {
                    anyhow::anyhow!("failed to load checkpoint {}: {e}", checkpoint.display())
                })?;
            evaluate_split(
                &model,
                &encoder,
                &test_records,
                &device,
                &args.run_dir,
                "test_conversion",
                -1,
            )?
        }
        ModelVariant::TopDown => {
            let model = model_cfg
                .init_top_down::<InferenceBackend>(&device)
                .load_file(checkpoint.clone(), &recorder, &device)
                .map_err(|e| {
                    anyhow::anyhow!("failed to load checkpoint {}: {e}", checkpoint.display())
                })?;
            evaluate_split(
                &model,
                &encoder,
                &test_records,
                &device,
                &args.run_dir,
                "test_conversion",
                -1,
            )?
        }
    };

    append_jsonl(
        &args.run_dir.join("final_test_results.json"),
        &FinalTestResult {
            iteration: -1,
            accuracy: metrics.accuracy,
            consistency: metrics.consistency,
            verifiability: metrics.verifiability,
        },
    )?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

/// Argmax raw probabilities into discrete predictions, file to file.
pub fn run_convert(args: ConvertArgs) -> anyhow::Result<()> {
    convert::convert_file(&args.input, &args.output)?;
    Ok(())
}

/// Score a converted predictions file against reference records.
pub fn run_score(args: ScoreArgs) -> anyhow::Result<()> {
    let predictions = convert::read_converted(&args.predictions)?;
    let references = read_conversion_file(&args.reference)?;
    let metrics = score(&predictions, &references)?;
    println!("{}", serde_json::to_string_pretty(&metrics)?);
    Ok(())
}

fn read_resolved_config(run_dir: &Path) -> anyhow::Result<TrainToml> {
    let path = run_dir.join("training_args.json");
    let file =
        File::open(&path).with_context(|| format!("failed to open {}", path.display()))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))
}
