//! Fine-tuning loop: AdamW with linear warmup/decay, gradient accumulation,
//! and best-checkpoint selection by dev verifiability.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use burn::data::dataloader::{DataLoader, DataLoaderBuilder};
use burn::data::dataset::Dataset;
use burn::grad_clipping::GradientClippingConfig;
use burn::module::{AutodiffModule, Module};
use burn::optim::{AdamWConfig, GradientsAccumulator, GradientsParams, Optimizer};
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::ElementConversion;
use indicatif::{ProgressBar, ProgressStyle};

use conversion_model::{sum_losses, StateConversionModel};
use story_data::{ConversionBatcher, ConversionDataset, ConversionRecord, SubwordEncoder};

use crate::config::TrainingSection;
use crate::eval::evaluate_split;
use crate::results::{append_jsonl, EpochResult};

/// Learning rate at `step`: linear warmup to `base_lr`, then linear decay
/// to zero at `total_steps`.
pub fn lr_schedule(base_lr: f64, warmup_steps: usize, total_steps: usize, step: usize) -> f64 {
    if warmup_steps > 0 && step < warmup_steps {
        base_lr * (step + 1) as f64 / warmup_steps as f64
    } else {
        let decay_steps = total_steps.saturating_sub(warmup_steps).max(1);
        let progress = step.saturating_sub(warmup_steps) as f64 / decay_steps as f64;
        base_lr * (1.0 - progress.min(1.0))
    }
}

/// Best-so-far dev verifiability. Ties checkpoint again so equal scores
/// favor the more-trained model.
pub struct BestTracker {
    best: f64,
}

impl BestTracker {
    pub fn new() -> Self {
        Self {
            best: f64::NEG_INFINITY,
        }
    }

    pub fn should_checkpoint(&mut self, verifiability: f64) -> bool {
        if verifiability >= self.best {
            self.best = verifiability;
            true
        } else {
            false
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }
}

impl Default for BestTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Fine-tune `model` on the train split, evaluating the dev split after a
/// pre-training baseline pass and after every epoch.
///
/// Writes one JSONL row per evaluation to `{run_dir}/results_epoch_dev.json`
/// and keeps the best checkpoint at `{run_dir}/best_model`.
#[allow(clippy::too_many_arguments)]
pub fn fit<B, M>(
    training: &TrainingSection,
    mut model: M,
    encoder: Arc<dyn SubwordEncoder>,
    train_records: &[ConversionRecord],
    dev_records: &[ConversionRecord],
    max_records: Option<usize>,
    run_dir: &Path,
    device: &B::Device,
) -> anyhow::Result<M>
where
    B: AutodiffBackend,
    M: StateConversionModel<B> + AutodiffModule<B>,
    M::InnerModule: StateConversionModel<B::InnerBackend>,
{
    let dataset = ConversionDataset::from_records(encoder.clone(), train_records, max_records)?;
    let n_examples = dataset.len();
    anyhow::ensure!(n_examples > 0, "training split produced no examples");

    let batches_per_epoch = n_examples.div_ceil(training.batch_size);
    let steps_per_epoch = batches_per_epoch.div_ceil(training.accumulation_steps);
    let total_steps = steps_per_epoch * training.epochs;
    let warmup_steps = (total_steps as f64 * training.warmup_fraction).round() as usize;
    tracing::info!(
        examples = n_examples,
        batches_per_epoch,
        total_steps,
        warmup_steps,
        "starting fine-tuning"
    );

    let batcher = ConversionBatcher::<B>::new(encoder.marker_ids().pad, device.clone());
    let loader = DataLoaderBuilder::new(batcher)
        .batch_size(training.batch_size)
        .shuffle(training.seed)
        .num_workers(1)
        .build(dataset);

    let mut optimizer = AdamWConfig::new()
        .with_weight_decay(training.weight_decay as f32)
        .with_epsilon(training.adam_epsilon as f32)
        .with_grad_clipping(Some(GradientClippingConfig::Norm(
            training.max_grad_norm as f32,
        )))
        .init();

    let results_path = run_dir.join("results_epoch_dev.json");
    let checkpoint_path = run_dir.join("best_model");
    let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
    let mut tracker = BestTracker::new();

    // Pre-training baseline on dev, recorded as iteration 0. The baseline
    // never seeds the tracker, so epoch 1 always produces a checkpoint.
    let baseline = evaluate_split(
        &model.valid(),
        &encoder,
        dev_records,
        device,
        run_dir,
        "dev_conversion",
        0,
    )?;
    append_jsonl(
        &results_path,
        &EpochResult {
            iteration: 0,
            accuracy: baseline.accuracy,
            consistency: baseline.consistency,
            verifiability: baseline.verifiability,
        },
    )?;

    let train_start = Instant::now();
    let mut optim_step = 0usize;

    for epoch in 0..training.epochs {
        let mut accumulator = GradientsAccumulator::<M>::new();
        let mut accumulated = 0usize;
        let mut epoch_loss = 0.0f64;
        let mut loss_batches = 0usize;

        let pb = ProgressBar::new(batches_per_epoch as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        pb.set_message(format!("epoch {}", epoch + 1));

        for batch in loader.iter() {
            let (losses, _) = model.forward_with_labels(&batch);
            if let Some(loss) = sum_losses(losses) {
                epoch_loss += loss.clone().into_scalar().elem::<f64>();
                loss_batches += 1;

                // Scale so the accumulated gradient matches one big batch.
                let scaled = loss.div_scalar(training.accumulation_steps as f32);
                let grads = GradientsParams::from_grads(scaled.backward(), &model);
                accumulator.accumulate(&model, grads);
                accumulated += 1;
            }

            if accumulated == training.accumulation_steps {
                let lr = lr_schedule(training.lr, warmup_steps, total_steps, optim_step);
                model = optimizer.step(lr.into(), model, accumulator.grads());
                optim_step += 1;
                accumulated = 0;
            }
            pb.inc(1);
        }

        // A trailing partial window still counts as one optimizer step.
        if accumulated > 0 {
            let lr = lr_schedule(training.lr, warmup_steps, total_steps, optim_step);
            model = optimizer.step(lr.into(), model, accumulator.grads());
            optim_step += 1;
        }
        pb.finish_and_clear();

        let mean_loss = if loss_batches > 0 {
            epoch_loss / loss_batches as f64
        } else {
            0.0
        };
        tracing::info!(
            epoch = epoch + 1,
            mean_loss,
            optim_step,
            elapsed_secs = train_start.elapsed().as_secs(),
            "epoch finished"
        );

        let metrics = evaluate_split(
            &model.valid(),
            &encoder,
            dev_records,
            device,
            run_dir,
            "dev_conversion",
            (epoch + 1) as i64,
        )?;
        append_jsonl(
            &results_path,
            &EpochResult {
                iteration: (epoch + 1) as i64,
                accuracy: metrics.accuracy,
                consistency: metrics.consistency,
                verifiability: metrics.verifiability,
            },
        )?;

        if tracker.should_checkpoint(metrics.verifiability) {
            model
                .clone()
                .save_file(&checkpoint_path, &recorder)
                .map_err(|e| anyhow::anyhow!("failed to save checkpoint: {e}"))?;
            tracing::info!(
                epoch = epoch + 1,
                verifiability = metrics.verifiability,
                "saved best checkpoint"
            );
        }
    }

    tracing::info!(
        best_verifiability = tracker.best(),
        "fine-tuning complete"
    );
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lr_schedule() {
        let base_lr = 5e-6;
        let warmup = 10;
        let total = 100;

        // Warmup ramps linearly from base_lr/warmup to base_lr.
        let lr0 = lr_schedule(base_lr, warmup, total, 0);
        assert!((lr0 - base_lr / 10.0).abs() < 1e-15);
        let lr9 = lr_schedule(base_lr, warmup, total, 9);
        assert!((lr9 - base_lr).abs() < 1e-15);

        // Decay is linear down to zero at total_steps.
        let lr55 = lr_schedule(base_lr, warmup, total, 55);
        assert!((lr55 - base_lr * 0.5).abs() < 1e-12);
        let lr100 = lr_schedule(base_lr, warmup, total, 100);
        assert_eq!(lr100, 0.0);

        // Past the end the rate stays at zero.
        assert_eq!(lr_schedule(base_lr, warmup, total, 500), 0.0);

        // No warmup: starts at base_lr.
        let lr_no_warmup = lr_schedule(base_lr, 0, 100, 0);
        assert!((lr_no_warmup - base_lr).abs() < 1e-15);
    }

    #[test]
    fn test_lr_schedule_monotonic_after_warmup() {
        let mut prev = f64::INFINITY;
        for step in 10..100 {
            let lr = lr_schedule(1e-4, 10, 100, step);
            assert!(lr <= prev);
            prev = lr;
        }
    }

    #[test]
    fn test_checkpoint_on_improvement_and_ties() {
        let mut tracker = BestTracker::new();
        assert!(tracker.should_checkpoint(0.0));
        assert!(tracker.should_checkpoint(0.2));
        assert!(!tracker.should_checkpoint(0.1));
        // An equal score checkpoints again: the newer model wins the tie.
        assert!(tracker.should_checkpoint(0.2));
        assert_eq!(tracker.best(), 0.2);
        assert!(tracker.should_checkpoint(0.35));
        assert_eq!(tracker.best(), 0.35);
    }

    #[test]
    fn test_best_never_decreases() {
        let mut tracker = BestTracker::new();
        let scores = [0.1, 0.4, 0.2, 0.4, 0.05, 0.6];
        let mut prev_best = f64::NEG_INFINITY;
        for v in scores {
            tracker.should_checkpoint(v);
            assert!(tracker.best() >= prev_best);
            prev_best = tracker.best();
        }
        assert_eq!(tracker.best(), 0.6);
    }
}
