//! Split evaluation: model probabilities to files to metrics.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;
use burn::tensor::activation::softmax;
use indicatif::{ProgressBar, ProgressStyle};

use conversion_model::StateConversionModel;
use story_data::{build_example, ConversionBatcher, ConversionRecord, SubwordEncoder};

use crate::convert::{convert_predictions, RawPredictions, StepProbs};
use crate::scorer::{score, SplitMetrics};

/// Evaluate every (record, entity) pair of a split.
///
/// Raw per-step probability triples go to
/// `{output_dir}/{name}_{iteration}_output.json`; the returned metrics come
/// from converting those probabilities and scoring them against `records`.
pub fn evaluate_split<B: Backend, M: StateConversionModel<B>>(
    model: &M,
    encoder: &Arc<dyn SubwordEncoder>,
    records: &[ConversionRecord],
    device: &B::Device,
    output_dir: &Path,
    name: &str,
    iteration: i64,
) -> anyhow::Result<SplitMetrics> {
    let batcher = ConversionBatcher::<B>::new(encoder.marker_ids().pad, device.clone());

    let pb = ProgressBar::new(records.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) Evaluating")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut all_preds: RawPredictions = Vec::with_capacity(records.len());
    for record in records {
        let mut record_preds = Vec::with_capacity(record.compact_states.len());
        for (entity_idx, labels) in record.compact_states.iter().enumerate() {
            let Some(example) = build_example(encoder.as_ref(), record, entity_idx)? else {
                // Already warned at build time. Emit empty distributions so
                // the scorer still sees one row per labeled step.
                record_preds.push(vec![StepProbs::default(); labels.len()]);
                continue;
            };
            let num_steps = example.num_steps;
            let batch = batcher.batch(vec![example]);
            let output = model.forward(&batch);

            let mut head_probs: [Vec<Vec<f32>>; 3] = Default::default();
            for (head, logits) in output.logits.into_iter().enumerate() {
                let [_, _, n_classes] = logits.dims();
                let flat: Vec<f32> = softmax(logits, 2)
                    .into_data()
                    .convert::<f32>()
                    .to_vec()
                    .map_err(|e| anyhow::anyhow!("failed to read probabilities: {e:?}"))?;
                head_probs[head] = flat
                    .chunks(n_classes)
                    .take(num_steps)
                    .map(|chunk| chunk.to_vec())
                    .collect();
            }

            let steps: Vec<StepProbs> = (0..num_steps)
                .map(|t| {
                    [
                        head_probs[0][t].clone(),
                        head_probs[1][t].clone(),
                        head_probs[2][t].clone(),
                    ]
                })
                .collect();
            record_preds.push(steps);
        }
        all_preds.push(record_preds);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let raw_path = output_dir.join(format!("{name}_{iteration}_output.json"));
    let file = std::fs::File::create(&raw_path)
        .with_context(|| format!("failed to create {}", raw_path.display()))?;
    serde_json::to_writer(std::io::BufWriter::new(file), &all_preds)?;

    let metrics = score(&convert_predictions(&all_preds), records)?;
    tracing::info!(
        name,
        iteration,
        accuracy = metrics.accuracy,
        consistency = metrics.consistency,
        verifiability = metrics.verifiability,
        "split evaluated"
    );
    Ok(metrics)
}
