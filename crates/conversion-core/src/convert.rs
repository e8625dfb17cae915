//! Conversion of raw head probabilities into discrete predictions.
//!
//! The model writes per-step probability triples; downstream scoring wants
//! one `(state, loc_before, loc_after)` decision per step. Conversion is a
//! pure argmax and therefore idempotent: re-running it over the same raw
//! file always produces the same output.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Probability distributions for one step: state, loc_before, loc_after.
pub type StepProbs = [Vec<f32>; 3];

/// Raw model output: per record, per candidate entity, per story-B step.
pub type RawPredictions = Vec<Vec<Vec<StepProbs>>>;

/// Discrete decision for one step. `-1` marks a head that produced no
/// distribution (possible only for malformed raw rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConvertedStep {
    pub state: i64,
    pub loc_before: i64,
    pub loc_after: i64,
}

/// Discrete predictions mirroring the raw nesting.
pub type ConvertedPredictions = Vec<Vec<Vec<ConvertedStep>>>;

/// Index of the largest probability, `-1` for an empty distribution.
pub fn argmax(probs: &[f32]) -> i64 {
    let mut best = -1i64;
    let mut best_p = f32::NEG_INFINITY;
    for (i, &p) in probs.iter().enumerate() {
        if p > best_p {
            best_p = p;
            best = i as i64;
        }
    }
    best
}

/// Argmax every head of every step.
pub fn convert_predictions(raw: &RawPredictions) -> ConvertedPredictions {
    raw.iter()
        .map(|record| {
            record
                .iter()
                .map(|entity| {
                    entity
                        .iter()
                        .map(|step| ConvertedStep {
                            state: argmax(&step[0]),
                            loc_before: argmax(&step[1]),
                            loc_after: argmax(&step[2]),
                        })
                        .collect()
                })
                .collect()
        })
        .collect()
}

/// File-to-file conversion for the `convert` subcommand.
pub fn convert_file(input: &Path, output: &Path) -> anyhow::Result<ConvertedPredictions> {
    let raw: RawPredictions = serde_json::from_reader(BufReader::new(
        File::open(input).with_context(|| format!("failed to open {}", input.display()))?,
    ))
    .with_context(|| format!("failed to parse raw predictions {}", input.display()))?;

    let converted = convert_predictions(&raw);
    let file = File::create(output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    serde_json::to_writer(BufWriter::new(file), &converted)?;
    tracing::info!(
        input = %input.display(),
        output = %output.display(),
        records = converted.len(),
        "converted raw predictions"
    );
    Ok(converted)
}

/// Read a converted predictions file back (for the `score` subcommand).
pub fn read_converted(path: &Path) -> anyhow::Result<ConvertedPredictions> {
    serde_json::from_reader(BufReader::new(
        File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
    ))
    .with_context(|| format!("failed to parse converted predictions {}", path.display()))
}
