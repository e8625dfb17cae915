//! Expansion of records into per-candidate training examples.
//!
//! One [`ConversionRecord`] yields one example per candidate entity: both
//! stories are tokenized with the same (participant, candidate) question,
//! and the candidate's label chain over story-B steps becomes the target.

use std::sync::Arc;

use burn::data::dataset::Dataset;

use crate::records::{ConversionRecord, StepLabel};
use crate::sequence::{build_story_sequence, format_question};
use crate::tokenizer::SubwordEncoder;

/// Fully tokenized (record, candidate) pair, ready for batching.
#[derive(Debug, Clone)]
pub struct ConversionExample {
    pub story_id: String,
    pub participant: String,
    pub candidate: String,
    pub token_ids_a: Vec<u32>,
    pub tags_a: Vec<i64>,
    pub token_ids_b: Vec<u32>,
    pub tags_b: Vec<i64>,
    /// One label per story-B step.
    pub labels: Vec<StepLabel>,
    pub num_steps: usize,
}

/// Tokenize one candidate of one record.
///
/// Returns `Ok(None)` when the record's label chain does not match its
/// story length; the caller logs and skips such records.
pub fn build_example(
    encoder: &dyn SubwordEncoder,
    record: &ConversionRecord,
    candidate_idx: usize,
) -> anyhow::Result<Option<ConversionExample>> {
    let candidate = &record.possible_participants_converted_to[candidate_idx];
    let labels = &record.compact_states[candidate_idx];
    if labels.len() != record.story_b_sentences.len() {
        tracing::warn!(
            story_id = %record.story_id,
            candidate = %candidate,
            labels = labels.len(),
            steps = record.story_b_sentences.len(),
            "label chain length does not match story, skipping"
        );
        return Ok(None);
    }

    let question = format_question(&record.participant_converted, candidate, encoder.markers());
    let seq_a = build_story_sequence(encoder, &question, &record.story_a_sentences)?;
    let seq_b = build_story_sequence(encoder, &question, &record.story_b_sentences)?;

    Ok(Some(ConversionExample {
        story_id: record.story_id.clone(),
        participant: record.participant_converted.clone(),
        candidate: candidate.clone(),
        token_ids_a: seq_a.token_ids,
        tags_a: seq_a.tags.iter().map(|t| t.index()).collect(),
        token_ids_b: seq_b.token_ids,
        tags_b: seq_b.tags.iter().map(|t| t.index()).collect(),
        labels: labels.clone(),
        num_steps: record.story_b_sentences.len(),
    }))
}

/// In-memory dataset of tokenized conversion examples.
pub struct ConversionDataset {
    examples: Vec<ConversionExample>,
}

impl ConversionDataset {
    /// Expand records into examples, tokenizing everything up front.
    ///
    /// `max_records` truncates the record list before expansion, for smoke
    /// runs on a handful of stories.
    pub fn from_records(
        encoder: Arc<dyn SubwordEncoder>,
        records: &[ConversionRecord],
        max_records: Option<usize>,
    ) -> anyhow::Result<Self> {
        let limit = max_records.unwrap_or(records.len()).min(records.len());
        let mut examples = Vec::new();
        let mut skipped = 0usize;
        for record in &records[..limit] {
            if record.compact_states.len() != record.possible_participants_converted_to.len() {
                tracing::warn!(
                    story_id = %record.story_id,
                    "candidate and label counts disagree, skipping record"
                );
                skipped += 1;
                continue;
            }
            for idx in 0..record.possible_participants_converted_to.len() {
                match build_example(encoder.as_ref(), record, idx)? {
                    Some(example) => examples.push(example),
                    None => skipped += 1,
                }
            }
        }
        tracing::info!(
            examples = examples.len(),
            skipped,
            "built conversion dataset"
        );
        Ok(Self { examples })
    }

    pub fn examples(&self) -> &[ConversionExample] {
        &self.examples
    }
}

impl Dataset<ConversionExample> for ConversionDataset {
    fn get(&self, index: usize) -> Option<ConversionExample> {
        self.examples.get(index).cloned()
    }

    fn len(&self) -> usize {
        self.examples.len()
    }
}
