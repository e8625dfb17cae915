//! Question formatting and timestep-tagged sequence assembly.
//!
//! Every training example is a single token sequence
//! `<s> question sentence_1 ... sentence_T </s>` where each token carries a
//! tag saying which story step produced it. Tags are assigned while the
//! sequence is built, so token ids and tags can never drift out of
//! alignment.

use crate::tokenizer::{MarkerTokens, SubwordEncoder};

/// Which story step a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepTag {
    /// Start marker and question tokens.
    Question,
    /// Token of sentence `i` (zero-based).
    Step(usize),
}

impl StepTag {
    /// Dense tag index: 0 for the question region, `i + 1` for step `i`.
    pub fn index(self) -> i64 {
        match self {
            StepTag::Question => 0,
            StepTag::Step(i) => i as i64 + 1,
        }
    }
}

/// A tokenized story with per-token step tags.
#[derive(Debug, Clone)]
pub struct TimestepSequence {
    pub token_ids: Vec<u32>,
    pub tags: Vec<StepTag>,
    pub num_steps: usize,
}

impl TimestepSequence {
    pub fn len(&self) -> usize {
        self.token_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.token_ids.is_empty()
    }
}

/// Format the conversion question for a (participant, candidate) pair.
///
/// Produces `"{participant}?!</s>{candidate}?!</s>"` with the configured
/// suffix and separator. Lower-casing happens at encode time.
pub fn format_question(participant: &str, candidate: &str, markers: &MarkerTokens) -> String {
    format!(
        "{participant}{suffix}{sep}{candidate}{suffix}{sep}",
        suffix = markers.question_suffix,
        sep = markers.end,
    )
}

/// Tokenize a question and its story sentences into one tagged sequence.
///
/// Layout: start marker (tagged question), question tokens (tagged
/// question), each sentence's tokens with a prefix space (tagged with its
/// step), then the end marker tagged with the final step so the last
/// step's pool is never empty.
pub fn build_story_sequence(
    encoder: &dyn SubwordEncoder,
    question: &str,
    sentences: &[String],
) -> anyhow::Result<TimestepSequence> {
    let ids = encoder.marker_ids();
    let mut token_ids = vec![ids.start];
    let mut tags = vec![StepTag::Question];

    for id in encoder.encode(question, false)? {
        token_ids.push(id);
        tags.push(StepTag::Question);
    }

    for (step, sentence) in sentences.iter().enumerate() {
        for id in encoder.encode(sentence, true)? {
            token_ids.push(id);
            tags.push(StepTag::Step(step));
        }
    }

    let end_tag = if sentences.is_empty() {
        StepTag::Question
    } else {
        StepTag::Step(sentences.len() - 1)
    };
    token_ids.push(ids.end);
    tags.push(end_tag);

    Ok(TimestepSequence {
        token_ids,
        tags,
        num_steps: sentences.len(),
    })
}
