//! Pretrained subword tokenizer service.
//!
//! The backbone's tokenizer is an external collaborator: everything the rest
//! of the pipeline needs from it is behind [`SubwordEncoder`], and the marker
//! tokens (`<s>`, `</s>`, `<pad>`, the `?!` question suffix) are configuration
//! values rather than literals scattered through the sequence builder.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Marker token texts used when assembling input sequences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerTokens {
    /// Start-of-sequence marker prepended to every input.
    #[serde(default = "default_start")]
    pub start: String,
    /// End-of-sequence marker, also used as the separator inside questions.
    #[serde(default = "default_end")]
    pub end: String,
    /// Padding token for batching.
    #[serde(default = "default_pad")]
    pub pad: String,
    /// Suffix appended to the participant and the candidate in a question.
    #[serde(default = "default_question_suffix")]
    pub question_suffix: String,
}

fn default_start() -> String {
    "<s>".to_string()
}
fn default_end() -> String {
    "</s>".to_string()
}
fn default_pad() -> String {
    "<pad>".to_string()
}
fn default_question_suffix() -> String {
    "?!".to_string()
}

impl Default for MarkerTokens {
    fn default() -> Self {
        Self {
            start: default_start(),
            end: default_end(),
            pad: default_pad(),
            question_suffix: default_question_suffix(),
        }
    }
}

/// Vocabulary ids of the marker tokens, resolved once at load time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkerIds {
    pub start: u32,
    pub end: u32,
    pub pad: u32,
}

/// Read-only subword encoding service shared by all components.
///
/// Implementations lower-case before encoding and never add special tokens
/// on their own — sequence assembly is the sequence builder's job.
pub trait SubwordEncoder: Send + Sync {
    /// Encode `text` into subword ids. `prefix_space` reproduces the
    /// backbone tokenizer's word-boundary handling for sentence-initial
    /// tokens glued onto a previous segment.
    fn encode(&self, text: &str, prefix_space: bool) -> anyhow::Result<Vec<u32>>;

    /// Ids of the start/end/pad markers.
    fn marker_ids(&self) -> MarkerIds;

    /// Marker token texts (for question formatting).
    fn markers(&self) -> &MarkerTokens;

    /// Size of the subword vocabulary, including markers.
    fn vocab_size(&self) -> usize;
}

/// [`SubwordEncoder`] backed by a HuggingFace `tokenizer.json` file.
pub struct StoryTokenizer {
    inner: tokenizers::Tokenizer,
    markers: MarkerTokens,
    ids: MarkerIds,
    vocab_size: usize,
}

impl StoryTokenizer {
    /// Load a tokenizer file and resolve the marker token ids.
    ///
    /// A marker missing from the vocabulary is a load error: the sequence
    /// builder cannot produce valid inputs without all three ids.
    pub fn from_file(path: &Path, markers: MarkerTokens) -> anyhow::Result<Self> {
        let inner = tokenizers::Tokenizer::from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load tokenizer from {}: {e}", path.display()))?;
        let lookup = |token: &str| {
            inner
                .token_to_id(token)
                .with_context(|| format!("marker token {token:?} missing from vocabulary"))
        };
        let ids = MarkerIds {
            start: lookup(&markers.start)?,
            end: lookup(&markers.end)?,
            pad: lookup(&markers.pad)?,
        };
        let vocab_size = inner.get_vocab_size(true);
        Ok(Self {
            inner,
            markers,
            ids,
            vocab_size,
        })
    }
}

impl SubwordEncoder for StoryTokenizer {
    fn encode(&self, text: &str, prefix_space: bool) -> anyhow::Result<Vec<u32>> {
        let lowered = text.to_lowercase();
        let input = if prefix_space {
            format!(" {lowered}")
        } else {
            lowered
        };
        let encoding = self
            .inner
            .encode(input.as_str(), false)
            .map_err(|e| anyhow::anyhow!("tokenization failed: {e}"))?;
        Ok(encoding.get_ids().to_vec())
    }

    fn marker_ids(&self) -> MarkerIds {
        self.ids
    }

    fn markers(&self) -> &MarkerTokens {
        &self.markers
    }

    fn vocab_size(&self) -> usize {
        self.vocab_size
    }
}
