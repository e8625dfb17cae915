//! Story encoder: embeddings + transformer over one tokenized story.

use std::path::Path;

use burn::module::Module;
use burn::nn::transformer::{
    TransformerEncoder, TransformerEncoderConfig, TransformerEncoderInput,
};
use burn::nn::{Embedding, EmbeddingConfig};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder};

/// Configuration for the shared story encoder.
#[derive(Config, Debug)]
pub struct StoryEncoderConfig {
    /// Subword vocabulary size, markers included.
    pub vocab_size: usize,
    /// Id of the pad token, used to build the attention mask.
    pub pad_id: usize,
    #[config(default = 512)]
    pub max_seq_len: usize,
    #[config(default = 256)]
    pub d_model: usize,
    #[config(default = 4)]
    pub n_heads: usize,
    #[config(default = 4)]
    pub n_layers: usize,
    #[config(default = 1024)]
    pub d_ff: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl StoryEncoderConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> StoryEncoder<B> {
        let token_embedding = EmbeddingConfig::new(self.vocab_size, self.d_model).init(device);
        let position_embedding = EmbeddingConfig::new(self.max_seq_len, self.d_model).init(device);
        let encoder = TransformerEncoderConfig::new(
            self.d_model,
            self.d_ff,
            self.n_heads,
            self.n_layers,
        )
        .with_dropout(self.dropout)
        .init(device);
        StoryEncoder {
            token_embedding,
            position_embedding,
            encoder,
            pad_id: self.pad_id,
            d_model: self.d_model,
        }
    }
}

/// Transformer encoder producing contextual token states for one story.
#[derive(Module, Debug)]
pub struct StoryEncoder<B: Backend> {
    pub token_embedding: Embedding<B>,
    pub position_embedding: Embedding<B>,
    pub encoder: TransformerEncoder<B>,
    pub pad_id: usize,
    pub d_model: usize,
}

impl<B: Backend> StoryEncoder<B> {
    /// `(batch, seq)` token ids to `(batch, seq, d_model)` hidden states.
    ///
    /// Pad positions are masked out of attention but still produce hidden
    /// states; the pooling weights never select them.
    pub fn forward(&self, input_ids: Tensor<B, 2, Int>) -> Tensor<B, 3> {
        let [batch, seq_len] = input_ids.dims();
        let pad_mask = input_ids.clone().equal_elem(self.pad_id as i64);

        let tok_emb = self.token_embedding.forward(input_ids);
        let positions = Tensor::<B, 1, Int>::arange(0..seq_len as i64, &tok_emb.device())
            .unsqueeze::<2>()
            .expand([batch, seq_len]);
        let pos_emb = self.position_embedding.forward(positions);

        self.encoder
            .forward(TransformerEncoderInput::new(tok_emb + pos_emb).mask_pad(pad_mask))
    }

    /// Replace the randomly initialized weights with a pretrained record.
    pub fn load_pretrained(self, path: &Path, device: &B::Device) -> anyhow::Result<Self> {
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let loaded = self
            .load_file(path, &recorder, device)
            .map_err(|e| anyhow::anyhow!("failed to load encoder from {}: {e}", path.display()))?;
        tracing::info!(path = %path.display(), "loaded pretrained story encoder");
        Ok(loaded)
    }
}

/// Average each step's hidden states with the batcher's normalized weights:
/// `(batch, steps, seq) x (batch, seq, d) -> (batch, steps, d)`.
pub fn pool_steps<B: Backend>(hidden: Tensor<B, 3>, pool: Tensor<B, 3>) -> Tensor<B, 3> {
    pool.matmul(hidden)
}
