//! The two conversion model variants behind one contract.
//!
//! Both encode the stories the same way: one encoder pass per story, step
//! pooling, then story-A's steps are mean-reduced into a summary vector
//! that is concatenated onto every story-B step. The variants differ only
//! in what sits between those features and the heads.

use std::fmt;
use std::str::FromStr;

use burn::prelude::*;
use serde::{Deserialize, Serialize};

use story_data::{ConversionBatch, StepLabel};

use crate::backbone::{pool_steps, StoryEncoder, StoryEncoderConfig};
use crate::heads::{ConversionOutput, StepHeads, StepHeadsConfig};
use crate::loss::{masked_cross_entropy, HeadKind, HeadLosses};
use crate::recurrence::{StepRecurrence, StepRecurrenceConfig};

/// Which model architecture to train.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelVariant {
    /// Flat: each story-B step is classified independently.
    BaselineMixed,
    /// Hierarchical: a gated recurrence threads context through the steps.
    TopDown,
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelVariant::BaselineMixed => write!(f, "baseline-mixed"),
            ModelVariant::TopDown => write!(f, "top-down"),
        }
    }
}

impl FromStr for ModelVariant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "baseline-mixed" => Ok(ModelVariant::BaselineMixed),
            "top-down" => Ok(ModelVariant::TopDown),
            other => Err(format!(
                "unknown model variant {other:?} (expected baseline-mixed or top-down)"
            )),
        }
    }
}

/// Configuration shared by both variants.
#[derive(Config, Debug)]
pub struct ConversionModelConfig {
    pub encoder: StoryEncoderConfig,
    #[config(default = 6)]
    pub n_state_classes: usize,
    #[config(default = 16)]
    pub n_location_classes: usize,
    #[config(default = 128)]
    pub d_step_hidden: usize,
}

impl ConversionModelConfig {
    fn heads_config(&self, d_features: usize) -> StepHeadsConfig {
        StepHeadsConfig::new(d_features, self.n_state_classes, self.n_location_classes)
            .with_d_hidden(self.d_step_hidden)
            .with_dropout(self.encoder.dropout)
    }

    pub fn init_mixed<B: Backend>(&self, device: &B::Device) -> MixedConversion<B> {
        let d_features = 2 * self.encoder.d_model;
        MixedConversion {
            encoder: self.encoder.init(device),
            heads: self.heads_config(d_features).init(device),
        }
    }

    pub fn init_top_down<B: Backend>(&self, device: &B::Device) -> TopDownConversion<B> {
        let d_model = self.encoder.d_model;
        TopDownConversion {
            encoder: self.encoder.init(device),
            recurrence: StepRecurrenceConfig::new(2 * d_model, d_model).init(device),
            heads: self.heads_config(d_model).init(device),
        }
    }
}

/// Shared contract of both variants: logits per story-B step, and the same
/// with per-head optional losses for training.
pub trait StateConversionModel<B: Backend> {
    fn forward(&self, batch: &ConversionBatch<B>) -> ConversionOutput<B>;

    fn forward_with_labels(
        &self,
        batch: &ConversionBatch<B>,
    ) -> (HeadLosses<B>, ConversionOutput<B>);
}

/// Encode both stories and build per-story-B-step feature vectors.
fn step_features<B: Backend>(
    encoder: &StoryEncoder<B>,
    batch: &ConversionBatch<B>,
) -> Tensor<B, 3> {
    let hidden_a = encoder.forward(batch.input_ids_a.clone());
    let hidden_b = encoder.forward(batch.input_ids_b.clone());
    let pooled_a = pool_steps(hidden_a, batch.pool_a.clone());
    let pooled_b = pool_steps(hidden_b, batch.pool_b.clone());

    // Masked mean over story-A steps -> one summary vector per example.
    let mask = batch.step_mask_a.clone().unsqueeze_dim::<3>(2);
    let counts = batch
        .step_mask_a
        .clone()
        .sum_dim(1)
        .clamp_min(1.0)
        .unsqueeze_dim::<3>(2);
    let summary = (pooled_a * mask).sum_dim(1) / counts;

    let [batch_size, steps_b, d_model] = pooled_b.dims();
    let summary = summary.expand([batch_size, steps_b, d_model]);
    Tensor::cat(vec![pooled_b, summary], 2)
}

fn head_losses<B: Backend>(
    output: &ConversionOutput<B>,
    raw_labels: &[Vec<StepLabel>],
) -> HeadLosses<B> {
    [
        masked_cross_entropy(output.logits[0].clone(), raw_labels, HeadKind::State),
        masked_cross_entropy(output.logits[1].clone(), raw_labels, HeadKind::LocBefore),
        masked_cross_entropy(output.logits[2].clone(), raw_labels, HeadKind::LocAfter),
    ]
}

/// Flat variant: per-step features straight into the heads.
#[derive(Module, Debug)]
pub struct MixedConversion<B: Backend> {
    pub encoder: StoryEncoder<B>,
    pub heads: StepHeads<B>,
}

impl<B: Backend> MixedConversion<B> {
    pub fn with_pretrained_encoder(
        mut self,
        path: &std::path::Path,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        self.encoder = self.encoder.load_pretrained(path, device)?;
        Ok(self)
    }
}

impl<B: Backend> StateConversionModel<B> for MixedConversion<B> {
    fn forward(&self, batch: &ConversionBatch<B>) -> ConversionOutput<B> {
        self.heads.forward(step_features(&self.encoder, batch))
    }

    fn forward_with_labels(
        &self,
        batch: &ConversionBatch<B>,
    ) -> (HeadLosses<B>, ConversionOutput<B>) {
        let output = self.forward(batch);
        (head_losses(&output, &batch.raw_labels), output)
    }
}

/// Hierarchical variant: the recurrence walks story-B steps in order, so a
/// step's prediction can condition on everything before it.
#[derive(Module, Debug)]
pub struct TopDownConversion<B: Backend> {
    pub encoder: StoryEncoder<B>,
    pub recurrence: StepRecurrence<B>,
    pub heads: StepHeads<B>,
}

impl<B: Backend> TopDownConversion<B> {
    pub fn with_pretrained_encoder(
        mut self,
        path: &std::path::Path,
        device: &B::Device,
    ) -> anyhow::Result<Self> {
        self.encoder = self.encoder.load_pretrained(path, device)?;
        Ok(self)
    }
}

impl<B: Backend> StateConversionModel<B> for TopDownConversion<B> {
    fn forward(&self, batch: &ConversionBatch<B>) -> ConversionOutput<B> {
        let features = step_features(&self.encoder, batch);
        self.heads.forward(self.recurrence.forward(features))
    }

    fn forward_with_labels(
        &self,
        batch: &ConversionBatch<B>,
    ) -> (HeadLosses<B>, ConversionOutput<B>) {
        let output = self.forward(batch);
        (head_losses(&output, &batch.raw_labels), output)
    }
}
