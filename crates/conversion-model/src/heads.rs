//! Per-step classification heads.

use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::gelu;

/// Configuration for the three prediction heads.
#[derive(Config, Debug)]
pub struct StepHeadsConfig {
    /// Dimension of the per-step feature vector.
    pub d_features: usize,
    /// State-change classes (head 0).
    pub n_state_classes: usize,
    /// Location classes (heads 1 and 2).
    pub n_location_classes: usize,
    #[config(default = 128)]
    pub d_hidden: usize,
    #[config(default = 0.1)]
    pub dropout: f64,
}

impl StepHeadsConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> StepHeads<B> {
        StepHeads {
            proj: LinearConfig::new(self.d_features, self.d_hidden).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            state: LinearConfig::new(self.d_hidden, self.n_state_classes).init(device),
            loc_before: LinearConfig::new(self.d_hidden, self.n_location_classes).init(device),
            loc_after: LinearConfig::new(self.d_hidden, self.n_location_classes).init(device),
        }
    }
}

/// Shared projection followed by three independent linear classifiers.
#[derive(Module, Debug)]
pub struct StepHeads<B: Backend> {
    pub proj: Linear<B>,
    pub dropout: Dropout,
    pub state: Linear<B>,
    pub loc_before: Linear<B>,
    pub loc_after: Linear<B>,
}

/// Per-head logits over story-B steps, `(batch, steps, classes)` each.
/// Order: state, loc_before, loc_after.
#[derive(Debug, Clone)]
pub struct ConversionOutput<B: Backend> {
    pub logits: [Tensor<B, 3>; 3],
}

impl<B: Backend> StepHeads<B> {
    pub fn forward(&self, features: Tensor<B, 3>) -> ConversionOutput<B> {
        let h = self.dropout.forward(gelu(self.proj.forward(features)));
        ConversionOutput {
            logits: [
                self.state.forward(h.clone()),
                self.loc_before.forward(h.clone()),
                self.loc_after.forward(h),
            ],
        }
    }
}
