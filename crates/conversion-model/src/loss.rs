//! Cross-entropy over the labeled subset of (example, step) positions.
//!
//! A label of `-1` means "no supervision for this head at this step"; those
//! positions are excluded from the loss entirely. When a whole batch has no
//! applicable label for a head the head contributes no loss at all, which
//! is an `Option`, not a zero — a zero would still run the backward pass
//! and skew gradient statistics.

use burn::nn::loss::CrossEntropyLossConfig;
use burn::prelude::*;

use story_data::StepLabel;

/// The three supervision channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeadKind {
    State,
    LocBefore,
    LocAfter,
}

impl HeadKind {
    pub const ALL: [HeadKind; 3] = [HeadKind::State, HeadKind::LocBefore, HeadKind::LocAfter];

    /// This head's label in a step annotation.
    pub fn label_of(self, label: &StepLabel) -> i64 {
        match self {
            HeadKind::State => label.state,
            HeadKind::LocBefore => label.loc_before,
            HeadKind::LocAfter => label.loc_after,
        }
    }
}

/// Per-head losses; `None` where the batch had no applicable label.
pub type HeadLosses<B> = [Option<Tensor<B, 1>>; 3];

/// Cross-entropy of one head over the positions whose label is `>= 0`.
///
/// `logits` is `(batch, max_steps, classes)`; `raw_labels` the per-example
/// label chains (shorter than `max_steps` where steps were padded).
pub fn masked_cross_entropy<B: Backend>(
    logits: Tensor<B, 3>,
    raw_labels: &[Vec<StepLabel>],
    kind: HeadKind,
) -> Option<Tensor<B, 1>> {
    let [batch, max_steps, n_classes] = logits.dims();
    debug_assert_eq!(batch, raw_labels.len());

    let mut positions: Vec<i64> = Vec::new();
    let mut targets: Vec<i64> = Vec::new();
    for (i, labels) in raw_labels.iter().enumerate() {
        for (t, label) in labels.iter().enumerate() {
            let y = kind.label_of(label);
            if y >= 0 {
                positions.push((i * max_steps + t) as i64);
                targets.push(y);
            }
        }
    }
    if positions.is_empty() {
        return None;
    }

    let device = logits.device();
    let n = positions.len();
    let flat = logits.reshape([batch * max_steps, n_classes]);
    let index = Tensor::<B, 1, Int>::from_data(TensorData::new(positions, [n]), &device);
    let selected = flat.select(0, index);
    let targets = Tensor::<B, 1, Int>::from_data(TensorData::new(targets, [n]), &device);

    let ce = CrossEntropyLossConfig::new().init(&device);
    Some(ce.forward(selected, targets))
}

/// Sum of the present head losses; `None` when every head was absent.
pub fn sum_losses<B: Backend>(losses: HeadLosses<B>) -> Option<Tensor<B, 1>> {
    losses.into_iter().flatten().reduce(|acc, l| acc + l)
}
