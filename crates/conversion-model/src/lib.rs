//! Neural model for the paired-story state-conversion task.
//!
//! A transformer encoder reads each story once; per-step features come from
//! the batcher's pooling weights via a single matmul. Three classification
//! heads predict, per story-B step, the state-change class and the
//! before/after location classes. Two variants share one contract: the flat
//! mixed model scores steps independently, the top-down model threads a
//! gated recurrence through the steps first.

pub mod backbone;
pub mod heads;
pub mod loss;
pub mod recurrence;
pub mod variants;

pub use backbone::{pool_steps, StoryEncoder, StoryEncoderConfig};
pub use heads::{ConversionOutput, StepHeads, StepHeadsConfig};
pub use loss::{masked_cross_entropy, sum_losses, HeadKind, HeadLosses};
pub use recurrence::{StepRecurrence, StepRecurrenceConfig};
pub use variants::{
    ConversionModelConfig, MixedConversion, ModelVariant, StateConversionModel,
    TopDownConversion,
};
