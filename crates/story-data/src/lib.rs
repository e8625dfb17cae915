//! Data layer for the state-conversion task.
//!
//! Loads paired-story JSON records, builds question + story token sequences
//! with per-token timestep tags, and batches them into burn tensors. The
//! pretrained tokenizer is injected through the [`SubwordEncoder`] trait so
//! the rest of the pipeline never touches tokenizer internals.

pub mod batcher;
pub mod dataset;
pub mod mocks;
pub mod records;
pub mod sequence;
pub mod tokenizer;

pub use batcher::{ConversionBatch, ConversionBatcher};
pub use dataset::{build_example, ConversionDataset, ConversionExample};
pub use records::{read_conversion_file, ConversionRecord, StepLabel};
pub use sequence::{build_story_sequence, format_question, StepTag, TimestepSequence};
pub use tokenizer::{MarkerIds, MarkerTokens, StoryTokenizer, SubwordEncoder};
