//! Collation of tokenized examples into burn tensors.
//!
//! Besides the padded token-id matrices, the batcher precomputes per-story
//! pooling weights: `pool[i][t][j]` is `1/n_t` when token `j` of item `i`
//! belongs to step `t` (`n_t` tokens in total), so the model can average
//! each step's hidden states with a single matmul.

use burn::data::dataloader::batcher::Batcher;
use burn::prelude::*;

use crate::dataset::ConversionExample;
use crate::records::StepLabel;

/// One collated batch. Story-B steps carry the labels.
#[derive(Debug, Clone)]
pub struct ConversionBatch<B: Backend> {
    pub input_ids_a: Tensor<B, 2, Int>,
    pub input_ids_b: Tensor<B, 2, Int>,
    /// Pooling weights, `(batch, max_steps_a, seq_a)`.
    pub pool_a: Tensor<B, 3>,
    /// Pooling weights, `(batch, max_steps_b, seq_b)`.
    pub pool_b: Tensor<B, 3>,
    /// 1.0 for real story-A steps, 0.0 for padded ones.
    pub step_mask_a: Tensor<B, 2>,
    /// 1.0 for real story-B steps, 0.0 for padded ones.
    pub step_mask_b: Tensor<B, 2>,
    /// Per-head labels over story-B steps, `-1` where not applicable
    /// (including step padding). Order: state, loc_before, loc_after.
    pub labels: [Tensor<B, 2, Int>; 3],
    /// Raw label chains for CPU-side index building.
    pub raw_labels: Vec<Vec<StepLabel>>,
    pub num_steps: Vec<usize>,
    pub max_steps: usize,
}

/// [`Batcher`] padding with the tokenizer's pad id.
#[derive(Debug, Clone)]
pub struct ConversionBatcher<B: Backend> {
    pad_id: u32,
    device: B::Device,
}

impl<B: Backend> ConversionBatcher<B> {
    pub fn new(pad_id: u32, device: B::Device) -> Self {
        Self { pad_id, device }
    }

    fn story_tensors(
        &self,
        ids: Vec<&[u32]>,
        tags: Vec<&[i64]>,
        steps: &[usize],
    ) -> (Tensor<B, 2, Int>, Tensor<B, 3>, Tensor<B, 2>) {
        let batch = ids.len();
        let max_len = ids.iter().map(|v| v.len()).max().unwrap_or(0);
        let max_steps = steps.iter().copied().max().unwrap_or(0);

        let mut id_data = vec![self.pad_id as i64; batch * max_len];
        let mut pool_data = vec![0.0f32; batch * max_steps * max_len];
        let mut mask_data = vec![0.0f32; batch * max_steps];

        for (i, (item_ids, item_tags)) in ids.iter().zip(&tags).enumerate() {
            for (j, &id) in item_ids.iter().enumerate() {
                id_data[i * max_len + j] = id as i64;
            }
            for t in 0..steps[i] {
                let tag = t as i64 + 1;
                let count = item_tags.iter().filter(|&&x| x == tag).count();
                if count > 0 {
                    let weight = 1.0 / count as f32;
                    for (j, &x) in item_tags.iter().enumerate() {
                        if x == tag {
                            pool_data[(i * max_steps + t) * max_len + j] = weight;
                        }
                    }
                }
                mask_data[i * max_steps + t] = 1.0;
            }
        }

        let input_ids = Tensor::from_data(
            TensorData::new(id_data, [batch, max_len]),
            &self.device,
        );
        let pool = Tensor::from_data(
            TensorData::new(pool_data, [batch, max_steps, max_len]),
            &self.device,
        );
        let step_mask = Tensor::from_data(
            TensorData::new(mask_data, [batch, max_steps]),
            &self.device,
        );
        (input_ids, pool, step_mask)
    }
}

impl<B: Backend> Batcher<ConversionExample, ConversionBatch<B>> for ConversionBatcher<B> {
    fn batch(&self, items: Vec<ConversionExample>) -> ConversionBatch<B> {
        let batch = items.len();
        let steps_a: Vec<usize> = items.iter().map(|x| x.tags_a.iter().filter(|&&t| t > 0).map(|&t| t as usize).max().unwrap_or(0)).collect();
        let steps_b: Vec<usize> = items.iter().map(|x| x.num_steps).collect();
        let max_steps = steps_b.iter().copied().max().unwrap_or(0);

        let (input_ids_a, pool_a, step_mask_a) = self.story_tensors(
            items.iter().map(|x| x.token_ids_a.as_slice()).collect(),
            items.iter().map(|x| x.tags_a.as_slice()).collect(),
            &steps_a,
        );
        let (input_ids_b, pool_b, step_mask_b) = self.story_tensors(
            items.iter().map(|x| x.token_ids_b.as_slice()).collect(),
            items.iter().map(|x| x.tags_b.as_slice()).collect(),
            &steps_b,
        );

        let mut state = vec![-1i64; batch * max_steps];
        let mut loc_before = vec![-1i64; batch * max_steps];
        let mut loc_after = vec![-1i64; batch * max_steps];
        for (i, item) in items.iter().enumerate() {
            for (t, label) in item.labels.iter().enumerate() {
                state[i * max_steps + t] = label.state;
                loc_before[i * max_steps + t] = label.loc_before;
                loc_after[i * max_steps + t] = label.loc_after;
            }
        }
        let label_tensor = |data: Vec<i64>| {
            Tensor::from_data(TensorData::new(data, [batch, max_steps]), &self.device)
        };

        ConversionBatch {
            input_ids_a,
            input_ids_b,
            pool_a,
            pool_b,
            step_mask_a,
            step_mask_b,
            labels: [
                label_tensor(state),
                label_tensor(loc_before),
                label_tensor(loc_after),
            ],
            raw_labels: items.iter().map(|x| x.labels.clone()).collect(),
            num_steps: steps_b,
            max_steps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::build_example;
    use crate::mocks::HashingEncoder;
    use crate::records::ConversionRecord;

    type TestBackend = burn::backend::NdArray;

    fn sample_record() -> ConversionRecord {
        ConversionRecord {
            story_id: "proc_1".to_string(),
            story_a_sentences: vec!["water sits in a pot".to_string()],
            story_b_sentences: vec!["water boils".to_string(), "steam forms above".to_string()],
            participant_converted: "water".to_string(),
            possible_participants_converted_to: vec!["steam".to_string()],
            compact_states: vec![vec![
                StepLabel {
                    state: 1,
                    loc_before: -1,
                    loc_after: 3,
                },
                StepLabel::IGNORED,
            ]],
        }
    }

    fn sample_batch() -> ConversionBatch<TestBackend> {
        let encoder = HashingEncoder::new(1024);
        let example = build_example(&encoder, &sample_record(), 0)
            .unwrap()
            .unwrap();
        let batcher = ConversionBatcher::<TestBackend>::new(2, Default::default());
        batcher.batch(vec![example])
    }

    #[test]
    fn test_shapes_agree() {
        let batch = sample_batch();
        let [b, seq_b] = batch.input_ids_b.dims();
        assert_eq!(b, 1);
        assert_eq!(batch.pool_b.dims(), [1, 2, seq_b]);
        assert_eq!(batch.step_mask_b.dims(), [1, 2]);
        assert_eq!(batch.labels[0].dims(), [1, 2]);
        assert_eq!(batch.max_steps, 2);
        assert_eq!(batch.num_steps, vec![2]);
    }

    #[test]
    fn test_pool_rows_are_normalized() {
        let batch = sample_batch();
        let sums: Vec<f32> = batch
            .pool_b
            .sum_dim(2)
            .into_data()
            .convert::<f32>()
            .to_vec()
            .unwrap();
        // Both story-B steps are real, so both rows sum to 1.
        for s in sums {
            assert!((s - 1.0).abs() < 1e-6);
        }
    }

    #[test]
    fn test_labels_carry_sentinel() {
        let batch = sample_batch();
        let state: Vec<i64> = batch.labels[0].clone().into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(state, vec![1, -1]);
        let loc_after: Vec<i64> = batch.labels[2].clone().into_data().convert::<i64>().to_vec().unwrap();
        assert_eq!(loc_after, vec![3, -1]);
    }

    #[test]
    fn test_empty_batch() {
        let batcher = ConversionBatcher::<TestBackend>::new(2, Default::default());
        let batch = batcher.batch(vec![]);
        assert_eq!(batch.max_steps, 0);
        assert_eq!(batch.input_ids_b.dims(), [0, 0]);
        assert!(batch.raw_labels.is_empty());
    }

    #[test]
    fn test_padding_uses_pad_id() {
        let encoder = HashingEncoder::new(1024);
        let mut short = sample_record();
        short.story_b_sentences = vec!["x".to_string(), "y".to_string()];
        short.compact_states = vec![vec![StepLabel::IGNORED, StepLabel::IGNORED]];
        let long = sample_record();
        let a = build_example(&encoder, &short, 0).unwrap().unwrap();
        let b = build_example(&encoder, &long, 0).unwrap().unwrap();
        assert!(a.token_ids_b.len() < b.token_ids_b.len());

        let batcher = ConversionBatcher::<TestBackend>::new(2, Default::default());
        let batch = batcher.batch(vec![a.clone(), b]);
        let [_, seq] = batch.input_ids_b.dims();
        let ids: Vec<i64> = batch.input_ids_b.into_data().convert::<i64>().to_vec().unwrap();
        // Row 0 is padded past its real length.
        assert!(ids[a.token_ids_b.len()..seq].iter().all(|&x| x == 2));
    }
}
