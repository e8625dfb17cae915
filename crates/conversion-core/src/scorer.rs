//! Metrics over converted predictions.
//!
//! - accuracy: micro-averaged state accuracy over every (entity, step)
//!   position that carries a state label;
//! - consistency: fraction of entities whose whole labeled state chain is
//!   predicted exactly;
//! - verifiability: fraction of entities whose state chain and both
//!   location chains are all predicted exactly.
//!
//! Verifiability adds conditions on top of consistency, so
//! `verifiability <= consistency` always holds.

use anyhow::bail;
use serde::{Deserialize, Serialize};
use story_data::ConversionRecord;

use crate::convert::ConvertedPredictions;

/// The metric triple reported for a split.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub accuracy: f64,
    pub consistency: f64,
    pub verifiability: f64,
}

/// Score converted predictions against the reference records.
///
/// Predictions must mirror the reference nesting exactly; a shape mismatch
/// means the wrong files were paired and is an error.
pub fn score(
    predictions: &ConvertedPredictions,
    references: &[ConversionRecord],
) -> anyhow::Result<SplitMetrics> {
    if predictions.len() != references.len() {
        bail!(
            "prediction/reference record counts differ: {} vs {}",
            predictions.len(),
            references.len()
        );
    }

    let mut labeled_steps = 0usize;
    let mut correct_steps = 0usize;
    let mut entities = 0usize;
    let mut consistent = 0usize;
    let mut verifiable = 0usize;

    for (record_preds, record) in predictions.iter().zip(references) {
        if record_preds.len() != record.compact_states.len() {
            bail!(
                "story {}: {} predicted entities vs {} reference entities",
                record.story_id,
                record_preds.len(),
                record.compact_states.len()
            );
        }
        for (entity_preds, labels) in record_preds.iter().zip(&record.compact_states) {
            if entity_preds.len() != labels.len() {
                bail!(
                    "story {}: {} predicted steps vs {} labeled steps",
                    record.story_id,
                    entity_preds.len(),
                    labels.len()
                );
            }
            entities += 1;
            let mut chain_ok = true;
            let mut locations_ok = true;
            for (pred, label) in entity_preds.iter().zip(labels) {
                if label.state >= 0 {
                    labeled_steps += 1;
                    if pred.state == label.state {
                        correct_steps += 1;
                    } else {
                        chain_ok = false;
                    }
                }
                if label.loc_before >= 0 && pred.loc_before != label.loc_before {
                    locations_ok = false;
                }
                if label.loc_after >= 0 && pred.loc_after != label.loc_after {
                    locations_ok = false;
                }
            }
            if chain_ok {
                consistent += 1;
                if locations_ok {
                    verifiable += 1;
                }
            }
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    Ok(SplitMetrics {
        accuracy: ratio(correct_steps, labeled_steps),
        consistency: ratio(consistent, entities),
        verifiability: ratio(verifiable, entities),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::ConvertedStep;
    use story_data::StepLabel;

    fn reference() -> Vec<ConversionRecord> {
        vec![ConversionRecord {
            story_id: "proc_1".to_string(),
            story_a_sentences: vec!["a".to_string()],
            story_b_sentences: vec!["b".to_string(), "c".to_string()],
            participant_converted: "water".to_string(),
            possible_participants_converted_to: vec!["steam".to_string(), "ice".to_string()],
            compact_states: vec![
                vec![
                    StepLabel {
                        state: 1,
                        loc_before: 0,
                        loc_after: 2,
                    },
                    StepLabel {
                        state: 2,
                        loc_before: -1,
                        loc_after: -1,
                    },
                ],
                vec![StepLabel::IGNORED, StepLabel::IGNORED],
            ],
        }]
    }

    fn perfect() -> ConvertedPredictions {
        vec![vec![
            vec![
                ConvertedStep {
                    state: 1,
                    loc_before: 0,
                    loc_after: 2,
                },
                ConvertedStep {
                    state: 2,
                    loc_before: 5,
                    loc_after: 5,
                },
            ],
            vec![
                ConvertedStep {
                    state: 0,
                    loc_before: 0,
                    loc_after: 0,
                },
                ConvertedStep {
                    state: 0,
                    loc_before: 0,
                    loc_after: 0,
                },
            ],
        ]]
    }

    #[test]
    fn test_perfect_predictions() {
        let metrics = score(&perfect(), &reference()).unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.consistency, 1.0);
        assert_eq!(metrics.verifiability, 1.0);
    }

    #[test]
    fn test_wrong_location_breaks_verifiability_only() {
        let mut preds = perfect();
        preds[0][0][0].loc_after = 9;
        let metrics = score(&preds, &reference()).unwrap();
        assert_eq!(metrics.accuracy, 1.0);
        assert_eq!(metrics.consistency, 1.0);
        assert_eq!(metrics.verifiability, 0.5);
    }

    #[test]
    fn test_wrong_state_breaks_both_chains() {
        let mut preds = perfect();
        preds[0][0][1].state = 0;
        let metrics = score(&preds, &reference()).unwrap();
        // One of the two labeled state positions wrong.
        assert!((metrics.accuracy - 0.5).abs() < 1e-9);
        assert_eq!(metrics.consistency, 0.5);
        assert_eq!(metrics.verifiability, 0.5);
    }

    #[test]
    fn test_verifiability_never_exceeds_consistency() {
        let mut preds = perfect();
        preds[0][0][0].state = 0;
        preds[0][0][0].loc_before = 7;
        let metrics = score(&preds, &reference()).unwrap();
        assert!(metrics.verifiability <= metrics.consistency);
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let mut preds = perfect();
        preds[0][1].pop();
        assert!(score(&preds, &reference()).is_err());
        assert!(score(&perfect(), &[]).is_err());
    }
}
