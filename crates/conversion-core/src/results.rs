//! Result rows written during training and final evaluation.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Dev metrics after one epoch. Iteration 0 is the pre-training baseline;
/// the final test evaluation uses -1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochResult {
    pub iteration: i64,
    pub accuracy: f64,
    pub consistency: f64,
    pub verifiability: f64,
}

/// Final test metrics share the epoch row shape.
pub type FinalTestResult = EpochResult;

/// Append one row to a JSONL results file, creating it on first write.
pub fn append_jsonl<T: Serialize>(path: &Path, row: &T) -> anyhow::Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open results file {}", path.display()))?;
    let line = serde_json::to_string(row)?;
    writeln!(file, "{line}")
        .with_context(|| format!("failed to append to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results_epoch_dev.json");

        for (iteration, v) in [(0i64, 0.1), (1, 0.3), (2, 0.3)] {
            append_jsonl(
                &path,
                &EpochResult {
                    iteration,
                    accuracy: 0.5,
                    consistency: 0.4,
                    verifiability: v,
                },
            )
            .unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<EpochResult> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].iteration, 0);
        assert_eq!(rows[2].verifiability, 0.3);
    }
}
