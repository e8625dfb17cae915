//! On-disk conversion record format.
//!
//! Each record pairs two tellings of the same process (story A and story B)
//! with, per candidate entity, a compact label chain: for every story step a
//! state class plus before/after location classes, with `-1` marking steps
//! where a label does not apply.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Per-step gold labels for one candidate entity. `-1` means not applicable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepLabel {
    pub state: i64,
    pub loc_before: i64,
    pub loc_after: i64,
}

impl StepLabel {
    /// A step with no gold annotation at all.
    pub const IGNORED: StepLabel = StepLabel {
        state: -1,
        loc_before: -1,
        loc_after: -1,
    };
}

/// One paired-story example as stored in the dataset JSON files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub story_id: String,
    #[serde(rename = "story_A_sentences")]
    pub story_a_sentences: Vec<String>,
    #[serde(rename = "story_B_sentences")]
    pub story_b_sentences: Vec<String>,
    /// The entity tracked through story A.
    pub participant_converted: String,
    /// Candidate entities it may convert into in story B.
    pub possible_participants_converted_to: Vec<String>,
    /// Label chains, one per candidate, each one entry per story-B step.
    pub compact_states: Vec<Vec<StepLabel>>,
}

/// Load a JSON array of conversion records.
pub fn read_conversion_file(path: &Path) -> anyhow::Result<Vec<ConversionRecord>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open data file {}", path.display()))?;
    let records: Vec<ConversionRecord> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("failed to parse {}", path.display()))?;
    tracing::info!(path = %path.display(), records = records.len(), "loaded conversion records");
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_json() -> &'static str {
        r#"[{
            "story_id": "proc_17",
            "story_A_sentences": ["Water sits in a pot.", "The pot is heated."],
            "story_B_sentences": ["Heat is applied.", "Steam forms."],
            "participant_converted": "water",
            "possible_participants_converted_to": ["steam", "ice"],
            "compact_states": [
                [
                    {"state": 0, "loc_before": -1, "loc_after": -1},
                    {"state": 2, "loc_before": 3, "loc_after": 5}
                ],
                [
                    {"state": -1, "loc_before": -1, "loc_after": -1},
                    {"state": -1, "loc_before": -1, "loc_after": -1}
                ]
            ]
        }]"#
    }

    #[test]
    fn test_read_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dev.json");
        File::create(&path)
            .unwrap()
            .write_all(sample_json().as_bytes())
            .unwrap();

        let records = read_conversion_file(&path).unwrap();
        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.participant_converted, "water");
        assert_eq!(r.possible_participants_converted_to.len(), 2);
        assert_eq!(r.compact_states[0][1].loc_after, 5);
        assert_eq!(r.compact_states[1][0], StepLabel::IGNORED);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = read_conversion_file(Path::new("/nonexistent/records.json")).unwrap_err();
        assert!(err.to_string().contains("failed to open"));
    }
}
