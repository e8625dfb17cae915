//! End-to-end CLI pipeline on a tiny synthetic dataset.
//!
//! Runs the actual binary: train (hashing encoder, one epoch), eval on the
//! best checkpoint, then convert + score over the files the run produced.

use std::path::{Path, PathBuf};
use std::process::Command;

fn write_dataset(dir: &Path) {
    let mut records = Vec::new();
    for i in 0..3 {
        let n_steps = 2 + i % 2;
        let sentences: Vec<String> = (0..n_steps)
            .map(|s| format!("step {s} of process {i} happens here"))
            .collect();
        let labels: Vec<serde_json::Value> = (0..n_steps)
            .map(|s| {
                serde_json::json!({
                    "state": (s % 3) as i64,
                    "loc_before": if s == 0 { -1 } else { 0 },
                    "loc_after": 1
                })
            })
            .collect();
        let ignored: Vec<serde_json::Value> = (0..n_steps)
            .map(|_| serde_json::json!({"state": -1, "loc_before": -1, "loc_after": -1}))
            .collect();
        records.push(serde_json::json!({
            "story_id": format!("proc_{i}"),
            "story_A_sentences": ["water sits in a pot", "heat is applied"],
            "story_B_sentences": sentences,
            "participant_converted": "water",
            "possible_participants_converted_to": ["steam", "vapor"],
            "compact_states": [labels, ignored]
        }));
    }
    let body = serde_json::to_string(&records).unwrap();
    for name in ["train.json", "dev.json", "test.json"] {
        std::fs::write(dir.join(name), &body).unwrap();
    }
}

fn write_config(dir: &Path, data_dir: &Path) -> PathBuf {
    let config = format!(
        r#"
[model]
variant = "baseline-mixed"
d_model = 16
n_heads = 2
n_layers = 1
d_ff = 32
dropout = 0.0
d_step_hidden = 8
n_state_classes = 4
n_location_classes = 4
max_seq_len = 64

[tokenizer]
vocab_size = 512

[training]
epochs = 1
batch_size = 2
accumulation_steps = 2
lr = 1e-4
weight_decay = 0.01
adam_epsilon = 1e-6
max_grad_norm = 1.0
warmup_fraction = 0.1
seed = 7

[data]
data_dir = "{data_dir}"
dataset_name = "tiny"
train_file = "train.json"
dev_file = "dev.json"
test_file = "test.json"
"#,
        data_dir = data_dir.display()
    );
    let path = dir.join("train.toml");
    std::fs::write(&path, config).unwrap();
    path
}

fn run(args: &[&str]) {
    let status = Command::new(env!("CARGO_BIN_EXE_story-conv"))
        .args(args)
        .status()
        .expect("failed to launch story-conv");
    assert!(status.success(), "story-conv {args:?} failed");
}

#[test]
fn test_train_eval_convert_score_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let data_dir = tmp.path().join("data");
    std::fs::create_dir_all(&data_dir).unwrap();
    write_dataset(&data_dir);
    let config = write_config(tmp.path(), &data_dir);
    let output_dir = tmp.path().join("runs");

    run(&[
        "train",
        "--config",
        config.to_str().unwrap(),
        "--output-dir",
        output_dir.to_str().unwrap(),
    ]);

    let run_dir = output_dir.join("tiny_baseline-mixed_epochs_1_lr_1e-4_seed_7");
    assert!(run_dir.join("training_args.json").is_file());
    assert!(run_dir.join("train.toml").is_file());
    assert!(run_dir.join("best_model.mpk").is_file());

    // Baseline + one epoch = two dev result rows.
    let results = std::fs::read_to_string(run_dir.join("results_epoch_dev.json")).unwrap();
    let rows: Vec<serde_json::Value> = results
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["iteration"], 0);
    assert_eq!(rows[1]["iteration"], 1);
    assert!(run_dir.join("dev_conversion_0_output.json").is_file());
    assert!(run_dir.join("dev_conversion_1_output.json").is_file());

    run(&["eval", "--run-dir", run_dir.to_str().unwrap()]);
    let raw_test = run_dir.join("test_conversion_-1_output.json");
    assert!(raw_test.is_file());
    let final_results =
        std::fs::read_to_string(run_dir.join("final_test_results.json")).unwrap();
    let row: serde_json::Value = serde_json::from_str(final_results.lines().next().unwrap()).unwrap();
    assert_eq!(row["iteration"], -1);

    // Convert the raw test output and score it against the references.
    let converted = tmp.path().join("converted.json");
    run(&[
        "convert",
        "--input",
        raw_test.to_str().unwrap(),
        "--output",
        converted.to_str().unwrap(),
    ]);
    run(&[
        "score",
        "--predictions",
        converted.to_str().unwrap(),
        "--reference",
        data_dir.join("test.json").to_str().unwrap(),
    ]);

    // Converting again yields byte-identical output.
    let converted2 = tmp.path().join("converted2.json");
    run(&[
        "convert",
        "--input",
        raw_test.to_str().unwrap(),
        "--output",
        converted2.to_str().unwrap(),
    ]);
    assert_eq!(
        std::fs::read_to_string(&converted).unwrap(),
        std::fs::read_to_string(&converted2).unwrap()
    );
}
