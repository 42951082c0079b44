//! Runs the `drover` binary and checks the JSON it prints.

use serde_json::Value;
use std::process::Command;

fn run(args: &[&str]) -> Vec<Value> {
    let output = Command::new(env!("CARGO_BIN_EXE_drover"))
        .args(args)
        .output()
        .expect("failed to run drover");
    assert!(
        output.status.success(),
        "drover exited with {:?}: {}",
        output.status,
        String::from_utf8_lossy(&output.stderr)
    );

    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(|line| serde_json::from_str(line).expect("each stdout line is one JSON summary"))
        .collect()
}

#[test]
fn counter_scenario_loses_no_increments() {
    let summaries = run(&["counter"]);
    assert_eq!(summaries.len(), 1);
    let summary = &summaries[0];
    assert_eq!(summary["scenario"], "counter");
    assert_eq!(summary["store"]["x"], 2000);
    assert_eq!(summary["counts"]["succeeded"], 2);
}

#[test]
fn backpressure_scenario_serialises_three_sleeps() {
    let summaries = run(&["backpressure"]);
    let summary = &summaries[0];
    assert_eq!(summary["config"]["capacity"], 2);
    assert_eq!(summary["config"]["workers"], 1);
    assert_eq!(summary["results"].as_array().unwrap().len(), 3);
    assert!(summary["elapsed_ms"].as_u64().unwrap() >= 20);
}

#[test]
fn drain_scenario_cancels_everything_and_stops() {
    let summaries = run(&["drain", "--workers", "1", "--capacity", "4"]);
    let summary = &summaries[0];
    assert_eq!(summary["shutdown"]["state"], "stopped");
    assert_eq!(summary["shutdown"]["timed_out"], true);

    let results = summary["results"].as_array().unwrap();
    assert_eq!(results.len(), 4);
    assert!(
        results
            .iter()
            .all(|r| r["outcome"]["value"]["kind"] == "CANCELLED")
    );
}

#[test]
fn all_runs_every_scenario_in_order() {
    let summaries = run(&[]);
    let names: Vec<&str> = summaries
        .iter()
        .map(|s| s["scenario"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["backpressure", "counter", "drain"]);
}

#[test]
fn zero_workers_is_rejected() {
    let output = Command::new(env!("CARGO_BIN_EXE_drover"))
        .args(["counter", "--workers", "0"])
        .output()
        .expect("failed to run drover");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
