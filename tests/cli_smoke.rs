use std::process::Command;

use tempfile::tempdir;

#[derive(Debug, serde::Deserialize)]
struct EvalResult {
    scenario_name: String,
    rounds: u32,
    converged: bool,
    initial_cm: f64,
    final_cm: f64,
    cm_trajectory: Vec<f64>,
    final_ranking: Vec<usize>,
}

fn run_cli_eval(case: &str) -> EvalResult {
    let dir = tempdir().unwrap();
    let out_path = dir.path().join("eval.jsonl");

    let status = Command::new(env!("CARGO_BIN_EXE_consensus"))
        .args(["eval", "--case", case])
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let first_line = raw.lines().next().unwrap();
    serde_json::from_str(first_line).unwrap()
}

fn sample_request() -> serde_json::Value {
    serde_json::json!({
        "matrices": {
            "alice": {"price": [[0.5, 0.9, 0.7], [0.1, 0.5, 0.3], [0.3, 0.7, 0.5]]},
            "bob":   {"price": [[0.5, 0.2, 0.4], [0.8, 0.5, 0.6], [0.6, 0.4, 0.5]]},
            "carol": {"price": [[0.5, 0.8, 0.6], [0.2, 0.5, 0.4], [0.4, 0.6, 0.5]]}
        },
        "consensusThreshold": 0.9,
        "modelParameters": {"ag_lq": [0.3, 0.8], "ex_lq": [0.5, 1.0], "b": 1.0, "beta": 0.8}
    })
}

#[test]
fn cli_eval_smoke_and_determinism() {
    let a = run_cli_eval("aligned_5x4");
    let b = run_cli_eval("aligned_5x4");

    assert_eq!(a.scenario_name, "aligned_5x4");
    assert!(a.rounds >= 1);
    assert_eq!(a.cm_trajectory.len(), a.rounds as usize);
    assert!((0.0..=1.0).contains(&a.initial_cm));
    assert!((0.0..=1.0).contains(&a.final_cm));
    assert_eq!(a.final_ranking.len(), 4);

    // Latency is environment-dependent; everything else must match.
    assert_eq!(a.rounds, b.rounds);
    assert_eq!(a.converged, b.converged);
    assert_eq!(a.cm_trajectory, b.cm_trajectory);
    assert_eq!(a.final_ranking, b.final_ranking);
}

#[test]
fn cli_eval_rejects_unknown_case() {
    let dir = tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_consensus"))
        .args(["eval", "--case", "no_such_case"])
        .arg("--out")
        .arg(dir.path().join("eval.jsonl"))
        .status()
        .unwrap();
    assert!(!status.success());
}

#[test]
fn cli_run_writes_successful_response_and_trace() {
    let dir = tempdir().unwrap();
    let request_path = dir.path().join("request.json");
    let out_path = dir.path().join("response.json");
    let trace_path = dir.path().join("trace.jsonl");
    std::fs::write(&request_path, sample_request().to_string()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_consensus"))
        .arg("run")
        .arg("--request")
        .arg(&request_path)
        .arg("--out")
        .arg(&out_path)
        .args(["--max-rounds", "3", "--rng-seed", "17"])
        .arg("--trace")
        .arg(&trace_path)
        .status()
        .unwrap();
    assert!(status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v.get("success").and_then(|s| s.as_bool()), Some(true));
    assert_eq!(
        v.get("msg").and_then(|s| s.as_str()),
        Some("Consensus process executed successfully")
    );
    let rankings = v
        .pointer("/results/alternatives_rankings")
        .and_then(|r| r.as_array())
        .expect("alternatives_rankings");
    // Three experts, then the collective.
    assert_eq!(rankings.len(), 4);
    assert_eq!(
        v.pointer("/results/alternatives_rankings/3"),
        v.pointer("/results/collective_ranking")
    );
    let collective = v
        .pointer("/results/collective_ranking")
        .and_then(|r| r.as_array())
        .expect("collective_ranking");
    assert_eq!(collective.len(), 3);
    let rounds = v
        .pointer("/results/rounds")
        .and_then(|r| r.as_u64())
        .expect("rounds");
    assert!((1..=3).contains(&rounds));
    assert!(v.pointer("/results/collective_evaluations/price").is_some());

    let trace = std::fs::read_to_string(&trace_path).unwrap();
    assert_eq!(trace.lines().count() as u64, rounds);
}

#[test]
fn cli_run_failure_writes_unsuccessful_response() {
    let dir = tempdir().unwrap();
    let request_path = dir.path().join("request.json");
    let out_path = dir.path().join("response.json");

    let mut req = sample_request();
    req["modelParameters"]["ag_lq"] = serde_json::json!([0.5, 0.5]);
    std::fs::write(&request_path, req.to_string()).unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_consensus"))
        .arg("run")
        .arg("--request")
        .arg(&request_path)
        .arg("--out")
        .arg(&out_path)
        .status()
        .unwrap();
    assert!(!status.success());

    let raw = std::fs::read_to_string(&out_path).unwrap();
    let v: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(v.get("success").and_then(|s| s.as_bool()), Some(false));
    assert!(v.get("results").is_none());
    assert!(v
        .get("msg")
        .and_then(|s| s.as_str())
        .unwrap()
        .starts_with("Error executing consensus process:"));
}

#[test]
fn cli_weights_prints_json_vector() {
    let output = Command::new(env!("CARGO_BIN_EXE_consensus"))
        .args(["weights", "--m", "3"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let weights: Vec<f64> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(weights, vec![0.07, 0.67, 0.27]);
}
