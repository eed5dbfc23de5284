use std::path::{Path, PathBuf};

use buddyalloc::FitMode;
use buddyalloc_harness::structured_log::validate_log_file;
use buddyalloc_harness::{
    JsonlLogger, LogEmitter, LogLevel, RunSummary, ScenarioRunner, ScenarioSet, StressConfig,
    run_stress,
};

fn fixture_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/scenarios.json")
}

fn scratch_path(name: &str) -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    std::env::temp_dir().join(format!("buddyalloc-{name}-{}-{nanos}.jsonl", std::process::id()))
}

#[test]
fn bundled_scenarios_all_pass() {
    let set = ScenarioSet::from_file(&fixture_path()).expect("fixture loads");
    assert_eq!(set.family, "buddy_core");
    assert!(set.cases.len() >= 7);

    let results = ScenarioRunner::new("bundled").run(&set);
    for result in &results {
        assert!(
            result.passed,
            "{}: {}",
            result.case_name,
            result.failure.as_deref().unwrap_or("")
        );
    }
    let summary = RunSummary::from_results(&results);
    assert_eq!(summary.total, set.cases.len());
    assert!(summary.all_passed());
}

#[test]
fn bundled_scenarios_cover_every_fit_mode() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    let json = set.to_json().unwrap();
    for mode in FitMode::ALL {
        assert!(json.contains(mode.as_str()), "no scenario uses {mode}");
    }
}

#[test]
fn replay_log_is_valid_jsonl() {
    let set = ScenarioSet::from_file(&fixture_path()).unwrap();
    let log_path = scratch_path("replay");
    let emitter = LogEmitter::to_file(&log_path, "replay", "test").unwrap();
    let logger = JsonlLogger::new(emitter, LogLevel::Debug);

    let results = ScenarioRunner::new("logged")
        .with_logger(logger.clone())
        .run(&set);
    assert!(results.iter().all(|r| r.passed));
    logger.flush().unwrap();

    let (lines, errors) = validate_log_file(&log_path).unwrap();
    let content = std::fs::read_to_string(&log_path).unwrap();
    let _ = std::fs::remove_file(&log_path);

    assert!(errors.is_empty(), "{}", errors[0]);
    // Start and end per case, plus arena messages.
    assert!(lines > 2 * set.cases.len());
    assert!(content.contains("\"event\":\"case_start\""));
    assert!(content.contains("\"event\":\"case_end\""));
    assert!(content.contains("\"event\":\"arena\""));
    assert!(content.contains("split block at 0"));
    assert!(content.contains("\"case\":\"coalescing_cascades_to_root\""));
    // Debug threshold keeps trace-level payload dumps out.
    assert!(!content.contains("\"level\":\"trace\""));
}

#[test]
fn stress_report_serializes() {
    let config = StressConfig {
        size_exponent: 12,
        fit_mode: FitMode::WorstFit,
        seed: 7,
        steps: 500,
        threads: 2,
        max_request: 100,
        max_live: 8,
    };
    let report = run_stress(&config, None).unwrap();
    assert!(report.coalesced);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["config"]["fit_mode"], "worst_fit");
    assert_eq!(json["config"]["seed"], 7);
    assert_eq!(json["final_block_count"], 1);
}
