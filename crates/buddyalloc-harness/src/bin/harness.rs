//! CLI entrypoint for the buddyalloc harness.

use std::path::PathBuf;

use buddyalloc::FitMode;
use buddyalloc_harness::structured_log::Outcome;
use buddyalloc_harness::{
    JsonlLogger, LogEmitter, LogEntry, LogLevel, RunSummary, ScenarioRunner, ScenarioSet,
    StressConfig, run_stress,
};
use clap::{Parser, Subcommand};

/// Scenario replay and stress tooling for buddyalloc arenas.
#[derive(Debug, Parser)]
#[command(name = "buddyalloc-harness")]
#[command(about = "Scenario replay and stress tooling for buddyalloc")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a scenario fixture file and check every expected block layout.
    Replay {
        /// Scenario set JSON path.
        #[arg(long)]
        scenario: PathBuf,
        /// Structured JSONL log output path.
        #[arg(long)]
        log: Option<PathBuf>,
        /// Lowest arena message level written to the log.
        #[arg(long, default_value = "info")]
        log_level: String,
        /// Write per-case results as JSON here (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Hammer one arena from several threads with randomized requests.
    Stress {
        /// Block area size exponent (capacity is 2^k bytes).
        #[arg(long, default_value_t = 16)]
        size_exponent: u8,
        /// Fit strategy (`first_fit`, `best_fit`, `worst_fit`).
        #[arg(long, default_value = "first_fit")]
        fit_mode: FitMode,
        /// Root seed (decimal or 0x...).
        #[arg(long, default_value = "0xDEAD_BEEF")]
        seed: String,
        /// Operations per thread.
        #[arg(long, default_value_t = 10_000)]
        steps: usize,
        #[arg(long, default_value_t = 4)]
        threads: usize,
        /// Largest payload requested.
        #[arg(long, default_value_t = 512)]
        max_request: usize,
        /// Output JSON report path (if omitted, prints to stdout).
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Command::Replay {
            scenario,
            log,
            log_level,
            output,
        } => {
            eprintln!("Replaying scenarios from {}", scenario.display());
            let set = ScenarioSet::from_file(&scenario)?;

            let mut runner = ScenarioRunner::new(set.family.clone());
            let mut logger = None;
            if let Some(log_path) = &log {
                let level = parse_level(&log_level)?;
                let emitter = LogEmitter::to_file(log_path, "replay", &run_id())?;
                let jsonl = JsonlLogger::new(emitter, level);
                jsonl.emit_entry(
                    LogEntry::new("", LogLevel::Info, "run_start")
                        .with_details(serde_json::json!({"scenario": scenario, "cases": set.cases.len()})),
                )?;
                runner = runner.with_logger(jsonl.clone());
                logger = Some(jsonl);
            }

            let results = runner.run(&set);
            let summary = RunSummary::from_results(&results);
            for result in results.iter().filter(|r| !r.passed) {
                eprintln!(
                    "FAIL {}: {}",
                    result.case_name,
                    result.failure.as_deref().unwrap_or("unknown failure")
                );
            }
            eprintln!(
                "Replay complete: total={}, passed={}, failed={}",
                summary.total, summary.passed, summary.failed
            );

            if let Some(logger) = &logger {
                let outcome = if summary.all_passed() {
                    Outcome::Pass
                } else {
                    Outcome::Fail
                };
                logger.emit_entry(
                    LogEntry::new("", LogLevel::Info, "run_end")
                        .with_outcome(outcome)
                        .with_details(serde_json::to_value(summary)?),
                )?;
                logger.flush()?;
            }

            let json = serde_json::to_string_pretty(&results)?;
            if let Some(path) = output {
                std::fs::write(&path, json)?;
                eprintln!("Wrote results to {}", path.display());
            } else {
                println!("{json}");
            }

            if !summary.all_passed() {
                return Err("Scenario replay failed".into());
            }
        }
        Command::Stress {
            size_exponent,
            fit_mode,
            seed,
            steps,
            threads,
            max_request,
            output,
        } => {
            let config = StressConfig {
                size_exponent,
                fit_mode,
                seed: parse_seed(&seed)?,
                steps,
                threads,
                max_request,
                ..StressConfig::default()
            };
            eprintln!(
                "Stressing 2^{size_exponent} byte arena ({fit_mode}) with {threads} threads x {steps} steps"
            );
            let report = run_stress(&config, None)?;
            eprintln!(
                "Stress complete: allocations={}, refused={}, coalesced={}",
                report.allocations, report.refused, report.coalesced
            );

            let json = serde_json::to_string_pretty(&report)?;
            if let Some(path) = output {
                std::fs::write(&path, json)?;
                eprintln!("Wrote report to {}", path.display());
            } else {
                println!("{json}");
            }

            if !report.coalesced {
                return Err("arena did not coalesce back to a single free block".into());
            }
        }
    }

    Ok(())
}

fn parse_level(raw: &str) -> Result<LogLevel, Box<dyn std::error::Error>> {
    let quoted = format!("\"{}\"", raw.trim().to_ascii_lowercase());
    serde_json::from_str(&quoted).map_err(|_| {
        format!("Unsupported log level '{raw}', expected trace|debug|info|warn|error|fatal").into()
    })
}

fn parse_seed(raw: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = raw.trim();
    let seed = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        let hex = hex.replace('_', "");
        u64::from_str_radix(&hex, 16)?
    } else {
        let dec = s.replace('_', "");
        dec.parse::<u64>()?
    };
    Ok(seed)
}

fn run_id() -> String {
    let secs = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("run-{secs}-{}", std::process::id())
}
