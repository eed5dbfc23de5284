//! Tooling around the buddyalloc arena.
//!
//! This crate provides:
//! - Scenario fixtures: JSON descriptions of allocate/free sequences and the
//!   block layouts they must produce
//! - Replay: run scenario fixtures against real arenas and collect results
//! - Stress: multi-threaded randomized alloc/free with integrity checks
//! - Structured logs: JSONL records, including arena messages routed through
//!   [`JsonlLogger`]

#![deny(unsafe_code)]

pub mod error;
pub mod runner;
pub mod scenario;
pub mod stress;
pub mod structured_log;

pub use error::ScenarioError;
pub use runner::{CaseResult, RunSummary, ScenarioRunner};
pub use scenario::{ScenarioCase, ScenarioSet, Step};
pub use stress::{StressConfig, StressReport, run_stress};
pub use structured_log::{JsonlLogger, LogEmitter, LogEntry, LogLevel};
