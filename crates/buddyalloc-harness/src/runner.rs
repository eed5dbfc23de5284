//! Scenario execution engine.

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Arc;
use std::time::Instant;

use buddyalloc::{Arena, ArenaError, BLOCK_METADATA_SIZE, FitMode};
use serde::{Deserialize, Serialize};

use crate::error::ScenarioError;
use crate::scenario::{ScenarioCase, ScenarioSet, Step};
use crate::structured_log::{JsonlLogger, LogEntry, LogLevel, Outcome};

/// Outcome of one scenario case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_name: String,
    pub fit_mode: FitMode,
    pub passed: bool,
    /// Block-state string after the last step, when the case got that far.
    pub final_blocks: Option<String>,
    pub failure: Option<String>,
}

/// Pass/fail counts over a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(results: &[CaseResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
        }
    }

    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }
}

/// Replays scenario sets against fresh arenas.
#[derive(Debug)]
pub struct ScenarioRunner {
    /// Name of the replay campaign.
    pub campaign: String,
    logger: Option<JsonlLogger>,
}

impl ScenarioRunner {
    #[must_use]
    pub fn new(campaign: impl Into<String>) -> Self {
        Self {
            campaign: campaign.into(),
            logger: None,
        }
    }

    /// Route arena messages and case events to `logger`.
    #[must_use]
    pub fn with_logger(mut self, logger: JsonlLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    /// Run every case in `set`; failures are reported, not propagated.
    pub fn run(&self, set: &ScenarioSet) -> Vec<CaseResult> {
        set.cases.iter().map(|case| self.run_reported(case)).collect()
    }

    fn run_reported(&self, case: &ScenarioCase) -> CaseResult {
        let case_logger = self.logger.as_ref().map(|l| l.for_case(&case.name));
        if let Some(logger) = &case_logger {
            let _ = logger.emit_entry(
                LogEntry::new("", LogLevel::Info, "case_start")
                    .with_fit_mode(case.fit_mode)
                    .with_details(serde_json::json!({
                        "campaign": self.campaign,
                        "size_exponent": case.size_exponent,
                        "steps": case.steps.len(),
                    })),
            );
        }

        let started = Instant::now();
        let outcome = self.run_case(case);
        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let result = match outcome {
            Ok(blocks) => CaseResult {
                case_name: case.name.clone(),
                fit_mode: case.fit_mode,
                passed: true,
                final_blocks: Some(blocks),
                failure: None,
            },
            Err(err) => CaseResult {
                case_name: case.name.clone(),
                fit_mode: case.fit_mode,
                passed: false,
                final_blocks: None,
                failure: Some(err.to_string()),
            },
        };

        if let Some(logger) = &case_logger {
            let (level, status) = if result.passed {
                (LogLevel::Info, Outcome::Pass)
            } else {
                (LogLevel::Error, Outcome::Fail)
            };
            let mut entry = LogEntry::new("", level, "case_end")
                .with_fit_mode(case.fit_mode)
                .with_outcome(status)
                .with_duration_ms(elapsed_ms);
            if let Some(blocks) = &result.final_blocks {
                entry = entry.with_blocks(blocks.clone());
            }
            if let Some(failure) = &result.failure {
                entry = entry.with_message(failure.clone());
            }
            let _ = logger.emit_entry(entry);
        }
        result
    }

    /// Run one case and return its final block-state string.
    pub fn run_case(&self, case: &ScenarioCase) -> Result<String, ScenarioError> {
        let arena_error = |source: ArenaError| ScenarioError::Arena {
            case: case.name.clone(),
            source,
        };

        let mut builder = Arena::builder(case.size_exponent).with_fit_mode(case.fit_mode);
        if let Some(logger) = &self.logger {
            builder = builder.with_logger(Arc::new(logger.for_case(&case.name)));
        }
        let arena = builder.build().map_err(arena_error)?;
        let mut handles = Handles::new(&arena);

        for (index, step) in case.steps.iter().enumerate() {
            let step_no = index + 1;
            match step {
                Step::Allocate {
                    handle,
                    size,
                    expect_out_of_memory,
                } => {
                    if let Some(name) = handle
                        && handles.contains(name)
                    {
                        return Err(ScenarioError::DuplicateHandle {
                            case: case.name.clone(),
                            step: step_no,
                            handle: name.clone(),
                        });
                    }
                    match (arena.allocate(*size), *expect_out_of_memory) {
                        (Ok(ptr), false) => {
                            if let Some(name) = handle {
                                handles.insert(name.clone(), ptr);
                            } else {
                                handles.insert_anonymous(ptr);
                            }
                        }
                        (Ok(ptr), true) => {
                            handles.insert_anonymous(ptr);
                            return Err(ScenarioError::Mismatch {
                                case: case.name.clone(),
                                step: step_no,
                                expected: "out of memory".to_string(),
                                actual: format!("allocation of {size} bytes"),
                            });
                        }
                        (Err(err), true) if err.is_out_of_memory() => {}
                        (Err(err), _) => return Err(arena_error(err)),
                    }
                }
                Step::Deallocate { handle } => {
                    if !handles.release(handle) {
                        return Err(ScenarioError::UnknownHandle {
                            case: case.name.clone(),
                            step: step_no,
                            handle: handle.clone(),
                        });
                    }
                }
                Step::SetFitMode { mode } => arena.set_fit_mode(*mode),
                Step::ExpectBlocks { blocks } => {
                    let actual = arena.block_report().to_string();
                    expect_blocks(case, step_no, blocks, &actual)?;
                }
                Step::ExpectOffset { handle, offset } => {
                    let ptr = handles.get(handle).ok_or_else(|| ScenarioError::UnknownHandle {
                        case: case.name.clone(),
                        step: step_no,
                        handle: handle.clone(),
                    })?;
                    let actual = block_offset(&arena, ptr);
                    if actual != Some(*offset) {
                        return Err(ScenarioError::Mismatch {
                            case: case.name.clone(),
                            step: step_no,
                            expected: format!("block at offset {offset}"),
                            actual: actual.map_or_else(
                                || "no block".to_string(),
                                |found| format!("block at offset {found}"),
                            ),
                        });
                    }
                }
            }
        }

        let final_blocks = arena.block_report().to_string();
        if let Some(expected) = &case.expected_blocks {
            expect_blocks(case, case.steps.len(), expected, &final_blocks)?;
        }
        Ok(final_blocks)
    }
}

fn expect_blocks(
    case: &ScenarioCase,
    step: usize,
    expected: &str,
    actual: &str,
) -> Result<(), ScenarioError> {
    if expected.trim_end() == actual.trim_end() {
        return Ok(());
    }
    Err(ScenarioError::Mismatch {
        case: case.name.clone(),
        step,
        expected: format!("blocks '{}'", expected.trim_end()),
        actual: format!("blocks '{}'", actual.trim_end()),
    })
}

/// Offset of the block whose payload starts at `ptr`.
fn block_offset(arena: &Arena, ptr: NonNull<u8>) -> Option<usize> {
    let addr = ptr.as_ptr().addr();
    arena.inspect(|mut blocks| {
        blocks.find_map(|view| {
            (view.address().as_ptr().addr() + BLOCK_METADATA_SIZE == addr).then_some(view.offset())
        })
    })
}

/// Live allocations of one case; anything left is released on drop.
struct Handles<'a> {
    arena: &'a Arena,
    named: HashMap<String, NonNull<u8>>,
    anonymous: Vec<NonNull<u8>>,
}

impl<'a> Handles<'a> {
    fn new(arena: &'a Arena) -> Self {
        Self {
            arena,
            named: HashMap::new(),
            anonymous: Vec::new(),
        }
    }

    fn contains(&self, name: &str) -> bool {
        self.named.contains_key(name)
    }

    fn get(&self, name: &str) -> Option<NonNull<u8>> {
        self.named.get(name).copied()
    }

    fn insert(&mut self, name: String, ptr: NonNull<u8>) {
        self.named.insert(name, ptr);
    }

    fn insert_anonymous(&mut self, ptr: NonNull<u8>) {
        self.anonymous.push(ptr);
    }

    /// Release `name`; false if no such handle is live.
    #[allow(unsafe_code)]
    fn release(&mut self, name: &str) -> bool {
        let Some(ptr) = self.named.remove(name) else {
            return false;
        };
        // SAFETY: `ptr` came from `self.arena.allocate` and leaves the table
        // here, so it is released exactly once.
        unsafe { self.arena.deallocate(ptr) };
        true
    }
}

impl Drop for Handles<'_> {
    #[allow(unsafe_code)]
    fn drop(&mut self) {
        let remaining = self
            .named
            .drain()
            .map(|(_, ptr)| ptr)
            .chain(self.anonymous.drain(..));
        for ptr in remaining {
            // SAFETY: every pointer in the table is live in `self.arena` and
            // is drained exactly once.
            unsafe { self.arena.deallocate(ptr) };
        }
    }
}
